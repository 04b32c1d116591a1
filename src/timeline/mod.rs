//! Timeline Module
//!
//! A timeline is one open chat window. A single tokio task owns all of its mutable state
//! (the window, the reaction index, the deletion coordinator and the profile cache) and
//! is driven by four channels: the chat event subscription, the reaction subscription,
//! commands from [`TimelineHandle`]s, and completions of the network calls it spawned.
//! Nothing else touches that state, so no locking is needed.
//!
//! Every spawned network call carries the generation it was issued under. Reopening the
//! timeline bumps the generation, and results that come back for an older one are
//! discarded instead of mutating the new window.

pub mod adjacency;
pub mod classifier;
pub mod compose;
pub mod content_parser;
pub mod deletion;
pub mod profiles;
pub mod reactions;
pub mod streaming;
pub mod thread_resolver;
pub mod view;
pub mod window;


use std::sync::Arc;

use nostr_sdk::prelude::*;
use tokio::sync::mpsc::{self, Receiver, Sender};
use tokio::sync::{broadcast, oneshot};

use crate::TimelineConfig;
use crate::collaborators::{Authorization, ProfileDirectory, Transport, TransportError};
use crate::error::{Action, ActionFailed, ReasonCode, Result, TimelineError};
use crate::types::{ChatEvent, IncomingEvent, Profile, ReactionRecord, ScopeId};

use adjacency::AdjacencyComputer;
use classifier::EventClassifier;
use compose::{ComposeGate, THUMBS_UP};
use deletion::{BeginOutcome, DeletionCoordinator, DeletionOutcome, DeletionState, DeletionTicket};
use profiles::ProfileCache;
use reactions::{GroupedReactions, ReactionAggregator};
use streaming::{TimelineStreamManager, TimelineUpdate, UpdateTrigger};
use thread_resolver::ThreadResolver;
use view::{TimelineEntry, ViewContext};
use window::ChatWindow;

/// The external services a timeline talks to.
#[derive(Clone)]
pub struct Collaborators {
    pub transport: Arc<dyn Transport>,
    pub profiles: Arc<dyn ProfileDirectory>,
    pub authorization: Arc<dyn Authorization>,
}

/// Result of an outbound send.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SendOutcome<T> {
    Sent(T),
    /// The timeline was reopened before the send resolved
    Discarded,
}

/// Point-in-time view of the timeline, ready to render.
#[derive(Debug, Clone)]
pub struct TimelineSnapshot {
    pub scope: ScopeId,
    pub generation: u64,
    pub revision: u64,
    pub entries: Vec<TimelineEntry>,
    pub compose_gate: ComposeGate,
    /// Withdrawn ids, sorted
    pub deleted_ids: Vec<String>,
}

impl TimelineSnapshot {
    pub fn entry(&self, event_id: &str) -> Option<&TimelineEntry> {
        self.entries.iter().find(|entry| entry.event_id() == event_id)
    }
}

type Reply<T> = oneshot::Sender<T>;
type DeleteResult = core::result::Result<DeletionOutcome, ActionFailed>;
type SendResult<T> = core::result::Result<SendOutcome<T>, ActionFailed>;

enum Command {
    RequestDelete {
        event_id: String,
        reply: Reply<DeleteResult>,
    },
    SendReaction {
        target_id: String,
        content: String,
        reply: Reply<SendResult<()>>,
    },
    SendMessage {
        content: String,
        reply_to: Option<String>,
        reply: Reply<SendResult<String>>,
    },
    SendJoinRequest {
        reply: Reply<SendResult<String>>,
    },
    PrependPage {
        events: Vec<ChatEvent>,
        reply: Reply<usize>,
    },
    Snapshot {
        reply: Reply<TimelineSnapshot>,
    },
    GroupedFor {
        target_id: String,
        reply: Reply<GroupedReactions>,
    },
    ReplyDraftLabel {
        reply_to: String,
        reply: Reply<String>,
    },
    QueryDeletion {
        event_id: String,
        reply: Reply<DeletionState>,
    },
    Reopen {
        scope: ScopeId,
        reply: Reply<()>,
    },
    Shutdown,
}

enum Completion {
    Deletion {
        ticket: DeletionTicket,
        result: core::result::Result<(), TransportError>,
        reply: Reply<DeleteResult>,
    },
    Published {
        generation: u64,
        result: core::result::Result<String, ActionFailed>,
        reply: Reply<SendResult<String>>,
    },
    Reaction {
        generation: u64,
        result: core::result::Result<(), ActionFailed>,
        reply: Reply<SendResult<()>>,
    },
    Profile {
        generation: u64,
        pubkey: PublicKey,
        profile: Option<Profile>,
    },
}

/// State owned by the timeline task.
pub struct ChatTimeline {
    scope: ScopeId,
    viewer: Option<PublicKey>,
    window: ChatWindow,
    classifier: EventClassifier,
    reactions: ReactionAggregator,
    deletion: DeletionCoordinator,
    adjacency: AdjacencyComputer,
    profiles: ProfileCache,
    resolver: ThreadResolver,
    collaborators: Collaborators,
    streams: Arc<TimelineStreamManager>,
    commands: Receiver<Command>,
    completion_sender: Sender<Completion>,
    completions: Receiver<Completion>,
    event_feed: Receiver<IncomingEvent>,
    reaction_feed: Receiver<ReactionRecord>,
    shutting_down: bool,
}

impl ChatTimeline {
    /// Opens a timeline for `scope` and starts its task. Must be called from within a
    /// tokio runtime.
    ///
    /// `viewer` is the logged-in user, if any; it is the acting user for deletions and
    /// decides what the composer offers.
    pub fn open(
        config: TimelineConfig,
        scope: ScopeId,
        viewer: Option<PublicKey>,
        collaborators: Collaborators,
    ) -> Result<TimelineHandle> {
        if let Some(logs_dir) = &config.logs_dir {
            crate::init_tracing(logs_dir)?;
        }

        let capacity = config.channel_capacity.max(1);
        let (command_sender, commands) = mpsc::channel(capacity);
        let (completion_sender, completions) = mpsc::channel(capacity);
        let streams = Arc::new(TimelineStreamManager::with_buffer(config.stream_buffer));

        let event_feed = collaborators.transport.subscribe_events(&scope);
        let reaction_feed = collaborators.transport.subscribe_reactions(&scope);

        tracing::info!(
            target: "relaychat::timeline::open",
            "Opening timeline for scope {}",
            scope
        );

        let timeline = ChatTimeline {
            scope,
            viewer,
            window: ChatWindow::new(),
            classifier: EventClassifier::with_config(config.classifier),
            reactions: ReactionAggregator::with_config(config.reactions),
            deletion: DeletionCoordinator::with_config(config.deletion),
            adjacency: AdjacencyComputer::new(),
            profiles: ProfileCache::new(),
            resolver: ThreadResolver::new(),
            collaborators,
            streams: Arc::clone(&streams),
            commands,
            completion_sender,
            completions,
            event_feed,
            reaction_feed,
            shutting_down: false,
        };
        tokio::spawn(timeline.run());

        Ok(TimelineHandle {
            commands: command_sender,
            streams,
        })
    }

    async fn run(mut self) {
        tracing::debug!(
            target: "relaychat::timeline::run",
            "Starting timeline loop for scope {}",
            self.scope
        );

        loop {
            tokio::select! {
                command = self.commands.recv() => match command {
                    Some(command) => self.handle_command(command),
                    None => {
                        tracing::debug!(
                            target: "relaychat::timeline::run",
                            "All handles dropped, closing timeline"
                        );
                        break;
                    }
                },
                Some(completion) = self.completions.recv() => self.handle_completion(completion),
                Some(incoming) = self.event_feed.recv() => self.handle_incoming(incoming),
                Some(record) = self.reaction_feed.recv() => self.handle_reaction(record),
            }

            if self.shutting_down {
                tracing::info!(
                    target: "relaychat::timeline::run",
                    "Timeline for scope {} shut down",
                    self.scope
                );
                break;
            }
        }
    }

    fn handle_command(&mut self, command: Command) {
        match command {
            Command::RequestDelete { event_id, reply } => self.request_delete(&event_id, reply),
            Command::SendReaction {
                target_id,
                content,
                reply,
            } => self.send_reaction(target_id, content, reply),
            Command::SendMessage {
                content,
                reply_to,
                reply,
            } => self.send_message(content, reply_to, reply),
            Command::SendJoinRequest { reply } => self.send_join_request(reply),
            Command::PrependPage { events, reply } => {
                let _ = reply.send(self.prepend_page(events));
            }
            Command::Snapshot { reply } => {
                let _ = reply.send(self.snapshot());
            }
            Command::GroupedFor { target_id, reply } => {
                let _ = reply.send(self.reactions.grouped_for(&target_id).clone());
            }
            Command::ReplyDraftLabel { reply_to, reply } => {
                let label = self.resolver.reply_draft_label(
                    &self.window,
                    self.deletion.deleted_set(),
                    &reply_to,
                );
                let _ = reply.send(label);
            }
            Command::QueryDeletion { event_id, reply } => {
                let _ = reply.send(self.deletion.state(&event_id));
            }
            Command::Reopen { scope, reply } => {
                self.reopen(scope);
                let _ = reply.send(());
            }
            Command::Shutdown => self.shutting_down = true,
        }
    }

    fn handle_incoming(&mut self, incoming: IncomingEvent) {
        match incoming {
            IncomingEvent::Chat(event) => {
                let author = event.pubkey;
                let event_id = event.id.clone();
                if self.window.insert(event) {
                    self.ensure_profile(author);
                    self.emit(UpdateTrigger::EventAdded, &event_id);
                }
            }
            IncomingEvent::Withdrawal { target_ids } => {
                for event_id in target_ids {
                    if self.deletion.apply_withdrawal(&event_id) {
                        tracing::debug!(
                            target: "relaychat::timeline::handle_incoming",
                            "Observed withdrawal of {}",
                            event_id
                        );
                        self.window.touch();
                        self.emit(UpdateTrigger::EventDeleted, &event_id);
                    }
                }
            }
        }
    }

    fn handle_reaction(&mut self, record: ReactionRecord) {
        let target_id = record.target_id.clone();
        if self.reactions.ingest(record) {
            self.emit(UpdateTrigger::ReactionAdded, &target_id);
        }
    }

    fn handle_completion(&mut self, completion: Completion) {
        match completion {
            Completion::Deletion {
                ticket,
                result,
                reply,
            } => {
                let outcome = self.deletion.complete(&ticket, result);
                match &outcome {
                    Ok(DeletionOutcome::Deleted) => {
                        self.window.touch();
                        self.emit(UpdateTrigger::EventDeleted, &ticket.event_id);
                    }
                    Err(_) if ticket.optimistic => {
                        self.window.touch();
                        self.emit(UpdateTrigger::DeletionRolledBack, &ticket.event_id);
                    }
                    _ => {}
                }
                let _ = reply.send(outcome);
            }
            Completion::Published {
                generation,
                result,
                reply,
            } => {
                let _ = reply.send(self.settle(generation, result));
            }
            Completion::Reaction {
                generation,
                result,
                reply,
            } => {
                let _ = reply.send(self.settle(generation, result));
            }
            Completion::Profile {
                generation,
                pubkey,
                profile,
            } => {
                if !self.is_current(generation) {
                    return;
                }
                self.profiles.store(pubkey, profile);
                self.streams.emit(
                    &self.scope,
                    TimelineUpdate {
                        trigger: UpdateTrigger::ProfileLoaded,
                        event_id: None,
                    },
                );
            }
        }
    }

    fn request_delete(&mut self, event_id: &str, reply: Reply<DeleteResult>) {
        let Some(viewer) = self.viewer else {
            let _ = reply.send(Err(ActionFailed::local(
                Action::DeleteEvent,
                ReasonCode::DeletionUnauthorized,
                Some(event_id),
                "log in to delete events",
            )));
            return;
        };

        let Some(event) = self.window.get(event_id).cloned() else {
            let result = if self.deletion.is_deleted(event_id) {
                Ok(DeletionOutcome::AlreadyDeleted)
            } else {
                Err(ActionFailed::local(
                    Action::DeleteEvent,
                    ReasonCode::DeletionFailed,
                    Some(event_id),
                    "event is not loaded in this window",
                ))
            };
            let _ = reply.send(result);
            return;
        };

        let is_moderator = self
            .collaborators
            .authorization
            .is_moderator(&viewer, &self.scope);

        let ticket = match self.deletion.begin(&event, &viewer, is_moderator) {
            Ok(BeginOutcome::Issue(ticket)) => ticket,
            Ok(BeginOutcome::AlreadyDeleted) => {
                let _ = reply.send(Ok(DeletionOutcome::AlreadyDeleted));
                return;
            }
            Err(e) => {
                let _ = reply.send(Err(e));
                return;
            }
        };

        if ticket.optimistic {
            self.window.touch();
            self.emit(UpdateTrigger::EventDeleted, event_id);
        }

        let transport = Arc::clone(&self.collaborators.transport);
        let scope = self.scope.clone();
        let completions = self.completion_sender.clone();
        tokio::spawn(async move {
            let result = DeletionCoordinator::issue(transport.as_ref(), &scope, &ticket).await;
            let completion = Completion::Deletion {
                ticket,
                result,
                reply,
            };
            if completions.send(completion).await.is_err() {
                tracing::debug!(
                    target: "relaychat::timeline::request_delete",
                    "Timeline closed before deletion completed"
                );
            }
        });
    }

    fn send_reaction(&self, target_id: String, content: String, reply: Reply<SendResult<()>>) {
        let transport = Arc::clone(&self.collaborators.transport);
        let scope = self.scope.clone();
        let generation = self.deletion.generation();
        let completions = self.completion_sender.clone();
        tokio::spawn(async move {
            let result =
                ReactionAggregator::send_reaction(transport.as_ref(), &scope, &target_id, &content)
                    .await;
            let completion = Completion::Reaction {
                generation,
                result,
                reply,
            };
            if completions.send(completion).await.is_err() {
                tracing::debug!(
                    target: "relaychat::timeline::send_reaction",
                    "Timeline closed before reaction completed"
                );
            }
        });
    }

    fn send_message(
        &self,
        content: String,
        reply_to: Option<String>,
        reply: Reply<SendResult<String>>,
    ) {
        let gate = self.compose_gate();
        let transport = Arc::clone(&self.collaborators.transport);
        let scope = self.scope.clone();
        let generation = self.deletion.generation();
        let completions = self.completion_sender.clone();
        tokio::spawn(async move {
            let result = compose::send_message(
                transport.as_ref(),
                &scope,
                gate,
                &content,
                reply_to.as_deref(),
            )
            .await;
            let completion = Completion::Published {
                generation,
                result,
                reply,
            };
            if completions.send(completion).await.is_err() {
                tracing::debug!(
                    target: "relaychat::timeline::send_message",
                    "Timeline closed before message was published"
                );
            }
        });
    }

    fn send_join_request(&self, reply: Reply<SendResult<String>>) {
        let gate = self.compose_gate();
        let transport = Arc::clone(&self.collaborators.transport);
        let scope = self.scope.clone();
        let generation = self.deletion.generation();
        let completions = self.completion_sender.clone();
        tokio::spawn(async move {
            let result = compose::send_join_request(transport.as_ref(), &scope, gate).await;
            let completion = Completion::Published {
                generation,
                result,
                reply,
            };
            if completions.send(completion).await.is_err() {
                tracing::debug!(
                    target: "relaychat::timeline::send_join_request",
                    "Timeline closed before join request was published"
                );
            }
        });
    }

    fn prepend_page(&mut self, events: Vec<ChatEvent>) -> usize {
        let fresh: Vec<ChatEvent> = events
            .into_iter()
            .filter(|event| !self.window.contains(&event.id))
            .collect();
        let added: Vec<(String, PublicKey)> = fresh
            .iter()
            .map(|event| (event.id.clone(), event.pubkey))
            .collect();

        let count = self.window.prepend_page(fresh);
        for (event_id, author) in added {
            self.ensure_profile(author);
            self.emit(UpdateTrigger::EventAdded, &event_id);
        }
        count
    }

    fn reopen(&mut self, scope: ScopeId) {
        tracing::info!(
            target: "relaychat::timeline::reopen",
            "Reopening timeline: {} -> {}",
            self.scope,
            scope
        );

        self.deletion.reset();
        self.window.clear();
        self.reactions.clear();
        self.profiles.clear();
        self.adjacency = AdjacencyComputer::new();
        self.streams
            .emit(&self.scope, TimelineUpdate::window_reset());

        self.event_feed = self.collaborators.transport.subscribe_events(&scope);
        self.reaction_feed = self.collaborators.transport.subscribe_reactions(&scope);
        self.scope = scope;
        self.streams
            .emit(&self.scope, TimelineUpdate::window_reset());
    }

    fn snapshot(&mut self) -> TimelineSnapshot {
        let ctx = ViewContext {
            window: &self.window,
            deleted: self.deletion.deleted_set(),
            reactions: &self.reactions,
            profiles: &self.profiles,
            classifier: &self.classifier,
            viewer: self.viewer.as_ref(),
        };
        let entries = view::build_entries(&ctx, &mut self.adjacency);

        let mut deleted_ids: Vec<String> = self
            .deletion
            .deleted_set()
            .iter()
            .map(str::to_string)
            .collect();
        deleted_ids.sort();

        TimelineSnapshot {
            scope: self.scope.clone(),
            generation: self.deletion.generation(),
            revision: self.window.revision(),
            entries,
            compose_gate: self.compose_gate(),
            deleted_ids,
        }
    }

    fn compose_gate(&self) -> ComposeGate {
        ComposeGate::evaluate(
            self.viewer.as_ref(),
            &self.scope,
            self.collaborators.authorization.as_ref(),
        )
    }

    fn ensure_profile(&self, pubkey: PublicKey) {
        if !self.profiles.request(&pubkey) {
            return;
        }

        let directory = Arc::clone(&self.collaborators.profiles);
        let generation = self.deletion.generation();
        let completions = self.completion_sender.clone();
        tokio::spawn(async move {
            let profile = ProfileCache::fetch(directory.as_ref(), &pubkey).await;
            let completion = Completion::Profile {
                generation,
                pubkey,
                profile,
            };
            if completions.send(completion).await.is_err() {
                tracing::debug!(
                    target: "relaychat::timeline::ensure_profile",
                    "Timeline closed before profile lookup completed"
                );
            }
        });
    }

    fn settle<T>(
        &self,
        generation: u64,
        result: core::result::Result<T, ActionFailed>,
    ) -> SendResult<T> {
        if !self.is_current(generation) {
            return Ok(SendOutcome::Discarded);
        }
        result.map(SendOutcome::Sent)
    }

    fn is_current(&self, generation: u64) -> bool {
        let current = self.deletion.generation();
        if generation != current {
            tracing::debug!(
                target: "relaychat::timeline::is_current",
                "Discarding result from generation {} (current {})",
                generation,
                current
            );
        }
        generation == current
    }

    fn emit(&self, trigger: UpdateTrigger, event_id: &str) {
        self.streams
            .emit(&self.scope, TimelineUpdate::for_event(trigger, event_id));
    }
}

/// Cloneable handle to a running timeline. Dropping every handle stops the timeline.
#[derive(Clone)]
pub struct TimelineHandle {
    commands: Sender<Command>,
    streams: Arc<TimelineStreamManager>,
}

impl TimelineHandle {
    /// Withdraws `event_id` as the viewer, through the self or moderator path.
    pub async fn request_delete(&self, event_id: impl Into<String>) -> Result<DeletionOutcome> {
        let event_id = event_id.into();
        self.call(|reply| Command::RequestDelete { event_id, reply })
            .await?
            .map_err(TimelineError::from)
    }

    /// Sends a reaction. It is counted once it echoes back through the subscription.
    pub async fn send_reaction(
        &self,
        target_id: impl Into<String>,
        content: impl Into<String>,
    ) -> Result<SendOutcome<()>> {
        let target_id = target_id.into();
        let content = content.into();
        self.call(|reply| Command::SendReaction {
            target_id,
            content,
            reply,
        })
        .await?
        .map_err(TimelineError::from)
    }

    pub async fn send_message(
        &self,
        content: impl Into<String>,
        reply_to: Option<&str>,
    ) -> Result<SendOutcome<String>> {
        let content = content.into();
        let reply_to = reply_to.map(str::to_string);
        self.call(|reply| Command::SendMessage {
            content,
            reply_to,
            reply,
        })
        .await?
        .map_err(TimelineError::from)
    }

    pub async fn send_thumbs_up(&self) -> Result<SendOutcome<String>> {
        self.send_message(THUMBS_UP, None).await
    }

    pub async fn send_join_request(&self) -> Result<SendOutcome<String>> {
        self.call(|reply| Command::SendJoinRequest { reply })
            .await?
            .map_err(TimelineError::from)
    }

    /// Merges an older page into the window, returning how many events were new.
    pub async fn prepend_page(&self, events: Vec<ChatEvent>) -> Result<usize> {
        self.call(|reply| Command::PrependPage { events, reply })
            .await
    }

    pub async fn snapshot(&self) -> Result<TimelineSnapshot> {
        self.call(|reply| Command::Snapshot { reply }).await
    }

    pub async fn grouped_for(&self, target_id: impl Into<String>) -> Result<GroupedReactions> {
        let target_id = target_id.into();
        self.call(|reply| Command::GroupedFor { target_id, reply })
            .await
    }

    /// Text for the composer's "Replying to" bar.
    pub async fn reply_draft_label(&self, reply_to: impl Into<String>) -> Result<String> {
        let reply_to = reply_to.into();
        self.call(|reply| Command::ReplyDraftLabel { reply_to, reply })
            .await
    }

    pub async fn deletion_state(&self, event_id: impl Into<String>) -> Result<DeletionState> {
        let event_id = event_id.into();
        self.call(|reply| Command::QueryDeletion { event_id, reply })
            .await
    }

    /// Tears the window down and opens `scope` in its place. Results of calls still in
    /// flight are discarded.
    pub async fn reopen(&self, scope: ScopeId) -> Result<()> {
        self.call(|reply| Command::Reopen { scope, reply }).await
    }

    /// Stops the timeline. Calling it on a stopped timeline is not an error.
    pub async fn shutdown(&self) -> Result<()> {
        if self.commands.send(Command::Shutdown).await.is_err() {
            tracing::debug!(
                target: "relaychat::timeline::shutdown",
                "Timeline already closed"
            );
        }
        Ok(())
    }

    pub fn is_closed(&self) -> bool {
        self.commands.is_closed()
    }

    /// Live updates for `scope`.
    pub fn subscribe(&self, scope: &ScopeId) -> broadcast::Receiver<TimelineUpdate> {
        self.streams.subscribe(scope)
    }

    async fn call<T>(&self, command: impl FnOnce(Reply<T>) -> Command) -> Result<T> {
        let (reply, response) = oneshot::channel();
        self.commands
            .send(command(reply))
            .await
            .map_err(|_| TimelineError::TimelineClosed)?;
        response.await.map_err(|_| TimelineError::TimelineClosed)
    }
}
