//! Local withdrawal of chat events.
//!
//! Two mutually exclusive authorization paths exist. Authors withdraw their own events
//! (self-delete); moderators withdraw anyone else's event at scope level
//! (moderator-delete). The path is decided once per request as a [`DeletionPath`].
//!
//! Per event id the coordinator walks
//! `present -> pendingDeletion -> deleted | deletionFailed`, where `deleted` is terminal
//! and `deletionFailed` may be retried. Completed network calls are matched against the
//! generation they were issued under, so results that arrive after the window was torn
//! down are dropped instead of mutating a window that no longer exists.

use std::collections::{HashMap, HashSet};

use nostr_sdk::prelude::*;

use crate::collaborators::{Transport, TransportError};
use crate::error::{Action, ActionFailed, ReasonCode};
use crate::types::{ChatEvent, ScopeId};

#[derive(Debug, Clone, Default, Eq, PartialEq)]
pub struct DeletionConfig {
    /// Hide moderator deletions immediately and roll them back if the request fails.
    /// Self-deletes are never optimistic.
    pub optimistic_moderator_deletes: bool,
}

/// Authorization decision for one deletion request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeletionPath {
    SelfDelete,
    ModeratorDelete,
    Unauthorized,
}

impl DeletionPath {
    pub fn decide(event: &ChatEvent, acting: &PublicKey, is_moderator: bool) -> Self {
        if *acting == event.pubkey {
            DeletionPath::SelfDelete
        } else if is_moderator {
            DeletionPath::ModeratorDelete
        } else {
            DeletionPath::Unauthorized
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeletionState {
    Present,
    PendingDeletion {
        path: DeletionPath,
        /// State to return to if a moderator delete fails
        previous: Box<DeletionState>,
    },
    Deleted,
    DeletionFailed {
        reason: String,
    },
}

/// Ids withdrawn in the current window. Only [`DeletionCoordinator`] mutates it.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DeletedSet {
    ids: HashSet<String>,
}

impl DeletedSet {
    pub fn contains(&self, id: &str) -> bool {
        self.ids.contains(id)
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.ids.iter().map(String::as_str)
    }

    fn insert(&mut self, id: &str) -> bool {
        self.ids.insert(id.to_string())
    }

    fn remove(&mut self, id: &str) -> bool {
        self.ids.remove(id)
    }

    fn clear(&mut self) {
        self.ids.clear();
    }
}

/// A deletion request that must be sent to the transport.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeletionTicket {
    pub event_id: String,
    pub path: DeletionPath,
    pub generation: u64,
    /// The id was hidden before the request completed
    pub optimistic: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BeginOutcome {
    /// Send this ticket to the transport, then hand the result to `complete`
    Issue(DeletionTicket),
    /// Nothing to do; the event is already withdrawn
    AlreadyDeleted,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeletionOutcome {
    Deleted,
    AlreadyDeleted,
    /// The window was torn down before the request resolved
    Discarded,
}

#[derive(Debug, Default)]
pub struct DeletionCoordinator {
    config: DeletionConfig,
    states: HashMap<String, DeletionState>,
    deleted: DeletedSet,
    generation: u64,
}

impl DeletionCoordinator {
    pub fn new() -> Self {
        Self::with_config(DeletionConfig::default())
    }

    pub fn with_config(config: DeletionConfig) -> Self {
        Self {
            config,
            states: HashMap::new(),
            deleted: DeletedSet::default(),
            generation: 0,
        }
    }

    pub fn deleted_set(&self) -> &DeletedSet {
        &self.deleted
    }

    pub fn is_deleted(&self, id: &str) -> bool {
        self.deleted.contains(id)
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn state(&self, id: &str) -> DeletionState {
        self.states
            .get(id)
            .cloned()
            .unwrap_or(DeletionState::Present)
    }

    pub fn is_pending(&self, id: &str) -> bool {
        matches!(
            self.states.get(id),
            Some(DeletionState::PendingDeletion { .. })
        )
    }

    pub fn pending_count(&self) -> usize {
        self.states
            .values()
            .filter(|state| matches!(state, DeletionState::PendingDeletion { .. }))
            .count()
    }

    /// Validates a request and moves the event to `pendingDeletion`.
    ///
    /// Rejections (`unauthorized`, `alreadyPending`) never leave the process and never
    /// touch the DeletedSet.
    pub fn begin(
        &mut self,
        event: &ChatEvent,
        acting: &PublicKey,
        is_moderator: bool,
    ) -> Result<BeginOutcome, ActionFailed> {
        let current = self.state(&event.id);
        match current {
            DeletionState::Deleted => return Ok(BeginOutcome::AlreadyDeleted),
            DeletionState::PendingDeletion { .. } => {
                return Err(ActionFailed::local(
                    Action::DeleteEvent,
                    ReasonCode::DuplicateDeletionPending,
                    Some(&event.id),
                    "a deletion for this event is already in flight",
                ));
            }
            DeletionState::Present | DeletionState::DeletionFailed { .. } => {}
        }

        let path = DeletionPath::decide(event, acting, is_moderator);
        if path == DeletionPath::Unauthorized {
            tracing::debug!(
                target: "relaychat::timeline::deletion::begin",
                "{} may not delete event {} by {}",
                acting.to_hex(),
                event.id,
                event.pubkey.to_hex()
            );
            return Err(ActionFailed::local(
                Action::DeleteEvent,
                ReasonCode::DeletionUnauthorized,
                Some(&event.id),
                "only the author or a moderator can delete this event",
            ));
        }

        let optimistic =
            path == DeletionPath::ModeratorDelete && self.config.optimistic_moderator_deletes;
        if optimistic {
            self.deleted.insert(&event.id);
        }

        self.states.insert(
            event.id.clone(),
            DeletionState::PendingDeletion {
                path,
                previous: Box::new(current),
            },
        );

        tracing::debug!(
            target: "relaychat::timeline::deletion::begin",
            "Deletion of {} pending via {:?} (generation {})",
            event.id,
            path,
            self.generation
        );

        Ok(BeginOutcome::Issue(DeletionTicket {
            event_id: event.id.clone(),
            path,
            generation: self.generation,
            optimistic,
        }))
    }

    /// Applies the transport's answer for `ticket`.
    pub fn complete(
        &mut self,
        ticket: &DeletionTicket,
        result: Result<(), TransportError>,
    ) -> Result<DeletionOutcome, ActionFailed> {
        if ticket.generation != self.generation {
            tracing::debug!(
                target: "relaychat::timeline::deletion::complete",
                "Discarding result for {} from generation {} (current {})",
                ticket.event_id,
                ticket.generation,
                self.generation
            );
            return Ok(DeletionOutcome::Discarded);
        }

        let previous = match self.states.get(&ticket.event_id) {
            Some(DeletionState::PendingDeletion { previous, .. }) => (**previous).clone(),
            // A withdrawal observed on the log settled it while we waited.
            Some(DeletionState::Deleted) => return Ok(DeletionOutcome::AlreadyDeleted),
            _ => {
                tracing::warn!(
                    target: "relaychat::timeline::deletion::complete",
                    "No pending deletion for {}, ignoring result",
                    ticket.event_id
                );
                return Ok(DeletionOutcome::Discarded);
            }
        };

        match result {
            Ok(()) => {
                self.mark_deleted(&ticket.event_id);
                tracing::info!(
                    target: "relaychat::timeline::deletion::complete",
                    "Event {} deleted via {:?}",
                    ticket.event_id,
                    ticket.path
                );
                Ok(DeletionOutcome::Deleted)
            }
            Err(e) => {
                tracing::warn!(
                    target: "relaychat::timeline::deletion::complete",
                    "Deletion of {} via {:?} failed: {}",
                    ticket.event_id,
                    ticket.path,
                    e
                );

                if ticket.optimistic {
                    self.deleted.remove(&ticket.event_id);
                }

                match ticket.path {
                    DeletionPath::SelfDelete => {
                        self.states.insert(
                            ticket.event_id.clone(),
                            DeletionState::DeletionFailed {
                                reason: e.to_string(),
                            },
                        );
                    }
                    _ => self.restore(&ticket.event_id, previous),
                }

                Err(ActionFailed::from_transport(
                    Action::DeleteEvent,
                    ReasonCode::DeletionFailed,
                    Some(&ticket.event_id),
                    &e,
                ))
            }
        }
    }

    /// A withdrawal seen on the log. Converges to `deleted` whatever is pending locally.
    /// Returns `true` if the id was not already withdrawn.
    pub fn apply_withdrawal(&mut self, event_id: &str) -> bool {
        let newly = !self.is_deleted(event_id);
        self.mark_deleted(event_id);
        newly
    }

    /// Forgets everything and invalidates in-flight results. Called when the window is
    /// torn down.
    pub fn reset(&mut self) {
        self.generation += 1;
        self.states.clear();
        self.deleted.clear();
    }

    /// Sends `ticket` through the transport call matching its path.
    pub async fn issue(
        transport: &dyn Transport,
        scope: &ScopeId,
        ticket: &DeletionTicket,
    ) -> Result<(), TransportError> {
        match ticket.path {
            DeletionPath::SelfDelete => transport.delete_own_event(&ticket.event_id).await,
            DeletionPath::ModeratorDelete => {
                transport
                    .delete_scoped_event(scope, &ticket.event_id)
                    .await
            }
            DeletionPath::Unauthorized => Err(TransportError::Unauthorized(
                "unauthorized deletions are never issued".to_string(),
            )),
        }
    }

    fn mark_deleted(&mut self, event_id: &str) {
        self.states
            .insert(event_id.to_string(), DeletionState::Deleted);
        self.deleted.insert(event_id);
    }

    fn restore(&mut self, event_id: &str, previous: DeletionState) {
        match previous {
            DeletionState::Present => {
                self.states.remove(event_id);
            }
            other => {
                self.states.insert(event_id.to_string(), other);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn event(id: &str, author: PublicKey) -> ChatEvent {
        ChatEvent::new(id, author, "hello", Timestamp::from(1), Tags::new())
    }

    fn ticket(outcome: BeginOutcome) -> DeletionTicket {
        match outcome {
            BeginOutcome::Issue(ticket) => ticket,
            other => panic!("expected a ticket, got {:?}", other),
        }
    }

    fn network_error() -> TransportError {
        TransportError::Network("relay unreachable".to_string())
    }

    #[test]
    fn test_decide_paths() {
        let author = Keys::generate().public_key();
        let other = Keys::generate().public_key();
        let e = event("1", author);

        assert_eq!(DeletionPath::decide(&e, &author, false), DeletionPath::SelfDelete);
        assert_eq!(DeletionPath::decide(&e, &author, true), DeletionPath::SelfDelete);
        assert_eq!(
            DeletionPath::decide(&e, &other, true),
            DeletionPath::ModeratorDelete
        );
        assert_eq!(
            DeletionPath::decide(&e, &other, false),
            DeletionPath::Unauthorized
        );
    }

    #[test]
    fn test_self_delete_success() {
        let author = Keys::generate().public_key();
        let e = event("1", author);
        let mut coordinator = DeletionCoordinator::new();

        let t = ticket(coordinator.begin(&e, &author, false).unwrap());
        assert_eq!(t.path, DeletionPath::SelfDelete);
        assert!(!t.optimistic);
        assert!(coordinator.is_pending("1"));
        // Never hidden before the authoritative call completes.
        assert!(!coordinator.is_deleted("1"));

        let outcome = coordinator.complete(&t, Ok(())).unwrap();
        assert_eq!(outcome, DeletionOutcome::Deleted);
        assert!(coordinator.is_deleted("1"));
        assert_eq!(coordinator.state("1"), DeletionState::Deleted);
    }

    #[test]
    fn test_self_delete_failure_is_retryable() {
        let author = Keys::generate().public_key();
        let e = event("1", author);
        let mut coordinator = DeletionCoordinator::new();

        let t = ticket(coordinator.begin(&e, &author, false).unwrap());
        let err = coordinator.complete(&t, Err(network_error())).unwrap_err();
        assert_eq!(err.reason, ReasonCode::DeletionFailed);
        assert!(!coordinator.is_deleted("1"));
        assert!(matches!(
            coordinator.state("1"),
            DeletionState::DeletionFailed { .. }
        ));

        let retry = ticket(coordinator.begin(&e, &author, false).unwrap());
        assert!(coordinator.is_pending("1"));
        assert_eq!(
            coordinator.complete(&retry, Ok(())).unwrap(),
            DeletionOutcome::Deleted
        );
    }

    #[test]
    fn test_unauthorized_is_rejected_locally() {
        let author = Keys::generate().public_key();
        let stranger = Keys::generate().public_key();
        let e = event("1", author);
        let mut coordinator = DeletionCoordinator::new();

        let err = coordinator.begin(&e, &stranger, false).unwrap_err();
        assert_eq!(err.reason, ReasonCode::DeletionUnauthorized);
        assert!(coordinator.deleted_set().is_empty());
        assert_eq!(coordinator.state("1"), DeletionState::Present);
    }

    #[test]
    fn test_duplicate_request_while_pending() {
        let author = Keys::generate().public_key();
        let e = event("1", author);
        let mut coordinator = DeletionCoordinator::new();

        let _t = ticket(coordinator.begin(&e, &author, false).unwrap());
        let err = coordinator.begin(&e, &author, false).unwrap_err();
        assert_eq!(err.reason, ReasonCode::DuplicateDeletionPending);
        assert_eq!(coordinator.pending_count(), 1);
    }

    #[test]
    fn test_deleted_is_terminal_and_idempotent() {
        let author = Keys::generate().public_key();
        let e = event("1", author);
        let mut coordinator = DeletionCoordinator::new();

        let t = ticket(coordinator.begin(&e, &author, false).unwrap());
        coordinator.complete(&t, Ok(())).unwrap();

        assert_eq!(
            coordinator.begin(&e, &author, false).unwrap(),
            BeginOutcome::AlreadyDeleted
        );
        assert!(coordinator.is_deleted("1"));
    }

    #[test]
    fn test_moderator_delete_failure_leaves_state_unchanged() {
        let author = Keys::generate().public_key();
        let moderator = Keys::generate().public_key();
        let e = event("1", author);
        let mut coordinator = DeletionCoordinator::new();

        let t = ticket(coordinator.begin(&e, &moderator, true).unwrap());
        assert_eq!(t.path, DeletionPath::ModeratorDelete);

        let err = coordinator.complete(&t, Err(network_error())).unwrap_err();
        assert_eq!(err.reason, ReasonCode::DeletionFailed);
        assert_eq!(coordinator.state("1"), DeletionState::Present);
        assert!(!coordinator.is_deleted("1"));
    }

    #[test]
    fn test_moderator_delete_success() {
        let author = Keys::generate().public_key();
        let moderator = Keys::generate().public_key();
        let e = event("1", author);
        let mut coordinator = DeletionCoordinator::new();

        let t = ticket(coordinator.begin(&e, &moderator, true).unwrap());
        assert!(!coordinator.is_deleted("1"));
        coordinator.complete(&t, Ok(())).unwrap();
        assert!(coordinator.is_deleted("1"));
    }

    #[test]
    fn test_optimistic_moderator_delete_rolls_back() {
        let author = Keys::generate().public_key();
        let moderator = Keys::generate().public_key();
        let e = event("1", author);
        let mut coordinator = DeletionCoordinator::with_config(DeletionConfig {
            optimistic_moderator_deletes: true,
        });

        let t = ticket(coordinator.begin(&e, &moderator, true).unwrap());
        assert!(t.optimistic);
        assert!(coordinator.is_deleted("1"));

        coordinator.complete(&t, Err(network_error())).unwrap_err();
        assert!(!coordinator.is_deleted("1"));
        assert_eq!(coordinator.state("1"), DeletionState::Present);
    }

    #[test]
    fn test_optimistic_never_applies_to_self_delete() {
        let author = Keys::generate().public_key();
        let e = event("1", author);
        let mut coordinator = DeletionCoordinator::with_config(DeletionConfig {
            optimistic_moderator_deletes: true,
        });

        let t = ticket(coordinator.begin(&e, &author, true).unwrap());
        assert!(!t.optimistic);
        assert!(!coordinator.is_deleted("1"));
    }

    #[test]
    fn test_stale_generation_is_discarded() {
        let author = Keys::generate().public_key();
        let e = event("1", author);
        let mut coordinator = DeletionCoordinator::new();

        let t = ticket(coordinator.begin(&e, &author, false).unwrap());
        coordinator.reset();

        assert_eq!(
            coordinator.complete(&t, Ok(())).unwrap(),
            DeletionOutcome::Discarded
        );
        assert!(!coordinator.is_deleted("1"));
        assert_eq!(coordinator.state("1"), DeletionState::Present);
        assert_eq!(coordinator.generation(), 1);
    }

    #[test]
    fn test_remote_withdrawal_wins_over_local_failure() {
        let author = Keys::generate().public_key();
        let moderator = Keys::generate().public_key();
        let e = event("1", author);
        let mut coordinator = DeletionCoordinator::new();

        let t = ticket(coordinator.begin(&e, &author, false).unwrap());
        assert!(coordinator.apply_withdrawal("1"));
        assert!(!coordinator.apply_withdrawal("1"));

        let outcome = coordinator.complete(&t, Err(network_error())).unwrap();
        assert_eq!(outcome, DeletionOutcome::AlreadyDeleted);
        assert!(coordinator.is_deleted("1"));

        assert_eq!(
            coordinator.begin(&e, &moderator, true).unwrap(),
            BeginOutcome::AlreadyDeleted
        );
    }
}
