//! Display-ready records assembled from the window and the component state.

use chrono::DateTime;
use nostr_sdk::prelude::*;

use super::adjacency::{AdjacencyComputer, WindowPosition};
use super::classifier::EventClassifier;
use super::content_parser::ContentParser;
use super::deletion::DeletedSet;
use super::profiles::ProfileCache;
use super::reactions::{GroupedReactions, ReactionAggregator};
use super::thread_resolver::{ReplyResolution, ThreadResolver};
use super::window::ChatWindow;
use crate::types::{Category, ChatEvent, Profile};

const TIME_FORMAT: &str = "%Y-%m-%d %H:%M";

/// One renderable message.
#[derive(Debug, Clone, PartialEq)]
pub struct DisplayRecord {
    pub event: ChatEvent,
    pub category: Category,

    /// Raw identifier to show instead of the body when unclassified
    pub fallback_label: Option<String>,
    pub plain_text: String,
    pub first_image: Option<String>,
    pub position: WindowPosition,
    pub reply: ReplyResolution,

    /// Name of the reply parent's author once their profile has loaded
    pub reply_author: Option<String>,
    pub reactions: GroupedReactions,
    pub author_label: String,
    pub is_own: bool,
    pub formatted_time: String,
}

/// Window entries, in window order. Withdrawn events keep their slot as tombstones.
#[derive(Debug, Clone, PartialEq)]
pub enum TimelineEntry {
    Message(Box<DisplayRecord>),
    Tombstone {
        event_id: String,
        author: PublicKey,
        position: WindowPosition,
    },
}

impl TimelineEntry {
    pub fn event_id(&self) -> &str {
        match self {
            TimelineEntry::Message(record) => &record.event.id,
            TimelineEntry::Tombstone { event_id, .. } => event_id,
        }
    }

    pub fn is_tombstone(&self) -> bool {
        matches!(self, TimelineEntry::Tombstone { .. })
    }

    pub fn as_message(&self) -> Option<&DisplayRecord> {
        match self {
            TimelineEntry::Message(record) => Some(record),
            TimelineEntry::Tombstone { .. } => None,
        }
    }
}

/// Read-only views over the timeline state needed to assemble entries.
pub struct ViewContext<'a> {
    pub window: &'a ChatWindow,
    pub deleted: &'a DeletedSet,
    pub reactions: &'a ReactionAggregator,
    pub profiles: &'a ProfileCache,
    pub classifier: &'a EventClassifier,
    pub viewer: Option<&'a PublicKey>,
}

pub fn build_entries(
    ctx: &ViewContext<'_>,
    adjacency: &mut AdjacencyComputer,
) -> Vec<TimelineEntry> {
    let parser = ContentParser::new();
    let resolver = ThreadResolver::new();
    let positions = adjacency.positions(ctx.window);

    ctx.window
        .events()
        .iter()
        .map(|event| {
            let position = positions
                .get(&event.id)
                .cloned()
                .unwrap_or_else(|| AdjacencyComputer::compute(ctx.window, event));

            if ctx.deleted.contains(&event.id) {
                return TimelineEntry::Tombstone {
                    event_id: event.id.clone(),
                    author: event.pubkey,
                    position,
                };
            }

            let category = ctx.classifier.classify(event);
            let reply = resolver.resolve_reply(ctx.window, ctx.deleted, event);
            let reply_author = reply
                .preview()
                .and_then(|preview| ThreadResolver::parent_author_name(ctx.profiles, preview));
            let author = ctx.profiles.get(&event.pubkey);

            TimelineEntry::Message(Box::new(DisplayRecord {
                category,
                fallback_label: (category == Category::Unclassified)
                    .then(|| EventClassifier::fallback_label(event).to_string()),
                plain_text: parser.extract_plain_text(&event.content),
                first_image: parser.extract_first_image(&event.content),
                position,
                reply,
                reply_author,
                reactions: ctx.reactions.grouped_for(&event.id).clone(),
                author_label: Profile::display_label(author.as_ref(), &event.pubkey),
                is_own: ctx.viewer == Some(&event.pubkey),
                formatted_time: format_timestamp(event.created_at),
                event: event.clone(),
            }))
        })
        .collect()
}

/// UTC `YYYY-MM-DD HH:MM`; raw seconds if the timestamp is out of chrono's range.
pub fn format_timestamp(timestamp: Timestamp) -> String {
    let secs = timestamp.as_u64();
    i64::try_from(secs)
        .ok()
        .and_then(|secs| DateTime::from_timestamp(secs, 0))
        .map(|dt| dt.format(TIME_FORMAT).to_string())
        .unwrap_or_else(|| secs.to_string())
}
