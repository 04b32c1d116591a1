//! Per-scope broadcast of timeline changes.
//!
//! Streams are created lazily on subscribe and dropped on the next emit after every
//! receiver has gone away.

use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

use crate::types::ScopeId;

pub const DEFAULT_STREAM_BUFFER: usize = 100;

/// What changed in the timeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum UpdateTrigger {
    /// A new event entered the window (live or from an older page)
    EventAdded,

    /// A reaction was ingested for this event
    ReactionAdded,

    /// The event now renders as a tombstone
    EventDeleted,

    /// An optimistic deletion failed and the event is visible again
    DeletionRolledBack,

    /// An author profile became available
    ProfileLoaded,

    /// The window was torn down and reopened
    WindowReset,
}

/// A single change pushed to subscribers. Subscribers take a fresh snapshot to render
/// the current state of `event_id`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimelineUpdate {
    pub trigger: UpdateTrigger,

    /// Affected event, or `None` when the change is not tied to one event
    pub event_id: Option<String>,
}

impl TimelineUpdate {
    pub fn for_event(trigger: UpdateTrigger, event_id: impl Into<String>) -> Self {
        Self {
            trigger,
            event_id: Some(event_id.into()),
        }
    }

    pub fn window_reset() -> Self {
        Self {
            trigger: UpdateTrigger::WindowReset,
            event_id: None,
        }
    }
}

#[derive(Debug)]
pub struct TimelineStreamManager {
    streams: DashMap<ScopeId, broadcast::Sender<TimelineUpdate>>,
    buffer: usize,
}

impl TimelineStreamManager {
    pub fn new() -> Self {
        Self::with_buffer(DEFAULT_STREAM_BUFFER)
    }

    pub fn with_buffer(buffer: usize) -> Self {
        Self {
            streams: DashMap::new(),
            buffer: buffer.max(1),
        }
    }

    pub fn subscribe(&self, scope: &ScopeId) -> broadcast::Receiver<TimelineUpdate> {
        self.streams
            .entry(scope.clone())
            .or_insert_with(|| broadcast::channel(self.buffer).0)
            .subscribe()
    }

    pub fn emit(&self, scope: &ScopeId, update: TimelineUpdate) {
        if let Some(sender) = self.streams.get(scope) {
            if sender.send(update).is_err() && sender.receiver_count() == 0 {
                drop(sender);
                self.streams.remove(scope);
                tracing::debug!(
                    target: "relaychat::timeline::streaming::emit",
                    "Dropped stream for scope {} with no receivers",
                    scope
                );
            }
        }
    }
}

impl Default for TimelineStreamManager {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scope(name: &str) -> ScopeId {
        ScopeId::new(name)
    }

    #[test]
    fn subscribe_creates_stream_lazily() {
        let manager = TimelineStreamManager::new();
        let group = scope("group-a");
        assert!(!manager.streams.contains_key(&group));

        let _rx = manager.subscribe(&group);
        assert!(manager.streams.contains_key(&group));
    }

    #[test]
    fn subscribers_share_one_sender() {
        let manager = TimelineStreamManager::new();
        let group = scope("group-b");

        let _rx1 = manager.subscribe(&group);
        let _rx2 = manager.subscribe(&group);

        assert_eq!(manager.streams.len(), 1);
        assert_eq!(manager.streams.get(&group).unwrap().receiver_count(), 2);
    }

    #[tokio::test]
    async fn emit_delivers_to_receivers() {
        let manager = TimelineStreamManager::new();
        let group = scope("group-c");
        let mut rx = manager.subscribe(&group);

        manager.emit(
            &group,
            TimelineUpdate::for_event(UpdateTrigger::ReactionAdded, "msg1"),
        );

        let received = rx.try_recv().expect("should receive update");
        assert_eq!(received.trigger, UpdateTrigger::ReactionAdded);
        assert_eq!(received.event_id.as_deref(), Some("msg1"));
    }

    #[test]
    fn emit_without_subscribers_is_noop() {
        let manager = TimelineStreamManager::new();
        let group = scope("group-d");

        manager.emit(&group, TimelineUpdate::window_reset());
        assert!(!manager.streams.contains_key(&group));
    }

    #[test]
    fn emit_cleans_up_when_all_receivers_dropped() {
        let manager = TimelineStreamManager::new();
        let group = scope("group-e");

        let rx = manager.subscribe(&group);
        drop(rx);
        assert!(manager.streams.contains_key(&group));

        manager.emit(
            &group,
            TimelineUpdate::for_event(UpdateTrigger::EventAdded, "msg3"),
        );
        assert!(!manager.streams.contains_key(&group));
    }

    #[test]
    fn zero_buffer_is_clamped() {
        let manager = TimelineStreamManager::with_buffer(0);
        let _rx = manager.subscribe(&scope("group-f"));
        assert_eq!(manager.buffer, 1);
    }

    #[test]
    fn trigger_serializes_by_name() {
        let json = serde_json::to_string(&UpdateTrigger::DeletionRolledBack).unwrap();
        assert_eq!(json, "\"DeletionRolledBack\"");
    }
}
