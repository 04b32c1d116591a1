//! Position attributes of an event inside the window.
//!
//! These drive grouped rendering (one avatar per run of messages from the same
//! author), bottom anchoring, and the top-of-window header used for pagination.

use std::collections::HashMap;

use nostr_sdk::prelude::*;
use serde::{Deserialize, Serialize};

use super::window::ChatWindow;
use crate::types::ChatEvent;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WindowPosition {
    pub event_id: String,

    /// First element of the window
    pub is_boundary_top: bool,

    /// Last element of the window; keeps the scroll anchored to the bottom
    pub is_boundary_bottom: bool,

    /// The next element has the same author
    pub is_same_author_as_next: bool,

    /// Author of the first element, for the sticky header
    pub top_author: Option<PublicKey>,

    /// Window revision this position was computed for
    pub revision: u64,
}

/// Computes positions and caches them for one window revision.
#[derive(Debug, Default)]
pub struct AdjacencyComputer {
    revision: Option<u64>,
    positions: HashMap<String, WindowPosition>,
}

impl AdjacencyComputer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Position of `event` relative to `window`, computed from scratch.
    pub fn compute(window: &ChatWindow, event: &ChatEvent) -> WindowPosition {
        let events = window.events();
        let index = window.position_of(&event.id);

        let is_same_author_as_next = index
            .and_then(|i| events.get(i + 1))
            .is_some_and(|next| next.pubkey == event.pubkey);

        WindowPosition {
            event_id: event.id.clone(),
            is_boundary_top: window.first().is_some_and(|first| first.id == event.id),
            is_boundary_bottom: window.last().is_some_and(|last| last.id == event.id),
            is_same_author_as_next,
            top_author: window.first().map(|first| first.pubkey),
            revision: window.revision(),
        }
    }

    /// Whether the cached positions belong to an older window revision.
    pub fn is_stale(&self, window: &ChatWindow) -> bool {
        self.revision != Some(window.revision())
    }

    /// All positions for `window`, recomputed whenever its revision changed.
    pub fn positions(&mut self, window: &ChatWindow) -> &HashMap<String, WindowPosition> {
        if self.is_stale(window) {
            let events = window.events();
            let top_author = events.first().map(|first| first.pubkey);
            let last_index = events.len().saturating_sub(1);

            self.positions = events
                .iter()
                .enumerate()
                .map(|(i, event)| {
                    let position = WindowPosition {
                        event_id: event.id.clone(),
                        is_boundary_top: i == 0,
                        is_boundary_bottom: i == last_index,
                        is_same_author_as_next: events
                            .get(i + 1)
                            .is_some_and(|next| next.pubkey == event.pubkey),
                        top_author,
                        revision: window.revision(),
                    };
                    (event.id.clone(), position)
                })
                .collect();
            self.revision = Some(window.revision());

            tracing::debug!(
                target: "relaychat::timeline::adjacency::positions",
                "Recomputed {} positions for window revision {}",
                self.positions.len(),
                window.revision()
            );
        }
        &self.positions
    }

    pub fn position(&mut self, window: &ChatWindow, event_id: &str) -> Option<&WindowPosition> {
        self.positions(window).get(event_id)
    }
}
