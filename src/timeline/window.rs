//! The currently loaded, ordered slice of a chat.

use std::collections::HashMap;

use crate::types::ChatEvent;

/// Events ordered oldest to newest by `(created_at, id)`, deduplicated by id.
///
/// Every mutation bumps `revision`; anything derived from the window (adjacency in
/// particular) is keyed on it and must be recomputed when it changes.
#[derive(Debug, Clone, Default)]
pub struct ChatWindow {
    events: Vec<ChatEvent>,
    /// Id to index into `events`, kept in step with every insert
    positions: HashMap<String, usize>,
    revision: u64,
}

impl ChatWindow {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_events<I>(events: I) -> Self
    where
        I: IntoIterator<Item = ChatEvent>,
    {
        let mut window = Self::new();
        window.extend(events);
        window
    }

    /// Inserts `event` at its ordered position. Returns `false` for a duplicate id.
    pub fn insert(&mut self, event: ChatEvent) -> bool {
        if self.positions.contains_key(&event.id) {
            tracing::debug!(
                target: "relaychat::timeline::window::insert",
                "Ignoring duplicate event {}",
                event.id
            );
            return false;
        }

        let index = self
            .events
            .partition_point(|existing| sort_key(existing) <= sort_key(&event));
        self.events.insert(index, event);
        self.reindex_from(index);
        self.revision += 1;
        true
    }

    /// Inserts several events, returning how many were new.
    pub fn extend<I>(&mut self, events: I) -> usize
    where
        I: IntoIterator<Item = ChatEvent>,
    {
        events
            .into_iter()
            .map(|event| self.insert(event))
            .filter(|inserted| *inserted)
            .count()
    }

    /// Merges an older page loaded by scrolling up.
    pub fn prepend_page(&mut self, page: Vec<ChatEvent>) -> usize {
        let added = self.extend(page);
        tracing::debug!(
            target: "relaychat::timeline::window::prepend_page",
            "Merged {} older events, window now holds {}",
            added,
            self.events.len()
        );
        added
    }

    /// Marks the window as changed without touching its events, e.g. when the
    /// DeletedSet changes how an entry renders.
    pub fn touch(&mut self) {
        self.revision += 1;
    }

    pub fn clear(&mut self) {
        self.events.clear();
        self.positions.clear();
        self.revision += 1;
    }

    pub fn get(&self, id: &str) -> Option<&ChatEvent> {
        self.position_of(id).and_then(|index| self.events.get(index))
    }

    pub fn contains(&self, id: &str) -> bool {
        self.positions.contains_key(id)
    }

    pub fn position_of(&self, id: &str) -> Option<usize> {
        self.positions.get(id).copied()
    }

    pub fn events(&self) -> &[ChatEvent] {
        &self.events
    }

    pub fn first(&self) -> Option<&ChatEvent> {
        self.events.first()
    }

    pub fn last(&self) -> Option<&ChatEvent> {
        self.events.last()
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    pub fn revision(&self) -> u64 {
        self.revision
    }

    // Everything from `start` on shifted by one.
    fn reindex_from(&mut self, start: usize) {
        for (index, event) in self.events.iter().enumerate().skip(start) {
            self.positions.insert(event.id.clone(), index);
        }
    }
}

fn sort_key(event: &ChatEvent) -> (u64, &str) {
    (event.created_at.as_u64(), event.id.as_str())
}
