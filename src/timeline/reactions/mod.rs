//! Reaction Aggregation Module
//!
//! Maintains a live index from target event id to reactions grouped by content. Records
//! arrive through the reaction subscription and are appended in arrival order; no
//! reordering by timestamp happens here, matching the weak ordering of the log.
//!
//! Reactions for targets that have not arrived yet are retained and show up as soon as
//! the target is looked up.

mod emoji_utils;

use std::collections::{HashMap, HashSet};

pub use emoji_utils::{normalize_emoji_string, normalize_reaction};

use crate::collaborators::Transport;
use crate::error::{Action, ActionFailed, ReasonCode};
use crate::types::{ReactionRecord, ScopeId};

/// Configuration for the reaction aggregator
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct ReactionConfig {
    /// Whether to fold `+`/`-` shorthands and skin tone variants into one bucket.
    /// Off by default, so buckets key on the exact content.
    pub normalize_emoji: bool,

    /// Whether to enable detailed logging of every ingested record
    pub enable_debug_logging: bool,
}

impl Default for ReactionConfig {
    fn default() -> Self {
        Self {
            normalize_emoji: false,
            enable_debug_logging: false,
        }
    }
}

/// Reactions on one target, grouped by content.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct GroupedReactions {
    by_content: HashMap<String, Vec<ReactionRecord>>,
}

impl GroupedReactions {
    /// Reactions with this content, in arrival order
    pub fn get(&self, content: &str) -> Option<&[ReactionRecord]> {
        self.by_content.get(content).map(Vec::as_slice)
    }

    pub fn count(&self, content: &str) -> usize {
        self.by_content.get(content).map_or(0, Vec::len)
    }

    pub fn total(&self) -> usize {
        self.by_content.values().map(Vec::len).sum()
    }

    pub fn len(&self) -> usize {
        self.by_content.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_content.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &[ReactionRecord])> {
        self.by_content
            .iter()
            .map(|(content, records)| (content.as_str(), records.as_slice()))
    }

    pub fn as_map(&self) -> &HashMap<String, Vec<ReactionRecord>> {
        &self.by_content
    }
}

/// Live reaction index, owned by the timeline task.
#[derive(Debug, Default)]
pub struct ReactionAggregator {
    config: ReactionConfig,
    index: HashMap<String, GroupedReactions>,
    seen_ids: HashSet<String>,
    empty: GroupedReactions,
}

impl ReactionAggregator {
    pub fn new() -> Self {
        Self::with_config(ReactionConfig::default())
    }

    pub fn with_config(config: ReactionConfig) -> Self {
        Self {
            config,
            index: HashMap::new(),
            seen_ids: HashSet::new(),
            empty: GroupedReactions::default(),
        }
    }

    pub fn config(&self) -> &ReactionConfig {
        &self.config
    }

    /// Appends one record. Returns `false` when it was a duplicate delivery of a
    /// reaction already ingested.
    pub fn ingest(&mut self, record: ReactionRecord) -> bool {
        if let Some(id) = &record.id
            && !self.seen_ids.insert(id.clone())
        {
            if self.config.enable_debug_logging {
                tracing::debug!(
                    target: "relaychat::timeline::reactions::ingest",
                    "Dropping duplicate reaction {}",
                    id
                );
            }
            return false;
        }

        let key = normalize_reaction(&record.content, self.config.normalize_emoji);

        if self.config.enable_debug_logging {
            tracing::debug!(
                target: "relaychat::timeline::reactions::ingest",
                "Added reaction '{}' from {} to event {}",
                key,
                record.author_pubkey.to_hex(),
                record.target_id
            );
        }

        self.index
            .entry(record.target_id.clone())
            .or_default()
            .by_content
            .entry(key)
            .or_default()
            .push(record);
        true
    }

    /// Ingests records in the order given. Returns how many were applied.
    pub fn ingest_all<I>(&mut self, records: I) -> usize
    where
        I: IntoIterator<Item = ReactionRecord>,
    {
        records
            .into_iter()
            .map(|record| self.ingest(record))
            .filter(|applied| *applied)
            .count()
    }

    /// Grouped reactions for `target_id`; empty when nothing has arrived yet.
    pub fn grouped_for(&self, target_id: &str) -> &GroupedReactions {
        self.index.get(target_id).unwrap_or(&self.empty)
    }

    /// Number of targets with at least one reaction, seen or not
    pub fn target_count(&self) -> usize {
        self.index.len()
    }

    pub fn clear(&mut self) {
        self.index.clear();
        self.seen_ids.clear();
    }

    /// Sends a reaction through the transport.
    ///
    /// Nothing is applied locally: the reaction is counted once it echoes back through
    /// the same subscription that feeds [`ReactionAggregator::ingest`].
    pub async fn send_reaction(
        transport: &dyn Transport,
        scope: &ScopeId,
        target_id: &str,
        content: &str,
    ) -> Result<(), ActionFailed> {
        transport
            .send_reaction(scope, target_id, content)
            .await
            .map_err(|e| {
                tracing::warn!(
                    target: "relaychat::timeline::reactions::send_reaction",
                    "Failed to send reaction to {}: {}",
                    target_id,
                    e
                );
                ActionFailed::from_transport(
                    Action::SendReaction,
                    ReasonCode::ReactionSendFailed,
                    Some(target_id),
                    &e,
                )
            })
    }
}

#[cfg(test)]
mod tests {
    use nostr_sdk::prelude::*;

    use super::*;

    fn reaction(target: &str, content: &str, author: PublicKey) -> ReactionRecord {
        ReactionRecord::new(target, content, author)
    }

    #[test]
    fn test_unknown_target_is_empty() {
        let aggregator = ReactionAggregator::new();
        let grouped = aggregator.grouped_for("missing");
        assert!(grouped.is_empty());
        assert_eq!(grouped.total(), 0);
    }

    #[test]
    fn test_same_content_keeps_arrival_order() {
        let mut aggregator = ReactionAggregator::new();
        let authors: Vec<PublicKey> = (0..5).map(|_| Keys::generate().public_key()).collect();

        for (i, author) in authors.iter().enumerate() {
            // Timestamps deliberately run backwards; arrival order must win.
            let mut record = reaction("target", "🔥", *author);
            record.created_at = Timestamp::from(1000 - i as u64);
            assert!(aggregator.ingest(record));
        }

        let records = aggregator.grouped_for("target").get("🔥").unwrap();
        assert_eq!(records.len(), 5);
        let order: Vec<PublicKey> = records.iter().map(|r| r.author_pubkey).collect();
        assert_eq!(order, authors);
    }

    #[test]
    fn test_groups_by_exact_content() {
        let mut aggregator = ReactionAggregator::new();
        let user1 = Keys::generate().public_key();
        let user2 = Keys::generate().public_key();

        let heart = reaction("msg1", "❤️", user2);
        aggregator.ingest(reaction("msg1", "👍", user1));
        aggregator.ingest(heart.clone());
        aggregator.ingest(reaction("msg1", "+", user2));
        aggregator.ingest(reaction("msg2", "👍", user1));

        let grouped = aggregator.grouped_for("msg1");
        assert_eq!(grouped.len(), 3);
        assert_eq!(grouped.count("👍"), 1);
        assert_eq!(grouped.count("+"), 1);
        assert_eq!(grouped.get(&heart.content), Some(&[heart.clone()][..]));
        assert_eq!(aggregator.grouped_for("msg2").total(), 1);
        assert_eq!(aggregator.target_count(), 2);
    }

    #[test]
    fn test_n_records_with_same_content_count_n() {
        let mut aggregator = ReactionAggregator::new();
        let user = Keys::generate().public_key();

        for content in ["", "", "", "-", "-"] {
            aggregator.ingest(reaction("msg1", content, user));
        }

        let grouped = aggregator.grouped_for("msg1");
        assert_eq!(grouped.count(""), 3);
        assert_eq!(grouped.count("-"), 2);
        assert_eq!(grouped.count("👍"), 0);
        assert_eq!(grouped.count("👎"), 0);
    }

    #[test]
    fn test_shorthands_fold_when_normalizing() {
        let mut aggregator = ReactionAggregator::with_config(ReactionConfig {
            normalize_emoji: true,
            enable_debug_logging: false,
        });
        let user = Keys::generate().public_key();

        aggregator.ingest(reaction("msg1", "👍", user));
        aggregator.ingest(reaction("msg1", "+", user));
        aggregator.ingest(reaction("msg1", "❤️", user));

        let grouped = aggregator.grouped_for("msg1");
        assert_eq!(grouped.count("👍"), 2);
        assert_eq!(grouped.count("❤"), 1);
    }

    #[test]
    fn test_same_user_can_react_twice() {
        let mut aggregator = ReactionAggregator::new();
        let user = Keys::generate().public_key();

        aggregator.ingest(reaction("msg1", "👍", user));
        aggregator.ingest(reaction("msg1", "👍", user));

        assert_eq!(aggregator.grouped_for("msg1").count("👍"), 2);
    }

    #[test]
    fn test_duplicate_delivery_is_dropped() {
        let mut aggregator = ReactionAggregator::new();
        let user = Keys::generate().public_key();
        let record = reaction("msg1", "👍", user).with_id("r1");

        assert!(aggregator.ingest(record.clone()));
        assert!(!aggregator.ingest(record));
        assert_eq!(aggregator.grouped_for("msg1").count("👍"), 1);
    }

    #[test]
    fn test_ingest_all_counts_applied() {
        let mut aggregator = ReactionAggregator::new();
        let user = Keys::generate().public_key();
        let records = vec![
            reaction("a", "👍", user).with_id("1"),
            reaction("a", "👍", user).with_id("1"),
            reaction("b", "👎", user).with_id("2"),
        ];

        assert_eq!(aggregator.ingest_all(records), 2);
    }

    #[test]
    fn test_skin_tones_fold_only_when_enabled() {
        let user = Keys::generate().public_key();

        let mut folding = ReactionAggregator::with_config(ReactionConfig {
            normalize_emoji: true,
            enable_debug_logging: false,
        });
        folding.ingest(reaction("m", "👍🏽", user));
        folding.ingest(reaction("m", "👍", user));
        assert_eq!(folding.grouped_for("m").count("👍"), 2);

        let mut exact = ReactionAggregator::with_config(ReactionConfig {
            enable_debug_logging: true,
            ..ReactionConfig::default()
        });
        exact.ingest(reaction("m", "👍🏽", user));
        exact.ingest(reaction("m", "👍", user));
        assert_eq!(exact.grouped_for("m").len(), 2);
    }

    #[test]
    fn test_clear() {
        let mut aggregator = ReactionAggregator::new();
        let user = Keys::generate().public_key();
        aggregator.ingest(reaction("m", "👍", user).with_id("x"));
        aggregator.clear();

        assert!(aggregator.grouped_for("m").is_empty());
        // Ids are forgotten with the index, so the same record applies again.
        assert!(aggregator.ingest(reaction("m", "👍", user).with_id("x")));
    }

    #[test]
    fn test_config_defaults() {
        let config = ReactionConfig::default();
        assert!(!config.normalize_emoji);
        assert!(!config.enable_debug_logging);
    }
}
