use std::fmt;

use nostr_sdk::prelude::*;
use serde::{Deserialize, Serialize};

/// An immutable chat event as decoded by the transport.
///
/// `id` is content-derived: two events sharing an id are the same logical event even
/// when they were delivered by different relays.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ChatEvent {
    /// Unique identifier of the event
    pub id: String,

    /// Public key of the event author
    pub pubkey: PublicKey,

    /// Opaque payload
    pub content: String,

    /// Author-supplied timestamp (seconds, untrusted)
    pub created_at: Timestamp,

    /// Event this one replies to, single level only
    pub parent_id: Option<String>,

    /// Tags from the original Nostr event
    pub tags: Tags,
}

impl ChatEvent {
    /// Builds an event, taking the reply parent from its tags when one is present.
    pub fn new(
        id: impl Into<String>,
        pubkey: PublicKey,
        content: impl Into<String>,
        created_at: Timestamp,
        tags: Tags,
    ) -> Self {
        let parent_id = extract_reply_parent(&tags);
        Self {
            id: id.into(),
            pubkey,
            content: content.into(),
            created_at,
            parent_id,
            tags,
        }
    }

    pub fn with_parent(mut self, parent_id: impl Into<String>) -> Self {
        self.parent_id = Some(parent_id.into());
        self
    }

    pub fn is_reply(&self) -> bool {
        self.parent_id.is_some()
    }
}

/// Display category of a chat event. Always recomputed, never stored.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Category {
    Note,
    LongFormContent,
    FollowSet,
    GroupInvite,
    Unclassified,
}

impl Category {
    pub fn as_str(&self) -> &'static str {
        match self {
            Category::Note => "note",
            Category::LongFormContent => "long-form-content",
            Category::FollowSet => "follow-set",
            Category::GroupInvite => "group-invite",
            Category::Unclassified => "unclassified",
        }
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single reaction delivered by the reaction subscription.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ReactionRecord {
    /// Id of the reaction event itself, when the transport knows it
    pub id: Option<String>,

    /// The reaction symbol or text
    pub content: String,

    /// The chat event being reacted to
    pub target_id: String,

    /// Who reacted
    pub author_pubkey: PublicKey,

    pub created_at: Timestamp,
}

impl ReactionRecord {
    pub fn new(
        target_id: impl Into<String>,
        content: impl Into<String>,
        author_pubkey: PublicKey,
    ) -> Self {
        Self {
            id: None,
            content: content.into(),
            target_id: target_id.into(),
            author_pubkey,
            created_at: Timestamp::now(),
        }
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }
}

/// Items yielded by the chat event subscription.
#[derive(Debug, Clone, PartialEq)]
pub enum IncomingEvent {
    /// A chat event for the window
    Chat(ChatEvent),

    /// A withdrawal observed on the log, issued by the author or a moderator elsewhere
    Withdrawal { target_ids: Vec<String> },
}

/// Logical chat/group boundary in which membership and moderation apply.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ScopeId(String);

impl ScopeId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ScopeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Profile metadata returned by the profile collaborator.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct Profile {
    pub name: Option<String>,
    pub display_name: Option<String>,
    pub verified_identifier: Option<String>,
}

impl Profile {
    /// Name to show for `pubkey`: name, then display name, then verified identifier,
    /// then the shortened hex key.
    pub fn display_label(profile: Option<&Profile>, pubkey: &PublicKey) -> String {
        profile
            .and_then(|p| {
                [&p.name, &p.display_name, &p.verified_identifier]
                    .into_iter()
                    .flatten()
                    .find(|value| !value.trim().is_empty())
                    .cloned()
            })
            .unwrap_or_else(|| ellipsis(&pubkey.to_hex(), 4))
    }
}

/// Shortens `value` to its first and last `keep` characters.
pub fn ellipsis(value: &str, keep: usize) -> String {
    let chars: Vec<char> = value.chars().collect();
    if chars.len() <= keep * 2 {
        return value.to_string();
    }
    let head: String = chars[..keep].iter().collect();
    let tail: String = chars[chars.len() - keep..].iter().collect();
    format!("{head}...{tail}")
}

fn tag_name(tag: &Tag) -> Option<&str> {
    tag.as_slice().first().map(String::as_str)
}

fn tag_value(tag: &Tag) -> Option<&str> {
    tag.as_slice()
        .get(1)
        .map(String::as_str)
        .filter(|value| !value.is_empty())
}

/// Reply target carried by the tags: the last `q` tag, else the last `e` tag (NIP-10).
pub(crate) fn extract_reply_parent(tags: &Tags) -> Option<String> {
    let last_with = |name: &str| {
        tags.iter()
            .filter(|tag| tag_name(tag) == Some(name))
            .filter_map(tag_value)
            .last()
            .map(str::to_string)
    };

    last_with("q").or_else(|| last_with("e"))
}

/// Target event ids of a withdrawal event, taken from its `e` tags.
pub fn deletion_target_ids(tags: &Tags) -> Vec<String> {
    tags.iter()
        .filter(|tag| tag_name(tag) == Some("e"))
        .filter_map(|tag| tag_value(tag).map(str::to_string))
        .collect()
}
