//! Reply-parent resolution over a possibly incomplete window.

use nostr_sdk::prelude::*;
use serde::{Deserialize, Serialize};

use super::content_parser::ContentParser;
use super::deletion::DeletedSet;
use super::profiles::ProfileCache;
use super::window::ChatWindow;
use crate::types::{ChatEvent, Profile};

pub const DELETED_MESSAGE_LABEL: &str = "Deleted message";

/// Inline preview of the event a reply points at.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReplyPreview {
    pub parent: ChatEvent,
    pub parent_author_id: PublicKey,
    pub preview_image: Option<String>,
    pub preview_text: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ReplyResolution {
    /// The event is not a reply
    NoParent,

    /// The parent is loaded and visible
    Resolved(ReplyPreview),

    /// The parent was withdrawn; render the tombstone label
    Deleted { parent_id: String },

    /// The parent is outside the loaded window (or has not arrived yet)
    NotLoaded { parent_id: String },
}

impl ReplyResolution {
    /// Text for the inline reply line. `None` means no line, or a loading indicator
    /// while the parent is not loaded.
    pub fn label(&self) -> Option<&str> {
        match self {
            ReplyResolution::Resolved(preview) => Some(preview.preview_text.as_str()),
            ReplyResolution::Deleted { .. } => Some(DELETED_MESSAGE_LABEL),
            ReplyResolution::NoParent | ReplyResolution::NotLoaded { .. } => None,
        }
    }

    pub fn preview(&self) -> Option<&ReplyPreview> {
        match self {
            ReplyResolution::Resolved(preview) => Some(preview),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct ThreadResolver {
    parser: ContentParser,
}

impl ThreadResolver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn resolve_reply(
        &self,
        window: &ChatWindow,
        deleted: &DeletedSet,
        event: &ChatEvent,
    ) -> ReplyResolution {
        let Some(parent_id) = event.parent_id.as_deref() else {
            return ReplyResolution::NoParent;
        };

        if deleted.contains(parent_id) {
            return ReplyResolution::Deleted {
                parent_id: parent_id.to_string(),
            };
        }

        match window.get(parent_id) {
            Some(parent) => ReplyResolution::Resolved(ReplyPreview {
                parent_author_id: parent.pubkey,
                preview_image: self.parser.extract_first_image(&parent.content),
                preview_text: self.parser.extract_plain_text(&parent.content),
                parent: parent.clone(),
            }),
            None => {
                tracing::debug!(
                    target: "relaychat::timeline::thread_resolver::resolve_reply",
                    "Parent {} of {} is not loaded",
                    parent_id,
                    event.id
                );
                ReplyResolution::NotLoaded {
                    parent_id: parent_id.to_string(),
                }
            }
        }
    }

    /// Name of the parent's author if its profile has loaded. While it loads the reply
    /// renders without an author name.
    pub fn parent_author_name(profiles: &ProfileCache, preview: &ReplyPreview) -> Option<String> {
        profiles
            .get(&preview.parent_author_id)
            .map(|profile| Profile::display_label(Some(&profile), &preview.parent_author_id))
    }

    /// Label for the "Replying to" bar of the composer.
    pub fn reply_draft_label(
        &self,
        window: &ChatWindow,
        deleted: &DeletedSet,
        reply_to: &str,
    ) -> String {
        match window.get(reply_to) {
            Some(parent) if !deleted.contains(reply_to) => {
                self.parser.extract_plain_text(&parent.content)
            }
            _ => DELETED_MESSAGE_LABEL.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn event(id: &str, at: u64, author: PublicKey, content: &str) -> ChatEvent {
        ChatEvent::new(id, author, content, Timestamp::from(at), Tags::new())
    }

    #[test]
    fn test_not_a_reply() {
        let resolver = ThreadResolver::new();
        let a = event("1", 1, Keys::generate().public_key(), "hi");
        let window = ChatWindow::from_events(vec![a.clone()]);

        let resolution = resolver.resolve_reply(&window, &DeletedSet::default(), &a);
        assert_eq!(resolution, ReplyResolution::NoParent);
        assert!(resolution.label().is_none());
    }

    #[test]
    fn test_parent_resolves_with_preview() {
        let resolver = ThreadResolver::new();
        let u1 = Keys::generate().public_key();
        let a = event("1", 1, u1, "check this https://img.example.com/cat.png");
        let b = event("2", 2, u1, "nice").with_parent("1");
        let window = ChatWindow::from_events(vec![a.clone(), b.clone()]);

        let resolution = resolver.resolve_reply(&window, &DeletedSet::default(), &b);
        let preview = resolution.preview().unwrap();
        assert_eq!(preview.parent, a);
        assert_eq!(preview.parent_author_id, u1);
        assert_eq!(
            preview.preview_image.as_deref(),
            Some("https://img.example.com/cat.png")
        );
        assert_eq!(resolution.label(), Some("check this"));
    }

    #[test]
    fn test_parent_outside_window_is_not_loaded() {
        let resolver = ThreadResolver::new();
        let u1 = Keys::generate().public_key();
        let b = event("2", 2, u1, "reply").with_parent("missing");
        let window = ChatWindow::from_events(vec![b.clone()]);

        let resolution = resolver.resolve_reply(&window, &DeletedSet::default(), &b);
        assert_eq!(
            resolution,
            ReplyResolution::NotLoaded {
                parent_id: "missing".to_string()
            }
        );
        assert_ne!(resolution, ReplyResolution::NoParent);
        assert!(resolution.label().is_none());
    }

    #[test]
    fn test_parent_author_name_waits_for_profile() {
        let profiles = ProfileCache::new();
        let u1 = Keys::generate().public_key();
        let preview = ReplyPreview {
            parent: event("1", 1, u1, "hi"),
            parent_author_id: u1,
            preview_image: None,
            preview_text: "hi".to_string(),
        };

        profiles.request(&u1);
        assert!(ThreadResolver::parent_author_name(&profiles, &preview).is_none());

        profiles.store(
            u1,
            Some(Profile {
                display_name: Some("Alice".to_string()),
                ..Default::default()
            }),
        );
        assert_eq!(
            ThreadResolver::parent_author_name(&profiles, &preview).as_deref(),
            Some("Alice")
        );
    }

    #[test]
    fn test_reply_draft_label() {
        let resolver = ThreadResolver::new();
        let u1 = Keys::generate().public_key();
        let window = ChatWindow::from_events(vec![event("1", 1, u1, "original text")]);
        let deleted = DeletedSet::default();

        assert_eq!(
            resolver.reply_draft_label(&window, &deleted, "1"),
            "original text"
        );
        assert_eq!(
            resolver.reply_draft_label(&window, &deleted, "gone"),
            DELETED_MESSAGE_LABEL
        );
    }
}
