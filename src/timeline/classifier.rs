//! Maps raw chat events to display categories.
//!
//! Classification is total: anything that cannot be interpreted becomes
//! [`Category::Unclassified`] and callers render the raw event id instead.

use nostr_sdk::prelude::*;
use thiserror::Error;

use crate::types::{Category, ChatEvent};

/// Minimum character count for content to count as long-form on size alone.
pub const DEFAULT_LONG_FORM_MIN_CHARS: usize = 1000;

/// Tags that only route an event and carry nothing renderable.
const ROUTING_TAGS: &[&str] = &["h", "previous", "client"];

/// Tags that mark an article-shaped event.
const LONG_FORM_TAGS: &[&str] = &["title", "summary", "published_at"];

#[derive(Debug, Clone, Eq, PartialEq)]
pub struct ClassifierConfig {
    pub long_form_min_chars: usize,
}

impl Default for ClassifierConfig {
    fn default() -> Self {
        Self {
            long_form_min_chars: DEFAULT_LONG_FORM_MIN_CHARS,
        }
    }
}

/// Non-fatal classification problems. Both degrade to [`Category::Unclassified`].
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ClassificationError {
    #[error("Event {0} matches a structural pattern but is missing its identifier")]
    Ambiguous(String),

    #[error("Event {0} has no interpretable payload")]
    Undecodable(String),
}

#[derive(Debug, Clone, Default)]
pub struct EventClassifier {
    config: ClassifierConfig,
}

impl EventClassifier {
    pub fn new() -> Self {
        Self::with_config(ClassifierConfig::default())
    }

    pub fn with_config(config: ClassifierConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &ClassifierConfig {
        &self.config
    }

    /// Category of `event`. Never fails.
    pub fn classify(&self, event: &ChatEvent) -> Category {
        match self.try_classify(event) {
            Ok(category) => category,
            Err(e) => {
                tracing::debug!(
                    target: "relaychat::timeline::classifier::classify",
                    "Falling back to unclassified: {}",
                    e
                );
                Category::Unclassified
            }
        }
    }

    /// First match wins: follow-set, group reference, long-form, note.
    pub fn try_classify(&self, event: &ChatEvent) -> Result<Category, ClassificationError> {
        let tags = TagShape::of(&event.tags);

        if tags.has("p") && tags.has("d") {
            return match tags.value("d") {
                Some(_) => Ok(Category::FollowSet),
                None => Err(ClassificationError::Ambiguous(event.id.clone())),
            };
        }

        if tags.has("group") || (tags.has("d") && tags.has("name")) {
            let group_id = tags.value("group").or_else(|| tags.value("d"));
            return match group_id {
                Some(_) => Ok(Category::GroupInvite),
                None => Err(ClassificationError::Ambiguous(event.id.clone())),
            };
        }

        if event.content.trim().is_empty() {
            if tags.renderable_count() == 0 {
                return Err(ClassificationError::Undecodable(event.id.clone()));
            }
            return Ok(Category::Note);
        }

        let is_article = LONG_FORM_TAGS.iter().any(|name| tags.has(name));
        if is_article || event.content.chars().count() >= self.config.long_form_min_chars {
            return Ok(Category::LongFormContent);
        }

        Ok(Category::Note)
    }

    /// Minimal fallback rendering for unclassified events: the raw identifier.
    pub fn fallback_label(event: &ChatEvent) -> &str {
        &event.id
    }

    /// Group id referenced by a group-invite event.
    pub fn group_reference(event: &ChatEvent) -> Option<String> {
        let tags = TagShape::of(&event.tags);
        tags.value("group")
            .or_else(|| tags.value("d"))
            .map(str::to_string)
    }
}

struct TagShape<'a> {
    tags: &'a Tags,
}

impl<'a> TagShape<'a> {
    fn of(tags: &'a Tags) -> Self {
        Self { tags }
    }

    fn named(&self, name: &'a str) -> impl Iterator<Item = &'a Tag> + 'a {
        let tags: &'a Tags = self.tags;
        tags.iter()
            .filter(move |tag| tag.as_slice().first().map(String::as_str) == Some(name))
    }

    fn has(&self, name: &'a str) -> bool {
        self.named(name).next().is_some()
    }

    /// First non-empty value of a tag called `name`
    fn value(&self, name: &'a str) -> Option<&'a str> {
        self.named(name)
            .filter_map(|tag: &'a Tag| tag.as_slice().get(1))
            .map(String::as_str)
            .find(|value| !value.trim().is_empty())
    }

    fn renderable_count(&self) -> usize {
        self.tags
            .iter()
            .filter_map(|tag| tag.as_slice().first())
            .filter(|name| !ROUTING_TAGS.contains(&name.as_str()))
            .count()
    }
}
