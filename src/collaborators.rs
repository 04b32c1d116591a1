//! External collaborators the timeline depends on.
//!
//! Relay transport, profile metadata and authorization live outside this crate. Events
//! handed to the timeline are assumed to be already signature-verified by the transport.

use async_trait::async_trait;
use nostr_sdk::prelude::*;
use thiserror::Error;
use tokio::sync::mpsc::Receiver;

use crate::types::{IncomingEvent, Profile, ReactionRecord, ScopeId};

/// Errors reported by the transport for outbound operations.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TransportError {
    #[error("Network error: {0}")]
    Network(String),

    #[error("Not authorized: {0}")]
    Unauthorized(String),

    #[error("Rejected by relay: {0}")]
    Rejected(String),
}

/// Kind of an outbound event built by the timeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutgoingKind {
    ChatMessage,
    JoinRequest,
}

/// An unsigned event the transport should sign and publish.
#[derive(Debug, Clone, PartialEq)]
pub struct OutgoingEvent {
    pub kind: OutgoingKind,
    pub content: String,
    pub tags: Vec<Tag>,
}

/// Relay transport. Subscriptions are push-based channels; outbound operations resolve
/// asynchronously with a success/failure outcome.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Chat events (and observed withdrawals) for `scope`
    fn subscribe_events(&self, scope: &ScopeId) -> Receiver<IncomingEvent>;

    /// Reactions targeting events of `scope`
    fn subscribe_reactions(&self, scope: &ScopeId) -> Receiver<ReactionRecord>;

    /// Publishes a new event, returning its id
    async fn publish_event(
        &self,
        scope: &ScopeId,
        event: OutgoingEvent,
    ) -> Result<String, TransportError>;

    async fn send_reaction(
        &self,
        scope: &ScopeId,
        target_id: &str,
        content: &str,
    ) -> Result<(), TransportError>;

    /// Author withdrawal of their own event
    async fn delete_own_event(&self, event_id: &str) -> Result<(), TransportError>;

    /// Scope-level withdrawal issued with moderator rights
    async fn delete_scoped_event(
        &self,
        scope: &ScopeId,
        event_id: &str,
    ) -> Result<(), TransportError>;
}

/// Best-effort profile lookup. Absence is not an error.
#[async_trait]
pub trait ProfileDirectory: Send + Sync {
    async fn lookup_profile(&self, pubkey: &PublicKey) -> Option<Profile>;
}

/// Membership and moderation rights within a scope.
pub trait Authorization: Send + Sync {
    fn is_moderator(&self, acting: &PublicKey, scope: &ScopeId) -> bool;

    fn is_member(&self, acting: &PublicKey, scope: &ScopeId) -> bool;
}
