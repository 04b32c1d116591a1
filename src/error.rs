use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::collaborators::TransportError;

pub type Result<T> = core::result::Result<T, TimelineError>;

#[derive(Error, Debug)]
pub enum TimelineError {
    #[error("Filesystem error: {0}")]
    Filesystem(#[from] std::io::Error),

    #[error("Logging setup error: {0}")]
    LoggingSetup(String),

    #[error("Timeline is closed")]
    TimelineClosed,

    #[error(transparent)]
    ActionFailed(#[from] ActionFailed),
}

/// The user-facing operation that failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Action {
    SendReaction,
    DeleteEvent,
    SendMessage,
    SendJoinRequest,
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Action::SendReaction => "send reaction",
            Action::DeleteEvent => "delete event",
            Action::SendMessage => "send message",
            Action::SendJoinRequest => "send join request",
        };
        f.write_str(name)
    }
}

/// Machine-readable reason attached to every [`ActionFailed`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ReasonCode {
    ReactionSendFailed,
    DeletionUnauthorized,
    DeletionFailed,
    DuplicateDeletionPending,
    MessageSendFailed,
    ComposeNotAllowed,
}

impl ReasonCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            ReasonCode::ReactionSendFailed => "reaction-send-failed",
            ReasonCode::DeletionUnauthorized => "deletion-unauthorized",
            ReasonCode::DeletionFailed => "deletion-failed",
            ReasonCode::DuplicateDeletionPending => "duplicate-deletion-pending",
            ReasonCode::MessageSendFailed => "message-send-failed",
            ReasonCode::ComposeNotAllowed => "compose-not-allowed",
        }
    }
}

impl fmt::Display for ReasonCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Where a failure originated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum FailureCause {
    Network,
    Authorization,
    Rejected,
    /// Rejected before any request left the process.
    Local,
}

impl From<&TransportError> for FailureCause {
    fn from(err: &TransportError) -> Self {
        match err {
            TransportError::Network(_) => FailureCause::Network,
            TransportError::Unauthorized(_) => FailureCause::Authorization,
            TransportError::Rejected(_) => FailureCause::Rejected,
        }
    }
}

/// Uniform "action failed" signal surfaced to the user-facing layer.
///
/// Every failure is scoped to one event or operation; none of them are fatal.
#[derive(Error, Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[error("Failed to {action} ({reason}): {detail}")]
pub struct ActionFailed {
    pub action: Action,
    pub reason: ReasonCode,
    pub cause: FailureCause,
    pub event_id: Option<String>,
    pub detail: String,
}

impl ActionFailed {
    pub fn local(
        action: Action,
        reason: ReasonCode,
        event_id: Option<&str>,
        detail: impl Into<String>,
    ) -> Self {
        Self {
            action,
            reason,
            cause: FailureCause::Local,
            event_id: event_id.map(str::to_string),
            detail: detail.into(),
        }
    }

    pub fn from_transport(
        action: Action,
        reason: ReasonCode,
        event_id: Option<&str>,
        err: &TransportError,
    ) -> Self {
        Self {
            action,
            reason,
            cause: FailureCause::from(err),
            event_id: event_id.map(str::to_string),
            detail: err.to_string(),
        }
    }
}
