//! Whether the viewer may compose in a scope, and building what they send.

use nostr_sdk::prelude::*;
use serde::{Deserialize, Serialize};

use crate::collaborators::{Authorization, OutgoingEvent, OutgoingKind, Transport};
use crate::error::{Action, ActionFailed, ReasonCode};
use crate::types::ScopeId;

pub const THUMBS_UP: &str = "👍";

/// What the composer should offer the viewer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ComposeGate {
    /// Nobody is logged in
    LoginRequired,
    /// Logged in but neither a member nor a moderator; offer a join request
    JoinRequired,
    Allowed,
}

impl ComposeGate {
    pub fn evaluate(
        viewer: Option<&PublicKey>,
        scope: &ScopeId,
        authorization: &dyn Authorization,
    ) -> Self {
        match viewer {
            None => ComposeGate::LoginRequired,
            Some(viewer)
                if authorization.is_member(viewer, scope)
                    || authorization.is_moderator(viewer, scope) =>
            {
                ComposeGate::Allowed
            }
            Some(_) => ComposeGate::JoinRequired,
        }
    }

    pub fn is_allowed(&self) -> bool {
        *self == ComposeGate::Allowed
    }

    fn ensure_allowed(&self, action: Action) -> Result<(), ActionFailed> {
        let detail = match self {
            ComposeGate::Allowed => return Ok(()),
            ComposeGate::LoginRequired => "log in to take part in this chat",
            ComposeGate::JoinRequired => "join this chat before sending messages",
        };
        Err(ActionFailed::local(
            action,
            ReasonCode::ComposeNotAllowed,
            None,
            detail,
        ))
    }
}

/// Builds a chat message, quoting `reply_to` when set. Blank content is rejected.
pub fn build_chat_message(
    content: &str,
    reply_to: Option<&str>,
) -> Result<OutgoingEvent, ActionFailed> {
    let content = content.trim();
    if content.is_empty() {
        return Err(ActionFailed::local(
            Action::SendMessage,
            ReasonCode::MessageSendFailed,
            None,
            "message is empty",
        ));
    }

    let mut tags = Vec::new();
    if let Some(parent_id) = reply_to {
        let tag = Tag::parse(vec!["q", parent_id]).map_err(|e| {
            ActionFailed::local(
                Action::SendMessage,
                ReasonCode::MessageSendFailed,
                Some(parent_id),
                format!("invalid reply reference: {}", e),
            )
        })?;
        tags.push(tag);
    }

    Ok(OutgoingEvent {
        kind: OutgoingKind::ChatMessage,
        content: content.to_string(),
        tags,
    })
}

pub fn build_join_request(scope: &ScopeId) -> Result<OutgoingEvent, ActionFailed> {
    let tag = Tag::parse(vec!["h", scope.as_str()]).map_err(|e| {
        ActionFailed::local(
            Action::SendJoinRequest,
            ReasonCode::MessageSendFailed,
            None,
            format!("invalid scope reference: {}", e),
        )
    })?;

    Ok(OutgoingEvent {
        kind: OutgoingKind::JoinRequest,
        content: String::new(),
        tags: vec![tag],
    })
}

/// Gates and publishes a chat message, returning the new event id.
pub async fn send_message(
    transport: &dyn Transport,
    scope: &ScopeId,
    gate: ComposeGate,
    content: &str,
    reply_to: Option<&str>,
) -> Result<String, ActionFailed> {
    gate.ensure_allowed(Action::SendMessage)?;
    let event = build_chat_message(content, reply_to)?;
    publish(transport, scope, Action::SendMessage, event).await
}

/// Joining only needs a logged-in viewer.
pub async fn send_join_request(
    transport: &dyn Transport,
    scope: &ScopeId,
    gate: ComposeGate,
) -> Result<String, ActionFailed> {
    if gate == ComposeGate::LoginRequired {
        gate.ensure_allowed(Action::SendJoinRequest)?;
    }
    let event = build_join_request(scope)?;
    publish(transport, scope, Action::SendJoinRequest, event).await
}

async fn publish(
    transport: &dyn Transport,
    scope: &ScopeId,
    action: Action,
    event: OutgoingEvent,
) -> Result<String, ActionFailed> {
    match transport.publish_event(scope, event).await {
        Ok(event_id) => {
            tracing::debug!(
                target: "relaychat::timeline::compose::publish",
                "Published {} as {} in {}",
                action,
                event_id,
                scope
            );
            Ok(event_id)
        }
        Err(e) => {
            tracing::warn!(
                target: "relaychat::timeline::compose::publish",
                "Failed to {} in {}: {}",
                action,
                scope,
                e
            );
            Err(ActionFailed::from_transport(
                action,
                ReasonCode::MessageSendFailed,
                None,
                &e,
            ))
        }
    }
}
