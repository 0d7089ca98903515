use serde::{Deserialize, Deserializer, Serialize};

use crate::ws::error::SessionError;
use crate::ws::registry::SessionEvent;

/// Where a collaborator's caret sits.
///
/// Plain clients send a number; the browser editor sends the DOM path of
/// the caret node plus the offset inside it. Numbers are kept as sent,
/// including negative and fractional values.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(untagged)]
pub enum CursorPosition {
    Offset(serde_json::Number),
    Path { path: Vec<u32>, offset: u32 },
}

#[derive(Deserialize, Debug, Clone, PartialEq)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum InboundMessage {
    Edit {
        #[serde(default, deserialize_with = "null_as_empty")]
        content: String,
        // Sending both spellings is a duplicate field
        #[serde(default, alias = "cursorPosition")]
        cursor_position: Option<CursorPosition>,
    },
    Typing,
    #[serde(other)]
    Unrecognized,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum OutboundMessage {
    Edit {
        content: String,
        cursor_position: Option<CursorPosition>,
        user: String,
    },
    Typing {
        user: String,
    },
    UserConnected {
        user: String,
    },
    UserDisconnected {
        user: String,
    },
    Error {
        message: String,
    },
}

fn null_as_empty<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<String>::deserialize(deserializer)?.unwrap_or_default())
}

impl From<&SessionEvent> for OutboundMessage {
    fn from(event: &SessionEvent) -> Self {
        match event {
            SessionEvent::DocumentUpdate { content, cursor_position, user } => OutboundMessage::Edit {
                content: content.clone(),
                cursor_position: cursor_position.clone(),
                user: user.clone(),
            },
            SessionEvent::TypingIndicator { user } => OutboundMessage::Typing { user: user.clone() },
            SessionEvent::UserConnected { user } => OutboundMessage::UserConnected { user: user.clone() },
            SessionEvent::UserDisconnected { user } => OutboundMessage::UserDisconnected { user: user.clone() },
        }
    }
}

impl From<&SessionError> for OutboundMessage {
    fn from(error: &SessionError) -> Self {
        OutboundMessage::Error { message: error.to_string() }
    }
}

/// Decode one inbound text frame
pub fn decode_inbound(text: &str) -> Result<InboundMessage, SessionError> {
    match serde_json::from_str::<InboundMessage>(text)? {
        InboundMessage::Unrecognized => {
            // Re-read loosely to name the action in the report
            let action = serde_json::from_str::<serde_json::Value>(text)
                .ok()
                .and_then(|v| v.get("action").map(|a| a.to_string()))
                .unwrap_or_default();
            Err(SessionError::UnknownAction(action))
        }
        msg => Ok(msg),
    }
}

pub fn encode_outbound(msg: &OutboundMessage) -> Result<String, serde_json::Error> {
    serde_json::to_string(msg)
}
