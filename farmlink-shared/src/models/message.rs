use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::party::PartyId;

/// Default length of the conversation preview, in characters.
pub const PREVIEW_MAX_CHARS: usize = 75;

/// A persisted chat message. Messages are append-only.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Message {
    /// Server-generated identifier.
    pub id: Uuid,
    /// Conversation the message belongs to.
    pub conversation_id: Uuid,
    /// One of the two parties of the conversation.
    pub sender_id: PartyId,
    /// Trimmed, non-empty text. Never truncated.
    pub body: String,
    /// Server-assigned creation time; orders messages within a conversation.
    pub created_at: DateTime<Utc>,
}

impl Message {
    /// Display ordering key: `created_at` first, `id` breaks ties.
    pub fn sort_key(&self) -> (DateTime<Utc>, Uuid) {
        (self.created_at, self.id)
    }
}

/// Body of `POST /api/conversations/{id}/messages`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SendMessageRequest {
    pub body: String,
    /// Optional claimed sender. When present it must match the caller.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sender_id: Option<PartyId>,
}

/// Trims a draft and returns it when something is left to send.
pub fn normalize_body(draft: &str) -> Option<String> {
    let trimmed = draft.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_string())
    }
}

/// The first `max_chars` characters of `body`. Counts chars, not bytes, so a
/// multi-byte character is never split.
pub fn preview_of(body: &str, max_chars: usize) -> String {
    match body.char_indices().nth(max_chars) {
        Some((cut, _)) => body[..cut].to_string(),
        None => body.to_string(),
    }
}
