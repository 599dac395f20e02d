use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::{
    message::Message,
    party::{PartyId, TopicId},
};

/// A two-party conversation, optionally about one listing.
///
/// `party_low < party_high` always holds. `last_activity_at` and
/// `preview_text` stay `None` until the first message is sent.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Conversation {
    pub id: Uuid,
    pub topic_id: Option<TopicId>,
    pub party_low: PartyId,
    pub party_high: PartyId,
    pub last_activity_at: Option<DateTime<Utc>>,
    pub preview_text: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl Conversation {
    pub fn has_party(&self, party: &PartyId) -> bool {
        &self.party_low == party || &self.party_high == party
    }

    /// The counterpart of `party`, or `None` when `party` is not a member.
    pub fn other_party(&self, party: &PartyId) -> Option<&PartyId> {
        if &self.party_low == party {
            Some(&self.party_high)
        } else if &self.party_high == party {
            Some(&self.party_low)
        } else {
            None
        }
    }
}

/// Public profile attributes of a marketplace user.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct PartyProfile {
    pub party_id: PartyId,
    pub display_name: String,
    pub avatar_url: Option<String>,
}

/// Display attributes of the listing a conversation is about.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct TopicSummary {
    pub id: TopicId,
    pub title: String,
    pub image_url: Option<String>,
}

/// One row of the conversation list.
///
/// `other_profile` and `topic` are `None` when the lookup failed or found
/// nothing; the row itself is always present.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ConversationSummary {
    pub id: Uuid,
    pub topic_id: Option<TopicId>,
    pub other_party: PartyId,
    pub other_profile: Option<PartyProfile>,
    pub topic: Option<TopicSummary>,
    pub preview_text: Option<String>,
    pub last_activity_at: Option<DateTime<Utc>>,
}

/// Everything the chat screen needs on load.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ConversationDetail {
    pub conversation: Conversation,
    pub other_party: PartyId,
    pub other_profile: Option<PartyProfile>,
    pub topic: Option<TopicSummary>,
    /// Ordered by `created_at` ascending.
    pub messages: Vec<Message>,
}

/// Body of `POST /api/conversations/resolve`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ResolveConversationRequest {
    pub other_party: PartyId,
    #[serde(default)]
    pub topic_id: Option<TopicId>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ResolveConversationResponse {
    pub conversation_id: Uuid,
    /// `true` when this call inserted the row.
    pub created: bool,
}
