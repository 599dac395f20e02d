use std::fmt;

use serde::{Deserialize, Serialize};

/// Opaque identifier of an authenticated marketplace user.
///
/// Parties are totally ordered by the lexicographic order of their string
/// form, which is what makes a conversation key independent of who initiated
/// the contact.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PartyId(String);

impl PartyId {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// `true` when the identifier is empty or only whitespace.
    pub fn is_blank(&self) -> bool {
        self.0.trim().is_empty()
    }
}

impl fmt::Display for PartyId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for PartyId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl From<String> for PartyId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

/// Identifier of the listing a conversation is about.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TopicId(String);

impl TopicId {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TopicId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for TopicId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

/// The two parties of a conversation in canonical order, `low < high`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PartyPair {
    low: PartyId,
    high: PartyId,
}

impl PartyPair {
    /// Orders two distinct parties. Returns `None` when both sides are the
    /// same party, since nobody can hold a conversation with themselves.
    pub fn canonical(a: PartyId, b: PartyId) -> Option<Self> {
        match a.cmp(&b) {
            std::cmp::Ordering::Less => Some(Self { low: a, high: b }),
            std::cmp::Ordering::Greater => Some(Self { low: b, high: a }),
            std::cmp::Ordering::Equal => None,
        }
    }

    pub fn low(&self) -> &PartyId {
        &self.low
    }

    pub fn high(&self) -> &PartyId {
        &self.high
    }

    pub fn contains(&self, party: &PartyId) -> bool {
        &self.low == party || &self.high == party
    }

    /// The counterpart of `party`, or `None` if `party` is not in the pair.
    pub fn other(&self, party: &PartyId) -> Option<&PartyId> {
        if &self.low == party {
            Some(&self.high)
        } else if &self.high == party {
            Some(&self.low)
        } else {
            None
        }
    }
}

/// Lookup key of a conversation: the optional topic plus the canonical pair.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ConversationKey {
    pub topic_id: Option<TopicId>,
    pub parties: PartyPair,
}

impl ConversationKey {
    /// A blank topic is the same key as no topic.
    pub fn new(topic_id: Option<TopicId>, parties: PartyPair) -> Self {
        let topic_id = topic_id.filter(|topic| !topic.as_str().trim().is_empty());
        Self { topic_id, parties }
    }
}
