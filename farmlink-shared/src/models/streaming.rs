use serde::{Deserialize, Serialize};

use super::message::Message;

/// Payload of one server-sent event on a conversation stream.
///
/// The SSE `event:` field carries [`FeedEvent::event_name`]; `data:` carries
/// the JSON encoding of the variant.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum FeedEvent {
    /// A message was inserted. May be delivered more than once.
    Message { message: Message },
    /// The subscriber fell behind and missed events; refetch history.
    Resync { missed: u64 },
}

impl FeedEvent {
    pub fn event_name(&self) -> &'static str {
        match self {
            FeedEvent::Message { .. } => "message",
            FeedEvent::Resync { .. } => "resync",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resync_event_is_tagged() {
        let event = FeedEvent::Resync { missed: 3 };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "resync");
        assert_eq!(json["missed"], 3);
        assert_eq!(event.event_name(), "resync");
    }
}
