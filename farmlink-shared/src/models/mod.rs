pub mod conversation;
pub mod errors;
pub mod message;
pub mod party;
pub mod streaming;

pub use conversation::{
    Conversation, ConversationDetail, ConversationSummary, PartyProfile,
    ResolveConversationRequest, ResolveConversationResponse, TopicSummary,
};
pub use errors::ProblemResponse;
pub use message::{Message, PREVIEW_MAX_CHARS, SendMessageRequest, normalize_body, preview_of};
pub use party::{ConversationKey, PartyId, PartyPair, TopicId};
pub use streaming::FeedEvent;
