pub mod api;
pub mod chat;
pub mod completion;
pub mod config;
pub mod conversations;
pub mod live;
pub mod session;
