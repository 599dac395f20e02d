//! # Configuration
//!
//! Server configuration shared by the server binary, the CLI `serve`
//! command and the tests.

pub mod server;
