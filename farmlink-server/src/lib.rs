#![cfg_attr(not(test), forbid(unsafe_code))]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions, clippy::missing_panics_doc)]

//! FarmLink chat server: conversation resolution, message delivery and the
//! live change feed, served over axum.

pub mod app_state;
pub mod db;
pub mod directory;
pub mod handlers;
pub mod http;
pub mod identity;
pub mod middleware;
pub mod realtime;
pub mod routes;
pub mod server;
pub mod services;
pub mod store;
mod tracer;
