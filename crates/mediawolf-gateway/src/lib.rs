//! # MediaWolf Gateway
//!
//! HTTP and WebSocket surface over the task manager. Every endpoint maps to
//! exactly one task operation; status changes are pushed to WebSocket
//! clients as they happen.

pub mod routes;
pub mod server;
pub mod ws;

pub use server::{AppState, build_router, serve};
