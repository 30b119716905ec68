//! HTTP and WebSocket server for the Atlas novel reader.
//!
//! The binary in `main.rs` wires configuration, storage and sources into an
//! [`state::AppState`] and serves [`api::create_router`].

pub mod api;
pub mod metrics;
pub mod state;
