//! Pong Server - authoritative two-player Pong over WebSockets
//!
//! The binary in `main.rs` wires these modules into an axum server:
//! - `game`: court constants, physics, input reconciliation, match state
//!   machine, controllers and the session/registry actors
//! - `ws`: binary wire codec and the `/play` socket handler
//! - `http`: router with discovery and health endpoints

pub mod app;
pub mod config;
pub mod game;
pub mod http;
pub mod util;
pub mod ws;
