//! Spinhub relay library.
//!
//! Core components of the relay hub: the HTTP/WebSocket surface, the
//! connection and room registries, and the debug log ring.

pub mod api;
pub mod logbuf;
pub mod rooms;
pub mod ws;
