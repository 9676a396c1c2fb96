//! WebSocket relay core.
//!
//! One full-duplex connection per client at `GET /ws`. Each text frame is a
//! JSON envelope discriminated by a `type` field.
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │                    Clients (host / controllers)              │
//! │  - join/handshake, gameState patches, one-shot commands      │
//! └──────────────────────────────┬───────────────────────────────┘
//!                                │ WebSocket (JSON envelopes)
//! ┌──────────────────────────────▼───────────────────────────────┐
//! │                         RelayHub                             │
//! │  - connection registry (per-connection send channel)         │
//! │  - room registry front-end (join/leave/merge/relay)          │
//! │  - broadcast fan-out with sender exclusion                   │
//! └──────────────────────────────────────────────────────────────┘
//! ```

mod handler;
mod hub;
mod types;

pub use handler::ws_handler;
pub use hub::{RelayHub, SpinToggle};
#[allow(unused_imports)]
pub use types::{ClientMessage, ServerMessage};
