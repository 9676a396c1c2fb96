//! HTTP API module.
//!
//! Health/debug endpoints and the WebSocket upgrade route; everything with
//! actual state lives behind the relay hub.

mod error;
mod handlers;
mod routes;
mod state;

#[allow(unused_imports)]
pub use error::{ApiError, ApiResult, ErrorResponse};
pub use routes::create_router;
pub use state::AppState;
