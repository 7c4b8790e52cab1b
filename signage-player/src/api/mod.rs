//! HTTP control API
//!
//! REST endpoints for the playlist, settings, schedulers and viewing
//! session, plus an SSE event stream, all under `/api/v1`.

pub mod handlers;
pub mod server;
pub mod sse;

pub use server::{create_router, run, AppContext};
