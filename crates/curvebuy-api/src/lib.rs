//! curvebuy-api: HTTP API layer for curvebuy
//!
//! Exposes buffer creation, order registration, compensation estimates and
//! the pending-state feed (snapshot over HTTP, diffs over a websocket).

pub mod broadcast;
pub mod dto;
pub mod routes;
pub mod server;
pub mod state;

pub use broadcast::{diff, StateBroadcaster};
pub use server::*;
pub use state::{ApiError, AppState};
