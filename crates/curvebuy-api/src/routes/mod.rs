//! API route handlers

pub mod buffer;
pub mod feed;
pub mod health;
pub mod orders;

use axum::{
    routing::{get, post},
    Router,
};

use crate::AppState;

/// Create the API router with all routes
pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health::health_check))
        .route("/create_buffer", get(buffer::create_buffer))
        .route("/aa/:address", get(buffer::get_aa))
        .route(
            "/get_expected_compensation",
            get(orders::get_expected_compensation),
        )
        .route("/create_order", post(orders::create_order))
        .route("/get_state", get(feed::get_state))
        .route("/state", get(feed::state_socket))
        .with_state(state)
}
