//! Pending-state feed endpoints

use axum::{
    extract::{ws::WebSocketUpgrade, State},
    response::Response,
    Json,
};
use ledger_client::UpcomingSnapshot;

use crate::dto::Success;
use crate::AppState;

/// GET /get_state - Current snapshot of the watched contracts
pub async fn get_state(State(state): State<AppState>) -> Json<Success<UpcomingSnapshot>> {
    Json(Success::new(state.feed().current().await))
}

/// GET /state - Websocket: `{snapshot}` on connect, then `{update}` diffs
pub async fn state_socket(State(state): State<AppState>, ws: WebSocketUpgrade) -> Response {
    let feed = state.feed().clone();
    ws.on_upgrade(move |socket| async move { feed.serve(socket).await })
}
