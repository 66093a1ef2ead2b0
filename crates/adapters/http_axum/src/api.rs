//! JSON handlers for the status API.

use axum::Json;
use axum::Router;
use axum::extract::State;
use axum::routing::get;

use homewatch_app::ports::{StatusProvider, SystemStatus};
use homewatch_app::routing::RoutingTable;

use crate::state::AppState;

/// Routes mounted under `/api`.
pub fn routes<S: StatusProvider>() -> Router<AppState<S>> {
    Router::new()
        .route("/status", get(status::<S>))
        .route("/routing", get(routing::<S>))
}

/// `GET /api/status`
async fn status<S: StatusProvider>(State(state): State<AppState<S>>) -> Json<SystemStatus> {
    Json(state.status.status().await)
}

/// `GET /api/routing`
async fn routing<S: StatusProvider>(State(state): State<AppState<S>>) -> Json<RoutingTable> {
    Json(RoutingTable::clone(&state.status.routing()))
}
