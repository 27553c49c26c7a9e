//! Connection event routes
//!
//! Stand-ins for the gateway's connect and default-route adapters.

use axum::{
    extract::{rejection::JsonRejection, Path, State},
    http::StatusCode,
    routing::post,
    Json, Router,
};
use serde::{Deserialize, Serialize};

use super::{AppError, AppResult, AppState};

pub fn create_connection_router() -> Router<AppState> {
    Router::new()
        .route(
            "/connections/{connection_id}/subscriptions",
            post(subscribe),
        )
        .route("/connections/{connection_id}/default", post(default_route))
}

#[derive(Debug, Deserialize)]
pub struct SubscribeRequest {
    pub topics: Vec<String>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct DefaultResponse {
    pub ok: bool,
}

/// Subscribe a connection to one or more topics.
pub async fn subscribe(
    State(state): State<AppState>,
    Path(connection_id): Path<String>,
    payload: Result<Json<SubscribeRequest>, JsonRejection>,
) -> AppResult<StatusCode> {
    let Json(request) = payload?;

    match request.topics.as_slice() {
        [] => return Err(AppError::bad_request("topics must not be empty")),
        [topic] => state.registry.put(&connection_id, topic).await?,
        topics => state.registry.batch_put(&connection_id, topics).await?,
    }

    tracing::info!(
        connection_id = %connection_id,
        topics = request.topics.len(),
        "Connection subscribed"
    );
    Ok(StatusCode::NO_CONTENT)
}

/// Acknowledge a message sent on the default route.
pub async fn default_route(Path(connection_id): Path<String>) -> Json<DefaultResponse> {
    tracing::info!(connection_id = %connection_id, "Default route message received");
    Json(DefaultResponse { ok: true })
}
