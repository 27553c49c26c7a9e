//! Queue trigger route
//!
//! Accepts one queue batch, dispatches it against a deadline derived from the
//! configured invocation timeout and answers with the batch item failures.

use axum::{
    extract::{rejection::JsonRejection, State},
    routing::post,
    Json, Router,
};
use tokio::time::Instant;

use wsrelay_core::models::{BatchResponse, QueueBatch};

use super::{AppResult, AppState};

pub fn create_dispatch_router() -> Router<AppState> {
    Router::new().route("/dispatch", post(dispatch_batch))
}

pub async fn dispatch_batch(
    State(state): State<AppState>,
    payload: Result<Json<QueueBatch>, JsonRejection>,
) -> AppResult<Json<BatchResponse>> {
    let Json(batch) = payload?;
    let deadline = Instant::now() + state.invocation_timeout;

    let messages = batch.into_messages(&state.destination_attribute);
    let report = state.dispatcher.dispatch(messages, deadline).await;

    Ok(Json(report.into_batch_response()))
}
