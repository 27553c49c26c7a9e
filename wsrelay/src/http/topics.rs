use axum::{
    extract::{Path, State},
    routing::get,
    Json, Router,
};
use serde::{Deserialize, Serialize};

use super::{AppResult, AppState};

pub fn create_topic_router() -> Router<AppState> {
    Router::new().route("/topics/{*topic}", get(list_connections))
}

#[derive(Debug, Serialize, Deserialize)]
pub struct TopicConnections {
    pub topic: String,
    pub connections: Vec<String>,
}

/// List every connection subscribed to a topic, expired rows included.
pub async fn list_connections(
    State(state): State<AppState>,
    Path(topic): Path<String>,
) -> AppResult<Json<TopicConnections>> {
    let connections = state.registry.query_all(&topic).await?;
    Ok(Json(TopicConnections { topic, connections }))
}
