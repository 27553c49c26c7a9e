//! HTTP adapter surface for the relay

mod connection;
mod dispatch;
mod error;
mod health;
mod topics;

use std::sync::Arc;
use std::time::Duration;

use axum::Router;

use wsrelay_core::{bootstrap::Services, Dispatcher, SubscriptionRegistry};

pub use error::{AppError, AppResult};

/// Shared state for every handler
#[derive(Clone)]
pub struct AppState {
    pub registry: Arc<SubscriptionRegistry>,
    pub dispatcher: Arc<Dispatcher>,
    pub destination_attribute: Arc<str>,
    pub invocation_timeout: Duration,
}

impl From<Services> for AppState {
    fn from(services: Services) -> Self {
        Self {
            registry: services.registry,
            dispatcher: services.dispatcher,
            destination_attribute: Arc::from(services.destination_attribute),
            invocation_timeout: services.invocation_timeout,
        }
    }
}

/// Build the full router
pub fn create_router(state: AppState) -> Router {
    Router::new()
        .merge(health::create_health_router())
        .merge(connection::create_connection_router())
        .merge(topics::create_topic_router())
        .merge(dispatch::create_dispatch_router())
        .with_state(state)
}
