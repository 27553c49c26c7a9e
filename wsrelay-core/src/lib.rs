pub mod models;
pub mod repository;
pub mod service;
pub mod config;
pub mod error;
pub mod logging;
pub mod bootstrap;
pub mod resilience;

#[cfg(test)]
pub mod test_helpers;

pub use config::Config;
pub use error::{BackoffExhausted, DeliveryError, RegistryError, StoreError};
pub use repository::SubscriptionRegistry;
pub use service::{DispatchReport, Dispatcher};
