//! Service initialization and dependency injection

use std::sync::Arc;
use std::time::Duration;

use tracing::info;

use crate::{
    config::RegistryBackend,
    repository::{
        MemorySubscriptionStore, RedisSubscriptionStore, SubscriptionRegistry, SubscriptionStore,
    },
    service::{Dispatcher, HttpPushChannel, PushChannel},
    Config,
};

/// Container for all initialized services
#[derive(Clone)]
pub struct Services {
    /// Topic to connection registry
    pub registry: Arc<SubscriptionRegistry>,
    /// Batch dispatcher over the push channel
    pub dispatcher: Arc<Dispatcher>,
    /// Message attribute carrying the destination connection id
    pub destination_attribute: String,
    /// Deadline budget for one `/dispatch` invocation
    pub invocation_timeout: Duration,
}

/// Initialize the registry and dispatcher from configuration
pub async fn init_services(config: &Config) -> Result<Services, anyhow::Error> {
    info!("Initializing services...");

    let store = init_store(config).await?;
    let registry = SubscriptionRegistry::new(store)
        .with_backoff_ceiling(config.registry.backoff_ceiling);
    info!(
        backoff_ceiling = config.registry.backoff_ceiling,
        "Subscription registry initialized"
    );

    let channel: Arc<dyn PushChannel> = Arc::new(HttpPushChannel::with_timeout(
        &config.delivery.endpoint,
        Duration::from_millis(config.delivery.request_timeout_ms),
    )?);
    let dispatcher = Dispatcher::new(channel)
        .with_safety_margin(config.dispatcher.safety_margin())
        .with_missing_destination(config.dispatcher.missing_destination);
    info!(
        endpoint = %config.delivery.endpoint,
        safety_margin_ms = config.dispatcher.safety_margin_ms,
        missing_destination = ?config.dispatcher.missing_destination,
        "Dispatcher initialized"
    );

    Ok(Services {
        registry: Arc::new(registry),
        dispatcher: Arc::new(dispatcher),
        destination_attribute: config.delivery.destination_attribute.clone(),
        invocation_timeout: config.dispatcher.invocation_timeout(),
    })
}

async fn init_store(config: &Config) -> Result<Arc<dyn SubscriptionStore>, anyhow::Error> {
    match config.registry.backend {
        RegistryBackend::Redis => {
            let client = redis::Client::open(config.redis.url.clone())?;
            let conn = redis::aio::ConnectionManager::new(client).await?;
            info!(
                table = %config.registry.table_name,
                key_prefix = %config.redis.key_prefix,
                "Using Redis subscription store"
            );
            Ok(Arc::new(
                RedisSubscriptionStore::new(
                    conn,
                    &config.redis.key_prefix,
                    &config.registry.table_name,
                )
                .with_page_size(config.registry.page_size)
                .with_max_batch_write(config.registry.max_batch_write)
                .with_timeout(Duration::from_millis(config.redis.operation_timeout_ms)),
            ))
        }
        RegistryBackend::Memory => {
            let store = Arc::new(
                MemorySubscriptionStore::new()
                    .with_page_size(config.registry.page_size)
                    .with_batch_limit(config.registry.max_batch_write),
            );
            store.start_expiry_sweep(config.registry.sweep_interval());
            info!(
                sweep_interval_secs = config.registry.sweep_interval_secs,
                "Using in-memory subscription store"
            );
            Ok(store)
        }
    }
}
