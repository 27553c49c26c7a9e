use std::time::Duration;

use thiserror::Error;

/// A bounded retry loop ran out of attempts while work remained.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
#[error("backoff: max backoff reached after {attempts} attempt(s)")]
pub struct BackoffExhausted {
    pub attempts: u32,
}

/// Failures raised by a `SubscriptionStore` backend.
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Redis error: {0}")]
    Redis(#[from] redis::RedisError),

    #[error("Storage operation timed out after {0:?}")]
    Timeout(Duration),

    #[error("Item is missing required attribute '{0}'")]
    MissingAttribute(&'static str),

    #[error("Invalid pagination cursor: {0}")]
    InvalidCursor(String),

    #[error("Stored item could not be parsed: {0}")]
    CorruptItem(#[source] serde_json::Error),
}

/// Errors surfaced by the topic/connection registry.
#[derive(Error, Debug)]
pub enum RegistryError {
    #[error("Failed to encode subscription record: {0}")]
    Encoding(#[source] serde_json::Error),

    #[error("Subscription store unavailable: {0}")]
    StoreUnavailable(#[source] StoreError),

    #[error(transparent)]
    BackoffExhausted(#[from] BackoffExhausted),

    #[error("Failed to decode subscription page: {0}")]
    Decoding(#[source] serde_json::Error),
}

impl From<StoreError> for RegistryError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::CorruptItem(e) => Self::Decoding(e),
            other => Self::StoreUnavailable(other),
        }
    }
}

/// A single push to a connection failed. Never escapes the dispatcher.
#[derive(Error, Debug)]
pub enum DeliveryError {
    #[error("Connection is gone")]
    Gone,

    #[error("Push rejected with status {status}")]
    Rejected { status: u16 },

    #[error("Push transport error: {0}")]
    Transport(#[from] reqwest::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_corrupt_item_maps_to_decoding() {
        let parse_err = serde_json::from_str::<serde_json::Value>("{").unwrap_err();
        let err: RegistryError = StoreError::CorruptItem(parse_err).into();
        assert!(matches!(err, RegistryError::Decoding(_)));
    }

    #[test]
    fn test_store_failures_map_to_unavailable() {
        let err: RegistryError = StoreError::Timeout(Duration::from_secs(5)).into();
        assert!(matches!(err, RegistryError::StoreUnavailable(StoreError::Timeout(_))));

        let err: RegistryError = StoreError::MissingAttribute("pk").into();
        assert!(err.to_string().contains("'pk'"));
    }

    #[test]
    fn test_backoff_exhausted_display() {
        let err: RegistryError = BackoffExhausted { attempts: 5 }.into();
        assert_eq!(err.to_string(), "backoff: max backoff reached after 5 attempt(s)");
    }
}
