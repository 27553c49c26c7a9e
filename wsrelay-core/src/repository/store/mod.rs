//! Durable keyed storage for subscription rows
//!
//! The registry talks to storage through `SubscriptionStore`, which models a
//! two-part keyed table with a lazily honoured expiry attribute:
//!
//! ```text
//! pk          | sk                        | ttl        | t       | id
//! ------------|---------------------------|------------|---------|-------
//! topic/ab12  | 20240309170405/<conn_id>  | 1710012345 | ab12    | <conn_id>
//! topic/ab12  | 20240309170411/<conn_id>  | 1710012351 | ab12    | <conn_id>
//! ```

pub mod memory_store;
pub mod redis_store;

use async_trait::async_trait;
use serde_json::Value;

use crate::error::StoreError;
use crate::models::subscription::{EXPIRY_ATTR, PARTITION_KEY_ATTR, SORT_KEY_ATTR};

pub use memory_store::MemorySubscriptionStore;
pub use redis_store::RedisSubscriptionStore;

/// One stored row as an attribute map.
pub type Item = serde_json::Map<String, Value>;

/// One page of a partition read.
#[derive(Debug, Clone, Default)]
pub struct QueryPage {
    pub items: Vec<Item>,
    /// Cursor for the next page, `None` when the partition is exhausted.
    pub next_cursor: Option<String>,
}

#[async_trait]
pub trait SubscriptionStore: Send + Sync {
    /// Unconditionally write one item.
    async fn put_item(&self, item: Item) -> Result<(), StoreError>;

    /// Write many items. The store may apply only part of the request and
    /// returns the items it did not apply; an empty result means all were written.
    async fn batch_write(&self, items: Vec<Item>) -> Result<Vec<Item>, StoreError>;

    /// Read one page of items under `partition_key`, starting after `cursor`.
    async fn query_page(
        &self,
        partition_key: &str,
        cursor: Option<String>,
    ) -> Result<QueryPage, StoreError>;
}

/// Key attributes every stored item carries.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ItemKey {
    pub partition_key: String,
    pub sort_key: String,
    pub expiry_epoch_seconds: i64,
}

impl ItemKey {
    pub fn from_item(item: &Item) -> Result<Self, StoreError> {
        let partition_key = item
            .get(PARTITION_KEY_ATTR)
            .and_then(Value::as_str)
            .ok_or(StoreError::MissingAttribute(PARTITION_KEY_ATTR))?;
        let sort_key = item
            .get(SORT_KEY_ATTR)
            .and_then(Value::as_str)
            .ok_or(StoreError::MissingAttribute(SORT_KEY_ATTR))?;
        let expiry_epoch_seconds = item
            .get(EXPIRY_ATTR)
            .and_then(Value::as_i64)
            .ok_or(StoreError::MissingAttribute(EXPIRY_ATTR))?;

        Ok(Self {
            partition_key: partition_key.to_string(),
            sort_key: sort_key.to_string(),
            expiry_epoch_seconds,
        })
    }
}
