//! Redis-backed subscription store
//!
//! Each partition key maps to one hash:
//! `"{prefix}{table}:{pk}"`, field = sort key, value = JSON item.
//! Each field carries its own expiry, set with `HEXPIREAT` to the row's `ttl`,
//! so Redis removes a row on time even while newer rows keep the hash alive.
//! The hash itself disappears with its last field. Requires Redis 7.4 or later.

use std::future::Future;
use std::time::Duration;

use async_trait::async_trait;
use redis::aio::ConnectionManager as RedisConnectionManager;

use super::{Item, ItemKey, QueryPage, SubscriptionStore};
use crate::error::StoreError;
use crate::resilience::timeout::REDIS_OPERATION_TIMEOUT;

/// Per-call acceptance limit for bulk writes.
pub const DEFAULT_MAX_BATCH_WRITE: usize = 25;

pub const DEFAULT_PAGE_SIZE: usize = 100;

#[derive(Clone)]
pub struct RedisSubscriptionStore {
    redis: RedisConnectionManager,
    key_prefix: String,
    table_name: String,
    page_size: usize,
    max_batch_write: usize,
    timeout: Duration,
}

impl RedisSubscriptionStore {
    #[must_use]
    pub fn new(redis: RedisConnectionManager, key_prefix: &str, table_name: &str) -> Self {
        Self {
            redis,
            key_prefix: key_prefix.to_string(),
            table_name: table_name.to_string(),
            page_size: DEFAULT_PAGE_SIZE,
            max_batch_write: DEFAULT_MAX_BATCH_WRITE,
            timeout: REDIS_OPERATION_TIMEOUT,
        }
    }

    #[must_use]
    pub fn with_page_size(mut self, page_size: usize) -> Self {
        self.page_size = page_size.max(1);
        self
    }

    #[must_use]
    pub fn with_max_batch_write(mut self, max_batch_write: usize) -> Self {
        self.max_batch_write = max_batch_write.max(1);
        self
    }

    #[must_use]
    pub const fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    fn partition_key(&self, partition_key: &str) -> String {
        format!("{}{}:{partition_key}", self.key_prefix, self.table_name)
    }

    async fn bounded<T, F>(&self, fut: F) -> Result<T, StoreError>
    where
        F: Future<Output = redis::RedisResult<T>>,
    {
        match tokio::time::timeout(self.timeout, fut).await {
            Ok(result) => result.map_err(StoreError::from),
            Err(_) => Err(StoreError::Timeout(self.timeout)),
        }
    }

    /// Queue `HSET` + per-field `HEXPIREAT` for one item.
    fn queue_write(&self, pipe: &mut redis::Pipeline, item: &Item) -> Result<(), StoreError> {
        let key = ItemKey::from_item(item)?;
        let hash_key = self.partition_key(&key.partition_key);
        let json = serde_json::Value::Object(item.clone()).to_string();

        pipe.cmd("HSET")
            .arg(&hash_key)
            .arg(&key.sort_key)
            .arg(json)
            .ignore();
        pipe.cmd("HEXPIREAT")
            .arg(&hash_key)
            .arg(key.expiry_epoch_seconds)
            .arg("FIELDS")
            .arg(1)
            .arg(&key.sort_key)
            .ignore();
        Ok(())
    }
}

#[async_trait]
impl SubscriptionStore for RedisSubscriptionStore {
    async fn put_item(&self, item: Item) -> Result<(), StoreError> {
        let mut pipe = redis::pipe();
        pipe.atomic();
        self.queue_write(&mut pipe, &item)?;

        let mut conn = self.redis.clone();
        let _: () = self.bounded(pipe.query_async(&mut conn)).await?;
        Ok(())
    }

    async fn batch_write(&self, mut items: Vec<Item>) -> Result<Vec<Item>, StoreError> {
        let accepted = self.max_batch_write.min(items.len());
        let unprocessed = items.split_off(accepted);
        if items.is_empty() {
            return Ok(unprocessed);
        }

        let mut pipe = redis::pipe();
        pipe.atomic();
        for item in &items {
            self.queue_write(&mut pipe, item)?;
        }

        let mut conn = self.redis.clone();
        let _: () = self.bounded(pipe.query_async(&mut conn)).await?;

        tracing::debug!(
            written = items.len(),
            unprocessed = unprocessed.len(),
            "Batch write applied"
        );
        Ok(unprocessed)
    }

    async fn query_page(
        &self,
        partition_key: &str,
        cursor: Option<String>,
    ) -> Result<QueryPage, StoreError> {
        let cursor: u64 = match cursor {
            Some(c) => c.parse().map_err(|_| StoreError::InvalidCursor(c))?,
            None => 0,
        };
        let hash_key = self.partition_key(partition_key);
        let mut conn = self.redis.clone();

        // HSCAN returns (new_cursor, [field, value, field, value, ...])
        let (next, flat): (u64, Vec<String>) = self
            .bounded(
                redis::cmd("HSCAN")
                    .arg(&hash_key)
                    .arg(cursor)
                    .arg("COUNT")
                    .arg(self.page_size)
                    .query_async(&mut conn),
            )
            .await?;

        let items = flat
            .chunks_exact(2)
            .map(|pair| serde_json::from_str::<Item>(&pair[1]).map_err(StoreError::CorruptItem))
            .collect::<Result<Vec<_>, _>>()?;

        // cursor returns to 0 when the scan is complete
        let next_cursor = (next != 0).then(|| next.to_string());
        Ok(QueryPage { items, next_cursor })
    }
}
