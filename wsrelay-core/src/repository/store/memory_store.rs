//! In-process subscription store
//!
//! Used for single-node development and tests. Rows are ordered by sort key
//! within a partition, and expired rows stay readable until `purge_expired`
//! runs, the same way a real table's background expiry lags behind.
//! `start_expiry_sweep` runs the purge on a timer.

use std::collections::BTreeMap;
use std::ops::Bound;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use parking_lot::RwLock;
use tokio::task::JoinHandle;

use super::{Item, ItemKey, QueryPage, SubscriptionStore};
use crate::error::StoreError;

pub const DEFAULT_PAGE_SIZE: usize = 100;

pub const DEFAULT_SWEEP_INTERVAL: Duration = Duration::from_secs(60);

type Partition = BTreeMap<String, Item>;

pub struct MemorySubscriptionStore {
    partitions: RwLock<BTreeMap<String, Partition>>,
    page_size: usize,
    /// Maximum number of items applied per `batch_write` call.
    batch_limit: Option<usize>,
}

impl Default for MemorySubscriptionStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemorySubscriptionStore {
    #[must_use]
    pub fn new() -> Self {
        Self {
            partitions: RwLock::new(BTreeMap::new()),
            page_size: DEFAULT_PAGE_SIZE,
            batch_limit: None,
        }
    }

    #[must_use]
    pub fn with_page_size(mut self, page_size: usize) -> Self {
        self.page_size = page_size.max(1);
        self
    }

    #[must_use]
    pub fn with_batch_limit(mut self, limit: usize) -> Self {
        self.batch_limit = Some(limit);
        self
    }

    /// Drop every row whose expiry is at or before `now_epoch_seconds`.
    /// Returns the number of rows removed.
    pub fn purge_expired(&self, now_epoch_seconds: i64) -> usize {
        let mut partitions = self.partitions.write();
        let mut removed = 0;
        partitions.retain(|_, partition| {
            partition.retain(|_, item| {
                let keep = ItemKey::from_item(item)
                    .map(|key| key.expiry_epoch_seconds > now_epoch_seconds)
                    .unwrap_or(false);
                if !keep {
                    removed += 1;
                }
                keep
            });
            !partition.is_empty()
        });
        if removed > 0 {
            tracing::debug!(removed, "Purged expired subscriptions");
        }
        removed
    }

    /// Purge expired rows every `period` until the store is dropped.
    pub fn start_expiry_sweep(self: &Arc<Self>, period: Duration) -> JoinHandle<()> {
        let store = Arc::downgrade(self);

        tokio::spawn(async move {
            let mut interval = tokio::time::interval(period);
            loop {
                interval.tick().await;
                let Some(store) = store.upgrade() else {
                    tracing::debug!("Subscription store dropped, stopping expiry sweep");
                    return;
                };
                store.purge_expired(Utc::now().timestamp());
            }
        })
    }

    /// Total number of stored rows, expired or not.
    #[must_use]
    pub fn len(&self) -> usize {
        self.partitions.read().values().map(BTreeMap::len).sum()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn insert(partitions: &mut BTreeMap<String, Partition>, item: Item) -> Result<(), StoreError> {
        let key = ItemKey::from_item(&item)?;
        partitions
            .entry(key.partition_key)
            .or_default()
            .insert(key.sort_key, item);
        Ok(())
    }
}

#[async_trait]
impl SubscriptionStore for MemorySubscriptionStore {
    async fn put_item(&self, item: Item) -> Result<(), StoreError> {
        Self::insert(&mut self.partitions.write(), item)
    }

    async fn batch_write(&self, mut items: Vec<Item>) -> Result<Vec<Item>, StoreError> {
        let accepted = self.batch_limit.unwrap_or(items.len()).min(items.len());
        let unprocessed = items.split_off(accepted);

        // Validate before touching the table so a bad item leaves no partial write.
        for item in &items {
            ItemKey::from_item(item)?;
        }
        let mut partitions = self.partitions.write();
        for item in items {
            Self::insert(&mut partitions, item)?;
        }

        Ok(unprocessed)
    }

    async fn query_page(
        &self,
        partition_key: &str,
        cursor: Option<String>,
    ) -> Result<QueryPage, StoreError> {
        let partitions = self.partitions.read();
        let Some(partition) = partitions.get(partition_key) else {
            return Ok(QueryPage::default());
        };

        let lower = match cursor {
            Some(ref after) => Bound::Excluded(after.clone()),
            None => Bound::Unbounded,
        };
        let mut rows = partition.range((lower, Bound::Unbounded));

        let mut items = Vec::with_capacity(self.page_size);
        let mut last_key = None;
        for (sort_key, item) in rows.by_ref().take(self.page_size) {
            items.push(item.clone());
            last_key = Some(sort_key.clone());
        }
        let next_cursor = if rows.next().is_some() { last_key } else { None };

        Ok(QueryPage { items, next_cursor })
    }
}
