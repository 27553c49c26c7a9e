//! Test helpers and fixtures for wsrelay-core tests

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{TimeZone, Utc};

use crate::error::StoreError;
use crate::models::{MessageAttribute, QueueRecord};
use crate::repository::{Clock, Item, QueryPage, SubscriptionStore};

/// Clock pinned to 2024-03-09T17:04:05Z
pub fn fixed_clock() -> Clock {
    Arc::new(|| Utc.with_ymd_and_hms(2024, 3, 9, 17, 4, 5).unwrap())
}

/// Store whose every call times out.
pub struct FailingStore;

#[async_trait]
impl SubscriptionStore for FailingStore {
    async fn put_item(&self, _item: Item) -> Result<(), StoreError> {
        Err(StoreError::Timeout(Duration::from_secs(5)))
    }

    async fn batch_write(&self, _items: Vec<Item>) -> Result<Vec<Item>, StoreError> {
        Err(StoreError::Timeout(Duration::from_secs(5)))
    }

    async fn query_page(
        &self,
        _partition_key: &str,
        _cursor: Option<String>,
    ) -> Result<QueryPage, StoreError> {
        Err(StoreError::Timeout(Duration::from_secs(5)))
    }
}

/// Test fixture builder for a queue record
pub struct QueueRecordFixture {
    message_id: String,
    attributes: HashMap<String, MessageAttribute>,
    body: String,
}

impl QueueRecordFixture {
    pub fn new(message_id: &str) -> Self {
        Self {
            message_id: message_id.to_string(),
            attributes: HashMap::new(),
            body: format!("payload-{message_id}"),
        }
    }

    pub fn with_attribute(mut self, name: &str, value: &str) -> Self {
        self.attributes
            .insert(name.to_string(), MessageAttribute::string(value));
        self
    }

    pub fn build(self) -> QueueRecord {
        QueueRecord {
            message_id: self.message_id,
            message_attributes: self.attributes,
            body: self.body,
        }
    }
}
