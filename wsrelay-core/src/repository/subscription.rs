use std::sync::Arc;

use chrono::{DateTime, Utc};
use futures::stream::{self, BoxStream, StreamExt, TryStreamExt};
use serde::ser::Error as _;

use super::store::{Item, SubscriptionStore};
use crate::error::RegistryError;
use crate::models::SubscriptionRecord;
use crate::resilience::backoff::Backoff;

/// Retry up to 5 times, over 6.2 seconds.
pub const DEFAULT_BACKOFF_CEILING: u32 = 5;

/// Source of "now" for record timestamps.
pub type Clock = Arc<dyn Fn() -> DateTime<Utc> + Send + Sync>;

/// Topic to connection lookup
///
/// All writes are blind upserts. There is no delete; rows leave through
/// storage-side expiry.
#[derive(Clone)]
pub struct SubscriptionRegistry {
    store: Arc<dyn SubscriptionStore>,
    backoff_ceiling: u32,
    clock: Clock,
}

impl SubscriptionRegistry {
    #[must_use]
    pub fn new(store: Arc<dyn SubscriptionStore>) -> Self {
        Self {
            store,
            backoff_ceiling: DEFAULT_BACKOFF_CEILING,
            clock: Arc::new(Utc::now),
        }
    }

    #[must_use]
    pub const fn with_backoff_ceiling(mut self, ceiling: u32) -> Self {
        self.backoff_ceiling = ceiling;
        self
    }

    #[must_use]
    pub fn with_clock(mut self, clock: Clock) -> Self {
        self.clock = clock;
        self
    }

    /// Subscribe `connection_id` to one topic.
    pub async fn put(&self, connection_id: &str, topic: &str) -> Result<(), RegistryError> {
        let record = SubscriptionRecord::new(topic, connection_id, (self.clock)());
        let item = encode(&record)?;
        self.store.put_item(item).await?;

        tracing::debug!(connection_id = %connection_id, topic = %topic, "Subscription stored");
        Ok(())
    }

    /// Subscribe `connection_id` to every topic in one bulk write.
    ///
    /// Items the store leaves unprocessed are resubmitted after a backoff
    /// until none remain or the backoff ceiling is reached.
    pub async fn batch_put(
        &self,
        connection_id: &str,
        topics: &[String],
    ) -> Result<(), RegistryError> {
        let now = (self.clock)();
        let mut pending = topics
            .iter()
            .map(|topic| encode(&SubscriptionRecord::new(topic, connection_id, now)))
            .collect::<Result<Vec<_>, _>>()?;

        let mut bo = Backoff::new(self.backoff_ceiling);
        while !pending.is_empty() {
            pending = self.store.batch_write(pending).await?;
            if pending.is_empty() {
                break;
            }
            tracing::debug!(
                connection_id = %connection_id,
                unprocessed = pending.len(),
                attempt = bo.attempt(),
                "Bulk write left unprocessed items"
            );
            if let Err(e) = bo.wait().await {
                tracing::warn!(
                    connection_id = %connection_id,
                    unprocessed = pending.len(),
                    "Giving up on bulk subscription write"
                );
                return Err(e.into());
            }
        }

        tracing::debug!(
            connection_id = %connection_id,
            topics = topics.len(),
            "Subscriptions stored"
        );
        Ok(())
    }

    /// Lazily read every connection subscribed to `topic`, page by page.
    ///
    /// Order follows storage pagination. Rows that have expired but have not
    /// yet been removed by storage are included. The stream ends after the
    /// first error.
    pub fn query(&self, topic: &str) -> BoxStream<'static, Result<String, RegistryError>> {
        let store = Arc::clone(&self.store);
        let partition_key = SubscriptionRecord::partition_key_for(topic);

        // Outer None: finished. Some(None): first page. Some(Some(c)): resume at c.
        stream::try_unfold(Some(None), move |cursor: Option<Option<String>>| {
            let store = Arc::clone(&store);
            let partition_key = partition_key.clone();
            async move {
                match cursor {
                    None => Ok(None),
                    Some(cursor) => fetch_page(store.as_ref(), &partition_key, cursor)
                        .await
                        .map(|(connection_ids, next)| {
                            let ids = connection_ids.into_iter().map(Ok::<_, RegistryError>);
                            Some((stream::iter(ids), next.map(Some)))
                        }),
                }
            }
        })
        .try_flatten()
        .boxed()
    }

    /// Collect `query` into a vector.
    pub async fn query_all(&self, topic: &str) -> Result<Vec<String>, RegistryError> {
        self.query(topic).try_collect().await
    }
}

/// Read one page and decode it into connection ids.
async fn fetch_page(
    store: &dyn SubscriptionStore,
    partition_key: &str,
    cursor: Option<String>,
) -> Result<(Vec<String>, Option<String>), RegistryError> {
    let page = store.query_page(partition_key, cursor).await?;
    let connection_ids = page
        .items
        .into_iter()
        .map(|item| decode(item).map(|record| record.connection_id))
        .collect::<Result<Vec<_>, _>>()?;
    Ok((connection_ids, page.next_cursor))
}

fn encode(record: &SubscriptionRecord) -> Result<Item, RegistryError> {
    match serde_json::to_value(record).map_err(RegistryError::Encoding)? {
        serde_json::Value::Object(item) => Ok(item),
        _ => Err(RegistryError::Encoding(serde_json::Error::custom(
            "subscription record did not encode to an object",
        ))),
    }
}

fn decode(item: Item) -> Result<SubscriptionRecord, RegistryError> {
    serde_json::from_value(serde_json::Value::Object(item)).map_err(RegistryError::Decoding)
}
