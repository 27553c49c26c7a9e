use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

/// Storage attribute holding the partition key.
pub const PARTITION_KEY_ATTR: &str = "pk";
/// Storage attribute holding the sort key.
pub const SORT_KEY_ATTR: &str = "sk";
/// Storage attribute holding the expiry in epoch seconds.
pub const EXPIRY_ATTR: &str = "ttl";

/// Sort key timestamp layout (UTC).
pub const SORT_KEY_TIME_FORMAT: &str = "%Y%m%d%H%M%S";

/// Web socket connections are closed by the gateway after two hours, so a
/// subscription is kept for a little longer than that and then expires.
#[must_use]
pub fn max_connection_duration() -> Duration {
    Duration::hours(2) + Duration::minutes(15)
}

/// One subscription of a connection to a topic.
///
/// Records are written blindly and never updated. Subscribing twice yields
/// two rows; both disappear once their expiry passes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubscriptionRecord {
    #[serde(rename = "pk")]
    pub partition_key: String,
    #[serde(rename = "sk")]
    pub sort_key: String,
    #[serde(rename = "ttl")]
    pub expiry_epoch_seconds: i64,
    /// Topic namespace that can be subscribed to, e.g. `users/123`.
    #[serde(rename = "t")]
    pub topic: String,
    /// Connection subscribed to the topic.
    #[serde(rename = "id")]
    pub connection_id: String,
}

impl SubscriptionRecord {
    #[must_use]
    pub fn new(topic: &str, connection_id: &str, now: DateTime<Utc>) -> Self {
        Self {
            partition_key: Self::partition_key_for(topic),
            sort_key: format!("{}/{connection_id}", now.format(SORT_KEY_TIME_FORMAT)),
            expiry_epoch_seconds: (now + max_connection_duration()).timestamp(),
            topic: topic.to_string(),
            connection_id: connection_id.to_string(),
        }
    }

    #[must_use]
    pub fn partition_key_for(topic: &str) -> String {
        format!("topic/{topic}")
    }

    /// Whether the storage layer is allowed to drop this record.
    #[must_use]
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expiry_epoch_seconds <= now.timestamp()
    }
}
