use std::collections::HashMap;

use bytes::Bytes;
use serde::{Deserialize, Serialize};

/// Batch of queued messages as delivered by the queue trigger.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct QueueBatch {
    #[serde(rename = "Records", default)]
    pub records: Vec<QueueRecord>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QueueRecord {
    pub message_id: String,
    #[serde(default)]
    pub message_attributes: HashMap<String, MessageAttribute>,
    #[serde(default)]
    pub body: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MessageAttribute {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub string_value: Option<String>,
    #[serde(default = "default_data_type")]
    pub data_type: String,
}

fn default_data_type() -> String {
    "String".to_string()
}

impl MessageAttribute {
    #[must_use]
    pub fn string(value: impl Into<String>) -> Self {
        Self {
            string_value: Some(value.into()),
            data_type: default_data_type(),
        }
    }
}

/// A message addressed to at most one connection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutboundMessage {
    pub message_id: String,
    pub destination: Option<String>,
    pub payload: Bytes,
}

impl OutboundMessage {
    /// Read the destination from `destination_attribute`. An attribute without
    /// a string value counts as no destination.
    #[must_use]
    pub fn from_record(record: QueueRecord, destination_attribute: &str) -> Self {
        let destination = record
            .message_attributes
            .get(destination_attribute)
            .and_then(|attr| attr.string_value.clone());
        Self {
            message_id: record.message_id,
            destination,
            payload: Bytes::from(record.body),
        }
    }
}

impl QueueBatch {
    #[must_use]
    pub fn into_messages(self, destination_attribute: &str) -> Vec<OutboundMessage> {
        self.records
            .into_iter()
            .map(|record| OutboundMessage::from_record(record, destination_attribute))
            .collect()
    }
}

/// Per-message state within one dispatch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DeliveryOutcome {
    /// Not visited before the deadline cut-off.
    Pending,
    Delivered,
    NeedsRedelivery,
    /// Unaddressable and dropped on purpose (`missing_destination = skip`).
    Skipped,
}

impl DeliveryOutcome {
    /// Whether the queue should hand this message out again.
    #[must_use]
    pub const fn needs_redelivery(self) -> bool {
        matches!(self, Self::Pending | Self::NeedsRedelivery)
    }
}

/// Reply to the queue: only failed ids are listed.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchResponse {
    pub batch_item_failures: Vec<BatchItemFailure>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchItemFailure {
    pub item_identifier: String,
}
