pub mod message;
pub mod subscription;

pub use message::{
    BatchItemFailure, BatchResponse, DeliveryOutcome, MessageAttribute, OutboundMessage,
    QueueBatch, QueueRecord,
};
pub use subscription::{max_connection_duration, SubscriptionRecord};
