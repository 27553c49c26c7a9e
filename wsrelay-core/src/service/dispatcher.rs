//! Deadline-aware batch delivery
//!
//! One invocation takes one queue batch and a hard deadline, pushes messages
//! in batch order and reports the ids the queue must redeliver. Delivery
//! failures are recorded per message and never fail the batch.

use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::time::Instant;
use tracing::{debug, warn};

use super::push::PushChannel;
use crate::models::{BatchItemFailure, BatchResponse, DeliveryOutcome, OutboundMessage};

/// Time reserved before the invocation deadline for acknowledging the batch.
pub const DEFAULT_SAFETY_MARGIN: Duration = Duration::from_secs(5);

/// What to do with a message that carries no destination connection id.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MissingDestinationPolicy {
    /// Report it for redelivery. An unchanged message keeps coming back.
    #[default]
    Redeliver,
    /// Acknowledge it without delivery.
    Skip,
}

/// Per-message outcomes of one dispatch, in batch order.
#[derive(Debug, Clone, Default)]
pub struct DispatchReport {
    outcomes: Vec<(String, DeliveryOutcome)>,
}

impl DispatchReport {
    #[must_use]
    pub fn outcomes(&self) -> &[(String, DeliveryOutcome)] {
        &self.outcomes
    }

    #[must_use]
    pub fn outcome(&self, message_id: &str) -> Option<DeliveryOutcome> {
        self.outcomes
            .iter()
            .find(|(id, _)| id == message_id)
            .map(|(_, outcome)| *outcome)
    }

    /// Ids that were not delivered, in batch order.
    #[must_use]
    pub fn redelivery_ids(&self) -> Vec<&str> {
        self.outcomes
            .iter()
            .filter(|(_, outcome)| outcome.needs_redelivery())
            .map(|(id, _)| id.as_str())
            .collect()
    }

    #[must_use]
    pub fn delivered_count(&self) -> usize {
        self.outcomes
            .iter()
            .filter(|(_, outcome)| *outcome == DeliveryOutcome::Delivered)
            .count()
    }

    /// Convert into the queue's batch item failure response.
    #[must_use]
    pub fn into_batch_response(self) -> BatchResponse {
        BatchResponse {
            batch_item_failures: self
                .outcomes
                .into_iter()
                .filter(|(_, outcome)| outcome.needs_redelivery())
                .map(|(item_identifier, _)| BatchItemFailure { item_identifier })
                .collect(),
        }
    }
}

#[derive(Clone)]
pub struct Dispatcher {
    channel: Arc<dyn PushChannel>,
    safety_margin: Duration,
    missing_destination: MissingDestinationPolicy,
}

impl Dispatcher {
    #[must_use]
    pub fn new(channel: Arc<dyn PushChannel>) -> Self {
        Self {
            channel,
            safety_margin: DEFAULT_SAFETY_MARGIN,
            missing_destination: MissingDestinationPolicy::default(),
        }
    }

    #[must_use]
    pub const fn with_safety_margin(mut self, margin: Duration) -> Self {
        self.safety_margin = margin;
        self
    }

    #[must_use]
    pub const fn with_missing_destination(mut self, policy: MissingDestinationPolicy) -> Self {
        self.missing_destination = policy;
        self
    }

    #[must_use]
    pub const fn safety_margin(&self) -> Duration {
        self.safety_margin
    }

    /// Deliver `batch` in order, stopping once `deadline - safety_margin` has passed.
    ///
    /// Messages that were never visited stay `Pending` and are reported for
    /// redelivery alongside failed ones.
    pub async fn dispatch(&self, batch: Vec<OutboundMessage>, deadline: Instant) -> DispatchReport {
        let cutoff = deadline
            .checked_sub(self.safety_margin)
            .unwrap_or(deadline);
        let total = batch.len();

        let mut outcomes: Vec<(String, DeliveryOutcome)> = batch
            .iter()
            .map(|m| (m.message_id.clone(), DeliveryOutcome::Pending))
            .collect();

        for (index, message) in batch.into_iter().enumerate() {
            let outcome = self.deliver(message).await;
            outcomes[index].1 = outcome;

            if Instant::now() > cutoff {
                let unvisited = total - index - 1;
                if unvisited > 0 {
                    warn!(
                        visited = index + 1,
                        unvisited,
                        "Dispatch deadline reached, leaving remaining messages for redelivery"
                    );
                }
                break;
            }
        }

        let report = DispatchReport { outcomes };
        debug!(
            total,
            delivered = report.delivered_count(),
            redeliver = report.redelivery_ids().len(),
            "Batch dispatched"
        );
        report
    }

    async fn deliver(&self, message: OutboundMessage) -> DeliveryOutcome {
        let Some(connection_id) = message.destination else {
            warn!(
                message_id = %message.message_id,
                policy = ?self.missing_destination,
                "Message has no destination connection id, check the producer configuration"
            );
            return match self.missing_destination {
                MissingDestinationPolicy::Redeliver => DeliveryOutcome::NeedsRedelivery,
                MissingDestinationPolicy::Skip => DeliveryOutcome::Skipped,
            };
        };

        match self
            .channel
            .post_to_connection(&connection_id, message.payload)
            .await
        {
            Ok(()) => DeliveryOutcome::Delivered,
            Err(e) => {
                warn!(
                    message_id = %message.message_id,
                    connection_id = %connection_id,
                    error = %e,
                    "Failed to deliver message"
                );
                DeliveryOutcome::NeedsRedelivery
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::DeliveryError;
    use crate::service::push::MockPushChannel;
    use crate::test_helpers::QueueRecordFixture;
    use bytes::Bytes;
    use mockall::predicate::eq;

    fn message(id: &str, destination: Option<&str>) -> OutboundMessage {
        let mut record = QueueRecordFixture::new(id);
        if let Some(connection_id) = destination {
            record = record.with_attribute("connectionId", connection_id);
        }
        OutboundMessage::from_record(record.build(), "connectionId")
    }

    fn far_deadline() -> Instant {
        Instant::now() + Duration::from_secs(60)
    }

    #[tokio::test]
    async fn test_success_failure_and_missing_destination() {
        let mut channel = MockPushChannel::new();
        channel
            .expect_post_to_connection()
            .with(eq("c1"), eq(Bytes::from("payload-m1")))
            .times(1)
            .returning(|_, _| Ok(()));
        channel
            .expect_post_to_connection()
            .with(eq("c2"), eq(Bytes::from("payload-m2")))
            .times(1)
            .returning(|_, _| Err(DeliveryError::Gone));

        let dispatcher = Dispatcher::new(Arc::new(channel));
        let batch = vec![
            message("m1", Some("c1")),
            message("m2", Some("c2")),
            message("m3", None),
        ];

        let report = dispatcher.dispatch(batch, far_deadline()).await;

        assert_eq!(report.redelivery_ids(), vec!["m2", "m3"]);
        assert_eq!(report.outcome("m1"), Some(DeliveryOutcome::Delivered));
        assert_eq!(report.outcome("m2"), Some(DeliveryOutcome::NeedsRedelivery));
        assert_eq!(report.outcome("m3"), Some(DeliveryOutcome::NeedsRedelivery));
    }

    #[tokio::test]
    async fn test_skip_policy_acknowledges_unaddressed_message() {
        let mut channel = MockPushChannel::new();
        channel.expect_post_to_connection().never();

        let dispatcher = Dispatcher::new(Arc::new(channel))
            .with_missing_destination(MissingDestinationPolicy::Skip);
        let report = dispatcher
            .dispatch(vec![message("m1", None)], far_deadline())
            .await;

        assert_eq!(report.outcome("m1"), Some(DeliveryOutcome::Skipped));
        assert!(report.into_batch_response().batch_item_failures.is_empty());
    }

    #[tokio::test]
    async fn test_empty_batch() {
        let dispatcher = Dispatcher::new(Arc::new(MockPushChannel::new()));
        let report = dispatcher.dispatch(Vec::new(), far_deadline()).await;

        assert!(report.outcomes().is_empty());
        assert!(report.into_batch_response().batch_item_failures.is_empty());
    }

    #[tokio::test]
    async fn test_failures_do_not_abort_batch() {
        let mut channel = MockPushChannel::new();
        channel
            .expect_post_to_connection()
            .times(4)
            .returning(|id, _| match id {
                "bad" => Err(DeliveryError::Rejected { status: 500 }),
                _ => Ok(()),
            });

        let dispatcher = Dispatcher::new(Arc::new(channel));
        let batch = vec![
            message("m1", Some("bad")),
            message("m2", Some("ok")),
            message("m3", Some("bad")),
            message("m4", Some("ok")),
        ];
        let report = dispatcher.dispatch(batch, far_deadline()).await;

        assert_eq!(report.redelivery_ids(), vec!["m1", "m3"]);
        assert_eq!(report.delivered_count(), 2);
    }

    /// Each push takes two seconds of virtual time.
    struct SlowChannel;

    #[async_trait::async_trait]
    impl PushChannel for SlowChannel {
        async fn post_to_connection(
            &self,
            _connection_id: &str,
            _payload: Bytes,
        ) -> Result<(), DeliveryError> {
            tokio::time::sleep(Duration::from_secs(2)).await;
            Ok(())
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_deadline_cutoff_leaves_rest_for_redelivery() {
        // Cutoff at 5s: attempts end at 2s, 4s, 6s. Stop after the third.
        let dispatcher = Dispatcher::new(Arc::new(SlowChannel));
        let deadline = Instant::now() + Duration::from_secs(10);
        let batch = (1..=6)
            .map(|i| message(&format!("m{i}"), Some("c")))
            .collect();

        let report = dispatcher.dispatch(batch, deadline).await;

        assert_eq!(report.delivered_count(), 3);
        assert_eq!(report.redelivery_ids(), vec!["m4", "m5", "m6"]);
        assert_eq!(report.outcome("m4"), Some(DeliveryOutcome::Pending));
    }

    #[tokio::test(start_paused = true)]
    async fn test_deadline_already_within_margin_still_attempts_first() {
        let mut channel = MockPushChannel::new();
        channel
            .expect_post_to_connection()
            .times(1)
            .returning(|_, _| Ok(()));

        let dispatcher = Dispatcher::new(Arc::new(channel));
        let deadline = Instant::now() + Duration::from_secs(1);

        let report = dispatcher
            .dispatch(vec![message("m1", Some("c")), message("m2", Some("c"))], deadline)
            .await;

        assert_eq!(report.redelivery_ids(), vec!["m2"]);
    }

    #[test]
    fn test_batch_response_order_follows_batch() {
        let report = DispatchReport {
            outcomes: vec![
                ("b".to_string(), DeliveryOutcome::NeedsRedelivery),
                ("a".to_string(), DeliveryOutcome::Delivered),
                ("c".to_string(), DeliveryOutcome::Pending),
            ],
        };

        let ids: Vec<String> = report
            .into_batch_response()
            .batch_item_failures
            .into_iter()
            .map(|f| f.item_identifier)
            .collect();
        assert_eq!(ids, vec!["b", "c"]);
    }

    #[test]
    fn test_policy_deserializes_lowercase() {
        let policy: MissingDestinationPolicy = serde_json::from_str("\"skip\"").unwrap();
        assert_eq!(policy, MissingDestinationPolicy::Skip);
    }
}
