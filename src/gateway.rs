//! Request/reply gateway: shared plumbing for any caller that needs to
//! publish a request and wait for a correlated reply on a private queue.
//! Used directly by [`crate::client::RecommendationClient`]; the leader's
//! task dispatcher implements its own fan-out/collect logic on top of the
//! lower-level broker primitives instead, since it waits for *several*
//! proposals rather than one reply.

use std::sync::Arc;
use std::time::Duration;

use uuid::Uuid;

use crate::broker::{BrokerAdapter, PublishOptions};
use crate::error::ParkClusterError;
use crate::pf_trace;

/// Generic correlated request/reply helper over a [`BrokerAdapter`].
pub struct RequestReplyGateway {
    broker: Arc<dyn BrokerAdapter>,
}

impl RequestReplyGateway {
    pub fn new(broker: Arc<dyn BrokerAdapter>) -> Self {
        RequestReplyGateway { broker }
    }

    /// Publishes `body` to `queue` with a fresh correlation ID and a
    /// freshly declared exclusive reply queue, then waits up to `timeout`
    /// for the first delivery on the reply queue whose correlation ID
    /// matches. Mismatched deliveries are dropped rather than returned.
    /// On timeout, returns [`ParkClusterError::Timeout`]; the caller
    /// cannot distinguish "quorum never formed" from "leader crashed" —
    /// both manifest as a timeout.
    pub async fn call(
        &self,
        queue: &str,
        body: &[u8],
        timeout: Duration,
    ) -> Result<Vec<u8>, ParkClusterError> {
        let reply_to = self.broker.declare_exclusive_queue("reply").await?;
        let correlation_id = Uuid::new_v4().to_string();
        let mut consumer = self.broker.consume(&reply_to).await?;

        self.broker
            .publish(
                queue,
                body,
                PublishOptions::with_correlation(correlation_id.clone(), reply_to.clone()),
            )
            .await?;
        pf_trace!(
            "sent request to {} with correlation {} reply_to {}",
            queue,
            correlation_id,
            reply_to
        );

        let wait = async {
            loop {
                match consumer.recv().await? {
                    None => {
                        return Err(ParkClusterError::transport(
                            "reply consumer closed before a matching reply arrived",
                        ));
                    }
                    Some(delivery) => {
                        if delivery.correlation_id.as_deref() == Some(correlation_id.as_str()) {
                            return Ok(delivery.body);
                        }
                        pf_trace!(
                            "dropped reply with non-matching correlation id {:?}",
                            delivery.correlation_id
                        );
                    }
                }
            }
        };

        match tokio::time::timeout(timeout, wait).await {
            Ok(inner) => inner,
            Err(_) => Err(ParkClusterError::timeout(format!(
                "no reply with correlation {} within {:?}",
                correlation_id, timeout
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::broker::memory::MemoryBroker;
    use crate::broker::names::RECOMMENDATION_QUEUE;

    #[tokio::test]
    async fn call_returns_matching_reply_and_drops_others() {
        let broker: Arc<dyn BrokerAdapter> = Arc::new(MemoryBroker::new());
        broker.declare_queue(RECOMMENDATION_QUEUE).await.unwrap();
        let mut server = broker.consume(RECOMMENDATION_QUEUE).await.unwrap();

        let gateway = RequestReplyGateway::new(broker.clone());
        let server_task = tokio::spawn(async move {
            let delivery = server.recv().await.unwrap().unwrap();
            let reply_to = delivery.reply_to.unwrap();
            // an unrelated reply with the wrong correlation id arrives first
            broker
                .publish(
                    &reply_to,
                    b"WRONG",
                    PublishOptions::with_correlation("not-it", ""),
                )
                .await
                .unwrap();
            broker
                .publish(
                    &reply_to,
                    b"PS3;1",
                    PublishOptions::with_correlation(
                        delivery.correlation_id.clone().unwrap(),
                        "",
                    ),
                )
                .await
                .unwrap();
        });

        let reply = gateway
            .call(RECOMMENDATION_QUEUE, b"ZoneA:PS3", Duration::from_secs(2))
            .await
            .unwrap();
        assert_eq!(reply, b"PS3;1");
        server_task.await.unwrap();
    }

    #[tokio::test]
    async fn call_times_out_without_a_reply() {
        let broker: Arc<dyn BrokerAdapter> = Arc::new(MemoryBroker::new());
        broker.declare_queue(RECOMMENDATION_QUEUE).await.unwrap();
        let _server = broker.consume(RECOMMENDATION_QUEUE).await.unwrap();

        let gateway = RequestReplyGateway::new(broker);
        let result = gateway
            .call(RECOMMENDATION_QUEUE, b"ZoneA:PS3", Duration::from_millis(50))
            .await;
        assert!(matches!(result, Err(ParkClusterError::Timeout(_))));
    }
}
