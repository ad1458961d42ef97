//! External-caller side of the recommendation cluster: what the backend's
//! request handler uses to ask the cluster for an alternative parking
//! space, built directly on [`RequestReplyGateway`].

use std::sync::Arc;
use std::time::Duration;

use crate::broker::names::RECOMMENDATION_QUEUE;
use crate::broker::BrokerAdapter;
use crate::codec;
use crate::error::ParkClusterError;
use crate::gateway::RequestReplyGateway;
use crate::model::Entry;

/// Thin wrapper the backend's command handler uses to call into the
/// cluster; everything else about the cluster (who the leader is, how
/// many followers exist) is invisible from here.
pub struct RecommendationClient {
    gateway: RequestReplyGateway,
    timeout: Duration,
}

impl RecommendationClient {
    pub fn new(broker: Arc<dyn BrokerAdapter>, timeout: Duration) -> Self {
        RecommendationClient {
            gateway: RequestReplyGateway::new(broker),
            timeout,
        }
    }

    /// Requests a recommendation for `requested_space` in `zone`, waiting
    /// up to the configured timeout for a reply. A timeout is the only way
    /// the caller learns something went wrong — it cannot distinguish
    /// "quorum never formed" from "leader crashed".
    pub async fn recommend(
        &self,
        zone_name: &str,
        requested_space_tag: &str,
    ) -> Result<Vec<Entry>, ParkClusterError> {
        let body = codec::format_task(zone_name, requested_space_tag);
        let reply = self
            .gateway
            .call(RECOMMENDATION_QUEUE, body.as_bytes(), self.timeout)
            .await?;
        let text = std::str::from_utf8(&reply)
            .map_err(|e| ParkClusterError::protocol(format!("non-utf8 reply: {}", e)))?;
        codec::parse_reply(text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::broker::memory::MemoryBroker;
    use crate::broker::PublishOptions;
    use crate::model::Score;

    #[tokio::test]
    async fn recommend_returns_parsed_reply() {
        let broker: Arc<dyn BrokerAdapter> = Arc::new(MemoryBroker::new());
        broker.declare_queue(RECOMMENDATION_QUEUE).await.unwrap();
        let mut server = broker.consume(RECOMMENDATION_QUEUE).await.unwrap();

        let server_broker = broker.clone();
        let server_task = tokio::spawn(async move {
            let delivery = server.recv().await.unwrap().unwrap();
            let reply_to = delivery.reply_to.clone().unwrap();
            let correlation_id = delivery.correlation_id.clone().unwrap();
            server_broker
                .publish(
                    &reply_to,
                    b"PS3;1",
                    PublishOptions::with_correlation(correlation_id, ""),
                )
                .await
                .unwrap();
        });

        let client = RecommendationClient::new(broker, Duration::from_secs(2));
        let reply = client.recommend("ZoneA", "PS3").await.unwrap();
        assert_eq!(reply, vec![Entry::new("PS3", Score::Citations(1))]);
        server_task.await.unwrap();
    }

    #[tokio::test]
    async fn recommend_times_out_with_no_server() {
        let broker: Arc<dyn BrokerAdapter> = Arc::new(MemoryBroker::new());
        broker.declare_queue(RECOMMENDATION_QUEUE).await.unwrap();
        let _server = broker.consume(RECOMMENDATION_QUEUE).await.unwrap();

        let client = RecommendationClient::new(broker, Duration::from_millis(50));
        let result = client.recommend("ZoneA", "PS3").await;
        assert!(matches!(result, Err(ParkClusterError::Timeout(_))));
    }
}
