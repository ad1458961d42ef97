//! In-process broker used by the test suite and by `--transport memory`:
//! named queues and fanout exchanges implemented over `tokio::sync::mpsc`
//! channels behind a shared registry. No network, no reconnect logic —
//! it exists purely so the cluster protocol can be exercised without a
//! running AMQP broker.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use tokio::sync::mpsc;
use uuid::Uuid;

use super::{BrokerAdapter, Consumer, Delivery, PublishOptions};
use crate::error::ParkClusterError;

type Tx = mpsc::UnboundedSender<Delivery>;
type Rx = mpsc::UnboundedReceiver<Delivery>;

#[derive(Default)]
struct Registry {
    senders: HashMap<String, Tx>,
    receivers: HashMap<String, Rx>,
    fanout_bindings: HashMap<String, Vec<String>>,
}

/// A broker shared by every node/client in a test or demo process. Clone
/// is cheap: all handles point at the same registry. A queue's receiver is
/// checked out to whichever [`MemoryConsumer`] last called `consume()` and
/// returned to the registry when that consumer is dropped — mirroring a
/// real broker, where a dead consumer's queue becomes consumable again by
/// the next subscriber (needed for a new leader to take over
/// `recommendation_queue` after the old one crashes).
#[derive(Clone, Default)]
pub struct MemoryBroker {
    registry: Arc<Mutex<Registry>>,
}

impl MemoryBroker {
    pub fn new() -> Self {
        Self::default()
    }

    fn ensure_queue(&self, name: &str) {
        let mut reg = self.registry.lock().unwrap();
        if !reg.senders.contains_key(name) {
            let (tx, rx) = mpsc::unbounded_channel();
            reg.senders.insert(name.to_string(), tx);
            reg.receivers.insert(name.to_string(), rx);
        }
    }
}

#[async_trait]
impl BrokerAdapter for MemoryBroker {
    async fn declare_queue(&self, name: &str) -> Result<(), ParkClusterError> {
        self.ensure_queue(name);
        Ok(())
    }

    async fn declare_exclusive_queue(
        &self,
        name_hint: &str,
    ) -> Result<String, ParkClusterError> {
        let name = format!("{}.{}", name_hint, Uuid::new_v4());
        self.ensure_queue(&name);
        Ok(name)
    }

    async fn declare_fanout(&self, exchange: &str) -> Result<(), ParkClusterError> {
        let mut reg = self.registry.lock().unwrap();
        reg.fanout_bindings.entry(exchange.to_string()).or_default();
        Ok(())
    }

    async fn bind_fanout(
        &self,
        exchange: &str,
        queue: &str,
    ) -> Result<(), ParkClusterError> {
        self.ensure_queue(queue);
        let mut reg = self.registry.lock().unwrap();
        let bound = reg.fanout_bindings.entry(exchange.to_string()).or_default();
        if !bound.iter().any(|q| q == queue) {
            bound.push(queue.to_string());
        }
        Ok(())
    }

    async fn publish(
        &self,
        queue: &str,
        body: &[u8],
        opts: PublishOptions,
    ) -> Result<(), ParkClusterError> {
        self.ensure_queue(queue);
        let reg = self.registry.lock().unwrap();
        let tx = reg.senders.get(queue).ok_or_else(|| {
            ParkClusterError::transport(format!("no such queue: {}", queue))
        })?;
        tx.send(Delivery {
            body: body.to_vec(),
            correlation_id: opts.correlation_id,
            reply_to: opts.reply_to,
        })
        .map_err(|_| ParkClusterError::transport(format!("queue closed: {}", queue)))
    }

    async fn publish_fanout(
        &self,
        exchange: &str,
        body: &[u8],
    ) -> Result<(), ParkClusterError> {
        let reg = self.registry.lock().unwrap();
        let Some(bound) = reg.fanout_bindings.get(exchange) else {
            return Ok(()); // no bindings yet: publisher gets no feedback
        };
        for queue in bound {
            if let Some(tx) = reg.senders.get(queue) {
                let _ = tx.send(Delivery {
                    body: body.to_vec(),
                    correlation_id: None,
                    reply_to: None,
                });
            }
        }
        Ok(())
    }

    async fn consume(
        &self,
        queue: &str,
    ) -> Result<Box<dyn Consumer>, ParkClusterError> {
        self.ensure_queue(queue);
        let mut reg = self.registry.lock().unwrap();
        let rx = reg.receivers.remove(queue).ok_or_else(|| {
            ParkClusterError::transport(format!(
                "queue {} already has a consumer",
                queue
            ))
        })?;
        Ok(Box::new(MemoryConsumer {
            rx: Some(rx),
            queue: queue.to_string(),
            registry: self.registry.clone(),
        }))
    }
}

/// Returns its receiver to the registry on drop, so a queue whose consumer
/// crashed (e.g. an aborted leader task) can be picked up by whoever
/// consumes it next.
struct MemoryConsumer {
    rx: Option<Rx>,
    queue: String,
    registry: Arc<Mutex<Registry>>,
}

#[async_trait]
impl Consumer for MemoryConsumer {
    async fn recv(&mut self) -> Result<Option<Delivery>, ParkClusterError> {
        Ok(self.rx.as_mut().expect("rx taken only on drop").recv().await)
    }
}

impl Drop for MemoryConsumer {
    fn drop(&mut self) {
        if let Some(rx) = self.rx.take() {
            let mut reg = self.registry.lock().unwrap();
            reg.receivers.insert(self.queue.clone(), rx);
        }
    }
}
