//! `lapin`-backed broker adapter: the real transport for a deployed
//! cluster. Declarations are re-issued on every (re)connect; publish and
//! consume calls transparently wait for a live channel rather than
//! failing the instant the connection drops, so callers only ever see a
//! [`ParkClusterError::Transport`] if the reconnect loop itself gives up
//! (it never does on its own — it retries forever with a fixed back-off).

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures::StreamExt;
use lapin::options::{
    BasicConsumeOptions, BasicPublishOptions, ExchangeDeclareOptions,
    QueueBindOptions, QueueDeclareOptions,
};
use lapin::types::FieldTable;
use lapin::{
    BasicProperties, Channel, Connection, ConnectionProperties, ExchangeKind,
};
use tokio::sync::{watch, Mutex};

use super::{BrokerAdapter, Consumer, Delivery, PublishOptions};
use crate::error::ParkClusterError;
use crate::{pf_error, pf_info, pf_warn};

/// Broker connection parameters (a subset of [`crate::config::NodeConfig`]).
#[derive(Debug, Clone)]
pub struct AmqpEndpoint {
    pub host: String,
    pub ports: Vec<u16>,
    pub user: String,
    pub password: String,
}

/// Live `lapin` connection, reconnected transparently in the background.
pub struct AmqpBroker {
    endpoint: AmqpEndpoint,
    reconnect_delay: Duration,
    channel: watch::Receiver<Option<Channel>>,
    _maintainer: tokio::task::JoinHandle<()>,
    declared_queues: Arc<Mutex<Vec<String>>>,
    declared_fanouts: Arc<Mutex<Vec<String>>>,
    bindings: Arc<Mutex<Vec<(String, String)>>>,
}

impl AmqpBroker {
    /// Connects (retrying ports in order with a fixed back-off) and spawns
    /// the background task that re-establishes the channel and replays
    /// every declaration made so far whenever the connection drops.
    pub async fn connect(
        endpoint: AmqpEndpoint,
        reconnect_delay: Duration,
    ) -> Result<Self, ParkClusterError> {
        let declared_queues = Arc::new(Mutex::new(Vec::new()));
        let declared_fanouts = Arc::new(Mutex::new(Vec::new()));
        let bindings = Arc::new(Mutex::new(Vec::new()));

        let first = dial(&endpoint, reconnect_delay).await?;
        let (tx, rx) = watch::channel(Some(first));

        let maintainer = {
            let endpoint = endpoint.clone();
            let declared_queues = declared_queues.clone();
            let declared_fanouts = declared_fanouts.clone();
            let bindings = bindings.clone();
            tokio::spawn(async move {
                loop {
                    let lost = {
                        let guard = tx.borrow();
                        match guard.as_ref() {
                            Some(ch) => !ch.status().connected(),
                            None => true,
                        }
                    };
                    if lost {
                        pf_warn!("amqp channel lost, reconnecting...");
                        let _ = tx.send(None);
                        match dial(&endpoint, reconnect_delay).await {
                            Ok(channel) => {
                                if let Err(e) = replay_declarations(
                                    &channel,
                                    &declared_queues,
                                    &declared_fanouts,
                                    &bindings,
                                )
                                .await
                                {
                                    pf_error!("failed to replay declarations: {}", e);
                                }
                                let _ = tx.send(Some(channel));
                                pf_info!("amqp channel reestablished");
                            }
                            Err(e) => {
                                pf_error!("amqp reconnect attempt failed: {}", e);
                            }
                        }
                    }
                    tokio::time::sleep(reconnect_delay).await;
                }
            })
        };

        Ok(AmqpBroker {
            endpoint,
            reconnect_delay,
            channel: rx,
            _maintainer: maintainer,
            declared_queues,
            declared_fanouts,
            bindings,
        })
    }

    /// Waits until a live channel is available, suspending across
    /// reconnects rather than failing in-flight operations immediately.
    async fn live_channel(&self) -> Channel {
        let mut rx = self.channel.clone();
        loop {
            if let Some(ch) = rx.borrow().clone() {
                if ch.status().connected() {
                    return ch;
                }
            }
            if rx.changed().await.is_err() {
                // maintainer task died; this should not happen, but avoid
                // a busy loop if it does
                tokio::time::sleep(self.reconnect_delay).await;
            }
        }
    }
}

async fn dial(
    endpoint: &AmqpEndpoint,
    reconnect_delay: Duration,
) -> Result<Channel, ParkClusterError> {
    let mut last_err = None;
    for port in &endpoint.ports {
        let uri = format!(
            "amqp://{}:{}@{}:{}/%2f",
            endpoint.user, endpoint.password, endpoint.host, port
        );
        match Connection::connect(&uri, ConnectionProperties::default()).await {
            Ok(conn) => match conn.create_channel().await {
                Ok(channel) => return Ok(channel),
                Err(e) => last_err = Some(e),
            },
            Err(e) => last_err = Some(e),
        }
    }
    let msg = format!(
        "could not connect to broker {} on any of {:?}: {}",
        endpoint.host,
        endpoint.ports,
        last_err.map(|e| e.to_string()).unwrap_or_default()
    );
    pf_error!("{}", msg);
    tokio::time::sleep(reconnect_delay).await;
    Err(ParkClusterError::transport(msg))
}

async fn replay_declarations(
    channel: &Channel,
    queues: &Arc<Mutex<Vec<String>>>,
    fanouts: &Arc<Mutex<Vec<String>>>,
    bindings: &Arc<Mutex<Vec<(String, String)>>>,
) -> Result<(), ParkClusterError> {
    for name in queues.lock().await.iter() {
        declare_queue_on(channel, name).await?;
    }
    for exchange in fanouts.lock().await.iter() {
        declare_fanout_on(channel, exchange).await?;
    }
    for (exchange, queue) in bindings.lock().await.iter() {
        bind_fanout_on(channel, exchange, queue).await?;
    }
    Ok(())
}

async fn declare_queue_on(
    channel: &Channel,
    name: &str,
) -> Result<(), ParkClusterError> {
    channel
        .queue_declare(
            name,
            QueueDeclareOptions {
                durable: false,
                auto_delete: false,
                ..QueueDeclareOptions::default()
            },
            FieldTable::default(),
        )
        .await?;
    Ok(())
}

async fn declare_fanout_on(
    channel: &Channel,
    exchange: &str,
) -> Result<(), ParkClusterError> {
    channel
        .exchange_declare(
            exchange,
            ExchangeKind::Fanout,
            ExchangeDeclareOptions {
                durable: false,
                auto_delete: false,
                ..ExchangeDeclareOptions::default()
            },
            FieldTable::default(),
        )
        .await?;
    Ok(())
}

async fn bind_fanout_on(
    channel: &Channel,
    exchange: &str,
    queue: &str,
) -> Result<(), ParkClusterError> {
    channel
        .queue_bind(
            queue,
            exchange,
            "",
            QueueBindOptions::default(),
            FieldTable::default(),
        )
        .await?;
    Ok(())
}

#[async_trait]
impl BrokerAdapter for AmqpBroker {
    async fn declare_queue(&self, name: &str) -> Result<(), ParkClusterError> {
        let channel = self.live_channel().await;
        declare_queue_on(&channel, name).await?;
        let mut queues = self.declared_queues.lock().await;
        if !queues.iter().any(|q| q == name) {
            queues.push(name.to_string());
        }
        Ok(())
    }

    async fn declare_exclusive_queue(
        &self,
        name_hint: &str,
    ) -> Result<String, ParkClusterError> {
        let channel = self.live_channel().await;
        let declared = channel
            .queue_declare(
                "", // broker-chosen name
                QueueDeclareOptions {
                    exclusive: true,
                    auto_delete: true,
                    ..QueueDeclareOptions::default()
                },
                FieldTable::default(),
            )
            .await?;
        let name = declared.name().to_string();
        pf_info!("declared exclusive queue {} for {}", name, name_hint);
        let mut queues = self.declared_queues.lock().await;
        queues.push(name.clone());
        Ok(name)
    }

    async fn declare_fanout(&self, exchange: &str) -> Result<(), ParkClusterError> {
        let channel = self.live_channel().await;
        declare_fanout_on(&channel, exchange).await?;
        let mut fanouts = self.declared_fanouts.lock().await;
        if !fanouts.iter().any(|e| e == exchange) {
            fanouts.push(exchange.to_string());
        }
        Ok(())
    }

    async fn bind_fanout(
        &self,
        exchange: &str,
        queue: &str,
    ) -> Result<(), ParkClusterError> {
        let channel = self.live_channel().await;
        bind_fanout_on(&channel, exchange, queue).await?;
        let mut bindings = self.bindings.lock().await;
        let pair = (exchange.to_string(), queue.to_string());
        if !bindings.contains(&pair) {
            bindings.push(pair);
        }
        Ok(())
    }

    async fn publish(
        &self,
        queue: &str,
        body: &[u8],
        opts: PublishOptions,
    ) -> Result<(), ParkClusterError> {
        let channel = self.live_channel().await;
        let mut props = BasicProperties::default();
        if let Some(cid) = opts.correlation_id {
            props = props.with_correlation_id(cid.into());
        }
        if let Some(reply_to) = opts.reply_to {
            props = props.with_reply_to(reply_to.into());
        }
        channel
            .basic_publish(
                "", // default exchange routes by queue name
                queue,
                BasicPublishOptions::default(),
                body,
                props,
            )
            .await?
            .await?;
        Ok(())
    }

    async fn publish_fanout(
        &self,
        exchange: &str,
        body: &[u8],
    ) -> Result<(), ParkClusterError> {
        let channel = self.live_channel().await;
        channel
            .basic_publish(
                exchange,
                "",
                BasicPublishOptions::default(),
                body,
                BasicProperties::default(),
            )
            .await?
            .await?;
        Ok(())
    }

    async fn consume(
        &self,
        queue: &str,
    ) -> Result<Box<dyn Consumer>, ParkClusterError> {
        let channel = self.live_channel().await;
        let tag = format!("parkcluster-{}", uuid::Uuid::new_v4());
        let consumer = channel
            .basic_consume(
                queue,
                &tag,
                BasicConsumeOptions::default(),
                FieldTable::default(),
            )
            .await?;
        Ok(Box::new(AmqpConsumer { inner: consumer }))
    }
}

struct AmqpConsumer {
    inner: lapin::Consumer,
}

#[async_trait]
impl Consumer for AmqpConsumer {
    async fn recv(&mut self) -> Result<Option<Delivery>, ParkClusterError> {
        match self.inner.next().await {
            None => Ok(None),
            Some(Err(e)) => Err(ParkClusterError::from(e)),
            Some(Ok(delivery)) => {
                let _ = delivery.ack(Default::default()).await;
                let correlation_id = delivery
                    .properties
                    .correlation_id()
                    .as_ref()
                    .map(|s| s.to_string());
                let reply_to = delivery
                    .properties
                    .reply_to()
                    .as_ref()
                    .map(|s| s.to_string());
                Ok(Some(Delivery {
                    body: delivery.data,
                    correlation_id,
                    reply_to,
                }))
            }
        }
    }
}
