//! `lapin`-backed [`Transport`].
//!
//! `lapin` is async-only: every call returns a future, and protocol
//! heartbeats are driven by a reactor task `lapin` spawns onto the runtime
//! that owns the connection. To satisfy spec.md §9's requirement that the
//! Transfer Loop stay a single-threaded, synchronous, cooperative poll loop
//! (no futures exposed to callers), this module pairs a
//! `tokio::runtime::Runtime` with `Handle::block_on`: every `Transport`
//! method here is a synchronous function that blocks the calling
//! (supervisor) thread until the underlying `lapin` future resolves. The
//! runtime and the connection it drives are created and torn down together,
//! one per [`LapinTransport`] - there is exactly one of these alive per
//! live session (spec.md §3 invariant 1).

use super::{Delivery, DrainResult, Transport};
use crate::config::SessionConfig;
use crate::error::{ConnectorError, Result};
use lapin::options::{
    BasicAckOptions, BasicConsumeOptions, BasicGetOptions, BasicPublishOptions, BasicQosOptions,
    ExchangeDeclareOptions, QueueBindOptions, QueueDeclareOptions, QueuePurgeOptions,
};
use lapin::types::{AMQPValue, FieldTable};
use lapin::{
    BasicProperties, Channel, Connection, ConnectionProperties, Consumer, ExchangeKind,
};
use futures_lite::StreamExt;
use std::time::Duration;

/// The keepalive exchange's auto-delete TTL: five minutes (spec.md §3).
const KEEPALIVE_EXCHANGE_TTL_MILLIS: i64 = 5 * 60 * 1000;

pub struct LapinTransport {
    runtime: tokio::runtime::Runtime,
    connection: Option<Connection>,
    channel: Option<Channel>,
    inbound_consumer: Option<Consumer>,
    keepalive_consumer: Option<Consumer>,
}

impl LapinTransport {
    pub fn new() -> Result<Self> {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .map_err(|e| ConnectorError::BadConfig(format!("failed to start AMQP runtime: {e}")))?;

        Ok(Self {
            runtime,
            connection: None,
            channel: None,
            inbound_consumer: None,
            keepalive_consumer: None,
        })
    }

    fn channel(&self) -> Result<&Channel> {
        self.channel.as_ref().ok_or_else(|| {
            ConnectorError::BadConfig("transport used before connect()".to_string())
        })
    }
}

impl Transport for LapinTransport {
    fn connect(&mut self, config: &SessionConfig) -> Result<()> {
        let uri = format!(
            "amqp://{}:{}@{}/{}?heartbeat={}",
            config.user,
            config.password,
            config.host_with_port(),
            percent_encode_vhost(&config.virtual_host),
            config.heartbeat,
        );
        let options = ConnectionProperties::default();

        self.runtime.block_on(async {
            let connection = Connection::connect(&uri, options).await?;
            let channel = connection.create_channel().await?;
            self.connection = Some(connection);
            self.channel = Some(channel);
            Ok::<(), lapin::Error>(())
        })?;

        Ok(())
    }

    fn declare_topology(&mut self, config: &SessionConfig, keepalive_exchange: &str) -> Result<()> {
        let channel = self.channel()?.clone();
        let config = config.clone();
        let keepalive_exchange = keepalive_exchange.to_string();

        self.runtime.block_on(async move {
            let kind = ExchangeKind::Custom(config.exchange_type.clone());
            let exchange_opts = ExchangeDeclareOptions {
                durable: config.durable,
                auto_delete: false,
                ..Default::default()
            };

            channel
                .exchange_declare(&config.task_exchange, kind.clone(), exchange_opts, FieldTable::default())
                .await?;
            channel
                .exchange_declare(&config.response_exchange, kind, exchange_opts, FieldTable::default())
                .await?;

            let queue_opts = QueueDeclareOptions {
                durable: config.durable,
                ..Default::default()
            };

            match config.role {
                crate::config::Role::Master => {
                    channel
                        .queue_declare(&config.response_queue, queue_opts, FieldTable::default())
                        .await?;
                    channel
                        .queue_bind(
                            &config.response_queue,
                            &config.response_exchange,
                            SessionConfig::routing_key_for(&config.response_queue),
                            QueueBindOptions::default(),
                            FieldTable::default(),
                        )
                        .await?;
                }
                crate::config::Role::Worker => {
                    channel
                        .queue_declare(&config.task_queue, queue_opts, FieldTable::default())
                        .await?;
                    channel
                        .queue_bind(
                            &config.task_queue,
                            &config.task_exchange,
                            SessionConfig::routing_key_for(&config.task_queue),
                            QueueBindOptions::default(),
                            FieldTable::default(),
                        )
                        .await?;
                }
            }

            if config.flush_queues {
                channel
                    .queue_purge(&config.task_queue, QueuePurgeOptions::default())
                    .await?;
                channel
                    .queue_purge(&config.response_queue, QueuePurgeOptions::default())
                    .await?;
            }

            channel
                .exchange_declare(
                    &keepalive_exchange,
                    ExchangeKind::Direct,
                    ExchangeDeclareOptions {
                        auto_delete: true,
                        ..Default::default()
                    },
                    FieldTable::default(),
                )
                .await?;
            // `x-expires` is a queue argument, not an exchange one - it has
            // to live on `nak.q`'s declare to actually express the
            // 5-minute TTL (spec.md §3); the exchange's own lifetime is
            // governed by `auto_delete` once `nak.q` is gone.
            let mut nak_queue_args = FieldTable::default();
            nak_queue_args.insert(
                "x-expires".into(),
                AMQPValue::LongInt(KEEPALIVE_EXCHANGE_TTL_MILLIS as i32),
            );
            channel
                .queue_declare("nak.q", QueueDeclareOptions::default(), nak_queue_args)
                .await?;
            channel
                .queue_bind(
                    "nak.q",
                    &keepalive_exchange,
                    "nak",
                    QueueBindOptions::default(),
                    FieldTable::default(),
                )
                .await?;

            Ok::<(), lapin::Error>(())
        })?;

        Ok(())
    }

    fn set_qos(&mut self, prefetch: u16) -> Result<()> {
        let channel = self.channel()?.clone();
        self.runtime.block_on(async move {
            channel
                .basic_qos(prefetch, BasicQosOptions { global: false })
                .await
        })?;
        Ok(())
    }

    fn start_consumer(&mut self, queue: &str, ack_rx: bool) -> Result<()> {
        let channel = self.channel()?.clone();
        let queue = queue.to_string();
        let consumer = self.runtime.block_on(async move {
            channel
                .basic_consume(
                    &queue,
                    "amqp-connector-inbound",
                    BasicConsumeOptions {
                        no_ack: !ack_rx,
                        ..Default::default()
                    },
                    FieldTable::default(),
                )
                .await
        })?;
        self.inbound_consumer = Some(consumer);
        Ok(())
    }

    fn start_keepalive_consumer(&mut self, nak_queue: &str) -> Result<()> {
        let channel = self.channel()?.clone();
        let nak_queue = nak_queue.to_string();
        let consumer = self.runtime.block_on(async move {
            channel
                .basic_consume(
                    &nak_queue,
                    "amqp-connector-keepalive",
                    BasicConsumeOptions::default(),
                    FieldTable::default(),
                )
                .await
        })?;
        self.keepalive_consumer = Some(consumer);
        Ok(())
    }

    fn publish(&mut self, exchange: &str, routing_key: &str, payload: &[u8], persistent: bool) -> Result<()> {
        let channel = self.channel()?.clone();
        let exchange = exchange.to_string();
        let routing_key = routing_key.to_string();
        let payload = payload.to_vec();
        let properties = if persistent {
            BasicProperties::default().with_delivery_mode(2)
        } else {
            BasicProperties::default()
        };

        self.runtime.block_on(async move {
            channel
                .basic_publish(
                    &exchange,
                    &routing_key,
                    BasicPublishOptions::default(),
                    &payload,
                    properties,
                )
                .await?
                .await
        })?;
        Ok(())
    }

    fn basic_get(&mut self, queue: &str) -> Result<Option<Delivery>> {
        let channel = self.channel()?.clone();
        let queue = queue.to_string();

        let message = self.runtime.block_on(async move {
            channel
                .basic_get(&queue, BasicGetOptions::default())
                .await
        })?;

        match message {
            Some(get_message) => {
                let tag = get_message.delivery.delivery_tag;
                let payload = get_message.delivery.data.clone();
                self.runtime
                    .block_on(get_message.delivery.acker.ack(BasicAckOptions::default()))?;
                Ok(Some(Delivery { tag, payload }))
            }
            None => Ok(None),
        }
    }

    fn heartbeat_tick(&mut self) -> Result<()> {
        // lapin drives protocol heartbeats from a reactor task on the
        // runtime that owns the connection; there is no explicit tick to
        // perform here. This is a liveness check standing in for
        // `original_source`'s `connection.heartbeat_tick()` call.
        if self.is_connected() {
            Ok(())
        } else {
            Err(ConnectorError::Transport(lapin::Error::InvalidConnectionState(
                lapin::ConnectionState::Error,
            )))
        }
    }

    fn drain_events(&mut self, timeout: Duration) -> Result<DrainResult> {
        let mut result = DrainResult::default();

        if let Some(consumer) = self.keepalive_consumer.as_mut() {
            let keepalive_tick = self.runtime.block_on(async {
                tokio::time::timeout(timeout, consumer.next()).await
            });
            if let Ok(Some(delivery)) = keepalive_tick {
                let delivery = delivery?;
                self.runtime
                    .block_on(delivery.acker.ack(BasicAckOptions::default()))?;
                result.keepalive_received = true;
            }
        }

        if let Some(consumer) = self.inbound_consumer.as_mut() {
            loop {
                let next = self
                    .runtime
                    .block_on(async { tokio::time::timeout(timeout, consumer.next()).await });
                match next {
                    Ok(Some(delivery)) => {
                        let delivery = delivery?;
                        result.inbound.push(Delivery {
                            tag: delivery.delivery_tag,
                            payload: delivery.data.clone(),
                        });
                    }
                    // Timed out or the stream is momentarily dry: this is
                    // the benign socket-timeout case (spec.md §4.3 step 6).
                    _ => break,
                }
            }
        }

        Ok(result)
    }

    fn is_connected(&self) -> bool {
        self.connection
            .as_ref()
            .map(|c| c.status().connected())
            .unwrap_or(false)
    }

    fn close(&mut self) -> Result<()> {
        if let Some(channel) = self.channel.take() {
            let _ = self.runtime.block_on(channel.close(200, "bye"));
        }
        if let Some(connection) = self.connection.take() {
            let _ = self.runtime.block_on(connection.close(200, "bye"));
        }
        self.inbound_consumer = None;
        self.keepalive_consumer = None;
        Ok(())
    }
}

/// `lapin`'s `AMQPUri` parser treats `/` in the vhost as a path separator;
/// the default vhost `/` needs to round-trip as an empty path segment.
fn percent_encode_vhost(vhost: &str) -> String {
    if vhost == "/" {
        String::new()
    } else {
        vhost.replace('/', "%2F")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_vhost_encodes_to_empty_path() {
        assert_eq!(percent_encode_vhost("/"), "");
    }

    #[test]
    fn named_vhost_is_percent_encoded() {
        assert_eq!(percent_encode_vhost("/staging"), "%2Fstaging");
    }
}
