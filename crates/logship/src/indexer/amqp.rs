// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! AMQP queue publisher.
//!
//! The indexer owns one long-lived [`AmqpConnector`]. Every push then runs the
//! same short protocol on a fresh connection:
//!
//! ```text
//!   connect ─> channel ─> declare(passive) ──ok──────────────┐
//!                               │                            v
//!                            failed ─> close channel ─> channel ─> declare ─> publish ─> close
//! ```
//!
//! A failed passive declare means the queue does not exist yet. The broker
//! closes the channel when that happens, so the durable declare runs on a new
//! one.
//!
//! The lapin client is asynchronous; its futures are driven to completion on a
//! private runtime so that `push` stays a blocking call like every other
//! backend. The runtime shuts down in the background when dropped, so the
//! indexer may be released from async code.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use lapin::options::{BasicPublishOptions, QueueDeclareOptions};
use lapin::types::FieldTable;
use lapin::uri::AMQPUri;
use lapin::{BasicProperties, Channel, Connection, ConnectionProperties};
use tokio::runtime::Runtime;
use tracing::debug;

use crate::config::AmqpConfig;
use crate::error::{ConfigError, TransportError};
use crate::indexer::{outside_runtime, Indexer, IndexerKind};

const REPLY_SUCCESS: u16 = 200;

/// Opens connections to the broker.
pub trait AmqpConnector: Send + Sync {
    fn connect(&self) -> Result<Box<dyn AmqpConnection>, TransportError>;
}

pub trait AmqpConnection {
    fn open_channel(&mut self) -> Result<Box<dyn AmqpChannel>, TransportError>;
    fn close(&mut self) -> Result<(), TransportError>;
}

pub trait AmqpChannel {
    /// Declares `queue` durable, non-exclusive and non-auto-delete. A passive
    /// declare only checks that it exists.
    fn declare_queue(&mut self, queue: &str, passive: bool) -> Result<(), TransportError>;
    /// Publishes to `queue` through the default exchange.
    fn publish(&mut self, queue: &str, payload: &[u8]) -> Result<(), TransportError>;
    fn close(&mut self) -> Result<(), TransportError>;
}

pub struct AmqpIndexer {
    config: AmqpConfig,
    connector: Arc<dyn AmqpConnector>,
}

impl std::fmt::Debug for AmqpIndexer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AmqpIndexer")
            .field("host", &self.config.host)
            .field("port", &self.config.port)
            .field("queue", &self.config.queue)
            .finish_non_exhaustive()
    }
}

impl AmqpIndexer {
    /// Builds an indexer backed by a lapin connector. No connection is made
    /// until the first push.
    pub fn new(config: AmqpConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        let connector = LapinConnector::new(&config)?;
        Ok(Self {
            config,
            connector: Arc::new(connector),
        })
    }

    pub fn with_connector(
        config: AmqpConfig,
        connector: Arc<dyn AmqpConnector>,
    ) -> Result<Self, ConfigError> {
        config.validate()?;
        Ok(Self { config, connector })
    }

    fn publish_on(
        &self,
        connection: &mut dyn AmqpConnection,
        payload: &str,
    ) -> Result<(), TransportError> {
        let queue = self.config.queue.as_str();
        let mut channel = connection.open_channel()?;
        if let Err(e) = channel.declare_queue(queue, true) {
            debug!("LOGSHIP | Queue {queue} not found, declaring it: {e}");
            if let Err(e) = channel.close() {
                debug!("LOGSHIP | Closing rejected channel failed: {e}");
            }
            channel = connection.open_channel()?;
            channel.declare_queue(queue, false)?;
        }

        channel.publish(queue, payload.as_bytes())?;
        if let Err(e) = channel.close() {
            debug!("LOGSHIP | Closing channel after publish failed: {e}");
        }
        Ok(())
    }
}

impl Indexer for AmqpIndexer {
    fn kind(&self) -> IndexerKind {
        IndexerKind::Amqp
    }

    fn describe(&self) -> String {
        format!(
            "{}:{} queue {}",
            self.config.host, self.config.port, self.config.queue
        )
    }

    fn push(&self, payload: &str) -> Result<(), TransportError> {
        outside_runtime(|| {
            let mut connection = self.connector.connect()?;
            let result = self.publish_on(connection.as_mut(), payload);
            if let Err(e) = connection.close() {
                debug!("LOGSHIP | Closing AMQP connection failed: {e}");
            }
            result
        })
    }
}

/// Private runtime that drives the lapin futures.
struct DriverRuntime(Option<Runtime>);

impl DriverRuntime {
    fn block_on<F: Future>(&self, future: F) -> Result<F::Output, TransportError> {
        match &self.0 {
            Some(runtime) => Ok(runtime.block_on(future)),
            None => Err(TransportError::Broker("AMQP driver stopped".to_string())),
        }
    }
}

impl Drop for DriverRuntime {
    fn drop(&mut self) {
        if let Some(runtime) = self.0.take() {
            runtime.shutdown_background();
        }
    }
}

/// Connector over the lapin client.
pub struct LapinConnector {
    uri: AMQPUri,
    timeout: Duration,
    runtime: Arc<DriverRuntime>,
}

impl LapinConnector {
    pub fn new(config: &AmqpConfig) -> Result<Self, ConfigError> {
        let mut uri = AMQPUri::default();
        uri.authority.host = config.host.trim().to_string();
        uri.authority.port = config.port;
        if !config.username.trim().is_empty() {
            uri.authority.userinfo.username = config.username.clone();
            uri.authority.userinfo.password = config.password.clone();
        }
        uri.vhost = config.virtual_host.clone();

        let runtime = tokio::runtime::Builder::new_multi_thread()
            .worker_threads(1)
            .thread_name("logship-amqp")
            .enable_time()
            .build()
            .map_err(|e| ConfigError::Client(e.to_string()))?;

        Ok(Self {
            uri,
            timeout: Duration::from_secs(config.connection_timeout_secs),
            runtime: Arc::new(DriverRuntime(Some(runtime))),
        })
    }
}

impl AmqpConnector for LapinConnector {
    fn connect(&self) -> Result<Box<dyn AmqpConnection>, TransportError> {
        let timeout = self.timeout;
        let connect = Connection::connect_uri(self.uri.clone(), ConnectionProperties::default());
        let connection = self
            .runtime
            .block_on(async move { tokio::time::timeout(timeout, connect).await })?
            .map_err(|_| TransportError::Timeout(timeout))??;
        Ok(Box::new(LapinConnection {
            connection,
            runtime: Arc::clone(&self.runtime),
        }))
    }
}

struct LapinConnection {
    connection: Connection,
    runtime: Arc<DriverRuntime>,
}

impl AmqpConnection for LapinConnection {
    fn open_channel(&mut self) -> Result<Box<dyn AmqpChannel>, TransportError> {
        let channel = self.runtime.block_on(self.connection.create_channel())??;
        Ok(Box::new(LapinChannel {
            channel,
            runtime: Arc::clone(&self.runtime),
        }))
    }

    fn close(&mut self) -> Result<(), TransportError> {
        self.runtime
            .block_on(self.connection.close(REPLY_SUCCESS, "OK"))??;
        Ok(())
    }
}

struct LapinChannel {
    channel: Channel,
    runtime: Arc<DriverRuntime>,
}

impl LapinChannel {
    fn run<F, T>(&self, future: F) -> Result<T, TransportError>
    where
        F: Future<Output = lapin::Result<T>>,
    {
        Ok(self.runtime.block_on(future)??)
    }
}

impl AmqpChannel for LapinChannel {
    fn declare_queue(&mut self, queue: &str, passive: bool) -> Result<(), TransportError> {
        let options = QueueDeclareOptions {
            passive,
            durable: true,
            exclusive: false,
            auto_delete: false,
            nowait: false,
        };
        self.run(
            self.channel
                .queue_declare(queue, options, FieldTable::default()),
        )?;
        Ok(())
    }

    fn publish(&mut self, queue: &str, payload: &[u8]) -> Result<(), TransportError> {
        let channel = &self.channel;
        self.run(async move {
            channel
                .basic_publish(
                    "",
                    queue,
                    BasicPublishOptions::default(),
                    payload,
                    BasicProperties::default(),
                )
                .await?
                .await
        })?;
        Ok(())
    }

    fn close(&mut self) -> Result<(), TransportError> {
        if !self.channel.status().connected() {
            return Ok(());
        }
        self.run(self.channel.close(REPLY_SUCCESS, "OK"))
    }
}
