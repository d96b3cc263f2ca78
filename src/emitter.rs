//! Emitter lifecycle and event dispatch

use async_trait::async_trait;
use log::{debug, error, info, trace, warn};
use std::fmt;
use std::time::Duration;
use tokio::sync::RwLock;
use tokio::time::timeout;

use crate::builder::BuilderRegistry;
use crate::config::EmitterConfig;
use crate::error::{EmitterError, Result};
use crate::event::Event;
use crate::transport::{Connector, TcpConnector, Transport};

/// How long a send waits for the server's acknowledgment
pub const ACK_TIMEOUT: Duration = Duration::from_millis(5000);

/// Host-facing emitter contract
#[async_trait]
pub trait Emitter: Send + Sync + 'static {
    /// Open the connection; calling it again while started does nothing
    async fn start(&self) -> Result<()>;

    /// Build and send one event, waiting for its acknowledgment
    async fn emit(&self, event: &Event) -> Result<()>;

    /// Flush buffered events
    async fn flush(&self) -> Result<()>;

    /// Release the connection
    async fn close(&self) -> Result<()>;
}

/// Lifecycle of an emitter
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EmitterState {
    /// Never started, or the connection was lost
    NotStarted,
    Started,
    /// Terminal; the emitter cannot be started again
    Closed,
}

impl fmt::Display for EmitterState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            EmitterState::NotStarted => "not started",
            EmitterState::Started => "started",
            EmitterState::Closed => "closed",
        };
        f.write_str(name)
    }
}

/// State and connection change together under one lock
struct Lifecycle<T> {
    state: EmitterState,
    transport: Option<T>,
}

/// Emitter forwarding events over a single transport connection.
///
/// `emit` holds the read side of the lifecycle lock for the whole build and
/// send, `start` and `close` hold the write side, so a close waits for
/// in-flight emits and callers never observe a half-open connection.
pub struct StreamEmitter<C: Connector> {
    config: EmitterConfig,
    connector: C,
    registry: BuilderRegistry,
    lifecycle: RwLock<Lifecycle<C::Transport>>,
}

impl StreamEmitter<TcpConnector> {
    /// Emitter over TCP with the standard builders
    pub fn tcp(config: EmitterConfig) -> Result<Self> {
        Self::new(config, TcpConnector, BuilderRegistry::standard())
    }
}

impl<C: Connector> StreamEmitter<C> {
    /// Create an emitter; nothing is connected until [`Emitter::start`]
    pub fn new(config: EmitterConfig, connector: C, registry: BuilderRegistry) -> Result<Self> {
        config.validate()?;
        debug!("Creating emitter for {}:{} with {:?}", config.host, config.port, registry);

        Ok(Self {
            config,
            connector,
            registry,
            lifecycle: RwLock::new(Lifecycle {
                state: EmitterState::NotStarted,
                transport: None,
            }),
        })
    }

    /// Current lifecycle state
    pub async fn state(&self) -> EmitterState {
        self.lifecycle.read().await.state
    }

    pub fn config(&self) -> &EmitterConfig {
        &self.config
    }

    /// Return to `NotStarted` when the current connection is gone, so the
    /// host's next `start` reconnects
    async fn reset_lost_connection(&self) {
        let mut lifecycle = self.lifecycle.write().await;
        if lifecycle.state != EmitterState::Started {
            return;
        }
        if let Some(transport) = lifecycle.transport.as_ref() {
            if transport.is_open().await {
                return;
            }
        }

        lifecycle.transport = None;
        lifecycle.state = EmitterState::NotStarted;
        warn!(
            "Lost connection to {}:{}; emitter needs to be started again",
            self.config.host, self.config.port
        );
    }
}

#[async_trait]
impl<C: Connector> Emitter for StreamEmitter<C> {
    async fn start(&self) -> Result<()> {
        let mut lifecycle = self.lifecycle.write().await;

        match lifecycle.state {
            EmitterState::Started => {
                debug!("Emitter already started");
                Ok(())
            }
            EmitterState::Closed => Err(EmitterError::AlreadyClosed),
            EmitterState::NotStarted => {
                let transport = self
                    .connector
                    .connect(&self.config.host, self.config.port)
                    .await
                    .inspect_err(|e| error!("Failed to start emitter: {}", e))?;

                info!("Emitter started on {}", transport.name());
                lifecycle.transport = Some(transport);
                lifecycle.state = EmitterState::Started;
                Ok(())
            }
        }
    }

    async fn emit(&self, event: &Event) -> Result<()> {
        let lifecycle = self.lifecycle.read().await;

        let transport = match (lifecycle.state, lifecycle.transport.as_ref()) {
            (EmitterState::Started, Some(transport)) => transport,
            _ => return Err(EmitterError::NotStarted),
        };

        let builder = self.registry.resolve(event.feed());
        let record = builder.build(event)?;
        trace!("Sending {:?} built by '{}'", record, builder.name());

        let result = match timeout(ACK_TIMEOUT, transport.send(&record)).await {
            Ok(Ok(())) => {
                debug!("Emitted '{}' from {}", record.service, record.host);
                Ok(())
            }
            Ok(Err(e)) => {
                warn!("Failed to send '{}': {}", record.service, e);
                Err(e)
            }
            Err(_) => {
                warn!("No acknowledgment for '{}' after {:?}", record.service, ACK_TIMEOUT);
                Err(EmitterError::Timeout(ACK_TIMEOUT))
            }
        };

        if result.is_err() && !transport.is_open().await {
            drop(lifecycle);
            self.reset_lost_connection().await;
        }

        result
    }

    async fn flush(&self) -> Result<()> {
        Ok(())
    }

    async fn close(&self) -> Result<()> {
        let mut lifecycle = self.lifecycle.write().await;

        match lifecycle.state {
            EmitterState::Started => {
                lifecycle.state = EmitterState::Closed;
                if let Some(transport) = lifecycle.transport.take() {
                    transport.close().await?;
                }
                info!("Emitter closed");
            }
            EmitterState::NotStarted => debug!("Close on an emitter that was never started"),
            EmitterState::Closed => debug!("Emitter already closed"),
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::{ServiceEvent, ServiceMetricEvent};
    use crate::record::MetricValue;
    use crate::transport::MemoryConnector;
    use chrono::{TimeZone, Utc};
    use serde_json::json;
    use std::sync::Arc;
    use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
    use tokio::net::TcpListener;

    fn emitter() -> (StreamEmitter<MemoryConnector>, MemoryConnector) {
        let connector = MemoryConnector::new();
        let emitter = StreamEmitter::new(
            EmitterConfig::new("riemann.local", 5555),
            connector.clone(),
            BuilderRegistry::standard(),
        )
        .unwrap();
        (emitter, connector)
    }

    fn metric(service: &str, name: &str, value: serde_json::Value) -> Event {
        let created = Utc.timestamp_millis_opt(1_500_000_001_500).unwrap();
        ServiceMetricEvent::new("h1", service, name, created, value).into()
    }

    #[test]
    fn config_is_kept() {
        let (emitter, _connector) = emitter();
        assert_eq!(emitter.config(), &EmitterConfig::new("riemann.local", 5555));
    }

    #[test]
    fn empty_host_is_rejected() {
        let result = StreamEmitter::new(
            EmitterConfig::new("", 5555),
            MemoryConnector::new(),
            BuilderRegistry::standard(),
        );
        assert!(matches!(result, Err(EmitterError::Config(_))));
    }

    #[tokio::test]
    async fn emit_before_start_is_rejected() {
        let (emitter, connector) = emitter();
        assert_eq!(emitter.state().await, EmitterState::NotStarted);

        let result = emitter.emit(&metric("cache/total", "hits", json!(1))).await;
        assert!(matches!(result, Err(EmitterError::NotStarted)));
        assert_eq!(connector.connect_count(), 0);
        assert!(connector.records().unwrap().is_empty());
    }

    #[tokio::test]
    async fn start_is_idempotent() {
        let (emitter, connector) = emitter();
        emitter.start().await.unwrap();
        emitter.start().await.unwrap();
        assert_eq!(connector.connect_count(), 1);
        assert_eq!(emitter.state().await, EmitterState::Started);
    }

    #[tokio::test]
    async fn failed_start_can_be_retried() {
        let (emitter, connector) = emitter();
        connector.fail_connect(true);

        assert!(matches!(emitter.start().await, Err(EmitterError::Connection { .. })));
        assert_eq!(emitter.state().await, EmitterState::NotStarted);
        assert!(matches!(
            emitter.emit(&metric("s", "m", json!(1))).await,
            Err(EmitterError::NotStarted)
        ));

        connector.fail_connect(false);
        emitter.start().await.unwrap();
        assert_eq!(connector.connect_count(), 1);
    }

    #[tokio::test]
    async fn integral_metric_is_sent_as_integer() {
        let (emitter, connector) = emitter();
        emitter.start().await.unwrap();
        emitter.emit(&metric("cache/total", "hits", json!(1.0))).await.unwrap();

        let records = connector.records().unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].host, "h1");
        assert_eq!(records[0].service, "cache/total hits");
        assert_eq!(records[0].metric, Some(MetricValue::Int(1)));
        assert_eq!(records[0].time, 1_500_000_001);
    }

    #[tokio::test]
    async fn fractional_metric_is_sent_as_float() {
        let (emitter, connector) = emitter();
        emitter.start().await.unwrap();
        emitter.emit(&metric("query/time", "avg", json!(12.345))).await.unwrap();

        let records = connector.records().unwrap();
        assert_eq!(records[0].service, "query/time avg");
        assert_eq!(records[0].metric, Some(MetricValue::Float(12.345)));
    }

    #[tokio::test]
    async fn bad_metric_is_not_sent() {
        let (emitter, connector) = emitter();
        emitter.start().await.unwrap();

        match emitter.emit(&metric("query/time", "avg", json!("slow"))).await {
            Err(EmitterError::BadMetricFormat { metric, .. }) => assert_eq!(metric, "avg"),
            other => panic!("expected bad metric format, got {:?}", other),
        }
        assert!(connector.records().unwrap().is_empty());

        // The emitter keeps working
        emitter.emit(&metric("query/time", "avg", json!(2))).await.unwrap();
        assert_eq!(connector.records().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn unregistered_feed_uses_default_builder() {
        let (emitter, connector) = emitter();
        emitter.start().await.unwrap();

        let created = Utc.timestamp_millis_opt(2_999).unwrap();
        let event: Event = ServiceEvent::new("alerts", "h2", "broker", created)
            .with_attribute("severity", "high")
            .into();
        emitter.emit(&event).await.unwrap();

        let records = connector.records().unwrap();
        assert_eq!(records[0].service, "broker");
        assert_eq!(records[0].time, 2);
        assert_eq!(records[0].metric, None);
        assert_eq!(records[0].attributes["severity"], "high");
    }

    #[tokio::test]
    async fn generic_event_tagged_as_metrics_is_unsupported() {
        let (emitter, connector) = emitter();
        emitter.start().await.unwrap();

        let event: Event = ServiceEvent::new("metrics", "h1", "broker", Utc::now()).into();
        assert!(matches!(
            emitter.emit(&event).await,
            Err(EmitterError::UnsupportedEvent { .. })
        ));
        assert!(connector.records().unwrap().is_empty());
    }

    #[tokio::test]
    async fn transport_failure_is_propagated() {
        let (emitter, connector) = emitter();
        emitter.start().await.unwrap();
        connector.fail_send(true);

        assert!(matches!(
            emitter.emit(&metric("s", "m", json!(1))).await,
            Err(EmitterError::Io(_))
        ));
        assert_eq!(emitter.state().await, EmitterState::Started);
    }

    #[tokio::test]
    async fn lost_connection_returns_to_not_started() {
        let (emitter, connector) = emitter();
        emitter.start().await.unwrap();
        connector.disconnect();

        assert!(matches!(
            emitter.emit(&metric("s", "m", json!(1))).await,
            Err(EmitterError::Io(_))
        ));
        assert_eq!(emitter.state().await, EmitterState::NotStarted);
        assert!(matches!(
            emitter.emit(&metric("s", "m", json!(1))).await,
            Err(EmitterError::NotStarted)
        ));

        emitter.start().await.unwrap();
        assert_eq!(connector.connect_count(), 2);
        emitter.emit(&metric("s", "m", json!(2))).await.unwrap();
        assert_eq!(connector.records().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn emitter_recovers_after_late_acknowledgment() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();

        let server = tokio::spawn(async move {
            let (socket, _) = listener.accept().await.unwrap();
            let mut socket = BufReader::new(socket);
            let mut received = 0usize;
            let mut delay = Some(ACK_TIMEOUT + Duration::from_millis(300));

            loop {
                let mut line = String::new();
                if socket.read_line(&mut line).await.unwrap() == 0 {
                    break;
                }
                received += 1;
                if let Some(delay) = delay.take() {
                    tokio::time::sleep(delay).await;
                }
                socket.get_mut().write_all(b"{\"ok\":true}\n").await.unwrap();
            }
            received
        });

        let emitter = StreamEmitter::tcp(EmitterConfig::new("127.0.0.1", port)).unwrap();
        emitter.start().await.unwrap();

        assert!(matches!(
            emitter.emit(&metric("cache/total", "hits", json!(1))).await,
            Err(EmitterError::Timeout(_))
        ));
        assert_eq!(emitter.state().await, EmitterState::Started);

        emitter.emit(&metric("cache/total", "hits", json!(2))).await.unwrap();
        emitter.emit(&metric("cache/total", "hits", json!(3))).await.unwrap();
        emitter.close().await.unwrap();

        assert_eq!(server.await.unwrap(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn unacknowledged_send_times_out() {
        let (emitter, connector) = emitter();
        emitter.start().await.unwrap();
        connector.stall_send(true);

        let started = tokio::time::Instant::now();
        match emitter.emit(&metric("s", "m", json!(1))).await {
            Err(EmitterError::Timeout(after)) => assert_eq!(after, ACK_TIMEOUT),
            other => panic!("expected timeout, got {:?}", other),
        }
        assert!(started.elapsed() >= ACK_TIMEOUT);
    }

    #[tokio::test]
    async fn emit_after_close_is_rejected() {
        let (emitter, connector) = emitter();
        emitter.start().await.unwrap();
        emitter.close().await.unwrap();

        assert_eq!(emitter.state().await, EmitterState::Closed);
        assert_eq!(connector.close_count(), 1);
        assert!(matches!(
            emitter.emit(&metric("s", "m", json!(1))).await,
            Err(EmitterError::NotStarted)
        ));
        assert!(connector.records().unwrap().is_empty());
    }

    #[tokio::test]
    async fn close_is_safe_without_start_and_repeatable() {
        let (emitter, connector) = emitter();
        emitter.close().await.unwrap();
        assert_eq!(emitter.state().await, EmitterState::NotStarted);
        assert_eq!(connector.close_count(), 0);

        emitter.start().await.unwrap();
        emitter.close().await.unwrap();
        emitter.close().await.unwrap();
        assert_eq!(connector.close_count(), 1);
    }

    #[tokio::test]
    async fn closed_emitter_cannot_restart() {
        let (emitter, connector) = emitter();
        emitter.start().await.unwrap();
        emitter.close().await.unwrap();

        assert!(matches!(emitter.start().await, Err(EmitterError::AlreadyClosed)));
        assert_eq!(connector.connect_count(), 1);
    }

    #[tokio::test]
    async fn flush_always_succeeds() {
        let (emitter, _connector) = emitter();
        emitter.flush().await.unwrap();
        emitter.start().await.unwrap();
        emitter.flush().await.unwrap();
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_producers() {
        let (emitter, connector) = emitter();
        let emitter = Arc::new(emitter);

        let starts: Vec<_> = (0..8)
            .map(|_| {
                let emitter = Arc::clone(&emitter);
                tokio::spawn(async move { emitter.start().await })
            })
            .collect();
        for handle in starts {
            handle.await.unwrap().unwrap();
        }
        assert_eq!(connector.connect_count(), 1);

        let producers: Vec<_> = (0..8)
            .map(|worker| {
                let emitter = Arc::clone(&emitter);
                tokio::spawn(async move {
                    for i in 0..25 {
                        let event = metric("worker", &format!("m{}-{}", worker, i), json!(i));
                        emitter.emit(&event).await.unwrap();
                    }
                })
            })
            .collect();
        for handle in producers {
            handle.await.unwrap();
        }

        assert_eq!(connector.records().unwrap().len(), 200);
        emitter.close().await.unwrap();
        assert_eq!(connector.close_count(), 1);
    }
}
