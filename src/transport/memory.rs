use async_trait::async_trait;
use std::io;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, RwLock};

use super::{Connector, Transport};
use crate::error::{EmitterError, Result};
use crate::record::OutboundRecord;

#[derive(Default)]
struct Shared {
    records: RwLock<Vec<OutboundRecord>>,
    connects: AtomicUsize,
    closes: AtomicUsize,
    fail_connect: AtomicBool,
    fail_send: AtomicBool,
    stall_send: AtomicBool,
    disconnected: AtomicBool,
}

fn poisoned() -> EmitterError {
    io::Error::other("Lock poisoned").into()
}

/// Connector producing in-memory transports that record every sent record.
///
/// Clones share state, so a test can keep one handle and give another to the
/// emitter.
#[derive(Clone, Default)]
pub struct MemoryConnector {
    shared: Arc<Shared>,
}

impl MemoryConnector {
    pub fn new() -> Self {
        Self::default()
    }

    /// All records acknowledged so far, in send order
    pub fn records(&self) -> Result<Vec<OutboundRecord>> {
        let records = self.shared.records.read().map_err(|_| poisoned())?;
        Ok(records.clone())
    }

    /// Number of connections opened
    pub fn connect_count(&self) -> usize {
        self.shared.connects.load(Ordering::SeqCst)
    }

    /// Number of connections closed
    pub fn close_count(&self) -> usize {
        self.shared.closes.load(Ordering::SeqCst)
    }

    /// Make the next connection attempts fail
    pub fn fail_connect(&self, fail: bool) {
        self.shared.fail_connect.store(fail, Ordering::SeqCst);
    }

    /// Make sends fail with an I/O error
    pub fn fail_send(&self, fail: bool) {
        self.shared.fail_send.store(fail, Ordering::SeqCst);
    }

    /// Make sends wait forever for an acknowledgment
    pub fn stall_send(&self, stall: bool) {
        self.shared.stall_send.store(stall, Ordering::SeqCst);
    }

    /// Lose the current connection; the next connect opens a fresh one
    pub fn disconnect(&self) {
        self.shared.disconnected.store(true, Ordering::SeqCst);
    }
}

#[async_trait]
impl Connector for MemoryConnector {
    type Transport = MemoryTransport;

    async fn connect(&self, host: &str, port: u16) -> Result<MemoryTransport> {
        if self.shared.fail_connect.load(Ordering::SeqCst) {
            return Err(EmitterError::Connection {
                host: host.to_string(),
                port,
                source: io::Error::new(io::ErrorKind::ConnectionRefused, "connection refused"),
            });
        }

        self.shared.connects.fetch_add(1, Ordering::SeqCst);
        self.shared.disconnected.store(false, Ordering::SeqCst);
        Ok(MemoryTransport {
            shared: Arc::clone(&self.shared),
            name: format!("memory://{}:{}", host, port),
        })
    }
}

/// In-memory transport handed out by [`MemoryConnector`]
pub struct MemoryTransport {
    shared: Arc<Shared>,
    name: String,
}

#[async_trait]
impl Transport for MemoryTransport {
    async fn send(&self, record: &OutboundRecord) -> Result<()> {
        if self.shared.stall_send.load(Ordering::SeqCst) {
            std::future::pending::<()>().await;
        }

        if self.shared.disconnected.load(Ordering::SeqCst) {
            return Err(io::Error::new(io::ErrorKind::NotConnected, "connection lost").into());
        }

        if self.shared.fail_send.load(Ordering::SeqCst) {
            return Err(io::Error::new(io::ErrorKind::ConnectionReset, "connection reset").into());
        }

        let mut records = self.shared.records.write().map_err(|_| poisoned())?;
        records.push(record.clone());
        Ok(())
    }

    async fn close(&self) -> Result<()> {
        self.shared.closes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn is_open(&self) -> bool {
        !self.shared.disconnected.load(Ordering::SeqCst)
    }

    fn name(&self) -> &str {
        &self.name
    }
}
