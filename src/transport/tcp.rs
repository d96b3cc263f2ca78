use async_trait::async_trait;
use log::{debug, info, warn};
use serde::Deserialize;
use std::io;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::TcpStream;
use tokio::sync::Mutex;

use super::{Connector, Transport};
use crate::error::{EmitterError, Result};
use crate::record::OutboundRecord;

/// Opens [`TcpTransport`] connections
#[derive(Debug, Default, Clone)]
pub struct TcpConnector;

#[async_trait]
impl Connector for TcpConnector {
    type Transport = TcpTransport;

    async fn connect(&self, host: &str, port: u16) -> Result<TcpTransport> {
        debug!("Connecting to {}:{}", host, port);

        let stream = TcpStream::connect((host, port))
            .await
            .map_err(|source| EmitterError::Connection {
                host: host.to_string(),
                port,
                source,
            })?;
        stream.set_nodelay(true)?;

        info!("Connected to monitoring server {}:{}", host, port);
        Ok(TcpTransport::new(stream, format!("{}:{}", host, port)))
    }
}

/// Server answer to one record
#[derive(Debug, Deserialize)]
struct Ack {
    ok: bool,
    #[serde(default)]
    error: Option<String>,
}

struct Connection {
    stream: BufReader<TcpStream>,
    /// Acknowledgments still owed by the server for records already written
    pending_acks: usize,
}

impl Connection {
    /// Read one reply line, failing on end of stream
    async fn read_reply(&mut self) -> io::Result<String> {
        let mut reply = String::new();
        if self.stream.read_line(&mut reply).await? == 0 {
            return Err(io::Error::new(
                io::ErrorKind::UnexpectedEof,
                "server closed the connection",
            ));
        }
        Ok(reply)
    }

    /// Write one record line and read its acknowledgment.
    ///
    /// Acknowledgments of sends abandoned by the caller are read and discarded
    /// first so replies stay paired with their records.
    async fn exchange(&mut self, line: &[u8], name: &str) -> io::Result<String> {
        while self.pending_acks > 0 {
            let stale = self.read_reply().await?;
            self.pending_acks -= 1;
            debug!("Discarded late acknowledgment from {}: {}", name, stale.trim());
        }

        self.pending_acks += 1;
        self.stream.get_mut().write_all(line).await?;
        self.stream.get_mut().flush().await?;

        let reply = self.read_reply().await?;
        self.pending_acks -= 1;
        Ok(reply)
    }
}

/// One TCP connection carrying one JSON record per line.
///
/// The server answers every line with `{"ok":true}` or
/// `{"ok":false,"error":"..."}`. Sends are serialised so acknowledgments stay
/// paired with their records.
pub struct TcpTransport {
    connection: Mutex<Option<Connection>>,
    name: String,
}

impl TcpTransport {
    pub fn new(stream: TcpStream, name: impl Into<String>) -> Self {
        Self {
            connection: Mutex::new(Some(Connection {
                stream: BufReader::new(stream),
                pending_acks: 0,
            })),
            name: name.into(),
        }
    }
}

#[async_trait]
impl Transport for TcpTransport {
    async fn send(&self, record: &OutboundRecord) -> Result<()> {
        let mut line = serde_json::to_vec(record)?;
        line.push(b'\n');

        let mut guard = self.connection.lock().await;
        let connection = guard
            .as_mut()
            .ok_or_else(|| io::Error::new(io::ErrorKind::NotConnected, "transport is closed"))?;

        let reply = match connection.exchange(&line, &self.name).await {
            Ok(reply) => reply,
            Err(e) => {
                warn!("Dropping connection {}: {}", self.name, e);
                *guard = None;
                return Err(e.into());
            }
        };

        let ack: Ack = serde_json::from_str(reply.trim())?;
        if ack.ok {
            Ok(())
        } else {
            Err(EmitterError::Rejected(
                ack.error.unwrap_or_else(|| "no reason given".to_string()),
            ))
        }
    }

    async fn close(&self) -> Result<()> {
        if let Some(mut connection) = self.connection.lock().await.take() {
            connection.stream.get_mut().shutdown().await?;
            info!("Closed connection to {}", self.name);
        }
        Ok(())
    }

    async fn is_open(&self) -> bool {
        self.connection.lock().await.is_some()
    }

    fn name(&self) -> &str {
        &self.name
    }
}
