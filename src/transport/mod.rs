use async_trait::async_trait;

use crate::error::Result;
use crate::record::OutboundRecord;

/// Line-delimited JSON transport over TCP
pub mod tcp;
pub use tcp::{TcpConnector, TcpTransport};

/// In-memory transport for testing
pub mod memory;
pub use memory::{MemoryConnector, MemoryTransport};

/// An open connection to the monitoring server
#[async_trait]
pub trait Transport: Send + Sync + 'static {
    /// Send one record and wait for the server's acknowledgment
    async fn send(&self, record: &OutboundRecord) -> Result<()>;

    /// Release the connection
    async fn close(&self) -> Result<()>;

    /// Whether the connection can still carry records
    async fn is_open(&self) -> bool {
        true
    }

    /// Get a name for this transport
    fn name(&self) -> &str;
}

/// Opens transport connections
#[async_trait]
pub trait Connector: Send + Sync + 'static {
    /// The transport this connector produces
    type Transport: Transport;

    /// Connect to a server
    async fn connect(&self, host: &str, port: u16) -> Result<Self::Transport>;
}
