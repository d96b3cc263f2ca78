//! A bridge forwarding service events and metrics to a monitoring server

pub mod builder;
pub mod config;
pub mod emitter;
pub mod error;
pub mod event;
pub mod record;
pub mod transport;
pub mod util;

/// Re-export of commonly used types for convenience
pub mod prelude {
    pub use crate::builder::{BuilderRegistry, EventBuilder};
    pub use crate::config::{BridgeConfig, EmitterConfig};
    pub use crate::emitter::{Emitter, EmitterState, StreamEmitter};
    pub use crate::error::{EmitterError, Result};
    pub use crate::event::{Event, ServiceEvent, ServiceMetricEvent};
    pub use crate::record::{MetricValue, OutboundRecord};
    pub use crate::transport::{Connector, Transport};
}

/// Library version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
