use std::io;
use std::time::Duration;
use thiserror::Error;

/// Custom Error type for the metricbridge library
#[derive(Error, Debug)]
pub enum EmitterError {
    #[error("Connection error: unable to connect to {host}:{port}: {source}")]
    Connection {
        host: String,
        port: u16,
        #[source]
        source: io::Error,
    },

    #[error("Service not started.")]
    NotStarted,

    #[error("Emitter already closed")]
    AlreadyClosed,

    #[error("Bad metric format: {metric} ({reason})")]
    BadMetricFormat { metric: String, reason: String },

    #[error("Builder '{builder}' cannot handle event with feed '{feed}'")]
    UnsupportedEvent { builder: String, feed: String },

    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error("Timeout error: no acknowledgment after {0:?}")]
    Timeout(Duration),

    #[error("Rejected by server: {0}")]
    Rejected(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Config error: {0}")]
    Config(String),

    #[error("Invalid event: {0}")]
    InvalidEvent(String),
}

impl EmitterError {
    /// Build a bad metric format error for the given metric name
    pub fn bad_metric(metric: impl Into<String>, reason: impl Into<String>) -> Self {
        EmitterError::BadMetricFormat {
            metric: metric.into(),
            reason: reason.into(),
        }
    }
}

/// Result type used throughout the crate
pub type Result<T> = std::result::Result<T, EmitterError>;
