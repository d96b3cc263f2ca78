use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::BTreeMap;

/// Numeric metric of an outbound record
///
/// The server keeps integer and floating-point metrics apart, so the variant
/// chosen here decides how downstream aggregations see the value.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(untagged)]
pub enum MetricValue {
    Int(i64),
    Float(f64),
}

/// Transport-ready representation of one event
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OutboundRecord {
    pub host: String,
    pub service: String,
    /// Seconds since the epoch
    pub time: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub metric: Option<MetricValue>,
    pub attributes: BTreeMap<String, String>,
}

impl OutboundRecord {
    pub fn new(host: impl Into<String>, service: impl Into<String>, created: DateTime<Utc>) -> Self {
        Self {
            host: host.into(),
            service: service.into(),
            time: epoch_seconds(created),
            metric: None,
            attributes: BTreeMap::new(),
        }
    }

    pub fn with_metric(mut self, metric: MetricValue) -> Self {
        self.metric = Some(metric);
        self
    }

    pub fn with_attributes(mut self, attributes: BTreeMap<String, String>) -> Self {
        self.attributes = attributes;
        self
    }
}

/// Whole seconds since the epoch, truncating the milliseconds toward zero
pub fn epoch_seconds(created: DateTime<Utc>) -> i64 {
    created.timestamp_millis() / 1000
}
