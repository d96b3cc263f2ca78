//! Inbound events produced by the host metrics pipeline

use chrono::{DateTime, SecondsFormat, Utc};
use serde_json::{Map, Value};
use std::collections::BTreeMap;

use crate::error::{EmitterError, Result};

/// Category tag carried by every metric event
pub const METRICS_FEED: &str = "metrics";

/// Category tag given to generic events that do not name one
pub const DEFAULT_FEED: &str = "events";

/// Keys of the flat event map that are not user attributes
const RESERVED_KEYS: [&str; 6] = ["feed", "timestamp", "host", "service", "metric", "value"];

/// A generic service event
#[derive(Debug, Clone, PartialEq)]
pub struct ServiceEvent {
    pub feed: String,
    pub host: String,
    pub service: String,
    pub created: DateTime<Utc>,
    pub attributes: BTreeMap<String, Value>,
}

impl ServiceEvent {
    pub fn new(
        feed: impl Into<String>,
        host: impl Into<String>,
        service: impl Into<String>,
        created: DateTime<Utc>,
    ) -> Self {
        Self {
            feed: feed.into(),
            host: host.into(),
            service: service.into(),
            created,
            attributes: BTreeMap::new(),
        }
    }

    /// Attach an attribute to the event
    pub fn with_attribute(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.attributes.insert(key.into(), value.into());
        self
    }
}

/// A numeric metric reported by a service
#[derive(Debug, Clone, PartialEq)]
pub struct ServiceMetricEvent {
    pub host: String,
    pub service: String,
    pub metric: String,
    pub created: DateTime<Utc>,
    /// Raw metric value, interpreted as a number when the record is built
    pub value: Value,
    pub attributes: BTreeMap<String, Value>,
}

impl ServiceMetricEvent {
    pub fn new(
        host: impl Into<String>,
        service: impl Into<String>,
        metric: impl Into<String>,
        created: DateTime<Utc>,
        value: impl Into<Value>,
    ) -> Self {
        Self {
            host: host.into(),
            service: service.into(),
            metric: metric.into(),
            created,
            value: value.into(),
            attributes: BTreeMap::new(),
        }
    }

    /// Attach a dimension to the metric
    pub fn with_attribute(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.attributes.insert(key.into(), value.into());
        self
    }
}

/// Any event the emitter accepts
#[derive(Debug, Clone, PartialEq)]
pub enum Event {
    Service(ServiceEvent),
    Metric(ServiceMetricEvent),
}

impl Event {
    /// Category tag used to pick a builder
    pub fn feed(&self) -> &str {
        match self {
            Event::Service(e) => &e.feed,
            Event::Metric(_) => METRICS_FEED,
        }
    }

    pub fn host(&self) -> &str {
        match self {
            Event::Service(e) => &e.host,
            Event::Metric(e) => &e.host,
        }
    }

    pub fn service(&self) -> &str {
        match self {
            Event::Service(e) => &e.service,
            Event::Metric(e) => &e.service,
        }
    }

    pub fn created(&self) -> DateTime<Utc> {
        match self {
            Event::Service(e) => e.created,
            Event::Metric(e) => e.created,
        }
    }

    pub fn attributes(&self) -> &BTreeMap<String, Value> {
        match self {
            Event::Service(e) => &e.attributes,
            Event::Metric(e) => &e.attributes,
        }
    }

    /// Full attribute set of the event as the host pipeline serialises it.
    ///
    /// Reserved keys (`feed`, `timestamp`, `host`, `service`, and `metric`/`value`
    /// for metrics) always win over user attributes of the same name.
    pub fn to_map(&self) -> BTreeMap<String, Value> {
        let mut map: BTreeMap<String, Value> = self
            .attributes()
            .iter()
            .filter(|(key, _)| !RESERVED_KEYS.contains(&key.as_str()))
            .map(|(key, value)| (key.clone(), value.clone()))
            .collect();

        map.insert("feed".to_string(), Value::from(self.feed()));
        map.insert(
            "timestamp".to_string(),
            Value::from(self.created().to_rfc3339_opts(SecondsFormat::Millis, true)),
        );
        map.insert("host".to_string(), Value::from(self.host()));
        map.insert("service".to_string(), Value::from(self.service()));

        if let Event::Metric(metric) = self {
            map.insert("metric".to_string(), Value::from(metric.metric.as_str()));
            map.insert("value".to_string(), metric.value.clone());
        }

        map
    }

    /// Decode an event from the flat JSON shape produced by [`Event::to_map`].
    ///
    /// `feed == "metrics"` yields a metric event, anything else a generic one.
    /// A missing `timestamp` means now; unknown keys become attributes.
    pub fn from_json(value: Value) -> Result<Event> {
        let mut fields = match value {
            Value::Object(fields) => fields,
            other => {
                return Err(EmitterError::InvalidEvent(format!(
                    "expected a JSON object, got {}",
                    other
                )));
            }
        };

        let feed = optional_string(&mut fields, "feed")?.unwrap_or_else(|| DEFAULT_FEED.to_string());
        let host = required_string(&mut fields, "host")?;
        let service = required_string(&mut fields, "service")?;
        let created = match optional_string(&mut fields, "timestamp")? {
            Some(ts) => DateTime::parse_from_rfc3339(&ts)
                .map_err(|e| EmitterError::InvalidEvent(format!("bad timestamp '{}': {}", ts, e)))?
                .with_timezone(&Utc),
            None => Utc::now(),
        };

        if feed == METRICS_FEED {
            let metric = required_string(&mut fields, "metric")?;
            let value = fields
                .remove("value")
                .ok_or_else(|| EmitterError::InvalidEvent(format!("metric '{}' has no value", metric)))?;
            Ok(Event::Metric(ServiceMetricEvent {
                host,
                service,
                metric,
                created,
                value,
                attributes: fields.into_iter().collect(),
            }))
        } else {
            Ok(Event::Service(ServiceEvent {
                feed,
                host,
                service,
                created,
                attributes: fields.into_iter().collect(),
            }))
        }
    }
}

impl From<ServiceEvent> for Event {
    fn from(event: ServiceEvent) -> Self {
        Event::Service(event)
    }
}

impl From<ServiceMetricEvent> for Event {
    fn from(event: ServiceMetricEvent) -> Self {
        Event::Metric(event)
    }
}

fn optional_string(fields: &mut Map<String, Value>, key: &str) -> Result<Option<String>> {
    match fields.remove(key) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::String(s)) => Ok(Some(s)),
        Some(other) => Err(EmitterError::InvalidEvent(format!(
            "field '{}' must be a string, got {}",
            key, other
        ))),
    }
}

fn required_string(fields: &mut Map<String, Value>, key: &str) -> Result<String> {
    optional_string(fields, key)?
        .ok_or_else(|| EmitterError::InvalidEvent(format!("missing field '{}'", key)))
}
