use log::trace;
use serde_json::Value;

use super::strategy::{EventBuilder, stringify_attributes};
use crate::error::{EmitterError, Result};
use crate::event::Event;
use crate::record::{MetricValue, OutboundRecord};

/// Builder for numeric metric events.
///
/// The record's service label is `"<service> <metric>"`, so `cache/total` with
/// metric `hits` becomes `cache/total hits`. Unlike a bare host/service/time/metric
/// record, the stringified event map (dimensions included) rides along as
/// attributes, the same set the default builder attaches.
#[derive(Debug, Default, Clone)]
pub struct MetricsEventBuilder;

impl EventBuilder for MetricsEventBuilder {
    fn build(&self, event: &Event) -> Result<OutboundRecord> {
        let metric_event = match event {
            Event::Metric(metric_event) => metric_event,
            Event::Service(service_event) => {
                return Err(EmitterError::UnsupportedEvent {
                    builder: self.name().to_string(),
                    feed: service_event.feed.clone(),
                });
            }
        };

        let service = format!("{} {}", metric_event.service, metric_event.metric);
        let metric = coerce_metric(&metric_event.metric, &metric_event.value)?;
        trace!("Built metric record '{}' = {:?}", service, metric);

        Ok(OutboundRecord::new(&metric_event.host, service, metric_event.created)
            .with_metric(metric)
            .with_attributes(stringify_attributes(&event.to_map())))
    }

    fn name(&self) -> &str {
        "metrics"
    }
}

/// Interpret a raw metric value as a number.
///
/// Values without a fractional part become [`MetricValue::Int`] as long as they
/// fit in an `i64`; everything else stays [`MetricValue::Float`]. Strings are
/// parsed, any other JSON type or a non-finite number is a bad metric format.
pub fn coerce_metric(metric: &str, value: &Value) -> Result<MetricValue> {
    let number = match value {
        Value::Number(n) => n
            .as_f64()
            .ok_or_else(|| EmitterError::bad_metric(metric, format!("{} is not representable as f64", n)))?,
        Value::String(s) => s
            .trim()
            .parse::<f64>()
            .map_err(|e| EmitterError::bad_metric(metric, format!("'{}': {}", s, e)))?,
        other => {
            return Err(EmitterError::bad_metric(metric, format!("{} is not numeric", other)));
        }
    };

    if !number.is_finite() {
        return Err(EmitterError::bad_metric(metric, format!("{} is not finite", number)));
    }

    // i64::MAX as f64 rounds up to 2^63, which is already out of range
    if number == number.ceil() && number >= i64::MIN as f64 && number < i64::MAX as f64 {
        Ok(MetricValue::Int(number as i64))
    } else {
        Ok(MetricValue::Float(number))
    }
}
