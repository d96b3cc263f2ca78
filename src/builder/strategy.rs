//! Builder strategy trait
use serde_json::Value;
use std::collections::BTreeMap;

use crate::error::Result;
use crate::event::Event;
use crate::record::OutboundRecord;

/// Strategy converting one inbound event shape into an outbound record
pub trait EventBuilder: Send + Sync + 'static {
    /// Build the record for an event
    fn build(&self, event: &Event) -> Result<OutboundRecord>;

    /// Get the builder name
    fn name(&self) -> &str;
}

/// Render every attribute value as a string.
///
/// JSON strings lose their quotes, every other value keeps its JSON text.
pub fn stringify_attributes(attributes: &BTreeMap<String, Value>) -> BTreeMap<String, String> {
    attributes
        .iter()
        .map(|(key, value)| {
            let rendered = match value {
                Value::String(s) => s.clone(),
                other => other.to_string(),
            };
            (key.clone(), rendered)
        })
        .collect()
}
