use log::trace;

use super::strategy::{EventBuilder, stringify_attributes};
use crate::error::Result;
use crate::event::Event;
use crate::record::OutboundRecord;

/// Fallback builder for events without a dedicated strategy
#[derive(Debug, Default, Clone)]
pub struct DefaultEventBuilder;

impl EventBuilder for DefaultEventBuilder {
    fn build(&self, event: &Event) -> Result<OutboundRecord> {
        trace!("Building generic record for feed '{}'", event.feed());

        Ok(OutboundRecord::new(event.host(), event.service(), event.created())
            .with_attributes(stringify_attributes(&event.to_map())))
    }

    fn name(&self) -> &str {
        "default"
    }
}
