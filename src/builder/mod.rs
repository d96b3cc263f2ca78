mod strategy;
mod generic;
mod metrics;
mod registry;

// Re-export public items
pub use strategy::{EventBuilder, stringify_attributes};
pub use generic::DefaultEventBuilder;
pub use metrics::{MetricsEventBuilder, coerce_metric};
pub use registry::{BuilderRegistry, RegistryBuilder};
