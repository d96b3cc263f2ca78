use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use super::generic::DefaultEventBuilder;
use super::metrics::MetricsEventBuilder;
use super::strategy::EventBuilder;
use crate::event::METRICS_FEED;

/// Immutable mapping from category tag to builder strategy.
///
/// Tags without a registration resolve to the default builder, so lookups
/// never fail. The registry is built once and shared read-only.
#[derive(Clone)]
pub struct BuilderRegistry {
    builders: HashMap<String, Arc<dyn EventBuilder>>,
    default: Arc<dyn EventBuilder>,
}

impl BuilderRegistry {
    /// Registry with the metrics builder and the generic fallback
    pub fn standard() -> Self {
        RegistryBuilder::new()
            .register(METRICS_FEED, MetricsEventBuilder)
            .build()
    }

    /// Start an empty registry with the generic fallback
    pub fn builder() -> RegistryBuilder {
        RegistryBuilder::new()
    }

    /// Get the builder for a tag, falling back to the default builder
    pub fn resolve(&self, feed: &str) -> &dyn EventBuilder {
        self.builders
            .get(feed)
            .map(|builder| builder.as_ref())
            .unwrap_or_else(|| self.default.as_ref())
    }

    /// Check whether a tag has an explicit registration
    pub fn contains(&self, feed: &str) -> bool {
        self.builders.contains_key(feed)
    }

    /// Registered tags, sorted
    pub fn feeds(&self) -> Vec<&str> {
        let mut feeds: Vec<&str> = self.builders.keys().map(String::as_str).collect();
        feeds.sort_unstable();
        feeds
    }
}

impl Default for BuilderRegistry {
    fn default() -> Self {
        Self::standard()
    }
}

impl fmt::Debug for BuilderRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BuilderRegistry")
            .field("feeds", &self.feeds())
            .field("default", &self.default.name())
            .finish()
    }
}

/// Helper struct for assembling a registry
pub struct RegistryBuilder {
    builders: HashMap<String, Arc<dyn EventBuilder>>,
    default: Arc<dyn EventBuilder>,
}

impl RegistryBuilder {
    pub fn new() -> Self {
        Self {
            builders: HashMap::new(),
            default: Arc::new(DefaultEventBuilder),
        }
    }

    /// Register a strategy for a tag, replacing any earlier one
    pub fn register(mut self, feed: impl Into<String>, builder: impl EventBuilder) -> Self {
        self.builders.insert(feed.into(), Arc::new(builder));
        self
    }

    /// Replace the fallback strategy
    pub fn default_builder(mut self, builder: impl EventBuilder) -> Self {
        self.default = Arc::new(builder);
        self
    }

    pub fn build(self) -> BuilderRegistry {
        BuilderRegistry {
            builders: self.builders,
            default: self.default,
        }
    }
}

impl Default for RegistryBuilder {
    fn default() -> Self {
        Self::new()
    }
}
