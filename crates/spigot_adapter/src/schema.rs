//! Event schema registry.
//!
//! Holds the complete, ordered list of event models known to the adapter. The
//! list is assembled once at startup and never changes afterwards; the
//! collator builds its index from it.

use crate::event::{
    AsyncPlayerChatEvent, BaseEvent, EventModel, MessageEvent, ModelDescriptor, NoticeEvent,
    PlayerCommandPreprocessEvent, PlayerDeathEvent, PlayerJoinEvent, PlayerQuitEvent,
};
use once_cell::sync::Lazy;

static DEFAULT_MODELS: Lazy<Vec<ModelDescriptor>> = Lazy::new(|| {
    vec![
        ModelDescriptor::of::<BaseEvent>(),
        ModelDescriptor::of::<MessageEvent>(),
        ModelDescriptor::of::<AsyncPlayerChatEvent>(),
        ModelDescriptor::of::<PlayerCommandPreprocessEvent>(),
        ModelDescriptor::of::<NoticeEvent>(),
        ModelDescriptor::of::<PlayerJoinEvent>(),
        ModelDescriptor::of::<PlayerQuitEvent>(),
        ModelDescriptor::of::<PlayerDeathEvent>(),
    ]
});

/// Ordered set of event models.
#[derive(Debug, Clone, Default)]
pub struct SchemaRegistry {
    models: Vec<ModelDescriptor>,
}

impl SchemaRegistry {
    /// An empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry pre-populated with the built-in Spigot events.
    pub fn with_defaults() -> Self {
        Self {
            models: DEFAULT_MODELS.clone(),
        }
    }

    /// Adds a model. Models registered later take precedence over earlier
    /// models that share the same discriminator key.
    pub fn register<T: EventModel>(mut self) -> Self {
        self.models.push(ModelDescriptor::of::<T>());
        self
    }

    pub fn register_descriptor(mut self, model: ModelDescriptor) -> Self {
        self.models.push(model);
        self
    }

    /// All known models, in registration order.
    pub fn models(&self) -> &[ModelDescriptor] {
        &self.models
    }

    pub fn len(&self) -> usize {
        self.models.len()
    }

    pub fn is_empty(&self) -> bool {
        self.models.is_empty()
    }
}
