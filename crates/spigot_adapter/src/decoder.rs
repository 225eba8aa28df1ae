//! Turns raw JSON payloads into typed events.

use crate::collator::Collator;
use crate::error::AdapterError;
use crate::event::{BaseEvent, Event, ModelDescriptor};
use serde_json::Value;
use std::sync::Arc;
use tracing::debug;

/// Decodes payloads by trying the collator's candidates in order and falling
/// back to a minimal base model.
#[derive(Debug, Clone)]
pub struct EventDecoder {
    collator: Arc<Collator>,
    fallback: ModelDescriptor,
}

impl EventDecoder {
    /// Creates a decoder that falls back to [`BaseEvent`].
    pub fn new(collator: Arc<Collator>) -> Self {
        Self {
            collator,
            fallback: ModelDescriptor::of::<BaseEvent>(),
        }
    }

    /// Replaces the fallback model.
    pub fn with_fallback(mut self, fallback: ModelDescriptor) -> Self {
        self.fallback = fallback;
        self
    }

    pub fn collator(&self) -> &Collator {
        &self.collator
    }

    /// Decodes a single payload received from `self_name`.
    ///
    /// Returns `Ok(None)` for payloads that are not JSON objects. The first
    /// candidate that parses wins; if none does, the fallback model is tried
    /// and its failure is reported as [`AdapterError::FrameDecode`]. The
    /// fallback is parsed at most once, even when it was also a candidate.
    pub fn decode(
        &self,
        payload: &Value,
        self_name: &str,
    ) -> Result<Option<Arc<dyn Event>>, AdapterError> {
        if !payload.is_object() {
            debug!(bot = %self_name, "Ignoring non-object payload: {}", payload);
            return Ok(None);
        }

        let mut fallback_error = None;
        for model in self.collator.resolve(payload) {
            match model.parse(payload) {
                Ok(event) => return Ok(Some(event)),
                Err(e) => {
                    debug!(bot = %self_name, "Event parser error for {}: {}", model.name(), e);
                    if model.name() == self.fallback.name() {
                        fallback_error = Some(e);
                    }
                }
            }
        }

        let error = match fallback_error {
            Some(e) => e,
            None => match self.fallback.parse(payload) {
                Ok(event) => return Ok(Some(event)),
                Err(e) => e,
            },
        };

        Err(AdapterError::FrameDecode {
            peer: self_name.to_string(),
            reason: format!("{error}; raw: {payload}"),
        })
    }

    /// Parses `text` as JSON and decodes it.
    pub fn decode_text(
        &self,
        text: &str,
        self_name: &str,
    ) -> Result<Option<Arc<dyn Event>>, AdapterError> {
        let payload: Value = serde_json::from_str(text).map_err(|e| AdapterError::FrameDecode {
            peer: self_name.to_string(),
            reason: format!("invalid JSON: {e}; raw: {text}"),
        })?;
        self.decode(&payload, self_name)
    }
}
