//! Discriminator index over the event schema registry.
//!
//! The collator maps discriminator keys to candidate models. A key is the
//! tuple of discriminator values in the configured field order, with missing
//! fields mapped to the empty marker and trailing empty markers trimmed. A
//! payload is resolved by walking the prefixes of its own key from longest to
//! shortest, so a payload whose `event_name` is unknown still finds the
//! category model for its `post_type`, and ultimately any root model. A
//! payload with no discriminator fields at all still reaches the root models.

use crate::event::{field_marker, ModelDescriptor};
use crate::schema::SchemaRegistry;
use serde_json::Value;
use std::collections::HashMap;
use tracing::debug;

type Key = Vec<String>;

/// Read-only index from discriminator key to candidate models.
#[derive(Debug, Clone)]
pub struct Collator {
    name: String,
    fields: Vec<String>,
    index: HashMap<Key, Vec<ModelDescriptor>>,
}

impl Collator {
    /// Builds the index for every model in `registry`.
    ///
    /// `fields` is the ordered list of discriminator field names, coarsest
    /// first (e.g. `["post_type", "event_name"]`).
    pub fn new<S: Into<String>>(name: S, registry: &SchemaRegistry, fields: &[String]) -> Self {
        let name = name.into();
        let mut index: HashMap<Key, Vec<ModelDescriptor>> = HashMap::new();

        for model in registry.models() {
            let key = trim_key(
                fields
                    .iter()
                    .map(|field| model.discriminator(field).unwrap_or_default().to_string())
                    .collect(),
            );

            let slot = index.entry(key).or_default();
            if let Some(previous) = slot.first() {
                debug!(
                    "[{}] Model {} shares key with {}, trying it first",
                    name,
                    model.name(),
                    previous.name()
                );
            }
            slot.insert(0, *model);
        }

        Self {
            name,
            fields: fields.to_vec(),
            index,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn fields(&self) -> &[String] {
        &self.fields
    }

    /// Candidate models for `payload`, most specific first.
    ///
    /// Never fails: fields missing from the payload only reduce how specific
    /// the match can be. A payload carrying none of the discriminator fields
    /// gets the root models only.
    pub fn resolve<'a>(&'a self, payload: &Value) -> impl Iterator<Item = &'a ModelDescriptor> + 'a {
        let key = self.key_for(payload);
        (0..=key.len())
            .rev()
            .filter_map(move |len| {
                // Model keys never end in an empty marker.
                if len > 0 && key[len - 1].is_empty() {
                    return None;
                }
                self.index.get(&key[..len])
            })
            .flatten()
    }

    /// Discriminator key of a payload.
    fn key_for(&self, payload: &Value) -> Key {
        trim_key(
            self.fields
                .iter()
                .map(|field| field_marker(payload, field))
                .collect(),
        )
    }
}

fn trim_key(mut key: Key) -> Key {
    while key.last().is_some_and(|segment| segment.is_empty()) {
        key.pop();
    }
    key
}
