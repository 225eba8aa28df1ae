//! Event model shared by every payload a Spigot peer can report.
//!
//! Each event variant is a plain serde struct that embeds an [`EventHeader`]
//! and declares the discriminator values it answers to. Variants are exposed
//! to the rest of the adapter as `Arc<dyn Event>`; callers that need the
//! concrete type downcast through [`Event::as_any`].
//!
//! New variants are added by deriving `Deserialize` and invoking
//! [`event_model!`](crate::event_model):
//!
//! ```rust
//! use serde::Deserialize;
//! use spigot_adapter::{event_model, EventHeader};
//!
//! #[derive(Debug, Deserialize)]
//! pub struct WeatherChangeEvent {
//!     #[serde(flatten)]
//!     pub header: EventHeader,
//!     pub to_weather_state: bool,
//! }
//!
//! event_model!(
//!     WeatherChangeEvent,
//!     "WeatherChangeEvent",
//!     [("post_type", "notice"), ("event_name", "WeatherChangeEvent")]
//! );
//! ```

pub mod types;

use serde::de::{DeserializeOwned, Error as _};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::any::Any;
use std::fmt;
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

pub use types::*;

/// Returns the current UNIX timestamp in seconds.
pub fn current_timestamp() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or_default()
}

/// Fields carried by every event a peer sends.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventHeader {
    /// Name of the server-side event, e.g. `PlayerJoinEvent`
    pub event_name: String,

    /// Event category (`message`, `notice`, ...)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub post_type: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sub_type: Option<String>,

    /// Name of the Minecraft server that produced the event
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub server_name: Option<String>,

    /// Seconds since the UNIX epoch; stamped on receipt when absent
    #[serde(default = "current_timestamp")]
    pub timestamp: u64,
}

/// Interface of a decoded event.
///
/// Events are immutable once decoded and are shared between the receive loop
/// and the dispatch task through an `Arc`.
pub trait Event: Send + Sync + Any + fmt::Debug {
    /// Common header fields.
    fn header(&self) -> &EventHeader;

    /// Name of the model this event was decoded as.
    fn model_name(&self) -> &'static str;

    /// Access for downcasting to the concrete variant.
    fn as_any(&self) -> &dyn Any;

    fn event_name(&self) -> &str {
        &self.header().event_name
    }

    fn post_type(&self) -> Option<&str> {
        self.header().post_type.as_deref()
    }

    fn server_name(&self) -> Option<&str> {
        self.header().server_name.as_deref()
    }

    /// Human readable one-line summary used in logs.
    fn description(&self) -> String {
        format!("[{}] {}", self.model_name(), self.event_name())
    }

    /// Identifier of the player the event is about, if any.
    fn user_id(&self) -> Option<&str> {
        None
    }

    /// Plain text content for message events.
    fn plaintext(&self) -> Option<&str> {
        None
    }
}

impl dyn Event {
    /// Downcasts to a concrete event variant.
    pub fn downcast_ref<T: Event>(&self) -> Option<&T> {
        self.as_any().downcast_ref::<T>()
    }

    /// Returns true if this event was decoded as `T`.
    pub fn is<T: Event>(&self) -> bool {
        self.as_any().is::<T>()
    }
}

/// A concrete event variant that can be registered with the schema registry.
///
/// `DISCRIMINATORS` lists `(field, value)` pairs the payload must carry for
/// this model to apply. A model with no discriminators sits at the root of the
/// collator index and is offered for every payload.
pub trait EventModel: Event + DeserializeOwned + Sized {
    const MODEL_NAME: &'static str;
    const DISCRIMINATORS: &'static [(&'static str, &'static str)];
}

/// Type-erased description of an [`EventModel`].
#[derive(Clone, Copy)]
pub struct ModelDescriptor {
    name: &'static str,
    discriminators: &'static [(&'static str, &'static str)],
    parse: fn(&Value) -> Result<Arc<dyn Event>, serde_json::Error>,
}

impl ModelDescriptor {
    /// Builds the descriptor for `T`.
    pub fn of<T: EventModel>() -> Self {
        Self {
            name: T::MODEL_NAME,
            discriminators: T::DISCRIMINATORS,
            parse: parse_model::<T>,
        }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn discriminators(&self) -> &'static [(&'static str, &'static str)] {
        self.discriminators
    }

    /// Declared value of a discriminator field, if the model declares one.
    pub fn discriminator(&self, field: &str) -> Option<&'static str> {
        self.discriminators
            .iter()
            .find(|(name, _)| *name == field)
            .map(|(_, value)| *value)
    }

    /// Strictly parses `payload` into this model.
    ///
    /// Fails if any declared discriminator differs from the payload or if the
    /// payload does not satisfy the model's fields.
    pub fn parse(&self, payload: &Value) -> Result<Arc<dyn Event>, serde_json::Error> {
        for (field, expected) in self.discriminators {
            let found = field_marker(payload, field);
            if found != *expected {
                return Err(serde_json::Error::custom(format!(
                    "{} expects {field}={expected:?}, got {found:?}",
                    self.name
                )));
            }
        }
        (self.parse)(payload)
    }
}

impl fmt::Debug for ModelDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ModelDescriptor")
            .field("name", &self.name)
            .field("discriminators", &self.discriminators)
            .finish()
    }
}

fn parse_model<T: EventModel>(payload: &Value) -> Result<Arc<dyn Event>, serde_json::Error> {
    T::deserialize(payload).map(|event| Arc::new(event) as Arc<dyn Event>)
}

/// String form of a discriminator field in a payload.
///
/// Strings are taken verbatim, other scalars are stringified, and missing or
/// null fields map to the empty marker.
pub(crate) fn field_marker(payload: &Value, field: &str) -> String {
    match payload.get(field) {
        None | Some(Value::Null) => String::new(),
        Some(Value::String(s)) => s.clone(),
        Some(other) => other.to_string(),
    }
}

/// Implements [`Event`] and [`EventModel`] for a struct with a `header` field.
///
/// Additional `Event` methods can be overridden in a trailing block.
#[macro_export]
macro_rules! event_model {
    ($ty:ty, $name:literal, [$(($field:literal, $value:literal)),* $(,)?] $(, { $($body:tt)* })?) => {
        impl $crate::event::Event for $ty {
            fn header(&self) -> &$crate::event::EventHeader {
                &self.header
            }

            fn model_name(&self) -> &'static str {
                $name
            }

            fn as_any(&self) -> &dyn ::std::any::Any {
                self
            }

            $($($body)*)?
        }

        impl $crate::event::EventModel for $ty {
            const MODEL_NAME: &'static str = $name;
            const DISCRIMINATORS: &'static [(&'static str, &'static str)] = &[$(($field, $value)),*];
        }
    };
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_header_defaults() {
        let header: EventHeader = serde_json::from_value(json!({"event_name": "X"})).unwrap();
        assert_eq!(header.event_name, "X");
        assert!(header.post_type.is_none());
        assert!(header.server_name.is_none());
        assert!(header.timestamp > 0);
    }

    #[test]
    fn test_field_marker() {
        let payload = json!({"a": "x", "b": 3, "c": null, "d": true});
        assert_eq!(field_marker(&payload, "a"), "x");
        assert_eq!(field_marker(&payload, "b"), "3");
        assert_eq!(field_marker(&payload, "c"), "");
        assert_eq!(field_marker(&payload, "d"), "true");
        assert_eq!(field_marker(&payload, "missing"), "");
    }

    #[test]
    fn test_descriptor_rejects_mismatched_discriminator() {
        let model = ModelDescriptor::of::<PlayerJoinEvent>();
        assert_eq!(model.discriminator("event_name"), Some("PlayerJoinEvent"));

        let payload = json!({
            "post_type": "notice",
            "event_name": "PlayerQuitEvent",
            "player": {"nickname": "Steve"}
        });
        assert!(model.parse(&payload).is_err());
    }

    #[test]
    fn test_descriptor_parses_and_downcasts() {
        let model = ModelDescriptor::of::<PlayerJoinEvent>();
        let payload = json!({
            "post_type": "notice",
            "event_name": "PlayerJoinEvent",
            "server_name": "survival",
            "player": {"nickname": "Steve"}
        });

        let event = model.parse(&payload).unwrap();
        assert!(event.is::<PlayerJoinEvent>());
        assert_eq!(event.server_name(), Some("survival"));
        let join = event.downcast_ref::<PlayerJoinEvent>().unwrap();
        assert_eq!(join.player.nickname, "Steve");
    }
}
