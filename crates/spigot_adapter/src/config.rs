//! Adapter configuration types and defaults.

use crate::connection::IdentityEncoding;
use crate::error::AdapterError;
use std::net::SocketAddr;
use std::time::Duration;
use tokio_tungstenite::tungstenite::http::HeaderName;

/// Configuration for the Spigot adapter.
#[derive(Debug, Clone)]
pub struct AdapterConfig {
    /// The socket address to accept peer connections on
    pub bind_address: SocketAddr,

    /// Path of the WebSocket endpoint
    pub ws_path: String,

    /// Header carrying the peer identity
    pub identity_header: String,

    /// How the identity header value is decoded
    pub identity_encoding: IdentityEncoding,

    /// Discriminator fields, coarsest first
    pub discriminator_fields: Vec<String>,

    /// Maximum number of simultaneously registered peers
    pub max_connections: usize,

    /// How long to wait for a close handshake to finish, in milliseconds
    pub close_timeout_ms: u64,

    /// Whether shutdown waits for in-flight event dispatches
    pub drain_dispatch_on_shutdown: bool,

    /// Upper bound on the shutdown drain, in milliseconds
    pub shutdown_grace_ms: u64,
}

impl Default for AdapterConfig {
    fn default() -> Self {
        Self {
            bind_address: SocketAddr::from(([127, 0, 0, 1], 8080)),
            ws_path: "/spigot/ws".to_string(),
            identity_header: "X-Self-Name".to_string(),
            identity_encoding: IdentityEncoding::UnicodeEscape,
            discriminator_fields: vec!["post_type".to_string(), "event_name".to_string()],
            max_connections: 1000,
            close_timeout_ms: 1000,
            drain_dispatch_on_shutdown: true,
            shutdown_grace_ms: 5000,
        }
    }
}

impl AdapterConfig {
    pub fn close_timeout(&self) -> Duration {
        Duration::from_millis(self.close_timeout_ms)
    }

    pub fn shutdown_grace(&self) -> Duration {
        Duration::from_millis(self.shutdown_grace_ms)
    }

    /// Checks the configuration for values the adapter cannot work with.
    pub fn validate(&self) -> Result<(), AdapterError> {
        if !self.ws_path.starts_with('/') {
            return Err(AdapterError::Config(format!(
                "WebSocket path must start with '/': {}",
                self.ws_path
            )));
        }

        if HeaderName::from_bytes(self.identity_header.as_bytes()).is_err() {
            return Err(AdapterError::Config(format!(
                "Invalid identity header name: {}",
                self.identity_header
            )));
        }

        if self.discriminator_fields.is_empty() {
            return Err(AdapterError::Config(
                "At least one discriminator field is required".to_string(),
            ));
        }

        if self.discriminator_fields.iter().any(|field| field.is_empty()) {
            return Err(AdapterError::Config(
                "Discriminator field names cannot be empty".to_string(),
            ));
        }

        if self.max_connections == 0 {
            return Err(AdapterError::Config(
                "max_connections must be greater than zero".to_string(),
            ));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        let config = AdapterConfig::default();
        assert_eq!(config.ws_path, "/spigot/ws");
        assert_eq!(config.identity_header, "X-Self-Name");
        assert_eq!(config.discriminator_fields, vec!["post_type", "event_name"]);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_bad_values() {
        let mut config = AdapterConfig {
            ws_path: "spigot/ws".to_string(),
            ..Default::default()
        };
        assert!(config.validate().is_err());

        config.ws_path = "/spigot/ws".to_string();
        config.identity_header = "X Self Name".to_string();
        assert!(config.validate().is_err());

        config.identity_header = "X-Self-Name".to_string();
        config.discriminator_fields = vec![];
        assert!(config.validate().is_err());

        config.discriminator_fields = vec!["event_name".to_string(), String::new()];
        assert!(config.validate().is_err());

        config.discriminator_fields = vec!["event_name".to_string()];
        config.max_connections = 0;
        assert!(config.validate().is_err());
    }
}
