//! Configuration for the bridge binary.
//!
//! The configuration is a TOML file with `[server]`, `[adapter]` and
//! `[logging]` sections. Every field has a default, so a partial file is
//! enough; a missing file is created with the defaults on first start.

use serde::{Deserialize, Serialize};
use spigot_adapter::{AdapterConfig, IdentityEncoding};
use std::net::SocketAddr;
use std::path::Path;
use tracing::info;

/// Application configuration loaded from a TOML file.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub server: ServerSettings,
    pub adapter: AdapterSettings,
    pub logging: LoggingSettings,
}

/// Listener and session lifecycle settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerSettings {
    /// Network address to bind to (e.g., "127.0.0.1:8080")
    pub bind_address: String,
    /// WebSocket endpoint path
    pub ws_path: String,
    /// Maximum number of concurrently connected peers
    pub max_connections: usize,
    /// Close handshake timeout in milliseconds
    pub close_timeout_ms: u64,
    /// Wait for in-flight event handlers on shutdown
    pub drain_dispatch_on_shutdown: bool,
    /// Shutdown grace period in milliseconds
    pub shutdown_grace_ms: u64,
}

/// Peer identity and event routing settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AdapterSettings {
    /// Header carrying the peer identity
    pub identity_header: String,
    /// `raw` or `unicode_escape`
    pub identity_encoding: IdentityEncoding,
    /// Payload fields used to select the event model, coarsest first
    pub discriminator_fields: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingSettings {
    /// Log level filter (trace, debug, info, warn, error)
    pub level: String,
    /// Whether to output logs in JSON format
    pub json_format: bool,
}

impl Default for ServerSettings {
    fn default() -> Self {
        let defaults = AdapterConfig::default();
        Self {
            bind_address: defaults.bind_address.to_string(),
            ws_path: defaults.ws_path,
            max_connections: defaults.max_connections,
            close_timeout_ms: defaults.close_timeout_ms,
            drain_dispatch_on_shutdown: defaults.drain_dispatch_on_shutdown,
            shutdown_grace_ms: defaults.shutdown_grace_ms,
        }
    }
}

impl Default for AdapterSettings {
    fn default() -> Self {
        let defaults = AdapterConfig::default();
        Self {
            identity_header: defaults.identity_header,
            identity_encoding: defaults.identity_encoding,
            discriminator_fields: defaults.discriminator_fields,
        }
    }
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json_format: false,
        }
    }
}

const VALID_LOG_LEVELS: [&str; 5] = ["trace", "debug", "info", "warn", "error"];

impl AppConfig {
    /// Loads configuration from a TOML file.
    ///
    /// If the file doesn't exist, writes the default configuration there and
    /// returns it.
    pub async fn load_from_file(path: &Path) -> Result<Self, Box<dyn std::error::Error>> {
        if path.exists() {
            let content = tokio::fs::read_to_string(path).await?;
            let config: AppConfig = toml::from_str(&content)?;
            Ok(config)
        } else {
            let default_config = AppConfig::default();
            let toml_content = toml::to_string_pretty(&default_config)?;
            tokio::fs::write(path, toml_content).await?;
            info!("Created default configuration file: {}", path.display());
            Ok(default_config)
        }
    }

    /// Builds the adapter configuration.
    pub fn to_adapter_config(&self) -> Result<AdapterConfig, Box<dyn std::error::Error>> {
        let bind_address: SocketAddr = self.server.bind_address.parse()?;
        Ok(AdapterConfig {
            bind_address,
            ws_path: self.server.ws_path.clone(),
            identity_header: self.adapter.identity_header.clone(),
            identity_encoding: self.adapter.identity_encoding,
            discriminator_fields: self.adapter.discriminator_fields.clone(),
            max_connections: self.server.max_connections,
            close_timeout_ms: self.server.close_timeout_ms,
            drain_dispatch_on_shutdown: self.server.drain_dispatch_on_shutdown,
            shutdown_grace_ms: self.server.shutdown_grace_ms,
        })
    }

    /// Validates the configuration.
    ///
    /// Returns an error string describing the first problem found.
    pub fn validate(&self) -> Result<(), String> {
        if !VALID_LOG_LEVELS.contains(&self.logging.level.as_str()) {
            return Err(format!(
                "Invalid log level: {}. Must be one of: {VALID_LOG_LEVELS:?}",
                &self.logging.level
            ));
        }

        let adapter_config = self
            .to_adapter_config()
            .map_err(|e| format!("Invalid bind address {}: {e}", &self.server.bind_address))?;
        adapter_config.validate().map_err(|e| e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::{NamedTempFile, TempDir};
    use tokio::fs;

    #[test]
    fn test_app_config_default() {
        let config = AppConfig::default();
        assert_eq!(config.server.bind_address, "127.0.0.1:8080");
        assert_eq!(config.server.ws_path, "/spigot/ws");
        assert_eq!(config.server.max_connections, 1000);
        assert_eq!(config.adapter.identity_header, "X-Self-Name");
        assert_eq!(config.adapter.identity_encoding, IdentityEncoding::UnicodeEscape);
        assert_eq!(
            config.adapter.discriminator_fields,
            vec!["post_type".to_string(), "event_name".to_string()]
        );
        assert_eq!(config.logging.level, "info");
        assert!(!config.logging.json_format);
        assert!(config.validate().is_ok());
    }

    #[tokio::test]
    async fn test_load_from_nonexistent_file_creates_default() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("spigot_bridge.toml");

        let config = AppConfig::load_from_file(&path).await.unwrap();
        assert_eq!(config.server.bind_address, "127.0.0.1:8080");
        assert!(path.exists());

        // The written file loads back to the same values.
        let reloaded = AppConfig::load_from_file(&path).await.unwrap();
        assert_eq!(reloaded.server.ws_path, config.server.ws_path);
        assert_eq!(
            reloaded.adapter.discriminator_fields,
            config.adapter.discriminator_fields
        );
    }

    #[tokio::test]
    async fn test_load_from_existing_file() {
        let toml_content = r#"
[server]
bind_address = "0.0.0.0:3000"
ws_path = "/mc/ws"
max_connections = 8

[adapter]
identity_encoding = "raw"
discriminator_fields = ["event_name"]

[logging]
level = "debug"
json_format = true
"#;

        let temp_file = NamedTempFile::new().unwrap();
        fs::write(temp_file.path(), toml_content).await.unwrap();

        let config = AppConfig::load_from_file(temp_file.path()).await.unwrap();
        assert_eq!(config.server.bind_address, "0.0.0.0:3000");
        assert_eq!(config.server.ws_path, "/mc/ws");
        assert_eq!(config.server.max_connections, 8);
        // Unset fields keep their defaults.
        assert_eq!(config.server.close_timeout_ms, 1000);
        assert_eq!(config.adapter.identity_header, "X-Self-Name");
        assert_eq!(config.adapter.identity_encoding, IdentityEncoding::Raw);
        assert_eq!(config.adapter.discriminator_fields, vec!["event_name"]);
        assert_eq!(config.logging.level, "debug");
        assert!(config.logging.json_format);
    }

    #[tokio::test]
    async fn test_load_rejects_malformed_toml() {
        let temp_file = NamedTempFile::new().unwrap();
        fs::write(temp_file.path(), "[server\nbind_address = ")
            .await
            .unwrap();
        assert!(AppConfig::load_from_file(temp_file.path()).await.is_err());
    }

    #[test]
    fn test_to_adapter_config_conversion() {
        let mut config = AppConfig::default();
        config.server.bind_address = "0.0.0.0:9000".to_string();
        config.server.shutdown_grace_ms = 250;
        config.adapter.identity_encoding = IdentityEncoding::Raw;

        let adapter_config = config.to_adapter_config().unwrap();
        assert_eq!(adapter_config.bind_address.port(), 9000);
        assert_eq!(adapter_config.shutdown_grace_ms, 250);
        assert_eq!(adapter_config.identity_encoding, IdentityEncoding::Raw);
        assert_eq!(adapter_config.ws_path, "/spigot/ws");
    }

    #[test]
    fn test_validation_invalid_bind_address() {
        let mut config = AppConfig::default();
        config.server.bind_address = "not-an-address".to_string();
        assert!(config.validate().unwrap_err().contains("Invalid bind address"));
    }

    #[test]
    fn test_validation_invalid_log_level() {
        let mut config = AppConfig::default();
        config.logging.level = "verbose".to_string();
        assert!(config.validate().unwrap_err().contains("Invalid log level"));

        for level in VALID_LOG_LEVELS {
            config.logging.level = level.to_string();
            assert!(config.validate().is_ok());
        }
    }

    #[test]
    fn test_validation_adapter_settings() {
        let mut config = AppConfig::default();
        config.server.ws_path = "spigot".to_string();
        assert!(config.validate().is_err());

        let mut config = AppConfig::default();
        config.adapter.discriminator_fields.clear();
        assert!(config.validate().is_err());

        let mut config = AppConfig::default();
        config.adapter.identity_header = "Bad Header".to_string();
        assert!(config.validate().is_err());
    }
}
