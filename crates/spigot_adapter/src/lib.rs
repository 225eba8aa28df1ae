//! # Spigot Adapter
//!
//! A WebSocket adapter that lets Spigot (Minecraft) server plugins act as bots
//! inside a bot framework. Each plugin connects to the adapter, identifies
//! itself with the `X-Self-Name` header and streams JSON event payloads.
//!
//! ## Architecture Overview
//!
//! - **Schema registry** ([`SchemaRegistry`]): the event models known at startup
//! - **Collator** ([`Collator`]): indexes models by their discriminator values
//!   and yields candidates for a payload, most specific first
//! - **Decoder** ([`EventDecoder`]): tries candidates in order with a base
//!   model as the last resort
//! - **Connection registry** ([`ConnectionRegistry`]): at most one live
//!   connection per identity
//! - **Adapter** ([`SpigotAdapter`]): accept loop, handshake, receive loop and
//!   dispatch to the [`HostRuntime`]
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use spigot_adapter::{AdapterConfig, Bot, Event, HostRuntime, SpigotAdapter};
//! use std::sync::Arc;
//!
//! struct Runtime;
//!
//! #[async_trait::async_trait]
//! impl HostRuntime for Runtime {
//!     fn bot_connect(&self, bot: Arc<Bot>) {
//!         println!("{} connected", bot.self_name());
//!     }
//!
//!     fn bot_disconnect(&self, bot: Arc<Bot>) {
//!         println!("{} disconnected", bot.self_name());
//!     }
//!
//!     async fn handle_event(&self, bot: Arc<Bot>, event: Arc<dyn Event>) {
//!         println!("[{}] {}", bot.self_name(), event.description());
//!     }
//! }
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let adapter = Arc::new(SpigotAdapter::new(AdapterConfig::default(), Arc::new(Runtime)));
//!     let (addr, server) = adapter.start()?;
//!     println!("listening on {addr}");
//!     server.await??;
//!     Ok(())
//! }
//! ```

pub mod adapter;
pub mod bot;
pub mod collator;
pub mod config;
pub mod connection;
pub mod decoder;
pub mod error;
pub mod event;
pub mod schema;

pub use adapter::{SpigotAdapter, ADAPTER_NAME};
pub use bot::{Bot, HostRuntime};
pub use collator::Collator;
pub use config::AdapterConfig;
pub use connection::{decode_identity, ConnectionId, ConnectionRegistry, IdentityEncoding, PeerHandle};
pub use decoder::EventDecoder;
pub use error::AdapterError;
pub use event::{current_timestamp, Event, EventHeader, EventModel, ModelDescriptor, Player};
pub use schema::SchemaRegistry;
