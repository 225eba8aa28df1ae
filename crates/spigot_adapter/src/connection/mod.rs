//! Connection handling for Spigot peers.
//!
//! This module covers the handshake (identity extraction from the upgrade
//! request) and the registry of live connections keyed by peer identity.

pub mod handshake;
pub mod registry;

pub use handshake::{decode_identity, IdentityEncoding};
pub use registry::{ConnectionRegistry, PeerHandle};

/// Identifier distinguishing successive connections of the same peer.
pub type ConnectionId = uuid::Uuid;
