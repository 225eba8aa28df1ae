//! Process-wide map from peer identity to its live connection.

use super::ConnectionId;
use crate::error::AdapterError;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::SystemTime;
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::Message;
use uuid::Uuid;

/// Handle to one live peer connection.
///
/// Outbound frames are queued to the connection's writer task, so a handle
/// can be used from any task without touching the socket directly.
#[derive(Debug)]
pub struct PeerHandle {
    self_name: String,
    connection_id: ConnectionId,
    remote_addr: SocketAddr,
    connected_at: SystemTime,
    outbound: mpsc::UnboundedSender<Message>,
}

impl PeerHandle {
    pub fn new(
        self_name: String,
        remote_addr: SocketAddr,
        outbound: mpsc::UnboundedSender<Message>,
    ) -> Self {
        Self {
            self_name,
            connection_id: Uuid::new_v4(),
            remote_addr,
            connected_at: SystemTime::now(),
            outbound,
        }
    }

    pub fn self_name(&self) -> &str {
        &self.self_name
    }

    pub fn connection_id(&self) -> ConnectionId {
        self.connection_id
    }

    pub fn remote_addr(&self) -> SocketAddr {
        self.remote_addr
    }

    pub fn connected_at(&self) -> SystemTime {
        self.connected_at
    }

    /// Queues a text frame for the peer.
    pub fn send_text(&self, text: impl Into<String>) -> Result<(), AdapterError> {
        let text: String = text.into();
        self.outbound
            .send(Message::Text(text.into()))
            .map_err(|_| AdapterError::PeerClosed(self.self_name.clone()))
    }

    /// Asks the writer task to close the socket. Errors are ignored.
    pub fn close(&self) {
        let _ = self.outbound.send(Message::Close(None));
    }

    pub fn is_closed(&self) -> bool {
        self.outbound.is_closed()
    }
}

/// Identity → connection map with atomic insert-if-absent.
///
/// Cloning the registry shares the underlying map.
#[derive(Debug, Clone, Default)]
pub struct ConnectionRegistry {
    connections: Arc<DashMap<String, Arc<PeerHandle>>>,
}

impl ConnectionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `handle` under its identity.
    ///
    /// Never replaces an existing entry; a second registration for the same
    /// identity fails with [`AdapterError::DuplicateIdentity`].
    pub fn register(&self, handle: Arc<PeerHandle>) -> Result<(), AdapterError> {
        match self.connections.entry(handle.self_name.clone()) {
            Entry::Occupied(entry) => Err(AdapterError::DuplicateIdentity(entry.key().clone())),
            Entry::Vacant(entry) => {
                entry.insert(handle);
                Ok(())
            }
        }
    }

    /// Removes whatever connection is registered for `identity`.
    pub fn unregister(&self, identity: &str) -> Option<Arc<PeerHandle>> {
        self.connections.remove(identity).map(|(_, handle)| handle)
    }

    /// Removes the entry for `identity` only if it belongs to `connection_id`.
    pub fn unregister_connection(
        &self,
        identity: &str,
        connection_id: ConnectionId,
    ) -> Option<Arc<PeerHandle>> {
        self.connections
            .remove_if(identity, |_, handle| handle.connection_id == connection_id)
            .map(|(_, handle)| handle)
    }

    pub fn contains(&self, identity: &str) -> bool {
        self.connections.contains_key(identity)
    }

    pub fn get(&self, identity: &str) -> Option<Arc<PeerHandle>> {
        self.connections.get(identity).map(|entry| entry.value().clone())
    }

    pub fn len(&self) -> usize {
        self.connections.len()
    }

    pub fn is_empty(&self) -> bool {
        self.connections.is_empty()
    }

    /// Identities of all live connections, in no particular order.
    pub fn identities(&self) -> Vec<String> {
        self.connections.iter().map(|entry| entry.key().clone()).collect()
    }

    /// Sends a raw text frame to the peer registered as `identity`.
    pub fn send_to(&self, identity: &str, text: impl Into<String>) -> Result<(), AdapterError> {
        match self.get(identity) {
            Some(handle) => handle.send_text(text),
            None => Err(AdapterError::PeerClosed(identity.to_string())),
        }
    }
}
