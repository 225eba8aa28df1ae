//! Error types for the Spigot adapter.
//!
//! Every failure a connection can run into is represented here. None of them
//! escape the task that owns the connection; the connection manager logs them
//! and moves the connection to its closing state.

use thiserror::Error;

/// Errors produced by the adapter.
#[derive(Error, Debug)]
pub enum AdapterError {
    /// The upgrade request carried no usable identity header.
    #[error("missing identity header")]
    MissingIdentity,

    /// Another live connection already owns this identity.
    #[error("duplicate identity: {0}")]
    DuplicateIdentity(String),

    /// The connection limit has been reached.
    #[error("connection limit of {0} reached")]
    ConnectionLimit(usize),

    /// A single frame could not be turned into an event.
    #[error("failed to decode frame from {peer}: {reason}")]
    FrameDecode { peer: String, reason: String },

    /// The remote peer closed the socket.
    #[error("connection closed by peer {0}")]
    PeerClosed(String),

    /// Any other transport failure inside the receive loop.
    #[error("transport error for {peer}: {source}")]
    UnexpectedTransport {
        peer: String,
        #[source]
        source: tokio_tungstenite::tungstenite::Error,
    },

    /// Socket setup or accept failures.
    #[error("network error: {0}")]
    Network(String),

    /// Invalid adapter configuration.
    #[error("configuration error: {0}")]
    Config(String),
}

impl AdapterError {
    /// Close code sent to the peer when this error rejects a handshake.
    ///
    /// Only handshake failures map to a close code; mid-session failures
    /// close the socket without a guaranteed reason.
    pub fn close_code(&self) -> Option<u16> {
        match self {
            AdapterError::MissingIdentity | AdapterError::DuplicateIdentity(_) => Some(1008),
            AdapterError::ConnectionLimit(_) => Some(1013),
            _ => None,
        }
    }
}
