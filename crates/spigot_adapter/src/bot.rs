//! Bot handles and the host runtime they report to.
//!
//! The adapter does not implement any bot logic itself. For every connected
//! peer it creates a [`Bot`] and hands it to the host runtime, which owns the
//! connect/disconnect hooks and the event handlers.

use crate::event::Event;
use async_trait::async_trait;
use std::fmt;
use std::sync::Arc;

/// Callbacks provided by the bot framework hosting the adapter.
#[async_trait]
pub trait HostRuntime: Send + Sync + 'static {
    /// Called once a peer has completed its handshake and been registered.
    fn bot_connect(&self, bot: Arc<Bot>);

    /// Called exactly once per connected bot after its connection ends.
    fn bot_disconnect(&self, bot: Arc<Bot>);

    /// Handles one decoded event. Runs on its own task.
    async fn handle_event(&self, bot: Arc<Bot>, event: Arc<dyn Event>);
}

/// Session handle bound to a single peer identity.
pub struct Bot {
    self_name: String,
    runtime: Arc<dyn HostRuntime>,
}

impl Bot {
    pub fn new(self_name: String, runtime: Arc<dyn HostRuntime>) -> Self {
        Self { self_name, runtime }
    }

    /// Identity the peer announced during the handshake.
    pub fn self_name(&self) -> &str {
        &self.self_name
    }

    /// Forwards an event to the host runtime's handler.
    pub async fn handle_event(self: Arc<Self>, event: Arc<dyn Event>) {
        let runtime = self.runtime.clone();
        runtime.handle_event(self, event).await;
    }
}

impl fmt::Debug for Bot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Bot").field("self_name", &self.self_name).finish()
    }
}
