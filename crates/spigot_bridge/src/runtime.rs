//! A host runtime that logs bot lifecycle and events.
//!
//! Stands in for a full bot framework when the bridge runs on its own.

use async_trait::async_trait;
use spigot_adapter::event::{AsyncPlayerChatEvent, PlayerDeathEvent};
use spigot_adapter::{Bot, Event, HostRuntime};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::{debug, info};

#[derive(Debug, Default)]
pub struct LoggingRuntime {
    events_handled: AtomicU64,
}

impl LoggingRuntime {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events_handled(&self) -> u64 {
        self.events_handled.load(Ordering::Relaxed)
    }
}

#[async_trait]
impl HostRuntime for LoggingRuntime {
    fn bot_connect(&self, bot: Arc<Bot>) {
        info!(bot = %bot.self_name(), "🔌 Bot online");
    }

    fn bot_disconnect(&self, bot: Arc<Bot>) {
        info!(bot = %bot.self_name(), "👋 Bot offline");
    }

    async fn handle_event(&self, bot: Arc<Bot>, event: Arc<dyn Event>) {
        self.events_handled.fetch_add(1, Ordering::Relaxed);

        if let Some(chat) = event.downcast_ref::<AsyncPlayerChatEvent>() {
            info!(bot = %bot.self_name(), "💬 <{}> {}", chat.player.nickname, chat.message);
        } else if let Some(death) = event.downcast_ref::<PlayerDeathEvent>() {
            info!(bot = %bot.self_name(), "☠️ {}", death.description());
        } else {
            info!(
                bot = %bot.self_name(),
                model = event.model_name(),
                "{}",
                event.description()
            );
        }
        debug!(bot = %bot.self_name(), "Event detail: {:?}", event);
    }
}
