//! Built-in Spigot event variants.

use super::EventHeader;
use crate::event_model;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Player information attached to player-scoped events.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Player {
    pub nickname: String,
    #[serde(default)]
    pub uuid: Option<String>,
    #[serde(default)]
    pub display_name: Option<String>,
    #[serde(default)]
    pub is_op: Option<bool>,
    #[serde(default)]
    pub address: Option<String>,
}

/// Minimal event shape; every object carrying an `event_name` parses as this.
#[derive(Debug, Clone, Deserialize)]
pub struct BaseEvent {
    #[serde(flatten)]
    pub header: EventHeader,
    /// Everything the header does not cover
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

event_model!(BaseEvent, "BaseEvent", []);

/// Generic chat message; category fallback for `post_type = "message"`.
#[derive(Debug, Clone, Deserialize)]
pub struct MessageEvent {
    #[serde(flatten)]
    pub header: EventHeader,
    pub player: Player,
    pub message: String,
}

event_model!(MessageEvent, "MessageEvent", [("post_type", "message")], {
    fn description(&self) -> String {
        format!("Message from {}: {}", self.player.nickname, self.message)
    }

    fn user_id(&self) -> Option<&str> {
        Some(self.player.nickname.as_str())
    }

    fn plaintext(&self) -> Option<&str> {
        Some(self.message.as_str())
    }
});

#[derive(Debug, Clone, Deserialize)]
pub struct AsyncPlayerChatEvent {
    #[serde(flatten)]
    pub header: EventHeader,
    pub player: Player,
    pub message: String,
}

event_model!(
    AsyncPlayerChatEvent,
    "AsyncPlayerChatEvent",
    [("post_type", "message"), ("event_name", "AsyncPlayerChatEvent")],
    {
        fn description(&self) -> String {
            format!("<{}> {}", self.player.nickname, self.message)
        }

        fn user_id(&self) -> Option<&str> {
            Some(self.player.nickname.as_str())
        }

        fn plaintext(&self) -> Option<&str> {
            Some(self.message.as_str())
        }
    }
);

/// A player typed a command (the message includes the leading slash).
#[derive(Debug, Clone, Deserialize)]
pub struct PlayerCommandPreprocessEvent {
    #[serde(flatten)]
    pub header: EventHeader,
    pub player: Player,
    pub message: String,
}

event_model!(
    PlayerCommandPreprocessEvent,
    "PlayerCommandPreprocessEvent",
    [("post_type", "message"), ("event_name", "PlayerCommandPreprocessEvent")],
    {
        fn description(&self) -> String {
            format!("{} issued command {}", self.player.nickname, self.message)
        }

        fn user_id(&self) -> Option<&str> {
            Some(self.player.nickname.as_str())
        }

        fn plaintext(&self) -> Option<&str> {
            Some(self.message.as_str())
        }
    }
);

/// Generic notice; category fallback for `post_type = "notice"`.
#[derive(Debug, Clone, Deserialize)]
pub struct NoticeEvent {
    #[serde(flatten)]
    pub header: EventHeader,
    #[serde(default)]
    pub player: Option<Player>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

event_model!(NoticeEvent, "NoticeEvent", [("post_type", "notice")], {
    fn user_id(&self) -> Option<&str> {
        self.player.as_ref().map(|p| p.nickname.as_str())
    }
});

#[derive(Debug, Clone, Deserialize)]
pub struct PlayerJoinEvent {
    #[serde(flatten)]
    pub header: EventHeader,
    pub player: Player,
}

event_model!(
    PlayerJoinEvent,
    "PlayerJoinEvent",
    [("post_type", "notice"), ("event_name", "PlayerJoinEvent")],
    {
        fn description(&self) -> String {
            format!("{} joined the game", self.player.nickname)
        }

        fn user_id(&self) -> Option<&str> {
            Some(self.player.nickname.as_str())
        }
    }
);

#[derive(Debug, Clone, Deserialize)]
pub struct PlayerQuitEvent {
    #[serde(flatten)]
    pub header: EventHeader,
    pub player: Player,
}

event_model!(
    PlayerQuitEvent,
    "PlayerQuitEvent",
    [("post_type", "notice"), ("event_name", "PlayerQuitEvent")],
    {
        fn description(&self) -> String {
            format!("{} left the game", self.player.nickname)
        }

        fn user_id(&self) -> Option<&str> {
            Some(self.player.nickname.as_str())
        }
    }
);

#[derive(Debug, Clone, Deserialize)]
pub struct PlayerDeathEvent {
    #[serde(flatten)]
    pub header: EventHeader,
    pub player: Player,
    #[serde(default)]
    pub death_message: Option<String>,
}

event_model!(
    PlayerDeathEvent,
    "PlayerDeathEvent",
    [("post_type", "notice"), ("event_name", "PlayerDeathEvent")],
    {
        fn description(&self) -> String {
            match &self.death_message {
                Some(message) => message.clone(),
                None => format!("{} died", self.player.nickname),
            }
        }

        fn user_id(&self) -> Option<&str> {
            Some(self.player.nickname.as_str())
        }
    }
);
