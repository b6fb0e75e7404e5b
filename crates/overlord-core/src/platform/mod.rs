//! Platform client seam.
//!
//! The community platform delivers raw events and exposes a handful of
//! outbound actions. The engine only depends on the [`Platform`] trait and
//! on the plain payload types below; a concrete gateway client lives
//! outside of this crate.

mod recording;

pub use recording::{OutboundAction, RecordingPlatform};

use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Platform-assigned identifier for members, channels, messages and roles.
pub type Snowflake = u64;

/// Result type for platform operations.
pub type Result<T> = std::result::Result<T, PlatformError>;

/// Platform client errors.
#[derive(Debug, Clone, thiserror::Error)]
pub enum PlatformError {
    /// Referenced object does not exist on the platform.
    #[error("Not found: {0}")]
    NotFound(String),

    /// The client lacks permission for the action.
    #[error("Forbidden: {0}")]
    Forbidden(String),

    /// Connection or protocol failure.
    #[error("Transport error: {0}")]
    Transport(String),
}

/// A guild member as seen by the platform.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Member {
    pub id: Snowflake,
    pub guild_id: Snowflake,
    pub name: String,
    #[serde(default)]
    pub display_name: String,
    #[serde(default)]
    pub roles: Vec<String>,
    #[serde(default)]
    pub bot: bool,
}

impl Member {
    pub fn new(id: Snowflake, guild_id: Snowflake, name: impl Into<String>) -> Self {
        let name = name.into();
        Self {
            id,
            guild_id,
            display_name: name.clone(),
            name,
            roles: Vec::new(),
            bot: false,
        }
    }

    pub fn with_roles<I, S>(mut self, roles: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.roles = roles.into_iter().map(Into::into).collect();
        self
    }

    pub fn as_bot(mut self) -> Self {
        self.bot = true;
        self
    }

    pub fn has_role(&self, role: &str) -> bool {
        self.roles.iter().any(|r| r == role)
    }

    /// Name used in log lines and reports.
    pub fn qualified_name(&self) -> String {
        format!("{}({})", self.name, self.id)
    }
}

/// A text message. `guild_id` is `None` for direct messages.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    pub id: Snowflake,
    pub channel_id: Snowflake,
    #[serde(default)]
    pub guild_id: Option<Snowflake>,
    pub author: Member,
    pub content: String,
}

impl Message {
    pub fn is_direct(&self) -> bool {
        self.guild_id.is_none()
    }
}

/// Reference to a message by id, as carried by edit/delete notifications.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessageRef {
    pub message_id: Snowflake,
    pub channel_id: Snowflake,
}

/// Reaction notification.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Reaction {
    pub user_id: Snowflake,
    pub channel_id: Snowflake,
    pub message_id: Snowflake,
    pub emoji: String,
}

/// Voice presence of a member at one point in time.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct VoiceState {
    #[serde(default)]
    pub channel_id: Option<Snowflake>,
    #[serde(default)]
    pub afk: bool,
}

/// A guild role.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Role {
    pub id: Snowflake,
    pub guild_id: Snowflake,
    pub name: String,
}

/// Destination of an outbound message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Target {
    Channel(Snowflake),
    User(Snowflake),
}

impl std::fmt::Display for Target {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Channel(id) => write!(f, "channel:{}", id),
            Self::User(id) => write!(f, "user:{}", id),
        }
    }
}

/// Outbound actions the engine and its extensions may perform.
#[async_trait::async_trait]
pub trait Platform: Send + Sync {
    /// Send a text message to a channel or a user.
    async fn send_message(&self, target: Target, content: &str) -> Result<()>;

    /// Add a role to a member.
    async fn add_role(&self, member_id: Snowflake, role: &str) -> Result<()>;

    /// Remove a role from a member.
    async fn remove_role(&self, member_id: Snowflake, role: &str) -> Result<()>;

    /// Fetch a guild member; `None` when the member is not in the guild.
    async fn fetch_member(&self, member_id: Snowflake) -> Result<Option<Member>>;

    /// Fetch every guild member, used by full resync.
    async fn fetch_members(&self) -> Result<Vec<Member>>;

    /// Fetch every guild role, used by full resync.
    async fn fetch_roles(&self) -> Result<Vec<Role>>;

    /// Fetch a message; `None` when it no longer exists.
    async fn fetch_message(
        &self,
        channel_id: Snowflake,
        message_id: Snowflake,
    ) -> Result<Option<Message>>;
}

/// Type alias for a shared platform client.
pub type DynPlatform = Arc<dyn Platform>;
