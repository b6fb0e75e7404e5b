//! Storage seam for users, messages and activity events.
//!
//! The dispatcher persists every inbound occurrence through [`Store`] before
//! any extension sees it, so extensions always observe durable state. The
//! records returned here are what domain events carry alongside the raw
//! payload.

mod memory;

pub use memory::MemoryStore;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::platform::{Member, Message, Role, Snowflake};

/// Result type for storage operations.
pub type Result<T> = std::result::Result<T, StorageError>;

/// Storage error types.
#[derive(Debug, Clone, thiserror::Error)]
pub enum StorageError {
    /// Backend rejected or failed the operation.
    #[error("Backend error: {0}")]
    Backend(String),

    /// A uniqueness or reference constraint was violated.
    #[error("Constraint violation: {0}")]
    Constraint(String),
}

/// Stored user, keyed by platform member id.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserRecord {
    pub member_id: Snowflake,
    pub name: String,
    pub display_name: String,
    pub roles: Vec<String>,
    pub absent: bool,
    pub created_at: DateTime<Utc>,
}

/// Stored message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessageRecord {
    pub message_id: Snowflake,
    pub channel_id: Snowflake,
    pub member_id: Snowflake,
    pub created_at: DateTime<Utc>,
}

/// Stored role.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoleRecord {
    pub role_id: Snowflake,
    pub name: String,
}

/// Kind of a stored activity event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActivityKind {
    MemberJoin,
    MemberLeave,
    MessageEdit,
    MessageDelete,
    ReactionAdd,
    ReactionRemove,
    VoiceJoin,
    VoiceLeave,
}

/// Stored activity event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActivityRecord {
    pub id: u64,
    pub kind: ActivityKind,
    pub member_id: Option<Snowflake>,
    pub channel_id: Option<Snowflake>,
    pub message_id: Option<Snowflake>,
    pub at: DateTime<Utc>,
}

/// Outcome of a full resync.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ResyncSummary {
    pub roles: usize,
    pub present: usize,
    pub absent: usize,
    pub removed: usize,
}

/// Persistence collaborator used by the dispatcher and by extensions.
#[async_trait::async_trait]
pub trait Store: Send + Sync {
    async fn get_user(&self, member_id: Snowflake) -> Result<Option<UserRecord>>;

    /// Insert or refresh a user from the member's current platform state.
    async fn upsert_member(&self, member: &Member) -> Result<UserRecord>;

    /// Flag a user as absent, keeping its history.
    async fn mark_absent(&self, member_id: Snowflake) -> Result<Option<UserRecord>>;

    /// Delete a user.
    async fn remove_user(&self, member_id: Snowflake) -> Result<Option<UserRecord>>;

    async fn record_member_join(&self, user: &UserRecord) -> Result<ActivityRecord>;

    async fn record_member_leave(&self, user: &UserRecord) -> Result<ActivityRecord>;

    async fn record_message(&self, user: &UserRecord, message: &Message) -> Result<MessageRecord>;

    async fn get_message(&self, message_id: Snowflake) -> Result<Option<MessageRecord>>;

    async fn record_message_edit(&self, message: &MessageRecord) -> Result<ActivityRecord>;

    async fn record_message_delete(&self, message: &MessageRecord) -> Result<ActivityRecord>;

    async fn record_reaction(
        &self,
        user: &UserRecord,
        message: &MessageRecord,
        added: bool,
    ) -> Result<ActivityRecord>;

    /// Open a voice session, closing any session left dangling in `channel_id`.
    async fn open_voice_session(
        &self,
        user: &UserRecord,
        channel_id: Snowflake,
    ) -> Result<ActivityRecord>;

    /// Close the open voice session in `channel_id`, returning the join and
    /// leave records; `None` when no session was open.
    async fn close_voice_session(
        &self,
        user: &UserRecord,
        channel_id: Snowflake,
    ) -> Result<Option<(ActivityRecord, ActivityRecord)>>;

    async fn get_role(&self, name: &str) -> Result<Option<RoleRecord>>;

    /// Replace cached roles and users with the platform's current view.
    async fn resync(
        &self,
        roles: &[Role],
        members: &[Member],
        keep_absent: bool,
    ) -> Result<ResyncSummary>;
}

/// Type alias for a shared store.
pub type DynStore = Arc<dyn Store>;
