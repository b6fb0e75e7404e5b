//! In-process platform that records outbound actions.
//!
//! Used by tests and by the `replay` command, where no gateway connection
//! exists. Members and messages are seeded up front; every outbound action
//! is logged and kept for inspection.

use std::collections::HashMap;

use parking_lot::RwLock;
use serde::Serialize;

use super::{Member, Message, Platform, PlatformError, Result, Role, Snowflake, Target};

/// An action performed through [`RecordingPlatform`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum OutboundAction {
    Message { target: Target, content: String },
    AddRole { member_id: Snowflake, role: String },
    RemoveRole { member_id: Snowflake, role: String },
}

/// Platform double backed by in-memory maps.
#[derive(Default)]
pub struct RecordingPlatform {
    members: RwLock<HashMap<Snowflake, Member>>,
    messages: RwLock<HashMap<Snowflake, Message>>,
    roles: RwLock<HashMap<Snowflake, Role>>,
    actions: RwLock<Vec<OutboundAction>>,
    unavailable: RwLock<bool>,
}

impl RecordingPlatform {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed a guild member.
    pub fn insert_member(&self, member: Member) {
        self.members.write().insert(member.id, member);
    }

    /// Remove a guild member.
    pub fn remove_member(&self, member_id: Snowflake) -> Option<Member> {
        self.members.write().remove(&member_id)
    }

    /// Seed a guild role.
    pub fn insert_role(&self, role: Role) {
        self.roles.write().insert(role.id, role);
    }

    /// Remove a guild role.
    pub fn delete_role(&self, role_id: Snowflake) -> Option<Role> {
        self.roles.write().remove(&role_id)
    }

    /// Seed a message so reactions can resolve it.
    pub fn insert_message(&self, message: Message) {
        self.messages.write().insert(message.id, message);
    }

    /// Make every subsequent call fail with a transport error.
    pub fn set_unavailable(&self, unavailable: bool) {
        *self.unavailable.write() = unavailable;
    }

    /// All recorded actions in order.
    pub fn actions(&self) -> Vec<OutboundAction> {
        self.actions.read().clone()
    }

    /// Contents of messages sent to `target`, in order.
    pub fn messages_to(&self, target: Target) -> Vec<String> {
        self.actions
            .read()
            .iter()
            .filter_map(|action| match action {
                OutboundAction::Message { target: t, content } if *t == target => {
                    Some(content.clone())
                }
                _ => None,
            })
            .collect()
    }

    /// Forget recorded actions.
    pub fn clear_actions(&self) {
        self.actions.write().clear();
    }

    fn check_available(&self) -> Result<()> {
        if *self.unavailable.read() {
            return Err(PlatformError::Transport("platform unavailable".into()));
        }
        Ok(())
    }

    fn record(&self, action: OutboundAction) {
        tracing::info!(action = ?action, "Outbound action");
        self.actions.write().push(action);
    }
}

#[async_trait::async_trait]
impl Platform for RecordingPlatform {
    async fn send_message(&self, target: Target, content: &str) -> Result<()> {
        self.check_available()?;
        self.record(OutboundAction::Message {
            target,
            content: content.to_string(),
        });
        Ok(())
    }

    async fn add_role(&self, member_id: Snowflake, role: &str) -> Result<()> {
        self.check_available()?;
        {
            let mut members = self.members.write();
            let member = members
                .get_mut(&member_id)
                .ok_or_else(|| PlatformError::NotFound(format!("member {}", member_id)))?;
            if !member.has_role(role) {
                member.roles.push(role.to_string());
            }
        }
        self.record(OutboundAction::AddRole {
            member_id,
            role: role.to_string(),
        });
        Ok(())
    }

    async fn remove_role(&self, member_id: Snowflake, role: &str) -> Result<()> {
        self.check_available()?;
        {
            let mut members = self.members.write();
            let member = members
                .get_mut(&member_id)
                .ok_or_else(|| PlatformError::NotFound(format!("member {}", member_id)))?;
            member.roles.retain(|r| r != role);
        }
        self.record(OutboundAction::RemoveRole {
            member_id,
            role: role.to_string(),
        });
        Ok(())
    }

    async fn fetch_member(&self, member_id: Snowflake) -> Result<Option<Member>> {
        self.check_available()?;
        Ok(self.members.read().get(&member_id).cloned())
    }

    async fn fetch_members(&self) -> Result<Vec<Member>> {
        self.check_available()?;
        let mut members: Vec<Member> = self.members.read().values().cloned().collect();
        members.sort_by_key(|m| m.id);
        Ok(members)
    }

    async fn fetch_roles(&self) -> Result<Vec<Role>> {
        self.check_available()?;
        let mut roles: Vec<Role> = self.roles.read().values().cloned().collect();
        roles.sort_by_key(|r| r.id);
        Ok(roles)
    }

    async fn fetch_message(
        &self,
        _channel_id: Snowflake,
        message_id: Snowflake,
    ) -> Result<Option<Message>> {
        self.check_available()?;
        Ok(self.messages.read().get(&message_id).cloned())
    }
}
