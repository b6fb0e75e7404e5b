//! In-memory [`Store`] implementation.

use std::collections::HashMap;

use chrono::Utc;
use parking_lot::Mutex;

use super::{
    ActivityKind, ActivityRecord, MessageRecord, ResyncSummary, Result, RoleRecord,
    StorageError, Store, UserRecord,
};
use crate::platform::{Member, Message, Role, Snowflake};

#[derive(Default)]
struct Inner {
    users: HashMap<Snowflake, UserRecord>,
    messages: HashMap<Snowflake, MessageRecord>,
    roles: HashMap<String, RoleRecord>,
    activity: Vec<ActivityRecord>,
    // (member, channel) -> index of the open voice join in `activity`
    open_voice: HashMap<(Snowflake, Snowflake), usize>,
    next_id: u64,
    failing: bool,
}

impl Inner {
    fn check(&self) -> Result<()> {
        if self.failing {
            return Err(StorageError::Backend("store is failing".into()));
        }
        Ok(())
    }

    fn push(
        &mut self,
        kind: ActivityKind,
        member_id: Option<Snowflake>,
        channel_id: Option<Snowflake>,
        message_id: Option<Snowflake>,
    ) -> (usize, ActivityRecord) {
        self.next_id += 1;
        let record = ActivityRecord {
            id: self.next_id,
            kind,
            member_id,
            channel_id,
            message_id,
            at: Utc::now(),
        };
        self.activity.push(record.clone());
        (self.activity.len() - 1, record)
    }
}

/// Store keeping everything in process memory.
#[derive(Default)]
pub struct MemoryStore {
    inner: Mutex<Inner>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every subsequent operation fail with a backend error.
    pub fn set_failing(&self, failing: bool) {
        self.inner.lock().failing = failing;
    }

    pub fn user_count(&self) -> usize {
        self.inner.lock().users.len()
    }

    pub fn message_count(&self) -> usize {
        self.inner.lock().messages.len()
    }

    /// Recorded activity of one kind, oldest first.
    pub fn activity(&self, kind: ActivityKind) -> Vec<ActivityRecord> {
        self.inner
            .lock()
            .activity
            .iter()
            .filter(|r| r.kind == kind)
            .cloned()
            .collect()
    }
}

fn user_from_member(member: &Member, created_at: chrono::DateTime<Utc>) -> UserRecord {
    UserRecord {
        member_id: member.id,
        name: member.name.clone(),
        display_name: member.display_name.clone(),
        roles: member.roles.clone(),
        absent: false,
        created_at,
    }
}

#[async_trait::async_trait]
impl Store for MemoryStore {
    async fn get_user(&self, member_id: Snowflake) -> Result<Option<UserRecord>> {
        let inner = self.inner.lock();
        inner.check()?;
        Ok(inner.users.get(&member_id).cloned())
    }

    async fn upsert_member(&self, member: &Member) -> Result<UserRecord> {
        let mut inner = self.inner.lock();
        inner.check()?;
        let created_at = inner
            .users
            .get(&member.id)
            .map(|u| u.created_at)
            .unwrap_or_else(Utc::now);
        let user = user_from_member(member, created_at);
        inner.users.insert(member.id, user.clone());
        Ok(user)
    }

    async fn mark_absent(&self, member_id: Snowflake) -> Result<Option<UserRecord>> {
        let mut inner = self.inner.lock();
        inner.check()?;
        Ok(inner.users.get_mut(&member_id).map(|user| {
            user.absent = true;
            user.clone()
        }))
    }

    async fn remove_user(&self, member_id: Snowflake) -> Result<Option<UserRecord>> {
        let mut inner = self.inner.lock();
        inner.check()?;
        Ok(inner.users.remove(&member_id))
    }

    async fn record_member_join(&self, user: &UserRecord) -> Result<ActivityRecord> {
        let mut inner = self.inner.lock();
        inner.check()?;
        Ok(inner
            .push(ActivityKind::MemberJoin, Some(user.member_id), None, None)
            .1)
    }

    async fn record_member_leave(&self, user: &UserRecord) -> Result<ActivityRecord> {
        let mut inner = self.inner.lock();
        inner.check()?;
        Ok(inner
            .push(ActivityKind::MemberLeave, Some(user.member_id), None, None)
            .1)
    }

    async fn record_message(&self, user: &UserRecord, message: &Message) -> Result<MessageRecord> {
        let mut inner = self.inner.lock();
        inner.check()?;
        if inner.messages.contains_key(&message.id) {
            return Err(StorageError::Constraint(format!(
                "duplicate message {}",
                message.id
            )));
        }
        let record = MessageRecord {
            message_id: message.id,
            channel_id: message.channel_id,
            member_id: user.member_id,
            created_at: Utc::now(),
        };
        inner.messages.insert(message.id, record.clone());
        Ok(record)
    }

    async fn get_message(&self, message_id: Snowflake) -> Result<Option<MessageRecord>> {
        let inner = self.inner.lock();
        inner.check()?;
        Ok(inner.messages.get(&message_id).cloned())
    }

    async fn record_message_edit(&self, message: &MessageRecord) -> Result<ActivityRecord> {
        let mut inner = self.inner.lock();
        inner.check()?;
        Ok(inner
            .push(
                ActivityKind::MessageEdit,
                Some(message.member_id),
                Some(message.channel_id),
                Some(message.message_id),
            )
            .1)
    }

    async fn record_message_delete(&self, message: &MessageRecord) -> Result<ActivityRecord> {
        let mut inner = self.inner.lock();
        inner.check()?;
        inner.messages.remove(&message.message_id);
        Ok(inner
            .push(
                ActivityKind::MessageDelete,
                Some(message.member_id),
                Some(message.channel_id),
                Some(message.message_id),
            )
            .1)
    }

    async fn record_reaction(
        &self,
        user: &UserRecord,
        message: &MessageRecord,
        added: bool,
    ) -> Result<ActivityRecord> {
        let mut inner = self.inner.lock();
        inner.check()?;
        let kind = if added {
            ActivityKind::ReactionAdd
        } else {
            ActivityKind::ReactionRemove
        };
        Ok(inner
            .push(
                kind,
                Some(user.member_id),
                Some(message.channel_id),
                Some(message.message_id),
            )
            .1)
    }

    async fn open_voice_session(
        &self,
        user: &UserRecord,
        channel_id: Snowflake,
    ) -> Result<ActivityRecord> {
        let mut inner = self.inner.lock();
        inner.check()?;
        let key = (user.member_id, channel_id);
        if inner.open_voice.remove(&key).is_some() {
            inner.push(
                ActivityKind::VoiceLeave,
                Some(user.member_id),
                Some(channel_id),
                None,
            );
        }
        let (index, record) = inner.push(
            ActivityKind::VoiceJoin,
            Some(user.member_id),
            Some(channel_id),
            None,
        );
        inner.open_voice.insert(key, index);
        Ok(record)
    }

    async fn close_voice_session(
        &self,
        user: &UserRecord,
        channel_id: Snowflake,
    ) -> Result<Option<(ActivityRecord, ActivityRecord)>> {
        let mut inner = self.inner.lock();
        inner.check()?;
        let Some(index) = inner.open_voice.remove(&(user.member_id, channel_id)) else {
            return Ok(None);
        };
        let join = inner.activity[index].clone();
        let (_, leave) = inner.push(
            ActivityKind::VoiceLeave,
            Some(user.member_id),
            Some(channel_id),
            None,
        );
        Ok(Some((join, leave)))
    }

    async fn get_role(&self, name: &str) -> Result<Option<RoleRecord>> {
        let inner = self.inner.lock();
        inner.check()?;
        Ok(inner.roles.get(name).cloned())
    }

    async fn resync(
        &self,
        roles: &[Role],
        members: &[Member],
        keep_absent: bool,
    ) -> Result<ResyncSummary> {
        let mut inner = self.inner.lock();
        inner.check()?;

        inner.roles = roles
            .iter()
            .map(|r| {
                (
                    r.name.clone(),
                    RoleRecord {
                        role_id: r.id,
                        name: r.name.clone(),
                    },
                )
            })
            .collect();

        for user in inner.users.values_mut() {
            user.absent = true;
        }

        let mut summary = ResyncSummary {
            roles: roles.len(),
            ..Default::default()
        };
        for member in members.iter().filter(|m| !m.bot) {
            let created_at = inner
                .users
                .get(&member.id)
                .map(|u| u.created_at)
                .unwrap_or_else(Utc::now);
            inner
                .users
                .insert(member.id, user_from_member(member, created_at));
            summary.present += 1;
        }

        if keep_absent {
            summary.absent = inner.users.values().filter(|u| u.absent).count();
        } else {
            let before = inner.users.len();
            inner.users.retain(|_, u| !u.absent);
            summary.removed = before - inner.users.len();
        }

        Ok(summary)
    }
}
