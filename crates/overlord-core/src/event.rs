//! Raw inbound events and the normalized domain events handed to extensions.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::platform::{Member, Message, MessageRef, Reaction, Role, Snowflake, VoiceState};
use crate::storage::{ActivityRecord, MessageRecord, RoleRecord, UserRecord};

/// Name of an event an extension can handle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum EventKind {
    MemberJoined,
    MemberUpdated,
    MemberLeft,
    MessageCreated,
    MessageEdited,
    MessageDeleted,
    ReactionAdded,
    ReactionRemoved,
    /// Reaction added to a control message; nothing is persisted.
    ControlReactionAdded,
    VoiceStateChanged,
    RoleCreated,
    RoleUpdated,
    RoleDeleted,
    /// Fired once after startup completes.
    Ready,
    /// Fired after the configuration was reloaded.
    ConfigUpdated,
}

impl EventKind {
    pub const ALL: [EventKind; 15] = [
        Self::MemberJoined,
        Self::MemberUpdated,
        Self::MemberLeft,
        Self::MessageCreated,
        Self::MessageEdited,
        Self::MessageDeleted,
        Self::ReactionAdded,
        Self::ReactionRemoved,
        Self::ControlReactionAdded,
        Self::VoiceStateChanged,
        Self::RoleCreated,
        Self::RoleUpdated,
        Self::RoleDeleted,
        Self::Ready,
        Self::ConfigUpdated,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::MemberJoined => "member-joined",
            Self::MemberUpdated => "member-updated",
            Self::MemberLeft => "member-left",
            Self::MessageCreated => "message-created",
            Self::MessageEdited => "message-edited",
            Self::MessageDeleted => "message-deleted",
            Self::ReactionAdded => "reaction-added",
            Self::ReactionRemoved => "reaction-removed",
            Self::ControlReactionAdded => "control-reaction-added",
            Self::VoiceStateChanged => "voice-state-changed",
            Self::RoleCreated => "role-created",
            Self::RoleUpdated => "role-updated",
            Self::RoleDeleted => "role-deleted",
            Self::Ready => "ready",
            Self::ConfigUpdated => "config-updated",
        }
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for EventKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .iter()
            .copied()
            .find(|k| k.as_str() == s)
            .ok_or_else(|| format!("unknown event kind: {}", s))
    }
}

/// Event as delivered by the platform client.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "kebab-case")]
pub enum RawEvent {
    MemberJoined(Member),
    MemberUpdated {
        before: Member,
        after: Member,
    },
    MemberLeft(Member),
    MessageCreated(Message),
    MessageEdited(MessageRef),
    MessageDeleted(MessageRef),
    ReactionAdded(Reaction),
    ReactionRemoved(Reaction),
    VoiceStateChanged {
        member: Member,
        #[serde(default)]
        before: VoiceState,
        #[serde(default)]
        after: VoiceState,
    },
    RoleCreated(Role),
    RoleUpdated {
        before: Role,
        after: Role,
    },
    RoleDeleted(Role),
}

impl RawEvent {
    pub fn kind(&self) -> EventKind {
        match self {
            Self::MemberJoined(_) => EventKind::MemberJoined,
            Self::MemberUpdated { .. } => EventKind::MemberUpdated,
            Self::MemberLeft(_) => EventKind::MemberLeft,
            Self::MessageCreated(_) => EventKind::MessageCreated,
            Self::MessageEdited(_) => EventKind::MessageEdited,
            Self::MessageDeleted(_) => EventKind::MessageDeleted,
            Self::ReactionAdded(_) => EventKind::ReactionAdded,
            Self::ReactionRemoved(_) => EventKind::ReactionRemoved,
            Self::VoiceStateChanged { .. } => EventKind::VoiceStateChanged,
            Self::RoleCreated(_) => EventKind::RoleCreated,
            Self::RoleUpdated { .. } => EventKind::RoleUpdated,
            Self::RoleDeleted(_) => EventKind::RoleDeleted,
        }
    }

    /// Member the event was caused by, when the payload carries one.
    pub fn actor(&self) -> Option<&Member> {
        match self {
            Self::MemberJoined(m) | Self::MemberLeft(m) => Some(m),
            Self::MemberUpdated { after, .. } => Some(after),
            Self::MessageCreated(msg) => Some(&msg.author),
            Self::VoiceStateChanged { member, .. } => Some(member),
            _ => None,
        }
    }

    /// Guild the event belongs to; `None` for direct messages and for
    /// payloads that only carry ids.
    pub fn guild_id(&self) -> Option<Snowflake> {
        match self {
            Self::MessageCreated(msg) => msg.guild_id,
            Self::RoleCreated(r) | Self::RoleDeleted(r) => Some(r.guild_id),
            Self::RoleUpdated { after, .. } => Some(after.guild_id),
            _ => self.actor().map(|m| m.guild_id),
        }
    }

    /// Channel the event happened in, when known.
    pub fn channel_id(&self) -> Option<Snowflake> {
        match self {
            Self::MessageCreated(msg) => Some(msg.channel_id),
            Self::MessageEdited(r) | Self::MessageDeleted(r) => Some(r.channel_id),
            Self::ReactionAdded(r) | Self::ReactionRemoved(r) => Some(r.channel_id),
            _ => None,
        }
    }
}

/// Normalized, already persisted event.
///
/// Every variant carries the raw payload together with the record the store
/// produced for it, so handlers never need to re-query what was just written.
#[derive(Debug, Clone)]
pub enum DomainEvent {
    MemberJoined {
        member: Member,
        user: UserRecord,
        record: ActivityRecord,
    },
    MemberUpdated {
        before: Member,
        after: Member,
        user: UserRecord,
    },
    MemberLeft {
        member: Member,
        user: UserRecord,
        /// `None` when the user was removed instead of kept as absent.
        record: Option<ActivityRecord>,
    },
    MessageCreated {
        message: Message,
        user: UserRecord,
        record: MessageRecord,
    },
    MessageEdited {
        reference: MessageRef,
        message: MessageRecord,
        record: ActivityRecord,
    },
    MessageDeleted {
        reference: MessageRef,
        message: MessageRecord,
        record: ActivityRecord,
    },
    ReactionAdded {
        reaction: Reaction,
        user: UserRecord,
        message: MessageRecord,
        record: ActivityRecord,
    },
    ReactionRemoved {
        reaction: Reaction,
        user: UserRecord,
        message: MessageRecord,
        record: ActivityRecord,
    },
    ControlReactionAdded {
        member: Member,
        message: Message,
        emoji: String,
    },
    VoiceStateChanged {
        member: Member,
        before: VoiceState,
        after: VoiceState,
        user: UserRecord,
        /// Join and leave records of the session that just closed.
        closed: Option<(ActivityRecord, ActivityRecord)>,
        /// Join record of the session that just opened.
        opened: Option<ActivityRecord>,
    },
    RoleCreated {
        role: Role,
        record: Option<RoleRecord>,
    },
    RoleUpdated {
        before: Role,
        after: Role,
        /// Stored role under the previous name.
        record: Option<RoleRecord>,
    },
    RoleDeleted {
        role: Role,
        record: Option<RoleRecord>,
    },
    Ready,
    ConfigUpdated,
}

impl DomainEvent {
    pub fn kind(&self) -> EventKind {
        match self {
            Self::MemberJoined { .. } => EventKind::MemberJoined,
            Self::MemberUpdated { .. } => EventKind::MemberUpdated,
            Self::MemberLeft { .. } => EventKind::MemberLeft,
            Self::MessageCreated { .. } => EventKind::MessageCreated,
            Self::MessageEdited { .. } => EventKind::MessageEdited,
            Self::MessageDeleted { .. } => EventKind::MessageDeleted,
            Self::ReactionAdded { .. } => EventKind::ReactionAdded,
            Self::ReactionRemoved { .. } => EventKind::ReactionRemoved,
            Self::ControlReactionAdded { .. } => EventKind::ControlReactionAdded,
            Self::VoiceStateChanged { .. } => EventKind::VoiceStateChanged,
            Self::RoleCreated { .. } => EventKind::RoleCreated,
            Self::RoleUpdated { .. } => EventKind::RoleUpdated,
            Self::RoleDeleted { .. } => EventKind::RoleDeleted,
            Self::Ready => EventKind::Ready,
            Self::ConfigUpdated => EventKind::ConfigUpdated,
        }
    }

    /// Stored user the event concerns, if any.
    pub fn user(&self) -> Option<&UserRecord> {
        match self {
            Self::MemberJoined { user, .. }
            | Self::MemberUpdated { user, .. }
            | Self::MemberLeft { user, .. }
            | Self::MessageCreated { user, .. }
            | Self::ReactionAdded { user, .. }
            | Self::ReactionRemoved { user, .. }
            | Self::VoiceStateChanged { user, .. } => Some(user),
            _ => None,
        }
    }
}
