//! Ordered guard predicates evaluated on raw events before normalization.
//!
//! A rejected event is dropped: nothing is persisted and no call plan runs.

use crate::event::{EventKind, RawEvent};
use crate::platform::Snowflake;

/// A single predicate on raw events.
pub trait EventGuard: Send + Sync {
    /// Name used in debug logs.
    fn name(&self) -> &'static str;

    /// Whether the event may proceed.
    fn allows(&self, event: &RawEvent) -> bool;
}

/// Drops events caused by bot accounts.
pub struct SkipBots;

impl EventGuard for SkipBots {
    fn name(&self) -> &'static str {
        "skip-bots"
    }

    fn allows(&self, event: &RawEvent) -> bool {
        !event.actor().map(|m| m.bot).unwrap_or(false)
    }
}

/// Drops events from other guilds. Events that carry no guild pass.
pub struct GuildOnly {
    pub guild: Snowflake,
}

impl EventGuard for GuildOnly {
    fn name(&self) -> &'static str {
        "guild-only"
    }

    fn allows(&self, event: &RawEvent) -> bool {
        event.guild_id().map_or(true, |g| g == self.guild)
    }
}

/// Drops message edits and deletions in the control and error channels.
pub struct SkipSpecialChannels {
    pub channels: Vec<Snowflake>,
}

impl EventGuard for SkipSpecialChannels {
    fn name(&self) -> &'static str {
        "skip-special-channels"
    }

    fn allows(&self, event: &RawEvent) -> bool {
        if !matches!(
            event.kind(),
            EventKind::MessageEdited | EventKind::MessageDeleted
        ) {
            return true;
        }
        event
            .channel_id()
            .map_or(true, |c| !self.channels.contains(&c))
    }
}

/// Guards evaluated in insertion order.
#[derive(Default)]
pub struct GuardChain {
    guards: Vec<Box<dyn EventGuard>>,
}

impl GuardChain {
    pub fn new() -> Self {
        Self::default()
    }

    /// Standard chain: bots, then guild, then special channels.
    pub fn standard(guild: Snowflake, special_channels: Vec<Snowflake>) -> Self {
        Self::new()
            .with(SkipBots)
            .with(GuildOnly { guild })
            .with(SkipSpecialChannels {
                channels: special_channels,
            })
    }

    pub fn with(mut self, guard: impl EventGuard + 'static) -> Self {
        self.guards.push(Box::new(guard));
        self
    }

    /// Name of the first guard rejecting `event`, or `None` if all allow it.
    pub fn rejected_by(&self, event: &RawEvent) -> Option<&'static str> {
        self.guards
            .iter()
            .find(|g| !g.allows(event))
            .map(|g| g.name())
    }

    pub fn names(&self) -> Vec<&'static str> {
        self.guards.iter().map(|g| g.name()).collect()
    }
}
