//! Shared fixtures for the engine integration tests.

#![allow(dead_code)]

use std::sync::Arc;

use parking_lot::Mutex;

use overlord_core::command::CommandInvocation;
use overlord_core::platform::RecordingPlatform;
use overlord_core::prelude::*;
use overlord_core::storage::MemoryStore;

pub const GUILD: Snowflake = 1;
pub const MAINTAINER: Snowflake = 100;
pub const ADMIN: Snowflake = 101;
pub const ALICE: Snowflake = 2;
pub const BOB: Snowflake = 3;
pub const BOT: Snowflake = 4;

pub const CONTROL_CHANNEL: Snowflake = 10;
pub const ERROR_CHANNEL: Snowflake = 11;
pub const TEXT_CHANNEL: Snowflake = 20;
pub const VOICE_CHANNEL: Snowflake = 30;
pub const AFK_CHANNEL: Snowflake = 31;

/// Valid configuration pointing at the ids above.
pub fn config() -> CoreConfig {
    let mut config = CoreConfig::default();
    config.identity.guild = GUILD;
    config.identity.maintainer = MAINTAINER;
    config.identity.error_channel = Some(ERROR_CHANNEL);
    config.control.channel = CONTROL_CHANNEL;
    config.control.admins = vec![ADMIN];
    config
}

pub fn member(id: Snowflake, name: &str) -> Member {
    Member::new(id, GUILD, name)
}

/// Platform with a few members and roles already in the guild.
pub fn seeded_platform() -> Arc<RecordingPlatform> {
    let platform = Arc::new(RecordingPlatform::new());
    platform.insert_member(member(ALICE, "alice").with_roles(["Member"]));
    platform.insert_member(member(BOB, "bob"));
    platform.insert_member(member(BOT, "helper").as_bot());
    platform.insert_member(member(ADMIN, "admin").with_roles(["Overlord"]));
    platform.insert_member(member(MAINTAINER, "maintainer"));
    for (id, name) in [(50, "Overlord"), (51, "Member")] {
        platform.insert_role(Role {
            id,
            guild_id: GUILD,
            name: name.to_string(),
        });
    }
    platform
}

pub fn message(id: Snowflake, channel: Snowflake, author: Member, content: &str) -> Message {
    Message {
        id,
        channel_id: channel,
        guild_id: Some(author.guild_id),
        author,
        content: content.to_string(),
    }
}

/// Admin command typed in the control channel.
pub fn command(content: &str) -> RawEvent {
    RawEvent::MessageCreated(message(
        900,
        CONTROL_CHANNEL,
        member(ADMIN, "admin").with_roles(["Overlord"]),
        content,
    ))
}

pub fn chat(id: Snowflake, author: Snowflake, content: &str) -> RawEvent {
    RawEvent::MessageCreated(message(id, TEXT_CHANNEL, member(author, "someone"), content))
}

/// Call log shared between spies.
pub type CallLog = Arc<Mutex<Vec<String>>>;

pub fn call_log() -> CallLog {
    Arc::new(Mutex::new(Vec::new()))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Behavior {
    Succeed,
    Fail,
    Panic,
    Hang,
}

/// Extension recording every call it receives.
pub struct Spy {
    metadata: ExtensionMetadata,
    events: Vec<EventKind>,
    commands: Vec<CommandSpec>,
    behavior: Behavior,
    log: CallLog,
}

impl Spy {
    pub fn new(name: &str, priority: i32, log: &CallLog) -> Self {
        Self {
            metadata: ExtensionMetadata::new(name, format!("{} spy", name), priority),
            events: Vec::new(),
            commands: Vec::new(),
            behavior: Behavior::Succeed,
            log: log.clone(),
        }
    }

    pub fn on(mut self, kinds: &[EventKind]) -> Self {
        self.events.extend_from_slice(kinds);
        self
    }

    pub fn command(mut self, spec: CommandSpec) -> Self {
        self.commands.push(spec);
        self
    }

    pub fn behave(mut self, behavior: Behavior) -> Self {
        self.behavior = behavior;
        self
    }

    pub fn shared(self) -> DynExtension {
        Arc::new(self)
    }

    async fn act(&self) -> overlord_core::extension::Result<()> {
        match self.behavior {
            Behavior::Succeed => Ok(()),
            Behavior::Fail => Err(ExtensionError::ExecutionFailed(format!(
                "{} refused",
                self.metadata.name
            ))),
            Behavior::Panic => panic!("{} exploded", self.metadata.name),
            Behavior::Hang => {
                std::future::pending::<()>().await;
                Ok(())
            }
        }
    }
}

#[async_trait::async_trait]
impl Extension for Spy {
    fn metadata(&self) -> &ExtensionMetadata {
        &self.metadata
    }

    fn events(&self) -> &[EventKind] {
        &self.events
    }

    fn commands(&self) -> &[CommandSpec] {
        &self.commands
    }

    async fn handle_event(
        &self,
        _ctx: &CoreContext,
        event: &DomainEvent,
    ) -> overlord_core::extension::Result<()> {
        self.log
            .lock()
            .push(format!("{}:{}", self.metadata.name, event.kind()));
        self.act().await
    }

    async fn execute_command(
        &self,
        ctx: &CoreContext,
        command: &str,
        invocation: &CommandInvocation,
    ) -> overlord_core::extension::Result<()> {
        self.log.lock().push(format!(
            "{}:{}({})",
            self.metadata.name,
            command,
            invocation.args.join("|")
        ));
        invocation
            .reply(ctx, &format!("{} ran {}", self.metadata.name, command))
            .await?;
        self.act().await
    }
}

pub struct Harness {
    pub platform: Arc<RecordingPlatform>,
    pub store: Arc<MemoryStore>,
    pub dispatcher: CoreDispatcher,
}

impl Harness {
    pub fn build(config: CoreConfig, extensions: Vec<DynExtension>) -> Result<Self> {
        let platform = seeded_platform();
        let store = Arc::new(MemoryStore::new());
        let mut builder = CoreDispatcher::builder(platform.clone(), store.clone(), config);
        for extension in extensions {
            builder = builder.extension(extension);
        }
        Ok(Self {
            platform,
            store,
            dispatcher: builder.build()?,
        })
    }

    /// Build, start and forget the startup notifications.
    pub async fn started(config: CoreConfig, extensions: Vec<DynExtension>) -> Self {
        let harness = Self::build(config, extensions).expect("valid setup");
        harness.dispatcher.start().await.expect("startup");
        harness.platform.clear_actions();
        harness
    }

    pub fn ctx(&self) -> &Arc<CoreContext> {
        self.dispatcher.context()
    }

    pub fn slot(&self, name: &str) -> Arc<ExtensionSlot> {
        self.ctx().registry().resolve(name).expect("registered")
    }

    pub fn replies(&self, channel: Snowflake) -> Vec<String> {
        self.platform.messages_to(Target::Channel(channel))
    }

    pub fn to_maintainer(&self) -> Vec<String> {
        self.platform.messages_to(Target::User(MAINTAINER))
    }
}
