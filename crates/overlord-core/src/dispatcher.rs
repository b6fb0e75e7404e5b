//! Core event dispatcher.
//!
//! For every raw event the dispatcher:
//! 1. waits for the startup gate,
//! 2. evaluates the guard chain,
//! 3. persists the event through the store and builds the domain event,
//! 4. runs the event's call plan one priority band at a time.
//!
//! Failures in step 3 are core errors: they are reported and the engine
//! shuts down. Failures in step 4 are contained per extension.

use std::path::PathBuf;
use std::sync::Arc;

use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

use crate::command::CommandRouter;
use crate::config::CoreConfig;
use crate::context::CoreContext;
use crate::error::{Error, Result};
use crate::event::{DomainEvent, EventKind, RawEvent};
use crate::extension::DynExtension;
use crate::guard::GuardChain;
use crate::platform::{DynPlatform, Member, Message, MessageRef, Reaction, Target, VoiceState};
use crate::report::CORE_TRACE_FRAMES;
use crate::storage::{DynStore, RoleRecord};

/// Message sent to the maintainer once startup completed.
pub const STARTED_MESSAGE: &str = "Started!";

/// Builder for [`CoreDispatcher`].
pub struct CoreDispatcherBuilder {
    platform: DynPlatform,
    store: DynStore,
    config: CoreConfig,
    extensions: Vec<DynExtension>,
    guards: Option<GuardChain>,
    config_path: Option<PathBuf>,
}

impl CoreDispatcherBuilder {
    pub fn extension(mut self, extension: DynExtension) -> Self {
        self.extensions.push(extension);
        self
    }

    /// File the configuration was loaded from; enables reloading and
    /// saving it at runtime.
    pub fn config_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.config_path = Some(path.into());
        self
    }

    /// Replace the standard guard chain.
    pub fn guards(mut self, guards: GuardChain) -> Self {
        self.guards = Some(guards);
        self
    }

    /// Register every extension and build the command table.
    ///
    /// Any configuration error is returned before the engine can serve
    /// events.
    pub fn build(self) -> Result<CoreDispatcher> {
        self.config.validate()?;

        let guards = self.guards.unwrap_or_else(|| {
            GuardChain::standard(self.config.identity.guild, self.config.special_channels())
        });
        let ctx = CoreContext::new(self.platform, self.store, self.config);
        ctx.set_config_path(self.config_path);
        let config = ctx.config();

        for extension in self.extensions {
            let name = extension.metadata().name.clone();
            let priority = config
                .extension(&name)
                .priority
                .unwrap_or(extension.metadata().priority);
            ctx.registry().register_with_priority(extension, priority)?;
        }

        let router = CommandRouter::build(&config.control.prefix, &config.commands, ctx.registry())?;
        ctx.replace_router(router);

        Ok(CoreDispatcher { ctx, guards })
    }
}

/// Receives raw events, persists them and runs call plans.
pub struct CoreDispatcher {
    ctx: Arc<CoreContext>,
    guards: GuardChain,
}

impl CoreDispatcher {
    pub fn builder(platform: DynPlatform, store: DynStore, config: CoreConfig) -> CoreDispatcherBuilder {
        CoreDispatcherBuilder {
            platform,
            store,
            config,
            extensions: Vec::new(),
            guards: None,
            config_path: None,
        }
    }

    pub fn context(&self) -> &Arc<CoreContext> {
        &self.ctx
    }

    pub fn router(&self) -> Arc<CommandRouter> {
        self.ctx.router()
    }

    pub fn is_shut_down(&self) -> bool {
        self.ctx.is_shut_down()
    }

    /// Initial resync, check the control roles, start enabled extensions,
    /// open the startup gate and run the `ready` plan.
    pub async fn start(&self) -> Result<()> {
        if self.ctx.is_shut_down() {
            return Err(Error::ShutDown);
        }

        {
            let guard = self.ctx.lock().lock().await;
            if let Err(e) = self.ctx.resync_locked(&guard).await {
                drop(guard);
                return Err(self.fail(EventKind::Ready, e).await);
            }
            if let Err(e) = self.ctx.check_control_roles(&self.ctx.config()).await {
                drop(guard);
                error!(error = %e, "Invalid configuration, shutting down");
                self.shutdown().await;
                return Err(e);
            }

            let config = self.ctx.config();
            for slot in self.ctx.registry().slots() {
                if config.extension(slot.name()).enabled {
                    self.ctx.start_extension(&slot);
                } else {
                    info!(extension = %slot.name(), "Extension disabled by config");
                }
            }
            self.ctx.gate().fire();
        }

        // The lock is not reentrant; ready handlers may take it themselves.
        self.run_plan(&DomainEvent::Ready).await;

        let maintainer = Target::User(self.ctx.config().identity.maintainer);
        if let Err(e) = self.ctx.platform().send_message(maintainer, STARTED_MESSAGE).await {
            warn!(error = %e, "Failed to notify maintainer");
        }
        info!(extensions = self.ctx.registry().len(), "Engine started");
        Ok(())
    }

    /// Stop every extension and refuse further dispatch.
    pub async fn shutdown(&self) {
        if !self.ctx.mark_shut_down() {
            return;
        }
        for slot in self.ctx.registry().slots() {
            slot.stop();
        }
        // Release dispatchers still waiting for startup.
        self.ctx.gate().fire();
        info!("Engine shut down");
    }

    /// Consume events until the channel closes or a fatal error occurs.
    pub async fn run(&self, mut events: mpsc::Receiver<RawEvent>) -> Result<()> {
        while let Some(event) = events.recv().await {
            self.dispatch(event).await?;
        }
        Ok(())
    }

    /// Full resync under the global lock.
    pub async fn resync(&self) -> Result<()> {
        self.ctx.resync().await.map(|_| ())
    }

    /// Swap in a new configuration and run the `config-updated` plan.
    ///
    /// On error the previous configuration stays in effect.
    pub async fn reload_config(&self, config: CoreConfig) -> Result<()> {
        self.ctx.reload_config(config).await
    }

    /// Handle one raw event.
    pub async fn dispatch(&self, event: RawEvent) -> Result<()> {
        if self.ctx.is_shut_down() {
            return Err(Error::ShutDown);
        }
        self.ctx.gate().wait().await;
        if self.ctx.is_shut_down() {
            return Err(Error::ShutDown);
        }

        let kind = event.kind();
        if let Some(guard) = self.guards.rejected_by(&event) {
            debug!(event = %kind, guard, "Event rejected by guard");
            return Ok(());
        }

        let domain = match self.normalize(event).await {
            Ok(Some(domain)) => domain,
            Ok(None) => return Ok(()),
            Err(e) => return Err(self.fail(kind, e).await),
        };
        self.run_plan(&domain).await;
        Ok(())
    }

    /// Run the call plan for an already persisted event.
    pub async fn run_plan(&self, event: &DomainEvent) {
        self.ctx.run_plan(event).await
    }

    /// Report a core failure, then shut down.
    async fn fail(&self, kind: EventKind, source: Error) -> Error {
        let err = Error::core(kind.as_str(), source);
        error!(event = %kind, error = %err, "Core failure, shutting down");
        self.ctx
            .reporter()
            .report_failure("Core", kind.as_str(), &err, CORE_TRACE_FRAMES, true)
            .await;
        self.shutdown().await;
        err
    }

    // ------------------------------------------------------------------
    // Persistence step
    // ------------------------------------------------------------------

    async fn normalize(&self, event: RawEvent) -> Result<Option<DomainEvent>> {
        match event {
            RawEvent::MemberJoined(member) => self.member_joined(member).await,
            RawEvent::MemberUpdated { before, after } => self.member_updated(before, after).await,
            RawEvent::MemberLeft(member) => self.member_left(member).await,
            RawEvent::MessageCreated(message) => self.message_created(message).await,
            RawEvent::MessageEdited(reference) => self.message_changed(reference, false).await,
            RawEvent::MessageDeleted(reference) => self.message_changed(reference, true).await,
            RawEvent::ReactionAdded(reaction) => self.reaction(reaction, true).await,
            RawEvent::ReactionRemoved(reaction) => self.reaction(reaction, false).await,
            RawEvent::VoiceStateChanged {
                member,
                before,
                after,
            } => self.voice_state_changed(member, before, after).await,
            RawEvent::RoleCreated(role) => {
                let name = role.name.clone();
                self.role_changed("New role detected", &name, |record| {
                    DomainEvent::RoleCreated { role, record }
                })
                .await
            }
            RawEvent::RoleUpdated { before, after } => {
                let name = before.name.clone();
                self.role_changed("Role change detected", &name, |record| {
                    DomainEvent::RoleUpdated {
                        before,
                        after,
                        record,
                    }
                })
                .await
            }
            RawEvent::RoleDeleted(role) => {
                let name = role.name.clone();
                self.role_changed("Role remove detected", &name, |record| {
                    DomainEvent::RoleDeleted { role, record }
                })
                .await
            }
        }
    }

    async fn member_joined(&self, member: Member) -> Result<Option<DomainEvent>> {
        if self.ctx.sync().is_awaiting() {
            debug!(member = %member.qualified_name(), "Awaiting sync, skipping member join");
            return Ok(None);
        }
        let store = self.ctx.store();
        let user = store.upsert_member(&member).await?;
        let record = store.record_member_join(&user).await?;
        Ok(Some(DomainEvent::MemberJoined {
            member,
            user,
            record,
        }))
    }

    async fn member_updated(&self, before: Member, after: Member) -> Result<Option<DomainEvent>> {
        if self.ctx.sync().is_awaiting() {
            debug!(member = %after.qualified_name(), "Awaiting sync, skipping member update");
            return Ok(None);
        }
        if before.roles == after.roles
            && before.display_name == after.display_name
            && before.name == after.name
        {
            return Ok(None);
        }
        let store = self.ctx.store();
        if store.get_user(before.id).await?.is_none() {
            warn!(member = %after.qualified_name(), "User does not exist in store, skipping member update");
            return Ok(None);
        }
        let user = store.upsert_member(&after).await?;
        Ok(Some(DomainEvent::MemberUpdated {
            before,
            after,
            user,
        }))
    }

    async fn member_left(&self, member: Member) -> Result<Option<DomainEvent>> {
        let store = self.ctx.store();
        let (user, record) = if self.ctx.config().keep_absent_users {
            match store.mark_absent(member.id).await? {
                Some(user) => {
                    let record = store.record_member_leave(&user).await?;
                    (Some(user), Some(record))
                }
                None => (None, None),
            }
        } else {
            (store.remove_user(member.id).await?, None)
        };

        let Some(user) = user else {
            warn!(member = %member.qualified_name(), "User does not exist in store, skipping member leave");
            return Ok(None);
        };
        Ok(Some(DomainEvent::MemberLeft {
            member,
            user,
            record,
        }))
    }

    async fn message_created(&self, message: Message) -> Result<Option<DomainEvent>> {
        if self.ctx.is_control_message(&message) {
            let router = self.router();
            let outcome = router.dispatch(&self.ctx, &message).await;
            debug!(outcome = ?outcome, "Control message handled");
            return Ok(None);
        }
        if message.is_direct() {
            return Ok(None);
        }

        let store = self.ctx.store();
        let Some(user) = store.get_user(message.author.id).await? else {
            warn!(member = %message.author.qualified_name(), "User does not exist in store, skipping new message");
            return Ok(None);
        };
        let record = store.record_message(&user, &message).await?;
        Ok(Some(DomainEvent::MessageCreated {
            message,
            user,
            record,
        }))
    }

    async fn message_changed(&self, reference: MessageRef, deleted: bool) -> Result<Option<DomainEvent>> {
        let store = self.ctx.store();
        let Some(message) = store.get_message(reference.message_id).await? else {
            return Ok(None);
        };
        if deleted {
            let record = store.record_message_delete(&message).await?;
            Ok(Some(DomainEvent::MessageDeleted {
                reference,
                message,
                record,
            }))
        } else {
            let record = store.record_message_edit(&message).await?;
            Ok(Some(DomainEvent::MessageEdited {
                reference,
                message,
                record,
            }))
        }
    }

    async fn reaction(&self, reaction: Reaction, added: bool) -> Result<Option<DomainEvent>> {
        let platform = self.ctx.platform();
        let Some(member) = platform.fetch_member(reaction.user_id).await? else {
            return Ok(None);
        };
        if member.bot {
            return Ok(None);
        }
        let Some(message) = platform
            .fetch_message(reaction.channel_id, reaction.message_id)
            .await?
        else {
            return Ok(None);
        };

        let config = self.ctx.config();
        let control = message.channel_id == config.control.channel
            || (message.is_direct() && member.id == config.identity.maintainer);
        if control {
            if !added {
                return Ok(None);
            }
            return Ok(Some(DomainEvent::ControlReactionAdded {
                member,
                message,
                emoji: reaction.emoji,
            }));
        }
        if message.is_direct() {
            return Ok(None);
        }

        let store = self.ctx.store();
        let Some(stored) = store.get_message(message.id).await? else {
            return Ok(None);
        };
        let Some(user) = store.get_user(member.id).await? else {
            warn!(member = %member.qualified_name(), "User does not exist in store, skipping reaction");
            return Ok(None);
        };
        let record = store.record_reaction(&user, &stored, added).await?;

        Ok(Some(if added {
            DomainEvent::ReactionAdded {
                reaction,
                user,
                message: stored,
                record,
            }
        } else {
            DomainEvent::ReactionRemoved {
                reaction,
                user,
                message: stored,
                record,
            }
        }))
    }

    async fn voice_state_changed(
        &self,
        member: Member,
        before: VoiceState,
        after: VoiceState,
    ) -> Result<Option<DomainEvent>> {
        if before.channel_id == after.channel_id {
            return Ok(None);
        }
        let ignore_afk = self.ctx.config().ignore_afk_vc;
        let tracked = |state: &VoiceState| state.channel_id.filter(|_| !(ignore_afk && state.afk));

        let store = self.ctx.store();
        let Some(user) = store.get_user(member.id).await? else {
            warn!(member = %member.qualified_name(), "User does not exist in store, skipping voice state change");
            return Ok(None);
        };

        let closed = match tracked(&before) {
            Some(channel) => store.close_voice_session(&user, channel).await?,
            None => None,
        };
        let opened = match tracked(&after) {
            Some(channel) => Some(store.open_voice_session(&user, channel).await?),
            None => None,
        };
        if closed.is_none() && opened.is_none() {
            return Ok(None);
        }

        Ok(Some(DomainEvent::VoiceStateChanged {
            member,
            before,
            after,
            user,
            closed,
            opened,
        }))
    }

    async fn role_changed<F>(&self, notice: &str, stored_name: &str, build: F) -> Result<Option<DomainEvent>>
    where
        F: FnOnce(Option<RoleRecord>) -> DomainEvent,
    {
        // A resync in flight would otherwise clear the flag after this change.
        let first = {
            let _guard = self.ctx.lock().lock().await;
            self.ctx.sync().set_awaiting()
        };
        if !first {
            debug!(role = %stored_name, "Already awaiting sync, role change absorbed");
            return Ok(None);
        }
        self.ctx
            .reporter()
            .send_warning("Core", &format!("{}. Awaiting role synchronization.", notice))
            .await;
        let record = self.ctx.store().get_role(stored_name).await?;
        Ok(Some(build(record)))
    }
}
