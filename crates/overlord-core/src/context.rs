//! State shared by the dispatcher, the command router and every extension.

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;

use futures::future::join_all;
use parking_lot::RwLock;
use tokio::sync::OwnedMutexGuard;
use tracing::info;

use crate::command::CommandRouter;
use crate::config::CoreConfig;
use crate::config_err;
use crate::error::Result;
use crate::event::DomainEvent;
use crate::extension::{run_isolated, ExtensionRegistry, ExtensionSlot};
use crate::platform::{DynPlatform, Member, Message};
use crate::report::Reporter;
use crate::storage::{DynStore, ResyncSummary};
use crate::sync::{GlobalLock, SharedSyncState, StartupGate, SyncStateMachine};

/// Handles passed by reference to every handler, task and command.
pub struct CoreContext {
    this: Weak<CoreContext>,
    platform: DynPlatform,
    store: DynStore,
    config: RwLock<Arc<CoreConfig>>,
    /// File the configuration was loaded from, if any.
    config_path: RwLock<Option<PathBuf>>,
    router: RwLock<Arc<CommandRouter>>,
    reporter: Reporter,
    registry: ExtensionRegistry,
    lock: GlobalLock,
    sync: SharedSyncState,
    gate: StartupGate,
    shut_down: AtomicBool,
}

impl CoreContext {
    pub fn new(platform: DynPlatform, store: DynStore, config: CoreConfig) -> Arc<Self> {
        let reporter = Reporter::new(
            platform.clone(),
            config.identity.maintainer,
            config.identity.error_channel,
        );
        let router = CommandRouter::builtin(&config.control.prefix);
        Arc::new_cyclic(|this| Self {
            this: this.clone(),
            platform,
            store,
            config: RwLock::new(Arc::new(config)),
            config_path: RwLock::new(None),
            router: RwLock::new(Arc::new(router)),
            reporter,
            registry: ExtensionRegistry::new(),
            lock: GlobalLock::new(),
            sync: SharedSyncState::new(SyncStateMachine::new()),
            gate: StartupGate::new(),
            shut_down: AtomicBool::new(false),
        })
    }

    pub fn platform(&self) -> &DynPlatform {
        &self.platform
    }

    pub fn store(&self) -> &DynStore {
        &self.store
    }

    /// Current configuration snapshot.
    pub fn config(&self) -> Arc<CoreConfig> {
        self.config.read().clone()
    }

    pub(crate) fn replace_config(&self, config: CoreConfig) {
        *self.config.write() = Arc::new(config);
    }

    pub fn config_path(&self) -> Option<PathBuf> {
        self.config_path.read().clone()
    }

    pub(crate) fn set_config_path(&self, path: Option<PathBuf>) {
        *self.config_path.write() = path;
    }

    /// Current command table.
    pub fn router(&self) -> Arc<CommandRouter> {
        self.router.read().clone()
    }

    pub(crate) fn replace_router(&self, router: CommandRouter) {
        *self.router.write() = Arc::new(router);
    }

    pub fn reporter(&self) -> &Reporter {
        &self.reporter
    }

    pub fn registry(&self) -> &ExtensionRegistry {
        &self.registry
    }

    pub fn lock(&self) -> &GlobalLock {
        &self.lock
    }

    pub fn sync(&self) -> &SharedSyncState {
        &self.sync
    }

    pub fn gate(&self) -> &StartupGate {
        &self.gate
    }

    pub fn is_shut_down(&self) -> bool {
        self.shut_down.load(Ordering::SeqCst)
    }

    /// Mark the engine as shut down; returns `false` if it already was.
    pub(crate) fn mark_shut_down(&self) -> bool {
        !self.shut_down.swap(true, Ordering::SeqCst)
    }

    pub fn handler_timeout(&self) -> Option<Duration> {
        match self.config().handler_timeout_secs {
            0 => None,
            secs => Some(Duration::from_secs(secs)),
        }
    }

    /// Whether `member` may issue admin commands.
    pub fn is_admin(&self, member: &Member) -> bool {
        let config = self.config();
        member.id == config.identity.maintainer
            || config.control.admins.contains(&member.id)
            || config.control.roles.iter().any(|r| member.has_role(r))
    }

    /// Messages in the control channel, or direct messages from the
    /// maintainer, are admin commands.
    pub fn is_control_message(&self, message: &Message) -> bool {
        let config = self.config();
        message.channel_id == config.control.channel
            || (message.is_direct() && message.author.id == config.identity.maintainer)
    }

    /// Start an extension and its task loops.
    pub fn start_extension(&self, slot: &Arc<ExtensionSlot>) -> bool {
        match self.this.upgrade() {
            Some(ctx) => slot.start(&ctx),
            None => false,
        }
    }

    pub fn stop_extension(&self, slot: &ExtensionSlot) -> bool {
        slot.stop()
    }

    /// Run the call plan for an already persisted event, one priority band
    /// at a time. Handlers within a band run concurrently.
    pub async fn run_plan(&self, event: &DomainEvent) {
        let kind = event.kind();
        let plan = self.registry.plan();

        for band in plan.active_bands(kind) {
            let calls = band
                .slots
                .iter()
                .filter(|slot| slot.is_enabled())
                .map(|slot| {
                    run_isolated(self, slot, kind.as_str(), slot.extension().handle_event(self, event))
                });
            join_all(calls).await;
        }
    }

    /// Every control role must exist among the stored guild roles.
    pub async fn check_control_roles(&self, config: &CoreConfig) -> Result<()> {
        info!("Checking configuration");
        for (i, role) in config.control.roles.iter().enumerate() {
            if self.store.get_role(role).await?.is_none() {
                return Err(config_err!(
                    format!("control.roles[{}]", i),
                    "No such role: '{}'",
                    role
                ));
            }
        }
        Ok(())
    }

    /// Swap in a new configuration and run the `config-updated` plan.
    ///
    /// The configuration is validated and the command table rebuilt first;
    /// on error the previous configuration stays in effect.
    pub async fn reload_config(&self, config: CoreConfig) -> Result<()> {
        config.validate()?;
        self.check_control_roles(&config).await?;
        let router =
            CommandRouter::build(&config.control.prefix, &config.commands, &self.registry)?;
        self.replace_config(config);
        self.replace_router(router);
        info!("Configuration reloaded");

        self.run_plan(&DomainEvent::ConfigUpdated).await;
        Ok(())
    }

    /// Reload the file the engine was started with.
    pub async fn reload_config_file(&self) -> Result<()> {
        let path = self.require_config_path()?;
        let config = CoreConfig::load(&path)?;
        self.reload_config(config).await
    }

    /// Write the current configuration back to its file.
    pub async fn save_config(&self) -> Result<PathBuf> {
        let path = self.require_config_path()?;
        info!(path = %path.display(), "Saving configuration on disk");
        let content = self.config().to_toml_string()?;
        tokio::fs::write(&path, content).await?;
        Ok(path)
    }

    fn require_config_path(&self) -> Result<PathBuf> {
        self.config_path()
            .ok_or_else(|| config_err!("config", "Engine was not started from a configuration file"))
    }

    /// Full resync under the global lock.
    pub async fn resync(&self) -> Result<ResyncSummary> {
        let guard = self.lock.lock().await;
        self.resync_locked(&guard).await
    }

    /// Full resync; the caller proves it holds the global lock.
    pub async fn resync_locked(&self, _guard: &OwnedMutexGuard<()>) -> Result<ResyncSummary> {
        info!("Syncing roles and users");
        let roles = self.platform.fetch_roles().await?;
        let members = self.platform.fetch_members().await?;
        let summary = self
            .store
            .resync(&roles, &members, self.config().keep_absent_users)
            .await?;
        self.sync.unset();

        info!(
            roles = summary.roles,
            present = summary.present,
            absent = summary.absent,
            removed = summary.removed,
            "Sync completed"
        );
        Ok(summary)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::platform::RecordingPlatform;
    use crate::storage::{MemoryStore, Store};

    fn config() -> CoreConfig {
        let mut config = CoreConfig::default();
        config.identity.guild = 1;
        config.identity.maintainer = 7;
        config.control.channel = 20;
        config.control.admins = vec![8];
        config
    }

    fn context(platform: Arc<RecordingPlatform>, store: Arc<MemoryStore>) -> Arc<CoreContext> {
        CoreContext::new(platform, store, config())
    }

    #[test]
    fn test_admin_checks() {
        let ctx = context(Arc::new(RecordingPlatform::new()), Arc::new(MemoryStore::new()));
        assert!(ctx.is_admin(&Member::new(7, 1, "maintainer")));
        assert!(ctx.is_admin(&Member::new(8, 1, "admin")));
        assert!(ctx.is_admin(&Member::new(9, 1, "mod").with_roles(["Overlord"])));
        assert!(!ctx.is_admin(&Member::new(10, 1, "user")));
    }

    #[test]
    fn test_control_messages() {
        let ctx = context(Arc::new(RecordingPlatform::new()), Arc::new(MemoryStore::new()));
        let message = |channel, guild, author| Message {
            id: 1,
            channel_id: channel,
            guild_id: guild,
            author: Member::new(author, 1, "x"),
            content: String::new(),
        };
        assert!(ctx.is_control_message(&message(20, Some(1), 10)));
        assert!(ctx.is_control_message(&message(99, None, 7)));
        assert!(!ctx.is_control_message(&message(99, None, 10)));
        assert!(!ctx.is_control_message(&message(21, Some(1), 7)));
    }

    #[tokio::test]
    async fn test_resync_unsets_awaiting() {
        let platform = Arc::new(RecordingPlatform::new());
        platform.insert_member(Member::new(3, 1, "carol"));
        let store = Arc::new(MemoryStore::new());
        let ctx = context(platform, store.clone());

        assert!(ctx.sync().is_awaiting());
        let summary = ctx.resync().await.unwrap();
        assert_eq!(summary.present, 1);
        assert!(!ctx.sync().is_awaiting());
        assert!(store.get_user(3).await.unwrap().is_some());
        assert!(!ctx.lock().is_locked());
    }

    #[tokio::test]
    async fn test_control_roles_must_exist() {
        let platform = Arc::new(RecordingPlatform::new());
        let ctx = context(platform.clone(), Arc::new(MemoryStore::new()));

        let err = ctx.check_control_roles(&ctx.config()).await.unwrap_err();
        match err {
            crate::error::Error::Configuration { path, message } => {
                assert_eq!(path, "control.roles[0]");
                assert_eq!(message, "No such role: 'Overlord'");
            }
            other => panic!("unexpected error {:?}", other),
        }

        platform.insert_role(crate::platform::Role {
            id: 50,
            guild_id: 1,
            name: "Overlord".into(),
        });
        ctx.resync().await.unwrap();
        ctx.check_control_roles(&ctx.config()).await.unwrap();
    }

    #[tokio::test]
    async fn test_save_requires_config_path() {
        let ctx = context(Arc::new(RecordingPlatform::new()), Arc::new(MemoryStore::new()));
        assert!(ctx.save_config().await.is_err());

        let file = tempfile::NamedTempFile::new().unwrap();
        ctx.set_config_path(Some(file.path().to_path_buf()));
        let path = ctx.save_config().await.unwrap();
        let saved = CoreConfig::load(&path).unwrap();
        assert_eq!(saved.control.admins, vec![8]);
    }

    #[test]
    fn test_handler_timeout() {
        let ctx = context(Arc::new(RecordingPlatform::new()), Arc::new(MemoryStore::new()));
        assert_eq!(ctx.handler_timeout(), Some(Duration::from_secs(60)));

        let mut config = config();
        config.handler_timeout_secs = 0;
        ctx.replace_config(config);
        assert_eq!(ctx.handler_timeout(), None);
    }
}
