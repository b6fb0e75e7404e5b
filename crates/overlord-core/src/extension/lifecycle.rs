//! Registered extension and its Disabled/Enabled lifecycle.

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};
use tokio::sync::watch;
use tracing::{debug, info};

use super::{run_isolated, CommandSpec, DynExtension, ExtensionError, TaskSpec};
use crate::context::CoreContext;
use crate::event::EventKind;

const MIN_TASK_INTERVAL: Duration = Duration::from_millis(1);

/// Lifecycle state of a registered extension.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExtensionState {
    Disabled,
    Enabled,
}

impl std::fmt::Display for ExtensionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Disabled => write!(f, "disabled"),
            Self::Enabled => write!(f, "enabled"),
        }
    }
}

/// An extension owned by the registry, with its effective priority and
/// lifecycle state.
pub struct ExtensionSlot {
    extension: DynExtension,
    name: String,
    priority: i32,
    state: RwLock<ExtensionState>,
    /// Stops the task loops of the current enabled period.
    stop_tx: Mutex<Option<watch::Sender<bool>>>,
    failures: AtomicU32,
    last_error: RwLock<Option<String>>,
}

impl ExtensionSlot {
    pub(crate) fn new(extension: DynExtension, priority: i32) -> Self {
        let name = extension.metadata().name.clone();
        Self {
            extension,
            name,
            priority,
            state: RwLock::new(ExtensionState::Disabled),
            stop_tx: Mutex::new(None),
            failures: AtomicU32::new(0),
            last_error: RwLock::new(None),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn priority(&self) -> i32 {
        self.priority
    }

    pub fn extension(&self) -> &DynExtension {
        &self.extension
    }

    pub fn state(&self) -> ExtensionState {
        *self.state.read()
    }

    pub fn is_enabled(&self) -> bool {
        self.state() == ExtensionState::Enabled
    }

    /// Number of failures caught at the isolation boundary.
    pub fn failures(&self) -> u32 {
        self.failures.load(Ordering::Relaxed)
    }

    pub fn last_error(&self) -> Option<String> {
        self.last_error.read().clone()
    }

    pub fn handles(&self, kind: EventKind) -> bool {
        self.extension.events().contains(&kind)
    }

    pub fn command(&self, name: &str) -> Option<&CommandSpec> {
        self.extension.commands().iter().find(|c| c.name == name)
    }

    /// Disabled -> Enabled. Spawns one loop per declared task; each loop
    /// waits for the startup gate before its first tick.
    ///
    /// Returns `false` when already enabled.
    pub fn start(self: &Arc<Self>, ctx: &Arc<CoreContext>) -> bool {
        let stop_rx = {
            let mut state = self.state.write();
            if *state == ExtensionState::Enabled {
                return false;
            }
            *state = ExtensionState::Enabled;

            let (tx, rx) = watch::channel(false);
            *self.stop_tx.lock() = Some(tx);
            rx
        };

        for task in self.extension.tasks() {
            tokio::spawn(run_task_loop(
                self.clone(),
                ctx.clone(),
                task.clone(),
                stop_rx.clone(),
            ));
        }

        info!(extension = %self.name, priority = self.priority, "Extension started");
        true
    }

    /// Enabled -> Disabled. Future task ticks are cancelled; work already in
    /// flight runs to completion.
    ///
    /// Returns `false` when already disabled.
    pub fn stop(&self) -> bool {
        {
            let mut state = self.state.write();
            if *state == ExtensionState::Disabled {
                return false;
            }
            *state = ExtensionState::Disabled;
        }
        if let Some(tx) = self.stop_tx.lock().take() {
            let _ = tx.send(true);
        }
        info!(extension = %self.name, "Extension stopped");
        true
    }

    pub(crate) fn record_failure(&self, err: &ExtensionError) {
        self.failures.fetch_add(1, Ordering::Relaxed);
        *self.last_error.write() = Some(err.to_string());
    }
}

impl std::fmt::Debug for ExtensionSlot {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExtensionSlot")
            .field("name", &self.name)
            .field("priority", &self.priority)
            .field("state", &self.state())
            .finish()
    }
}

async fn run_task_loop(
    slot: Arc<ExtensionSlot>,
    ctx: Arc<CoreContext>,
    task: TaskSpec,
    mut stop_rx: watch::Receiver<bool>,
) {
    tokio::select! {
        _ = ctx.gate().wait() => {}
        _ = stop_rx.changed() => return,
    }

    let mut ticker = tokio::time::interval(task.interval.max(MIN_TASK_INTERVAL));
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = stop_rx.changed() => break,
            _ = ticker.tick() => {
                if !slot.is_enabled() || ctx.is_shut_down() {
                    break;
                }
                let context = format!("task {}", task.name);
                let ok = run_isolated(
                    &ctx,
                    &slot,
                    &context,
                    slot.extension().run_task(&ctx, &task.name),
                )
                .await;
                if !ok {
                    break;
                }
            }
        }
    }

    debug!(extension = %slot.name(), task = %task.name, "Task loop finished");
}
