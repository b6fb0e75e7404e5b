//! Consistency primitives shared by the dispatcher and extensions.
//!
//! - [`SyncStateMachine`] tracks whether cached membership and role data is
//!   stale after a role topology change.
//! - [`GlobalLock`] guards read-modify-write sequences on shared state that
//!   span an await point.
//! - [`StartupGate`] holds back inbound dispatch until startup completes.

use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::sync::{watch, Mutex as AsyncMutex, OwnedMutexGuard};
use tokio::time::Instant;

/// Staleness of cached membership data.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncState {
    Synced { since: Instant },
    AwaitingSync { since: Instant },
}

/// Synced / awaiting-sync state machine.
///
/// The "since" timestamp of an awaiting state always reflects the first
/// change of a burst: [`set_awaiting`](Self::set_awaiting) does nothing when
/// already awaiting.
#[derive(Debug, Clone)]
pub struct SyncStateMachine {
    state: SyncState,
}

impl SyncStateMachine {
    /// New machine in the awaiting state; the cache was never loaded.
    pub fn new() -> Self {
        Self {
            state: SyncState::AwaitingSync {
                since: Instant::now(),
            },
        }
    }

    /// New machine that starts synced.
    pub fn synced() -> Self {
        Self {
            state: SyncState::Synced {
                since: Instant::now(),
            },
        }
    }

    pub fn state(&self) -> SyncState {
        self.state
    }

    pub fn is_awaiting(&self) -> bool {
        matches!(self.state, SyncState::AwaitingSync { .. })
    }

    /// Synced -> AwaitingSync. Returns `false` when already awaiting.
    pub fn set_awaiting(&mut self) -> bool {
        if self.is_awaiting() {
            return false;
        }
        self.state = SyncState::AwaitingSync {
            since: Instant::now(),
        };
        true
    }

    /// AwaitingSync -> Synced, timestamp reset to now.
    pub fn unset(&mut self) {
        self.state = SyncState::Synced {
            since: Instant::now(),
        };
    }

    /// Time spent awaiting sync; zero while synced.
    pub fn elapsed(&self) -> Duration {
        match self.state {
            SyncState::Synced { .. } => Duration::ZERO,
            SyncState::AwaitingSync { since } => Instant::now().saturating_duration_since(since),
        }
    }
}

impl Default for SyncStateMachine {
    fn default() -> Self {
        Self::new()
    }
}

/// Cloneable handle to one [`SyncStateMachine`].
#[derive(Debug, Clone, Default)]
pub struct SharedSyncState {
    inner: Arc<Mutex<SyncStateMachine>>,
}

impl SharedSyncState {
    pub fn new(machine: SyncStateMachine) -> Self {
        Self {
            inner: Arc::new(Mutex::new(machine)),
        }
    }

    pub fn state(&self) -> SyncState {
        self.inner.lock().state()
    }

    pub fn is_awaiting(&self) -> bool {
        self.inner.lock().is_awaiting()
    }

    pub fn set_awaiting(&self) -> bool {
        self.inner.lock().set_awaiting()
    }

    pub fn unset(&self) {
        self.inner.lock().unset()
    }

    pub fn elapsed(&self) -> Duration {
        self.inner.lock().elapsed()
    }
}

/// Process-wide mutual exclusion for shared user, stat and role state.
#[derive(Debug, Clone, Default)]
pub struct GlobalLock {
    inner: Arc<AsyncMutex<()>>,
}

impl GlobalLock {
    pub fn new() -> Self {
        Self::default()
    }

    /// Suspend until the lock is free, then hold it until the guard drops.
    pub async fn lock(&self) -> OwnedMutexGuard<()> {
        self.inner.clone().lock_owned().await
    }

    pub fn try_lock(&self) -> Option<OwnedMutexGuard<()>> {
        self.inner.clone().try_lock_owned().ok()
    }

    pub fn is_locked(&self) -> bool {
        self.inner.try_lock().is_err()
    }
}

/// One-shot "startup complete" signal.
#[derive(Debug, Clone)]
pub struct StartupGate {
    tx: Arc<watch::Sender<bool>>,
}

impl StartupGate {
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(false);
        Self { tx: Arc::new(tx) }
    }

    /// Open the gate. Returns `true` on the first call only.
    pub fn fire(&self) -> bool {
        !self.tx.send_replace(true)
    }

    pub fn is_fired(&self) -> bool {
        *self.tx.borrow()
    }

    /// Suspend until the gate has been fired.
    pub async fn wait(&self) {
        let mut rx = self.tx.subscribe();
        // The sender lives in `self`, so the channel cannot close while waiting.
        let _ = rx.wait_for(|fired| *fired).await;
    }
}

impl Default for StartupGate {
    fn default() -> Self {
        Self::new()
    }
}
