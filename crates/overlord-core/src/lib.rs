//! Event orchestration engine for a community-platform bot.
//!
//! Raw platform events pass a guard chain, are persisted through a
//! [`storage::Store`], and then fan out to pluggable extensions ordered by
//! priority. Admin commands typed in the control channel are routed to the
//! extension implementing them. Any failure inside an extension stops that
//! extension only; failures of the engine itself are reported and shut the
//! engine down.

pub mod builtin;
pub mod command;
pub mod config;
pub mod context;
pub mod dispatcher;
pub mod error;
pub mod event;
pub mod extension;
pub mod guard;
pub mod platform;
pub mod rank;
pub mod report;
pub mod storage;
pub mod sync;

pub use builtin::{ConfigExtension, UtilityExtension};
pub use config::CoreConfig;
pub use context::CoreContext;
pub use dispatcher::{CoreDispatcher, CoreDispatcherBuilder};
pub use error::{Error, Result};
pub use event::{DomainEvent, EventKind, RawEvent};

/// Re-exports commonly used types.
pub mod prelude {
    // Configuration
    pub use crate::config::{defaults, env_vars, CoreConfig, ExtensionConfig};

    // Error handling
    pub use crate::error::{Error, Result};

    // Engine
    pub use crate::context::CoreContext;
    pub use crate::dispatcher::{CoreDispatcher, CoreDispatcherBuilder};
    pub use crate::event::{DomainEvent, EventKind, RawEvent};
    pub use crate::guard::{EventGuard, GuardChain};

    // Extensions
    pub use crate::command::{CommandInvocation, CommandOutcome, CommandRouter};
    pub use crate::extension::{
        ArgSpec, CommandSpec, DynExtension, Extension, ExtensionError, ExtensionMetadata,
        ExtensionRegistry, ExtensionSlot, ExtensionState, TaskSpec,
    };
    pub use crate::rank::{RankOutcome, RankUpdater};

    // Collaborators
    pub use crate::platform::{
        DynPlatform, Member, Message, MessageRef, Platform, PlatformError, Reaction, Role,
        Snowflake, Target, VoiceState,
    };
    pub use crate::storage::{DynStore, MemoryStore, Store, StorageError, UserRecord};
}
