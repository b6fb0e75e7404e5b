//! Pluggable extensions.
//!
//! An extension statically declares what it takes part in:
//! - the events it handles ([`Extension::events`]),
//! - the admin commands it implements ([`Extension::commands`]),
//! - the background tasks it runs while enabled ([`Extension::tasks`]).
//!
//! The registry consults these declarations to build the per-event call
//! plan and the command table; it never inspects anything else.

mod isolation;
mod lifecycle;
mod registry;

pub use isolation::run_isolated;
pub use lifecycle::{ExtensionSlot, ExtensionState};
pub use registry::{Band, CallPlan, ExtensionRegistry, PRIORITY_LEVELS};

use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::command::CommandInvocation;
use crate::context::CoreContext;
use crate::event::{DomainEvent, EventKind};
use crate::platform::PlatformError;
use crate::storage::StorageError;

// ============================================================================
// Errors
// ============================================================================

/// Failure escaping a handler, task or command body.
#[derive(Debug, thiserror::Error)]
pub enum ExtensionError {
    #[error("Execution failed: {0}")]
    ExecutionFailed(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Timed out after {0:?}")]
    Timeout(Duration),

    #[error("Panicked: {0}")]
    Panicked(String),

    #[error("Platform error: {0}")]
    Platform(#[from] PlatformError),

    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("Engine error: {0}")]
    Engine(#[from] crate::error::Error),
}

/// Result type for extension bodies.
pub type Result<T> = std::result::Result<T, ExtensionError>;

// ============================================================================
// Declarations
// ============================================================================

/// Extension identity and default ordering.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExtensionMetadata {
    /// Unique name, also the key of its `[extensions.<name>]` config section.
    pub name: String,
    pub description: String,
    /// Default priority in `[0, 64)`; lower runs earlier.
    pub priority: i32,
}

impl ExtensionMetadata {
    pub fn new(name: impl Into<String>, description: impl Into<String>, priority: i32) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            priority,
        }
    }
}

/// One positional command argument.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArgSpec {
    pub name: String,
    #[serde(default)]
    pub optional: bool,
}

impl ArgSpec {
    pub fn required(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            optional: false,
        }
    }

    pub fn optional(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            optional: true,
        }
    }
}

/// Admin command implemented by an extension.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommandSpec {
    pub name: String,
    pub description: String,
    #[serde(default)]
    pub args: Vec<ArgSpec>,
}

impl CommandSpec {
    pub fn new(name: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            args: Vec::new(),
        }
    }

    pub fn arg(mut self, arg: ArgSpec) -> Self {
        self.args.push(arg);
        self
    }

    /// Argument list as shown in usage lines, e.g. `<ref> [count]`.
    pub fn args_str(&self) -> String {
        self.args
            .iter()
            .map(|a| {
                if a.optional {
                    format!("[{}]", a.name)
                } else {
                    format!("<{}>", a.name)
                }
            })
            .collect::<Vec<_>>()
            .join(" ")
    }

    /// Usage line for `invoked_as`, e.g. `ov/stop_ext <ref>`.
    pub fn usage(&self, prefix: &str, invoked_as: &str) -> String {
        let args = self.args_str();
        if args.is_empty() {
            format!("{}{}", prefix, invoked_as)
        } else {
            format!("{}{} {}", prefix, invoked_as, args)
        }
    }

    /// Whether `count` positional arguments are acceptable.
    pub fn accepts(&self, count: usize) -> bool {
        let required = self.args.iter().filter(|a| !a.optional).count();
        count >= required && count <= self.args.len()
    }
}

/// Background task run on a fixed interval while the extension is enabled.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaskSpec {
    pub name: String,
    pub interval: Duration,
}

impl TaskSpec {
    pub fn new(name: impl Into<String>, interval: Duration) -> Self {
        Self {
            name: name.into(),
            interval,
        }
    }
}

// ============================================================================
// Extension trait
// ============================================================================

/// A unit of pluggable behavior.
///
/// Every body returns [`Result`]; an error or a panic escaping any of them is
/// caught at the isolation boundary and stops the extension. Bodies that
/// read and then mutate shared state across an await must hold
/// [`CoreContext::lock`] for the whole sequence.
#[async_trait::async_trait]
pub trait Extension: Send + Sync {
    fn metadata(&self) -> &ExtensionMetadata;

    /// Events this extension handles.
    fn events(&self) -> &[EventKind] {
        &[]
    }

    /// Admin commands this extension implements.
    fn commands(&self) -> &[CommandSpec] {
        &[]
    }

    /// Background tasks this extension runs.
    fn tasks(&self) -> &[TaskSpec] {
        &[]
    }

    /// Handle a domain event listed in [`events`](Self::events).
    async fn handle_event(&self, _ctx: &CoreContext, _event: &DomainEvent) -> Result<()> {
        Ok(())
    }

    /// Run one tick of the task named `task`.
    async fn run_task(&self, _ctx: &CoreContext, task: &str) -> Result<()> {
        Err(ExtensionError::NotFound(format!("task {}", task)))
    }

    /// Execute the command named `command`.
    async fn execute_command(
        &self,
        _ctx: &CoreContext,
        command: &str,
        _invocation: &CommandInvocation,
    ) -> Result<()> {
        Err(ExtensionError::NotFound(format!("command {}", command)))
    }
}

/// Type alias for a shared extension.
pub type DynExtension = Arc<dyn Extension>;
