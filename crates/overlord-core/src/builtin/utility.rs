//! Scheduled resync and maintenance commands.

use std::sync::Arc;
use std::time::Duration;

use tracing::info;

use super::replies;
use crate::command::CommandInvocation;
use crate::context::CoreContext;
use crate::extension::{
    ArgSpec, CommandSpec, Extension, ExtensionError, ExtensionMetadata, Result, TaskSpec,
};

pub const UTILITY_EXTENSION: &str = "utility";
pub const USER_SYNC_TASK: &str = "user-sync";

const USER_SYNC_INTERVAL: Duration = Duration::from_secs(1);

pub struct UtilityExtension {
    metadata: ExtensionMetadata,
    commands: Vec<CommandSpec>,
    tasks: Vec<TaskSpec>,
}

impl UtilityExtension {
    pub fn new() -> Self {
        Self {
            metadata: ExtensionMetadata::new(
                UTILITY_EXTENSION,
                "Basic utility commands collection",
                0,
            ),
            commands: vec![
                CommandSpec::new("ping", "Checks bot state"),
                CommandSpec::new("sync", "Synchronize stored users and roles with the guild"),
                CommandSpec::new("extensions", "List extensions"),
                CommandSpec::new("start_ext", "Start an extension")
                    .arg(ArgSpec::required("ref")),
                CommandSpec::new("stop_ext", "Stop an extension").arg(ArgSpec::required("ref")),
            ],
            tasks: vec![TaskSpec::new(USER_SYNC_TASK, USER_SYNC_INTERVAL)],
        }
    }

    pub fn shared() -> Arc<dyn Extension> {
        Arc::new(Self::new())
    }

    async fn user_sync(&self, ctx: &CoreContext) -> Result<()> {
        let debounce = Duration::from_secs(ctx.config().resync_debounce_secs);
        if !ctx.sync().is_awaiting() || ctx.sync().elapsed() < debounce {
            return Ok(());
        }
        info!("Scheduled user sync");
        ctx.resync().await?;
        info!("Done scheduled user sync");
        Ok(())
    }

    async fn list_extensions(&self, ctx: &CoreContext, inv: &CommandInvocation) -> Result<()> {
        let lines: Vec<String> = ctx
            .registry()
            .slots()
            .iter()
            .enumerate()
            .map(|(i, slot)| {
                let mut line = format!(
                    "{}. `{}` priority {} {}",
                    i + 1,
                    slot.name(),
                    slot.priority(),
                    slot.state()
                );
                if let Some(err) = slot.last_error() {
                    line.push_str(&format!(" (last error: {})", err));
                }
                line
            })
            .collect();
        inv.reply(ctx, &lines.join("\n")).await?;
        Ok(())
    }
}

impl Default for UtilityExtension {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait::async_trait]
impl Extension for UtilityExtension {
    fn metadata(&self) -> &ExtensionMetadata {
        &self.metadata
    }

    fn commands(&self) -> &[CommandSpec] {
        &self.commands
    }

    fn tasks(&self) -> &[TaskSpec] {
        &self.tasks
    }

    async fn run_task(&self, ctx: &CoreContext, task: &str) -> Result<()> {
        match task {
            USER_SYNC_TASK => self.user_sync(ctx).await,
            other => Err(ExtensionError::NotFound(format!("task {}", other))),
        }
    }

    async fn execute_command(
        &self,
        ctx: &CoreContext,
        command: &str,
        inv: &CommandInvocation,
    ) -> Result<()> {
        match command {
            "ping" => {
                let reply = if ctx.lock().is_locked() {
                    replies::BUSY
                } else {
                    replies::PONG
                };
                inv.reply(ctx, reply).await?;
            }
            "sync" => {
                let guard = ctx.lock().lock().await;
                inv.reply(ctx, replies::SYNC_BEGIN).await?;
                ctx.resync_locked(&guard).await?;
                inv.reply(ctx, replies::DONE).await?;
            }
            "extensions" => self.list_extensions(ctx, inv).await?,
            "start_ext" | "stop_ext" => {
                let reference = inv.arg(0).unwrap_or_default();
                let Some(slot) = ctx.registry().resolve(reference) else {
                    inv.reply(ctx, replies::NOT_FOUND).await?;
                    return Ok(());
                };
                if slot.name() == self.metadata.name && command == "stop_ext" {
                    inv.reply(ctx, replies::CANNOT_STOP_SELF).await?;
                    return Ok(());
                }
                let changed = if command == "start_ext" {
                    ctx.start_extension(&slot)
                } else {
                    ctx.stop_extension(&slot)
                };
                let state = if changed {
                    replies::DONE
                } else {
                    replies::UNCHANGED
                };
                inv.reply(ctx, &format!("`{}`: {}", slot.name(), state)).await?;
            }
            other => return Err(ExtensionError::NotFound(format!("command {}", other))),
        }
        Ok(())
    }
}
