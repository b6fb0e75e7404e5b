//! Raw configuration commands: reload, save, inspect and alter.
//!
//! Config paths are dotted, e.g. `control.prefix` or `control.roles.0`.
//! Values given to `alter_config` are JSON; quote complex values.

use std::sync::Arc;

use serde_json::Value;
use tracing::{info, warn};

use super::replies;
use crate::command::CommandInvocation;
use crate::config::CoreConfig;
use crate::context::CoreContext;
use crate::extension::{ArgSpec, CommandSpec, Extension, ExtensionError, ExtensionMetadata, Result};

pub const CONFIG_EXTENSION: &str = "config";

pub struct ConfigExtension {
    metadata: ExtensionMetadata,
    commands: Vec<CommandSpec>,
}

impl ConfigExtension {
    pub fn new() -> Self {
        Self {
            metadata: ExtensionMetadata::new(
                CONFIG_EXTENSION,
                "Raw config manipulation commands",
                1,
            ),
            commands: vec![
                CommandSpec::new("reload_config", "Reload config from disk"),
                CommandSpec::new("save_config", "Save config on disk"),
                CommandSpec::new("get_config_value", "Print config value (in json)")
                    .arg(ArgSpec::required("path")),
                CommandSpec::new(
                    "alter_config",
                    "Set config value (in json, use quote to wrap complex values)",
                )
                .arg(ArgSpec::required("path"))
                .arg(ArgSpec::required("value")),
            ],
        }
    }

    pub fn shared() -> Arc<dyn Extension> {
        Arc::new(Self::new())
    }

    async fn get_value(&self, ctx: &CoreContext, inv: &CommandInvocation) -> Result<()> {
        let root = config_tree(&ctx.config())?;
        let path = inv.arg(0).unwrap_or_default();
        let Some(value) = root.pointer(&pointer(path)) else {
            inv.reply(ctx, replies::INVALID_CONFIG_PATH).await?;
            return Ok(());
        };
        let rendered = serde_json::to_string_pretty(value)
            .map_err(|e| ExtensionError::ExecutionFailed(e.to_string()))?;
        inv.reply(
            ctx,
            &format!("{}\n```json\n{}\n```", replies::CONFIG_VALUE_HEADER, rendered),
        )
        .await?;
        Ok(())
    }

    async fn alter(&self, ctx: &CoreContext, inv: &CommandInvocation) -> Result<()> {
        let path = inv.arg(0).unwrap_or_default();
        let raw = inv.arg(1).unwrap_or_default();
        let Ok(value) = serde_json::from_str::<Value>(raw) else {
            info!(value = %raw, "Invalid json value provided");
            inv.reply(ctx, replies::INVALID_JSON_VALUE).await?;
            return Ok(());
        };

        let mut root = config_tree(&ctx.config())?;
        let Some(slot) = root.pointer_mut(&pointer(path)) else {
            info!(path = %path, "Invalid config path provided");
            inv.reply(ctx, replies::INVALID_CONFIG_PATH).await?;
            return Ok(());
        };
        *slot = value;

        let applied = match serde_json::from_value::<CoreConfig>(root) {
            Ok(config) => ctx.reload_config(config).await.map_err(|e| e.to_string()),
            Err(e) => Err(e.to_string()),
        };
        match applied {
            Ok(()) => inv.reply(ctx, replies::DONE).await?,
            Err(e) => {
                warn!(path = %path, error = %e, "Invalid config data, reverting");
                inv.reply(ctx, &format!("❗ {}\n⚠ {}", e, replies::CONFIG_REVERTED))
                    .await?
            }
        }
        Ok(())
    }
}

impl Default for ConfigExtension {
    fn default() -> Self {
        Self::new()
    }
}

fn config_tree(config: &CoreConfig) -> Result<Value> {
    serde_json::to_value(config).map_err(|e| ExtensionError::ExecutionFailed(e.to_string()))
}

/// Dotted config path as a JSON pointer.
fn pointer(path: &str) -> String {
    path.split('.')
        .map(|segment| segment.replace('~', "~0").replace('/', "~1"))
        .fold(String::new(), |acc, segment| acc + "/" + &segment)
}

#[async_trait::async_trait]
impl Extension for ConfigExtension {
    fn metadata(&self) -> &ExtensionMetadata {
        &self.metadata
    }

    fn commands(&self) -> &[CommandSpec] {
        &self.commands
    }

    async fn execute_command(
        &self,
        ctx: &CoreContext,
        command: &str,
        inv: &CommandInvocation,
    ) -> Result<()> {
        match command {
            "reload_config" => {
                info!("Reloading config");
                match ctx.reload_config_file().await {
                    Ok(()) => inv.reply(ctx, replies::DONE).await?,
                    Err(e) => {
                        warn!(error = %e, "Config reload failed, keeping current config");
                        inv.reply(ctx, &format!("❗ {}", e)).await?
                    }
                }
            }
            "save_config" => match ctx.save_config().await {
                Ok(_) => inv.reply(ctx, replies::DONE).await?,
                Err(e) => inv.reply(ctx, &format!("❗ {}", e)).await?,
            },
            "get_config_value" => self.get_value(ctx, inv).await?,
            "alter_config" => self.alter(ctx, inv).await?,
            other => return Err(ExtensionError::NotFound(format!("command {}", other))),
        }
        Ok(())
    }
}
