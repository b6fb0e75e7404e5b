//! Engine configuration.
//!
//! Loaded from a TOML file; every field has a default so a partial file is
//! valid. Identity values may be overridden from the environment (see
//! [`env_vars`]).

use std::collections::BTreeMap;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::config_err;
use crate::error::Result;
use crate::platform::Snowflake;

/// Default values.
pub mod defaults {
    pub const PREFIX: &str = "ov/";
    pub const CONTROL_ROLE: &str = "Overlord";
    pub const RESYNC_DEBOUNCE_SECS: u64 = 30;
    pub const HANDLER_TIMEOUT_SECS: u64 = 60;
}

/// Environment variable names.
pub mod env_vars {
    pub const GUILD: &str = "OVERLORD_GUILD";
    pub const CONTROL_CHANNEL: &str = "OVERLORD_CONTROL_CHANNEL";
    pub const ERROR_CHANNEL: &str = "OVERLORD_ERROR_CHANNEL";
    pub const MAINTAINER: &str = "OVERLORD_MAINTAINER";
}

/// Admin command surface.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ControlConfig {
    /// A message is a command iff it starts with this prefix.
    pub prefix: String,
    /// Holders of any of these roles may issue commands.
    pub roles: Vec<String>,
    /// Channel whose messages are treated as commands.
    pub channel: Snowflake,
    /// Identities authorized regardless of roles.
    pub admins: Vec<Snowflake>,
}

impl Default for ControlConfig {
    fn default() -> Self {
        Self {
            prefix: defaults::PREFIX.to_string(),
            roles: vec![defaults::CONTROL_ROLE.to_string()],
            channel: 0,
            admins: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct IdentityConfig {
    pub guild: Snowflake,
    pub maintainer: Snowflake,
    pub error_channel: Option<Snowflake>,
}

/// Per-extension overrides.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExtensionConfig {
    pub priority: Option<i32>,
    /// Start the extension at startup.
    pub enabled: bool,
}

impl Default for ExtensionConfig {
    fn default() -> Self {
        Self {
            priority: None,
            enabled: true,
        }
    }
}

/// Root configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CoreConfig {
    pub control: ControlConfig,
    pub identity: IdentityConfig,
    /// Keep users that left the guild, flagged absent.
    pub keep_absent_users: bool,
    /// Ignore AFK voice channels when tracking voice sessions.
    pub ignore_afk_vc: bool,
    pub resync_debounce_secs: u64,
    /// `0` disables the per-handler timeout.
    pub handler_timeout_secs: u64,
    /// Canonical command name -> aliases.
    pub commands: BTreeMap<String, Vec<String>>,
    pub extensions: BTreeMap<String, ExtensionConfig>,
}

impl Default for CoreConfig {
    fn default() -> Self {
        Self {
            control: ControlConfig::default(),
            identity: IdentityConfig::default(),
            keep_absent_users: true,
            ignore_afk_vc: true,
            resync_debounce_secs: defaults::RESYNC_DEBOUNCE_SECS,
            handler_timeout_secs: defaults::HANDLER_TIMEOUT_SECS,
            commands: BTreeMap::new(),
            extensions: BTreeMap::new(),
        }
    }
}

impl CoreConfig {
    /// Load from a file, apply environment overrides and validate.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        tracing::info!(path = %path.display(), "Loading configuration");
        let content = std::fs::read_to_string(path)?;
        let mut config = Self::from_toml_str(&content)?;
        config.apply_env_overrides()?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_toml_str(content: &str) -> Result<Self> {
        Ok(toml::from_str(content)?)
    }

    pub fn to_toml_string(&self) -> std::result::Result<String, toml::ser::Error> {
        toml::to_string_pretty(self)
    }

    pub fn apply_env_overrides(&mut self) -> Result<()> {
        self.apply_overrides_from(|name| std::env::var(name).ok())
    }

    /// Apply overrides from an arbitrary variable lookup.
    pub fn apply_overrides_from<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        let parse = |name: &str| -> Result<Option<Snowflake>> {
            match lookup(name) {
                None => Ok(None),
                Some(raw) => raw
                    .trim()
                    .parse()
                    .map(Some)
                    .map_err(|_| config_err!(name, "Invalid id `{}`", raw)),
            }
        };

        if let Some(guild) = parse(env_vars::GUILD)? {
            self.identity.guild = guild;
        }
        if let Some(channel) = parse(env_vars::CONTROL_CHANNEL)? {
            self.control.channel = channel;
        }
        if let Some(channel) = parse(env_vars::ERROR_CHANNEL)? {
            self.identity.error_channel = Some(channel);
        }
        if let Some(maintainer) = parse(env_vars::MAINTAINER)? {
            self.identity.maintainer = maintainer;
        }
        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        if self.control.prefix.trim().is_empty() {
            return Err(config_err!("control.prefix", "Command prefix is empty"));
        }
        if self.identity.guild == 0 {
            return Err(config_err!("identity.guild", "Guild id is not set"));
        }
        if self.identity.maintainer == 0 {
            return Err(config_err!("identity.maintainer", "Maintainer id is not set"));
        }
        for (name, aliases) in &self.commands {
            if name.trim().is_empty() || name.contains(char::is_whitespace) {
                return Err(config_err!("commands", "Invalid command name `{}`", name));
            }
            if let Some(i) = aliases.iter().position(|a| a.trim().is_empty()) {
                return Err(config_err!(
                    format!("commands.{}[{}]", name, i),
                    "Empty alias"
                ));
            }
        }
        Ok(())
    }

    pub fn extension(&self, name: &str) -> ExtensionConfig {
        self.extensions.get(name).cloned().unwrap_or_default()
    }

    /// Channels excluded from activity tracking.
    pub fn special_channels(&self) -> Vec<Snowflake> {
        let mut channels = vec![self.control.channel];
        channels.extend(self.identity.error_channel);
        channels
    }
}
