//! Command table binding configured names and aliases to extension handlers.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use tracing::{debug, info, warn};

use super::{parse_command, replies, CommandInvocation};
use crate::config_err;
use crate::context::CoreContext;
use crate::error::Result;
use crate::extension::{run_isolated, ArgSpec, CommandSpec, ExtensionRegistry, ExtensionSlot};
use crate::platform::{Message, Target};

/// Name of the built-in help command.
pub const HELP_COMMAND: &str = "help";

/// A command bound to its handler.
#[derive(Debug, Clone)]
pub struct BoundCommand {
    pub spec: CommandSpec,
    pub aliases: Vec<String>,
    /// `None` for built-in commands.
    pub owner: Option<Arc<ExtensionSlot>>,
}

impl BoundCommand {
    pub fn name(&self) -> &str {
        &self.spec.name
    }

    /// Help entry: usage, description and aliases.
    pub fn help(&self, prefix: &str) -> String {
        let mut lines = vec![
            format!("{} `{}`", replies::USAGE, self.spec.usage(prefix, self.name())),
            self.spec.description.clone(),
        ];
        if !self.aliases.is_empty() {
            let aliases: Vec<String> = self
                .aliases
                .iter()
                .map(|a| format!("`{}{}`", prefix, a))
                .collect();
            lines.push(format!("Aliases: {}", aliases.join(", ")));
        }
        lines.join("\n")
    }
}

/// What happened to an inbound control message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CommandOutcome {
    /// Not a command (no prefix or empty body).
    NotCommand,
    /// Sender is not authorized; nothing was replied.
    Unauthorized,
    InvalidSyntax,
    Unknown(String),
    /// Wrong number of arguments; usage was replied.
    Usage(String),
    Help,
    /// Owning extension is stopped.
    ExtensionStopped(String),
    Executed(String),
    /// Handler failed; its extension was stopped.
    Failed(String),
}

/// Resolves command names and aliases to their bound handler.
#[derive(Debug, Clone)]
pub struct CommandRouter {
    prefix: String,
    commands: BTreeMap<String, BoundCommand>,
    /// Name or alias -> canonical name.
    lookup: HashMap<String, String>,
}

impl CommandRouter {
    /// Table holding only the built-in `help`.
    pub fn builtin(prefix: &str) -> Self {
        let help = BoundCommand {
            spec: CommandSpec::new(HELP_COMMAND, "Show available commands")
                .arg(ArgSpec::optional("command")),
            aliases: Vec::new(),
            owner: None,
        };
        Self {
            prefix: prefix.to_string(),
            commands: BTreeMap::from([(HELP_COMMAND.to_string(), help)]),
            lookup: HashMap::from([(HELP_COMMAND.to_string(), HELP_COMMAND.to_string())]),
        }
    }

    /// Bind every configured command to the first extension, in priority
    /// order, implementing it.
    pub fn build(
        prefix: &str,
        table: &BTreeMap<String, Vec<String>>,
        registry: &ExtensionRegistry,
    ) -> Result<Self> {
        let mut commands = Self::builtin(prefix).commands;

        for (name, aliases) in table {
            let aliases: Vec<String> = aliases.iter().filter(|a| *a != name).cloned().collect();
            if name == HELP_COMMAND {
                if let Some(help) = commands.get_mut(HELP_COMMAND) {
                    help.aliases = aliases;
                }
                continue;
            }
            let (slot, spec) = registry.command_owner(name).ok_or_else(|| {
                config_err!(
                    format!("commands.{}", name),
                    "Command handler not found for {}",
                    name
                )
            })?;
            debug!(command = %name, extension = %slot.name(), "Command bound");
            commands.insert(
                name.clone(),
                BoundCommand {
                    spec,
                    aliases,
                    owner: Some(slot),
                },
            );
        }

        let mut lookup: HashMap<String, String> = commands
            .keys()
            .map(|name| (name.clone(), name.clone()))
            .collect();
        for (name, command) in &commands {
            for alias in &command.aliases {
                if let Some(other) = lookup.get(alias) {
                    if other != name {
                        return Err(config_err!(
                            format!("commands.{}", name),
                            "Command alias collision for {}: {} <-> {}",
                            alias,
                            name,
                            other
                        ));
                    }
                }
                lookup.insert(alias.clone(), name.clone());
            }
        }

        info!(commands = commands.len(), aliases = lookup.len() - commands.len(), "Command table built");
        Ok(Self {
            prefix: prefix.to_string(),
            commands,
            lookup,
        })
    }

    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    /// Resolve a name or alias.
    pub fn resolve(&self, name: &str) -> Option<&BoundCommand> {
        self.lookup.get(name).and_then(|c| self.commands.get(c))
    }

    /// Canonical names in alphabetical order.
    pub fn names(&self) -> Vec<&str> {
        self.commands.keys().map(String::as_str).collect()
    }

    /// Help text for one command, or the list of all commands.
    pub fn help_text(&self, name: Option<&str>) -> String {
        match name {
            Some(name) => match self.resolve(name) {
                Some(command) => command.help(&self.prefix),
                None => replies::UNKNOWN_COMMAND.to_string(),
            },
            None => self
                .commands
                .values()
                .map(|c| format!("`{}` - {}", c.spec.usage(&self.prefix, c.name()), c.spec.description))
                .collect::<Vec<_>>()
                .join("\n"),
        }
    }

    /// Handle a control message.
    pub async fn dispatch(&self, ctx: &CoreContext, message: &Message) -> CommandOutcome {
        if !ctx.is_admin(&message.author) {
            debug!(author = %message.author.qualified_name(), "Ignoring command from non-admin");
            return CommandOutcome::Unauthorized;
        }

        let argv = match parse_command(&self.prefix, &message.content) {
            None => return CommandOutcome::NotCommand,
            Some(Err(e)) => {
                debug!(error = %e, "Invalid command syntax");
                reply(ctx, message, replies::INVALID_SYNTAX).await;
                return CommandOutcome::InvalidSyntax;
            }
            Some(Ok(argv)) => argv,
        };
        let Some((invoked_as, args)) = argv.split_first() else {
            return CommandOutcome::NotCommand;
        };

        let Some(command) = self.resolve(invoked_as) else {
            reply(ctx, message, replies::UNKNOWN_COMMAND).await;
            return CommandOutcome::Unknown(invoked_as.clone());
        };

        if !command.spec.accepts(args.len()) {
            let usage = format!(
                "{} {}",
                replies::USAGE,
                command.spec.usage(&self.prefix, invoked_as)
            );
            reply(ctx, message, &usage).await;
            return CommandOutcome::Usage(usage);
        }

        let Some(slot) = command.owner.as_ref() else {
            reply(ctx, message, &self.help_text(args.first().map(String::as_str))).await;
            return CommandOutcome::Help;
        };

        if !slot.is_enabled() {
            reply(
                ctx,
                message,
                &format!("Extension `{}` is stopped", slot.name()),
            )
            .await;
            return CommandOutcome::ExtensionStopped(slot.name().to_string());
        }

        let invocation = CommandInvocation {
            message: message.clone(),
            prefix: self.prefix.clone(),
            command: command.name().to_string(),
            invoked_as: invoked_as.clone(),
            args: args.to_vec(),
        };
        info!(
            command = %invocation.command,
            author = %message.author.qualified_name(),
            "Executing command"
        );

        let context = format!("command {}", invocation.command);
        let ok = run_isolated(
            ctx,
            slot,
            &context,
            slot.extension()
                .execute_command(ctx, &invocation.command, &invocation),
        )
        .await;
        if ok {
            CommandOutcome::Executed(invocation.command)
        } else {
            CommandOutcome::Failed(invocation.command)
        }
    }
}

async fn reply(ctx: &CoreContext, message: &Message, content: &str) {
    if let Err(e) = ctx
        .platform()
        .send_message(Target::Channel(message.channel_id), content)
        .await
    {
        warn!(error = %e, "Failed to send command reply");
    }
}
