//! Command-line interface for the Overlord engine.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use overlord_core::platform::RecordingPlatform;
use overlord_core::prelude::*;
use overlord_core::{ConfigExtension, UtilityExtension};

/// Overlord - event orchestration engine for community bots.
#[derive(Parser, Debug)]
#[command(name = "overlord")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Action to perform.
    #[command(subcommand)]
    command: Command,

    /// Verbose output.
    #[arg(short, long, global = true)]
    verbose: bool,
}

/// Available commands.
#[derive(Subcommand, Debug)]
enum Command {
    /// Validate a configuration file and print the command table.
    Check {
        /// Path to the TOML configuration.
        #[arg(short, long, default_value = "overlord.toml")]
        config: PathBuf,
    },
    /// Feed recorded events through the engine offline.
    Replay {
        /// Path to the TOML configuration.
        #[arg(short, long, default_value = "overlord.toml")]
        config: PathBuf,
        /// JSON Lines file, one raw event per line.
        #[arg(short, long)]
        events: PathBuf,
    },
    /// List event kinds extensions can subscribe to.
    Events,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    init_logging(args.verbose);

    match args.command {
        Command::Check { config } => run_check(&config),
        Command::Replay { config, events } => run_replay(&config, &events).await,
        Command::Events => {
            for kind in EventKind::ALL {
                println!("{}", kind);
            }
            Ok(())
        }
    }
}

fn init_logging(verbose: bool) {
    // JSON format for production/container environments
    let json_logging = std::env::var("OVERLORD_LOG_JSON")
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(false);

    let default_level = if verbose { "overlord=debug" } else { "overlord=info" };
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_level));

    if json_logging {
        tracing_subscriber::fmt()
            .json()
            .with_env_filter(env_filter)
            .with_target(true)
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(env_filter)
            .with_target(false)
            .compact()
            .init();
    }
}

/// Build with the built-in extensions only.
fn build(
    config: CoreConfig,
    config_path: &Path,
    platform: Arc<RecordingPlatform>,
) -> Result<CoreDispatcher> {
    let store = Arc::new(MemoryStore::new());
    let dispatcher = CoreDispatcher::builder(platform, store, config)
        .config_path(config_path)
        .extension(UtilityExtension::shared())
        .extension(ConfigExtension::shared())
        .build()?;
    Ok(dispatcher)
}

fn load_config(path: &Path) -> Result<CoreConfig> {
    CoreConfig::load(path).with_context(|| format!("Failed to load {}", path.display()))
}

fn run_check(path: &Path) -> Result<()> {
    let config = load_config(path)?;
    let dispatcher = build(config, path, Arc::new(RecordingPlatform::new()))?;

    let router = dispatcher.router();
    println!("Configuration OK: {}", path.display());
    println!();
    println!("Extensions:");
    for slot in dispatcher.context().registry().slots() {
        println!("  {:>2}  {}", slot.priority(), slot.name());
    }
    println!();
    println!("Commands:");
    for name in router.names() {
        if let Some(command) = router.resolve(name) {
            let owner = command
                .owner
                .as_ref()
                .map(|s| s.name().to_string())
                .unwrap_or_else(|| "builtin".to_string());
            println!(
                "  {:<30} {:<10} {}",
                command.spec.usage(router.prefix(), name),
                owner,
                command.aliases.join(", ")
            );
        }
    }
    Ok(())
}

async fn run_replay(config_path: &Path, events_path: &Path) -> Result<()> {
    let config = load_config(config_path)?;
    let content = fs::read_to_string(events_path)
        .with_context(|| format!("Failed to read {}", events_path.display()))?;

    let platform = Arc::new(RecordingPlatform::new());
    seed_control_roles(&platform, &config);
    let dispatcher = build(config, config_path, platform.clone())?;
    dispatcher.start().await?;

    let mut replayed = 0usize;
    for (index, line) in content.lines().enumerate() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let event: RawEvent = serde_json::from_str(line)
            .with_context(|| format!("{}:{}: invalid event", events_path.display(), index + 1))?;
        seed(&platform, &event);

        if let Err(e) = dispatcher.dispatch(event).await {
            tracing::error!(line = index + 1, error = %e, "Replay aborted");
            dispatcher.shutdown().await;
            return Err(e.into());
        }
        replayed += 1;
    }

    dispatcher.shutdown().await;
    for action in platform.actions() {
        println!("{}", serde_json::to_string(&action)?);
    }
    tracing::info!(events = replayed, "Replay finished");
    Ok(())
}

/// Keep the offline platform consistent with the replayed stream so
/// reactions and member lookups resolve.
fn seed(platform: &RecordingPlatform, event: &RawEvent) {
    match event {
        RawEvent::MemberJoined(member) => platform.insert_member(member.clone()),
        RawEvent::MemberUpdated { after, .. } => platform.insert_member(after.clone()),
        RawEvent::MemberLeft(member) => {
            platform.remove_member(member.id);
        }
        RawEvent::MessageCreated(message) => platform.insert_message(message.clone()),
        RawEvent::RoleCreated(role) => platform.insert_role(role.clone()),
        RawEvent::RoleUpdated { after, .. } => platform.insert_role(after.clone()),
        RawEvent::RoleDeleted(role) => {
            platform.delete_role(role.id);
        }
        _ => {}
    }
}

/// The offline guild starts with the control roles so startup checks pass.
fn seed_control_roles(platform: &RecordingPlatform, config: &CoreConfig) {
    for (i, name) in config.control.roles.iter().enumerate() {
        platform.insert_role(Role {
            id: u64::MAX - i as u64,
            guild_id: config.identity.guild,
            name: name.clone(),
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn role(id: Snowflake, name: &str) -> Role {
        Role {
            id,
            guild_id: 1,
            name: name.to_string(),
        }
    }

    #[tokio::test]
    async fn test_seed_tracks_role_lifecycle() {
        let platform = RecordingPlatform::new();
        seed(&platform, &RawEvent::RoleCreated(role(60, "Veteran")));
        seed(
            &platform,
            &RawEvent::RoleUpdated {
                before: role(60, "Veteran"),
                after: role(60, "Elder"),
            },
        );
        let names: Vec<String> = platform
            .fetch_roles()
            .await
            .unwrap()
            .into_iter()
            .map(|r| r.name)
            .collect();
        assert_eq!(names, vec!["Elder"]);

        seed(&platform, &RawEvent::RoleDeleted(role(60, "Elder")));
        assert!(platform.fetch_roles().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_control_roles_are_seeded() {
        let mut config = CoreConfig::default();
        config.identity.guild = 1;
        config.control.roles = vec!["Overlord".into(), "Moderator".into()];

        let platform = RecordingPlatform::new();
        seed_control_roles(&platform, &config);
        let roles = platform.fetch_roles().await.unwrap();
        assert_eq!(roles.len(), 2);
        assert!(roles.iter().all(|r| r.guild_id == 1));
    }
}
