//! Admin commands: tokenizer, invocation context and router.

mod router;
mod tokenizer;

pub use router::{BoundCommand, CommandOutcome, CommandRouter, HELP_COMMAND};
pub use tokenizer::{parse_command, split_line, tokenize, TokenizeError, QUOTE_MARKER};

use crate::context::CoreContext;
use crate::platform::{Message, PlatformError, Target};

/// Fixed replies sent by the router.
pub mod replies {
    pub const UNKNOWN_COMMAND: &str = "Unknown command";
    pub const INVALID_SYNTAX: &str = "Invalid command syntax";
    pub const USAGE: &str = "Usage:";
}

/// A parsed command about to be executed by its owning extension.
#[derive(Debug, Clone)]
pub struct CommandInvocation {
    pub message: Message,
    pub prefix: String,
    /// Canonical command name.
    pub command: String,
    /// Name or alias the sender typed.
    pub invoked_as: String,
    pub args: Vec<String>,
}

impl CommandInvocation {
    pub fn arg(&self, index: usize) -> Option<&str> {
        self.args.get(index).map(String::as_str)
    }

    /// Reply in the channel the command came from.
    pub async fn reply(&self, ctx: &CoreContext, content: &str) -> Result<(), PlatformError> {
        ctx.platform()
            .send_message(Target::Channel(self.message.channel_id), content)
            .await
    }
}
