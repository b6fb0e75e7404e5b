//! Failure and status reports sent to the maintainer and the error channel.
//!
//! Full traces only ever go to the maintainer. The public error channel gets
//! a short message with a "reported to" notice.

use std::error::Error as StdError;

use crate::platform::{DynPlatform, Snowflake, Target};

/// Trace frames kept for extension failures.
pub const EXTENSION_TRACE_FRAMES: usize = 4;

/// Trace frames kept for core failures.
pub const CORE_TRACE_FRAMES: usize = 6;

/// Render `err` and its `source()` chain, keeping at most `frames` lines.
pub fn limit_trace(err: &(dyn StdError + 'static), frames: usize) -> Vec<String> {
    let mut chain = vec![err.to_string()];
    let mut current = err.source();
    while let Some(source) = current {
        chain.push(format!("caused by: {}", source));
        current = source.source();
    }

    if chain.len() > frames {
        let hidden = chain.len() - frames;
        chain.truncate(frames);
        chain.push(format!("... {} more", hidden));
    }
    chain
}

/// Sends reports through the platform client.
#[derive(Clone)]
pub struct Reporter {
    platform: DynPlatform,
    maintainer: Snowflake,
    error_channel: Option<Snowflake>,
}

impl Reporter {
    pub fn new(platform: DynPlatform, maintainer: Snowflake, error_channel: Option<Snowflake>) -> Self {
        Self {
            platform,
            maintainer,
            error_channel,
        }
    }

    pub fn maintainer(&self) -> Snowflake {
        self.maintainer
    }

    pub fn error_channel(&self) -> Option<Snowflake> {
        self.error_channel
    }

    /// Report a caught failure of `source` while running `context`.
    ///
    /// The maintainer gets the capped trace; the error channel, unless
    /// `public` is false, gets the message only.
    pub async fn report_failure(
        &self,
        source: &str,
        context: &str,
        err: &(dyn StdError + Send + Sync + 'static),
        frames: usize,
        public: bool,
    ) {
        let trace = limit_trace(err, frames).join("\n");
        let full = format!(
            "❗ {} failed on {}: {}\n```\n{}\n```",
            source, context, err, trace
        );
        self.send(Target::User(self.maintainer), &full).await;

        if public {
            if let Some(channel) = self.error_channel {
                let short = format!(
                    "❗ {}: {}\nReported to <@{}>",
                    source, err, self.maintainer
                );
                self.send(Target::Channel(channel), &short).await;
            }
        }
    }

    pub async fn send_warning(&self, from: &str, msg: &str) {
        self.broadcast(&format!("⚠ {}: {}", from, msg)).await;
    }

    async fn broadcast(&self, content: &str) {
        if let Some(channel) = self.error_channel {
            self.send(Target::Channel(channel), content).await;
        }
        self.send(Target::User(self.maintainer), content).await;
    }

    async fn send(&self, target: Target, content: &str) {
        if let Err(e) = self.platform.send_message(target, content).await {
            tracing::warn!(to = %target, error = %e, "Failed to deliver report");
        }
    }
}
