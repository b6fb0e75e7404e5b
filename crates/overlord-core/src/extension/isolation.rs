//! Per-extension failure isolation.
//!
//! Every handler, task tick and command body runs through [`run_isolated`].
//! An error, a panic or a timeout is logged, reported and the owning
//! extension is stopped. Nothing propagates to the caller.

use std::any::Any;
use std::future::Future;
use std::panic::AssertUnwindSafe;

use futures::FutureExt;
use tracing::error;

use super::{ExtensionError, ExtensionSlot};
use crate::context::CoreContext;
use crate::report::EXTENSION_TRACE_FRAMES;

/// Run `body` on behalf of `slot`. Returns `true` when it completed.
pub async fn run_isolated<F>(
    ctx: &CoreContext,
    slot: &ExtensionSlot,
    context: &str,
    body: F,
) -> bool
where
    F: Future<Output = Result<(), ExtensionError>> + Send,
{
    let timeout = ctx.handler_timeout();
    let guarded = async move {
        match timeout {
            Some(limit) => tokio::time::timeout(limit, body)
                .await
                .unwrap_or(Err(ExtensionError::Timeout(limit))),
            None => body.await,
        }
    };

    let err = match AssertUnwindSafe(guarded).catch_unwind().await {
        Ok(Ok(())) => return true,
        Ok(Err(e)) => e,
        Err(payload) => ExtensionError::Panicked(panic_message(payload.as_ref())),
    };

    error!(
        extension = %slot.name(),
        context = %context,
        error = %err,
        "Extension failed, stopping it"
    );
    slot.record_failure(&err);
    slot.stop();

    ctx.reporter()
        .report_failure(
            &format!("Extension {}", slot.name()),
            context,
            &err,
            EXTENSION_TRACE_FRAMES,
            true,
        )
        .await;
    false
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}
