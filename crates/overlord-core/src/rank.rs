//! Applying rank roles to members.
//!
//! Computing which rank a member deserves is up to extensions; this module
//! only reconciles a member's managed roles with a target set, and refuses
//! to do so while cached role data is stale.

use tokio::sync::OwnedMutexGuard;
use tracing::{debug, warn};

use crate::context::CoreContext;
use crate::extension::Result;
use crate::platform::Snowflake;

/// Result of a rank update.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RankOutcome {
    Applied {
        added: Vec<String>,
        removed: Vec<String>,
    },
    /// Awaiting sync; nothing was touched.
    Deferred,
    /// Member is not stored or no longer in the guild.
    UnknownMember,
}

/// Reconciles a fixed set of managed rank roles.
#[derive(Debug, Clone)]
pub struct RankUpdater {
    managed: Vec<String>,
}

impl RankUpdater {
    pub fn new<I, S>(managed: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            managed: managed.into_iter().map(Into::into).collect(),
        }
    }

    pub fn managed(&self) -> &[String] {
        &self.managed
    }

    /// Give `member_id` exactly the managed roles listed in `target`.
    ///
    /// Roles in `target` that are not managed are ignored, as are roles the
    /// store does not know about. The caller holds the global lock.
    pub async fn apply(
        &self,
        ctx: &CoreContext,
        _guard: &OwnedMutexGuard<()>,
        member_id: Snowflake,
        target: &[String],
    ) -> Result<RankOutcome> {
        if ctx.sync().is_awaiting() {
            debug!(member = member_id, "Awaiting sync, rank update deferred");
            return Ok(RankOutcome::Deferred);
        }

        if ctx.store().get_user(member_id).await?.is_none() {
            warn!(member = member_id, "User does not exist in store, skipping rank update");
            return Ok(RankOutcome::UnknownMember);
        }
        let Some(member) = ctx.platform().fetch_member(member_id).await? else {
            warn!(member = member_id, "Member left the guild, skipping rank update");
            return Ok(RankOutcome::UnknownMember);
        };

        let mut added = Vec::new();
        let mut removed = Vec::new();
        for role in &self.managed {
            let wanted = target.contains(role);
            let held = member.has_role(role);
            if wanted == held {
                continue;
            }
            if ctx.store().get_role(role).await?.is_none() {
                warn!(role = %role, "Rank role does not exist, skipping");
                continue;
            }
            if wanted {
                ctx.platform().add_role(member_id, role).await?;
                added.push(role.clone());
            } else {
                ctx.platform().remove_role(member_id, role).await?;
                removed.push(role.clone());
            }
        }

        if !added.is_empty() || !removed.is_empty() {
            if let Some(updated) = ctx.platform().fetch_member(member_id).await? {
                ctx.store().upsert_member(&updated).await?;
            }
        }
        Ok(RankOutcome::Applied { added, removed })
    }
}
