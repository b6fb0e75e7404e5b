//! Event dispatch through guards, persistence and priority bands.

mod common;

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use common::*;
use overlord_core::platform::RecordingPlatform;
use overlord_core::prelude::*;
use overlord_core::storage::ActivityKind;
use tokio::sync::Notify;

// ========================================================================
// Call plan ordering
// ========================================================================

#[tokio::test]
async fn test_bands_run_in_priority_order() {
    let log = call_log();
    let harness = Harness::started(
        config(),
        vec![
            Spy::new("late", 40, &log)
                .on(&[EventKind::MessageCreated])
                .shared(),
            Spy::new("early", 2, &log)
                .on(&[EventKind::MessageCreated, EventKind::MemberJoined])
                .shared(),
            Spy::new("middle", 20, &log)
                .on(&[EventKind::MessageCreated])
                .shared(),
            Spy::new("joins", 2, &log)
                .on(&[EventKind::MemberJoined])
                .shared(),
        ],
    )
    .await;

    harness
        .dispatcher
        .dispatch(chat(500, ALICE, "hello"))
        .await
        .unwrap();

    assert_eq!(
        *log.lock(),
        vec![
            "early:message-created",
            "middle:message-created",
            "late:message-created",
        ]
    );

    let plan = harness.ctx().registry().plan();
    let priorities: Vec<i32> = plan
        .bands(EventKind::MemberJoined)
        .iter()
        .map(|b| b.priority)
        .collect();
    assert_eq!(priorities, vec![2]);
    let mut names = plan.bands(EventKind::MemberJoined)[0].names();
    names.sort();
    assert_eq!(names, vec!["early", "joins"]);
    assert!(plan.bands(EventKind::ReactionAdded).is_empty());
}

#[tokio::test]
async fn test_same_band_handlers_all_run() {
    let log = call_log();
    let harness = Harness::started(
        config(),
        vec![
            Spy::new("a", 5, &log)
                .on(&[EventKind::MessageCreated])
                .shared(),
            Spy::new("b", 5, &log)
                .on(&[EventKind::MessageCreated])
                .shared(),
        ],
    )
    .await;

    harness
        .dispatcher
        .dispatch(chat(500, ALICE, "hello"))
        .await
        .unwrap();

    let mut calls = log.lock().clone();
    calls.sort();
    assert_eq!(calls, vec!["a:message-created", "b:message-created"]);
}

#[tokio::test]
async fn test_rebuild_is_idempotent() {
    let log = call_log();
    let harness = Harness::started(
        config(),
        vec![
            Spy::new("a", 5, &log)
                .on(&[EventKind::MessageCreated, EventKind::Ready])
                .shared(),
            Spy::new("b", 1, &log)
                .on(&[EventKind::MessageCreated])
                .shared(),
        ],
    )
    .await;

    let registry = harness.ctx().registry();
    let before = registry.plan().layout();
    registry.rebuild();
    registry.rebuild();
    assert_eq!(registry.plan().layout(), before);
}

// ========================================================================
// Failure isolation
// ========================================================================

#[tokio::test]
async fn test_failing_extension_is_quarantined() {
    let log = call_log();
    let harness = Harness::started(
        config(),
        vec![
            Spy::new("broken", 0, &log)
                .on(&[EventKind::MessageCreated])
                .behave(Behavior::Fail)
                .shared(),
            Spy::new("healthy", 0, &log)
                .on(&[EventKind::MessageCreated])
                .shared(),
        ],
    )
    .await;

    harness
        .dispatcher
        .dispatch(chat(500, ALICE, "first"))
        .await
        .unwrap();

    let broken = harness.slot("broken");
    assert!(!broken.is_enabled());
    assert_eq!(broken.failures(), 1);
    assert!(harness.slot("healthy").is_enabled());
    assert_eq!(log.lock().len(), 2);

    // One full report to the maintainer, one short notice in the error channel.
    let reports = harness.to_maintainer();
    assert_eq!(reports.len(), 1);
    assert!(reports[0].contains("Extension broken"));
    assert!(reports[0].contains("broken refused"));
    let notices = harness.replies(ERROR_CHANNEL);
    assert_eq!(notices.len(), 1);
    assert!(notices[0].contains(&format!("Reported to <@{}>", MAINTAINER)));

    let active = harness
        .ctx()
        .registry()
        .plan()
        .active_bands(EventKind::MessageCreated);
    assert!(active.iter().all(|b| !b.names().contains(&"broken".to_string())));

    log.lock().clear();
    harness
        .dispatcher
        .dispatch(chat(501, ALICE, "second"))
        .await
        .unwrap();
    assert_eq!(*log.lock(), vec!["healthy:message-created"]);
    assert_eq!(harness.to_maintainer().len(), 1);

    // A restarted extension is back in the call plan.
    assert!(harness.ctx().start_extension(&broken));
    let active = harness
        .ctx()
        .registry()
        .plan()
        .active_bands(EventKind::MessageCreated);
    assert_eq!(active.len(), 1);
    assert_eq!(active[0].names(), vec!["broken", "healthy"]);

    log.lock().clear();
    harness
        .dispatcher
        .dispatch(chat(502, ALICE, "third"))
        .await
        .unwrap();
    let mut calls = log.lock().clone();
    calls.sort();
    assert_eq!(calls, vec!["broken:message-created", "healthy:message-created"]);
}

#[tokio::test]
async fn test_panicking_handler_is_contained() {
    let log = call_log();
    let harness = Harness::started(
        config(),
        vec![
            Spy::new("volatile", 3, &log)
                .on(&[EventKind::MessageCreated])
                .behave(Behavior::Panic)
                .shared(),
            Spy::new("after", 9, &log)
                .on(&[EventKind::MessageCreated])
                .shared(),
        ],
    )
    .await;

    harness
        .dispatcher
        .dispatch(chat(500, ALICE, "hello"))
        .await
        .unwrap();

    let slot = harness.slot("volatile");
    assert!(!slot.is_enabled());
    assert!(slot
        .last_error()
        .is_some_and(|e| e.contains("volatile exploded")));
    assert!(log.lock().contains(&"after:message-created".to_string()));
    assert!(!harness.dispatcher.is_shut_down());
}

#[tokio::test(start_paused = true)]
async fn test_hanging_handler_times_out() {
    let log = call_log();
    let mut cfg = config();
    cfg.handler_timeout_secs = 5;
    let harness = Harness::started(
        cfg,
        vec![Spy::new("stuck", 0, &log)
            .on(&[EventKind::MessageCreated])
            .behave(Behavior::Hang)
            .shared()],
    )
    .await;

    harness
        .dispatcher
        .dispatch(chat(500, ALICE, "hello"))
        .await
        .unwrap();

    let slot = harness.slot("stuck");
    assert!(!slot.is_enabled());
    assert!(slot.last_error().is_some_and(|e| e.contains("Timed out")));
}

// ========================================================================
// Core failures
// ========================================================================

#[tokio::test]
async fn test_store_failure_shuts_engine_down() {
    let log = call_log();
    let harness = Harness::started(
        config(),
        vec![Spy::new("a", 0, &log)
            .on(&[EventKind::MessageCreated])
            .shared()],
    )
    .await;

    harness.store.set_failing(true);
    let err = harness
        .dispatcher
        .dispatch(chat(500, ALICE, "hello"))
        .await
        .unwrap_err();

    assert!(matches!(err, Error::Core { .. }));
    assert!(err.is_fatal());
    assert!(harness.dispatcher.is_shut_down());
    assert!(log.lock().is_empty());
    assert!(!harness.slot("a").is_enabled());

    let reports = harness.to_maintainer();
    assert_eq!(reports.len(), 1);
    assert!(reports[0].contains("Core failed on message-created"));

    harness.store.set_failing(false);
    let err = harness
        .dispatcher
        .dispatch(chat(501, ALICE, "again"))
        .await
        .unwrap_err();
    assert!(matches!(err, Error::ShutDown));
}

#[tokio::test]
async fn test_failed_initial_sync_is_fatal() {
    let harness = Harness::build(config(), Vec::new()).unwrap();
    harness.store.set_failing(true);

    let err = harness.dispatcher.start().await.unwrap_err();
    assert!(matches!(err, Error::Core { .. }));
    assert!(harness.dispatcher.is_shut_down());
}

// ========================================================================
// Startup gate
// ========================================================================

#[tokio::test]
async fn test_dispatch_waits_for_startup() {
    let log = call_log();
    let harness = Arc::new(
        Harness::build(
            config(),
            vec![Spy::new("a", 0, &log)
                .on(&[EventKind::MessageCreated])
                .shared()],
        )
        .unwrap(),
    );

    let pending = {
        let harness = harness.clone();
        tokio::spawn(async move {
            harness
                .dispatcher
                .dispatch(chat(500, ALICE, "early bird"))
                .await
        })
    };

    for _ in 0..10 {
        tokio::task::yield_now().await;
    }
    assert!(!pending.is_finished());
    assert!(log.lock().is_empty());

    harness.dispatcher.start().await.unwrap();
    pending.await.unwrap().unwrap();

    assert_eq!(*log.lock(), vec!["a:message-created"]);
    assert_eq!(harness.store.message_count(), 1);
}

#[tokio::test]
async fn test_ready_runs_after_start() {
    let log = call_log();
    let harness = Harness::build(
        config(),
        vec![Spy::new("a", 0, &log).on(&[EventKind::Ready]).shared()],
    )
    .unwrap();

    harness.dispatcher.start().await.unwrap();

    assert_eq!(*log.lock(), vec!["a:ready"]);
    assert_eq!(harness.to_maintainer(), vec!["Started!".to_string()]);
    assert!(!harness.ctx().sync().is_awaiting());
    assert_eq!(harness.store.user_count(), 4);
}

// ========================================================================
// Guards
// ========================================================================

#[tokio::test]
async fn test_guards_drop_bots_and_foreign_guilds() {
    let log = call_log();
    let harness = Harness::started(
        config(),
        vec![Spy::new("a", 0, &log)
            .on(&[EventKind::MessageCreated])
            .shared()],
    )
    .await;

    let bot = message(500, TEXT_CHANNEL, member(BOT, "helper").as_bot(), "beep");
    harness
        .dispatcher
        .dispatch(RawEvent::MessageCreated(bot))
        .await
        .unwrap();

    let foreign = message(501, TEXT_CHANNEL, Member::new(ALICE, 77, "alice"), "hi");
    harness
        .dispatcher
        .dispatch(RawEvent::MessageCreated(foreign))
        .await
        .unwrap();

    assert!(log.lock().is_empty());
    assert_eq!(harness.store.message_count(), 0);
}

#[tokio::test]
async fn test_unknown_author_is_skipped() {
    let log = call_log();
    let harness = Harness::started(
        config(),
        vec![Spy::new("a", 0, &log)
            .on(&[EventKind::MessageCreated])
            .shared()],
    )
    .await;

    harness
        .dispatcher
        .dispatch(chat(500, 999, "who am i"))
        .await
        .unwrap();

    assert!(log.lock().is_empty());
    assert!(!harness.dispatcher.is_shut_down());
}

// ========================================================================
// Role topology and the awaiting-sync window
// ========================================================================

fn role(id: Snowflake, name: &str) -> Role {
    Role {
        id,
        guild_id: GUILD,
        name: name.to_string(),
    }
}

#[tokio::test]
async fn test_role_burst_sets_awaiting_once() {
    let log = call_log();
    let harness = Harness::started(
        config(),
        vec![Spy::new("a", 0, &log)
            .on(&[
                EventKind::RoleCreated,
                EventKind::RoleUpdated,
                EventKind::MemberJoined,
            ])
            .shared()],
    )
    .await;

    harness
        .dispatcher
        .dispatch(RawEvent::RoleCreated(role(60, "Veteran")))
        .await
        .unwrap();
    harness
        .dispatcher
        .dispatch(RawEvent::RoleUpdated {
            before: role(51, "Member"),
            after: role(51, "Members"),
        })
        .await
        .unwrap();

    assert!(harness.ctx().sync().is_awaiting());
    assert_eq!(*log.lock(), vec!["a:role-created"]);
    let warnings = harness.replies(ERROR_CHANNEL);
    assert_eq!(warnings.len(), 1);
    assert!(warnings[0].contains("New role detected. Awaiting role synchronization."));

    // Joins are skipped until the next resync.
    let newcomer = member(7, "newcomer");
    harness.platform.insert_member(newcomer.clone());
    harness
        .dispatcher
        .dispatch(RawEvent::MemberJoined(newcomer.clone()))
        .await
        .unwrap();
    assert_eq!(log.lock().len(), 1);
    assert_eq!(harness.store.user_count(), 4);

    harness.dispatcher.resync().await.unwrap();
    assert!(!harness.ctx().sync().is_awaiting());
    assert_eq!(harness.store.user_count(), 5);

    let latecomer = member(8, "latecomer");
    harness
        .dispatcher
        .dispatch(RawEvent::MemberJoined(latecomer))
        .await
        .unwrap();
    assert_eq!(log.lock().last().map(String::as_str), Some("a:member-joined"));
    assert_eq!(harness.store.activity(ActivityKind::MemberJoin).len(), 1);
}

/// Platform whose role fetch can be held open to pin a resync mid-flight.
struct HeldPlatform {
    inner: Arc<RecordingPlatform>,
    hold: AtomicBool,
    entered: Notify,
    release: Notify,
}

impl HeldPlatform {
    fn new(inner: Arc<RecordingPlatform>) -> Self {
        Self {
            inner,
            hold: AtomicBool::new(false),
            entered: Notify::new(),
            release: Notify::new(),
        }
    }
}

#[async_trait::async_trait]
impl Platform for HeldPlatform {
    async fn send_message(&self, target: Target, content: &str) -> std::result::Result<(), PlatformError> {
        self.inner.send_message(target, content).await
    }

    async fn add_role(&self, member_id: Snowflake, role: &str) -> std::result::Result<(), PlatformError> {
        self.inner.add_role(member_id, role).await
    }

    async fn remove_role(&self, member_id: Snowflake, role: &str) -> std::result::Result<(), PlatformError> {
        self.inner.remove_role(member_id, role).await
    }

    async fn fetch_member(&self, member_id: Snowflake) -> std::result::Result<Option<Member>, PlatformError> {
        self.inner.fetch_member(member_id).await
    }

    async fn fetch_members(&self) -> std::result::Result<Vec<Member>, PlatformError> {
        self.inner.fetch_members().await
    }

    async fn fetch_roles(&self) -> std::result::Result<Vec<Role>, PlatformError> {
        let roles = self.inner.fetch_roles().await;
        if self.hold.load(Ordering::SeqCst) {
            self.entered.notify_one();
            self.release.notified().await;
        }
        roles
    }

    async fn fetch_message(
        &self,
        channel_id: Snowflake,
        message_id: Snowflake,
    ) -> std::result::Result<Option<Message>, PlatformError> {
        self.inner.fetch_message(channel_id, message_id).await
    }
}

#[tokio::test]
async fn test_role_change_during_resync_is_not_lost() {
    let recording = seeded_platform();
    let platform = Arc::new(HeldPlatform::new(recording.clone()));
    let store = Arc::new(MemoryStore::new());
    let dispatcher = Arc::new(
        CoreDispatcher::builder(platform.clone(), store.clone(), config())
            .build()
            .unwrap(),
    );
    dispatcher.start().await.unwrap();
    assert!(!dispatcher.context().sync().is_awaiting());

    // Roles are fetched, then the resync stalls before storing them.
    platform.hold.store(true, Ordering::SeqCst);
    let resync = {
        let ctx = dispatcher.context().clone();
        tokio::spawn(async move { ctx.resync().await })
    };
    platform.entered.notified().await;
    platform.hold.store(false, Ordering::SeqCst);

    recording.insert_role(role(60, "Veteran"));
    let change = {
        let dispatcher = dispatcher.clone();
        tokio::spawn(async move {
            dispatcher
                .dispatch(RawEvent::RoleCreated(role(60, "Veteran")))
                .await
        })
    };
    for _ in 0..10 {
        tokio::task::yield_now().await;
    }
    // The role change waits for the resync holding the lock.
    assert!(!change.is_finished());

    platform.release.notify_one();
    resync.await.unwrap().unwrap();
    change.await.unwrap().unwrap();

    let ctx = dispatcher.context();
    assert!(ctx.sync().is_awaiting());
    assert!(store.get_role("Veteran").await.unwrap().is_none());

    ctx.resync().await.unwrap();
    assert!(!ctx.sync().is_awaiting());
    assert!(store.get_role("Veteran").await.unwrap().is_some());
}

// ========================================================================
// Persistence of individual event kinds
// ========================================================================

#[tokio::test]
async fn test_member_leave_keeps_absent_user() {
    let log = call_log();
    let harness = Harness::started(
        config(),
        vec![Spy::new("a", 0, &log).on(&[EventKind::MemberLeft]).shared()],
    )
    .await;

    harness
        .dispatcher
        .dispatch(RawEvent::MemberLeft(member(ALICE, "alice")))
        .await
        .unwrap();

    let user = harness.store.get_user(ALICE).await.unwrap().unwrap();
    assert!(user.absent);
    assert_eq!(harness.store.activity(ActivityKind::MemberLeave).len(), 1);
    assert_eq!(*log.lock(), vec!["a:member-left"]);
}

#[tokio::test]
async fn test_member_leave_removes_user_when_configured() {
    let log = call_log();
    let mut cfg = config();
    cfg.keep_absent_users = false;
    let harness = Harness::started(
        cfg,
        vec![Spy::new("a", 0, &log).on(&[EventKind::MemberLeft]).shared()],
    )
    .await;

    harness
        .dispatcher
        .dispatch(RawEvent::MemberLeft(member(BOB, "bob")))
        .await
        .unwrap();

    assert!(harness.store.get_user(BOB).await.unwrap().is_none());
    assert!(harness.store.activity(ActivityKind::MemberLeave).is_empty());
    assert_eq!(*log.lock(), vec!["a:member-left"]);
}

#[tokio::test]
async fn test_member_update_refreshes_roles() {
    let log = call_log();
    let harness = Harness::started(
        config(),
        vec![Spy::new("a", 0, &log)
            .on(&[EventKind::MemberUpdated])
            .shared()],
    )
    .await;

    let before = member(BOB, "bob");
    let after = member(BOB, "bob").with_roles(["Member"]);
    harness
        .dispatcher
        .dispatch(RawEvent::MemberUpdated {
            before: before.clone(),
            after,
        })
        .await
        .unwrap();
    // Nothing relevant changed.
    harness
        .dispatcher
        .dispatch(RawEvent::MemberUpdated {
            before: before.clone(),
            after: before,
        })
        .await
        .unwrap();

    let user = harness.store.get_user(BOB).await.unwrap().unwrap();
    assert_eq!(user.roles, vec!["Member".to_string()]);
    assert_eq!(*log.lock(), vec!["a:member-updated"]);
}

#[tokio::test]
async fn test_message_edit_and_delete() {
    let log = call_log();
    let harness = Harness::started(
        config(),
        vec![Spy::new("a", 0, &log)
            .on(&[EventKind::MessageEdited, EventKind::MessageDeleted])
            .shared()],
    )
    .await;

    harness
        .dispatcher
        .dispatch(chat(500, ALICE, "typo"))
        .await
        .unwrap();

    let reference = |id| MessageRef {
        message_id: id,
        channel_id: TEXT_CHANNEL,
    };
    harness
        .dispatcher
        .dispatch(RawEvent::MessageEdited(reference(500)))
        .await
        .unwrap();
    harness
        .dispatcher
        .dispatch(RawEvent::MessageDeleted(reference(500)))
        .await
        .unwrap();
    // Unknown message.
    harness
        .dispatcher
        .dispatch(RawEvent::MessageDeleted(reference(404)))
        .await
        .unwrap();

    assert_eq!(*log.lock(), vec!["a:message-edited", "a:message-deleted"]);
    assert_eq!(harness.store.message_count(), 0);
    assert_eq!(harness.store.activity(ActivityKind::MessageEdit).len(), 1);
}

#[tokio::test]
async fn test_edits_in_control_channel_are_ignored() {
    let log = call_log();
    let harness = Harness::started(
        config(),
        vec![Spy::new("a", 0, &log)
            .on(&[EventKind::MessageEdited])
            .shared()],
    )
    .await;

    harness
        .dispatcher
        .dispatch(RawEvent::MessageEdited(MessageRef {
            message_id: 900,
            channel_id: CONTROL_CHANNEL,
        }))
        .await
        .unwrap();
    assert!(log.lock().is_empty());
}

#[tokio::test]
async fn test_reactions_from_members_only() {
    let log = call_log();
    let harness = Harness::started(
        config(),
        vec![Spy::new("a", 0, &log)
            .on(&[EventKind::ReactionAdded, EventKind::ReactionRemoved])
            .shared()],
    )
    .await;

    let original = message(500, TEXT_CHANNEL, member(ALICE, "alice"), "vote here");
    harness.platform.insert_message(original.clone());
    harness
        .dispatcher
        .dispatch(RawEvent::MessageCreated(original))
        .await
        .unwrap();

    let reaction = |user_id| Reaction {
        user_id,
        channel_id: TEXT_CHANNEL,
        message_id: 500,
        emoji: "+1".to_string(),
    };
    harness
        .dispatcher
        .dispatch(RawEvent::ReactionAdded(reaction(BOB)))
        .await
        .unwrap();
    harness
        .dispatcher
        .dispatch(RawEvent::ReactionRemoved(reaction(BOB)))
        .await
        .unwrap();
    harness
        .dispatcher
        .dispatch(RawEvent::ReactionAdded(reaction(BOT)))
        .await
        .unwrap();

    assert_eq!(*log.lock(), vec!["a:reaction-added", "a:reaction-removed"]);
    assert_eq!(harness.store.activity(ActivityKind::ReactionAdd).len(), 1);
    assert_eq!(harness.store.activity(ActivityKind::ReactionRemove).len(), 1);
}

#[tokio::test]
async fn test_control_reactions_are_routed_without_persistence() {
    let log = call_log();
    let harness = Harness::started(
        config(),
        vec![Spy::new("a", 0, &log)
            .on(&[
                EventKind::ControlReactionAdded,
                EventKind::ReactionAdded,
                EventKind::ReactionRemoved,
            ])
            .shared()],
    )
    .await;

    let admin = member(ADMIN, "admin").with_roles(["Overlord"]);
    harness
        .platform
        .insert_message(message(600, CONTROL_CHANNEL, admin, "confirm?"));
    let mut direct = message(601, 40, member(BOT, "overlord"), "report");
    direct.guild_id = None;
    harness.platform.insert_message(direct);

    let reaction = |user_id, channel_id, message_id| Reaction {
        user_id,
        channel_id,
        message_id,
        emoji: "ok".to_string(),
    };
    for event in [
        RawEvent::ReactionAdded(reaction(ADMIN, CONTROL_CHANNEL, 600)),
        RawEvent::ReactionRemoved(reaction(ADMIN, CONTROL_CHANNEL, 600)),
        RawEvent::ReactionAdded(reaction(BOT, CONTROL_CHANNEL, 600)),
        RawEvent::ReactionAdded(reaction(MAINTAINER, 40, 601)),
        // Only the maintainer's DM reactions are control reactions.
        RawEvent::ReactionAdded(reaction(ALICE, 40, 601)),
    ] {
        harness.dispatcher.dispatch(event).await.unwrap();
    }

    assert_eq!(
        *log.lock(),
        vec!["a:control-reaction-added", "a:control-reaction-added"]
    );
    assert!(harness.store.activity(ActivityKind::ReactionAdd).is_empty());
    assert!(harness.store.activity(ActivityKind::ReactionRemove).is_empty());
}

#[tokio::test]
async fn test_voice_sessions_skip_afk() {
    let log = call_log();
    let harness = Harness::started(
        config(),
        vec![Spy::new("a", 0, &log)
            .on(&[EventKind::VoiceStateChanged])
            .shared()],
    )
    .await;

    let state = |channel_id, afk| VoiceState { channel_id, afk };
    let change = |before, after| RawEvent::VoiceStateChanged {
        member: member(ALICE, "alice"),
        before,
        after,
    };

    harness
        .dispatcher
        .dispatch(change(state(None, false), state(Some(VOICE_CHANNEL), false)))
        .await
        .unwrap();
    harness
        .dispatcher
        .dispatch(change(
            state(Some(VOICE_CHANNEL), false),
            state(Some(AFK_CHANNEL), true),
        ))
        .await
        .unwrap();
    harness
        .dispatcher
        .dispatch(change(state(Some(AFK_CHANNEL), true), state(None, false)))
        .await
        .unwrap();

    assert_eq!(log.lock().len(), 2);
    let joins = harness.store.activity(ActivityKind::VoiceJoin);
    let leaves = harness.store.activity(ActivityKind::VoiceLeave);
    assert_eq!(joins.len(), 1);
    assert_eq!(leaves.len(), 1);
    assert_eq!(joins[0].channel_id, Some(VOICE_CHANNEL));
}

#[tokio::test]
async fn test_run_consumes_channel_until_closed() {
    let log = call_log();
    let harness = Harness::started(
        config(),
        vec![Spy::new("a", 0, &log)
            .on(&[EventKind::MessageCreated])
            .shared()],
    )
    .await;

    let (tx, rx) = tokio::sync::mpsc::channel(8);
    for id in 0..3 {
        tx.send(chat(500 + id, ALICE, "spam")).await.unwrap();
    }
    drop(tx);

    tokio::time::timeout(Duration::from_secs(5), harness.dispatcher.run(rx))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(log.lock().len(), 3);
}
