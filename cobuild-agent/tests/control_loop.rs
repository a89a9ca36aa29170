//! Control loop behaviour against in-memory fakes, on virtual time.

use cobuild_agent::{
    AgentIdentity, CheckpointCoordinator, CheckpointOutcome, ControlLoop, HubApi, LoopSettings,
    RetryPolicy, RunSummary, TerminationReason, TerminationSignal, WorldEvent,
};
use cobuild_core::{Checkpoint, PlannerError, StartupError, NOT_STARTED_MEMO};
use cobuild_hub::HubState;
use cobuild_storage::CheckpointStore;
use cobuild_test_utils::fixtures::{hub_state, pair, plan_json, region};
use cobuild_test_utils::{
    BlockPos, InMemoryHub, PairId, PreparedWorld, RecordingArchiver, RecordingWorld, Role,
    ScriptedPlanner, UnreachableHub, UnreachableWorld, WorldAction,
};
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;
use tokio::sync::mpsc;

type TestResult = Result<(), Box<dyn std::error::Error>>;

fn settings(max_attempts: u32) -> LoopSettings {
    LoopSettings {
        period: Duration::from_secs(15),
        partner_window: 2,
        spawn_timeout: Duration::from_secs(1),
        retry: RetryPolicy {
            initial: Duration::from_secs(2),
            max: Duration::from_secs(10),
            multiplier: 1.5,
            max_attempts,
        },
    }
}

struct Harness {
    _dir: TempDir,
    pair: PairId,
    state: Arc<HubState>,
    world: Arc<RecordingWorld>,
    connector: Arc<PreparedWorld>,
    world_events: mpsc::Sender<WorldEvent>,
    archiver: Arc<RecordingArchiver>,
    planner: Arc<ScriptedPlanner>,
    store: CheckpointStore,
    control: Option<ControlLoop>,
}

impl Harness {
    fn new(role: Role, planner: ScriptedPlanner) -> Result<Self, Box<dyn std::error::Error>> {
        Self::build(role, planner, RecordingArchiver::default(), None, 5)
    }

    fn build(
        role: Role,
        planner: ScriptedPlanner,
        archiver: RecordingArchiver,
        hub: Option<Arc<dyn HubApi>>,
        max_attempts: u32,
    ) -> Result<Self, Box<dyn std::error::Error>> {
        let dir = tempfile::tempdir()?;
        let pair = pair(1);
        let identity = AgentIdentity::new(pair, role, None);
        let state = hub_state(dir.path(), 5);
        let hub = hub.unwrap_or_else(|| Arc::new(InMemoryHub::new(state.clone())));
        let (world, connector, world_events) = RecordingWorld::connect(&identity.name);
        let archiver = Arc::new(archiver);
        let planner = Arc::new(planner);
        // Hub and agent share the directory, as when both run on one host.
        let store = CheckpointStore::new(dir.path());
        let coordinator = CheckpointCoordinator::new(role, pair, store.clone(), archiver.clone());
        let control = ControlLoop::new(
            identity,
            settings(max_attempts),
            hub,
            planner.clone(),
            connector.clone(),
            coordinator,
        );
        Ok(Self {
            _dir: dir,
            pair,
            state,
            world,
            connector,
            world_events,
            archiver,
            planner,
            store,
            control: Some(control),
        })
    }

    /// Run until the deadline fires `after` from now.
    async fn run_for(&mut self, after: Duration) -> Result<RunSummary, StartupError> {
        let signal = TerminationSignal::new();
        let _deadline = signal.spawn_deadline(after);
        self.run_with(signal).await
    }

    async fn run_with(&mut self, signal: TerminationSignal) -> Result<RunSummary, StartupError> {
        match self.control.take() {
            Some(control) => control.run(signal.subscribe()).await,
            None => panic!("control loop already ran"),
        }
    }
}

fn inside() -> BlockPos {
    BlockPos::new(110, 64, 110)
}

// ============================================================================
// ACTING
// ============================================================================

#[tokio::test(start_paused = true)]
async fn in_bounds_plan_places_block_and_reports() -> TestResult {
    let planner = ScriptedPlanner::always(plan_json("stone", inside(), Some("left pillar"), Some("pillar 1/4")));
    let mut h = Harness::new(Role::B, planner)?;

    // Cycles at t=0 and t=15s, deadline during the second sleep.
    let summary = h.run_for(Duration::from_secs(20)).await?;
    assert_eq!(summary.reason, TerminationReason::Deadline);
    assert!(summary.resolved);
    assert_eq!(summary.cycles, 2);
    assert_eq!(summary.memo, "pillar 1/4");

    let actions = h.world.actions();
    assert_eq!(actions[0], WorldAction::MoveTo(region(h.pair).arrival_point()));
    assert_eq!(actions[1], WorldAction::Say("(Team) left pillar".to_string()));
    assert_eq!(actions[2], WorldAction::Place(inside(), "stone".to_string()));
    assert_eq!(h.world.placements().len(), 2);

    let report = h.state.latest_report(h.pair).ok_or("no report")?;
    assert_eq!(report.name, "Bot-1-B");
    assert_eq!(report.msg, "pillar 1/4");

    let chat: Vec<_> = h.state.chat(h.pair).collect();
    assert_eq!(chat.len(), 2);
    assert!(chat.iter().all(|m| m.from == "Bot-1-B" && m.text == "left pillar"));
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn plan_without_status_reports_building() -> TestResult {
    let planner = ScriptedPlanner::always(plan_json("oak_planks", inside(), None, None));
    let mut h = Harness::new(Role::B, planner)?;

    let summary = h.run_for(Duration::from_secs(5)).await?;
    assert_eq!(summary.cycles, 1);
    assert_eq!(summary.memo, "building");
    assert_eq!(
        h.state.latest_report(h.pair).map(|r| r.msg),
        Some("building".to_string())
    );
    assert!(h.state.chat(h.pair).next().is_none());
    assert!(!h.world.actions().iter().any(|a| matches!(a, WorldAction::Say(_))));
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn out_of_bounds_plan_is_reported_but_not_placed() -> TestResult {
    let planner = ScriptedPlanner::always(plan_json("stone", BlockPos::new(200, 64, 110), None, None));
    let mut h = Harness::new(Role::B, planner)?;

    let summary = h.run_for(Duration::from_secs(5)).await?;
    assert!(h.world.placements().is_empty());
    assert_eq!(
        h.state.latest_report(h.pair).map(|r| r.msg),
        Some("skipped: out of bounds (200,64,110)".to_string())
    );
    assert_eq!(summary.memo, NOT_STARTED_MEMO);
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn planner_and_decode_failures_skip_the_cycle() -> TestResult {
    let planner = ScriptedPlanner::new([
        Err(PlannerError::Timeout {
            provider: "ollama".to_string(),
            elapsed: Duration::from_secs(60),
        }),
        Ok(r#"{"chat":"hi"}"#.to_string()),
        Ok("I think we should build a wall".to_string()),
    ]);
    let mut h = Harness::new(Role::B, planner)?;

    let summary = h.run_for(Duration::from_secs(40)).await?;
    assert_eq!(summary.cycles, 3);
    assert_eq!(h.planner.prompts().len(), 3);
    assert!(h.state.latest_report(h.pair).is_none());
    assert!(h.state.chat(h.pair).next().is_none());
    // Only the initial move reached the world.
    assert_eq!(h.world.actions().len(), 1);
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn prompt_carries_partner_lines_and_last_memo() -> TestResult {
    let planner = ScriptedPlanner::always(plan_json("stone", inside(), None, Some("gate arch")));
    let mut h = Harness::new(Role::B, planner)?;
    h.store.write(&Checkpoint::new(h.pair, "gate frame done")).await?;
    h.state.post_chat(h.pair, Some("Bot-1-A".to_string()), Some("I'll take the left pillar".to_string()))?;
    h.state.post_chat(h.pair, Some("Bot-1-B".to_string()), Some("my own earlier line".to_string()))?;
    h.world_events
        .send(WorldEvent::ChatReceived {
            sender: "Bot-1-A".to_string(),
            text: "(Team) meet at the gate".to_string(),
        })
        .await?;
    h.world_events
        .send(WorldEvent::ChatReceived {
            sender: "Steve".to_string(),
            text: "hello bots".to_string(),
        })
        .await?;

    h.run_for(Duration::from_secs(5)).await?;
    let prompts = h.planner.prompts();
    let first = prompts.first().ok_or("planner never called")?;
    assert!(first.contains("I'll take the left pillar"));
    assert!(first.contains("meet at the gate"));
    assert!(!first.contains("(Team) meet"));
    assert!(!first.contains("my own earlier line"));
    assert!(!first.contains("hello bots"));
    assert!(first.contains("gate frame done"));
    assert!(first.contains("Bot-1-A"));
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn lost_session_does_not_stop_the_loop() -> TestResult {
    let planner = ScriptedPlanner::always(plan_json("stone", inside(), None, None));
    let mut h = Harness::new(Role::B, planner)?;
    h.world_events
        .send(WorldEvent::Disconnected {
            reason: "kicked".to_string(),
        })
        .await?;

    let summary = h.run_for(Duration::from_secs(40)).await?;
    assert_eq!(summary.cycles, 3);
    assert_eq!(h.world.placements().len(), 3);
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn failing_world_actions_still_report() -> TestResult {
    let dir = tempfile::tempdir()?;
    let p = pair(1);
    let state = hub_state(dir.path(), 5);
    let (_world, connector, _events) = RecordingWorld::broken("Bot-1-B");
    let control = ControlLoop::new(
        AgentIdentity::new(p, Role::B, None),
        settings(5),
        Arc::new(InMemoryHub::new(state.clone())),
        Arc::new(ScriptedPlanner::always(plan_json("stone", inside(), None, Some("wall")))),
        connector,
        CheckpointCoordinator::new(
            Role::B,
            p,
            CheckpointStore::new(dir.path()),
            Arc::new(RecordingArchiver::default()),
        ),
    );
    let signal = TerminationSignal::new();
    let _deadline = signal.spawn_deadline(Duration::from_secs(5));

    let summary = control.run(signal.subscribe()).await?;
    assert_eq!(summary.cycles, 1);
    assert_eq!(state.latest_report(p).map(|r| r.msg), Some("wall".to_string()));
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn world_down_at_startup_still_checkpoints_at_deadline() -> TestResult {
    let dir = tempfile::tempdir()?;
    let p = pair(1);
    let state = hub_state(dir.path(), 5);
    let world = Arc::new(UnreachableWorld::default());
    let archiver = Arc::new(RecordingArchiver::default());
    let control = ControlLoop::new(
        AgentIdentity::new(p, Role::A, None),
        settings(5),
        Arc::new(InMemoryHub::new(state.clone())),
        Arc::new(ScriptedPlanner::always(plan_json("stone", inside(), None, Some("floor")))),
        world.clone(),
        CheckpointCoordinator::new(Role::A, p, CheckpointStore::new(dir.path()), archiver.clone()),
    );
    let signal = TerminationSignal::new();
    let _deadline = signal.spawn_deadline(Duration::from_secs(20));

    let summary = control.run(signal.subscribe()).await?;
    assert_eq!(summary.reason, TerminationReason::Deadline);
    assert!(summary.resolved);
    assert_eq!(summary.cycles, 2);
    assert_eq!(world.attempts(), 1);
    assert_eq!(
        summary.checkpoint,
        Some(CheckpointOutcome::Archived {
            key: "progress_p1".to_string()
        })
    );
    assert_eq!(archiver.save_count(), 1);
    // Reports keep flowing while the world is down.
    assert_eq!(state.latest_report(p).map(|r| r.msg), Some("floor".to_string()));
    Ok(())
}

// ============================================================================
// RESOLVING
// ============================================================================

#[tokio::test(start_paused = true)]
async fn unreachable_hub_fails_after_retry_cap() -> TestResult {
    let mut h = Harness::build(
        Role::A,
        ScriptedPlanner::default(),
        RecordingArchiver::default(),
        Some(Arc::new(UnreachableHub)),
        5,
    )?;

    let started = tokio::time::Instant::now();
    let result = h.run_for(Duration::from_secs(3300)).await;
    match result {
        Err(StartupError::HubUnreachable { url, attempts, .. }) => {
            assert_eq!(url, "http://unreachable.invalid");
            assert_eq!(attempts, 5);
        }
        other => panic!("expected HubUnreachable, got {:?}", other),
    }
    // 2 + 3 + 4.5 + 6.75 seconds of backoff between five attempts.
    let elapsed = started.elapsed();
    assert!(elapsed >= Duration::from_millis(16_250) && elapsed < Duration::from_secs(17));
    assert!(h.world.actions().is_empty());
    assert_eq!(h.connector.attempts(), 0);
    assert_eq!(h.archiver.save_count(), 0);
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn hub_that_comes_up_late_is_resolved() -> TestResult {
    let dir = tempfile::tempdir()?;
    let state = hub_state(dir.path(), 5);
    let hub: Arc<dyn HubApi> = Arc::new(InMemoryHub::new(state.clone()).failing_first(3));
    let mut h = Harness::build(
        Role::B,
        ScriptedPlanner::always(plan_json("stone", inside(), None, None)),
        RecordingArchiver::default(),
        Some(hub),
        5,
    )?;

    let summary = h.run_for(Duration::from_secs(20)).await?;
    assert!(summary.resolved);
    // 2 + 3 + 4.5 = 9.5s resolving, then one cycle before the deadline.
    assert_eq!(summary.cycles, 1);
    assert!(state.latest_report(h.pair).is_some());
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn deadline_while_resolving_skips_checkpoint() -> TestResult {
    let mut h = Harness::build(
        Role::A,
        ScriptedPlanner::default(),
        RecordingArchiver::default(),
        Some(Arc::new(UnreachableHub)),
        60,
    )?;

    let summary = h.run_for(Duration::from_secs(10)).await?;
    assert_eq!(summary.reason, TerminationReason::Deadline);
    assert!(!summary.resolved);
    assert_eq!(summary.checkpoint, None);
    assert_eq!(h.archiver.save_count(), 0);
    Ok(())
}

// ============================================================================
// CHECKPOINTING
// ============================================================================

#[tokio::test(start_paused = true)]
async fn role_a_archives_exactly_once_at_deadline() -> TestResult {
    let planner = ScriptedPlanner::always(plan_json("stone", inside(), None, Some("left wall 3/5")));
    let mut h = Harness::new(Role::A, planner)?;

    let summary = h.run_for(Duration::from_secs(40)).await?;
    assert_eq!(
        summary.checkpoint,
        Some(CheckpointOutcome::Archived {
            key: "progress_p1".to_string()
        })
    );

    let saves = h.archiver.saves();
    assert_eq!(saves.len(), 1);
    let archived: Checkpoint = serde_json::from_slice(&saves[0].1)?;
    assert_eq!(archived.pair_id, h.pair);
    assert_eq!(archived.memo, "left wall 3/5");

    // The next run of the pair resumes from this memo.
    let config = h.state.task_config(h.pair).await?;
    assert_eq!(config.last_memo, "left wall 3/5");
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn role_b_never_archives() -> TestResult {
    let planner = ScriptedPlanner::always(plan_json("stone", inside(), None, Some("right wall")));
    let mut h = Harness::new(Role::B, planner)?;

    let summary = h.run_for(Duration::from_secs(40)).await?;
    assert_eq!(summary.checkpoint, Some(CheckpointOutcome::Skipped));
    assert_eq!(h.archiver.save_count(), 0);
    assert_eq!(h.store.load(h.pair).await?, None);
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn archive_failure_still_terminates_cleanly() -> TestResult {
    let mut h = Harness::build(
        Role::A,
        ScriptedPlanner::always(plan_json("stone", inside(), None, None)),
        RecordingArchiver::failing(),
        None,
        5,
    )?;

    let summary = h.run_for(Duration::from_secs(20)).await?;
    assert_eq!(summary.reason, TerminationReason::Deadline);
    assert!(matches!(summary.checkpoint, Some(CheckpointOutcome::ArchiveFailed { .. })));
    assert_eq!(h.archiver.save_count(), 1);
    // The local checkpoint survives the failed archive.
    assert_eq!(h.store.load(h.pair).await?.map(|c| c.memo), Some("building".to_string()));
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn interrupt_ends_run_without_checkpoint() -> TestResult {
    let planner = ScriptedPlanner::always(plan_json("stone", inside(), None, None));
    let mut h = Harness::new(Role::A, planner)?;

    let signal = TerminationSignal::new();
    let _deadline = signal.spawn_deadline(Duration::from_secs(3300));
    let interrupt = signal.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_secs(20)).await;
        interrupt.request(TerminationReason::Interrupted);
    });

    let summary = h.run_with(signal).await?;
    assert_eq!(summary.reason, TerminationReason::Interrupted);
    assert_eq!(summary.cycles, 2);
    assert_eq!(summary.checkpoint, None);
    assert_eq!(h.archiver.save_count(), 0);
    Ok(())
}
