//! COBUILD Test Utilities
//!
//! Shared test infrastructure for the COBUILD workspace:
//! - Fakes for every capability the control loop drives (hub, planner,
//!   world session, archiver)
//! - Proptest generators for pair ids, positions and planner answers
//! - Fixtures for common scenarios

pub use cobuild_core::{
    ActionPlan, BlockPos, ChatMessage, Checkpoint, PairId, PartitionConfig, PlannerError,
    ProgressReport, Role, TaskConfig, WorkspaceRegion,
};

use async_trait::async_trait;
use cobuild_agent::{
    HubApi, HubClientError, WorldConnection, WorldConnector, WorldEvent, WorldSession,
};
use cobuild_core::{AgentError, ArchiveError};
use cobuild_hub::HubState;
use cobuild_llm::Planner;
use cobuild_storage::Archiver;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::mpsc;

fn locked<T: Clone>(mutex: &Mutex<T>) -> T {
    match mutex.lock() {
        Ok(guard) => guard.clone(),
        Err(poisoned) => poisoned.into_inner().clone(),
    }
}

fn with_lock<T>(mutex: &Mutex<T>, f: impl FnOnce(&mut T)) {
    match mutex.lock() {
        Ok(mut guard) => f(&mut guard),
        Err(poisoned) => f(&mut poisoned.into_inner()),
    }
}

// ============================================================================
// PLANNER
// ============================================================================

/// Planner that replays scripted answers in order.
///
/// Once the script runs out every call returns the fallback answer, or an
/// `Unreachable` error when there is none.
#[derive(Debug, Default)]
pub struct ScriptedPlanner {
    script: Mutex<VecDeque<Result<String, PlannerError>>>,
    fallback: Option<Result<String, PlannerError>>,
    prompts: Mutex<Vec<String>>,
}

impl ScriptedPlanner {
    pub fn new(script: impl IntoIterator<Item = Result<String, PlannerError>>) -> Self {
        Self {
            script: Mutex::new(script.into_iter().collect()),
            fallback: None,
            prompts: Mutex::new(Vec::new()),
        }
    }

    /// Answer `raw` on every call.
    pub fn always(raw: impl Into<String>) -> Self {
        Self::new(Vec::<Result<String, PlannerError>>::new()).with_fallback(Ok(raw.into()))
    }

    pub fn with_fallback(mut self, fallback: Result<String, PlannerError>) -> Self {
        self.fallback = Some(fallback);
        self
    }

    /// Every prompt received so far.
    pub fn prompts(&self) -> Vec<String> {
        locked(&self.prompts)
    }
}

#[async_trait]
impl Planner for ScriptedPlanner {
    async fn propose(&self, prompt: &str) -> Result<String, PlannerError> {
        with_lock(&self.prompts, |p| p.push(prompt.to_string()));
        let mut next = None;
        with_lock(&self.script, |s| next = s.pop_front());
        match next.or_else(|| self.fallback.clone()) {
            Some(answer) => answer,
            None => Err(PlannerError::Unreachable {
                provider: "scripted".to_string(),
                reason: "script exhausted".to_string(),
            }),
        }
    }

    fn provider(&self) -> &str {
        "scripted"
    }
}

// ============================================================================
// WORLD SESSION
// ============================================================================

/// Action performed against a [`RecordingWorld`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WorldAction {
    Say(String),
    Place(BlockPos, String),
    MoveTo(BlockPos),
}

/// World session that records actions instead of performing them.
#[derive(Debug, Default)]
pub struct RecordingWorld {
    name: String,
    actions: Mutex<Vec<WorldAction>>,
    fail_actions: bool,
}

impl RecordingWorld {
    /// A session for `name` that has already emitted `Spawned`.
    ///
    /// Returns the recorder, the connector for the control loop and the
    /// sender used to inject further events.
    pub fn connect(name: &str) -> (Arc<Self>, Arc<PreparedWorld>, mpsc::Sender<WorldEvent>) {
        Self::build(name, false)
    }

    /// Like [`RecordingWorld::connect`] but every action fails.
    pub fn broken(name: &str) -> (Arc<Self>, Arc<PreparedWorld>, mpsc::Sender<WorldEvent>) {
        Self::build(name, true)
    }

    fn build(name: &str, fail_actions: bool) -> (Arc<Self>, Arc<PreparedWorld>, mpsc::Sender<WorldEvent>) {
        let world = Arc::new(Self {
            name: name.to_string(),
            actions: Mutex::new(Vec::new()),
            fail_actions,
        });
        let (tx, rx) = mpsc::channel(cobuild_agent::world::EVENT_BUFFER);
        let _ = tx.try_send(WorldEvent::Spawned);
        let connection = WorldConnection {
            session: world.clone(),
            events: rx,
        };
        (world, Arc::new(PreparedWorld::new(connection)), tx)
    }

    pub fn actions(&self) -> Vec<WorldAction> {
        locked(&self.actions)
    }

    pub fn placements(&self) -> Vec<(BlockPos, String)> {
        self.actions()
            .into_iter()
            .filter_map(|a| match a {
                WorldAction::Place(pos, block) => Some((pos, block)),
                _ => None,
            })
            .collect()
    }

    fn perform(&self, action: WorldAction) -> Result<(), AgentError> {
        if self.fail_actions {
            return Err(AgentError::SessionLost {
                agent: self.name.clone(),
                reason: "disconnected".to_string(),
            });
        }
        with_lock(&self.actions, |a| a.push(action));
        Ok(())
    }
}

#[async_trait]
impl WorldSession for RecordingWorld {
    async fn say(&self, text: &str) -> Result<(), AgentError> {
        self.perform(WorldAction::Say(text.to_string()))
    }

    async fn place_block(&self, pos: BlockPos, block: &str) -> Result<(), AgentError> {
        self.perform(WorldAction::Place(pos, block.to_string()))
    }

    async fn move_to(&self, pos: BlockPos) -> Result<(), AgentError> {
        self.perform(WorldAction::MoveTo(pos))
    }
}

/// Connector that hands out one ready-made connection and counts attempts.
#[derive(Debug)]
pub struct PreparedWorld {
    connection: Mutex<Option<WorldConnection>>,
    attempts: AtomicU32,
}

impl PreparedWorld {
    pub fn new(connection: WorldConnection) -> Self {
        Self {
            connection: Mutex::new(Some(connection)),
            attempts: AtomicU32::new(0),
        }
    }

    pub fn attempts(&self) -> u32 {
        self.attempts.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl WorldConnector for PreparedWorld {
    async fn connect(&self) -> Result<WorldConnection, AgentError> {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        let mut taken = None;
        with_lock(&self.connection, |c| taken = c.take());
        taken.ok_or_else(|| AgentError::SessionLost {
            agent: "prepared".to_string(),
            reason: "connection already handed out".to_string(),
        })
    }
}

/// Connector for a world server that is down.
#[derive(Debug, Default)]
pub struct UnreachableWorld {
    attempts: AtomicU32,
}

impl UnreachableWorld {
    pub fn attempts(&self) -> u32 {
        self.attempts.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl WorldConnector for UnreachableWorld {
    async fn connect(&self) -> Result<WorldConnection, AgentError> {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        Err(AgentError::SessionLost {
            agent: "unreachable".to_string(),
            reason: "connect to 127.0.0.1:1 failed: Connection refused".to_string(),
        })
    }
}

// ============================================================================
// ARCHIVER
// ============================================================================

/// Archiver that counts saves and optionally fails them.
#[derive(Debug, Default)]
pub struct RecordingArchiver {
    saved: Mutex<Vec<(String, Vec<u8>)>>,
    fail: bool,
}

impl RecordingArchiver {
    pub fn failing() -> Self {
        Self {
            fail: true,
            ..Self::default()
        }
    }

    pub fn saves(&self) -> Vec<(String, Vec<u8>)> {
        locked(&self.saved)
    }

    pub fn save_count(&self) -> usize {
        self.saves().len()
    }
}

#[async_trait]
impl Archiver for RecordingArchiver {
    async fn save(&self, key: &str, blob: &[u8]) -> Result<(), ArchiveError> {
        with_lock(&self.saved, |s| s.push((key.to_string(), blob.to_vec())));
        if self.fail {
            return Err(ArchiveError::SaveFailed {
                key: key.to_string(),
                reason: "nothing to commit, working tree clean".to_string(),
            });
        }
        Ok(())
    }
}

// ============================================================================
// HUB
// ============================================================================

/// Hub backed directly by a [`HubState`], no HTTP involved.
#[derive(Debug)]
pub struct InMemoryHub {
    state: Arc<HubState>,
    /// Config fetches to fail before answering.
    config_failures: AtomicU32,
}

impl InMemoryHub {
    pub fn new(state: Arc<HubState>) -> Self {
        Self {
            state,
            config_failures: AtomicU32::new(0),
        }
    }

    /// Fail the first `n` config fetches as if the hub were down.
    pub fn failing_first(self, n: u32) -> Self {
        self.config_failures.store(n, Ordering::SeqCst);
        self
    }

    pub fn state(&self) -> &Arc<HubState> {
        &self.state
    }
}

fn hub_down() -> HubClientError {
    HubClientError::Rejected {
        status: 503,
        message: "hub down".to_string(),
    }
}

fn rejected(err: impl std::fmt::Display) -> HubClientError {
    HubClientError::Rejected {
        status: 400,
        message: err.to_string(),
    }
}

#[async_trait]
impl HubApi for InMemoryHub {
    fn endpoint(&self) -> &str {
        "memory://hub"
    }

    async fn task_config(&self, pair: PairId) -> Result<TaskConfig, HubClientError> {
        let remaining = self.config_failures.load(Ordering::SeqCst);
        if remaining > 0 {
            self.config_failures.store(remaining - 1, Ordering::SeqCst);
            return Err(hub_down());
        }
        self.state.task_config(pair).await.map_err(rejected)
    }

    async fn chat(&self, pair: PairId) -> Result<Vec<ChatMessage>, HubClientError> {
        Ok(self.state.chat(pair).collect())
    }

    async fn post_chat(&self, pair: PairId, from: &str, text: &str) -> Result<(), HubClientError> {
        self.state
            .post_chat(pair, Some(from.to_string()), Some(text.to_string()))
            .map(|_| ())
            .map_err(rejected)
    }

    async fn post_report(&self, report: &ProgressReport) -> Result<(), HubClientError> {
        self.state
            .post_report(
                Some(report.name.clone()),
                Some(i64::from(report.pair_id.get())),
                Some(report.msg.clone()),
            )
            .map(|_| ())
            .map_err(rejected)
    }
}

/// Hub that never answers.
#[derive(Debug, Clone, Copy, Default)]
pub struct UnreachableHub;

#[async_trait]
impl HubApi for UnreachableHub {
    fn endpoint(&self) -> &str {
        "http://unreachable.invalid"
    }

    async fn task_config(&self, _pair: PairId) -> Result<TaskConfig, HubClientError> {
        Err(hub_down())
    }

    async fn chat(&self, _pair: PairId) -> Result<Vec<ChatMessage>, HubClientError> {
        Err(hub_down())
    }

    async fn post_chat(&self, _pair: PairId, _from: &str, _text: &str) -> Result<(), HubClientError> {
        Err(hub_down())
    }

    async fn post_report(&self, _report: &ProgressReport) -> Result<(), HubClientError> {
        Err(hub_down())
    }
}

// ============================================================================
// PROPTEST GENERATORS
// ============================================================================

pub mod generators {
    use super::*;
    use proptest::prelude::*;

    pub fn arb_pair_id() -> impl Strategy<Value = PairId> {
        (1i64..=1_000).prop_filter_map("valid pair", |raw| PairId::new(raw).ok())
    }

    pub fn arb_role() -> impl Strategy<Value = Role> {
        prop_oneof![Just(Role::A), Just(Role::B)]
    }

    pub fn arb_block_pos() -> impl Strategy<Value = BlockPos> {
        (-30_000_000i32..30_000_000, -64i32..320, -30_000_000i32..30_000_000)
            .prop_map(|(x, y, z)| BlockPos::new(x, y, z))
    }

    /// A position inside `region`.
    pub fn arb_pos_within(region: WorkspaceRegion) -> impl Strategy<Value = BlockPos> {
        let (min, max) = (region.min(), region.max());
        (min.x..=max.x, min.y..=max.y, min.z..=max.z).prop_map(|(x, y, z)| BlockPos::new(x, y, z))
    }

    pub fn arb_block_id() -> impl Strategy<Value = String> {
        prop_oneof![
            Just("stone".to_string()),
            Just("oak_planks".to_string()),
            Just("minecraft:cobblestone".to_string()),
            "[a-z][a-z_]{0,15}",
        ]
    }

    /// Well-formed planner answer targeting `pos`.
    pub fn arb_plan_json(pos: BlockPos) -> impl Strategy<Value = String> {
        (
            arb_block_id(),
            proptest::option::of("[a-zA-Z ]{1,20}"),
            proptest::option::of("[a-z ]{1,12}"),
        )
            .prop_map(move |(block, chat, status)| {
                super::fixtures::plan_json(&block, pos, chat.as_deref(), status.as_deref())
            })
    }
}

// ============================================================================
// FIXTURES
// ============================================================================

pub mod fixtures {
    use super::*;
    use cobuild_storage::CheckpointStore;
    use std::path::Path;

    pub const TASK: &str = "Work together as a pair to build a giant castle gate";

    /// Pair id for tests; panics on invalid input.
    pub fn pair(raw: i64) -> PairId {
        match PairId::new(raw) {
            Ok(pair) => pair,
            Err(err) => panic!("bad test pair {raw}: {err}"),
        }
    }

    /// Region of `pair` under the default partition.
    pub fn region(pair: PairId) -> WorkspaceRegion {
        match PartitionConfig::default().region(pair) {
            Ok(region) => region,
            Err(err) => panic!("no region for pair {pair}: {err}"),
        }
    }

    /// Hub state with the default partition, storing checkpoints in `dir`.
    pub fn hub_state(dir: &Path, chat_capacity: usize) -> Arc<HubState> {
        Arc::new(HubState::new(
            TASK,
            PartitionConfig::default(),
            chat_capacity,
            CheckpointStore::new(dir),
        ))
    }

    /// Planner answer in the shape the decoder expects.
    pub fn plan_json(block: &str, pos: BlockPos, chat: Option<&str>, status: Option<&str>) -> String {
        let mut value = serde_json::json!({
            "block": block,
            "x": pos.x,
            "y": pos.y,
            "z": pos.z,
        });
        if let Some(chat) = chat {
            value["chat"] = serde_json::Value::from(chat);
        }
        if let Some(status) = status {
            value["status"] = serde_json::Value::from(status);
        }
        value.to_string()
    }
}
