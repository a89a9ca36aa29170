//! Agent control loop.
//!
//! ```text
//! Resolving --config--> Acting --deadline--> Checkpointing --> Terminated
//!     |                   ^  |
//!     |                   +--+ decide, act, report every period
//!     +--retry cap--> HubUnreachable
//! ```
//!
//! The decision cycle and the deadline timer are separate tasks that share
//! a [`TerminationSignal`]. The signal is honoured between cycles and while
//! sleeping; a cycle that has started always runs to completion.
//!
//! The world is only connected once the hub has answered. If that connect
//! fails the loop still acts against a detached session, so the deadline
//! and the checkpoint are unaffected by the world being down.

use cobuild_core::{
    decode, validate_within, AgentError, ChatMessage, ProgressReport, StartupError, TaskConfig,
    WorkspaceRegion,
};
use cobuild_llm::{DecisionContext, Planner};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;

use crate::checkpoint::{CheckpointCoordinator, CheckpointOutcome};
use crate::config::{AgentConfig, AgentIdentity, ResolveConfig};
use crate::hub_client::HubApi;
use crate::telemetry::{record, CycleOutcome};
use crate::world::{WorldConnection, WorldConnector, WorldEvent, WorldSession};

/// Status reported when the plan carries none.
pub const DEFAULT_STATUS: &str = "building";

/// Prefix marking chat said in-world as team chat.
pub const TEAM_PREFIX: &str = "(Team) ";

// ============================================================================
// PHASES AND TERMINATION
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopPhase {
    Resolving,
    Acting,
    Checkpointing,
    Terminated,
}

impl fmt::Display for LoopPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Resolving => "resolving",
            Self::Acting => "acting",
            Self::Checkpointing => "checkpointing",
            Self::Terminated => "terminated",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TerminationReason {
    /// The per-agent run deadline fired.
    Deadline,
    /// Operator interrupt.
    Interrupted,
}

/// Shared "terminate requested" flag. The first reason wins.
#[derive(Debug, Clone)]
pub struct TerminationSignal {
    tx: Arc<watch::Sender<Option<TerminationReason>>>,
}

impl Default for TerminationSignal {
    fn default() -> Self {
        Self::new()
    }
}

impl TerminationSignal {
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(None);
        Self { tx: Arc::new(tx) }
    }

    /// Returns `true` if this call set the reason.
    pub fn request(&self, reason: TerminationReason) -> bool {
        self.tx.send_if_modified(|current| {
            if current.is_some() {
                return false;
            }
            *current = Some(reason);
            true
        })
    }

    pub fn subscribe(&self) -> TerminationWatch {
        TerminationWatch {
            rx: self.tx.subscribe(),
        }
    }

    /// Fire [`TerminationReason::Deadline`] once `after` has elapsed.
    pub fn spawn_deadline(&self, after: Duration) -> JoinHandle<()> {
        let signal = self.clone();
        tokio::spawn(async move {
            tokio::time::sleep(after).await;
            if signal.request(TerminationReason::Deadline) {
                tracing::info!(after_secs = after.as_secs(), "Run deadline reached");
            }
        })
    }
}

#[derive(Debug, Clone)]
pub struct TerminationWatch {
    rx: watch::Receiver<Option<TerminationReason>>,
}

impl TerminationWatch {
    pub fn requested(&self) -> Option<TerminationReason> {
        *self.rx.borrow()
    }

    /// Resolve once termination has been requested.
    pub async fn wait(&mut self) -> TerminationReason {
        loop {
            if let Some(reason) = *self.rx.borrow_and_update() {
                return reason;
            }
            if self.rx.changed().await.is_err() {
                // Every signal handle is gone; nobody can ask us to stop.
                return std::future::pending().await;
            }
        }
    }
}

// ============================================================================
// SETTINGS
// ============================================================================

/// Exponential backoff with a hard attempt cap.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RetryPolicy {
    pub initial: Duration,
    pub max: Duration,
    pub multiplier: f64,
    pub max_attempts: u32,
}

impl RetryPolicy {
    /// Delay after the `attempt`-th failure (1-based).
    pub fn delay(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(64) as i32;
        let scaled = self.initial.as_secs_f64() * self.multiplier.powi(exponent);
        if !scaled.is_finite() || scaled >= self.max.as_secs_f64() {
            return self.max;
        }
        Duration::from_secs_f64(scaled)
    }
}

impl From<&ResolveConfig> for RetryPolicy {
    fn from(config: &ResolveConfig) -> Self {
        Self {
            initial: Duration::from_millis(config.initial_ms),
            max: Duration::from_millis(config.max_ms),
            multiplier: config.multiplier,
            max_attempts: config.max_attempts,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LoopSettings {
    pub period: Duration,
    pub partner_window: usize,
    pub spawn_timeout: Duration,
    pub retry: RetryPolicy,
}

impl From<&AgentConfig> for LoopSettings {
    fn from(config: &AgentConfig) -> Self {
        Self {
            period: Duration::from_millis(config.cycle.period_ms),
            partner_window: config.cycle.partner_window,
            spawn_timeout: Duration::from_millis(config.world.spawn_timeout_ms),
            retry: RetryPolicy::from(&config.resolve),
        }
    }
}

// ============================================================================
// CONTROL LOOP
// ============================================================================

/// How a run ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunSummary {
    pub reason: TerminationReason,
    /// Whether the hub configuration was ever obtained.
    pub resolved: bool,
    pub cycles: u64,
    pub memo: String,
    /// `None` when no checkpoint was attempted.
    pub checkpoint: Option<CheckpointOutcome>,
}

enum Resolution {
    Resolved(TaskConfig),
    Terminated(TerminationReason),
}

pub struct ControlLoop {
    identity: AgentIdentity,
    settings: LoopSettings,
    hub: Arc<dyn HubApi>,
    planner: Arc<dyn Planner>,
    world: Arc<dyn WorldConnector>,
    session: Arc<dyn WorldSession>,
    events: mpsc::Receiver<WorldEvent>,
    coordinator: CheckpointCoordinator,
    phase: LoopPhase,
    memo: String,
    /// Partner lines heard in-world since the last cycle.
    heard: Vec<ChatMessage>,
    spawned: bool,
}

impl fmt::Debug for ControlLoop {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ControlLoop")
            .field("identity", &self.identity)
            .field("phase", &self.phase)
            .field("memo", &self.memo)
            .finish_non_exhaustive()
    }
}

impl ControlLoop {
    pub fn new(
        identity: AgentIdentity,
        settings: LoopSettings,
        hub: Arc<dyn HubApi>,
        planner: Arc<dyn Planner>,
        world: Arc<dyn WorldConnector>,
        coordinator: CheckpointCoordinator,
    ) -> Self {
        let idle = WorldConnection::detached(&identity.name, "world not connected yet");
        Self {
            identity,
            settings,
            hub,
            planner,
            world,
            session: idle.session,
            events: idle.events,
            coordinator,
            phase: LoopPhase::Resolving,
            memo: String::new(),
            heard: Vec::new(),
            spawned: false,
        }
    }

    pub fn phase(&self) -> LoopPhase {
        self.phase
    }

    fn transition(&mut self, to: LoopPhase) {
        tracing::info!(
            agent = %self.identity.name,
            pair_id = %self.identity.pair,
            from = %self.phase,
            to = %to,
            "Phase change"
        );
        self.phase = to;
    }

    /// Drive the agent from resolving to termination.
    ///
    /// Only an unreachable hub is an error. A deadline that fires before the
    /// hub answered ends the run without a checkpoint, since there is no memo
    /// worth persisting yet.
    pub async fn run(mut self, mut terminate: TerminationWatch) -> Result<RunSummary, StartupError> {
        let config = match self.resolve(&mut terminate).await? {
            Resolution::Resolved(config) => config,
            Resolution::Terminated(reason) => {
                self.transition(LoopPhase::Terminated);
                return Ok(RunSummary {
                    reason,
                    resolved: false,
                    cycles: 0,
                    memo: self.memo,
                    checkpoint: None,
                });
            }
        };
        self.memo = config.last_memo.clone();

        self.transition(LoopPhase::Acting);
        self.connect_world().await;
        self.enter_region(&config.range).await;

        let mut cycles = 0u64;
        let reason = loop {
            if let Some(reason) = terminate.requested() {
                break reason;
            }
            let outcome = self.cycle(&config).await;
            cycles += 1;
            record(|m| m.cycle(outcome));
            tracing::debug!(cycle = cycles, outcome = outcome.as_str(), "Cycle finished");

            tokio::select! {
                _ = tokio::time::sleep(self.settings.period) => {}
                reason = terminate.wait() => break reason,
            }
        };

        let checkpoint = match reason {
            TerminationReason::Deadline => {
                self.transition(LoopPhase::Checkpointing);
                Some(self.coordinator.on_deadline(&self.memo).await)
            }
            TerminationReason::Interrupted => {
                tracing::warn!(agent = %self.identity.name, "Interrupted, skipping checkpoint");
                None
            }
        };
        self.transition(LoopPhase::Terminated);

        Ok(RunSummary {
            reason,
            resolved: true,
            cycles,
            memo: self.memo,
            checkpoint,
        })
    }

    // ========================================================================
    // RESOLVING
    // ========================================================================

    async fn resolve(&mut self, terminate: &mut TerminationWatch) -> Result<Resolution, StartupError> {
        let retry = self.settings.retry;
        let mut last_error = String::new();

        for attempt in 1..=retry.max_attempts {
            if let Some(reason) = terminate.requested() {
                return Ok(Resolution::Terminated(reason));
            }
            match self.hub.task_config(self.identity.pair).await {
                Ok(config) => {
                    tracing::info!(
                        pair_id = %self.identity.pair,
                        attempt,
                        region = %config.range,
                        last_memo = %config.last_memo,
                        "Task configuration received"
                    );
                    return Ok(Resolution::Resolved(config));
                }
                Err(e) => {
                    tracing::warn!(attempt, max_attempts = retry.max_attempts, error = %e, "Hub not reachable yet");
                    last_error = e.to_string();
                }
            }
            if attempt == retry.max_attempts {
                break;
            }
            tokio::select! {
                _ = tokio::time::sleep(retry.delay(attempt)) => {}
                reason = terminate.wait() => return Ok(Resolution::Terminated(reason)),
            }
        }

        Err(StartupError::HubUnreachable {
            url: self.hub.endpoint().to_string(),
            attempts: retry.max_attempts,
            last_error,
        })
    }

    // ========================================================================
    // ACTING
    // ========================================================================

    async fn connect_world(&mut self) {
        let connection = match self.world.connect().await {
            Ok(connection) => connection,
            Err(err) => {
                tracing::error!(error = %err, "World connect failed, acting without a session");
                record(|m| m.session_lost());
                WorldConnection::detached(&self.identity.name, err.to_string())
            }
        };
        self.session = connection.session;
        self.events = connection.events;
    }

    /// Wait for spawn (bounded), then go to the region's arrival point.
    async fn enter_region(&mut self, region: &WorkspaceRegion) {
        let deadline = tokio::time::Instant::now() + self.settings.spawn_timeout;
        while !self.spawned {
            match tokio::time::timeout_at(deadline, self.events.recv()).await {
                Ok(Some(event)) => self.handle_event(event),
                Ok(None) => break,
                Err(_) => {
                    tracing::warn!(
                        agent = %self.identity.name,
                        timeout = ?self.settings.spawn_timeout,
                        "No spawn event, moving anyway"
                    );
                    break;
                }
            }
        }

        let target = region.arrival_point();
        match self.session.move_to(target).await {
            Ok(()) => tracing::info!(agent = %self.identity.name, %target, "Moved to workspace"),
            Err(e) => self.action_failed("move", e),
        }
    }

    /// One decide-act-report cycle.
    async fn cycle(&mut self, config: &TaskConfig) -> CycleOutcome {
        self.drain_events();
        let pair = self.identity.pair;

        let hub_chat = match self.hub.chat(pair).await {
            Ok(messages) => messages,
            Err(e) => {
                tracing::warn!(pair_id = %pair, error = %e, "Chat fetch failed, deciding without it");
                record(|m| m.hub_failed());
                Vec::new()
            }
        };
        let partner_messages = self.partner_messages(hub_chat);

        let prompt = DecisionContext {
            agent: &self.identity.name,
            partner: &self.identity.partner,
            task: &config.task,
            region: config.range,
            partner_messages: &partner_messages,
            memo: &self.memo,
        }
        .render();

        let raw = match self.planner.propose(&prompt).await {
            Ok(raw) => raw,
            Err(e) => {
                tracing::warn!(provider = self.planner.provider(), error = %e, "Planner failed, skipping cycle");
                return CycleOutcome::PlannerFailed;
            }
        };
        let plan = match decode(&raw) {
            Ok(plan) => plan,
            Err(e) => {
                tracing::warn!(error = %e, raw = %raw, "Unusable plan, skipping cycle");
                return CycleOutcome::DecodeFailed;
            }
        };

        if let Some(text) = plan.chat.as_deref().filter(|t| !t.trim().is_empty()) {
            if let Err(e) = self.session.say(&format!("{}{}", TEAM_PREFIX, text)).await {
                self.action_failed("say", e);
            }
            if let Err(e) = self.hub.post_chat(pair, &self.identity.name, text).await {
                tracing::warn!(pair_id = %pair, error = %e, "Chat relay failed");
                record(|m| m.hub_failed());
            }
        }

        let (outcome, status) = if validate_within(&plan, &config.range) {
            if let Err(e) = self.session.place_block(plan.target, &plan.block).await {
                self.action_failed("place", e);
            }
            let status = plan
                .status
                .clone()
                .filter(|s| !s.trim().is_empty())
                .unwrap_or_else(|| DEFAULT_STATUS.to_string());
            (CycleOutcome::Acted, status)
        } else {
            tracing::info!(
                agent = %self.identity.name,
                target = %plan.target,
                region = %config.range,
                "Plan outside region, not placing"
            );
            let t = plan.target;
            (
                CycleOutcome::OutOfBounds,
                format!("skipped: out of bounds ({},{},{})", t.x, t.y, t.z),
            )
        };

        let report = ProgressReport {
            name: self.identity.name.clone(),
            pair_id: pair,
            msg: status.clone(),
        };
        if let Err(e) = self.hub.post_report(&report).await {
            tracing::warn!(pair_id = %pair, error = %e, "Report failed");
            record(|m| m.hub_failed());
        }
        if outcome == CycleOutcome::Acted {
            self.memo = status;
        }
        outcome
    }

    /// Latest lines from anyone but this agent, hub first, then lines heard
    /// in-world that the hub did not relay.
    fn partner_messages(&mut self, hub_chat: Vec<ChatMessage>) -> Vec<ChatMessage> {
        let mut messages: Vec<ChatMessage> = hub_chat
            .into_iter()
            .filter(|m| m.from != self.identity.name)
            .collect();
        for heard in self.heard.drain(..) {
            if !messages.iter().any(|m| m.text == heard.text) {
                messages.push(heard);
            }
        }
        let skip = messages.len().saturating_sub(self.settings.partner_window);
        messages.split_off(skip)
    }

    // ========================================================================
    // WORLD EVENTS
    // ========================================================================

    fn drain_events(&mut self) {
        while let Ok(event) = self.events.try_recv() {
            self.handle_event(event);
        }
    }

    fn handle_event(&mut self, event: WorldEvent) {
        match event {
            WorldEvent::Spawned => {
                tracing::info!(agent = %self.identity.name, "Spawned in world");
                self.spawned = true;
            }
            WorldEvent::ChatReceived { sender, text } => {
                if sender == self.identity.partner {
                    let text = text.strip_prefix(TEAM_PREFIX).unwrap_or(&text).to_string();
                    self.heard.push(ChatMessage::new(sender, text));
                }
            }
            WorldEvent::Error(message) => {
                tracing::warn!(agent = %self.identity.name, error = %message, "World session error");
            }
            WorldEvent::Disconnected { reason } => {
                let err = AgentError::SessionLost {
                    agent: self.identity.name.clone(),
                    reason,
                };
                tracing::error!(error = %err, "World session lost, continuing without reconnect");
                record(|m| m.session_lost());
            }
        }
    }

    fn action_failed(&self, action: &str, err: AgentError) {
        tracing::warn!(agent = %self.identity.name, action, error = %err, "World action failed");
    }
}
