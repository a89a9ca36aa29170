//! Hub state shared by every route.
//!
//! Chat rings and reports live in `DashMap`s keyed by pair (and agent name
//! for reports). All mutation goes through `entry`/`insert`, which hold the
//! shard lock for the key, so two agents of one pair cannot lose each
//! other's updates while different pairs proceed independently.

use cobuild_core::{
    ChatMessage, ChatRing, ChatSnapshot, PairId, PartitionConfig, ProgressReport, RequestError,
    TaskConfig, NOT_STARTED_MEMO,
};
use cobuild_storage::CheckpointStore;
use dashmap::DashMap;
use std::path::Path;

use crate::config::HubConfig;
use crate::telemetry::metrics::record;

/// Reason attached to [`RequestError::BadInput`] for absent fields.
pub const MISSING: &str = "missing";

/// In-memory coordination state. Lives as long as the hub process.
#[derive(Debug)]
pub struct HubState {
    task: String,
    partition: PartitionConfig,
    chat_capacity: usize,
    store: CheckpointStore,
    chats: DashMap<PairId, ChatRing>,
    reports_by_pair: DashMap<PairId, ProgressReport>,
    reports_by_agent: DashMap<String, ProgressReport>,
}

impl HubState {
    pub fn new(
        task: impl Into<String>,
        partition: PartitionConfig,
        chat_capacity: usize,
        store: CheckpointStore,
    ) -> Self {
        Self {
            task: task.into(),
            partition,
            chat_capacity,
            store,
            chats: DashMap::new(),
            reports_by_pair: DashMap::new(),
            reports_by_agent: DashMap::new(),
        }
    }

    pub fn from_config(config: &HubConfig) -> Self {
        Self::new(
            config.task.clone(),
            config.partition,
            config.chat_capacity,
            CheckpointStore::new(config.data_dir.clone()),
        )
    }

    /// Directory the pair checkpoints are read from.
    pub fn checkpoint_dir(&self) -> &Path {
        self.store.dir()
    }

    // ========================================================================
    // CONFIG
    // ========================================================================

    /// Task config for `pair`, recomputed on every call.
    ///
    /// Unseen pairs get the "not started" memo. An unreadable checkpoint is
    /// logged and treated the same way.
    pub async fn task_config(&self, pair: PairId) -> Result<TaskConfig, cobuild_core::ConfigError> {
        let range = self.partition.region(pair)?;
        let last_memo = match self.store.load(pair).await {
            Ok(Some(checkpoint)) => checkpoint.memo,
            Ok(None) => NOT_STARTED_MEMO.to_string(),
            Err(e) => {
                tracing::warn!(pair_id = %pair, error = %e, "Ignoring unreadable checkpoint");
                NOT_STARTED_MEMO.to_string()
            }
        };
        record(|m| m.config_fetched());
        Ok(TaskConfig {
            task: self.task.clone(),
            last_memo,
            range,
        })
    }

    // ========================================================================
    // CHAT
    // ========================================================================

    /// Append a message to the pair's ring, evicting the oldest when full.
    pub fn post_chat(
        &self,
        pair: PairId,
        from: Option<String>,
        text: Option<String>,
    ) -> Result<ChatMessage, RequestError> {
        let from = required("from", from)?;
        let text = required("text", text)?;
        let message = ChatMessage::new(from, text);

        let evicted = self
            .chats
            .entry(pair)
            .or_insert_with(|| ChatRing::new(self.chat_capacity))
            .push(message.clone());
        if let Some(dropped) = &evicted {
            tracing::debug!(pair_id = %pair, from = %dropped.from, "Chat buffer full, dropped oldest");
        }
        record(|m| m.chat_posted(evicted.is_some()));
        Ok(message)
    }

    /// Snapshot of the pair's ring; empty for unseen pairs.
    pub fn chat(&self, pair: PairId) -> ChatSnapshot {
        self.chats
            .get(&pair)
            .map(|ring| ring.snapshot())
            .unwrap_or_else(ChatSnapshot::empty)
    }

    // ========================================================================
    // REPORTS
    // ========================================================================

    /// Record the latest progress line for the agent and its pair.
    pub fn post_report(
        &self,
        name: Option<String>,
        pair_id: Option<i64>,
        msg: Option<String>,
    ) -> Result<ProgressReport, RequestError> {
        let name = required("name", name)?;
        let raw_pair = pair_id.ok_or_else(|| bad_input("pairId", MISSING))?;
        let pair_id = PairId::new(raw_pair).map_err(|e| bad_input("pairId", &e.to_string()))?;
        let msg = msg.ok_or_else(|| bad_input("msg", MISSING))?;

        let report = ProgressReport { name, pair_id, msg };
        tracing::info!(
            pair_id = %report.pair_id,
            agent = %report.name,
            msg = %report.msg,
            "Progress report"
        );
        self.reports_by_pair.insert(report.pair_id, report.clone());
        self.reports_by_agent.insert(report.name.clone(), report.clone());
        record(|m| m.report_received());
        Ok(report)
    }

    /// Latest report for `pair`, if any agent of that pair has reported.
    pub fn latest_report(&self, pair: PairId) -> Option<ProgressReport> {
        self.reports_by_pair.get(&pair).map(|r| r.value().clone())
    }

    /// Latest report of every pair, ordered by pair id.
    pub fn reports(&self) -> Vec<ProgressReport> {
        let mut reports: Vec<_> = self.reports_by_pair.iter().map(|r| r.value().clone()).collect();
        reports.sort_by_key(|r| r.pair_id);
        reports
    }

    /// Latest report of every agent, ordered by name.
    pub fn agent_reports(&self) -> Vec<ProgressReport> {
        let mut reports: Vec<_> = self
            .reports_by_agent
            .iter()
            .map(|r| r.value().clone())
            .collect();
        reports.sort_by(|a, b| a.name.cmp(&b.name));
        reports
    }
}

fn bad_input(field: &str, reason: &str) -> RequestError {
    RequestError::BadInput {
        field: field.to_string(),
        reason: reason.to_string(),
    }
}

fn required(field: &str, value: Option<String>) -> Result<String, RequestError> {
    match value {
        None => Err(bad_input(field, MISSING)),
        Some(v) if v.trim().is_empty() => Err(bad_input(field, "must not be blank")),
        Some(v) => Ok(v),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cobuild_core::Checkpoint;
    use proptest::prelude::*;

    fn pair(raw: i64) -> PairId {
        match PairId::new(raw) {
            Ok(pair) => pair,
            Err(err) => panic!("bad test pair: {err}"),
        }
    }

    fn state_in(dir: &std::path::Path, capacity: usize) -> HubState {
        HubState::new(
            "Build a gate",
            PartitionConfig::default(),
            capacity,
            CheckpointStore::new(dir),
        )
    }

    fn post(state: &HubState, p: i64, from: &str, text: &str) -> Result<ChatMessage, RequestError> {
        state.post_chat(pair(p), Some(from.to_string()), Some(text.to_string()))
    }

    #[tokio::test]
    async fn test_unseen_pair_gets_default_memo_and_region() -> Result<(), Box<dyn std::error::Error>> {
        let dir = tempfile::tempdir()?;
        let state = state_in(dir.path(), 10);
        let config = state.task_config(pair(7)).await?;
        assert_eq!(config.last_memo, NOT_STARTED_MEMO);
        assert_eq!(config.range, PartitionConfig::default().region(pair(7))?);
        Ok(())
    }

    #[tokio::test]
    async fn test_memo_is_read_through_from_checkpoint() -> Result<(), Box<dyn std::error::Error>> {
        let dir = tempfile::tempdir()?;
        let state = state_in(dir.path(), 10);
        CheckpointStore::new(dir.path())
            .write(&Checkpoint::new(pair(1), "left wall done"))
            .await?;
        assert_eq!(state.task_config(pair(1)).await?.last_memo, "left wall done");
        Ok(())
    }

    #[tokio::test]
    async fn test_corrupt_checkpoint_falls_back() -> Result<(), Box<dyn std::error::Error>> {
        let dir = tempfile::tempdir()?;
        std::fs::write(dir.path().join("progress_p2.json"), b"not json")?;
        let state = state_in(dir.path(), 10);
        assert_eq!(state.task_config(pair(2)).await?.last_memo, NOT_STARTED_MEMO);
        Ok(())
    }

    #[test]
    fn test_chat_keeps_last_five_of_seven() -> Result<(), Box<dyn std::error::Error>> {
        let dir = tempfile::tempdir()?;
        let state = state_in(dir.path(), 5);
        for i in 1..=7 {
            post(&state, 1, "Bot-1-A", &format!("m{i}"))?;
        }
        let texts: Vec<String> = state.chat(pair(1)).map(|m| m.text).collect();
        assert_eq!(texts, vec!["m3", "m4", "m5", "m6", "m7"]);
        Ok(())
    }

    #[test]
    fn test_chat_is_per_pair() -> Result<(), Box<dyn std::error::Error>> {
        let dir = tempfile::tempdir()?;
        let state = state_in(dir.path(), 10);
        post(&state, 1, "Bot-1-A", "hello")?;
        assert_eq!(state.chat(pair(1)).len(), 1);
        assert_eq!(state.chat(pair(2)).len(), 0);
        Ok(())
    }

    #[test]
    fn test_chat_rejects_missing_fields() -> Result<(), Box<dyn std::error::Error>> {
        let dir = tempfile::tempdir()?;
        let state = state_in(dir.path(), 10);
        let err = state.post_chat(pair(1), None, Some("hi".to_string()));
        assert_eq!(
            err,
            Err(RequestError::BadInput {
                field: "from".to_string(),
                reason: MISSING.to_string()
            })
        );
        assert!(state.post_chat(pair(1), Some("a".to_string()), Some("  ".to_string())).is_err());
        assert_eq!(state.chat(pair(1)).len(), 0);
        Ok(())
    }

    #[test]
    fn test_report_last_write_wins() -> Result<(), Box<dyn std::error::Error>> {
        let dir = tempfile::tempdir()?;
        let state = state_in(dir.path(), 10);
        state.post_report(Some("Bot-1-A".into()), Some(1), Some("placed stone".into()))?;
        state.post_report(Some("Bot-1-A".into()), Some(1), Some("placed dirt".into()))?;
        let latest = state.latest_report(pair(1)).map(|r| r.msg);
        assert_eq!(latest.as_deref(), Some("placed dirt"));
        assert_eq!(state.reports().len(), 1);
        Ok(())
    }

    #[test]
    fn test_report_repetition_is_idempotent() -> Result<(), Box<dyn std::error::Error>> {
        let dir = tempfile::tempdir()?;
        let state = state_in(dir.path(), 10);
        let first = state.post_report(Some("Bot-1-B".into()), Some(1), Some("roof".into()))?;
        state.post_report(Some("Bot-1-B".into()), Some(1), Some("roof".into()))?;
        assert_eq!(state.latest_report(pair(1)), Some(first));
        assert_eq!(state.agent_reports().len(), 1);
        Ok(())
    }

    #[test]
    fn test_reports_tracked_per_agent() -> Result<(), Box<dyn std::error::Error>> {
        let dir = tempfile::tempdir()?;
        let state = state_in(dir.path(), 10);
        state.post_report(Some("Bot-1-A".into()), Some(1), Some("a".into()))?;
        state.post_report(Some("Bot-1-B".into()), Some(1), Some("b".into()))?;
        let names: Vec<String> = state.agent_reports().into_iter().map(|r| r.name).collect();
        assert_eq!(names, vec!["Bot-1-A", "Bot-1-B"]);
        assert_eq!(state.latest_report(pair(1)).map(|r| r.msg).as_deref(), Some("b"));
        Ok(())
    }

    #[test]
    fn test_report_rejects_bad_pair() -> Result<(), Box<dyn std::error::Error>> {
        let dir = tempfile::tempdir()?;
        let state = state_in(dir.path(), 10);
        assert!(state.post_report(Some("x".into()), Some(0), Some("m".into())).is_err());
        assert!(state.post_report(Some("x".into()), None, Some("m".into())).is_err());
        assert!(state.post_report(Some("x".into()), Some(1), None).is_err());
        assert!(state.reports().is_empty());
        Ok(())
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_posts_are_not_lost() -> Result<(), Box<dyn std::error::Error>> {
        let dir = tempfile::tempdir()?;
        let state = std::sync::Arc::new(state_in(dir.path(), 100));
        let mut handles = Vec::new();
        for role in ["A", "B"] {
            let state = state.clone();
            handles.push(tokio::spawn(async move {
                for i in 0..40 {
                    let _ = state.post_chat(
                        pair(1),
                        Some(format!("Bot-1-{role}")),
                        Some(format!("{role}{i}")),
                    );
                }
            }));
        }
        for handle in handles {
            handle.await?;
        }
        assert_eq!(state.chat(pair(1)).len(), 80);
        Ok(())
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(50))]

        /// Whatever is posted, a pair's chat never exceeds capacity and keeps
        /// the newest messages oldest-first.
        #[test]
        fn prop_chat_bounded_and_ordered(
            capacity in 1usize..=10,
            texts in prop::collection::vec("[a-z]{1,6}", 0..30),
        ) {
            let dir = tempfile::tempdir().map_err(|e| TestCaseError::fail(e.to_string()))?;
            let state = state_in(dir.path(), capacity);
            for text in &texts {
                prop_assert!(post(&state, 3, "Bot-3-A", text).is_ok());
            }
            let got: Vec<String> = state.chat(pair(3)).map(|m| m.text).collect();
            let expected: Vec<String> = texts
                .iter()
                .skip(texts.len().saturating_sub(capacity))
                .cloned()
                .collect();
            prop_assert_eq!(got, expected);
        }
    }
}
