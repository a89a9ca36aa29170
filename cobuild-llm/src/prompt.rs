//! Decision prompt rendering.

use cobuild_core::{ChatMessage, WorkspaceRegion};
use serde_json::json;

const CONTRACT: &str = "Reply with exactly one JSON object and nothing else.\n\
Fields: \"block\" (block id, e.g. \"stone\"), \"x\", \"y\", \"z\" (integers inside the region), \
optional \"chat\" (one short line for your partner), optional \"status\" (a few words on progress).\n\
Example: {\"chat\":\"I'll do the left wall\",\"block\":\"stone\",\"x\":110,\"y\":64,\"z\":110,\"status\":\"left wall 1/5\"}";

/// Everything the planner sees for one cycle.
#[derive(Debug, Clone)]
pub struct DecisionContext<'a> {
    pub agent: &'a str,
    pub partner: &'a str,
    pub task: &'a str,
    pub region: WorkspaceRegion,
    /// Partner's most recent messages, oldest first.
    pub partner_messages: &'a [ChatMessage],
    pub memo: &'a str,
}

impl DecisionContext<'_> {
    pub fn render(&self) -> String {
        let partner_said: Vec<&str> = self
            .partner_messages
            .iter()
            .map(|m| m.text.as_str())
            .collect();
        let state = json!({
            "you": self.agent,
            "partner": self.partner,
            "task": self.task,
            "region": {
                "min": self.region.min(),
                "max": self.region.max(),
            },
            "partner_said": partner_said,
            "last_memo": self.memo,
        });
        let state_json = serde_json::to_string_pretty(&state).unwrap_or_else(|_| "{}".to_string());

        format!(
            "You are {agent}, building together with {partner} in a shared block world. \
Only place blocks inside your region and avoid repeating what your partner already covers.\n\n\
[STATE_JSON]\n{state_json}\n\n[CONTRACT]\n{CONTRACT}\n",
            agent = self.agent,
            partner = self.partner,
        )
    }
}
