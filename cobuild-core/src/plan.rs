//! Planner output decoding.
//!
//! A planner answers with a small JSON object:
//!
//! ```text
//! {"chat": "I'll take the left pillar", "block": "stone", "x": 110, "y": 64, "z": 110, "status": "pillar 1/4"}
//! ```
//!
//! `decode` only checks shape. Whether the target lies inside the agent's
//! region is a separate question answered by `validate_within`, so callers
//! can tell a garbled answer from an out-of-bounds one.

use crate::{BlockPos, DecodeError, WorkspaceRegion};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

static BLOCK_ID: Lazy<Result<Regex, regex::Error>> =
    Lazy::new(|| Regex::new(r"^[a-z0-9_][a-z0-9_:.\-]*$"));

/// A single decided step: optionally say something, then place one block.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActionPlan {
    pub chat: Option<String>,
    pub block: String,
    pub target: BlockPos,
    pub status: Option<String>,
}

/// Parse raw planner text into an [`ActionPlan`].
pub fn decode(raw: &str) -> Result<ActionPlan, DecodeError> {
    let body = extract_object(raw)?;
    let value: Value = serde_json::from_str(body)
        .map_err(|e| DecodeError::malformed(format!("invalid JSON: {}", e)))?;
    let Value::Object(fields) = value else {
        return Err(DecodeError::malformed("expected a JSON object"));
    };

    let block = block_id(&fields)?;
    let target = BlockPos::new(
        coordinate(&fields, "x")?,
        coordinate(&fields, "y")?,
        coordinate(&fields, "z")?,
    );
    let chat = optional_text(&fields, "chat")?;
    let status = match optional_text(&fields, "status")? {
        Some(status) => Some(status),
        None => optional_text(&fields, "msg")?,
    };

    Ok(ActionPlan {
        chat,
        block,
        target,
        status,
    })
}

/// Whether the plan's target block lies inside `region` (inclusive).
pub fn validate_within(plan: &ActionPlan, region: &WorkspaceRegion) -> bool {
    region.contains(plan.target)
}

/// Take the outermost `{...}` span so fenced or chatty answers still parse.
fn extract_object(raw: &str) -> Result<&str, DecodeError> {
    let trimmed = raw.trim();
    let start = trimmed
        .find('{')
        .ok_or_else(|| DecodeError::malformed("no JSON object in planner output"))?;
    let end = trimmed
        .rfind('}')
        .filter(|end| *end > start)
        .ok_or_else(|| DecodeError::malformed("unterminated JSON object"))?;
    Ok(&trimmed[start..=end])
}

fn block_id(fields: &Map<String, Value>) -> Result<String, DecodeError> {
    let block = match fields.get("block") {
        Some(Value::String(s)) => s.trim().to_ascii_lowercase(),
        Some(other) => {
            return Err(DecodeError::malformed(format!(
                "block must be a string, got {}",
                type_name(other)
            )))
        }
        None => return Err(DecodeError::malformed("missing field block")),
    };
    let pattern = BLOCK_ID
        .as_ref()
        .map_err(|e| DecodeError::malformed(format!("block pattern unavailable: {}", e)))?;
    if !pattern.is_match(&block) {
        return Err(DecodeError::malformed(format!(
            "block id {:?} is not a plain identifier",
            block
        )));
    }
    Ok(block)
}

fn coordinate(fields: &Map<String, Value>, name: &str) -> Result<i32, DecodeError> {
    let value = fields
        .get(name)
        .ok_or_else(|| DecodeError::malformed(format!("missing field {}", name)))?;
    let Value::Number(number) = value else {
        return Err(DecodeError::malformed(format!(
            "{} must be a number, got {}",
            name,
            type_name(value)
        )));
    };

    let as_int = match number.as_i64() {
        Some(i) => Some(i),
        None => number
            .as_f64()
            .filter(|f| f.is_finite() && f.fract() == 0.0)
            .map(|f| f as i64),
    };
    as_int
        .and_then(|i| i32::try_from(i).ok())
        .ok_or_else(|| DecodeError::malformed(format!("{} is not a block coordinate: {}", name, number)))
}

fn optional_text(fields: &Map<String, Value>, name: &str) -> Result<Option<String>, DecodeError> {
    match fields.get(name) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::String(s)) => {
            let s = s.trim();
            Ok((!s.is_empty()).then(|| s.to_string()))
        }
        Some(other) => Err(DecodeError::malformed(format!(
            "{} must be a string, got {}",
            name,
            type_name(other)
        ))),
    }
}

fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
