//! Ollama provider (local models)
//!
//! Talks to `POST /api/generate` with streaming off and JSON mode on.

pub mod planner;
pub mod types;

pub use planner::{OllamaConfig, OllamaPlanner};
