//! Shared primitives for the runcast workspace.
//!
//! Identifiers, the run/episode data model, and the closed wire-event union
//! consumed by every other crate.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

pub mod events;

pub use events::{EventEnvelope, FrameImage, RunEvent};

/// Opaque identifier for one end-to-end run.
#[derive(Clone, Debug, Serialize, Deserialize, Eq, PartialEq, Hash)]
pub struct RunId(pub String);

impl RunId {
    pub fn new() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for RunId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for RunId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Lifecycle state of a run as tracked by the registry.
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    Pending,
    Running,
    Finished,
    Blocked,
    Failed,
}

impl fmt::Display for RunStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            RunStatus::Pending => "pending",
            RunStatus::Running => "running",
            RunStatus::Finished => "finished",
            RunStatus::Blocked => "blocked",
            RunStatus::Failed => "failed",
        };
        f.write_str(label)
    }
}

/// One bounded unit of agent work within a run.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct EpisodeSpec {
    pub task: String,
    pub max_steps: u32,
}

impl EpisodeSpec {
    pub fn new(task: impl Into<String>, max_steps: u32) -> Self {
        Self {
            task: task.into(),
            max_steps,
        }
    }
}

/// A single browser action taken by the agent, tagged with its episode slot.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ActionRecord {
    pub episode: usize,
    pub action_index: usize,
    pub action: String,
    pub details: String,
    pub timestamp: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn run_ids_are_unique() {
        assert_ne!(RunId::new(), RunId::new());
    }

    #[test]
    fn episode_spec_uses_camel_case_on_the_wire() {
        let spec = EpisodeSpec::new("locate contact link", 5);
        let value = serde_json::to_value(&spec).unwrap();
        assert_eq!(value["task"], "locate contact link");
        assert_eq!(value["maxSteps"], 5);
    }
}
