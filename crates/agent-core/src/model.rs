use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One browser action the agent reports having taken.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct ActionTaken {
    /// Action kind, e.g. `click`, `type`, `key`, `scroll`.
    pub action: String,
    /// Human-readable detail for live sidebars.
    pub details: String,
    pub timestamp: DateTime<Utc>,
}

impl ActionTaken {
    pub fn new(action: impl Into<String>, details: impl Into<String>) -> Self {
        Self {
            action: action.into(),
            details: details.into(),
            timestamp: Utc::now(),
        }
    }
}

/// Result of executing one episode through the agent.
#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct EpisodeOutcome {
    /// Free-text summary; a `BLOCKED:<reason>` prefix signals the run should
    /// halt.
    pub message: String,
    pub actions: Vec<ActionTaken>,
}
