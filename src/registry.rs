//! In-memory run registry backing the `/runs` endpoints.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::Serialize;

use runcast_core_types::{ActionRecord, RunId, RunStatus};

/// Point-in-time view of one run.
#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RunSnapshot {
    pub run_id: RunId,
    pub status: RunStatus,
    pub start_url: Option<String>,
    pub goal: Option<String>,
    pub allowlist: Vec<String>,
    pub keep_session_open: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub episodes_completed: usize,
    pub actions: Vec<ActionRecord>,
    pub error: Option<String>,
}

impl RunSnapshot {
    pub fn new(
        run_id: RunId,
        start_url: Option<String>,
        goal: Option<String>,
        allowlist: Vec<String>,
        keep_session_open: bool,
    ) -> Self {
        let now = Utc::now();
        Self {
            run_id,
            status: RunStatus::Pending,
            start_url,
            goal,
            allowlist,
            keep_session_open,
            created_at: now,
            updated_at: now,
            episodes_completed: 0,
            actions: Vec::new(),
            error: None,
        }
    }
}

#[derive(Default)]
pub struct RunRegistry {
    runs: DashMap<String, RunSnapshot>,
}

impl RunRegistry {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn insert(&self, snapshot: RunSnapshot) {
        self.runs
            .insert(snapshot.run_id.as_str().to_string(), snapshot);
    }

    pub fn set_status(&self, run_id: &RunId, status: RunStatus) {
        if let Some(mut entry) = self.runs.get_mut(run_id.as_str()) {
            entry.status = status;
            entry.updated_at = Utc::now();
        }
    }

    pub fn fail(&self, run_id: &RunId, message: impl Into<String>) {
        if let Some(mut entry) = self.runs.get_mut(run_id.as_str()) {
            entry.status = RunStatus::Failed;
            entry.error = Some(message.into());
            entry.updated_at = Utc::now();
        }
    }

    /// Append one finished episode's actions to the cumulative run log.
    pub fn record_episode(&self, run_id: &RunId, actions: &[ActionRecord]) {
        if let Some(mut entry) = self.runs.get_mut(run_id.as_str()) {
            entry.episodes_completed += 1;
            entry.actions.extend_from_slice(actions);
            entry.updated_at = Utc::now();
        }
    }

    /// Drop a run's record entirely, once its retention window has passed.
    pub fn remove(&self, run_id: &RunId) {
        self.runs.remove(run_id.as_str());
    }

    pub fn get(&self, run_id: &str) -> Option<RunSnapshot> {
        self.runs.get(run_id).map(|entry| entry.clone())
    }

    /// All known runs, newest first.
    pub fn list(&self) -> Vec<RunSnapshot> {
        let mut runs: Vec<RunSnapshot> = self.runs.iter().map(|entry| entry.clone()).collect();
        runs.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        runs
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn snapshot(run_id: RunId) -> RunSnapshot {
        RunSnapshot::new(run_id, None, Some("find pricing".into()), Vec::new(), false)
    }

    #[test]
    fn status_transitions_touch_updated_at() {
        let registry = RunRegistry::default();
        let run = RunId::new();
        registry.insert(snapshot(run.clone()));

        registry.set_status(&run, RunStatus::Running);
        let view = registry.get(run.as_str()).unwrap();
        assert_eq!(view.status, RunStatus::Running);
        assert!(view.updated_at >= view.created_at);
    }

    #[test]
    fn failure_records_the_message() {
        let registry = RunRegistry::default();
        let run = RunId::new();
        registry.insert(snapshot(run.clone()));
        registry.fail(&run, "browser launch failed");

        let view = registry.get(run.as_str()).unwrap();
        assert_eq!(view.status, RunStatus::Failed);
        assert_eq!(view.error.as_deref(), Some("browser launch failed"));
    }

    #[test]
    fn unknown_runs_are_ignored() {
        let registry = RunRegistry::default();
        registry.set_status(&RunId::new(), RunStatus::Running);
        assert!(registry.list().is_empty());
    }
}
