//! Episode execution with single-retry rate-limit handling.
//!
//! One episode is one bounded agent call. A rate-limit failure suspends for
//! the advertised retry-after and re-invokes the same episode exactly once;
//! any other failure, or a second failure after the retry, is fatal to the
//! run.

use std::sync::Arc;
use std::time::Duration;

use tokio::time::sleep;
use tracing::{info, warn};

use runcast_agent::{AgentError, AutomationAgent, EpisodeOutcome, RateLimitSignal};
use runcast_core_types::{ActionRecord, EpisodeSpec, RunEvent, RunId};
use runcast_event_bus::EventBus;

use crate::blocked::blocked_reason;

/// Outcome of one episode, with actions already tagged for the run log.
#[derive(Clone, Debug)]
pub struct EpisodeResult {
    pub summary: String,
    pub actions: Vec<ActionRecord>,
    pub blocked: bool,
}

pub struct EpisodeExecutor {
    bus: Arc<EventBus>,
    run_id: RunId,
}

impl EpisodeExecutor {
    pub fn new(bus: Arc<EventBus>, run_id: RunId) -> Self {
        Self { bus, run_id }
    }

    /// Run episode `idx`. Publishes `episode.start`, then on success one
    /// `agent.action` per action and a closing `episode.finish`; on fatal
    /// failure an `episode.error` before the error propagates.
    pub async fn run(
        &self,
        agent: &dyn AutomationAgent,
        idx: usize,
        spec: &EpisodeSpec,
    ) -> Result<EpisodeResult, AgentError> {
        self.bus.publish(
            &self.run_id,
            RunEvent::EpisodeStart {
                idx,
                max_steps: spec.max_steps,
                task: spec.task.clone(),
            },
        );
        info!(target: "executor", run = %self.run_id, idx, "episode started");

        let outcome = match agent.execute(&spec.task, spec.max_steps).await {
            Ok(outcome) => outcome,
            Err(err) => {
                let signal = RateLimitSignal::from_error(&err);
                if !signal.is_rate_limited {
                    return Err(self.fail(idx, err));
                }
                self.bus.publish(
                    &self.run_id,
                    RunEvent::RateLimit {
                        episode: idx,
                        retry_after: signal.retry_after_seconds,
                    },
                );
                warn!(
                    target: "executor",
                    run = %self.run_id,
                    idx,
                    retry_after = signal.retry_after_seconds,
                    "rate limited, retrying once"
                );
                sleep(Duration::from_secs(signal.retry_after_seconds)).await;
                match agent.execute(&spec.task, spec.max_steps).await {
                    Ok(outcome) => outcome,
                    Err(err) => return Err(self.fail(idx, err)),
                }
            }
        };

        Ok(self.finish(idx, outcome))
    }

    fn finish(&self, idx: usize, outcome: EpisodeOutcome) -> EpisodeResult {
        let actions: Vec<ActionRecord> = outcome
            .actions
            .into_iter()
            .enumerate()
            .map(|(action_index, action)| ActionRecord {
                episode: idx,
                action_index,
                action: action.action,
                details: action.details,
                timestamp: action.timestamp,
            })
            .collect();
        for record in &actions {
            self.bus.publish(
                &self.run_id,
                RunEvent::AgentAction {
                    episode: record.episode,
                    action_index: record.action_index,
                    action: record.action.clone(),
                    details: record.details.clone(),
                    timestamp: record.timestamp,
                },
            );
        }
        self.bus.publish(
            &self.run_id,
            RunEvent::EpisodeFinish {
                idx,
                summary: outcome.message.clone(),
                actions_count: actions.len(),
            },
        );

        let blocked = blocked_reason(&outcome.message).is_some();
        if blocked {
            info!(target: "executor", run = %self.run_id, idx, "episode reported blocked");
        }
        EpisodeResult {
            summary: outcome.message,
            actions,
            blocked,
        }
    }

    fn fail(&self, idx: usize, err: AgentError) -> AgentError {
        self.bus.publish(
            &self.run_id,
            RunEvent::EpisodeError {
                idx,
                message: err.to_string(),
            },
        );
        err
    }
}
