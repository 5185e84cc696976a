//! Top-level run coordination.
//!
//! `RunCoordinator::accept` registers the run, publishes `session.created`,
//! and returns immediately; a detached task then drives the whole run:
//! acquire a page, optionally navigate and start the screencast, decide the
//! episode list, execute episodes strictly in order, and tear down. Nothing
//! escapes the detached task: every failure becomes an `error` event on the
//! run's room.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use serde::Deserialize;
use tokio::time::sleep;
use tracing::{debug, info, warn};

use runcast_agent::{
    build_agent_instructions, AgentError, AutomationAgent, EpisodePlan, EpisodePlanner,
    PlanRequest, DEFAULT_MAX_EPISODES,
};
use runcast_browser::{DriverError, DriverPage};
use runcast_core_types::{EpisodeSpec, FrameImage, RunEvent, RunId, RunStatus};
use runcast_event_bus::EventBus;

use crate::executor::EpisodeExecutor;
use crate::registry::{RunRegistry, RunSnapshot};
use crate::screencast::{self, ScreencastHandle, ScreencastOptions};

/// Body of `POST /run`.
#[derive(Clone, Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RunRequest {
    pub url: Option<String>,
    pub goal: Option<String>,
    /// Raw fallback task used when neither `episodes` nor a plannable goal
    /// yields an episode list.
    pub task: Option<String>,
    #[serde(default)]
    pub episodes: Vec<EpisodeInput>,
    #[serde(default = "default_max_steps")]
    pub max_steps: u32,
    pub model: Option<String>,
    #[serde(default)]
    pub keep_open: bool,
    #[serde(default = "default_live")]
    pub live: bool,
    #[serde(default)]
    pub allowlist: Vec<String>,
}

#[derive(Clone, Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EpisodeInput {
    pub task: String,
    pub max_steps: Option<u32>,
}

fn default_max_steps() -> u32 {
    8
}

fn default_live() -> bool {
    true
}

/// A page checked out for one run. Closing releases the page and whatever
/// browser resources back it; close errors are swallowed.
#[async_trait]
pub trait PageLease: Send + Sync {
    fn page(&self) -> Arc<dyn DriverPage>;
    async fn close(&self);
}

#[async_trait]
pub trait PageProvider: Send + Sync {
    async fn acquire(&self) -> Result<Arc<dyn PageLease>, DriverError>;
}

/// Builds the automation agent for a run from the requested model and the
/// assembled system instructions.
pub trait AgentFactory: Send + Sync {
    fn agent_for(
        &self,
        model: &str,
        instructions: &str,
    ) -> Result<Arc<dyn AutomationAgent>, AgentError>;
}

#[derive(Clone, Debug)]
pub struct RunDefaults {
    pub model: String,
    pub env_label: String,
    pub inter_episode_pause: Duration,
    /// How long a finished run's room and registry record stay around for
    /// late subscribers before being dropped.
    pub room_retention: Duration,
    pub screencast: ScreencastOptions,
}

impl Default for RunDefaults {
    fn default() -> Self {
        Self {
            model: "computer-use-preview".to_string(),
            env_label: "LOCAL".to_string(),
            inter_episode_pause: Duration::from_millis(350),
            room_retention: Duration::from_secs(300),
            screencast: ScreencastOptions::default(),
        }
    }
}

struct RunOutcome {
    blocked: bool,
}

pub struct RunCoordinator {
    bus: Arc<EventBus>,
    registry: Arc<RunRegistry>,
    pages: Arc<dyn PageProvider>,
    agents: Arc<dyn AgentFactory>,
    planner: Option<Arc<dyn EpisodePlanner>>,
    defaults: RunDefaults,
}

impl RunCoordinator {
    pub fn new(
        bus: Arc<EventBus>,
        registry: Arc<RunRegistry>,
        pages: Arc<dyn PageProvider>,
        agents: Arc<dyn AgentFactory>,
        planner: Option<Arc<dyn EpisodePlanner>>,
        defaults: RunDefaults,
    ) -> Self {
        Self {
            bus,
            registry,
            pages,
            agents,
            planner,
            defaults,
        }
    }

    /// Accept a run and return its id immediately. All browser work happens
    /// on a detached task; progress is reported only through the run's room.
    pub fn accept(self: &Arc<Self>, request: RunRequest) -> RunId {
        let run_id = RunId::new();
        self.bus.open_room(&run_id);
        self.registry.insert(RunSnapshot::new(
            run_id.clone(),
            request.url.clone(),
            request.goal.clone(),
            request.allowlist.clone(),
            request.keep_open,
        ));
        self.bus.publish(
            &run_id,
            RunEvent::SessionCreated {
                run_id: run_id.clone(),
            },
        );
        info!(target: "orchestrator", run = %run_id, "run accepted");

        let coordinator = self.clone();
        let spawned_run = run_id.clone();
        tokio::spawn(async move {
            coordinator.drive(spawned_run, request).await;
        });
        run_id
    }

    async fn drive(self: Arc<Self>, run_id: RunId, request: RunRequest) {
        self.registry.set_status(&run_id, RunStatus::Running);

        let lease = match self.pages.acquire().await {
            Ok(lease) => lease,
            Err(err) => {
                self.finish_failed(&run_id, err.to_string());
                return;
            }
        };

        let mut cast: Option<ScreencastHandle> = None;
        let result = self
            .run_on_page(&run_id, &request, lease.page(), &mut cast)
            .await;

        match result {
            Ok(outcome) => {
                self.bus
                    .publish(&run_id, RunEvent::SessionFinished { ok: true });
                let status = if outcome.blocked {
                    RunStatus::Blocked
                } else {
                    RunStatus::Finished
                };
                self.registry.set_status(&run_id, status);
                info!(target: "orchestrator", run = %run_id, %status, "run finished");
                if !request.keep_open {
                    lease.close().await;
                }
            }
            Err(err) => {
                self.finish_failed(&run_id, err.to_string());
                lease.close().await;
            }
        }

        if let Some(cast) = cast {
            cast.stop();
        }

        // The room and registry record stay available for late subscribers,
        // then age out so finished runs do not accumulate forever.
        let coordinator = self.clone();
        let retention = self.defaults.room_retention;
        tokio::spawn(async move {
            sleep(retention).await;
            coordinator.bus.release(&run_id);
            coordinator.registry.remove(&run_id);
        });
    }

    fn finish_failed(&self, run_id: &RunId, message: String) {
        warn!(target: "orchestrator", run = %run_id, error = %message, "run failed");
        self.bus.publish(
            run_id,
            RunEvent::Error {
                message: message.clone(),
            },
        );
        self.registry.fail(run_id, message);
    }

    async fn run_on_page(
        &self,
        run_id: &RunId,
        request: &RunRequest,
        page: Arc<dyn DriverPage>,
        cast: &mut Option<ScreencastHandle>,
    ) -> anyhow::Result<RunOutcome> {
        if let Some(url) = request.url.as_deref().filter(|url| !url.is_empty()) {
            page.navigate(url).await?;
            self.bus
                .publish(run_id, RunEvent::Nav { url: url.to_string() });
        }

        if request.live {
            *cast = Some(
                screencast::start(
                    self.bus.clone(),
                    run_id.clone(),
                    page.clone(),
                    self.defaults.screencast.clone(),
                )
                .await?,
            );
            self.bus.publish(
                run_id,
                RunEvent::SessionStarted {
                    env: self.defaults.env_label.clone(),
                    run_id: run_id.clone(),
                },
            );
            // One immediate frame so viewers have a picture before the first
            // tick; a failed capture here is not fatal.
            match page.capture_jpeg(self.defaults.screencast.jpeg_quality).await {
                Ok(bytes) => self.bus.publish(
                    run_id,
                    RunEvent::Frame {
                        image: FrameImage::Jpeg(BASE64.encode(bytes)),
                    },
                ),
                Err(err) => debug!(target: "orchestrator", run = %run_id, %err, "initial frame capture failed"),
            }
        }

        let (episodes, allowlist) = self.resolve_episodes(run_id, request, page.as_ref()).await;
        let instructions = build_agent_instructions(&allowlist);
        let model = request
            .model
            .clone()
            .unwrap_or_else(|| self.defaults.model.clone());
        let agent = self.agents.agent_for(&model, &instructions)?;

        let executor = EpisodeExecutor::new(self.bus.clone(), run_id.clone());
        let mut blocked = false;
        for (idx, spec) in episodes.iter().enumerate() {
            let result = executor.run(agent.as_ref(), idx, spec).await?;
            self.registry.record_episode(run_id, &result.actions);
            if result.blocked {
                blocked = true;
                break;
            }
            if idx + 1 < episodes.len() {
                sleep(self.defaults.inter_episode_pause).await;
            }
        }

        Ok(RunOutcome { blocked })
    }

    /// Decide the episode list: explicit episodes win, then a planner pass
    /// when a goal was given, then a single fallback episode from the raw
    /// task or goal. `planned` is published only when a plan was used.
    async fn resolve_episodes(
        &self,
        run_id: &RunId,
        request: &RunRequest,
        page: &dyn DriverPage,
    ) -> (Vec<EpisodeSpec>, Vec<String>) {
        if !request.episodes.is_empty() {
            let episodes = request
                .episodes
                .iter()
                .map(|input| {
                    EpisodeSpec::new(
                        input.task.clone(),
                        input.max_steps.unwrap_or(request.max_steps),
                    )
                })
                .collect();
            return (episodes, request.allowlist.clone());
        }

        let goal = request
            .goal
            .as_deref()
            .filter(|goal| !goal.trim().is_empty());
        if let (Some(goal), Some(planner)) = (goal, self.planner.as_ref()) {
            let html_snippet = match page.content().await {
                Ok(html) => html,
                Err(err) => {
                    debug!(target: "orchestrator", run = %run_id, %err, "page content unavailable for planning");
                    String::new()
                }
            };
            let plan_request = PlanRequest {
                url: request.url.clone().unwrap_or_default(),
                goal: goal.to_string(),
                html_snippet,
                max_episodes: DEFAULT_MAX_EPISODES,
                default_max_steps: request.max_steps,
            };
            match planner.plan(&plan_request).await {
                Ok(EpisodePlan {
                    allowlist: planned_allowlist,
                    episodes,
                }) => {
                    let allowlist = union_allowlist(&request.allowlist, &planned_allowlist);
                    self.bus.publish(
                        run_id,
                        RunEvent::Planned {
                            allowlist: allowlist.clone(),
                            episodes: episodes.clone(),
                        },
                    );
                    return (episodes, allowlist);
                }
                Err(err) => {
                    warn!(target: "orchestrator", run = %run_id, %err, "planner failed, falling back to single episode");
                }
            }
        }

        let fallback = request
            .task
            .as_deref()
            .or(request.goal.as_deref())
            .map(str::trim)
            .filter(|task| !task.is_empty());
        let episodes = fallback
            .map(|task| vec![EpisodeSpec::new(task, request.max_steps)])
            .unwrap_or_default();
        (episodes, request.allowlist.clone())
    }
}

/// Union of caller and planner allowlists, deduplicated, caller's order
/// first.
fn union_allowlist(base: &[String], extra: &[String]) -> Vec<String> {
    let mut seen = HashSet::new();
    let mut union = Vec::new();
    for domain in base.iter().chain(extra.iter()) {
        if seen.insert(domain.clone()) {
            union.push(domain.clone());
        }
    }
    union
}
