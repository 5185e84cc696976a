use std::time::Duration;

use async_trait::async_trait;
use serde::Serialize;
use serde_json::Value;
use tracing::debug;

use runcast_core_types::EpisodeSpec;

use crate::errors::AgentError;
use crate::util::extract_json_object;

/// Bounds for planner-chosen episode step budgets.
pub const MIN_EPISODE_STEPS: u32 = 4;
pub const MAX_EPISODE_STEPS: u32 = 8;
/// Episodes requested from the planner per run.
pub const DEFAULT_MAX_EPISODES: usize = 3;
/// Page HTML handed to the planner is truncated to this many characters.
pub const HTML_SNIPPET_CAP: usize = 30_000;

/// Inputs the planner sees for one run.
#[derive(Clone, Debug)]
pub struct PlanRequest {
    pub url: String,
    pub goal: String,
    pub html_snippet: String,
    pub max_episodes: usize,
    /// Caller's request-level step budget, applied (clamped) when the model
    /// omits `maxSteps` for an episode.
    pub default_max_steps: u32,
}

/// Planner output: domains the agent may touch plus the episode list.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct EpisodePlan {
    pub allowlist: Vec<String>,
    pub episodes: Vec<EpisodeSpec>,
}

/// Decomposes a goal into bounded episodes. Callers treat a failure as
/// "plan it yourself", not as a run failure.
#[async_trait]
pub trait EpisodePlanner: Send + Sync {
    async fn plan(&self, request: &PlanRequest) -> Result<EpisodePlan, AgentError>;
}

#[derive(Clone, Debug)]
pub struct LlmPlannerConfig {
    pub api_base: String,
    pub api_key: String,
    pub model: String,
    pub timeout: Duration,
}

impl LlmPlannerConfig {
    pub fn new(api_base: impl Into<String>, api_key: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            api_base: api_base.into(),
            api_key: api_key.into(),
            model: model.into(),
            timeout: Duration::from_secs(60),
        }
    }
}

/// Chat-completions-backed planner. Output parsing is deliberately tolerant:
/// any episode entry without a usable task is dropped rather than failing the
/// whole plan.
pub struct LlmPlanner {
    client: reqwest::Client,
    config: LlmPlannerConfig,
}

impl LlmPlanner {
    pub fn new(config: LlmPlannerConfig) -> Result<Self, AgentError> {
        let client = reqwest::Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|err| AgentError::request(format!("failed to build HTTP client: {err}")))?;
        Ok(Self { client, config })
    }
}

#[async_trait]
impl EpisodePlanner for LlmPlanner {
    async fn plan(&self, request: &PlanRequest) -> Result<EpisodePlan, AgentError> {
        let url = format!(
            "{}/chat/completions",
            self.config.api_base.trim_end_matches('/')
        );
        let body = PlannerChatRequest {
            model: self.config.model.clone(),
            temperature: 0.0,
            messages: vec![
                PlannerMessage {
                    role: "system",
                    content: planner_system_prompt(request.max_episodes),
                },
                PlannerMessage {
                    role: "user",
                    content: planner_user_prompt(request),
                },
            ],
        };

        let response = self
            .client
            .post(&url)
            .bearer_auth(&self.config.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|err| AgentError::request(format!("planner endpoint unreachable: {err}")))?;
        if !response.status().is_success() {
            return Err(AgentError::request(format!(
                "planner endpoint returned {}",
                response.status()
            )));
        }

        let payload: Value = response
            .json()
            .await
            .map_err(|err| AgentError::invalid_response(err.to_string()))?;
        let content = payload
            .pointer("/choices/0/message/content")
            .and_then(Value::as_str)
            .ok_or_else(|| AgentError::invalid_response("planner response missing content"))?;

        let plan = parse_plan(content, request.default_max_steps)
            .ok_or_else(|| AgentError::invalid_response("planner returned no usable plan"))?;
        debug!(target: "planner", episodes = plan.episodes.len(), "plan parsed");
        Ok(plan)
    }
}

fn planner_system_prompt(max_episodes: usize) -> String {
    [
        "You plan browser automation runs. Output compact JSON only, no prose.".to_string(),
        format!(
            "Shape: {{\"allowlist\": [domains], \"episodes\": [{{\"task\": string, \"maxSteps\": number}}]}} with at most {max_episodes} episodes."
        ),
        format!("maxSteps must be between {MIN_EPISODE_STEPS} and {MAX_EPISODE_STEPS}."),
        "Make each task specific and self-contained; for searches prefer site:domain queries.".to_string(),
    ]
    .join("\n")
}

fn planner_user_prompt(request: &PlanRequest) -> String {
    let mut snippet = request.html_snippet.as_str();
    if snippet.len() > HTML_SNIPPET_CAP {
        let mut cut = HTML_SNIPPET_CAP;
        while !snippet.is_char_boundary(cut) {
            cut -= 1;
        }
        snippet = &snippet[..cut];
    }
    format!(
        "URL: {}\nGOAL: {}\n\nHTML_SNIPPET:\n{}",
        request.url, request.goal, snippet
    )
}

/// Clamp a planner-provided step budget into the allowed band, falling back to
/// `default` when the value is absent or not a positive integer.
pub fn clamp_planner_steps(raw: Option<i64>, default: u32) -> u32 {
    match raw {
        Some(value) if value > 0 => {
            (value.min(MAX_EPISODE_STEPS as i64) as u32).max(MIN_EPISODE_STEPS)
        }
        _ => default.clamp(MIN_EPISODE_STEPS, MAX_EPISODE_STEPS),
    }
}

fn parse_plan(content: &str, default_max_steps: u32) -> Option<EpisodePlan> {
    let json = extract_json_object(content)?;
    let value: Value = serde_json::from_str(&json).ok()?;

    let allowlist = value
        .get("allowlist")
        .and_then(Value::as_array)
        .map(|entries| {
            entries
                .iter()
                .filter_map(Value::as_str)
                .map(str::trim)
                .filter(|domain| !domain.is_empty())
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default();

    let episodes: Vec<EpisodeSpec> = value
        .get("episodes")
        .and_then(Value::as_array)
        .map(|entries| {
            entries
                .iter()
                .filter_map(|entry| {
                    let task = entry.get("task").and_then(Value::as_str)?.trim();
                    if task.is_empty() {
                        return None;
                    }
                    let steps = clamp_planner_steps(
                        entry.get("maxSteps").and_then(Value::as_i64),
                        default_max_steps,
                    );
                    Some(EpisodeSpec::new(task, steps))
                })
                .collect()
        })
        .unwrap_or_default();

    if episodes.is_empty() {
        return None;
    }
    Some(EpisodePlan {
        allowlist,
        episodes,
    })
}

#[derive(Serialize)]
struct PlannerChatRequest {
    model: String,
    temperature: f32,
    messages: Vec<PlannerMessage>,
}

#[derive(Serialize)]
struct PlannerMessage {
    role: &'static str,
    content: String,
}
