use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::errors::{AgentError, DEFAULT_RETRY_AFTER_SECONDS};
use crate::model::{ActionTaken, EpisodeOutcome};
use crate::util::extract_json_object;

/// Capability that maps one natural-language instruction to a bounded
/// sequence of browser actions. Implementations may raise
/// [`AgentError::RateLimited`] carrying a retry-after hint.
#[async_trait]
pub trait AutomationAgent: Send + Sync {
    async fn execute(
        &self,
        instruction: &str,
        max_steps: u32,
    ) -> Result<EpisodeOutcome, AgentError>;
}

#[derive(Clone, Debug)]
pub struct ChatAgentConfig {
    pub api_base: String,
    pub api_key: String,
    pub model: String,
    pub temperature: f32,
    pub timeout: Duration,
}

impl ChatAgentConfig {
    pub fn new(api_base: impl Into<String>, api_key: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            api_base: api_base.into(),
            api_key: api_key.into(),
            model: model.into(),
            temperature: 0.0,
            timeout: Duration::from_secs(180),
        }
    }
}

/// Chat-completions-backed agent adapter. One `execute` call is one upstream
/// request; the endpoint owns action selection and grounding.
pub struct ChatAgent {
    client: reqwest::Client,
    config: ChatAgentConfig,
    instructions: String,
}

impl ChatAgent {
    pub fn new(config: ChatAgentConfig, instructions: impl Into<String>) -> Result<Self, AgentError> {
        if config.api_key.trim().is_empty() {
            return Err(AgentError::request("missing API key for automation agent"));
        }
        let client = reqwest::Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|err| AgentError::request(format!("failed to build HTTP client: {err}")))?;
        Ok(Self {
            client,
            config,
            instructions: instructions.into(),
        })
    }
}

#[async_trait]
impl AutomationAgent for ChatAgent {
    async fn execute(
        &self,
        instruction: &str,
        max_steps: u32,
    ) -> Result<EpisodeOutcome, AgentError> {
        let url = format!(
            "{}/chat/completions",
            self.config.api_base.trim_end_matches('/')
        );
        let body = ChatCompletionRequest {
            model: self.config.model.clone(),
            temperature: self.config.temperature,
            messages: vec![
                ChatMessage {
                    role: "system",
                    content: self.instructions.clone(),
                },
                ChatMessage {
                    role: "user",
                    content: format!(
                        "TASK: {instruction}\nMAX_STEPS: {max_steps}\n\nExecute the task, then report JSON only: {{\"message\": string, \"actions\": [{{\"action\": string, \"details\": string}}]}}"
                    ),
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
            .map_err(|err| AgentError::request(format!("agent endpoint unreachable: {err}")))?;

        if response.status().as_u16() == 429 {
            let retry_after_seconds = response
                .headers()
                .get("retry-after")
                .and_then(|value| value.to_str().ok())
                .and_then(|value| value.trim().parse::<u64>().ok())
                .unwrap_or(DEFAULT_RETRY_AFTER_SECONDS);
            return Err(AgentError::RateLimited {
                retry_after_seconds,
            });
        }
        if !response.status().is_success() {
            let status = response.status();
            let text = response
                .text()
                .await
                .unwrap_or_else(|_| "<response unavailable>".to_string());
            return Err(AgentError::request(format!(
                "agent endpoint returned {status}: {text}"
            )));
        }

        let payload: ChatCompletionResponse = response
            .json()
            .await
            .map_err(|err| AgentError::invalid_response(err.to_string()))?;
        let content = payload
            .choices
            .first()
            .map(|choice| choice.message.content.clone())
            .ok_or_else(|| AgentError::invalid_response("response missing content"))?;

        Ok(parse_outcome(&content))
    }
}

/// Shape the outcome defensively: structured JSON when the model obeyed,
/// otherwise the raw text as the summary with no actions.
fn parse_outcome(content: &str) -> EpisodeOutcome {
    let Some(json) = extract_json_object(content) else {
        return EpisodeOutcome {
            message: content.trim().to_string(),
            actions: Vec::new(),
        };
    };
    match serde_json::from_str::<RawOutcome>(&json) {
        Ok(raw) => EpisodeOutcome {
            message: raw.message.unwrap_or_default(),
            actions: raw
                .actions
                .into_iter()
                .map(|action| {
                    ActionTaken::new(
                        action.action.unwrap_or_else(|| "unknown".to_string()),
                        action.details.unwrap_or_default(),
                    )
                })
                .collect(),
        },
        Err(err) => {
            warn!(target: "agent", %err, "agent returned unparsable outcome JSON");
            EpisodeOutcome {
                message: content.trim().to_string(),
                actions: Vec::new(),
            }
        }
    }
}

#[derive(Serialize)]
struct ChatCompletionRequest {
    model: String,
    temperature: f32,
    messages: Vec<ChatMessage>,
}

#[derive(Serialize)]
struct ChatMessage {
    role: &'static str,
    content: String,
}

#[derive(Deserialize)]
struct ChatCompletionResponse {
    choices: Vec<ChatCompletionChoice>,
}

#[derive(Deserialize)]
struct ChatCompletionChoice {
    message: ChatCompletionMessage,
}

#[derive(Deserialize)]
struct ChatCompletionMessage {
    content: String,
}

#[derive(Deserialize, Default)]
struct RawOutcome {
    #[serde(default)]
    message: Option<String>,
    #[serde(default)]
    actions: Vec<RawAction>,
}

#[derive(Deserialize)]
struct RawAction {
    #[serde(default)]
    action: Option<String>,
    #[serde(default)]
    details: Option<String>,
}
