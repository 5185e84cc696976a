//! Automation-agent boundary for runcast.
//!
//! Defines the traits the orchestrator drives (`AutomationAgent`,
//! `EpisodePlanner`), the normalized rate-limit signal, and thin
//! chat-completions-backed implementations of both. Action selection and DOM
//! grounding live behind the agent's own endpoint; this crate only shapes
//! requests and defensively parses responses.

pub mod agent;
pub mod errors;
pub mod model;
pub mod planner;
pub mod prompt;
mod util;

pub use agent::{AutomationAgent, ChatAgent, ChatAgentConfig};
pub use errors::{AgentError, RateLimitSignal, DEFAULT_RETRY_AFTER_SECONDS};
pub use model::{ActionTaken, EpisodeOutcome};
pub use planner::{
    clamp_planner_steps, EpisodePlan, EpisodePlanner, LlmPlanner, LlmPlannerConfig, PlanRequest,
    DEFAULT_MAX_EPISODES, HTML_SNIPPET_CAP, MAX_EPISODE_STEPS, MIN_EPISODE_STEPS,
};
pub use prompt::build_agent_instructions;
