//! Wire events broadcast to run subscribers.
//!
//! One variant per event `type`; the discriminant set is closed so both the
//! publishing and consuming sides get exhaustiveness checking instead of the
//! duck-typed payloads the protocol grew up with.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{EpisodeSpec, RunId};

/// Image payload of a `frame` event. Externally tagged so the wire carries a
/// single `jpeg` / `png` / `imageData` key next to `type`.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub enum FrameImage {
    Jpeg(String),
    Png(String),
    ImageData(String),
}

impl FrameImage {
    /// Base64 payload regardless of encoding.
    pub fn data(&self) -> &str {
        match self {
            FrameImage::Jpeg(data) | FrameImage::Png(data) | FrameImage::ImageData(data) => data,
        }
    }
}

/// Everything a run can report to its subscribers.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case", rename_all_fields = "camelCase")]
pub enum RunEvent {
    #[serde(rename = "session.created")]
    SessionCreated { run_id: RunId },
    Nav {
        url: String,
    },
    #[serde(rename = "session.started")]
    SessionStarted { env: String, run_id: RunId },
    Frame {
        #[serde(flatten)]
        image: FrameImage,
    },
    Planned {
        allowlist: Vec<String>,
        episodes: Vec<EpisodeSpec>,
    },
    #[serde(rename = "episode.start")]
    EpisodeStart {
        idx: usize,
        max_steps: u32,
        task: String,
    },
    RateLimit {
        episode: usize,
        retry_after: u64,
    },
    #[serde(rename = "episode.error")]
    EpisodeError { idx: usize, message: String },
    #[serde(rename = "agent.action")]
    AgentAction {
        episode: usize,
        action_index: usize,
        action: String,
        details: String,
        timestamp: DateTime<Utc>,
    },
    #[serde(rename = "episode.finish")]
    EpisodeFinish {
        idx: usize,
        summary: String,
        actions_count: usize,
    },
    #[serde(rename = "agent.navigation")]
    AgentNavigation {
        url: String,
        timestamp: DateTime<Utc>,
    },
    #[serde(rename = "agent.console")]
    AgentConsole {
        level: String,
        text: String,
        timestamp: DateTime<Utc>,
    },
    #[serde(rename = "session.finished")]
    SessionFinished { ok: bool },
    Error {
        message: String,
    },
}

impl RunEvent {
    /// Wire discriminant, mainly for logging.
    pub fn kind(&self) -> &'static str {
        match self {
            RunEvent::SessionCreated { .. } => "session.created",
            RunEvent::Nav { .. } => "nav",
            RunEvent::SessionStarted { .. } => "session.started",
            RunEvent::Frame { .. } => "frame",
            RunEvent::Planned { .. } => "planned",
            RunEvent::EpisodeStart { .. } => "episode.start",
            RunEvent::RateLimit { .. } => "rate_limit",
            RunEvent::EpisodeError { .. } => "episode.error",
            RunEvent::AgentAction { .. } => "agent.action",
            RunEvent::EpisodeFinish { .. } => "episode.finish",
            RunEvent::AgentNavigation { .. } => "agent.navigation",
            RunEvent::AgentConsole { .. } => "agent.console",
            RunEvent::SessionFinished { .. } => "session.finished",
            RunEvent::Error { .. } => "error",
        }
    }
}

/// Broadcast envelope: the event plus a per-room monotonically increasing id
/// that late subscribers use as a resume cursor.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct EventEnvelope {
    pub id: u64,
    #[serde(flatten)]
    pub event: RunEvent,
}
