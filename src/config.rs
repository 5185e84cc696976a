use std::net::SocketAddr;

/// Everything the serve entrypoint needs, resolved from CLI flags and
/// environment by `main`.
#[derive(Clone, Debug)]
pub struct ServeConfig {
    pub bind: SocketAddr,
    /// Default agent model when a run request does not name one.
    pub model: String,
    /// Label surfaced in `session.started`, e.g. `LOCAL`.
    pub env_label: String,
    pub api_base: String,
    pub api_key: String,
    pub headless: bool,
    /// Capture rate for the fast JPEG strategy.
    pub protocol_fps: u32,
    /// Capture rate for the PNG polling fallback.
    pub polling_fps: u32,
}
