mod router;
mod state;

use std::sync::Arc;

use tracing::info;

use runcast_agent::{EpisodePlanner, LlmPlanner, LlmPlannerConfig};
use runcast_browser::LaunchOptions;
use runcast_event_bus::EventBus;

use crate::config::ServeConfig;
use crate::orchestrator::{RunCoordinator, RunDefaults};
use crate::providers::{ChatAgentFactory, ChromiumPageProvider};
use crate::registry::RunRegistry;
use crate::screencast::ScreencastOptions;
use state::{ServeHealth, ServeState};

/// Wire the event bus, registry, coordinator, and HTTP surface, then serve
/// until the process is stopped.
pub async fn serve(config: ServeConfig) -> anyhow::Result<()> {
    let bus = Arc::new(EventBus::default());
    let registry = RunRegistry::new();

    let pages = Arc::new(ChromiumPageProvider::new(LaunchOptions {
        headless: config.headless,
        ..LaunchOptions::default()
    }));
    let agents = Arc::new(ChatAgentFactory::new(&config.api_base, &config.api_key));
    // Without a key there is no planner; runs fall back to a single episode.
    let planner = if config.api_key.trim().is_empty() {
        None
    } else {
        let planner = LlmPlanner::new(LlmPlannerConfig::new(
            &config.api_base,
            &config.api_key,
            &config.model,
        ))?;
        Some(Arc::new(planner) as Arc<dyn EpisodePlanner>)
    };

    let coordinator = Arc::new(RunCoordinator::new(
        bus.clone(),
        registry.clone(),
        pages,
        agents,
        planner,
        RunDefaults {
            model: config.model.clone(),
            env_label: config.env_label.clone(),
            screencast: ScreencastOptions::with_rates(config.protocol_fps, config.polling_fps),
            ..RunDefaults::default()
        },
    ));

    let health = Arc::new(ServeHealth::default());
    health.mark_live();
    health.mark_ready();

    let state = ServeState {
        bus,
        registry,
        coordinator,
        health,
    };
    let app = router::build_router().with_state(state);

    let listener = tokio::net::TcpListener::bind(config.bind).await?;
    info!(target: "server", bind = %config.bind, "listening");
    axum::serve(listener, app).await?;
    Ok(())
}
