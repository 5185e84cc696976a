use std::net::SocketAddr;

use clap::{Args, Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use runcast::config::ServeConfig;
use runcast::server;

#[derive(Parser)]
#[command(name = "runcast", version, about = "Episodic browser-run orchestrator with live event broadcast")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Start the HTTP/WebSocket server.
    Serve(ServeArgs),
}

#[derive(Args)]
struct ServeArgs {
    #[arg(long, default_value = "127.0.0.1:8787")]
    bind: SocketAddr,

    /// Default agent model for runs that do not name one.
    #[arg(long, default_value = "computer-use-preview")]
    model: String,

    /// Environment label surfaced in session events.
    #[arg(long, default_value = "LOCAL")]
    env_label: String,

    #[arg(long, env = "RUNCAST_API_BASE", default_value = "https://api.openai.com/v1")]
    api_base: String,

    #[arg(long, env = "RUNCAST_API_KEY", default_value = "", hide_env_values = true)]
    api_key: String,

    /// Run the browser headless. Pass `--headless false` for a visible window.
    #[arg(long, env = "RUNCAST_HEADLESS", default_value_t = true, action = clap::ArgAction::Set)]
    headless: bool,

    /// Frame rate for the fast JPEG capture strategy.
    #[arg(long, default_value_t = 10)]
    protocol_fps: u32,

    /// Frame rate for the PNG polling fallback (capped at 10 fps by the
    /// capture floor).
    #[arg(long, default_value_t = 4)]
    polling_fps: u32,
}

impl ServeArgs {
    fn into_config(self) -> ServeConfig {
        ServeConfig {
            bind: self.bind,
            model: self.model,
            env_label: self.env_label,
            api_base: self.api_base,
            api_key: self.api_key,
            headless: self.headless,
            protocol_fps: self.protocol_fps,
            polling_fps: self.polling_fps,
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_env("RUNCAST_LOG").unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    match cli.command {
        Command::Serve(args) => server::serve(args.into_config()).await,
    }
}
