use anyhow::Context;
use clap::Parser;
use site_assistant::assistant::{Assistant, AssistantSettings};
use site_assistant::config::Config;
use site_assistant::llm::LLMClient;
use site_assistant::server::{create_router, AppState, SharedState};
use site_assistant::site::HttpSiteFetcher;
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::{info, level_filters::LevelFilter};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[derive(Parser, Debug)]
#[command(name = "site-assistant", version, about = "Website assistant backed by a chat-completion API")]
struct Args {
    /// Path to a TOML config file (falls back to $SITE_ASSISTANT_CONFIG, then defaults)
    #[arg(short, long)]
    config: Option<String>,

    /// Override server.host
    #[arg(long)]
    host: Option<String>,

    /// Override server.port
    #[arg(short, long)]
    port: Option<u16>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let env_filter = EnvFilter::builder()
        .with_default_directive(LevelFilter::INFO.into())
        .from_env_lossy()
        .add_directive("site_assistant=debug".parse()?)
        .add_directive("axum::rejection=trace".parse()?);

    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(env_filter)
        .init();

    let args = Args::parse();

    let mut config = match &args.config {
        Some(path) => Config::load(path)?,
        None => Config::load_auto()?,
    };
    if let Some(host) = args.host {
        config.server.host = host;
    }
    if let Some(port) = args.port {
        config.server.port = port;
    }

    let api_key = config
        .resolve_api_key(|name| std::env::var(name).ok())
        .context("Cannot start without a completion API key")?;

    info!(
        model = %config.llm.model,
        site_enabled = config.site.enabled,
        "Site assistant starting"
    );

    let llm_client = Arc::new(LLMClient::new(
        config.llm.api_base.clone(),
        api_key,
        config.llm.timeout_secs,
    )?);
    let site_fetcher = Arc::new(HttpSiteFetcher::new(config.site.timeout_secs)?);

    let state: SharedState = Arc::new(AppState {
        assistant: Assistant::new(AssistantSettings::from(&config), site_fetcher, llm_client),
        max_body_bytes: config.server.max_body_bytes,
    });

    let app = create_router(state, &config.server);

    let listener_addr = config.listen_addr();
    let listener = TcpListener::bind(&listener_addr).await?;
    info!("Server listening on http://{}{}", listener_addr, config.server.path);

    axum::serve(listener, app).await?;

    Ok(())
}
