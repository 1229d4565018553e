use clap::Parser;
use slack_claude_gateway::backend::SlackBackend;
use slack_claude_gateway::config::config_search_paths;
use slack_claude_gateway::{build_router, AccessGuard, AppState, GatewayConfig, SessionGateway, SharedLogger};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(
    name = "slack-claude-gateway",
    about = "Anthropic- and OpenAI-compatible completion endpoints backed by Claude in Slack",
    version
)]
struct Cli {
    /// Path to config file (TOML)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Address to bind (overrides config)
    #[arg(long)]
    host: Option<String>,

    /// Port to listen on (overrides config)
    #[arg(short, long)]
    port: Option<u16>,

    /// Request journal path
    #[arg(long, default_value = "slack-claude-gateway.log")]
    log_file: PathBuf,

    /// Print config search paths and exit
    #[arg(long)]
    show_config_paths: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "slack_claude_gateway=info,tower_http=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    if cli.show_config_paths {
        println!("Config search paths:");
        for (i, path) in config_search_paths().iter().enumerate() {
            println!("  {}. {}", i + 1, path.display());
        }
        return Ok(());
    }

    let mut config = GatewayConfig::find_and_load(cli.config.as_deref())?;

    if let Some(host) = cli.host {
        config.host = host;
    }
    if let Some(port) = cli.port {
        config.port = port;
    }

    let logger = SharedLogger::new(&cli.log_file)?;

    let client = reqwest::Client::builder()
        .timeout(std::time::Duration::from_secs(30))
        .build()?;
    let backend = SlackBackend::from_config(client, &config.slack)?;

    let guard = AccessGuard::new(config.resolve_server_token());
    if guard.is_permissive() {
        warn!(
            "{} is not set; every request will be accepted",
            config.server_token_env
        );
    }

    info!("slack-claude-gateway v{}", env!("CARGO_PKG_VERSION"));
    info!("  Slack API:  {}", config.slack.api_base);
    info!("  Poll:       every {}ms, timeout {}s", config.slack.poll_interval_ms, config.slack.reply_timeout_secs);
    info!("  Auth:       {}", if guard.is_permissive() { "disabled" } else { "x-token required" });
    info!("  Log file:   {}", cli.log_file.display());

    logger.info(
        "startup",
        format!("Starting slack-claude-gateway on {}", config.bind_addr()),
    );

    let bind_addr = config.bind_addr();
    let state = Arc::new(AppState {
        gateway: SessionGateway::new(Arc::new(backend)),
        guard,
        logger,
        config,
    });

    let app = build_router(state);
    let listener = tokio::net::TcpListener::bind(&bind_addr).await?;

    info!("Listening on http://{}", bind_addr);

    axum::serve(listener, app).await?;

    Ok(())
}
