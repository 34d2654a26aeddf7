use clap::Parser;
use dify_relay::config::config_search_paths;
use dify_relay::logging::Stage;
use dify_relay::{build_router, AppState, RelayConfig, SharedLogger};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(
    name = "dify-relay",
    about = "OpenAI-compatible chat completions relay in front of a Dify backend",
    version
)]
struct Cli {
    /// Path to config file (TOML)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Port to listen on (overrides config)
    #[arg(short, long)]
    port: Option<u16>,

    /// Address to bind (overrides config)
    #[arg(long)]
    host: Option<String>,

    /// Request journal path
    #[arg(long, default_value = "dify-relay.log")]
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
                .unwrap_or_else(|_| "dify_relay=info,tower_http=info".into()),
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

    let mut config = RelayConfig::find_and_load(cli.config.as_deref())?;

    if let Some(port) = cli.port {
        config.port = port;
    }
    if let Some(host) = cli.host {
        config.host = host;
    }

    // Fail fast on missing backend settings
    let backend = config.resolve_backend()?;

    let logger = SharedLogger::new(&cli.log_file)?;

    info!("dify-relay v{}", env!("CARGO_PKG_VERSION"));
    info!("  Backend:   {}", backend.url);
    info!("  Listen:    {}", config.bind_addr());
    info!("  Log file:  {}", cli.log_file.display());

    logger.info(
        Stage::Startup,
        format!(
            "Starting dify-relay backend={} bind={}",
            backend.url,
            config.bind_addr()
        ),
    );

    // No request timeout: a hung backend holds only its own request open.
    let client = reqwest::Client::builder().build()?;

    let state = Arc::new(AppState {
        backend,
        client,
        logger,
    });

    let app = build_router(state);
    let bind_addr = config.bind_addr();
    let listener = tokio::net::TcpListener::bind(&bind_addr).await?;

    info!("Listening on http://{}", bind_addr);
    info!("  OPENAI_BASE_URL=http://localhost:{}/v1", config.port);

    axum::serve(listener, app).await?;

    Ok(())
}
