use anyhow::Result;
use clap::Parser;
use flowscope_server::monitor::LatencyMonitor;
use flowscope_server::store::FlowStore;
use flowscope_server::{api, config, registry};
use std::sync::Arc;
use tracing::info;

/// Flowscope — protocol-neutral flow telemetry collector & analyzer.
#[derive(Parser, Debug)]
#[command(name = "flowscope-server", version, about)]
struct Cli {
    /// Address and port to listen on.
    #[arg(short, long, default_value = "0.0.0.0:8080")]
    listen: String,

    /// Path to a TOML configuration file (optional).
    #[arg(short, long)]
    config: Option<String>,
}

const BANNER: &str = r#"
  _____ _
 |  ___| | _____      _____  ___ ___  _ __   ___
 | |_  | |/ _ \ \ /\ / / __|/ __/ _ \| '_ \ / _ \
 |  _| | | (_) \ V  V /\__ \ (_| (_) | |_) |  __/
 |_|   |_|\___/ \_/\_/ |___/\___\___/| .__/ \___|
                                     |_|
"#;

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing (logs).
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "flowscope_server=debug,tower_http=debug".into()),
        )
        .init();

    let cli = Cli::parse();

    println!("{BANNER}");
    info!(
        version = env!("CARGO_PKG_VERSION"),
        "Starting Flowscope server"
    );

    // Load optional config file.
    let app_config = if let Some(ref path) = cli.config {
        config::AppConfig::from_file(path)?
    } else {
        config::AppConfig::default()
    };

    // Shared bounded store for all collectors and analyzers.
    let store = Arc::new(FlowStore::new(app_config.store_capacity));

    // Instantiate the configured capabilities. Unknown names and
    // duplicates abort startup before anything is served.
    let ids = config::capability_ids(&app_config)?;
    let mut capabilities = registry::CapabilityRegistry::new();
    for id in &ids {
        let cap = registry::build_capability(id, &store, &app_config.baseline)?;
        capabilities.register(cap)?;
    }
    info!(capabilities = ?capabilities.list(), "Capabilities registered");

    let monitor = LatencyMonitor::new(
        app_config.monitor.threshold_ms,
        app_config.monitor.window_seconds,
        app_config.monitor.min_samples,
        app_config.monitor.cooldown_seconds,
    );

    // Build the application router.
    let state = api::AppState::new(store, Arc::new(capabilities), monitor);
    let app = api::router(state);

    // Start listening.
    let listener = tokio::net::TcpListener::bind(&cli.listen).await?;
    info!(addr = %cli.listen, "Listening");

    axum::serve(listener, app).await?;

    Ok(())
}
