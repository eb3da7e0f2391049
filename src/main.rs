use clap::Parser;
use relay::config::ServerConfig;
use relay::server::ServerBuilder;
use tracing_subscriber::EnvFilter;

/// Channel-based WebSocket broadcast server
#[derive(Debug, Parser)]
#[command(name = "relay", version, about)]
struct Cli {
    /// Path to a YAML config file
    #[arg(short, long, env = "RELAY_CONFIG")]
    config: Option<String>,

    /// Override the listen port
    #[arg(short, long)]
    port: Option<u16>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // file (or defaults) < RELAY_* env < CLI flags
    let mut config = match cli.config.as_deref() {
        Some(path) => ServerConfig::from_yaml_file(path)?,
        None => ServerConfig::default(),
    };
    config.apply_env_overrides()?;
    if let Some(port) = cli.port {
        config.port = port;
    }

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| config.log_filter.as_str().into()),
        )
        .init();

    tracing::info!(
        config_file = cli.config.as_deref().unwrap_or("<defaults>"),
        addr = %config.socket_addr(),
        queue_capacity = config.queue_capacity,
        rate_limit = config.rate_limit.enabled,
        "Starting relay"
    );

    ServerBuilder::new().with_config(config).serve().await
}
