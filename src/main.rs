use tracing_subscriber::{EnvFilter, fmt};
use tracing::info;

use invitely::config::AppConfig;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Init logging
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new("info"))?;
    fmt().with_env_filter(filter).init();

    let cfg = AppConfig::from_env()?;

    // Startup banner at info level so something always prints at default verbosity
    let rust_log = std::env::var("RUST_LOG").unwrap_or_else(|_| "<unset>".to_string());
    info!(
        target: "invitely",
        "Invitely starting: RUST_LOG='{}', addr={}, policy_file={:?}, users_file={:?}",
        rust_log, cfg.socket_addr(), cfg.policy_file, cfg.users_file
    );

    invitely::server::run(cfg).await
}
