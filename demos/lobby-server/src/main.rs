use std::time::Duration;

use tandem::prelude::*;
use tracing_subscriber::EnvFilter;

const DEFAULT_BIND: &str = "0.0.0.0:7700";

/// Reads the server settings from the environment.
///
/// `TANDEM_BIND` sets the listen address; `TANDEM_UNARY_DEADLINE_MS` and
/// `TANDEM_IDLE_TIMEOUT_SECS` override the matching defaults.
fn config_from_env() -> ServerConfig {
    let mut config = ServerConfig {
        bind_addr: std::env::var("TANDEM_BIND").unwrap_or_else(|_| DEFAULT_BIND.to_string()),
        ..ServerConfig::default()
    };
    if let Some(ms) = env_u64("TANDEM_UNARY_DEADLINE_MS") {
        config.unary_deadline = Duration::from_millis(ms);
    }
    if let Some(secs) = env_u64("TANDEM_IDLE_TIMEOUT_SECS") {
        config.idle_timeout = Duration::from_secs(secs);
    }
    config
}

fn env_u64(key: &str) -> Option<u64> {
    let raw = std::env::var(key).ok()?;
    match raw.parse() {
        Ok(value) => Some(value),
        Err(_) => {
            tracing::warn!(key, value = %raw, "ignoring unparsable setting");
            None
        }
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let config = config_from_env();
    tracing::info!(bind = %config.bind_addr, "starting lobby server");

    let server = TandemServer::builder().config(config).build().await?;

    server
        .run_until(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                tracing::error!(error = %e, "cannot listen for ctrl-c");
                std::future::pending::<()>().await;
            }
            tracing::info!("ctrl-c received");
        })
        .await?;
    Ok(())
}
