mod agent;
mod chat_history;
mod config_manager;
mod conversations;
mod error;
mod mcp;
mod routes;
mod state;
mod tools;

#[cfg(test)]
mod testing;

use anyhow::{Context, Result};
use std::net::SocketAddr;
use std::path::PathBuf;
use tracing::{debug, info, warn};

use config_manager::Config;
use state::AppState;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "rental_ai_backend=debug,tower_http=debug".into()),
        )
        .init();

    let mut config = load_config()?;
    config.apply_env_overrides(|name| std::env::var(name).ok());

    // Initialize app state
    let app_state = AppState::new(config.clone())?;

    // Build application
    let app = routes::build_app(app_state);

    // Start server
    let system_config = &config.system_config;
    let addr: SocketAddr = format!("{}:{}", system_config.host, system_config.port).parse()?;
    info!("Starting server on {}", addr);
    info!("Tool servers read from {}", system_config.mcp_config_path);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

/// Load configuration from `$CONFIG_PATH` or the first candidate file that exists.
/// Only a missing candidate falls through; a file that fails to load stops startup.
fn load_config() -> Result<Config> {
    // Get the executable directory to resolve relative paths correctly
    let exe_dir = std::env::current_exe()
        .ok()
        .and_then(|p| p.parent().map(|p| p.to_path_buf()))
        .unwrap_or_else(|| PathBuf::from("."));

    let candidates: Vec<PathBuf> = vec![
        PathBuf::from("conf.jsonld"),
        PathBuf::from("conf.json"),
        PathBuf::from("conf.yaml"),
        exe_dir.join("conf.jsonld"),
        exe_dir.join("conf.yaml"),
    ];

    load_config_from(std::env::var("CONFIG_PATH").ok(), &candidates)
}

fn load_config_from(explicit: Option<String>, candidates: &[PathBuf]) -> Result<Config> {
    if let Some(path) = explicit {
        let config = Config::load(&path)
            .with_context(|| format!("Failed to load CONFIG_PATH={}", path))?;
        info!("Loaded configuration from: {}", path);
        return Ok(config);
    }

    for path in candidates {
        if !path.exists() {
            debug!("No config at {}", path.display());
            continue;
        }
        let path = path.to_string_lossy();
        let config = Config::load(&path)?;
        info!("Loaded configuration from: {}", path);
        return Ok(config);
    }

    warn!("No configuration file found (tried {:?}), using defaults", candidates);
    Ok(Config::default())
}
