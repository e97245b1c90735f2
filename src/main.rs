mod app;
mod auth;
mod body;
mod bootstrap;
mod config;
mod error;
mod profile;
mod state;
mod users;


use anyhow::Context;

use crate::config::AppConfig;
use crate::state::AppState;

fn init_tracing() {
    let env_filter = std::env::var("RUST_LOG")
        .unwrap_or_else(|_| "userdir=debug,axum=info,tower_http=info".to_string());
    let json_logs = std::env::var("LOG_FORMAT")
        .map(|v| v == "json")
        .unwrap_or(false);

    if json_logs {
        tracing_subscriber::fmt()
            .with_env_filter(env_filter)
            .with_target(false)
            .json()
            .init();
    } else {
        tracing_subscriber::fmt().with_env_filter(env_filter).init();
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    init_tracing();

    if let Err(e) = run().await {
        tracing::error!(error = ?e, "startup failed");
        return Err(e);
    }
    Ok(())
}

async fn run() -> anyhow::Result<()> {
    let config = AppConfig::from_env().context("load configuration")?;
    let state = AppState::init(config).await?;

    bootstrap::ensure_admin(state.store.as_ref(), &state.config.admin)
        .await
        .context("ensure admin account")?;

    let config = state.config.clone();
    app::serve(app::build_app(state), &config).await
}
