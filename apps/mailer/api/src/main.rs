//! Mailer API - bulk email campaigns over each user's own relay account

use axum_helpers::server::{create_production_app, health_router};
use core_config::tracing::{init_tracing, install_color_eyre};
use database::postgres::{check_health, connect_from_config_with_retry, run_migrations};
use domain_campaigns::{CredentialCipher, SmtpConnector};
use migration::Migrator;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

mod api;
mod config;
mod openapi;
mod state;

use config::Config;
use state::AppState;

#[tokio::main]
async fn main() -> eyre::Result<()> {
    install_color_eyre();

    let config = Config::from_env()?;
    init_tracing(&config.environment);

    info!("Connecting to PostgreSQL");
    let db = connect_from_config_with_retry(config.postgres.clone(), None).await?;
    run_migrations::<Migrator>(&db, config.app.name).await?;
    check_health(&db).await?;

    let state = AppState {
        cipher: CredentialCipher::from_config(&config.vault),
        connector: Arc::new(SmtpConnector::new(config.smtp.clone())),
        config,
        db,
    };

    let api_routes = api::routes(&state);
    let router = axum_helpers::create_router::<openapi::ApiDoc>(api_routes).await?;
    let app = router.merge(health_router(state.config.app));

    info!(
        port = state.config.server.port,
        smtp_host = %state.config.smtp.host,
        smtp_port = state.config.smtp.port,
        "Starting Mailer API"
    );

    let db = state.db.clone();
    create_production_app(
        app,
        &state.config.server,
        Duration::from_secs(30),
        async move {
            info!("Shutting down: closing PostgreSQL connections");
            if let Err(e) = db.close().await {
                tracing::error!(error = %e, "Failed to close PostgreSQL pool");
            }
        },
    )
    .await
    .map_err(|e| eyre::eyre!("Server error: {}", e))?;

    info!("Mailer API shutdown complete");
    Ok(())
}
