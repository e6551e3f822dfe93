//! Application setup and initialization

pub mod database;
pub mod routes;
pub mod server;
pub mod services;

use anyhow::{Context, Result};
use std::sync::Arc;

use assetline_core::Config;
use assetline_worker::Dispatcher;

use crate::state::AppState;

/// Validate configuration, start telemetry, connect the database, wire services and
/// start the dispatcher.
pub async fn initialize_app(config: Config) -> Result<(Arc<AppState>, axum::Router, Dispatcher)> {
    config
        .validate()
        .context("Configuration validation failed")?;

    assetline_infra::init_telemetry(&config.base.log_format, &config.base.environment)
        .map_err(|e| anyhow::anyhow!("Failed to initialize telemetry: {}", e))?;

    let is_production = config.is_production();
    crate::error::set_production_mode(is_production);
    tracing::info!(is_production, "Configuration loaded and validated successfully");

    let pool = database::setup_database(&config).await?;
    let (state, dispatcher) = services::initialize_services(&config, pool).await?;
    let router = routes::setup_routes(state.clone());

    Ok((state, router, dispatcher.start()))
}
