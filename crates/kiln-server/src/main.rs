// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Kiln Server - Pottery Studio HTTP API
//!
//! Serves the studio API and runs the hold sweeper in the background.

use std::net::SocketAddr;
use std::sync::Arc;

use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use kiln_core::HandlerState;
use kiln_core::config::Config;
use kiln_core::hold_sweeper::{HoldSweeper, HoldSweeperConfig};
use kiln_core::persistence::{Persistence, PostgresPersistence, SqlitePersistence};
use kiln_server::config::{LogFormat, ServerConfig};
use kiln_server::{AppState, app};

const DEFAULT_LOG_FILTER: &str = "kiln_server=info,kiln_core=info,tower_http=info";

fn init_tracing(format: LogFormat) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER));

    match format {
        LogFormat::Text => tracing_subscriber::fmt().with_env_filter(filter).init(),
        LogFormat::Json => tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .init(),
    }
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!(error = %e, "Failed to listen for shutdown signal");
    }
    info!("Shutdown signal received");
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // .env may carry KILN_LOG_FORMAT, so load it before logging starts
    let dotenv = dotenvy::dotenv();

    let server_config = ServerConfig::from_env()?;
    init_tracing(server_config.log_format);

    if let Err(e) = dotenv {
        warn!("No .env file loaded: {}", e);
    }

    let config = Config::from_env()?;
    let sweeper_config = HoldSweeperConfig::from_env()?;

    info!(
        http_port = server_config.http_port,
        sqlite = config.is_sqlite(),
        max_db_connections = config.max_db_connections,
        hold_ttl_secs = config.hold_ttl.as_secs(),
        "Starting Kiln Server"
    );

    let persistence: Arc<dyn Persistence> = if config.is_sqlite() {
        Arc::new(SqlitePersistence::connect(&config.database_url, config.max_db_connections).await?)
    } else {
        Arc::new(
            PostgresPersistence::connect(&config.database_url, config.max_db_connections).await?,
        )
    };

    info!("Connected to database, migrations applied");

    let handlers = HandlerState::from_config(persistence.clone(), &config)?;
    let sweeper = Arc::new(HoldSweeper::new(persistence, sweeper_config));
    let sweeper_shutdown = sweeper.shutdown_handle();
    let sweeper_task = {
        let sweeper = sweeper.clone();
        tokio::spawn(async move { sweeper.run().await })
    };

    let state = AppState::new(handlers);
    let addr = SocketAddr::from(([0, 0, 0, 0], server_config.http_port));
    let listener = tokio::net::TcpListener::bind(addr).await?;

    info!(addr = %addr, "Kiln Server ready");

    axum::serve(listener, app(state))
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    sweeper_shutdown.notify_one();
    sweeper_task.await?;

    info!("Kiln Server shut down");

    Ok(())
}
