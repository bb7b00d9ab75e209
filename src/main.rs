// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

use std::{net::SocketAddr, sync::Arc, time::Duration};

use axum_server::{tls_rustls::RustlsConfig, Handle};
use tokio_util::sync::CancellationToken;

use clinic_access::{
    api::router,
    auth::{session::run_session_sweeper, Role, RoleResolver, SessionStore},
    config::AppConfig,
    logging::init_tracing,
    state::AppState,
    storage::IdentityDatabase,
};

/// Time allowed for in-flight requests after a shutdown signal.
const SHUTDOWN_GRACE: Duration = Duration::from_secs(10);

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let config = AppConfig::from_env()?;
    init_tracing(config.log_format);

    tracing::info!(version = env!("CARGO_PKG_VERSION"), "Starting clinic access server");

    // Identity database and role set
    std::fs::create_dir_all(&config.data_dir)?;
    let db = IdentityDatabase::open(&config.identity_db_path())?;
    let seeded = db.seed_roles(&Role::default_set())?;
    if seeded > 0 {
        tracing::info!(seeded, "Seeded default roles");
    }

    let mapping = config.role_mapping()?;
    tracing::info!(
        mapped_accounts = mapping.len(),
        default_role = %mapping.default_role(),
        "Role mapping loaded"
    );

    let sessions = SessionStore::new(config.session_capacity, config.session_ttl);
    let state = AppState::new(
        db,
        sessions,
        RoleResolver::new(mapping),
        config.identity_verifier()?,
    )
    .with_guard(config.access_guard())
    .with_policy(config.access_policy()?);

    let shutdown = CancellationToken::new();
    tokio::spawn(run_session_sweeper(
        Arc::clone(&state.sessions),
        config.session_sweep_interval,
        shutdown.clone(),
    ));

    let app = router(state);
    let addr: SocketAddr = format!("{}:{}", config.host, config.port).parse()?;

    let handle = Handle::new();
    let signal_handle = handle.clone();
    tokio::spawn(async move {
        wait_for_shutdown_signal().await;
        shutdown.cancel();
        signal_handle.graceful_shutdown(Some(SHUTDOWN_GRACE));
    });

    match &config.tls {
        Some(tls) => {
            // Install the ring crypto provider for rustls before any TLS setup.
            if rustls::crypto::ring::default_provider().install_default().is_err() {
                tracing::debug!("rustls crypto provider already installed");
            }
            let tls_config = RustlsConfig::from_pem_file(&tls.cert, &tls.key).await?;
            tracing::info!(%addr, "Listening on https (docs at /docs)");
            axum_server::bind_rustls(addr, tls_config)
                .handle(handle)
                .serve(app.into_make_service())
                .await?;
        }
        None => {
            tracing::info!(%addr, "Listening on http (docs at /docs)");
            axum_server::bind(addr)
                .handle(handle)
                .serve(app.into_make_service())
                .await?;
        }
    }

    tracing::info!("Server stopped");
    Ok(())
}

/// Resolve on Ctrl+C. If the signal cannot be installed, never resolve.
async fn wait_for_shutdown_signal() {
    match tokio::signal::ctrl_c().await {
        Ok(()) => tracing::info!("Shutdown signal received"),
        Err(e) => {
            tracing::error!(error = %e, "Failed to listen for shutdown signal");
            std::future::pending::<()>().await;
        }
    }
}
