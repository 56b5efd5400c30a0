/// User Center Service Main Entry Point
///
/// Starts the HTTP API with:
/// - PostgreSQL connection pool and schema migrations (or the memory store)
/// - JWT keys for session tokens
/// - Optional bootstrap superadmin
use anyhow::{Context, Result};
use std::sync::Arc;
use tokio::signal;
use tracing::{error, info};
use user_center_service::{
    config::{Settings, StorageBackend, SERVICE_NAME},
    db::{CredentialStore, MemoryCredentialStore, PgCredentialStore},
    http::{start_http_server, AppState},
    security::SessionAuthority,
    AccountService,
};

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            std::env::var("RUST_LOG")
                .unwrap_or_else(|_| "user_center_service=info,tower_http=info,info".into()),
        )
        .with_target(false)
        .json()
        .init();

    let settings = Settings::load().context("Failed to load configuration")?;
    info!(storage = ?settings.storage, "Starting {}", SERVICE_NAME);
    if settings.server.trust_forwarded_for {
        info!("Client addresses taken from X-Forwarded-For");
    }

    let store = build_store(&settings).await?;

    let keys = settings.jwt.build_keys()?;
    info!(
        algorithm = ?keys.algorithm(),
        issuer = keys.issuer(),
        ttl_seconds = keys.ttl().num_seconds(),
        "JWT keys loaded"
    );

    let sessions = SessionAuthority::new(Arc::clone(&store), keys);
    let accounts = Arc::new(AccountService::new(
        Arc::clone(&store),
        sessions,
        settings.account.clone(),
    ));

    if let Some(bootstrap) = &settings.bootstrap {
        accounts
            .ensure_bootstrap_superadmin(bootstrap)
            .await
            .context("Failed to create bootstrap superadmin")?;
    }

    let served = start_http_server(
        AppState::new(accounts).with_trusted_proxy(settings.server.trust_forwarded_for),
        &settings.server.bind_address(),
        shutdown_signal(),
    )
    .await;

    store.close().await;

    if let Err(e) = &served {
        error!(error = %e, "HTTP server stopped with error");
    }
    served?;

    info!("User center service shutdown complete");
    Ok(())
}

async fn build_store(settings: &Settings) -> Result<Arc<dyn CredentialStore>> {
    match (settings.storage, &settings.database) {
        (StorageBackend::Postgres, Some(db_config)) => {
            db_config.log_config();
            let pool = db_pool::create_pool(db_config)
                .await
                .context("Failed to create database pool")?;

            sqlx::migrate!("./migrations")
                .run(&pool)
                .await
                .context("Failed to run database migrations")?;
            info!("Database migrations applied");

            Ok(Arc::new(PgCredentialStore::new(pool, SERVICE_NAME)))
        }
        (StorageBackend::Postgres, None) => {
            anyhow::bail!("PostgreSQL storage selected without database settings")
        }
        (StorageBackend::Memory, _) => Ok(Arc::new(MemoryCredentialStore::new())),
    }
}

/// Wait for shutdown signal (Ctrl+C or SIGTERM)
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C signal");
        },
        _ = terminate => {
            info!("Received SIGTERM signal");
        },
    }

    info!("Shutting down gracefully...");
}
