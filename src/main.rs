//! recruitd - recruitment session orchestration daemon
//!
//! Restores sessions from the latest backup, runs entry effects against the
//! chat platform and serves the session API until signalled to stop.

use recruit_engine::api::{create_router, AppState};
use recruit_engine::backup::{self, BackupScheduler, BackupStore};
use recruit_engine::collaborator::Collaborator;
use recruit_engine::config::Config;
use recruit_engine::db::SqliteBackupStore;
use recruit_engine::runtime::{notification_channel, EffectRunner, SessionRegistry};
use recruit_engine::shutdown::shutdown_signal;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "recruit_engine=info,recruitd=info,tower_http=info".into()),
        )
        .with(
            tracing_subscriber::fmt::layer()
                .json()
                .with_current_span(true)
                .with_span_list(false),
        )
        .init();

    let config = Config::from_env();

    // Ensure database directory exists
    if let Some(parent) = config.db_path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    tracing::info!(path = %config.db_path.display(), "Opening backup store");
    let store = Arc::new(SqliteBackupStore::open(&config.db_path)?);

    let collaborator = Arc::new(Collaborator::from_url(
        config.collaborator_url.as_deref(),
        config.effect_timeout(),
    )?);
    match &config.collaborator_url {
        Some(url) => tracing::info!(url = %url, "Using HTTP collaborator"),
        None => tracing::warn!("RECRUIT_COLLABORATOR_URL not set, entry effects are only logged"),
    }

    let (subscriber, notifications) = notification_channel();
    let registry = Arc::new(SessionRegistry::new(config.flow()).with_subscriber(subscriber));

    backup::restore(
        &registry,
        store.as_ref(),
        collaborator.as_ref(),
        config.restore_lookback,
    )
    .await?;

    let cancel = CancellationToken::new();
    let runner = EffectRunner::new(
        registry.clone(),
        collaborator.clone(),
        notifications,
        config.effect_timeout(),
    );
    let runner_task = tokio::spawn(runner.run(cancel.clone()));
    let scheduler = BackupScheduler::new(registry.clone(), store.clone(), config.backup_interval());
    let scheduler_task = tokio::spawn(scheduler.run(cancel.clone()));

    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let state = AppState::new(registry.clone(), store.clone() as Arc<dyn BackupStore>);
    let app = create_router(state).layer(TraceLayer::new_for_http()).layer(cors);

    // Start server
    let addr = SocketAddr::from(([0, 0, 0, 0], config.port));
    tracing::info!("Recruit engine listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    let served = axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await;

    cancel.cancel();
    for task in [runner_task, scheduler_task] {
        if let Err(e) = task.await {
            tracing::error!(error = %e, "Background task panicked");
        }
    }

    // Capture whatever changed since the last scheduled backup
    if let Err(e) = backup::backup(&registry, store.as_ref()).await {
        tracing::error!(error = %e, "Final backup failed");
    }

    served?;
    Ok(())
}
