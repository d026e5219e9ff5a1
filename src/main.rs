//! petfeed-sync server entry point.
//!
//! Hosts one member's status view and serves it over REST and WebSocket.

use std::sync::Arc;

use anyhow::Context;
use axum::Router;
use axum::routing::get;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing_subscriber::EnvFilter;

use petfeed_sync::api;
use petfeed_sync::app_state::AppState;
use petfeed_sync::clock::{Clock, SystemClock};
use petfeed_sync::config::{AppConfig, LogFormat};
use petfeed_sync::domain::{EventBus, HouseholdId, MemberId};
use petfeed_sync::service::{Collaborators, StatusView, ViewSettings};
use petfeed_sync::store::{
    ChangeNotifier, FileSnapshotCache, MemoryStore, PgNotifier, PgStore, RemoteStore,
    SnapshotCache,
};
use petfeed_sync::ws::handler::ws_handler;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load configuration
    let config = AppConfig::from_env()?;

    // Initialize tracing
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    match config.log_format {
        LogFormat::Json => tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .init(),
        LogFormat::Text => tracing_subscriber::fmt().with_env_filter(filter).init(),
    }
    tracing::info!(addr = %config.listen_addr, "starting petfeed-sync");

    // Build collaborators
    let (store, notifier, household_id, member_id) = build_store(&config).await?;
    let cache: Arc<dyn SnapshotCache> = Arc::new(FileSnapshotCache::new(config.cache_dir.clone()));
    let clock: Arc<dyn Clock> = Arc::new(SystemClock);
    let event_bus = EventBus::new(config.event_bus_capacity);

    // Build service layer
    let mut settings = ViewSettings::new(household_id, member_id);
    settings.history_limit = config.history_limit;
    settings.undo_window = config.undo_window();
    settings.undo_tick = config.undo_tick();
    let status_view = Arc::new(StatusView::new(
        settings,
        Collaborators {
            store,
            notifier,
            cache,
            clock,
        },
        event_bus.clone(),
    ));

    if let Err(err) = status_view.mount().await {
        tracing::warn!(error = %err, "initial load failed; serving cached view if any");
    }
    let _background = status_view
        .spawn_background()
        .await
        .context("opening realtime subscription")?;

    // Build application state
    let app_state = AppState::new(status_view, event_bus);

    // Build router
    let app = Router::new()
        .merge(api::build_router())
        .route("/ws", get(ws_handler))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(app_state);

    // Start server
    let listener = tokio::net::TcpListener::bind(config.listen_addr).await?;
    tracing::info!(addr = %config.listen_addr, "server listening");

    axum::serve(listener, app).await?;

    Ok(())
}

type Backend = (
    Arc<dyn RemoteStore>,
    Arc<dyn ChangeNotifier>,
    HouseholdId,
    MemberId,
);

/// PostgreSQL when persistence is enabled, a seeded in-memory household
/// otherwise.
async fn build_store(config: &AppConfig) -> anyhow::Result<Backend> {
    if config.persistence_enabled {
        let store = PgStore::connect(config)
            .await
            .context("connecting to PostgreSQL")?;
        if config.run_migrations {
            store.migrate().await.context("running migrations")?;
        }
        let notifier = PgNotifier::new(store.pool().clone(), config.notify_channel.clone());
        let household_id = config
            .household_id
            .context("HOUSEHOLD_ID is required with persistence")?;
        let member_id = config
            .member_id
            .context("MEMBER_ID is required with persistence")?;
        return Ok((
            Arc::new(store) as Arc<dyn RemoteStore>,
            Arc::new(notifier) as Arc<dyn ChangeNotifier>,
            HouseholdId::from(household_id),
            MemberId::from(member_id),
        ));
    }

    let store = Arc::new(MemoryStore::new());
    let demo = store.seed_demo().await;
    let viewer = demo
        .members
        .first()
        .context("demo household has no members")?;
    tracing::info!(
        household_id = %demo.household.id,
        member = %viewer.name,
        "persistence disabled; serving the demo household"
    );
    let notifier = store.notifier();
    Ok((
        store as Arc<dyn RemoteStore>,
        Arc::new(notifier) as Arc<dyn ChangeNotifier>,
        demo.household.id,
        viewer.id,
    ))
}
