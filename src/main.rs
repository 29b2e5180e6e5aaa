//! Score Relay Back binary entrypoint wiring REST routes, background jobs and storage.

use std::{env, net::SocketAddr, sync::Arc};

use anyhow::Context;
use axum::Router;
use tokio::net::TcpListener;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use score_relay_back::{
    clock::{Clock, SystemClock},
    config::AppConfig,
    dao::{
        rating_api::{
            DisabledRatingApi, HttpRatingApi, RatingApi, RatingApiError, RatingApiSettings,
            RatingSession,
        },
        score_store::memory::MemoryScoreStore,
    },
    routes,
    services::scheduler,
    state::{AppState, SharedState},
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing();

    let config = AppConfig::load();
    let clock: Arc<dyn Clock> = Arc::new(SystemClock);
    let api = build_rating_api(&config)?;
    let rating = RatingSession::new(api, clock.clone(), config.rating_api.token_timeout);
    let app_state = AppState::new(config, rating, clock);

    start_storage(app_state.clone()).await;
    let jobs = scheduler::spawn_all(app_state.clone());

    // Build the HTTP router once the shared state is ready.
    let app = build_router(app_state);

    let port = env::var("PORT")
        .or_else(|_| env::var("SERVER_PORT"))
        .ok()
        .and_then(|value| value.parse::<u16>().ok())
        .unwrap_or(8080);

    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    info!(%addr, "starting server");

    let listener = TcpListener::bind(addr).await.context("binding server")?;
    let service = app.into_make_service();
    axum::serve(listener, service)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("serving axum")?;

    for job in jobs {
        job.abort();
    }
    Ok(())
}

/// Build the rating-service client. Missing credentials keep the server up with the relay disabled.
fn build_rating_api(config: &AppConfig) -> anyhow::Result<Arc<dyn RatingApi>> {
    let settings = RatingApiSettings {
        base_url: config.rating_api.base_url.clone(),
        client_id: config.credentials.client_id.clone(),
        client_secret: config.credentials.client_secret.clone(),
        request_timeout: config.rating_api.request_timeout,
    };
    match HttpRatingApi::new(settings) {
        Ok(api) => Ok(Arc::new(api)),
        Err(RatingApiError::MissingCredentials) => {
            warn!("rating service credentials missing; submissions and rating sync are disabled");
            Ok(Arc::new(DisabledRatingApi))
        }
        Err(err) => Err(err).context("building rating service client"),
    }
}

/// Install the store selected by `STORE_BACKEND` (`mongo` or `memory`).
async fn start_storage(state: SharedState) {
    let backend = env::var("STORE_BACKEND").unwrap_or_else(|_| default_backend().into());
    match backend.as_str() {
        #[cfg(feature = "mongo-store")]
        "mongo" => {
            use score_relay_back::{
                dao::{
                    score_store::{
                        ScoreStore,
                        mongodb::{MongoConfig, MongoScoreStore},
                    },
                    storage::StorageError,
                },
                services::storage_supervisor,
            };

            info!("using MongoDB store; starting in degraded mode until connected");
            tokio::spawn(storage_supervisor::run(state, || async {
                let config = MongoConfig::from_env().await?;
                let store = MongoScoreStore::connect(config).await?;
                Ok::<_, StorageError>(Arc::new(store) as Arc<dyn ScoreStore>)
            }));
        }
        other => {
            if other != "memory" {
                warn!(backend = other, "unknown store backend; falling back to memory");
            }
            info!("using in-memory store; data is lost on restart");
            state.set_store(Arc::new(MemoryScoreStore::new())).await;
        }
    }
}

fn default_backend() -> &'static str {
    if cfg!(feature = "mongo-store") {
        "mongo"
    } else {
        "memory"
    }
}

/// Build the top-level router and attach cross-cutting middleware layers.
fn build_router(state: SharedState) -> Router<()> {
    routes::router(state)
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
}

/// Configure tracing subscribers so logs include spans by default.
fn init_tracing() {
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "info,tower_http=debug".into());
    tracing_subscriber::registry()
        .with(env_filter)
        .with(tracing_subscriber::fmt::layer())
        .init();
}

/// Wait for Ctrl+C or SIGTERM and shut the server down gracefully.
async fn shutdown_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{SignalKind, signal};

        match signal(SignalKind::terminate()) {
            Ok(mut term) => {
                tokio::select! {
                    _ = tokio::signal::ctrl_c() => {},
                    _ = term.recv() => {},
                }
            }
            Err(err) => {
                warn!(error = %err, "failed to install SIGTERM handler; waiting for Ctrl+C");
                let _ = tokio::signal::ctrl_c().await;
            }
        }
    }

    #[cfg(not(unix))]
    {
        let _ = tokio::signal::ctrl_c().await;
    }
}
