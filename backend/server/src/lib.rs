//! Documentation of a small notes service.
//!
//!
//!
//! # General Infrastructure
//! - Browser loads the single page frontend, built separately into `frontend/dist`
//! - In production this server hands out those static files itself
//! - In development the frontend runs on its own dev server, so CORS is opened for it
//! - Notes live in MongoDB, quota counters live in Redis
//!
//!
//!
//! # Request Path
//!
//! ```text
//! request -> CORS (dev only) -> trace -> body limit -> rate limiter -> router -> handler -> MongoDB
//! ```
//!
//! - Rate limiter runs before routing, so static files count against the quota too
//! - A throttled request never reaches the router
//!
//!
//!
//! # Endpoints
//!
//! | Method | Path | Success |
//! |---|---|---|
//! | GET | `/api/notes` | 200, notes newest first |
//! | GET | `/api/notes/{id}` | 200, note |
//! | POST | `/api/notes` | 201, `{ message, note }` |
//! | PUT | `/api/notes/{id}` | 200, `{ message, note }` |
//! | DELETE | `/api/notes/{id}` | 200, `{ message, note }` |
//!
//! Errors are always `{ "message": ... }`.
//!
//!
//!
//! # Notes
//!
//! ## Fail-open limiter
//! If Redis is not configured, or cannot be reached at startup, requests are not
//! throttled. Losing the limiter should not take the notes down with it.
//!
//! ## No retries
//! Writes hit the database once. A client retrying a create after a timeout can
//! end up with two notes.
//!
//!
//!
//! # Setup
//!
//! Run locally against a dev database.
//! ```sh
//! MONGO_URI=mongodb://localhost:27017/notes RUST_LOG=info cargo run -p notes
//! ```
//!
//! With throttling.
//! ```sh
//! RATE_LIMIT_REDIS_URL=redis://localhost:6379 RATE_LIMIT_MAX=100 cargo run -p notes
//! ```
//!
//! Production, serving the built frontend.
//! ```sh
//! APP_ENV=production FRONTEND_DIST=../frontend/dist cargo run --release -p notes
//! ```
use std::{net::SocketAddr, path::Path, sync::Arc, time::Duration};

use axum::{
    Router,
    extract::DefaultBodyLimit,
    http::{HeaderValue, Method, header::CONTENT_TYPE},
    middleware::from_fn_with_state,
    routing::get,
};

use signal::{
    ctrl_c,
    unix::{SignalKind, signal},
};
use tokio::{net::TcpListener, signal};
use tower_http::{
    cors::CorsLayer,
    services::{ServeDir, ServeFile},
    trace::TraceLayer,
};
use tracing::{debug, info, warn};
use tracing_subscriber::{EnvFilter, fmt};

pub mod config;
pub mod database;
pub mod error;
pub mod note;
pub mod rate_limit;
pub mod routes;
pub mod state;
pub mod utils;

use config::{Config, EnvFile, load_env_file};
use error::ServerError;
use rate_limit::rate_limiter;
use routes::{
    create_note_handler, delete_note_handler, get_note_handler, list_notes_handler,
    update_note_handler,
};
use state::State;

/// Matches the default JSON body size accepted by common Node body parsers.
pub const JSON_BODY_LIMIT: usize = 100 * 1024;

pub async fn start_server() -> Result<(), ServerError> {
    // Before the subscriber, so RUST_LOG can come from the file.
    let env_file = load_env_file(Path::new(".env"));

    fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    match env_file {
        EnvFile::Loaded(path) => info!("Loaded environment from {}", path.display()),
        EnvFile::Missing => debug!("No .env file found, using process environment"),
        EnvFile::Invalid(e) => warn!("Ignoring unreadable .env file: {e}"),
    }

    info!("Loading config...");
    let config = Config::load()?;
    info!("Running in {} mode", config.mode);

    info!("Initializing state...");
    let state = State::new(config).await?;

    info!("Starting server...");
    let app = app(state.clone());

    let address = format!("0.0.0.0:{}", state.config.port);
    info!("Binding to {address}");

    let listener = TcpListener::bind(&address).await?;
    info!("Server started on PORT: {}", state.config.port);

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await?;

    info!("Server shutting down...");

    Ok(())
}

pub fn app(state: Arc<State>) -> Router {
    let api = Router::new()
        .route("/api/notes", get(list_notes_handler).post(create_note_handler))
        .route(
            "/api/notes/{id}",
            get(get_note_handler)
                .put(update_note_handler)
                .delete(delete_note_handler),
        );

    let app = if state.config.is_production() {
        let dist = &state.config.frontend_dist;
        let index = dist.join("index.html");
        if !index.exists() {
            warn!("No frontend build at {}", index.display());
        }

        api.fallback_service(ServeDir::new(dist).fallback(ServeFile::new(index)))
    } else {
        api
    };

    let app = app
        .layer(from_fn_with_state(state.clone(), rate_limiter))
        .layer(DefaultBodyLimit::max(JSON_BODY_LIMIT))
        .layer(TraceLayer::new_for_http());

    let app = if state.config.is_production() {
        app
    } else {
        app.layer(cors(&state.config.cors_origin))
    };

    app.with_state(state)
}

fn cors(origin: &str) -> CorsLayer {
    let cors = CorsLayer::new()
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PUT,
            Method::DELETE,
            Method::OPTIONS,
        ])
        .allow_headers([CONTENT_TYPE])
        .max_age(Duration::from_secs(60 * 60));

    match HeaderValue::from_str(origin) {
        Ok(origin) => cors.allow_origin(origin),
        Err(e) => {
            warn!("Invalid CORS origin {origin}: {e}, cross-origin requests disabled");
            cors
        }
    }
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = ctrl_c().await {
            warn!("Failed to install Ctrl+C handler: {e}");
            std::future::pending::<()>().await;
        }

        info!("Received Ctrl+C, shutting down");
    };

    #[cfg(unix)]
    let terminate = async {
        match signal(SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                warn!("Failed to install signal handler: {e}");
                std::future::pending::<()>().await;
            }
        }

        info!("Received terminate signal, shutting down");
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
