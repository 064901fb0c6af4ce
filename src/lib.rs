//! einvoice-webui library
//!
//! Internal web service for recording electronic invoices, detecting
//! duplicate submissions by raw QR payload, and auditing every
//! state-changing operation.

use std::sync::Arc;

use axum::Router;
use tower_http::{
    compression::CompressionLayer,
    cors::{Any, CorsLayer},
    services::{ServeDir, ServeFile},
    trace::{DefaultMakeSpan, DefaultOnResponse, TraceLayer},
};
use tracing::{info, warn, Level};

pub mod api;
pub mod config;
pub mod db;
pub mod middleware;
pub mod models;
pub mod services;
pub mod utils;

pub use config::AppConfig;
pub use db::DbPool;
pub use middleware::{auth_middleware, AuthUser};
use services::GeoipService;

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    /// Application configuration
    pub config: Arc<AppConfig>,
    /// Database connection pool
    pub db: DbPool,
    /// Geolocation lookup service (shared HTTP client and cache)
    pub geoip: Arc<GeoipService>,
}

/// Create the application router with all routes and middleware.
///
/// Public routes stay unauthenticated; auth middleware is applied only to
/// protected routes so `/api/v1/auth/login` remains reachable.
pub fn create_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let trace_layer = TraceLayer::new_for_http()
        .make_span_with(DefaultMakeSpan::new().level(Level::INFO))
        .on_response(DefaultOnResponse::new().level(Level::INFO));

    let api_router = Router::new()
        .nest("/api/v1", api::public_routes())
        .nest(
            "/api/v1",
            api::protected_routes().layer(axum::middleware::from_fn_with_state(
                state.clone(),
                middleware::auth::auth_middleware,
            )),
        )
        .with_state(state.clone());

    // Optionally serve the frontend build output with SPA fallback
    let router = if state.config.server.serve_frontend {
        if let Some(ref static_dir) = state.config.server.static_dir {
            if static_dir.exists() {
                info!("Serving frontend from {:?}", static_dir);
                let index_file = static_dir.join("index.html");
                if index_file.exists() {
                    let serve_dir =
                        ServeDir::new(static_dir).not_found_service(ServeFile::new(&index_file));
                    api_router.fallback_service(serve_dir)
                } else {
                    warn!(
                        "index.html not found in {:?}, SPA fallback disabled",
                        static_dir
                    );
                    api_router.fallback_service(ServeDir::new(static_dir))
                }
            } else {
                warn!(
                    "Static directory {:?} does not exist, frontend not served",
                    static_dir
                );
                api_router
            }
        } else {
            info!("No static directory configured, frontend not served");
            api_router
        }
    } else {
        info!("Frontend serving disabled by configuration");
        api_router
    };

    router
        .layer(CompressionLayer::new())
        .layer(trace_layer)
        .layer(cors)
}
