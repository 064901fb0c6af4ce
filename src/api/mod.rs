//! API routes and handlers

use axum::{middleware::from_fn, routing::get, Router};

use crate::{middleware::admin_middleware, AppState};

mod auth;
mod health;
mod invoices;
mod logs;
mod settings;
mod users;

pub use health::*;

/// Public API routes (no authentication required)
pub fn public_routes() -> Router<AppState> {
    Router::new()
        .route("/health", get(health::health_check))
        .route("/health/ready", get(health::readiness))
        .nest("/auth", auth::public_routes())
}

/// Protected API routes (authentication required)
pub fn protected_routes() -> Router<AppState> {
    Router::new()
        .nest("/auth", auth::protected_routes())
        .nest("/invoices", invoices::routes())
        .nest("/users", admin_only(users::routes()))
        .nest("/logs", admin_only(logs::routes()))
        .nest("/settings", admin_only(settings::routes()))
}

fn admin_only(router: Router<AppState>) -> Router<AppState> {
    router.route_layer(from_fn(admin_middleware))
}
