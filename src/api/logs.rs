//! Admin log viewer endpoints

use axum::{
    extract::{Query, State},
    routing::get,
    Json, Router,
};
use serde::Deserialize;

use crate::{
    models::{LogFilters, LogPage, LogStatistics},
    services::AuditService,
    utils::error::AppResult,
    AppState,
};

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/", get(list_logs))
        .route("/statistics", get(statistics))
        .route("/actions", get(action_kinds))
}

#[derive(Debug, Deserialize)]
struct LogQuery {
    #[serde(default = "default_page")]
    page: u32,
    #[serde(default = "default_page_size")]
    page_size: u32,
    action: Option<String>,
    username: Option<String>,
    ip_address: Option<String>,
    success: Option<bool>,
    start_date: Option<String>,
    end_date: Option<String>,
}

fn default_page() -> u32 {
    1
}

fn default_page_size() -> u32 {
    20
}

async fn list_logs(
    State(state): State<AppState>,
    Query(query): Query<LogQuery>,
) -> AppResult<Json<LogPage>> {
    let filters = LogFilters {
        action: query.action.filter(|s| !s.is_empty()),
        username: query.username.filter(|s| !s.is_empty()),
        ip_address: query.ip_address.filter(|s| !s.is_empty()),
        success: query.success,
        start_date: query.start_date.filter(|s| !s.is_empty()),
        end_date: query.end_date.filter(|s| !s.is_empty()),
    };

    let audit = AuditService::new(state.db.clone());
    let page = audit
        .query(&filters, query.page, query.page_size, &state.geoip)
        .await?;
    Ok(Json(page))
}

async fn statistics(State(state): State<AppState>) -> AppResult<Json<LogStatistics>> {
    let stats = AuditService::new(state.db.clone()).statistics().await?;
    Ok(Json(stats))
}

async fn action_kinds(State(state): State<AppState>) -> AppResult<Json<Vec<String>>> {
    let kinds = AuditService::new(state.db.clone()).action_kinds().await?;
    Ok(Json(kinds))
}
