//! System settings endpoints (admin only)

use std::collections::HashMap;

use axum::{extract::State, routing::get, Json, Router};
use serde_json::{json, Value};

use crate::{
    db::{log_repository::NewLogEntry, SettingsRepository},
    middleware::{AuthUser, ClientMeta},
    models::ActionKind,
    services::AuditService,
    utils::error::AppResult,
    AppState,
};

pub fn routes() -> Router<AppState> {
    Router::new().route("/", get(get_settings).put(save_settings))
}

async fn get_settings(
    State(state): State<AppState>,
) -> AppResult<Json<HashMap<String, String>>> {
    let settings = SettingsRepository::new(&state.db).get_all().await?;
    Ok(Json(settings))
}

async fn save_settings(
    State(state): State<AppState>,
    auth_user: AuthUser,
    meta: ClientMeta,
    Json(entries): Json<HashMap<String, String>>,
) -> AppResult<Json<Value>> {
    let repo = SettingsRepository::new(&state.db);
    let audit = AuditService::new(state.db.clone());

    let result = repo.save_all(&entries).await;
    let (success, error_message) = match &result {
        Ok(()) => (true, String::new()),
        Err(e) => (false, e.to_string()),
    };

    let mut keys: Vec<&str> = entries.keys().map(String::as_str).collect();
    keys.sort();
    audit
        .record(NewLogEntry {
            user_id: Some(auth_user.id),
            username: auth_user.username.clone(),
            description: format!("更新系统配置: {}", keys.join(", ")),
            ip_address: meta.ip_address,
            user_agent: meta.user_agent,
            target_type: "settings".to_string(),
            success,
            error_message,
            ..NewLogEntry::new(ActionKind::ConfigUpdate)
        })
        .await;

    result?;
    Ok(Json(json!({"success": true})))
}
