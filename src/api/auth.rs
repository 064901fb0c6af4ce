//! Authentication endpoints

use axum::{
    extract::State,
    routing::{get, post},
    Json, Router,
};
use serde::Deserialize;
use serde_json::{json, Value};

use crate::{
    db::{log_repository::NewLogEntry, UserRepository},
    middleware::{
        auth::create_access_token, AuthUser, ClientMeta,
    },
    models::{ActionKind, AuthResponse, LoginRequest, UserPublic},
    services::{AuditService, AuthService},
    utils::error::{AppError, AppResult},
    AppState,
};

pub fn public_routes() -> Router<AppState> {
    Router::new().route("/login", post(login))
}

pub fn protected_routes() -> Router<AppState> {
    Router::new()
        .route("/logout", post(logout))
        .route("/me", get(me))
        .route("/change-password", post(change_password))
}

async fn login(
    State(state): State<AppState>,
    meta: ClientMeta,
    Json(request): Json<LoginRequest>,
) -> AppResult<Json<AuthResponse>> {
    let auth = AuthService::new(state.db.clone());
    let audit = AuditService::new(state.db.clone());

    let user = match auth.authenticate(&request.username, &request.password).await {
        Ok(user) => user,
        Err(e) => {
            // Failed attempts carry no resolved user id, only the attempted name
            audit
                .record(NewLogEntry {
                    username: request.username.clone(),
                    description: "用户登录".to_string(),
                    ip_address: meta.ip_address.clone(),
                    user_agent: meta.user_agent.clone(),
                    success: false,
                    error_message: e.to_string(),
                    ..NewLogEntry::new(ActionKind::Login)
                })
                .await;
            return Err(e);
        }
    };

    let token = create_access_token(
        &user,
        &state.config.auth.jwt_secret,
        state.config.auth.token_expiry_hours,
    )
    .map_err(|e| AppError::internal(format!("Failed to issue token: {}", e)))?;

    audit
        .record(NewLogEntry {
            user_id: Some(user.id),
            username: user.username.clone(),
            description: "用户登录".to_string(),
            ip_address: meta.ip_address.clone(),
            user_agent: meta.user_agent.clone(),
            ..NewLogEntry::new(ActionKind::Login)
        })
        .await;

    Ok(Json(AuthResponse {
        access_token: token,
        token_type: "Bearer".to_string(),
        expires_in: state.config.auth.token_expiry_hours * 3600,
        user: user.into(),
    }))
}

async fn logout(
    State(state): State<AppState>,
    auth_user: AuthUser,
    meta: ClientMeta,
) -> Json<Value> {
    // Tokens are stateless; logout only leaves an audit trace
    AuditService::new(state.db.clone())
        .record(NewLogEntry {
            user_id: Some(auth_user.id),
            username: auth_user.username,
            description: "用户退出登录".to_string(),
            ip_address: meta.ip_address,
            user_agent: meta.user_agent,
            ..NewLogEntry::new(ActionKind::Logout)
        })
        .await;

    Json(json!({"success": true}))
}

async fn me(
    State(state): State<AppState>,
    auth_user: AuthUser,
) -> AppResult<Json<UserPublic>> {
    let user = UserRepository::new(&state.db)
        .find_by_id(auth_user.id)
        .await?
        .ok_or_else(|| AppError::not_found("用户不存在"))?;
    Ok(Json(user.into()))
}

#[derive(Debug, Deserialize)]
struct ChangePasswordRequest {
    old_password: String,
    new_password: String,
}

async fn change_password(
    State(state): State<AppState>,
    auth_user: AuthUser,
    meta: ClientMeta,
    Json(request): Json<ChangePasswordRequest>,
) -> AppResult<Json<Value>> {
    let auth = AuthService::new(state.db.clone());
    let audit = AuditService::new(state.db.clone());

    let result = auth
        .change_password(
            auth_user.id,
            &request.old_password,
            &request.new_password,
            state.config.auth.password_min_length,
        )
        .await;

    let (success, error_message) = match &result {
        Ok(()) => (true, String::new()),
        Err(e) => (false, e.to_string()),
    };
    audit
        .record(NewLogEntry {
            user_id: Some(auth_user.id),
            username: auth_user.username.clone(),
            description: "修改密码".to_string(),
            ip_address: meta.ip_address,
            user_agent: meta.user_agent,
            target_type: "user".to_string(),
            target_id: Some(auth_user.id.to_string()),
            success,
            error_message,
            ..NewLogEntry::new(ActionKind::UserPasswordChange)
        })
        .await;

    result?;
    Ok(Json(json!({"success": true})))
}
