//! User management endpoints (admin only)

use axum::{
    extract::{Path, State},
    routing::{get, put},
    Json, Router,
};
use serde::Deserialize;
use serde_json::{json, Value};
use uuid::Uuid;

use crate::{
    db::{log_repository::NewLogEntry, UserRepository},
    middleware::{AuthUser, ClientMeta},
    models::{ActionKind, User, UserPublic},
    services::{AuditService, AuthService},
    utils::error::{AppError, AppResult},
    AppState,
};

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/", get(list_users).post(create_user))
        .route("/{id}", put(update_user).delete(delete_user))
        .route("/{id}/password", put(reset_password))
        .route("/{id}/role", put(change_role))
        .route("/{id}/status", put(toggle_status))
}

fn user_entry(
    action: ActionKind,
    actor: &AuthUser,
    meta: &ClientMeta,
    description: String,
    target_id: Uuid,
) -> NewLogEntry {
    NewLogEntry {
        user_id: Some(actor.id),
        username: actor.username.clone(),
        description,
        ip_address: meta.ip_address.clone(),
        user_agent: meta.user_agent.clone(),
        target_type: "user".to_string(),
        target_id: Some(target_id.to_string()),
        ..NewLogEntry::new(action)
    }
}

fn validate_role(role: &str) -> AppResult<()> {
    if role != "admin" && role != "user" {
        return Err(AppError::bad_request("角色只能是 admin 或 user"));
    }
    Ok(())
}

/// Reject operations that would leave the system without an enabled admin.
async fn guard_last_admin(repo: &UserRepository<'_>, target: &User) -> AppResult<()> {
    if target.is_admin() && target.enabled && repo.count_enabled_admins().await? <= 1 {
        return Err(AppError::bad_request("必须保留至少一名管理员"));
    }
    Ok(())
}

async fn list_users(State(state): State<AppState>) -> AppResult<Json<Vec<UserPublic>>> {
    let users = UserRepository::new(&state.db).list().await?;
    Ok(Json(users.into_iter().map(UserPublic::from).collect()))
}

#[derive(Debug, Deserialize)]
struct CreateUserRequest {
    username: String,
    realname: String,
    password: String,
    #[serde(default = "default_role")]
    role: String,
}

fn default_role() -> String {
    "user".to_string()
}

async fn create_user(
    State(state): State<AppState>,
    auth_user: AuthUser,
    meta: ClientMeta,
    Json(request): Json<CreateUserRequest>,
) -> AppResult<Json<UserPublic>> {
    let username = request.username.trim();
    if username.is_empty() {
        return Err(AppError::bad_request("用户名不能为空"));
    }
    validate_role(&request.role)?;
    if request.password.len() < state.config.auth.password_min_length {
        return Err(AppError::bad_request(format!(
            "密码长度不能少于 {} 位",
            state.config.auth.password_min_length
        )));
    }

    let user = User::new(
        username.to_string(),
        request.realname.trim().to_string(),
        AuthService::hash_password(&request.password)?,
        request.role,
    );
    UserRepository::new(&state.db).insert(&user).await?;

    AuditService::new(state.db.clone())
        .record(user_entry(
            ActionKind::UserCreate,
            &auth_user,
            &meta,
            format!("创建用户 {}", user.username),
            user.id,
        ))
        .await;

    Ok(Json(user.into()))
}

#[derive(Debug, Deserialize)]
struct UpdateUserRequest {
    realname: String,
}

async fn update_user(
    State(state): State<AppState>,
    auth_user: AuthUser,
    meta: ClientMeta,
    Path(id): Path<Uuid>,
    Json(request): Json<UpdateUserRequest>,
) -> AppResult<Json<UserPublic>> {
    let repo = UserRepository::new(&state.db);
    repo.update_realname(id, request.realname.trim()).await?;
    let user = repo
        .find_by_id(id)
        .await?
        .ok_or_else(|| AppError::not_found("用户不存在"))?;

    AuditService::new(state.db.clone())
        .record(user_entry(
            ActionKind::UserEdit,
            &auth_user,
            &meta,
            format!("修改用户 {}", user.username),
            id,
        ))
        .await;

    Ok(Json(user.into()))
}

async fn delete_user(
    State(state): State<AppState>,
    auth_user: AuthUser,
    meta: ClientMeta,
    Path(id): Path<Uuid>,
) -> AppResult<Json<Value>> {
    if id == auth_user.id {
        return Err(AppError::bad_request("不能删除当前登录用户"));
    }

    let repo = UserRepository::new(&state.db);
    let target = repo
        .find_by_id(id)
        .await?
        .ok_or_else(|| AppError::not_found("用户不存在"))?;
    guard_last_admin(&repo, &target).await?;

    repo.delete(id).await?;

    AuditService::new(state.db.clone())
        .record(user_entry(
            ActionKind::UserDelete,
            &auth_user,
            &meta,
            format!("删除用户 {}", target.username),
            id,
        ))
        .await;

    Ok(Json(json!({"success": true})))
}

#[derive(Debug, Deserialize)]
struct ResetPasswordRequest {
    new_password: String,
}

async fn reset_password(
    State(state): State<AppState>,
    auth_user: AuthUser,
    meta: ClientMeta,
    Path(id): Path<Uuid>,
    Json(request): Json<ResetPasswordRequest>,
) -> AppResult<Json<Value>> {
    if request.new_password.len() < state.config.auth.password_min_length {
        return Err(AppError::bad_request(format!(
            "密码长度不能少于 {} 位",
            state.config.auth.password_min_length
        )));
    }

    let repo = UserRepository::new(&state.db);
    let target = repo
        .find_by_id(id)
        .await?
        .ok_or_else(|| AppError::not_found("用户不存在"))?;

    let hash = AuthService::hash_password(&request.new_password)?;
    repo.update_password(id, &hash).await?;

    AuditService::new(state.db.clone())
        .record(user_entry(
            ActionKind::UserPasswordChange,
            &auth_user,
            &meta,
            format!("重置用户 {} 的密码", target.username),
            id,
        ))
        .await;

    Ok(Json(json!({"success": true})))
}

#[derive(Debug, Deserialize)]
struct ChangeRoleRequest {
    role: String,
}

async fn change_role(
    State(state): State<AppState>,
    auth_user: AuthUser,
    meta: ClientMeta,
    Path(id): Path<Uuid>,
    Json(request): Json<ChangeRoleRequest>,
) -> AppResult<Json<Value>> {
    validate_role(&request.role)?;

    let repo = UserRepository::new(&state.db);
    let target = repo
        .find_by_id(id)
        .await?
        .ok_or_else(|| AppError::not_found("用户不存在"))?;
    if target.role == request.role {
        return Ok(Json(json!({"success": true})));
    }
    // Demoting the only admin would lock everyone out
    if request.role == "user" {
        guard_last_admin(&repo, &target).await?;
    }

    repo.update_role(id, &request.role).await?;

    AuditService::new(state.db.clone())
        .record(user_entry(
            ActionKind::UserRoleChange,
            &auth_user,
            &meta,
            format!("将用户 {} 的角色改为 {}", target.username, request.role),
            id,
        ))
        .await;

    Ok(Json(json!({"success": true})))
}

#[derive(Debug, Deserialize)]
struct ToggleStatusRequest {
    enabled: bool,
}

async fn toggle_status(
    State(state): State<AppState>,
    auth_user: AuthUser,
    meta: ClientMeta,
    Path(id): Path<Uuid>,
    Json(request): Json<ToggleStatusRequest>,
) -> AppResult<Json<Value>> {
    let repo = UserRepository::new(&state.db);
    let target = repo
        .find_by_id(id)
        .await?
        .ok_or_else(|| AppError::not_found("用户不存在"))?;
    if !request.enabled {
        guard_last_admin(&repo, &target).await?;
    }

    repo.update_enabled(id, request.enabled).await?;

    let description = if request.enabled {
        format!("启用用户 {}", target.username)
    } else {
        format!("禁用用户 {}", target.username)
    };
    AuditService::new(state.db.clone())
        .record(user_entry(
            ActionKind::UserStatusToggle,
            &auth_user,
            &meta,
            description,
            id,
        ))
        .await;

    Ok(Json(json!({"success": true})))
}
