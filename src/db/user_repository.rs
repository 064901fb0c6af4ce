//! User repository

use chrono::Utc;
use sqlx::SqlitePool;
use uuid::Uuid;

use crate::db::parse_db_timestamp;
use crate::models::User;
use crate::utils::error::AppError;

#[derive(Debug, sqlx::FromRow)]
struct UserRow {
    id: String,
    username: String,
    realname: String,
    password_hash: String,
    role: String,
    enabled: i64,
    created_at: String,
    updated_at: String,
}

pub struct UserRepository<'a> {
    pool: &'a SqlitePool,
}

impl<'a> UserRepository<'a> {
    pub fn new(pool: &'a SqlitePool) -> Self {
        Self { pool }
    }

    /// Insert a new user. Returns `AppError::Conflict` on a taken username.
    pub async fn insert(&self, user: &User) -> Result<(), AppError> {
        let result = sqlx::query(
            r#"
            INSERT INTO users (id, username, realname, password_hash, role,
                               enabled, created_at, updated_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(user.id.to_string())
        .bind(&user.username)
        .bind(&user.realname)
        .bind(&user.password_hash)
        .bind(&user.role)
        .bind(user.enabled as i64)
        .bind(user.created_at.to_rfc3339())
        .bind(user.updated_at.to_rfc3339())
        .execute(self.pool)
        .await;

        match result {
            Ok(_) => Ok(()),
            Err(e) => {
                let err: AppError = e.into();
                if err.is_conflict() {
                    Err(AppError::Conflict("用户名已存在".to_string()))
                } else {
                    Err(err)
                }
            }
        }
    }

    pub async fn find_by_username(&self, username: &str) -> Result<Option<User>, AppError> {
        let row = sqlx::query_as::<_, UserRow>(
            "SELECT id, username, realname, password_hash, role, enabled,
                    created_at, updated_at
             FROM users WHERE username = ?",
        )
        .bind(username)
        .fetch_optional(self.pool)
        .await?;
        Ok(row.map(row_to_user))
    }

    pub async fn find_by_id(&self, id: Uuid) -> Result<Option<User>, AppError> {
        let row = sqlx::query_as::<_, UserRow>(
            "SELECT id, username, realname, password_hash, role, enabled,
                    created_at, updated_at
             FROM users WHERE id = ?",
        )
        .bind(id.to_string())
        .fetch_optional(self.pool)
        .await?;
        Ok(row.map(row_to_user))
    }

    /// All users, username order. The tool is internal and small; no paging.
    pub async fn list(&self) -> Result<Vec<User>, AppError> {
        let rows = sqlx::query_as::<_, UserRow>(
            "SELECT id, username, realname, password_hash, role, enabled,
                    created_at, updated_at
             FROM users ORDER BY username",
        )
        .fetch_all(self.pool)
        .await?;
        Ok(rows.into_iter().map(row_to_user).collect())
    }

    pub async fn update_realname(&self, id: Uuid, realname: &str) -> Result<(), AppError> {
        self.touch_update(
            sqlx::query("UPDATE users SET realname = ?, updated_at = ? WHERE id = ?")
                .bind(realname)
                .bind(Utc::now().to_rfc3339())
                .bind(id.to_string()),
        )
        .await
    }

    pub async fn update_password(&self, id: Uuid, password_hash: &str) -> Result<(), AppError> {
        self.touch_update(
            sqlx::query("UPDATE users SET password_hash = ?, updated_at = ? WHERE id = ?")
                .bind(password_hash)
                .bind(Utc::now().to_rfc3339())
                .bind(id.to_string()),
        )
        .await
    }

    pub async fn update_role(&self, id: Uuid, role: &str) -> Result<(), AppError> {
        self.touch_update(
            sqlx::query("UPDATE users SET role = ?, updated_at = ? WHERE id = ?")
                .bind(role)
                .bind(Utc::now().to_rfc3339())
                .bind(id.to_string()),
        )
        .await
    }

    pub async fn update_enabled(&self, id: Uuid, enabled: bool) -> Result<(), AppError> {
        self.touch_update(
            sqlx::query("UPDATE users SET enabled = ?, updated_at = ? WHERE id = ?")
                .bind(enabled as i64)
                .bind(Utc::now().to_rfc3339())
                .bind(id.to_string()),
        )
        .await
    }

    pub async fn delete(&self, id: Uuid) -> Result<(), AppError> {
        let result = sqlx::query("DELETE FROM users WHERE id = ?")
            .bind(id.to_string())
            .execute(self.pool)
            .await?;
        if result.rows_affected() == 0 {
            return Err(AppError::not_found("用户不存在"));
        }
        Ok(())
    }

    /// Count of enabled admin accounts, used to protect the last admin.
    pub async fn count_enabled_admins(&self) -> Result<u64, AppError> {
        let count: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM users WHERE role = 'admin' AND enabled = 1",
        )
        .fetch_one(self.pool)
        .await?;
        Ok(count as u64)
    }

    async fn touch_update<'b>(
        &self,
        query: sqlx::query::Query<'b, sqlx::Sqlite, sqlx::sqlite::SqliteArguments<'b>>,
    ) -> Result<(), AppError> {
        let result = query.execute(self.pool).await?;
        if result.rows_affected() == 0 {
            return Err(AppError::not_found("用户不存在"));
        }
        Ok(())
    }
}

fn row_to_user(row: UserRow) -> User {
    User {
        id: Uuid::parse_str(&row.id).unwrap_or_else(|_| Uuid::nil()),
        username: row.username,
        realname: row.realname,
        password_hash: row.password_hash,
        role: row.role,
        enabled: row.enabled != 0,
        created_at: parse_db_timestamp(&row.created_at),
        updated_at: parse_db_timestamp(&row.updated_at),
    }
}
