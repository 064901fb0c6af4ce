//! Authentication service
//!
//! Argon2id password hashing and credential verification.

use argon2::{
    password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
    Argon2,
};
use rand::rngs::OsRng;
use sqlx::SqlitePool;
use uuid::Uuid;

use crate::db::UserRepository;
use crate::models::User;
use crate::utils::error::{AppError, AppResult};

pub struct AuthService {
    pool: SqlitePool,
}

impl AuthService {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Hash a password using Argon2id
    pub fn hash_password(password: &str) -> AppResult<String> {
        let salt = SaltString::generate(&mut OsRng);
        let hash = Argon2::default()
            .hash_password(password.as_bytes(), &salt)
            .map_err(|e| AppError::internal(format!("Failed to hash password: {}", e)))?
            .to_string();
        Ok(hash)
    }

    /// Verify a password against a stored hash
    pub fn verify_password(password: &str, password_hash: &str) -> AppResult<bool> {
        let parsed = PasswordHash::new(password_hash)
            .map_err(|e| AppError::internal(format!("Invalid password hash format: {}", e)))?;
        Ok(Argon2::default()
            .verify_password(password.as_bytes(), &parsed)
            .is_ok())
    }

    /// Authenticate by username and password.
    ///
    /// Unknown usernames and wrong passwords produce the same error so the
    /// response does not reveal which usernames exist. Disabled accounts are
    /// rejected after the password check.
    pub async fn authenticate(&self, username: &str, password: &str) -> AppResult<User> {
        let repo = UserRepository::new(&self.pool);
        let user = repo
            .find_by_username(username)
            .await?
            .ok_or_else(|| AppError::unauthorized("用户名或密码错误"))?;

        if !Self::verify_password(password, &user.password_hash)? {
            return Err(AppError::unauthorized("用户名或密码错误"));
        }
        if !user.enabled {
            return Err(AppError::forbidden("账号已被禁用"));
        }
        Ok(user)
    }

    /// Self-service password change: requires the current password.
    pub async fn change_password(
        &self,
        user_id: Uuid,
        old_password: &str,
        new_password: &str,
        min_length: usize,
    ) -> AppResult<()> {
        if new_password.len() < min_length {
            return Err(AppError::bad_request(format!(
                "密码长度不能少于 {} 位",
                min_length
            )));
        }

        let repo = UserRepository::new(&self.pool);
        let user = repo
            .find_by_id(user_id)
            .await?
            .ok_or_else(|| AppError::not_found("用户不存在"))?;

        if !Self::verify_password(old_password, &user.password_hash)? {
            return Err(AppError::bad_request("原密码错误"));
        }

        let hash = Self::hash_password(new_password)?;
        repo.update_password(user_id, &hash).await
    }
}
