//! IP geolocation cache repository
//!
//! Keyed by IP text; stores the resolved location string and when it was
//! fetched. Freshness policy lives in the geoip service.

use chrono::{DateTime, Utc};
use sqlx::SqlitePool;

use crate::db::parse_db_timestamp;
use crate::utils::error::AppError;

/// A cached geolocation result.
#[derive(Debug, Clone)]
pub struct CachedLocation {
    pub location: String,
    pub updated_at: DateTime<Utc>,
}

pub struct IpCacheRepository<'a> {
    pool: &'a SqlitePool,
}

impl<'a> IpCacheRepository<'a> {
    pub fn new(pool: &'a SqlitePool) -> Self {
        Self { pool }
    }

    pub async fn get(&self, ip: &str) -> Result<Option<CachedLocation>, AppError> {
        let row = sqlx::query_as::<_, (String, String)>(
            "SELECT location, updated_at FROM ip_location_cache WHERE ip = ?",
        )
        .bind(ip)
        .fetch_optional(self.pool)
        .await?;

        Ok(row.map(|(location, updated_at)| CachedLocation {
            location,
            updated_at: parse_db_timestamp(&updated_at),
        }))
    }

    /// Insert or refresh a cache entry.
    pub async fn upsert(&self, ip: &str, location: &str) -> Result<(), AppError> {
        sqlx::query(
            r#"
            INSERT INTO ip_location_cache (ip, location, updated_at)
            VALUES (?, ?, ?)
            ON CONFLICT(ip) DO UPDATE SET location = excluded.location,
                                          updated_at = excluded.updated_at
            "#,
        )
        .bind(ip)
        .bind(location)
        .bind(Utc::now().to_rfc3339())
        .execute(self.pool)
        .await?;
        Ok(())
    }

    /// Drop entries older than the freshness window. Returns rows removed.
    pub async fn purge_stale(&self, ttl_days: i64) -> Result<u64, AppError> {
        let result = sqlx::query(
            "DELETE FROM ip_location_cache
             WHERE DATETIME(updated_at) < DATETIME('now', ? || ' days')",
        )
        .bind(format!("-{}", ttl_days))
        .execute(self.pool)
        .await?;
        Ok(result.rows_affected())
    }
}
