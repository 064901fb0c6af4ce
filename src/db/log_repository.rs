//! Audit log repository
//!
//! Append-only system activity trail. Entries are never updated; the only
//! deletion path is the retention sweep.

use chrono::Utc;
use sqlx::SqlitePool;
use uuid::Uuid;

use crate::db::parse_db_timestamp;
use crate::models::{ActionKind, LogEntry, LogFilters, LogStatistics, Pagination};
use crate::utils::error::AppError;

const MIN_PAGE_SIZE: u32 = 1;
const MAX_PAGE_SIZE: u32 = 100;

/// Fields of a new audit entry; id and timestamp are assigned on insert.
#[derive(Debug, Clone)]
pub struct NewLogEntry {
    pub user_id: Option<Uuid>,
    pub username: String,
    pub action: ActionKind,
    pub description: String,
    pub ip_address: String,
    pub user_agent: String,
    pub target_type: String,
    pub target_id: Option<String>,
    pub success: bool,
    pub error_message: String,
}

impl NewLogEntry {
    pub fn new(action: ActionKind) -> Self {
        Self {
            user_id: None,
            username: String::new(),
            action,
            description: String::new(),
            ip_address: "-".to_string(),
            user_agent: String::new(),
            target_type: String::new(),
            target_id: None,
            success: true,
            error_message: String::new(),
        }
    }
}

#[derive(Debug, sqlx::FromRow)]
struct LogRow {
    id: String,
    user_id: Option<String>,
    username: String,
    action: String,
    description: String,
    ip_address: String,
    user_agent: String,
    target_type: String,
    target_id: Option<String>,
    success: i64,
    error_message: String,
    created_at: String,
}

pub struct LogRepository<'a> {
    pool: &'a SqlitePool,
}

impl<'a> LogRepository<'a> {
    pub fn new(pool: &'a SqlitePool) -> Self {
        Self { pool }
    }

    pub async fn insert(&self, entry: &NewLogEntry) -> Result<Uuid, AppError> {
        let id = Uuid::new_v4();
        sqlx::query(
            r#"
            INSERT INTO system_logs (id, user_id, username, action, description,
                                     ip_address, user_agent, target_type, target_id,
                                     success, error_message, created_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(id.to_string())
        .bind(entry.user_id.map(|u| u.to_string()))
        .bind(&entry.username)
        .bind(entry.action.as_str())
        .bind(&entry.description)
        .bind(&entry.ip_address)
        .bind(&entry.user_agent)
        .bind(&entry.target_type)
        .bind(&entry.target_id)
        .bind(entry.success as i64)
        .bind(&entry.error_message)
        .bind(Utc::now().to_rfc3339())
        .execute(self.pool)
        .await?;
        Ok(id)
    }

    /// Filtered, paginated listing, newest-first. Locations are left unset;
    /// the audit service enriches them per page.
    pub async fn list(
        &self,
        filters: &LogFilters,
        page: u32,
        page_size: u32,
    ) -> Result<(Vec<LogEntry>, Pagination), AppError> {
        let page = page.max(1);
        let page_size = page_size.clamp(MIN_PAGE_SIZE, MAX_PAGE_SIZE);
        // i64 arithmetic: a huge client-supplied page must not overflow
        let offset = (page as i64 - 1) * page_size as i64;

        let mut conditions: Vec<&str> = Vec::new();
        if filters.action.is_some() {
            conditions.push("action = ?");
        }
        if filters.username.is_some() {
            conditions.push("username LIKE ?");
        }
        if filters.ip_address.is_some() {
            conditions.push("ip_address LIKE ?");
        }
        if filters.success.is_some() {
            conditions.push("success = ?");
        }
        if filters.start_date.is_some() {
            conditions.push("DATE(created_at) >= ?");
        }
        if filters.end_date.is_some() {
            conditions.push("DATE(created_at) <= ?");
        }

        let where_clause = if conditions.is_empty() {
            String::new()
        } else {
            format!("WHERE {}", conditions.join(" AND "))
        };

        let count_sql = format!("SELECT COUNT(*) FROM system_logs {}", where_clause);
        let mut count_query = sqlx::query_scalar::<_, i64>(&count_sql);
        count_query = bind_scalar_filters(count_query, filters);
        let total: i64 = count_query.fetch_one(self.pool).await?;

        let data_sql = format!(
            r#"
            SELECT id, user_id, username, action, description, ip_address,
                   user_agent, target_type, target_id, success, error_message,
                   created_at
            FROM system_logs
            {}
            ORDER BY created_at DESC
            LIMIT ? OFFSET ?
            "#,
            where_clause
        );
        let mut data_query = sqlx::query_as::<_, LogRow>(&data_sql);
        data_query = bind_row_filters(data_query, filters);
        let rows = data_query
            .bind(page_size as i64)
            .bind(offset)
            .fetch_all(self.pool)
            .await?;

        let logs = rows.into_iter().map(row_to_entry).collect();
        let pagination = Pagination::new(page, page_size, total as u64);
        Ok((logs, pagination))
    }

    /// Login/activity rollup counters for the admin dashboard.
    pub async fn statistics(&self) -> Result<LogStatistics, AppError> {
        let today_logins: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM system_logs
             WHERE action = 'LOGIN' AND success = 1 AND DATE(created_at) = DATE('now')",
        )
        .fetch_one(self.pool)
        .await?;

        let week_logins: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM system_logs
             WHERE action = 'LOGIN' AND success = 1
               AND DATETIME(created_at) >= DATETIME('now', '-7 days')",
        )
        .fetch_one(self.pool)
        .await?;

        let month_logins: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM system_logs
             WHERE action = 'LOGIN' AND success = 1
               AND DATETIME(created_at) >= DATETIME('now', '-30 days')",
        )
        .fetch_one(self.pool)
        .await?;

        let active_users: i64 = sqlx::query_scalar(
            "SELECT COUNT(DISTINCT user_id) FROM system_logs
             WHERE user_id IS NOT NULL
               AND DATETIME(created_at) >= DATETIME('now', '-30 days')",
        )
        .fetch_one(self.pool)
        .await?;

        let failed_logins: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM system_logs
             WHERE action = 'LOGIN' AND success = 0
               AND DATETIME(created_at) >= DATETIME('now', '-7 days')",
        )
        .fetch_one(self.pool)
        .await?;

        Ok(LogStatistics {
            today_logins: today_logins as u64,
            week_logins: week_logins as u64,
            month_logins: month_logins as u64,
            active_users: active_users as u64,
            failed_logins: failed_logins as u64,
        })
    }

    /// Distinct action values present in the trail, sorted.
    pub async fn action_kinds(&self) -> Result<Vec<String>, AppError> {
        let kinds = sqlx::query_scalar::<_, String>(
            "SELECT DISTINCT action FROM system_logs ORDER BY action",
        )
        .fetch_all(self.pool)
        .await?;
        Ok(kinds)
    }

    /// Delete entries older than the retention window. Returns rows removed.
    pub async fn purge_older_than(&self, days: i64) -> Result<u64, AppError> {
        let result = sqlx::query(
            "DELETE FROM system_logs
             WHERE DATETIME(created_at) < DATETIME('now', ? || ' days')",
        )
        .bind(format!("-{}", days))
        .execute(self.pool)
        .await?;
        Ok(result.rows_affected())
    }
}

type ScalarQuery<'q> =
    sqlx::query::QueryScalar<'q, sqlx::Sqlite, i64, sqlx::sqlite::SqliteArguments<'q>>;

fn bind_scalar_filters<'q>(mut q: ScalarQuery<'q>, filters: &'q LogFilters) -> ScalarQuery<'q> {
    if let Some(ref action) = filters.action {
        q = q.bind(action);
    }
    if let Some(ref username) = filters.username {
        q = q.bind(format!("%{}%", username));
    }
    if let Some(ref ip) = filters.ip_address {
        q = q.bind(format!("%{}%", ip));
    }
    if let Some(success) = filters.success {
        q = q.bind(success as i64);
    }
    if let Some(ref start) = filters.start_date {
        q = q.bind(start);
    }
    if let Some(ref end) = filters.end_date {
        q = q.bind(end);
    }
    q
}

type RowQuery<'q> =
    sqlx::query::QueryAs<'q, sqlx::Sqlite, LogRow, sqlx::sqlite::SqliteArguments<'q>>;

fn bind_row_filters<'q>(mut q: RowQuery<'q>, filters: &'q LogFilters) -> RowQuery<'q> {
    if let Some(ref action) = filters.action {
        q = q.bind(action);
    }
    if let Some(ref username) = filters.username {
        q = q.bind(format!("%{}%", username));
    }
    if let Some(ref ip) = filters.ip_address {
        q = q.bind(format!("%{}%", ip));
    }
    if let Some(success) = filters.success {
        q = q.bind(success as i64);
    }
    if let Some(ref start) = filters.start_date {
        q = q.bind(start);
    }
    if let Some(ref end) = filters.end_date {
        q = q.bind(end);
    }
    q
}

fn row_to_entry(row: LogRow) -> LogEntry {
    LogEntry {
        id: Uuid::parse_str(&row.id).unwrap_or_else(|_| Uuid::nil()),
        user_id: row.user_id.and_then(|u| Uuid::parse_str(&u).ok()),
        username: row.username,
        action: row.action,
        description: row.description,
        ip_address: row.ip_address,
        user_agent: row.user_agent,
        target_type: row.target_type,
        target_id: row.target_id,
        success: row.success != 0,
        error_message: row.error_message,
        ip_location: None,
        created_at: parse_db_timestamp(&row.created_at),
    }
}
