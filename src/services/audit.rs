//! Activity audit service
//!
//! Every state-changing or security-relevant operation goes through
//! `record`. Recording is best-effort: a storage failure is logged via
//! tracing and swallowed so it can never break the operation being audited.

use sqlx::SqlitePool;
use tracing::error;

use crate::db::{log_repository::NewLogEntry, LogRepository};
use crate::models::{LogFilters, LogPage, LogStatistics};
use crate::services::GeoipService;
use crate::utils::error::AppResult;

pub struct AuditService {
    pool: SqlitePool,
}

impl AuditService {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Record an audit entry. Never fails; failures are traced only.
    pub async fn record(&self, entry: NewLogEntry) {
        let repo = LogRepository::new(&self.pool);
        if let Err(e) = repo.insert(&entry).await {
            error!(
                action = %entry.action,
                username = %entry.username,
                error = %e,
                "Failed to record audit entry"
            );
        }
    }

    /// Paginated query with per-page geolocation enrichment.
    ///
    /// Only the distinct IPs of the returned page are resolved, bounding
    /// the external-call cost. Enrichment failures leave locations null.
    pub async fn query(
        &self,
        filters: &LogFilters,
        page: u32,
        page_size: u32,
        geoip: &GeoipService,
    ) -> AppResult<LogPage> {
        let repo = LogRepository::new(&self.pool);
        let (mut logs, pagination) = repo.list(filters, page, page_size).await?;

        let mut distinct_ips: Vec<String> = logs.iter().map(|l| l.ip_address.clone()).collect();
        distinct_ips.sort();
        distinct_ips.dedup();

        let locations = geoip.resolve_batch(&distinct_ips).await;
        for log in &mut logs {
            log.ip_location = locations.get(&log.ip_address).cloned().flatten();
        }

        Ok(LogPage { logs, pagination })
    }

    pub async fn statistics(&self) -> AppResult<LogStatistics> {
        LogRepository::new(&self.pool).statistics().await
    }

    pub async fn action_kinds(&self) -> AppResult<Vec<String>> {
        LogRepository::new(&self.pool).action_kinds().await
    }

    /// Retention sweep; returns entries removed.
    pub async fn purge(&self, older_than_days: i64) -> u64 {
        match LogRepository::new(&self.pool)
            .purge_older_than(older_than_days)
            .await
        {
            Ok(removed) => removed,
            Err(e) => {
                error!(error = %e, "Audit log purge failed");
                0
            }
        }
    }
}
