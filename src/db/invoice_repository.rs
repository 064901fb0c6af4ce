//! Invoice repository
//!
//! CRUD and filtered, paginated listing over invoice records, plus the
//! raw-QR equality lookup used for duplicate detection. The `raw_qr` column
//! carries a unique index, so a concurrent duplicate submission surfaces as
//! a constraint violation on insert rather than a second row.

use chrono::Utc;
use sqlx::SqlitePool;
use uuid::Uuid;

use crate::db::parse_db_timestamp;
use crate::models::{DuplicateRecord, Invoice, InvoiceDetail, InvoiceFilters, Pagination};
use crate::utils::error::AppError;

const MIN_PAGE_SIZE: u32 = 1;
const MAX_PAGE_SIZE: u32 = 100;

#[derive(Debug, sqlx::FromRow)]
struct InvoiceRow {
    id: String,
    code: String,
    number: String,
    issue_date: String,
    amount: f64,
    raw_qr: String,
    holder_name: String,
    voucher_number: String,
    creator_id: String,
    created_at: String,
    creator_username: Option<String>,
    creator_realname: Option<String>,
}

/// Fields required to insert a new invoice
#[derive(Debug, Clone)]
pub struct NewInvoice {
    pub code: String,
    pub number: String,
    pub issue_date: String,
    pub amount: f64,
    pub raw_qr: String,
    pub holder_name: String,
    pub voucher_number: String,
    pub creator_id: Uuid,
}

pub struct InvoiceRepository<'a> {
    pool: &'a SqlitePool,
}

impl<'a> InvoiceRepository<'a> {
    pub fn new(pool: &'a SqlitePool) -> Self {
        Self { pool }
    }

    /// Insert a new invoice, assigning id and creation timestamp.
    ///
    /// Returns `AppError::Conflict` when another record already holds the
    /// same raw QR text (unique index violation).
    pub async fn insert(&self, data: &NewInvoice) -> Result<Invoice, AppError> {
        if data.code.is_empty()
            || data.number.is_empty()
            || data.raw_qr.is_empty()
            || data.holder_name.is_empty()
            || data.voucher_number.is_empty()
        {
            return Err(AppError::bad_request("发票必填字段不能为空"));
        }

        let id = Uuid::new_v4();
        let created_at = Utc::now();

        sqlx::query(
            r#"
            INSERT INTO invoices (id, code, number, issue_date, amount, raw_qr,
                                  holder_name, voucher_number, creator_id, created_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(id.to_string())
        .bind(&data.code)
        .bind(&data.number)
        .bind(&data.issue_date)
        .bind(data.amount)
        .bind(&data.raw_qr)
        .bind(&data.holder_name)
        .bind(&data.voucher_number)
        .bind(data.creator_id.to_string())
        .bind(created_at.to_rfc3339())
        .execute(self.pool)
        .await?;

        Ok(Invoice {
            id,
            code: data.code.clone(),
            number: data.number.clone(),
            issue_date: data.issue_date.clone(),
            amount: data.amount,
            raw_qr: data.raw_qr.clone(),
            holder_name: data.holder_name.clone(),
            voucher_number: data.voucher_number.clone(),
            creator_id: data.creator_id,
            created_at,
        })
    }

    /// Equality lookup on the raw QR payload.
    pub async fn find_by_qr(&self, raw_qr: &str) -> Result<Option<DuplicateRecord>, AppError> {
        let row = sqlx::query_as::<_, (String, String, String, String, String)>(
            r#"
            SELECT id, code, number, holder_name, voucher_number
            FROM invoices
            WHERE raw_qr = ?
            LIMIT 1
            "#,
        )
        .bind(raw_qr)
        .fetch_optional(self.pool)
        .await?;

        Ok(
            row.map(|(id, code, number, holder_name, voucher_number)| DuplicateRecord {
                id: Uuid::parse_str(&id).unwrap_or_else(|_| Uuid::nil()),
                code,
                number,
                holder_name,
                voucher_number,
            }),
        )
    }

    /// Update holder name and voucher number, the only editable fields.
    pub async fn update(
        &self,
        id: Uuid,
        holder_name: &str,
        voucher_number: &str,
    ) -> Result<(), AppError> {
        if holder_name.is_empty() {
            return Err(AppError::bad_request("凭证使用人不能为空"));
        }
        if voucher_number.is_empty() {
            return Err(AppError::bad_request("凭证号不能为空"));
        }

        let result = sqlx::query(
            "UPDATE invoices SET holder_name = ?, voucher_number = ? WHERE id = ?",
        )
        .bind(holder_name)
        .bind(voucher_number)
        .bind(id.to_string())
        .execute(self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(AppError::not_found("发票记录不存在"));
        }
        Ok(())
    }

    /// Hard delete.
    pub async fn delete(&self, id: Uuid) -> Result<(), AppError> {
        let result = sqlx::query("DELETE FROM invoices WHERE id = ?")
            .bind(id.to_string())
            .execute(self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(AppError::not_found("发票记录不存在"));
        }
        Ok(())
    }

    /// Fetch a single invoice joined with its creator's display name.
    pub async fn get(&self, id: Uuid) -> Result<InvoiceDetail, AppError> {
        let row = sqlx::query_as::<_, InvoiceRow>(
            r#"
            SELECT i.id, i.code, i.number, i.issue_date, i.amount, i.raw_qr,
                   i.holder_name, i.voucher_number, i.creator_id, i.created_at,
                   u.username AS creator_username, u.realname AS creator_realname
            FROM invoices i
            LEFT JOIN users u ON i.creator_id = u.id
            WHERE i.id = ?
            LIMIT 1
            "#,
        )
        .bind(id.to_string())
        .fetch_optional(self.pool)
        .await?
        .ok_or_else(|| AppError::not_found("发票记录不存在"))?;

        Ok(row_to_detail(row))
    }

    /// Filtered, paginated listing, always newest-created-first.
    pub async fn list(
        &self,
        filters: &InvoiceFilters,
        page: u32,
        page_size: u32,
    ) -> Result<(Vec<InvoiceDetail>, Pagination), AppError> {
        let page = page.max(1);
        let page_size = page_size.clamp(MIN_PAGE_SIZE, MAX_PAGE_SIZE);
        // i64 arithmetic: a huge client-supplied page must not overflow
        let offset = (page as i64 - 1) * page_size as i64;

        let mut conditions: Vec<&str> = Vec::new();
        if filters.number.is_some() {
            conditions.push("i.number LIKE ?");
        }
        if filters.holder_name.is_some() {
            conditions.push("i.holder_name LIKE ?");
        }
        if filters.creator_id.is_some() {
            conditions.push("i.creator_id = ?");
        }
        if filters.start_date.is_some() {
            conditions.push("DATE(i.created_at) >= ?");
        }
        if filters.end_date.is_some() {
            conditions.push("DATE(i.created_at) <= ?");
        }

        let where_clause = if conditions.is_empty() {
            String::new()
        } else {
            format!("WHERE {}", conditions.join(" AND "))
        };

        let count_sql = format!("SELECT COUNT(*) FROM invoices i {}", where_clause);
        let mut count_query = sqlx::query_scalar::<_, i64>(&count_sql);
        count_query = bind_filters(count_query, filters);
        let total: i64 = count_query.fetch_one(self.pool).await?;

        let data_sql = format!(
            r#"
            SELECT i.id, i.code, i.number, i.issue_date, i.amount, i.raw_qr,
                   i.holder_name, i.voucher_number, i.creator_id, i.created_at,
                   u.username AS creator_username, u.realname AS creator_realname
            FROM invoices i
            LEFT JOIN users u ON i.creator_id = u.id
            {}
            ORDER BY i.created_at DESC
            LIMIT ? OFFSET ?
            "#,
            where_clause
        );

        let mut data_query = sqlx::query_as::<_, InvoiceRow>(&data_sql);
        data_query = bind_filters_as(data_query, filters);
        let rows = data_query
            .bind(page_size as i64)
            .bind(offset)
            .fetch_all(self.pool)
            .await?;

        let invoices = rows.into_iter().map(row_to_detail).collect();
        let pagination = Pagination::new(page, page_size, total as u64);

        Ok((invoices, pagination))
    }
}

type ScalarQuery<'q> =
    sqlx::query::QueryScalar<'q, sqlx::Sqlite, i64, sqlx::sqlite::SqliteArguments<'q>>;

fn bind_filters<'q>(mut q: ScalarQuery<'q>, filters: &'q InvoiceFilters) -> ScalarQuery<'q> {
    if let Some(ref number) = filters.number {
        q = q.bind(format!("%{}%", number));
    }
    if let Some(ref holder) = filters.holder_name {
        q = q.bind(format!("%{}%", holder));
    }
    if let Some(creator_id) = filters.creator_id {
        q = q.bind(creator_id.to_string());
    }
    if let Some(ref start) = filters.start_date {
        q = q.bind(start);
    }
    if let Some(ref end) = filters.end_date {
        q = q.bind(end);
    }
    q
}

type RowQuery<'q> = sqlx::query::QueryAs<
    'q,
    sqlx::Sqlite,
    InvoiceRow,
    sqlx::sqlite::SqliteArguments<'q>,
>;

fn bind_filters_as<'q>(mut q: RowQuery<'q>, filters: &'q InvoiceFilters) -> RowQuery<'q> {
    if let Some(ref number) = filters.number {
        q = q.bind(format!("%{}%", number));
    }
    if let Some(ref holder) = filters.holder_name {
        q = q.bind(format!("%{}%", holder));
    }
    if let Some(creator_id) = filters.creator_id {
        q = q.bind(creator_id.to_string());
    }
    if let Some(ref start) = filters.start_date {
        q = q.bind(start);
    }
    if let Some(ref end) = filters.end_date {
        q = q.bind(end);
    }
    q
}

fn row_to_detail(row: InvoiceRow) -> InvoiceDetail {
    InvoiceDetail {
        invoice: Invoice {
            id: Uuid::parse_str(&row.id).unwrap_or_else(|_| Uuid::nil()),
            code: row.code,
            number: row.number,
            issue_date: row.issue_date,
            amount: row.amount,
            raw_qr: row.raw_qr,
            holder_name: row.holder_name,
            voucher_number: row.voucher_number,
            creator_id: Uuid::parse_str(&row.creator_id).unwrap_or_else(|_| Uuid::nil()),
            created_at: parse_db_timestamp(&row.created_at),
        },
        creator_username: row.creator_username.unwrap_or_default(),
        creator_realname: row.creator_realname.unwrap_or_default(),
    }
}
