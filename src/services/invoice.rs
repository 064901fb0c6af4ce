//! Invoice submission and lifecycle service
//!
//! Orchestrates the submission pipeline: input validation, duplicate
//! pre-check, QR parsing, insert, and an audit record on every exit path.
//! The unique index on the raw payload is the last line of defense; a
//! constraint violation on insert is reported as a duplicate, not an error.

use sqlx::SqlitePool;
use uuid::Uuid;

use crate::db::{
    invoice_repository::NewInvoice, log_repository::NewLogEntry, InvoiceRepository,
};
use crate::middleware::{AuthUser, ClientMeta};
use crate::models::{
    ActionKind, DuplicateRecord, Invoice, InvoiceDetail, InvoiceFilters, Pagination,
    SubmitInvoiceRequest, UpdateInvoiceRequest,
};
use crate::services::{qr, AuditService};
use crate::utils::error::{AppError, AppResult};

/// Outcome of a submission that did not error.
#[derive(Debug)]
pub enum SubmitOutcome {
    Created(Invoice),
    Duplicate {
        existing: DuplicateRecord,
        message: String,
    },
}

pub struct InvoiceService {
    pool: SqlitePool,
}

impl InvoiceService {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Run the full submission pipeline for one QR payload.
    pub async fn submit(
        &self,
        actor: &AuthUser,
        meta: &ClientMeta,
        request: &SubmitInvoiceRequest,
        audit: &AuditService,
    ) -> AppResult<SubmitOutcome> {
        let repo = InvoiceRepository::new(&self.pool);
        let qr_code = request.qr_code.trim();
        let holder_name = request.holder_name.trim();
        let voucher_number = request.voucher_number.trim();

        if let Some(message) = validation_error(qr_code, holder_name, voucher_number) {
            audit
                .record(self.entry(
                    ActionKind::InvoiceProcessError,
                    actor,
                    meta,
                    "提交发票失败",
                    None,
                    false,
                    message,
                ))
                .await;
            return Err(AppError::bad_request(message));
        }

        // Pre-check for the friendly duplicate message. A storage failure
        // here rejects the submission rather than risking a double record.
        let existing = match repo.find_by_qr(qr_code).await {
            Ok(existing) => existing,
            Err(e) => {
                audit
                    .record(self.entry(
                        ActionKind::InvoiceProcessError,
                        actor,
                        meta,
                        "发票查重失败",
                        None,
                        false,
                        &e.to_string(),
                    ))
                    .await;
                return Err(e);
            }
        };
        if let Some(existing) = existing {
            return Ok(self
                .duplicate_outcome(existing, actor, meta, audit)
                .await);
        }

        let parsed = match qr::parse(qr_code) {
            Ok(parsed) => parsed,
            Err(e) => {
                let message = e.to_string();
                audit
                    .record(self.entry(
                        ActionKind::InvoiceParseError,
                        actor,
                        meta,
                        "二维码解析失败",
                        None,
                        false,
                        &message,
                    ))
                    .await;
                return Err(AppError::bad_request(message));
            }
        };

        let new_invoice = NewInvoice {
            code: parsed.code,
            number: parsed.number,
            issue_date: parsed.issue_date,
            amount: parsed.amount,
            raw_qr: parsed.raw_qr,
            holder_name: holder_name.to_string(),
            voucher_number: voucher_number.to_string(),
            creator_id: actor.id,
        };

        match repo.insert(&new_invoice).await {
            Ok(invoice) => {
                audit
                    .record(self.entry(
                        ActionKind::InvoiceCreate,
                        actor,
                        meta,
                        &format!("登记发票 {}", invoice.number),
                        Some(invoice.id.to_string()),
                        true,
                        "",
                    ))
                    .await;
                Ok(SubmitOutcome::Created(invoice))
            }
            Err(e) if e.is_conflict() => {
                // Lost the race to a concurrent submission of the same QR
                let existing = repo
                    .find_by_qr(qr_code)
                    .await
                    .ok()
                    .flatten()
                    .unwrap_or_else(|| DuplicateRecord {
                        id: Uuid::nil(),
                        code: String::new(),
                        number: String::new(),
                        holder_name: String::new(),
                        voucher_number: String::new(),
                    });
                Ok(self
                    .duplicate_outcome(existing, actor, meta, audit)
                    .await)
            }
            Err(e) => {
                audit
                    .record(self.entry(
                        ActionKind::InvoiceSaveError,
                        actor,
                        meta,
                        "发票保存失败",
                        None,
                        false,
                        &e.to_string(),
                    ))
                    .await;
                Err(e)
            }
        }
    }

    /// Duplicate detection is a successful outcome, not an error: the audit
    /// entry carries the existing row's id and reads as a success so it
    /// never shows up under failure filters in the log viewer.
    async fn duplicate_outcome(
        &self,
        existing: DuplicateRecord,
        actor: &AuthUser,
        meta: &ClientMeta,
        audit: &AuditService,
    ) -> SubmitOutcome {
        let message = existing.message();
        let target_id = (!existing.id.is_nil()).then(|| existing.id.to_string());
        audit
            .record(self.entry(
                ActionKind::InvoiceDuplicate,
                actor,
                meta,
                &message,
                target_id,
                true,
                "",
            ))
            .await;
        SubmitOutcome::Duplicate { existing, message }
    }

    pub async fn get(&self, id: Uuid) -> AppResult<InvoiceDetail> {
        InvoiceRepository::new(&self.pool).get(id).await
    }

    pub async fn list(
        &self,
        filters: &InvoiceFilters,
        page: u32,
        page_size: u32,
    ) -> AppResult<(Vec<InvoiceDetail>, Pagination)> {
        InvoiceRepository::new(&self.pool)
            .list(filters, page, page_size)
            .await
    }

    pub async fn update(
        &self,
        id: Uuid,
        actor: &AuthUser,
        meta: &ClientMeta,
        request: &UpdateInvoiceRequest,
        audit: &AuditService,
    ) -> AppResult<InvoiceDetail> {
        let repo = InvoiceRepository::new(&self.pool);
        let result = repo
            .update(id, request.holder_name.trim(), request.voucher_number.trim())
            .await;

        let (success, error_message) = match &result {
            Ok(()) => (true, String::new()),
            Err(e) => (false, e.to_string()),
        };
        audit
            .record(self.entry(
                ActionKind::InvoiceEdit,
                actor,
                meta,
                "修改发票登记信息",
                Some(id.to_string()),
                success,
                &error_message,
            ))
            .await;

        result?;
        repo.get(id).await
    }

    pub async fn delete(
        &self,
        id: Uuid,
        actor: &AuthUser,
        meta: &ClientMeta,
        audit: &AuditService,
    ) -> AppResult<()> {
        let repo = InvoiceRepository::new(&self.pool);
        // Capture the number for the audit description before the row goes
        let number = repo.get(id).await.map(|d| d.invoice.number).ok();
        let result = repo.delete(id).await;

        let (success, error_message) = match &result {
            Ok(()) => (true, String::new()),
            Err(e) => (false, e.to_string()),
        };
        audit
            .record(self.entry(
                ActionKind::InvoiceDelete,
                actor,
                meta,
                &format!("删除发票 {}", number.unwrap_or_default()),
                Some(id.to_string()),
                success,
                &error_message,
            ))
            .await;

        result
    }

    #[allow(clippy::too_many_arguments)]
    fn entry(
        &self,
        action: ActionKind,
        actor: &AuthUser,
        meta: &ClientMeta,
        description: &str,
        target_id: Option<String>,
        success: bool,
        error_message: &str,
    ) -> NewLogEntry {
        NewLogEntry {
            user_id: Some(actor.id),
            username: actor.username.clone(),
            action,
            description: description.to_string(),
            ip_address: meta.ip_address.clone(),
            user_agent: meta.user_agent.clone(),
            target_type: "invoice".to_string(),
            target_id,
            success,
            error_message: error_message.to_string(),
        }
    }
}

fn validation_error(
    qr_code: &str,
    holder_name: &str,
    voucher_number: &str,
) -> Option<&'static str> {
    if qr_code.is_empty() {
        Some("二维码内容不能为空")
    } else if holder_name.is_empty() {
        Some("凭证使用人不能为空")
    } else if voucher_number.is_empty() {
        Some("凭证号不能为空")
    } else {
        None
    }
}
