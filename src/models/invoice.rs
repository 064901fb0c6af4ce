//! Invoice models

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Invoice entity as persisted
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Invoice {
    pub id: Uuid,
    /// Invoice code extracted from the QR payload
    pub code: String,
    /// Invoice number extracted from the QR payload
    pub number: String,
    /// ISO date (YYYY-MM-DD) or empty when the payload date was unparseable
    pub issue_date: String,
    pub amount: f64,
    /// Full original QR payload; the natural dedup key
    pub raw_qr: String,
    /// 凭证使用人 - person the reimbursement voucher is issued to
    pub holder_name: String,
    /// 凭证号 - internal reimbursement document number
    pub voucher_number: String,
    pub creator_id: Uuid,
    pub created_at: DateTime<Utc>,
}

/// Invoice joined with its creator's display name
#[derive(Debug, Clone, Serialize)]
pub struct InvoiceDetail {
    #[serde(flatten)]
    pub invoice: Invoice,
    pub creator_username: String,
    pub creator_realname: String,
}

/// Structured fields extracted from a QR payload by the parser
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ParsedInvoice {
    pub code: String,
    pub number: String,
    pub issue_date: String,
    pub amount: f64,
    pub raw_qr: String,
}

/// Identifying fields of an already-persisted invoice with the same QR payload
#[derive(Debug, Clone, Serialize)]
pub struct DuplicateRecord {
    pub id: Uuid,
    pub code: String,
    pub number: String,
    pub holder_name: String,
    pub voucher_number: String,
}

impl DuplicateRecord {
    /// Build the user-facing duplicate message from whichever of
    /// holder/voucher are present on the existing record.
    pub fn message(&self) -> String {
        let holder = !self.holder_name.is_empty();
        let voucher = !self.voucher_number.is_empty();
        match (holder, voucher) {
            (false, false) => "该发票已报销，请仔细查验！".to_string(),
            (false, true) => format!("该发票已在 {} 凭证中报销，请仔细查验！", self.voucher_number),
            (true, false) => format!("该发票已由 {} 报销，请仔细查验！", self.holder_name),
            (true, true) => format!(
                "该发票已由 {} 在 {} 凭证中报销，请仔细查验！",
                self.holder_name, self.voucher_number
            ),
        }
    }
}

/// Optional predicates for invoice listing
#[derive(Debug, Clone, Default, Deserialize)]
pub struct InvoiceFilters {
    /// Substring match on invoice number
    pub number: Option<String>,
    /// Substring match on holder name
    pub holder_name: Option<String>,
    /// Equality match on creator
    pub creator_id: Option<Uuid>,
    /// Inclusive creation-date range, YYYY-MM-DD
    pub start_date: Option<String>,
    pub end_date: Option<String>,
}

/// Pagination envelope returned by list queries
#[derive(Debug, Clone, Serialize)]
pub struct Pagination {
    pub page: u32,
    pub page_size: u32,
    pub total_records: u64,
    pub total_pages: u32,
}

impl Pagination {
    pub fn new(page: u32, page_size: u32, total_records: u64) -> Self {
        let total_pages = (total_records as f64 / page_size as f64).ceil() as u32;
        Self {
            page,
            page_size,
            total_records,
            total_pages,
        }
    }
}

/// A page of invoices with creator names
#[derive(Debug, Serialize)]
pub struct InvoicePage {
    pub invoices: Vec<InvoiceDetail>,
    pub pagination: Pagination,
}

/// Submission request: raw QR text plus the two user-supplied fields
#[derive(Debug, Deserialize)]
pub struct SubmitInvoiceRequest {
    pub qr_code: String,
    pub holder_name: String,
    pub voucher_number: String,
}

/// Only holder name and voucher number are editable post-creation
#[derive(Debug, Deserialize)]
pub struct UpdateInvoiceRequest {
    pub holder_name: String,
    pub voucher_number: String,
}
