//! Invoice endpoints
//!
//! Submission, listing, detail, edit and delete. Any authenticated user may
//! edit or delete any record; the audit trail is the accountability layer.

use axum::{
    extract::{Path, Query, State},
    routing::get,
    Json, Router,
};
use serde::Deserialize;
use serde_json::{json, Value};
use uuid::Uuid;

use crate::{
    middleware::{AuthUser, ClientMeta},
    models::{
        InvoiceDetail, InvoiceFilters, InvoicePage, SubmitInvoiceRequest, UpdateInvoiceRequest,
    },
    services::{AuditService, InvoiceService, SubmitOutcome},
    utils::error::AppResult,
    AppState,
};

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/", get(list_invoices).post(submit_invoice))
        .route(
            "/{id}",
            get(get_invoice).put(update_invoice).delete(delete_invoice),
        )
}

#[derive(Debug, Deserialize)]
struct ListQuery {
    #[serde(default = "default_page")]
    page: u32,
    #[serde(default = "default_page_size")]
    page_size: u32,
    number: Option<String>,
    holder_name: Option<String>,
    creator_id: Option<Uuid>,
    start_date: Option<String>,
    end_date: Option<String>,
}

fn default_page() -> u32 {
    1
}

fn default_page_size() -> u32 {
    20
}

async fn submit_invoice(
    State(state): State<AppState>,
    auth_user: AuthUser,
    meta: ClientMeta,
    Json(request): Json<SubmitInvoiceRequest>,
) -> AppResult<Json<Value>> {
    let service = InvoiceService::new(state.db.clone());
    let audit = AuditService::new(state.db.clone());

    let outcome = service.submit(&auth_user, &meta, &request, &audit).await?;
    let body = match outcome {
        SubmitOutcome::Created(invoice) => json!({
            "success": true,
            "invoice": invoice,
        }),
        SubmitOutcome::Duplicate { existing, message } => json!({
            "duplicate": true,
            "existing_record": existing,
            "message": message,
        }),
    };
    Ok(Json(body))
}

async fn list_invoices(
    State(state): State<AppState>,
    _auth_user: AuthUser,
    Query(query): Query<ListQuery>,
) -> AppResult<Json<InvoicePage>> {
    let filters = InvoiceFilters {
        number: query.number.filter(|s| !s.is_empty()),
        holder_name: query.holder_name.filter(|s| !s.is_empty()),
        creator_id: query.creator_id,
        start_date: query.start_date.filter(|s| !s.is_empty()),
        end_date: query.end_date.filter(|s| !s.is_empty()),
    };

    let service = InvoiceService::new(state.db.clone());
    let (invoices, pagination) = service.list(&filters, query.page, query.page_size).await?;
    Ok(Json(InvoicePage {
        invoices,
        pagination,
    }))
}

async fn get_invoice(
    State(state): State<AppState>,
    _auth_user: AuthUser,
    Path(id): Path<Uuid>,
) -> AppResult<Json<InvoiceDetail>> {
    let detail = InvoiceService::new(state.db.clone()).get(id).await?;
    Ok(Json(detail))
}

async fn update_invoice(
    State(state): State<AppState>,
    auth_user: AuthUser,
    meta: ClientMeta,
    Path(id): Path<Uuid>,
    Json(request): Json<UpdateInvoiceRequest>,
) -> AppResult<Json<InvoiceDetail>> {
    let service = InvoiceService::new(state.db.clone());
    let audit = AuditService::new(state.db.clone());
    let detail = service
        .update(id, &auth_user, &meta, &request, &audit)
        .await?;
    Ok(Json(detail))
}

async fn delete_invoice(
    State(state): State<AppState>,
    auth_user: AuthUser,
    meta: ClientMeta,
    Path(id): Path<Uuid>,
) -> AppResult<Json<Value>> {
    let service = InvoiceService::new(state.db.clone());
    let audit = AuditService::new(state.db.clone());
    service.delete(id, &auth_user, &meta, &audit).await?;
    Ok(Json(json!({"success": true})))
}
