//! AMC invoice handlers.

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use rust_decimal::prelude::ToPrimitive;
use serde::Deserialize;
use service_core::error::AppError;
use uuid::Uuid;

use crate::models::{InvoiceStatus, ListInvoicesFilter};
use crate::services::metrics::{record_invoice_amount, record_invoice_operation};
use crate::startup::AppState;

#[derive(Debug, Deserialize)]
pub struct ListInvoicesQuery {
    pub status: Option<String>,
    pub subscription_id: Option<Uuid>,
}

pub async fn generate_invoice(
    State(state): State<AppState>,
    Path(subscription_id): Path<Uuid>,
) -> Result<impl IntoResponse, AppError> {
    let (invoice, subscription) = state.db.generate_invoice(subscription_id).await?;

    record_invoice_operation("generate");
    record_invoice_amount(
        &subscription.frequency,
        invoice.amount.to_f64().unwrap_or(0.0),
    );

    Ok((StatusCode::CREATED, Json(invoice)))
}

pub async fn list_invoices(
    State(state): State<AppState>,
    Query(query): Query<ListInvoicesQuery>,
) -> Result<impl IntoResponse, AppError> {
    let status = match query.status.as_deref() {
        Some(raw) => Some(InvoiceStatus::parse(raw).ok_or_else(|| {
            AppError::Validation(anyhow::anyhow!("Unknown invoice status: {}", raw))
        })?),
        None => None,
    };

    let invoices = state
        .db
        .list_invoices(&ListInvoicesFilter {
            status,
            subscription_id: query.subscription_id,
        })
        .await?;

    Ok(Json(invoices))
}

pub async fn pay_invoice(
    State(state): State<AppState>,
    Path(invoice_id): Path<Uuid>,
) -> Result<impl IntoResponse, AppError> {
    let invoice = state.db.mark_invoice_paid(invoice_id).await?;
    record_invoice_operation("pay");

    Ok(Json(invoice))
}
