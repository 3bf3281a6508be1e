//! AMC invoice model.

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

/// Days between invoice issue and due date.
pub const INVOICE_DUE_GRACE_DAYS: i64 = 15;

/// Invoice status.
///
/// Only `pending` and `paid` are stored. `overdue` is derived at read time
/// from the due date so no background job is needed to flip it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InvoiceStatus {
    Pending,
    Paid,
    Overdue,
}

impl InvoiceStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            InvoiceStatus::Pending => "pending",
            InvoiceStatus::Paid => "paid",
            InvoiceStatus::Overdue => "overdue",
        }
    }

    pub fn from_string(s: &str) -> Self {
        match s {
            "paid" => InvoiceStatus::Paid,
            "overdue" => InvoiceStatus::Overdue,
            _ => InvoiceStatus::Pending,
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(InvoiceStatus::Pending),
            "paid" => Some(InvoiceStatus::Paid),
            "overdue" => Some(InvoiceStatus::Overdue),
            _ => None,
        }
    }
}

/// Derive the read-time status of an unpaid invoice.
pub fn derived_status(stored: InvoiceStatus, due_date: NaiveDate, today: NaiveDate) -> InvoiceStatus {
    match stored {
        InvoiceStatus::Pending if due_date < today => InvoiceStatus::Overdue,
        other => other,
    }
}

/// Invoice generated from a subscription's billing cycle.
///
/// Immutable once created except for `status`. The client fields are copied
/// from the subscription at generation time for listing views.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Invoice {
    pub invoice_id: Uuid,
    pub invoice_number: String,
    pub subscription_id: Uuid,
    pub client_name: String,
    pub service_type: String,
    pub amount: Decimal,
    pub period_start: NaiveDate,
    pub period_end: NaiveDate,
    pub issue_date: NaiveDate,
    pub due_date: NaiveDate,
    pub status: String,
    pub created_utc: DateTime<Utc>,
    pub paid_utc: Option<DateTime<Utc>>,
}

/// Filter parameters for listing invoices.
#[derive(Debug, Clone, Default)]
pub struct ListInvoicesFilter {
    pub status: Option<InvoiceStatus>,
    pub subscription_id: Option<Uuid>,
}
