//! Sales partner model.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

/// Partner status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PartnerStatus {
    Active,
    Inactive,
}

impl PartnerStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            PartnerStatus::Active => "active",
            PartnerStatus::Inactive => "inactive",
        }
    }

    pub fn from_string(s: &str) -> Self {
        match s {
            "inactive" => PartnerStatus::Inactive,
            _ => PartnerStatus::Active,
        }
    }
}

/// Sales partner with materialized commission totals.
///
/// The totals are only ever written inside the same transaction as the deal
/// mutation that causes them, with the partner row locked, so they cannot
/// diverge from the deal set.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Partner {
    pub partner_id: Uuid,
    pub name: String,
    pub email: String,
    pub phone: Option<String>,
    pub company: Option<String>,
    pub commission_rate: Decimal,
    pub status: String,
    pub total_sales: Decimal,
    pub total_commission: Decimal,
    pub pending_commission: Decimal,
    pub created_utc: DateTime<Utc>,
    pub updated_utc: DateTime<Utc>,
}

/// Input for creating a partner.
#[derive(Debug, Clone)]
pub struct CreatePartner {
    pub name: String,
    pub email: String,
    pub phone: Option<String>,
    pub company: Option<String>,
    pub commission_rate: Decimal,
}
