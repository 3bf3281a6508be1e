//! Partner deal model and commission arithmetic.

use chrono::{DateTime, Utc};
use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

/// Deal settlement status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DealStatus {
    Pending,
    Approved,
    Paid,
    Rejected,
}

impl DealStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            DealStatus::Pending => "pending",
            DealStatus::Approved => "approved",
            DealStatus::Paid => "paid",
            DealStatus::Rejected => "rejected",
        }
    }

    pub fn from_string(s: &str) -> Self {
        match s {
            "approved" => DealStatus::Approved,
            "paid" => DealStatus::Paid,
            "rejected" => DealStatus::Rejected,
            _ => DealStatus::Pending,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, DealStatus::Paid | DealStatus::Rejected)
    }

    /// Forward-only transition table.
    ///
    /// pending -> approved -> paid, with pending -> paid as the documented
    /// fast path and rejection allowed from any non-terminal state.
    pub fn can_transition_to(&self, next: DealStatus) -> bool {
        matches!(
            (self, next),
            (DealStatus::Pending, DealStatus::Approved)
                | (DealStatus::Pending, DealStatus::Paid)
                | (DealStatus::Pending, DealStatus::Rejected)
                | (DealStatus::Approved, DealStatus::Paid)
                | (DealStatus::Approved, DealStatus::Rejected)
        )
    }
}

/// Commission owed for a deal, rounded half-up to cents.
///
/// Computed exactly once at registration from the snapshotted rate; the
/// stored value is never recalculated afterwards.
pub fn compute_commission(deal_value: Decimal, commission_rate: Decimal) -> Decimal {
    (deal_value * commission_rate / Decimal::from(100))
        .round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero)
}

/// Registered deal. Locked from the moment it is created: the client and
/// value fields have no update path, only `status` moves.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Deal {
    pub deal_id: Uuid,
    pub partner_id: Uuid,
    pub client_name: String,
    pub deal_value: Decimal,
    pub commission_rate: Decimal,
    pub commission: Decimal,
    pub status: String,
    pub locked: bool,
    pub created_utc: DateTime<Utc>,
    pub updated_utc: DateTime<Utc>,
    pub paid_utc: Option<DateTime<Utc>>,
}

/// Input for registering a deal.
#[derive(Debug, Clone)]
pub struct RegisterDeal {
    pub client_name: String,
    pub deal_value: Decimal,
}
