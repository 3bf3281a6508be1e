//! Settlement dashboard projection.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Aggregate view over the subscription ledger and commission engine.
///
/// Recomputed from source rows on every request, never cached or maintained
/// incrementally.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DashboardSummary {
    pub active_subscriptions: i64,
    pub monthly_recurring_revenue: Decimal,
    pub pending_invoices: i64,
    pub overdue_invoices: i64,
    pub partners: i64,
    pub total_sales: Decimal,
    pub pending_payouts: Decimal,
    pub total_commission_paid: Decimal,
}
