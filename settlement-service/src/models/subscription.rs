//! AMC subscription model.

use chrono::{DateTime, Months, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

/// Billing cadence of a maintenance contract.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BillingFrequency {
    Weekly,
    BiWeekly,
    Monthly,
    Quarterly,
    Yearly,
}

impl BillingFrequency {
    pub fn as_str(&self) -> &'static str {
        match self {
            BillingFrequency::Weekly => "weekly",
            BillingFrequency::BiWeekly => "bi_weekly",
            BillingFrequency::Monthly => "monthly",
            BillingFrequency::Quarterly => "quarterly",
            BillingFrequency::Yearly => "yearly",
        }
    }

    pub fn from_string(s: &str) -> Self {
        match s {
            "weekly" => BillingFrequency::Weekly,
            "bi_weekly" => BillingFrequency::BiWeekly,
            "quarterly" => BillingFrequency::Quarterly,
            "yearly" => BillingFrequency::Yearly,
            _ => BillingFrequency::Monthly,
        }
    }

    /// Strict parse for boundary validation. `from_string` defaults unknown
    /// values for rows already in the database; input from callers must not.
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "weekly" => Some(BillingFrequency::Weekly),
            "bi_weekly" => Some(BillingFrequency::BiWeekly),
            "monthly" => Some(BillingFrequency::Monthly),
            "quarterly" => Some(BillingFrequency::Quarterly),
            "yearly" => Some(BillingFrequency::Yearly),
            _ => None,
        }
    }

    /// Advance a billing date by exactly one cadence unit.
    ///
    /// Month-based cadences use calendar-month arithmetic (end-of-month
    /// clamped) so the anchor day does not drift across months of different
    /// lengths.
    pub fn advance(&self, date: NaiveDate) -> NaiveDate {
        match self {
            BillingFrequency::Weekly => date + chrono::Duration::weeks(1),
            BillingFrequency::BiWeekly => date + chrono::Duration::weeks(2),
            BillingFrequency::Monthly => date + Months::new(1),
            BillingFrequency::Quarterly => date + Months::new(3),
            BillingFrequency::Yearly => date + Months::new(12),
        }
    }

    /// Normalize a per-cycle amount to its monthly equivalent.
    ///
    /// Weekly and bi-weekly amounts pass through at face value, matching the
    /// dashboard arithmetic shipped with the product.
    pub fn monthly_equivalent(&self, amount: Decimal) -> Decimal {
        match self {
            BillingFrequency::Monthly => amount,
            BillingFrequency::Quarterly => amount / Decimal::from(3),
            BillingFrequency::Yearly => amount / Decimal::from(12),
            BillingFrequency::Weekly | BillingFrequency::BiWeekly => amount,
        }
    }
}

/// Subscription status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SubscriptionStatus {
    Active,
    Suspended,
    Cancelled,
}

impl SubscriptionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SubscriptionStatus::Active => "active",
            SubscriptionStatus::Suspended => "suspended",
            SubscriptionStatus::Cancelled => "cancelled",
        }
    }

    pub fn from_string(s: &str) -> Self {
        match s {
            "suspended" => SubscriptionStatus::Suspended,
            "cancelled" => SubscriptionStatus::Cancelled,
            _ => SubscriptionStatus::Active,
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "active" => Some(SubscriptionStatus::Active),
            "suspended" => Some(SubscriptionStatus::Suspended),
            "cancelled" => Some(SubscriptionStatus::Cancelled),
            _ => None,
        }
    }

    /// Cancelled contracts are retained for audit and never leave that state.
    pub fn is_terminal(&self) -> bool {
        matches!(self, SubscriptionStatus::Cancelled)
    }
}

/// AMC subscription.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Subscription {
    pub subscription_id: Uuid,
    pub contract_number: String,
    pub client_name: String,
    pub client_email: String,
    pub client_phone: Option<String>,
    pub service_type: String,
    pub property_address: Option<String>,
    pub notes: Option<String>,
    pub frequency: String,
    pub amount: Decimal,
    pub start_date: NaiveDate,
    pub next_billing_date: NaiveDate,
    pub status: String,
    pub created_utc: DateTime<Utc>,
    pub updated_utc: DateTime<Utc>,
}

/// Input for creating a subscription, validated at the boundary.
#[derive(Debug, Clone)]
pub struct CreateSubscription {
    pub client_name: String,
    pub client_email: String,
    pub client_phone: Option<String>,
    pub service_type: String,
    pub property_address: Option<String>,
    pub notes: Option<String>,
    pub frequency: BillingFrequency,
    pub amount: Decimal,
    pub start_date: NaiveDate,
}

/// Filter parameters for listing subscriptions.
#[derive(Debug, Clone, Default)]
pub struct ListSubscriptionsFilter {
    pub status: Option<SubscriptionStatus>,
}

/// Sum the monthly-equivalent revenue of all active subscriptions.
///
/// Pure projection over the subscription set; recomputed on demand so the
/// reported figure can never drift from the ledger.
pub fn monthly_recurring_revenue(subscriptions: &[Subscription]) -> Decimal {
    subscriptions
        .iter()
        .filter(|s| s.status == SubscriptionStatus::Active.as_str())
        .map(|s| BillingFrequency::from_string(&s.frequency).monthly_equivalent(s.amount))
        .sum::<Decimal>()
        .round_dp(2)
}
