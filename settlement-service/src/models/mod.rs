//! Domain models for settlement-service.

mod dashboard;
mod deal;
mod invoice;
mod partner;
mod subscription;

pub use dashboard::DashboardSummary;
pub use deal::{compute_commission, Deal, DealStatus, RegisterDeal};
pub use invoice::{
    derived_status, Invoice, InvoiceStatus, ListInvoicesFilter, INVOICE_DUE_GRACE_DAYS,
};
pub use partner::{CreatePartner, Partner, PartnerStatus};
pub use subscription::{
    monthly_recurring_revenue, BillingFrequency, CreateSubscription, ListSubscriptionsFilter,
    Subscription, SubscriptionStatus,
};
