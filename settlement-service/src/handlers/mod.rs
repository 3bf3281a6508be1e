//! HTTP handlers for settlement-service.

pub mod dashboard;
pub mod invoices;
pub mod partners;
pub mod subscriptions;
