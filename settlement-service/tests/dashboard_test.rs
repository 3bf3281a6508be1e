//! Settlement dashboard integration tests.

mod common;

use common::{money, TestApp};
use serde_json::json;

async fn summary(app: &TestApp) -> serde_json::Value {
    app.client
        .get(app.api("/dashboard/summary"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap()
}

#[tokio::test]
async fn empty_system_reports_zeroes() {
    let app = TestApp::spawn().await;

    let body = summary(&app).await;
    assert_eq!(body["active_subscriptions"], 0);
    assert_eq!(money(&body["monthly_recurring_revenue"]), 0.0);
    assert_eq!(body["pending_invoices"], 0);
    assert_eq!(body["partners"], 0);
    assert_eq!(money(&body["pending_payouts"]), 0.0);

    app.cleanup().await;
}

#[tokio::test]
async fn dashboard_aggregates_ledger_and_commissions() {
    let app = TestApp::spawn().await;

    // $100/month + $300/quarter + $1200/year = $300 MRR
    let monthly = app.create_subscription("monthly", 100.0, "2025-01-01").await;
    app.create_subscription("quarterly", 300.0, "2025-01-01").await;
    app.create_subscription("yearly", 1200.0, "2025-01-01").await;

    // A suspended subscription contributes nothing
    let suspended = app.create_subscription("monthly", 999.0, "2025-01-01").await;
    app.client
        .put(app.api(&format!(
            "/amc/subscriptions/{}/status",
            suspended["subscription_id"].as_str().unwrap()
        )))
        .json(&json!({ "status": "suspended" }))
        .send()
        .await
        .unwrap();

    // One pending invoice
    app.client
        .post(app.api(&format!(
            "/amc/subscriptions/{}/invoice",
            monthly["subscription_id"].as_str().unwrap()
        )))
        .send()
        .await
        .unwrap();

    // Partner with one pending and one paid deal
    let partner = app.create_partner(10.0).await;
    let partner_id = partner["partner_id"].as_str().unwrap();
    app.register_deal(partner_id, 1000.0).await;
    let paid = app.register_deal(partner_id, 400.0).await;
    app.client
        .post(app.api(&format!(
            "/partners/deals/{}/pay",
            paid["deal_id"].as_str().unwrap()
        )))
        .send()
        .await
        .unwrap();

    let body = summary(&app).await;
    assert_eq!(body["active_subscriptions"], 3);
    assert_eq!(money(&body["monthly_recurring_revenue"]), 300.0);
    assert_eq!(body["pending_invoices"], 1);
    assert_eq!(body["overdue_invoices"], 0);
    assert_eq!(body["partners"], 1);
    assert_eq!(money(&body["total_sales"]), 1400.0);
    assert_eq!(money(&body["pending_payouts"]), 100.0);
    assert_eq!(money(&body["total_commission_paid"]), 40.0);

    app.cleanup().await;
}

#[tokio::test]
async fn dashboard_recomputes_after_settlement() {
    let app = TestApp::spawn().await;

    let partner = app.create_partner(10.0).await;
    let partner_id = partner["partner_id"].as_str().unwrap();
    let deal = app.register_deal(partner_id, 1000.0).await;

    let before = summary(&app).await;
    assert_eq!(money(&before["pending_payouts"]), 100.0);
    assert_eq!(money(&before["total_commission_paid"]), 0.0);

    app.client
        .post(app.api(&format!(
            "/partners/deals/{}/pay",
            deal["deal_id"].as_str().unwrap()
        )))
        .send()
        .await
        .unwrap();

    let after = summary(&app).await;
    assert_eq!(money(&after["pending_payouts"]), 0.0);
    assert_eq!(money(&after["total_commission_paid"]), 100.0);

    app.cleanup().await;
}
