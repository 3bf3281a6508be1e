//! Invoice generation integration tests for settlement-service.

mod common;

use common::{money, today_string, TestApp};
use serde_json::json;

async fn generate(app: &TestApp, subscription_id: &str) -> reqwest::Response {
    app.client
        .post(app.api(&format!("/amc/subscriptions/{}/invoice", subscription_id)))
        .send()
        .await
        .expect("Failed to execute request")
}

#[tokio::test]
async fn generate_invoice_copies_amount_and_advances_cycle() {
    let app = TestApp::spawn().await;

    let subscription = app.create_subscription("monthly", 150.0, "2025-01-01").await;
    let id = subscription["subscription_id"].as_str().unwrap();
    assert_eq!(subscription["next_billing_date"], "2025-01-01");

    let response = generate(&app, id).await;
    assert_eq!(response.status(), 201);
    let invoice: serde_json::Value = response.json().await.unwrap();

    assert_eq!(money(&invoice["amount"]), 150.0);
    assert_eq!(invoice["status"], "pending");
    assert_eq!(invoice["period_start"], "2025-01-01");
    assert_eq!(invoice["period_end"], "2025-02-01");
    assert!(invoice["invoice_number"]
        .as_str()
        .unwrap()
        .starts_with("INV-"));

    // due date is issue date + 15 days
    let issue = chrono::NaiveDate::parse_from_str(invoice["issue_date"].as_str().unwrap(), "%Y-%m-%d")
        .unwrap();
    let due = chrono::NaiveDate::parse_from_str(invoice["due_date"].as_str().unwrap(), "%Y-%m-%d")
        .unwrap();
    assert_eq!(due - issue, chrono::Duration::days(15));

    // the cycle pointer moved exactly one cadence unit
    let refreshed: serde_json::Value = app
        .client
        .get(app.api(&format!("/amc/subscriptions/{}", id)))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(refreshed["next_billing_date"], "2025-02-01");

    app.cleanup().await;
}

#[tokio::test]
async fn generate_invoice_twice_in_same_cycle_conflicts() {
    let app = TestApp::spawn().await;

    // Start today, so the first invoice covers the running cycle
    let subscription = app
        .create_subscription("monthly", 100.0, &today_string())
        .await;
    let id = subscription["subscription_id"].as_str().unwrap();

    let response = generate(&app, id).await;
    assert_eq!(response.status(), 201);

    let response = generate(&app, id).await;
    assert_eq!(response.status(), 409);

    // Exactly one invoice exists
    let invoices: Vec<serde_json::Value> = app
        .client
        .get(app.api("/amc/invoices"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(invoices.len(), 1);

    app.cleanup().await;
}

#[tokio::test]
async fn elapsed_cycles_can_be_billed_in_succession() {
    let app = TestApp::spawn().await;

    // A start date far in the past leaves several elapsed cycles to catch up on
    let subscription = app.create_subscription("monthly", 100.0, "2025-01-01").await;
    let id = subscription["subscription_id"].as_str().unwrap();

    let first: serde_json::Value = generate(&app, id).await.json().await.unwrap();
    assert_eq!(first["period_start"], "2025-01-01");

    let second = generate(&app, id).await;
    assert_eq!(second.status(), 201);
    let second: serde_json::Value = second.json().await.unwrap();
    assert_eq!(second["period_start"], "2025-02-01");
    assert_eq!(second["period_end"], "2025-03-01");

    app.cleanup().await;
}

#[tokio::test]
async fn generate_invoice_for_unknown_subscription_returns_404() {
    let app = TestApp::spawn().await;

    let response = generate(&app, &uuid::Uuid::new_v4().to_string()).await;
    assert_eq!(response.status(), 404);

    app.cleanup().await;
}

#[tokio::test]
async fn generate_invoice_for_suspended_subscription_fails() {
    let app = TestApp::spawn().await;

    let subscription = app.create_subscription("monthly", 100.0, "2025-01-01").await;
    let id = subscription["subscription_id"].as_str().unwrap();

    let response = app
        .client
        .put(app.api(&format!("/amc/subscriptions/{}/status", id)))
        .json(&json!({ "status": "suspended" }))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 200);

    let response = generate(&app, id).await;
    assert_eq!(response.status(), 422);

    // The cycle pointer did not move
    let refreshed: serde_json::Value = app
        .client
        .get(app.api(&format!("/amc/subscriptions/{}", id)))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(refreshed["next_billing_date"], "2025-01-01");

    app.cleanup().await;
}

#[tokio::test]
async fn weekly_subscription_advances_seven_days() {
    let app = TestApp::spawn().await;

    let subscription = app.create_subscription("weekly", 40.0, "2025-03-01").await;
    let id = subscription["subscription_id"].as_str().unwrap();

    let invoice: serde_json::Value = generate(&app, id).await.json().await.unwrap();
    assert_eq!(invoice["period_end"], "2025-03-08");

    app.cleanup().await;
}

#[tokio::test]
async fn pay_invoice_works_and_is_not_repeatable() {
    let app = TestApp::spawn().await;

    let subscription = app.create_subscription("monthly", 100.0, "2025-01-01").await;
    let id = subscription["subscription_id"].as_str().unwrap();
    let invoice: serde_json::Value = generate(&app, id).await.json().await.unwrap();
    let invoice_id = invoice["invoice_id"].as_str().unwrap();

    let response = app
        .client
        .post(app.api(&format!("/amc/invoices/{}/pay", invoice_id)))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 200);
    let paid: serde_json::Value = response.json().await.unwrap();
    assert_eq!(paid["status"], "paid");

    // Paying again conflicts
    let response = app
        .client
        .post(app.api(&format!("/amc/invoices/{}/pay", invoice_id)))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 409);

    app.cleanup().await;
}

#[tokio::test]
async fn unpaid_invoice_past_due_date_lists_as_overdue() {
    let app = TestApp::spawn().await;

    let subscription = app.create_subscription("monthly", 100.0, "2025-01-01").await;
    let id = subscription["subscription_id"].as_str().unwrap();
    let invoice: serde_json::Value = generate(&app, id).await.json().await.unwrap();
    let invoice_id = invoice["invoice_id"].as_str().unwrap();

    // Backdate the due date; overdue is derived at read time, never stored
    sqlx::query("UPDATE amc_invoices SET due_date = CURRENT_DATE - 1 WHERE invoice_id = $1::uuid")
        .bind(invoice_id)
        .execute(app.db.pool())
        .await
        .expect("Failed to backdate invoice");

    let overdue: Vec<serde_json::Value> = app
        .client
        .get(app.api("/amc/invoices?status=overdue"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(overdue.len(), 1);
    assert_eq!(overdue[0]["status"], "overdue");

    // The stored row still says pending
    let stored: String =
        sqlx::query_scalar("SELECT status FROM amc_invoices WHERE invoice_id = $1::uuid")
            .bind(invoice_id)
            .fetch_one(app.db.pool())
            .await
            .unwrap();
    assert_eq!(stored, "pending");

    app.cleanup().await;
}
