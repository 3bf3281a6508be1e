//! Deal lifecycle and commission settlement integration tests.

mod common;

use common::{money, TestApp};
use serde_json::json;

async fn post(app: &TestApp, path: &str) -> reqwest::Response {
    app.client
        .post(app.api(path))
        .send()
        .await
        .expect("Failed to execute request")
}

async fn get_partner(app: &TestApp, partner_id: &str) -> serde_json::Value {
    app.client
        .get(app.api(&format!("/partners/{}", partner_id)))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap()
}

#[tokio::test]
async fn register_deal_snapshots_rate_and_locks() {
    let app = TestApp::spawn().await;

    let partner = app.create_partner(10.0).await;
    let partner_id = partner["partner_id"].as_str().unwrap();

    let deal = app.register_deal(partner_id, 1000.0).await;

    assert_eq!(deal["status"], "pending");
    assert_eq!(deal["locked"], true);
    assert_eq!(money(&deal["commission_rate"]), 10.0);
    assert_eq!(money(&deal["commission"]), 100.0);

    // Partner totals moved in the same transaction
    let partner = get_partner(&app, partner_id).await;
    assert_eq!(money(&partner["total_sales"]), 1000.0);
    assert_eq!(money(&partner["pending_commission"]), 100.0);
    assert_eq!(money(&partner["total_commission"]), 0.0);

    app.cleanup().await;
}

#[tokio::test]
async fn register_deal_rejects_non_positive_value() {
    let app = TestApp::spawn().await;

    let partner = app.create_partner(10.0).await;
    let partner_id = partner["partner_id"].as_str().unwrap();

    let response = app
        .client
        .post(app.api(&format!("/partners/{}/deals", partner_id)))
        .json(&json!({ "client_name": "Hillside Nursery", "deal_value": -5 }))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 400);

    app.cleanup().await;
}

#[tokio::test]
async fn register_deal_for_unknown_partner_returns_404() {
    let app = TestApp::spawn().await;

    let response = app
        .client
        .post(app.api(&format!("/partners/{}/deals", uuid::Uuid::new_v4())))
        .json(&json!({ "client_name": "Hillside Nursery", "deal_value": 100 }))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 404);

    app.cleanup().await;
}

#[tokio::test]
async fn approve_then_pay_settles_commission() {
    let app = TestApp::spawn().await;

    let partner = app.create_partner(10.0).await;
    let partner_id = partner["partner_id"].as_str().unwrap();
    let deal = app.register_deal(partner_id, 1000.0).await;
    let deal_id = deal["deal_id"].as_str().unwrap();

    let response = post(&app, &format!("/partners/deals/{}/approve", deal_id)).await;
    assert_eq!(response.status(), 200);
    let approved: serde_json::Value = response.json().await.unwrap();
    assert_eq!(approved["status"], "approved");

    // Approval does not move money
    let partner = get_partner(&app, partner_id).await;
    assert_eq!(money(&partner["pending_commission"]), 100.0);
    assert_eq!(money(&partner["total_commission"]), 0.0);

    let response = post(&app, &format!("/partners/deals/{}/pay", deal_id)).await;
    assert_eq!(response.status(), 200);
    let body: serde_json::Value = response.json().await.unwrap();
    assert_eq!(body["deal"]["status"], "paid");
    assert_eq!(money(&body["partner"]["pending_commission"]), 0.0);
    assert_eq!(money(&body["partner"]["total_commission"]), 100.0);

    app.cleanup().await;
}

#[tokio::test]
async fn paying_twice_credits_partner_exactly_once() {
    let app = TestApp::spawn().await;

    let partner = app.create_partner(10.0).await;
    let partner_id = partner["partner_id"].as_str().unwrap();
    let deal = app.register_deal(partner_id, 1000.0).await;
    let deal_id = deal["deal_id"].as_str().unwrap();

    post(&app, &format!("/partners/deals/{}/approve", deal_id)).await;
    let response = post(&app, &format!("/partners/deals/{}/pay", deal_id)).await;
    assert_eq!(response.status(), 200);

    let response = post(&app, &format!("/partners/deals/{}/pay", deal_id)).await;
    assert_eq!(response.status(), 409);

    let partner = get_partner(&app, partner_id).await;
    assert_eq!(money(&partner["total_commission"]), 100.0);
    assert_eq!(money(&partner["pending_commission"]), 0.0);

    app.cleanup().await;
}

#[tokio::test]
async fn pending_deal_can_be_paid_directly() {
    let app = TestApp::spawn().await;

    let partner = app.create_partner(20.0).await;
    let partner_id = partner["partner_id"].as_str().unwrap();
    let deal = app.register_deal(partner_id, 500.0).await;
    let deal_id = deal["deal_id"].as_str().unwrap();

    // Fast path: pending -> paid without an approval step
    let response = post(&app, &format!("/partners/deals/{}/pay", deal_id)).await;
    assert_eq!(response.status(), 200);
    let body: serde_json::Value = response.json().await.unwrap();
    assert_eq!(body["deal"]["status"], "paid");
    assert_eq!(money(&body["partner"]["total_commission"]), 100.0);

    app.cleanup().await;
}

#[tokio::test]
async fn complete_route_is_a_pay_alias() {
    let app = TestApp::spawn().await;

    let partner = app.create_partner(10.0).await;
    let partner_id = partner["partner_id"].as_str().unwrap();
    let deal = app.register_deal(partner_id, 250.0).await;
    let deal_id = deal["deal_id"].as_str().unwrap();

    let response = post(&app, &format!("/partners/deals/{}/complete", deal_id)).await;
    assert_eq!(response.status(), 200);
    let body: serde_json::Value = response.json().await.unwrap();
    assert_eq!(body["deal"]["status"], "paid");

    app.cleanup().await;
}

#[tokio::test]
async fn reject_reverses_pending_commission() {
    let app = TestApp::spawn().await;

    let partner = app.create_partner(10.0).await;
    let partner_id = partner["partner_id"].as_str().unwrap();
    let deal = app.register_deal(partner_id, 1000.0).await;
    let deal_id = deal["deal_id"].as_str().unwrap();

    let response = post(&app, &format!("/partners/deals/{}/reject", deal_id)).await;
    assert_eq!(response.status(), 200);
    let rejected: serde_json::Value = response.json().await.unwrap();
    assert_eq!(rejected["status"], "rejected");

    let partner = get_partner(&app, partner_id).await;
    assert_eq!(money(&partner["pending_commission"]), 0.0);
    assert_eq!(money(&partner["total_commission"]), 0.0);

    app.cleanup().await;
}

#[tokio::test]
async fn terminal_deals_accept_no_further_transitions() {
    let app = TestApp::spawn().await;

    let partner = app.create_partner(10.0).await;
    let partner_id = partner["partner_id"].as_str().unwrap();

    // Rejected deal
    let deal = app.register_deal(partner_id, 100.0).await;
    let deal_id = deal["deal_id"].as_str().unwrap();
    post(&app, &format!("/partners/deals/{}/reject", deal_id)).await;

    for action in ["approve", "pay", "reject"] {
        let response = post(&app, &format!("/partners/deals/{}/{}", deal_id, action)).await;
        assert_eq!(response.status(), 409, "rejected deal must refuse {}", action);
    }

    // Paid deal
    let deal = app.register_deal(partner_id, 100.0).await;
    let deal_id = deal["deal_id"].as_str().unwrap();
    post(&app, &format!("/partners/deals/{}/pay", deal_id)).await;

    for action in ["approve", "reject"] {
        let response = post(&app, &format!("/partners/deals/{}/{}", deal_id, action)).await;
        assert_eq!(response.status(), 409, "paid deal must refuse {}", action);
    }

    app.cleanup().await;
}

#[tokio::test]
async fn approving_an_approved_deal_conflicts() {
    let app = TestApp::spawn().await;

    let partner = app.create_partner(10.0).await;
    let partner_id = partner["partner_id"].as_str().unwrap();
    let deal = app.register_deal(partner_id, 100.0).await;
    let deal_id = deal["deal_id"].as_str().unwrap();

    let response = post(&app, &format!("/partners/deals/{}/approve", deal_id)).await;
    assert_eq!(response.status(), 200);

    let response = post(&app, &format!("/partners/deals/{}/approve", deal_id)).await;
    assert_eq!(response.status(), 409);

    app.cleanup().await;
}

#[tokio::test]
async fn commission_survives_later_rate_changes() {
    let app = TestApp::spawn().await;

    let partner = app.create_partner(10.0).await;
    let partner_id = partner["partner_id"].as_str().unwrap();

    let deal = app.register_deal(partner_id, 500.0).await;
    let deal_id = deal["deal_id"].as_str().unwrap();
    assert_eq!(money(&deal["commission"]), 50.0);

    // Admin raises the partner's rate afterwards
    let response = app
        .client
        .put(app.api(&format!("/partners/{}/rate", partner_id)))
        .json(&json!({ "commission_rate": 20 }))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 200);

    // The existing deal keeps its snapshotted commission
    let deals: Vec<serde_json::Value> = app
        .client
        .get(app.api(&format!("/partners/{}/deals", partner_id)))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    let stored = deals
        .iter()
        .find(|d| d["deal_id"].as_str() == Some(deal_id))
        .unwrap();
    assert_eq!(money(&stored["commission"]), 50.0);
    assert_eq!(money(&stored["commission_rate"]), 10.0);

    // New deals use the new rate
    let new_deal = app.register_deal(partner_id, 500.0).await;
    assert_eq!(money(&new_deal["commission"]), 100.0);

    app.cleanup().await;
}

#[tokio::test]
async fn partner_rate_outside_bounds_is_rejected() {
    let app = TestApp::spawn().await;

    let response = app
        .client
        .post(app.api("/partners"))
        .json(&json!({
            "name": "Evergreen Landscapes",
            "email": "sales@evergreen.example",
            "commission_rate": 150,
        }))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 400);

    app.cleanup().await;
}
