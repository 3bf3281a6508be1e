//! AMC subscription handlers.

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::Deserialize;
use service_core::error::AppError;
use uuid::Uuid;
use validator::Validate;

use crate::models::{
    BillingFrequency, CreateSubscription, ListSubscriptionsFilter, SubscriptionStatus,
};
use crate::services::metrics::record_subscription_operation;
use crate::startup::AppState;

#[derive(Debug, Deserialize, Validate)]
pub struct CreateSubscriptionRequest {
    #[validate(length(min = 1, message = "Client name is required"))]
    pub client_name: String,
    #[validate(email(message = "Invalid email format"))]
    pub client_email: String,
    pub client_phone: Option<String>,
    #[validate(length(min = 1, message = "Service type is required"))]
    pub service_type: String,
    pub property_address: Option<String>,
    pub notes: Option<String>,
    pub frequency: String,
    pub amount: Decimal,
    pub start_date: String,
}

#[derive(Debug, Deserialize)]
pub struct ListSubscriptionsQuery {
    pub status: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct UpdateSubscriptionStatusRequest {
    pub status: String,
}

pub async fn create_subscription(
    State(state): State<AppState>,
    Json(req): Json<CreateSubscriptionRequest>,
) -> Result<impl IntoResponse, AppError> {
    req.validate()?;

    let frequency = BillingFrequency::parse(&req.frequency).ok_or_else(|| {
        AppError::Validation(anyhow::anyhow!("Unknown billing frequency: {}", req.frequency))
    })?;

    if req.amount <= Decimal::ZERO {
        return Err(AppError::Validation(anyhow::anyhow!(
            "Amount must be greater than zero"
        )));
    }

    let start_date = NaiveDate::parse_from_str(&req.start_date, "%Y-%m-%d").map_err(|_| {
        AppError::Validation(anyhow::anyhow!(
            "Invalid start date '{}', expected YYYY-MM-DD",
            req.start_date
        ))
    })?;

    let input = CreateSubscription {
        client_name: req.client_name,
        client_email: req.client_email,
        client_phone: req.client_phone,
        service_type: req.service_type,
        property_address: req.property_address,
        notes: req.notes,
        frequency,
        amount: req.amount,
        start_date,
    };

    let subscription = state.db.create_subscription(&input).await?;
    record_subscription_operation("create");

    Ok((StatusCode::CREATED, Json(subscription)))
}

pub async fn list_subscriptions(
    State(state): State<AppState>,
    Query(query): Query<ListSubscriptionsQuery>,
) -> Result<impl IntoResponse, AppError> {
    let status = match query.status.as_deref() {
        Some(raw) => Some(SubscriptionStatus::parse(raw).ok_or_else(|| {
            AppError::Validation(anyhow::anyhow!("Unknown subscription status: {}", raw))
        })?),
        None => None,
    };

    let subscriptions = state
        .db
        .list_subscriptions(&ListSubscriptionsFilter { status })
        .await?;

    Ok(Json(subscriptions))
}

pub async fn get_subscription(
    State(state): State<AppState>,
    Path(subscription_id): Path<Uuid>,
) -> Result<impl IntoResponse, AppError> {
    let subscription = state
        .db
        .get_subscription(subscription_id)
        .await?
        .ok_or_else(|| AppError::NotFound(anyhow::anyhow!("Subscription not found")))?;

    Ok(Json(subscription))
}

pub async fn update_subscription_status(
    State(state): State<AppState>,
    Path(subscription_id): Path<Uuid>,
    Json(req): Json<UpdateSubscriptionStatusRequest>,
) -> Result<impl IntoResponse, AppError> {
    let status = SubscriptionStatus::parse(&req.status).ok_or_else(|| {
        AppError::Validation(anyhow::anyhow!("Unknown subscription status: {}", req.status))
    })?;

    let subscription = state
        .db
        .update_subscription_status(subscription_id, status)
        .await?;
    record_subscription_operation("status_change");

    Ok(Json(subscription))
}
