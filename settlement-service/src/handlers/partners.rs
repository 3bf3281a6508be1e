//! Sales partner and deal handlers.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use service_core::error::AppError;
use uuid::Uuid;
use validator::Validate;

use crate::models::{CreatePartner, Deal, DealStatus, Partner, RegisterDeal};
use crate::services::metrics::{record_commission_paid, record_deal_operation};
use crate::startup::AppState;

#[derive(Debug, Deserialize, Validate)]
pub struct CreatePartnerRequest {
    #[validate(length(min = 1, message = "Partner name is required"))]
    pub name: String,
    #[validate(email(message = "Invalid email format"))]
    pub email: String,
    pub phone: Option<String>,
    pub company: Option<String>,
    pub commission_rate: Decimal,
}

#[derive(Debug, Deserialize)]
pub struct UpdatePartnerRateRequest {
    pub commission_rate: Decimal,
}

#[derive(Debug, Deserialize, Validate)]
pub struct RegisterDealRequest {
    #[validate(length(min = 1, message = "Client name is required"))]
    pub client_name: String,
    pub deal_value: Decimal,
}

/// Settlement response carrying the deal together with the partner totals it
/// moved.
#[derive(Debug, Serialize)]
pub struct SettlementResponse {
    pub deal: Deal,
    pub partner: Partner,
}

fn validate_commission_rate(rate: Decimal) -> Result<(), AppError> {
    if rate < Decimal::ZERO || rate > Decimal::from(100) {
        return Err(AppError::Validation(anyhow::anyhow!(
            "Commission rate must be between 0 and 100"
        )));
    }
    Ok(())
}

pub async fn create_partner(
    State(state): State<AppState>,
    Json(req): Json<CreatePartnerRequest>,
) -> Result<impl IntoResponse, AppError> {
    req.validate()?;
    validate_commission_rate(req.commission_rate)?;

    let input = CreatePartner {
        name: req.name,
        email: req.email,
        phone: req.phone,
        company: req.company,
        commission_rate: req.commission_rate,
    };

    let partner = state.db.create_partner(&input).await?;

    Ok((StatusCode::CREATED, Json(partner)))
}

pub async fn list_partners(State(state): State<AppState>) -> Result<impl IntoResponse, AppError> {
    let partners = state.db.list_partners().await?;
    Ok(Json(partners))
}

pub async fn get_partner(
    State(state): State<AppState>,
    Path(partner_id): Path<Uuid>,
) -> Result<impl IntoResponse, AppError> {
    let partner = state
        .db
        .get_partner(partner_id)
        .await?
        .ok_or_else(|| AppError::NotFound(anyhow::anyhow!("Partner not found")))?;

    Ok(Json(partner))
}

pub async fn update_partner_rate(
    State(state): State<AppState>,
    Path(partner_id): Path<Uuid>,
    Json(req): Json<UpdatePartnerRateRequest>,
) -> Result<impl IntoResponse, AppError> {
    validate_commission_rate(req.commission_rate)?;

    let partner = state
        .db
        .update_partner_rate(partner_id, req.commission_rate)
        .await?;

    Ok(Json(partner))
}

pub async fn register_deal(
    State(state): State<AppState>,
    Path(partner_id): Path<Uuid>,
    Json(req): Json<RegisterDealRequest>,
) -> Result<impl IntoResponse, AppError> {
    req.validate()?;

    if req.deal_value <= Decimal::ZERO {
        return Err(AppError::Validation(anyhow::anyhow!(
            "Deal value must be greater than zero"
        )));
    }

    let input = RegisterDeal {
        client_name: req.client_name,
        deal_value: req.deal_value,
    };

    let (deal, _partner) = state.db.register_deal(partner_id, &input).await?;
    record_deal_operation("register", "standard");

    Ok((StatusCode::CREATED, Json(deal)))
}

pub async fn list_partner_deals(
    State(state): State<AppState>,
    Path(partner_id): Path<Uuid>,
) -> Result<impl IntoResponse, AppError> {
    // Distinguish an unknown partner from one with no deals yet.
    state
        .db
        .get_partner(partner_id)
        .await?
        .ok_or_else(|| AppError::NotFound(anyhow::anyhow!("Partner not found")))?;

    let deals = state.db.list_partner_deals(partner_id).await?;
    Ok(Json(deals))
}

pub async fn approve_deal(
    State(state): State<AppState>,
    Path(deal_id): Path<Uuid>,
) -> Result<impl IntoResponse, AppError> {
    let deal = state.db.approve_deal(deal_id).await?;
    record_deal_operation("approve", "standard");

    Ok(Json(deal))
}

pub async fn pay_deal(
    State(state): State<AppState>,
    Path(deal_id): Path<Uuid>,
) -> Result<impl IntoResponse, AppError> {
    // Capture the pre-payment status so the fast path is visible in metrics.
    let before = state
        .db
        .get_deal(deal_id)
        .await?
        .map(|d| DealStatus::from_string(&d.status));

    let (deal, partner) = state.db.pay_commission(deal_id).await?;

    let path = match before {
        Some(DealStatus::Pending) => "fast_path",
        _ => "standard",
    };
    record_deal_operation("pay", path);
    record_commission_paid(path, deal.commission.to_f64().unwrap_or(0.0));

    Ok(Json(SettlementResponse { deal, partner }))
}

pub async fn reject_deal(
    State(state): State<AppState>,
    Path(deal_id): Path<Uuid>,
) -> Result<impl IntoResponse, AppError> {
    let (deal, _partner) = state.db.reject_deal(deal_id).await?;
    record_deal_operation("reject", "standard");

    Ok(Json(deal))
}
