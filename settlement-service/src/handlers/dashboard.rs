//! Settlement dashboard handler.

use axum::{extract::State, response::IntoResponse, Json};
use service_core::error::AppError;

use crate::startup::AppState;

pub async fn summary(State(state): State<AppState>) -> Result<impl IntoResponse, AppError> {
    let summary = state.db.dashboard_summary().await?;
    Ok(Json(summary))
}
