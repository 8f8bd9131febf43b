//! Prediction HTTP endpoint.
//!
//! - POST /predict   (basic, encoded and weather profiles)
//! - POST /predecir  (sector profile)
//!
//! Only the route of the active profile is mounted.

use std::sync::Arc;

use axum::extract::rejection::JsonRejection;
use axum::extract::State;
use axum::Json;
use serde_json::Value;

use crate::errors::{AppError, ErrorResponse};
use crate::services::pipeline::{PredictionContext, PredictionResponse};

/// Shared application state for the prediction endpoint.
#[derive(Clone)]
pub struct AppState {
    pub context: Arc<PredictionContext>,
}

async fn run_prediction(
    state: AppState,
    payload: Result<Json<Value>, JsonRejection>,
) -> Result<Json<PredictionResponse>, AppError> {
    let Json(body) =
        payload.map_err(|e| AppError::BadRequest(format!("JSON inválido: {}", e.body_text())))?;
    let body = body
        .as_object()
        .ok_or_else(|| AppError::BadRequest("Faltan campos en el JSON".to_string()))?;

    let response = state.context.predict(body).await?;
    Ok(Json(response))
}

/// Predict gas demand (and urgency, depending on the profile).
///
/// Required fields depend on the active profile: `basic` needs hora, zona,
/// temperatura, stock, humedad, presion; `encoded` adds dia_semana;
/// `weather` needs hora, zona, stock, dia_semana and fetches the rest.
#[utoipa::path(
    post,
    path = "/predict",
    tag = "Prediction",
    request_body(content = Object, description = "Flat object with the profile's fields", content_type = "application/json"),
    responses(
        (status = 200, description = "Prediction", body = PredictionResponse),
        (status = 400, description = "Missing or invalid fields", body = ErrorResponse),
        (status = 500, description = "Weather, transform or model failure", body = ErrorResponse),
    )
)]
pub async fn predict(
    State(state): State<AppState>,
    payload: Result<Json<Value>, JsonRejection>,
) -> Result<Json<PredictionResponse>, AppError> {
    run_prediction(state, payload).await
}

/// Predict cylinders and urgency for a delivery sector.
///
/// Requires sector, hora_dia, stock_actual, dia_semana, es_laboral and
/// demanda_comercial. Weather and altitude are resolved server-side.
#[utoipa::path(
    post,
    path = "/predecir",
    tag = "Prediction",
    request_body(content = Object, description = "Sector request fields", content_type = "application/json"),
    responses(
        (status = 200, description = "Prediction", body = PredictionResponse),
        (status = 400, description = "Missing fields or unknown sector", body = ErrorResponse),
        (status = 500, description = "Weather, transform or model failure", body = ErrorResponse),
    )
)]
pub async fn predecir(
    State(state): State<AppState>,
    payload: Result<Json<Value>, JsonRejection>,
) -> Result<Json<PredictionResponse>, AppError> {
    run_prediction(state, payload).await
}
