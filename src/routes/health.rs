use axum::extract::State;
use axum::Json;
use serde::Serialize;
use utoipa::ToSchema;

use crate::routes::predict::AppState;
use crate::services::features::Profile;

/// Health check response.
#[derive(Debug, Serialize, ToSchema)]
pub struct HealthResponse {
    /// Service status ("ok" once the model and artifacts are loaded)
    pub status: String,
    /// API version
    pub version: String,
    /// Active pipeline profile
    pub profile: Profile,
    /// Path of the prediction route
    pub route: String,
    /// Number of feature columns fed to the model
    pub input_width: usize,
}

/// Health check endpoint.
///
/// The process only starts serving after every artifact has loaded, so this
/// never touches the model or the weather API.
#[utoipa::path(
    get,
    path = "/health",
    tag = "Health",
    responses(
        (status = 200, description = "Service is healthy", body = HealthResponse),
    )
)]
pub async fn health_check(State(state): State<AppState>) -> Json<HealthResponse> {
    let profile = state.context.profile();
    Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        profile,
        route: profile.route().to_string(),
        input_width: state.context.input_width(),
    })
}
