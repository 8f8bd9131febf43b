pub mod health;
pub mod predict;

use axum::routing::{get, post};
use axum::Router;

use crate::services::features::Profile;
use predict::AppState;

/// Prediction route for the active profile plus the health check.
pub fn router(state: AppState) -> Router {
    let predict_route = match state.context.profile() {
        Profile::Sector => post(predict::predecir),
        _ => post(predict::predict),
    };

    Router::new()
        .route(state.context.profile().route(), predict_route)
        .route("/health", get(health::health_check))
        .with_state(state)
}
