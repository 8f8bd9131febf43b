// Gas Demand Prediction API v0.1
use std::net::SocketAddr;
use std::sync::Arc;

use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

mod config;
mod errors;
mod helpers;
mod routes;
mod services;

use config::AppConfig;
use routes::predict::AppState;
use services::features::FeatureAssembler;
use services::model::OnnxModel;
use services::pipeline::PredictionContext;
use services::transform::{MinMaxScaler, OneHotEncoder};

/// Gas Demand Prediction API OpenAPI document.
#[derive(OpenApi)]
#[openapi(
    info(
        title = "Gas Demand Prediction API",
        version = "0.1.0",
        description = "Predicts gas-cylinder demand and delivery urgency from a \
            pre-trained model. Depending on the active profile, requests are \
            enriched with live weather and sector altitude before inference.",
    ),
    tags(
        (name = "Health", description = "Service health check"),
        (name = "Prediction", description = "Demand and urgency prediction"),
    ),
    paths(
        routes::health::health_check,
        routes::predict::predict,
        routes::predict::predecir,
    ),
    components(
        schemas(
            routes::health::HealthResponse,
            services::features::Profile,
            services::pipeline::PredictionResponse,
            errors::ErrorResponse,
        )
    )
)]
struct ApiDoc;

fn init_tracing() {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "gas_demand_api=debug,tower_http=debug".into());
    let registry = tracing_subscriber::registry().with(filter);

    if std::env::var("LOG_FORMAT").is_ok_and(|f| f.eq_ignore_ascii_case("json")) {
        registry.with(tracing_subscriber::fmt::layer().json()).init();
    } else {
        registry.with(tracing_subscriber::fmt::layer()).init();
    }
}

/// Load every artifact and assemble the shared prediction context.
fn build_context(config: &AppConfig) -> Result<PredictionContext, Box<dyn std::error::Error>> {
    let (encoder, scaler) = if config.profile.needs_transforms() {
        let encoder = OneHotEncoder::from_path(&config.encoder_path)?;
        let scaler = MinMaxScaler::from_path(&config.scaler_path)?;
        tracing::info!(
            "Loaded encoder {} ({} columns, unknown={:?}) and scaler {}",
            config.encoder_path,
            encoder.output_width(),
            encoder.handle_unknown(),
            config.scaler_path
        );
        (Some(encoder), Some(scaler))
    } else {
        (None, None)
    };

    let assembler = FeatureAssembler::new(config.profile, encoder, scaler)?;
    let model = OnnxModel::load(
        &config.model_path,
        assembler.input_width(),
        config.profile.output_heads(),
    )?;

    Ok(PredictionContext::from_config(config, assembler, Arc::new(model))?)
}

#[tokio::main]
async fn main() {
    init_tracing();

    let config = AppConfig::from_env().expect("Invalid configuration");
    tracing::info!(
        "Profile '{}' on route {}",
        config.profile,
        config.profile.route()
    );
    if config.profile.needs_weather() {
        tracing::info!(
            "Weather for '{}', pressure normalized by {} hPa",
            config.weather.city,
            config.pressure_reference_hpa
        );
    }

    let context = build_context(&config).expect("Failed to load prediction artifacts");
    tracing::info!("Feature vector width: {}", context.input_width());

    let state = AppState {
        context: Arc::new(context),
    };

    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([axum::http::Method::GET, axum::http::Method::POST])
        .allow_headers(Any);

    let app = routes::router(state)
        .merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", ApiDoc::openapi()))
        .layer(TraceLayer::new_for_http())
        .layer(cors);

    // Start server
    let addr = SocketAddr::from(([0, 0, 0, 0], config.port));
    tracing::info!("API server listening on {}", addr);
    tracing::info!(
        "Swagger UI available at http://localhost:{}/swagger-ui/",
        config.port
    );

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .expect("Failed to bind TCP listener");
    axum::serve(listener, app)
        .await
        .expect("Server terminated unexpectedly");
}
