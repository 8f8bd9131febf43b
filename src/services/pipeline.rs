//! Request-to-prediction pipeline.
//!
//! Validate → (fetch weather) → assemble features → check width → infer →
//! derive urgency. Any failure aborts the whole pipeline, so a response is
//! either a complete prediction or an error.

use std::sync::Arc;

use serde::Serialize;
use serde_json::{Map, Value};
use utoipa::ToSchema;

use crate::config::AppConfig;
use crate::errors::AppError;
use crate::helpers::finite_f64;
use crate::services::features::{FeatureAssembler, Profile, RequestFields};
use crate::services::model::{ensure_width, DemandModel, ModelError, ModelOutput};
use crate::services::transform::TransformError;
use crate::services::weather::{WeatherClient, WeatherError};

/// Prediction response. Which keys appear depends on the profile.
#[derive(Debug, Clone, PartialEq, Serialize, ToSchema)]
pub struct PredictionResponse {
    /// Estimated gas demand (basic, encoded and weather profiles)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub prediccion_demanda: Option<f64>,
    /// Estimated number of cylinders (sector profile)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub prediccion_cilindros: Option<f64>,
    /// Urgency probability from the second model head
    #[serde(skip_serializing_if = "Option::is_none")]
    pub probabilidad_urgencia: Option<f64>,
    /// "URGENTE"/"NORMAL", or "Urgente"/"Normal" for the sector profile
    #[serde(skip_serializing_if = "Option::is_none")]
    pub prediccion_urgencia: Option<String>,
}

/// Everything a request needs, built once at startup and never mutated.
pub struct PredictionContext {
    assembler: FeatureAssembler,
    model: Arc<dyn DemandModel>,
    weather: Option<WeatherClient>,
    urgency_threshold: f64,
}

impl PredictionContext {
    /// Wire the pieces together, checking that they agree on shape.
    pub fn new(
        assembler: FeatureAssembler,
        model: Arc<dyn DemandModel>,
        weather: Option<WeatherClient>,
        urgency_threshold: f64,
    ) -> Result<Self, AppError> {
        let profile = assembler.profile();
        if model.input_width() != assembler.input_width() {
            return Err(ModelError::WidthMismatch {
                expected: model.input_width(),
                actual: assembler.input_width(),
            }
            .into());
        }
        if model.output_heads() != profile.output_heads() {
            return Err(ModelError::HeadMismatch {
                expected: profile.output_heads(),
                actual: model.output_heads(),
            }
            .into());
        }
        if profile.needs_weather() && weather.is_none() {
            return Err(WeatherError::Config(format!(
                "profile '{}' requires a weather client",
                profile
            ))
            .into());
        }

        Ok(Self {
            assembler,
            model,
            weather,
            urgency_threshold,
        })
    }

    pub fn from_config(
        config: &AppConfig,
        assembler: FeatureAssembler,
        model: Arc<dyn DemandModel>,
    ) -> Result<Self, AppError> {
        let weather = if config.profile.needs_weather() {
            Some(WeatherClient::new(&config.weather, config.pressure_reference_hpa)?)
        } else {
            None
        };
        Self::new(assembler, model, weather, config.urgency_threshold)
    }

    pub fn profile(&self) -> Profile {
        self.assembler.profile()
    }

    pub fn input_width(&self) -> usize {
        self.assembler.input_width()
    }

    pub async fn predict(&self, body: &Map<String, Value>) -> Result<PredictionResponse, AppError> {
        let profile = self.profile();
        let fields = RequestFields::parse(profile, body)?;

        let snapshot = match (&self.weather, profile.needs_weather()) {
            (Some(client), true) => Some(client.fetch_current().await?),
            _ => None,
        };

        let inputs = fields.clone().into_inputs(snapshot.as_ref())?;
        let features = self.assembler.assemble(&inputs).map_err(|e| match e {
            TransformError::UnknownCategory { .. } => AppError::BadRequest(e.to_string()),
            other => AppError::Transform(other),
        })?;
        ensure_width(self.model.as_ref(), &features)?;

        let model = Arc::clone(&self.model);
        let output = tokio::task::spawn_blocking(move || model.predict(&features))
            .await
            .map_err(|e| AppError::Internal(format!("inference task failed: {}", e)))??;

        let response = build_response(&fields, output, self.urgency_threshold)?;
        tracing::debug!("Prediction ({}): {:?}", profile, response);
        Ok(response)
    }
}

/// Turn raw model heads into the profile's response shape.
fn build_response(
    fields: &RequestFields,
    output: ModelOutput,
    threshold: f64,
) -> Result<PredictionResponse, AppError> {
    let profile = fields.profile();
    let demand = finite_f64(output.demand).ok_or_else(|| {
        AppError::Model(ModelError::Inference(format!(
            "non-finite demand output: {}",
            output.demand
        )))
    })?;

    if profile == Profile::Basic {
        return Ok(PredictionResponse {
            prediccion_demanda: Some(demand),
            prediccion_cilindros: None,
            probabilidad_urgencia: None,
            prediccion_urgencia: None,
        });
    }

    let raw_prob = output.urgency.ok_or(ModelError::HeadMismatch {
        expected: 2,
        actual: 1,
    })?;
    let probability = finite_f64(raw_prob).ok_or_else(|| {
        AppError::Model(ModelError::Inference(format!(
            "non-finite urgency output: {}",
            raw_prob
        )))
    })?;

    if profile == Profile::Sector {
        let stock = fields.number("stock_actual").unwrap_or(f64::INFINITY);
        let working_day = fields.number("es_laboral").unwrap_or(0.0);
        let urgent = is_urgent_compound(probability, demand, stock, working_day, threshold);
        return Ok(PredictionResponse {
            prediccion_demanda: None,
            prediccion_cilindros: Some(demand),
            probabilidad_urgencia: Some(probability),
            prediccion_urgencia: Some(if urgent { "Urgente" } else { "Normal" }.to_string()),
        });
    }

    let urgent = is_urgent(probability, threshold);
    Ok(PredictionResponse {
        prediccion_demanda: Some(demand),
        prediccion_cilindros: None,
        probabilidad_urgencia: Some(probability),
        prediccion_urgencia: Some(if urgent { "URGENTE" } else { "NORMAL" }.to_string()),
    })
}

/// Single-threshold rule: strictly above the threshold is urgent.
pub fn is_urgent(probability: f64, threshold: f64) -> bool {
    probability > threshold
}

/// Compound rule: the probability crosses the threshold, the predicted
/// cylinders exceed the stock on hand, and it is a working day.
pub fn is_urgent_compound(
    probability: f64,
    predicted_cylinders: f64,
    stock: f64,
    working_day: f64,
    threshold: f64,
) -> bool {
    is_urgent(probability, threshold) && predicted_cylinders > stock && working_day == 1.0
}
