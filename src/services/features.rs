//! Request validation and feature-vector assembly.
//!
//! A [`Profile`] freezes everything that must line up with the trained
//! artifacts: which fields are required, the order of the numeric block, the
//! categorical columns fed to the encoder, and how many output heads the
//! model exposes. Changing any of these without retraining produces wrong
//! predictions, not errors.

use std::fmt;
use std::str::FromStr;

use serde::Serialize;
use serde_json::{Map, Value};
use utoipa::ToSchema;

use crate::errors::AppError;
use crate::helpers::{value_as_category, value_as_f64};
use crate::services::sectors;
use crate::services::transform::{MinMaxScaler, OneHotEncoder, TransformError};
use crate::services::weather::WeatherSnapshot;

/// Pipeline version served by this process.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum Profile {
    /// Six raw numeric columns, one output head.
    Basic,
    /// Scaled numerics plus one-hot zone/weekday, demand and urgency heads.
    Encoded,
    /// Like `Encoded`, with temperature/humidity/pressure from the weather API.
    Weather,
    /// Sector-based: weather plus altitude lookup, compound urgency rule.
    Sector,
}

/// Where a numeric column's value comes from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Column {
    Field(&'static str),
    Temperature,
    Humidity,
    Pressure,
    Altitude,
}

use Column::{Altitude, Field, Humidity, Pressure, Temperature};

const BASIC_COLUMNS: &[Column] = &[
    Field("hora"),
    Field("zona"),
    Field("temperatura"),
    Field("stock"),
    Field("humedad"),
    Field("presion"),
];

const ENCODED_COLUMNS: &[Column] = &[
    Field("hora"),
    Field("temperatura"),
    Field("stock"),
    Field("humedad"),
    Field("presion"),
];

const WEATHER_COLUMNS: &[Column] = &[
    Field("hora"),
    Field("stock"),
    Temperature,
    Humidity,
    Pressure,
];

const SECTOR_COLUMNS: &[Column] = &[
    Field("hora_dia"),
    Field("stock_actual"),
    Field("es_laboral"),
    Field("demanda_comercial"),
    Temperature,
    Humidity,
    Pressure,
    Altitude,
];

impl Profile {
    pub const ALL: [Profile; 4] = [
        Profile::Basic,
        Profile::Encoded,
        Profile::Weather,
        Profile::Sector,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Profile::Basic => "basic",
            Profile::Encoded => "encoded",
            Profile::Weather => "weather",
            Profile::Sector => "sector",
        }
    }

    /// Path of the prediction route.
    pub fn route(&self) -> &'static str {
        match self {
            Profile::Sector => "/predecir",
            _ => "/predict",
        }
    }

    /// Fields that must be present in the request body, in documentation order.
    pub fn required_fields(&self) -> &'static [&'static str] {
        match self {
            Profile::Basic => &["hora", "zona", "temperatura", "stock", "humedad", "presion"],
            Profile::Encoded => &[
                "hora",
                "zona",
                "temperatura",
                "stock",
                "humedad",
                "presion",
                "dia_semana",
            ],
            Profile::Weather => &["hora", "zona", "stock", "dia_semana"],
            Profile::Sector => &[
                "sector",
                "hora_dia",
                "stock_actual",
                "dia_semana",
                "es_laboral",
                "demanda_comercial",
            ],
        }
    }

    fn numeric_columns(&self) -> &'static [Column] {
        match self {
            Profile::Basic => BASIC_COLUMNS,
            Profile::Encoded => ENCODED_COLUMNS,
            Profile::Weather => WEATHER_COLUMNS,
            Profile::Sector => SECTOR_COLUMNS,
        }
    }

    /// Categorical fields, in encoder column order.
    pub fn categorical_fields(&self) -> &'static [&'static str] {
        match self {
            Profile::Basic => &[],
            Profile::Encoded | Profile::Weather => &["zona", "dia_semana"],
            Profile::Sector => &["sector", "dia_semana"],
        }
    }

    pub fn numeric_width(&self) -> usize {
        self.numeric_columns().len()
    }

    pub fn needs_weather(&self) -> bool {
        matches!(self, Profile::Weather | Profile::Sector)
    }

    /// Whether the encoder and scaler artifacts are part of the pipeline.
    pub fn needs_transforms(&self) -> bool {
        !matches!(self, Profile::Basic)
    }

    /// Number of model outputs: demand, plus urgency probability when > 1.
    pub fn output_heads(&self) -> usize {
        match self {
            Profile::Basic => 1,
            _ => 2,
        }
    }
}

impl fmt::Display for Profile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Profile {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim().to_lowercase();
        Profile::ALL
            .into_iter()
            .find(|p| p.as_str() == wanted)
            .ok_or_else(|| {
                let names: Vec<&str> = Profile::ALL.iter().map(Profile::as_str).collect();
                format!("expected one of {}", names.join(", "))
            })
    }
}

/// Request fields after presence and type validation.
///
/// Built before any external call so client errors never cost a weather fetch.
#[derive(Debug, Clone)]
pub struct RequestFields {
    profile: Profile,
    numbers: Vec<(&'static str, f64)>,
    categories: Vec<String>,
    altitude: Option<f64>,
}

impl RequestFields {
    pub fn parse(profile: Profile, body: &Map<String, Value>) -> Result<Self, AppError> {
        let missing: Vec<&str> = profile
            .required_fields()
            .iter()
            .copied()
            .filter(|f| !body.contains_key(*f))
            .collect();
        if !missing.is_empty() {
            return Err(AppError::BadRequest(format!(
                "Faltan campos en el JSON: {}",
                missing.join(", ")
            )));
        }

        let mut numbers = Vec::new();
        for column in profile.numeric_columns() {
            if let Field(name) = column {
                let value = value_as_f64(&body[*name]).ok_or_else(|| {
                    AppError::BadRequest(format!("El campo '{}' debe ser numérico", name))
                })?;
                numbers.push((*name, value));
            }
        }

        let mut categories = Vec::new();
        for name in profile.categorical_fields() {
            let value = value_as_category(&body[*name]).ok_or_else(|| {
                AppError::BadRequest(format!("El campo '{}' debe ser un valor simple", name))
            })?;
            categories.push(value);
        }

        let mut altitude = None;
        if profile == Profile::Sector {
            // `sector` is the first categorical column of this profile.
            let sector = &categories[0];
            let alt = sectors::altitude_for(sector).ok_or_else(|| {
                let known: Vec<&str> = sectors::known_sectors().collect();
                AppError::BadRequest(format!(
                    "Sector no reconocido: '{}'. Sectores válidos: {}",
                    sector,
                    known.join(", ")
                ))
            })?;
            let canonical = sectors::normalize_sector(sector);
            categories[0] = canonical;
            altitude = Some(alt);
        }

        Ok(Self {
            profile,
            numbers,
            categories,
            altitude,
        })
    }

    pub fn profile(&self) -> Profile {
        self.profile
    }

    /// A validated numeric field by name.
    pub fn number(&self, name: &str) -> Option<f64> {
        self.numbers
            .iter()
            .find(|(field, _)| *field == name)
            .map(|(_, v)| *v)
    }

    /// Resolve every column into raw (unscaled, unencoded) inputs.
    pub fn into_inputs(self, weather: Option<&WeatherSnapshot>) -> Result<FeatureInputs, AppError> {
        let weather_value = |pick: fn(&WeatherSnapshot) -> f64| {
            weather.map(pick).ok_or_else(|| {
                AppError::Internal(format!(
                    "profile '{}' needs weather data but none was fetched",
                    self.profile
                ))
            })
        };

        let mut numeric = Vec::with_capacity(self.profile.numeric_width());
        for column in self.profile.numeric_columns() {
            let value = match column {
                Field(name) => self.number(name).ok_or_else(|| {
                    AppError::Internal(format!("field '{}' was not validated", name))
                })?,
                Temperature => weather_value(|w| w.temperature_c)?,
                Humidity => weather_value(|w| w.humidity)?,
                Pressure => weather_value(|w| w.pressure)?,
                Altitude => self.altitude.ok_or_else(|| {
                    AppError::Internal("altitude was not resolved".to_string())
                })?,
            };
            numeric.push(value);
        }

        Ok(FeatureInputs {
            numeric,
            categorical: self.categories,
        })
    }
}

/// Raw column values in profile order.
#[derive(Debug, Clone, PartialEq)]
pub struct FeatureInputs {
    pub numeric: Vec<f64>,
    pub categorical: Vec<String>,
}

/// Turns [`FeatureInputs`] into the exact vector the model was trained on.
#[derive(Debug, Clone)]
pub struct FeatureAssembler {
    profile: Profile,
    transforms: Option<(OneHotEncoder, MinMaxScaler)>,
}

impl FeatureAssembler {
    /// Check the artifacts against the profile's column layout.
    pub fn new(
        profile: Profile,
        encoder: Option<OneHotEncoder>,
        scaler: Option<MinMaxScaler>,
    ) -> Result<Self, TransformError> {
        if !profile.needs_transforms() {
            return Ok(Self {
                profile,
                transforms: None,
            });
        }

        let (encoder, scaler) = match (encoder, scaler) {
            (Some(e), Some(s)) => (e, s),
            _ => {
                return Err(TransformError::Invalid(format!(
                    "profile '{}' requires both encoder and scaler artifacts",
                    profile
                )))
            }
        };

        if encoder.n_inputs() != profile.categorical_fields().len() {
            return Err(TransformError::Width {
                stage: "encoder",
                expected: profile.categorical_fields().len(),
                actual: encoder.n_inputs(),
            });
        }
        if scaler.width() != profile.numeric_width() {
            return Err(TransformError::Width {
                stage: "scaler",
                expected: profile.numeric_width(),
                actual: scaler.width(),
            });
        }

        if profile == Profile::Sector {
            let fitted = encoder.categories(0).unwrap_or_default();
            for sector in sectors::known_sectors() {
                if !fitted.iter().any(|c| c == sector) {
                    tracing::warn!(
                        "Sector '{}' is served but absent from the encoder; it will encode as all zeros",
                        sector
                    );
                }
            }
        }

        Ok(Self {
            profile,
            transforms: Some((encoder, scaler)),
        })
    }

    pub fn profile(&self) -> Profile {
        self.profile
    }

    /// Length of every vector this assembler produces.
    pub fn input_width(&self) -> usize {
        match &self.transforms {
            Some((encoder, scaler)) => scaler.width() + encoder.output_width(),
            None => self.profile.numeric_width(),
        }
    }

    /// Numeric block first (scaled when transforms apply), then one-hot blocks.
    pub fn assemble(&self, inputs: &FeatureInputs) -> Result<Vec<f32>, TransformError> {
        let mut out = Vec::with_capacity(self.input_width());
        match &self.transforms {
            Some((encoder, scaler)) => {
                scaler.transform_into(&inputs.numeric, &mut out)?;
                encoder.transform_into(&inputs.categorical, &mut out)?;
            }
            None => {
                if inputs.numeric.len() != self.profile.numeric_width() {
                    return Err(TransformError::Width {
                        stage: "feature vector",
                        expected: self.profile.numeric_width(),
                        actual: inputs.numeric.len(),
                    });
                }
                out.extend(inputs.numeric.iter().map(|v| *v as f32));
            }
        }
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn body(v: Value) -> Map<String, Value> {
        v.as_object().unwrap().clone()
    }

    fn snapshot() -> WeatherSnapshot {
        WeatherSnapshot {
            temperature_c: 8.0,
            humidity: 0.6,
            pressure: 0.65,
            observed_at: None,
        }
    }

    fn sector_encoder() -> OneHotEncoder {
        let sectors: Vec<&str> = sectors::known_sectors().collect();
        OneHotEncoder::from_json_str(
            &json!({
                "categories": [sectors, ["0", "1", "2", "3", "4", "5", "6"]],
                "handle_unknown": "ignore"
            })
            .to_string(),
        )
        .unwrap()
    }

    fn unit_scaler(width: usize) -> MinMaxScaler {
        MinMaxScaler::from_json_str(
            &json!({ "data_min": vec![0.0; width], "data_max": vec![1.0; width] }).to_string(),
        )
        .unwrap()
    }

    #[test]
    fn test_profile_from_str() {
        assert_eq!("SECTOR".parse::<Profile>().unwrap(), Profile::Sector);
        assert_eq!(" basic ".parse::<Profile>().unwrap(), Profile::Basic);
        assert!("v2".parse::<Profile>().unwrap_err().contains("basic"));
    }

    #[test]
    fn test_profile_routes() {
        assert_eq!(Profile::Basic.route(), "/predict");
        assert_eq!(Profile::Weather.route(), "/predict");
        assert_eq!(Profile::Sector.route(), "/predecir");
    }

    #[test]
    fn test_required_fields_cover_every_request_column() {
        for profile in Profile::ALL {
            let required = profile.required_fields();
            for column in profile.numeric_columns() {
                if let Field(name) = column {
                    assert!(required.contains(name), "{} missing {}", profile, name);
                }
            }
            for name in profile.categorical_fields() {
                assert!(required.contains(name), "{} missing {}", profile, name);
            }
        }
    }

    #[test]
    fn test_missing_fields_rejected_for_every_profile() {
        for profile in Profile::ALL {
            for skip in profile.required_fields() {
                let mut map = Map::new();
                for field in profile.required_fields() {
                    if field != skip {
                        map.insert(field.to_string(), json!(1));
                    }
                }
                let err = RequestFields::parse(profile, &map).unwrap_err();
                assert!(matches!(err, AppError::BadRequest(ref m) if m.contains(skip)));
            }
        }
    }

    #[test]
    fn test_missing_fields_wins_over_invalid_values() {
        let err =
            RequestFields::parse(Profile::Basic, &body(json!({ "hora": "abc" }))).unwrap_err();
        assert!(err.to_string().starts_with("Faltan campos en el JSON"));
    }

    #[test]
    fn test_non_numeric_field_rejected() {
        let err = RequestFields::parse(
            Profile::Basic,
            &body(json!({
                "hora": 8, "zona": 2, "temperatura": "calor", "stock": 5,
                "humedad": 0.4, "presion": 1.0
            })),
        )
        .unwrap_err();
        assert!(matches!(err, AppError::BadRequest(ref m) if m.contains("temperatura")));
    }

    #[test]
    fn test_basic_vector_order() {
        let fields = RequestFields::parse(
            Profile::Basic,
            &body(json!({
                "presion": 1.01, "humedad": 0.4, "stock": 30, "temperatura": 15,
                "zona": 2, "hora": 9
            })),
        )
        .unwrap();
        let inputs = fields.into_inputs(None).unwrap();
        let assembler = FeatureAssembler::new(Profile::Basic, None, None).unwrap();

        let vector = assembler.assemble(&inputs).unwrap();
        assert_eq!(vector, vec![9.0, 2.0, 15.0, 30.0, 0.4, 1.01]);
        assert_eq!(assembler.input_width(), 6);
    }

    #[test]
    fn test_encoded_inputs_order() {
        let fields = RequestFields::parse(
            Profile::Encoded,
            &body(json!({
                "dia_semana": 5, "presion": 1.02, "humedad": 0.55, "stock": 12,
                "temperatura": 18.5, "zona": " sur ", "hora": 14
            })),
        )
        .unwrap();

        let inputs = fields.into_inputs(None).unwrap();
        assert_eq!(inputs.numeric, vec![14.0, 18.5, 12.0, 0.55, 1.02]);
        assert_eq!(inputs.categorical, vec!["sur".to_string(), "5".to_string()]);
    }

    #[test]
    fn test_weather_inputs_take_conditions_from_snapshot() {
        let fields = RequestFields::parse(
            Profile::Weather,
            &body(json!({
                "dia_semana": 0, "stock": 25, "zona": "norte", "hora": 6,
                "temperatura": 99.0
            })),
        )
        .unwrap();

        let inputs = fields.into_inputs(Some(&snapshot())).unwrap();
        // hora, stock, then temperature/humidity/pressure from the snapshot
        assert_eq!(inputs.numeric, vec![6.0, 25.0, 8.0, 0.6, 0.65]);
        assert_eq!(inputs.categorical, vec!["norte".to_string(), "0".to_string()]);
    }

    #[test]
    fn test_weather_assembler_scales_then_encodes() {
        let encoder = OneHotEncoder::from_json_str(
            r#"{"categories": [["norte", "sur"], ["0","1","2","3","4","5","6"]]}"#,
        )
        .unwrap();
        let scaler = MinMaxScaler::from_json_str(
            r#"{"data_min": [0, 0, 0, 0, 0], "data_max": [24, 100, 16, 1, 1]}"#,
        )
        .unwrap();
        let assembler =
            FeatureAssembler::new(Profile::Weather, Some(encoder), Some(scaler)).unwrap();
        assert_eq!(assembler.input_width(), 5 + 2 + 7);

        let inputs = FeatureInputs {
            numeric: vec![6.0, 25.0, 8.0, 0.6, 0.65],
            categorical: vec!["sur".to_string(), "0".to_string()],
        };
        let vector = assembler.assemble(&inputs).unwrap();
        let expected_numeric = [0.25f32, 0.25, 0.5, 0.6, 0.65];
        for (got, want) in vector[..5].iter().zip(expected_numeric) {
            assert!((got - want).abs() < 1e-6, "{} != {}", got, want);
        }
        assert_eq!(vector[5..7], [0.0f32, 1.0]);
        assert_eq!(vector[7], 1.0);
        assert_eq!(vector[8..].iter().sum::<f32>(), 0.0);
    }

    #[test]
    fn test_sector_unknown_rejected_by_name() {
        let err = RequestFields::parse(
            Profile::Sector,
            &body(json!({
                "sector": "Atlantis", "hora_dia": 10, "stock_actual": 4,
                "dia_semana": 2, "es_laboral": 1, "demanda_comercial": 0.3
            })),
        )
        .unwrap_err();
        assert!(matches!(err, AppError::BadRequest(ref m) if m.contains("Atlantis")));
    }

    #[test]
    fn test_sector_inputs_with_weather_and_altitude() {
        let fields = RequestFields::parse(
            Profile::Sector,
            &body(json!({
                "sector": "El Alto", "hora_dia": 10, "stock_actual": 4,
                "dia_semana": 2, "es_laboral": true, "demanda_comercial": "0.3"
            })),
        )
        .unwrap();
        assert_eq!(fields.number("es_laboral"), Some(1.0));

        let inputs = fields.into_inputs(Some(&snapshot())).unwrap();
        assert_eq!(
            inputs.numeric,
            vec![10.0, 4.0, 1.0, 0.3, 8.0, 0.6, 0.65, 4050.0]
        );
        assert_eq!(inputs.categorical, vec!["el alto".to_string(), "2".to_string()]);
    }

    #[test]
    fn test_weather_profile_without_snapshot_is_internal_error() {
        let fields = RequestFields::parse(
            Profile::Weather,
            &body(json!({ "hora": 7, "zona": "norte", "stock": 3, "dia_semana": 1 })),
        )
        .unwrap();
        let err = fields.into_inputs(None).unwrap_err();
        assert!(matches!(err, AppError::Internal(_)));
    }

    #[test]
    fn test_sector_assembler_width_and_layout() {
        let assembler =
            FeatureAssembler::new(Profile::Sector, Some(sector_encoder()), Some(unit_scaler(8)))
                .unwrap();
        let n_sectors = sectors::known_sectors().count();
        assert_eq!(assembler.input_width(), 8 + n_sectors + 7);

        let inputs = FeatureInputs {
            numeric: vec![0.5; 8],
            categorical: vec!["centro".to_string(), "6".to_string()],
        };
        let vector = assembler.assemble(&inputs).unwrap();
        assert_eq!(vector.len(), assembler.input_width());
        assert_eq!(vector[8], 1.0); // "centro" is the first sector
        assert_eq!(*vector.last().unwrap(), 1.0); // weekday 6
        assert_eq!(vector.iter().filter(|v| **v == 1.0).count(), 2);
    }

    #[test]
    fn test_assembler_requires_artifacts() {
        assert!(FeatureAssembler::new(Profile::Encoded, None, Some(unit_scaler(5))).is_err());
    }

    #[test]
    fn test_assembler_rejects_mismatched_scaler() {
        let err =
            FeatureAssembler::new(Profile::Sector, Some(sector_encoder()), Some(unit_scaler(5)))
                .unwrap_err();
        assert!(matches!(
            err,
            TransformError::Width {
                stage: "scaler",
                expected: 8,
                actual: 5
            }
        ));
    }
}
