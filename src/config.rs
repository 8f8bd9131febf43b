use std::str::FromStr;

use crate::services::features::Profile;

const DEFAULT_WEATHER_API_URL: &str = "https://api.openweathermap.org/data/2.5/weather";

/// Startup configuration failure. Always names the offending variable.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("{var} has an invalid value '{value}': {reason}")]
    Invalid {
        var: &'static str,
        value: String,
        reason: String,
    },

    #[error("{var} must be set for the '{profile}' profile")]
    Missing { var: &'static str, profile: Profile },
}

/// Application configuration, parsed from environment variables.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub port: u16,
    pub profile: Profile,
    pub model_path: String,
    pub encoder_path: String,
    pub scaler_path: String,
    pub weather: WeatherConfig,
    /// Divisor applied to the reported sea-level pressure in hPa.
    pub pressure_reference_hpa: f64,
    pub urgency_threshold: f64,
}

#[derive(Clone)]
pub struct WeatherConfig {
    pub api_url: String,
    /// Only `None` when the profile never calls the weather API.
    pub api_key: Option<String>,
    pub city: String,
    pub timeout_secs: u64,
}

// Keeps the credential out of `{:?}` logging.
impl std::fmt::Debug for WeatherConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WeatherConfig")
            .field("api_url", &self.api_url)
            .field("api_key", &self.api_key.as_ref().map(|_| "<redacted>"))
            .field("city", &self.city)
            .field("timeout_secs", &self.timeout_secs)
            .finish()
    }
}

impl AppConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build the configuration from an arbitrary variable source.
    pub(crate) fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |key: &str, default: &str| lookup(key).unwrap_or_else(|| default.to_string());

        let profile: Profile = parse_var("MODEL_PROFILE", var("MODEL_PROFILE", "basic"))?;

        let api_key = lookup("WEATHER_API_KEY").filter(|k| !k.trim().is_empty());
        if profile.needs_weather() && api_key.is_none() {
            return Err(ConfigError::Missing {
                var: "WEATHER_API_KEY",
                profile,
            });
        }

        let pressure_reference_hpa: f64 =
            parse_var("PRESSURE_REFERENCE_HPA", var("PRESSURE_REFERENCE_HPA", "1013.25"))?;
        if !(pressure_reference_hpa.is_finite() && pressure_reference_hpa > 0.0) {
            return Err(ConfigError::Invalid {
                var: "PRESSURE_REFERENCE_HPA",
                value: pressure_reference_hpa.to_string(),
                reason: "must be a positive number".to_string(),
            });
        }

        let urgency_threshold: f64 =
            parse_var("URGENCY_THRESHOLD", var("URGENCY_THRESHOLD", "0.5"))?;
        if !(0.0..=1.0).contains(&urgency_threshold) {
            return Err(ConfigError::Invalid {
                var: "URGENCY_THRESHOLD",
                value: urgency_threshold.to_string(),
                reason: "must be within [0, 1]".to_string(),
            });
        }

        let timeout_secs: u64 =
            parse_var("WEATHER_TIMEOUT_SECS", var("WEATHER_TIMEOUT_SECS", "10"))?;
        if timeout_secs == 0 {
            return Err(ConfigError::Invalid {
                var: "WEATHER_TIMEOUT_SECS",
                value: timeout_secs.to_string(),
                reason: "must be greater than 0".to_string(),
            });
        }

        Ok(Self {
            port: parse_var("PORT", var("PORT", "5000"))?,
            profile,
            model_path: var("MODEL_PATH", "modelo_gas.onnx"),
            encoder_path: var("ENCODER_PATH", "encoder.json"),
            scaler_path: var("SCALER_PATH", "scaler.json"),
            weather: WeatherConfig {
                api_url: var("WEATHER_API_URL", DEFAULT_WEATHER_API_URL),
                api_key,
                city: var("WEATHER_CITY", "La Paz,BO"),
                timeout_secs,
            },
            pressure_reference_hpa,
            urgency_threshold,
        })
    }
}

fn parse_var<T>(var: &'static str, value: String) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    value.trim().parse().map_err(|e: T::Err| ConfigError::Invalid {
        var,
        reason: e.to_string(),
        value,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn config_from(pairs: &[(&str, &str)]) -> Result<AppConfig, ConfigError> {
        let vars: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        AppConfig::from_lookup(|key| vars.get(key).cloned())
    }

    #[test]
    fn test_default_values() {
        let config = config_from(&[]).unwrap();

        assert_eq!(config.port, 5000);
        assert_eq!(config.profile, Profile::Basic);
        assert_eq!(config.model_path, "modelo_gas.onnx");
        assert_eq!(config.weather.city, "La Paz,BO");
        assert_eq!(config.weather.timeout_secs, 10);
        assert!(config.weather.api_key.is_none());
        assert!((config.pressure_reference_hpa - 1013.25).abs() < 1e-9);
        assert!((config.urgency_threshold - 0.5).abs() < 1e-9);
    }

    #[test]
    fn test_port_override() {
        let config = config_from(&[("PORT", "8081")]).unwrap();
        assert_eq!(config.port, 8081);
    }

    #[test]
    fn test_invalid_port_names_variable() {
        let err = config_from(&[("PORT", "not-a-port")]).unwrap_err();
        assert!(err.to_string().contains("PORT"));
    }

    #[test]
    fn test_weather_profile_requires_api_key() {
        let err = config_from(&[("MODEL_PROFILE", "sector")]).unwrap_err();
        assert!(matches!(
            err,
            ConfigError::Missing {
                var: "WEATHER_API_KEY",
                ..
            }
        ));

        let config = config_from(&[("MODEL_PROFILE", "sector"), ("WEATHER_API_KEY", "k")]).unwrap();
        assert_eq!(config.profile, Profile::Sector);
    }

    #[test]
    fn test_unknown_profile_rejected() {
        let err = config_from(&[("MODEL_PROFILE", "v9")]).unwrap_err();
        assert!(err.to_string().contains("MODEL_PROFILE"));
    }

    #[test]
    fn test_threshold_out_of_range_rejected() {
        assert!(config_from(&[("URGENCY_THRESHOLD", "1.5")]).is_err());
        assert!(config_from(&[("PRESSURE_REFERENCE_HPA", "0")]).is_err());
    }

    #[test]
    fn test_zero_weather_timeout_rejected() {
        let err = config_from(&[("WEATHER_TIMEOUT_SECS", "0")]).unwrap_err();
        assert!(matches!(
            err,
            ConfigError::Invalid {
                var: "WEATHER_TIMEOUT_SECS",
                ..
            }
        ));

        let config = config_from(&[("WEATHER_TIMEOUT_SECS", "3")]).unwrap();
        assert_eq!(config.weather.timeout_secs, 3);
    }

    #[test]
    fn test_debug_redacts_api_key() {
        let config = config_from(&[("WEATHER_API_KEY", "super-secret")]).unwrap();
        let rendered = format!("{:?}", config);
        assert!(!rendered.contains("super-secret"));
        assert!(rendered.contains("<redacted>"));
    }
}
