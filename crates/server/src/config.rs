//! Service configuration with layered resolution.
//!
//! Resolution order (highest priority first):
//! 1. CLI flags (applied via `apply_cli_overrides`)
//! 2. Environment variables (`CROPREC_*`)
//! 3. TOML config file (`--config`)
//! 4. Compiled defaults

use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use domain::{Climate, Coordinate};
use pipeline::EnrichmentPolicy;
use predictor_client::ProcessConfig;
use weather::ForecastConfig;
use weather::client::DEFAULT_FORECAST_URL;

/// Prefix for environment overrides.
pub const ENV_PREFIX: &str = "CROPREC_";

/// Errors raised while loading configuration
#[derive(Error, Debug, PartialEq)]
pub enum ConfigError {
    #[error("config file not found: {path}")]
    FileNotFound { path: String },

    #[error("failed to parse config {path}: {message}")]
    ParseError { path: String, message: String },

    #[error("invalid value {value:?} for environment variable {key}")]
    InvalidEnv { key: String, value: String },

    #[error("invalid config value for {field}: {message}")]
    ValidationFailed { field: String, message: String },
}

/// Top-level configuration aggregating all sections.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct ServiceConfig {
    pub server: ServerSection,
    pub enrichment: EnrichmentSection,
    pub predictor: PredictorSection,
}

/// HTTP listener and static artifact mounts.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerSection {
    pub bind: SocketAddr,
    /// Root of generated report/plot images, served under `/results`.
    pub results_dir: PathBuf,
    /// Root of static crop reference images, served under `/crop_images`.
    pub crop_images_dir: PathBuf,
}

impl Default for ServerSection {
    fn default() -> Self {
        Self {
            bind: SocketAddr::from(([0, 0, 0, 0], 3000)),
            results_dir: PathBuf::from("results"),
            crop_images_dir: PathBuf::from("crop_images"),
        }
    }
}

/// Weather enrichment settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EnrichmentSection {
    /// When false, request bodies are forwarded to the predictor unmodified.
    pub enabled: bool,
    pub forecast_url: String,
    pub default_coordinate: Coordinate,
    pub fallback: Climate,
    pub request_timeout_ms: u64,
    pub max_retries: u32,
    pub initial_backoff_ms: u64,
    pub max_backoff_ms: u64,
}

impl Default for EnrichmentSection {
    fn default() -> Self {
        Self {
            enabled: true,
            forecast_url: DEFAULT_FORECAST_URL.to_string(),
            default_coordinate: Coordinate::REFERENCE,
            fallback: Climate::FALLBACK,
            request_timeout_ms: 5_000,
            max_retries: 2,
            initial_backoff_ms: 200,
            max_backoff_ms: 2_000,
        }
    }
}

/// Inference engine process and admission settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PredictorSection {
    pub program: PathBuf,
    pub args: Vec<String>,
    pub working_dir: Option<PathBuf>,
    pub timeout_secs: u64,
    pub max_output_bytes: usize,
    /// Maximum predictor processes running at once.
    pub max_concurrent: usize,
    /// How long a request may wait for a free predictor slot; 0 rejects at once.
    pub queue_timeout_ms: u64,
    /// Reject results that carry no trust score.
    pub require_trust_score: bool,
}

impl Default for PredictorSection {
    fn default() -> Self {
        Self {
            program: PathBuf::from("python3"),
            args: vec!["predict_and_explain.py".to_string()],
            working_dir: None,
            timeout_secs: 120,
            max_output_bytes: 8 * 1024 * 1024,
            max_concurrent: 4,
            queue_timeout_ms: 0,
            require_trust_score: false,
        }
    }
}

/// CLI override arguments that can be applied to a config.
#[derive(Debug, Clone, Default)]
pub struct CliOverrides {
    pub bind: Option<SocketAddr>,
    pub enrichment_enabled: Option<bool>,
    pub predictor_program: Option<PathBuf>,
    pub predictor_timeout_secs: Option<u64>,
    pub max_concurrent: Option<usize>,
}

impl ServiceConfig {
    /// Load configuration from compiled defaults, an optional TOML file,
    /// the process environment, and CLI overrides.
    pub fn load(
        path: Option<&Path>,
        cli_overrides: Option<&CliOverrides>,
    ) -> Result<Self, ConfigError> {
        let mut config = match path {
            Some(path) => Self::from_file(path)?,
            None => Self::default(),
        };

        config.apply_env_overrides(std::env::vars())?;

        if let Some(cli) = cli_overrides {
            config.apply_cli_overrides(cli);
        }

        config.validate()?;
        Ok(config)
    }

    /// Read a TOML file. Missing keys keep their compiled defaults.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|_| ConfigError::FileNotFound {
            path: path.display().to_string(),
        })?;
        toml::from_str(&content).map_err(|e| ConfigError::ParseError {
            path: path.display().to_string(),
            message: e.to_string(),
        })
    }

    /// Load configuration from a TOML string (for testing).
    pub fn from_toml(toml_str: &str) -> Result<Self, ConfigError> {
        toml::from_str(toml_str).map_err(|e| ConfigError::ParseError {
            path: "<string>".to_string(),
            message: e.to_string(),
        })
    }

    /// Apply `CROPREC_*` variables from `vars`. Unrelated variables are ignored.
    pub fn apply_env_overrides(
        &mut self,
        vars: impl IntoIterator<Item = (String, String)>,
    ) -> Result<(), ConfigError> {
        for (key, value) in vars {
            let Some(name) = key.strip_prefix(ENV_PREFIX) else {
                continue;
            };
            match name {
                "BIND" => self.server.bind = parse_env(&key, &value)?,
                "RESULTS_DIR" => self.server.results_dir = PathBuf::from(&value),
                "CROP_IMAGES_DIR" => self.server.crop_images_dir = PathBuf::from(&value),
                "ENRICHMENT_ENABLED" => self.enrichment.enabled = parse_env(&key, &value)?,
                "FORECAST_URL" => self.enrichment.forecast_url = value,
                "PREDICTOR_PROGRAM" => self.predictor.program = PathBuf::from(&value),
                "PREDICTOR_ARGS" => {
                    self.predictor.args = value.split_whitespace().map(str::to_string).collect();
                }
                "PREDICTOR_WORKDIR" => self.predictor.working_dir = Some(PathBuf::from(&value)),
                "PREDICTOR_TIMEOUT_SECS" => {
                    self.predictor.timeout_secs = parse_env(&key, &value)?;
                }
                "PREDICTOR_MAX_CONCURRENT" => {
                    self.predictor.max_concurrent = parse_env(&key, &value)?;
                }
                _ => {}
            }
        }
        Ok(())
    }

    pub fn apply_cli_overrides(&mut self, cli: &CliOverrides) {
        if let Some(bind) = cli.bind {
            self.server.bind = bind;
        }
        if let Some(enabled) = cli.enrichment_enabled {
            self.enrichment.enabled = enabled;
        }
        if let Some(program) = &cli.predictor_program {
            self.predictor.program = program.clone();
        }
        if let Some(timeout) = cli.predictor_timeout_secs {
            self.predictor.timeout_secs = timeout;
        }
        if let Some(max_concurrent) = cli.max_concurrent {
            self.predictor.max_concurrent = max_concurrent;
        }
    }

    /// Validate the configuration values.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let fail = |field: &str, message: &str| {
            Err(ConfigError::ValidationFailed {
                field: field.to_string(),
                message: message.to_string(),
            })
        };

        if !self.enrichment.default_coordinate.is_valid() {
            return fail(
                "enrichment.default_coordinate",
                "latitude must be within [-90, 90] and longitude within [-180, 180]",
            );
        }
        let fallback = self.enrichment.fallback;
        if ![fallback.temperature, fallback.humidity, fallback.rainfall]
            .iter()
            .all(|v| v.is_finite())
        {
            return fail("enrichment.fallback", "values must be finite numbers");
        }
        if self.enrichment.enabled && self.enrichment.forecast_url.trim().is_empty() {
            return fail("enrichment.forecast_url", "must not be empty");
        }
        if self.enrichment.request_timeout_ms == 0 {
            return fail("enrichment.request_timeout_ms", "must be greater than 0");
        }
        if self.predictor.program.as_os_str().is_empty() {
            return fail("predictor.program", "must not be empty");
        }
        if self.predictor.timeout_secs == 0 {
            return fail("predictor.timeout_secs", "must be greater than 0");
        }
        if self.predictor.max_output_bytes == 0 {
            return fail("predictor.max_output_bytes", "must be greater than 0");
        }
        if self.predictor.max_concurrent == 0 {
            return fail("predictor.max_concurrent", "must be greater than 0");
        }
        Ok(())
    }

    pub fn forecast_config(&self) -> ForecastConfig {
        ForecastConfig {
            base_url: self.enrichment.forecast_url.clone(),
            timeout: Duration::from_millis(self.enrichment.request_timeout_ms),
            max_retries: self.enrichment.max_retries,
            initial_backoff: Duration::from_millis(self.enrichment.initial_backoff_ms),
            max_backoff: Duration::from_millis(self.enrichment.max_backoff_ms),
            fallback: self.enrichment.fallback,
        }
    }

    pub fn process_config(&self) -> ProcessConfig {
        ProcessConfig {
            program: self.predictor.program.clone(),
            args: self.predictor.args.clone(),
            working_dir: self.predictor.working_dir.clone(),
            timeout: Duration::from_secs(self.predictor.timeout_secs),
            max_output_bytes: self.predictor.max_output_bytes,
        }
    }

    pub fn enrichment_policy(&self) -> EnrichmentPolicy {
        EnrichmentPolicy {
            enabled: self.enrichment.enabled,
            default_coordinate: self.enrichment.default_coordinate,
            fallback: self.enrichment.fallback,
        }
    }

    pub fn queue_timeout(&self) -> Duration {
        Duration::from_millis(self.predictor.queue_timeout_ms)
    }
}

fn parse_env<T: std::str::FromStr>(key: &str, value: &str) -> Result<T, ConfigError> {
    value.trim().parse().map_err(|_| ConfigError::InvalidEnv {
        key: key.to_string(),
        value: value.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn env(pairs: &[(&str, &str)]) -> Vec<(String, String)> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn test_defaults_are_valid() {
        let config = ServiceConfig::default();
        assert!(config.validate().is_ok());
        assert!(config.enrichment.enabled);
        assert_eq!(config.enrichment.default_coordinate, Coordinate::new(28.6139, 77.2090));
        assert_eq!(config.enrichment.fallback, Climate::FALLBACK);
        assert_eq!(config.server.bind.port(), 3000);
    }

    #[test]
    fn test_partial_toml_keeps_defaults() {
        let config = ServiceConfig::from_toml(
            r#"
            [enrichment]
            enabled = false

            [predictor]
            program = "venv/bin/python3.10"
            args = ["api/predict_and_explain2.py"]
            timeout_secs = 30
            "#,
        )
        .unwrap();

        assert!(!config.enrichment.enabled);
        assert_eq!(config.enrichment.max_retries, 2);
        assert_eq!(config.predictor.program, PathBuf::from("venv/bin/python3.10"));
        assert_eq!(config.predictor.args, vec!["api/predict_and_explain2.py"]);
        assert_eq!(config.predictor.timeout_secs, 30);
        assert_eq!(config.predictor.max_concurrent, 4);
        assert_eq!(config.server, ServerSection::default());
    }

    #[test]
    fn test_nested_coordinate_and_fallback_tables() {
        let config = ServiceConfig::from_toml(
            r#"
            [enrichment.default_coordinate]
            latitude = 19.07
            longitude = 72.88

            [enrichment.fallback]
            temperature = 27.0
            humidity = 75.0
            rainfall = 5.0
            "#,
        )
        .unwrap();

        assert_eq!(config.enrichment.default_coordinate, Coordinate::new(19.07, 72.88));
        assert_eq!(config.enrichment_policy().fallback.humidity, 75.0);
        assert_eq!(config.forecast_config().fallback.rainfall, 5.0);
    }

    #[test]
    fn test_invalid_toml() {
        let err = ServiceConfig::from_toml("[predictor\nprogram = 1").unwrap_err();
        assert!(matches!(err, ConfigError::ParseError { .. }));
    }

    #[test]
    fn test_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("croprec.toml");
        std::fs::write(&path, "[server]\nbind = \"127.0.0.1:8080\"\n").unwrap();

        let config = ServiceConfig::from_file(&path).unwrap();
        assert_eq!(config.server.bind, "127.0.0.1:8080".parse().unwrap());

        let missing = ServiceConfig::from_file(&dir.path().join("absent.toml")).unwrap_err();
        assert!(matches!(missing, ConfigError::FileNotFound { .. }));
    }

    #[test]
    fn test_env_overrides() {
        let mut config = ServiceConfig::default();
        config
            .apply_env_overrides(env(&[
                ("CROPREC_ENRICHMENT_ENABLED", "false"),
                ("CROPREC_PREDICTOR_ARGS", "-u api/predict_and_explain2.py"),
                ("CROPREC_PREDICTOR_MAX_CONCURRENT", "2"),
                ("CROPREC_RESULTS_DIR", "/srv/results"),
                ("HOME", "/root"),
            ]))
            .unwrap();

        assert!(!config.enrichment.enabled);
        assert_eq!(config.predictor.args, vec!["-u", "api/predict_and_explain2.py"]);
        assert_eq!(config.predictor.max_concurrent, 2);
        assert_eq!(config.server.results_dir, PathBuf::from("/srv/results"));
    }

    #[test]
    fn test_env_override_with_bad_value() {
        let mut config = ServiceConfig::default();
        let err = config
            .apply_env_overrides(env(&[("CROPREC_PREDICTOR_TIMEOUT_SECS", "soon")]))
            .unwrap_err();
        assert_eq!(
            err,
            ConfigError::InvalidEnv {
                key: "CROPREC_PREDICTOR_TIMEOUT_SECS".to_string(),
                value: "soon".to_string(),
            }
        );
    }

    #[test]
    fn test_cli_overrides_win() {
        let mut config = ServiceConfig::default();
        config
            .apply_env_overrides(env(&[("CROPREC_PREDICTOR_MAX_CONCURRENT", "2")]))
            .unwrap();
        config.apply_cli_overrides(&CliOverrides {
            max_concurrent: Some(8),
            enrichment_enabled: Some(false),
            ..CliOverrides::default()
        });

        assert_eq!(config.predictor.max_concurrent, 8);
        assert!(!config.enrichment.enabled);
    }

    #[test]
    fn test_validation_failures() {
        let mut config = ServiceConfig::default();
        config.predictor.max_concurrent = 0;
        assert!(matches!(
            config.validate(),
            Err(ConfigError::ValidationFailed { ref field, .. }) if field == "predictor.max_concurrent"
        ));

        let mut config = ServiceConfig::default();
        config.enrichment.default_coordinate = Coordinate::new(120.0, 0.0);
        assert!(config.validate().is_err());

        let mut config = ServiceConfig::default();
        config.predictor.timeout_secs = 0;
        assert!(config.validate().is_err());

        let mut config = ServiceConfig::default();
        config.predictor.program = PathBuf::new();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_component_configs() {
        let config = ServiceConfig::default();

        let process = config.process_config();
        assert_eq!(process.timeout, Duration::from_secs(120));
        assert_eq!(process.max_output_bytes, 8 * 1024 * 1024);

        let forecast = config.forecast_config();
        assert_eq!(forecast.base_url, DEFAULT_FORECAST_URL);
        assert_eq!(forecast.timeout, Duration::from_secs(5));
        assert_eq!(config.queue_timeout(), Duration::ZERO);
    }
}
