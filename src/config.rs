use config::{Config, ConfigError, Environment, File};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::Deserialize;
use std::env;
use std::path::Path;
use std::time::Duration;
use thiserror::Error;
use tracing::{error, info};
use validator::{Validate, ValidationError, ValidationErrors};

use crate::services::freshness::FreshnessThresholds;
use crate::services::urgency::UrgencyThresholds;

/// Default values for configuration
const DEFAULT_LOG_LEVEL: &str = "info";
const DEFAULT_ENV: &str = "development";
const CONFIG_DIR: &str = "config";
const DEFAULT_EVENT_CHANNEL_CAPACITY: usize = 1024;
const DEFAULT_SWEEP_INTERVAL_SECS: u64 = 7_200; // 2 hours
const DEFAULT_CLEANUP_INTERVAL_SECS: u64 = 21_600; // 6 hours
const DEFAULT_DEVICE_OFFLINE_MINUTES: i64 = 5;

/// Compliance scoring configuration
#[derive(Clone, Debug, Deserialize, Validate)]
#[serde(deny_unknown_fields)]
pub struct ComplianceConfig {
    /// Below this many batches the layout is trivially compliant
    #[serde(default = "default_min_batches")]
    #[validate(range(min = 1))]
    pub min_batches: usize,
}

impl Default for ComplianceConfig {
    fn default() -> Self {
        Self {
            min_batches: default_min_batches(),
        }
    }
}

/// Stock level configuration
#[derive(Clone, Debug, Deserialize, Validate)]
#[serde(deny_unknown_fields)]
pub struct StockConfig {
    /// Remaining total (in the batch unit) below which a low-stock event fires
    #[serde(default = "default_low_stock_threshold")]
    #[validate(custom = "validate_positive_decimal")]
    pub low_stock_threshold: Decimal,
}

impl Default for StockConfig {
    fn default() -> Self {
        Self {
            low_stock_threshold: default_low_stock_threshold(),
        }
    }
}

/// Shelf-life prediction service configuration
#[derive(Clone, Debug, Deserialize, Validate)]
#[serde(deny_unknown_fields)]
pub struct PredictorConfig {
    /// When false every estimate uses the static fallback table
    #[serde(default)]
    pub enabled: bool,

    /// Scoring endpoint URL
    #[serde(default)]
    #[validate(url)]
    pub endpoint: Option<String>,

    /// Bearer key sent with each request
    #[serde(default)]
    pub api_key: Option<String>,

    /// Per-attempt timeout in milliseconds
    #[serde(default = "default_predictor_timeout_ms")]
    #[validate(range(min = 100, max = 60000))]
    pub timeout_ms: u64,

    /// Retries after the first attempt
    #[serde(default = "default_predictor_max_retries")]
    #[validate(range(max = 1))]
    pub max_retries: u32,

    /// Consecutive failures before the breaker opens
    #[serde(default = "default_circuit_breaker_failures")]
    #[validate(range(min = 1))]
    pub circuit_breaker_failure_threshold: u32,

    /// Seconds the breaker stays open before a trial call is allowed
    #[serde(default = "default_circuit_breaker_timeout")]
    pub circuit_breaker_timeout_secs: u64,
}

impl Default for PredictorConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            endpoint: None,
            api_key: None,
            timeout_ms: default_predictor_timeout_ms(),
            max_retries: default_predictor_max_retries(),
            circuit_breaker_failure_threshold: default_circuit_breaker_failures(),
            circuit_breaker_timeout_secs: default_circuit_breaker_timeout(),
        }
    }
}

impl PredictorConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    pub fn circuit_breaker_timeout(&self) -> Duration {
        Duration::from_secs(self.circuit_breaker_timeout_secs)
    }
}

/// Periodic sweep configuration
#[derive(Clone, Debug, Deserialize, Validate)]
#[serde(deny_unknown_fields)]
pub struct SweepConfig {
    #[serde(default = "default_sweep_interval")]
    #[validate(range(min = 1))]
    pub interval_secs: u64,

    #[serde(default = "default_cleanup_interval")]
    #[validate(range(min = 1))]
    pub cleanup_interval_secs: u64,

    /// Minutes without activity before a device is reported offline
    #[serde(default = "default_device_offline_minutes")]
    #[validate(range(min = 1))]
    pub device_offline_minutes: i64,
}

impl Default for SweepConfig {
    fn default() -> Self {
        Self {
            interval_secs: default_sweep_interval(),
            cleanup_interval_secs: default_cleanup_interval(),
            device_offline_minutes: default_device_offline_minutes(),
        }
    }
}

impl SweepConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs)
    }

    pub fn cleanup_interval(&self) -> Duration {
        Duration::from_secs(self.cleanup_interval_secs)
    }

    pub fn device_offline_after(&self) -> chrono::Duration {
        chrono::Duration::minutes(self.device_offline_minutes)
    }
}

/// Application configuration structure with validation
#[derive(Clone, Debug, Deserialize, Validate)]
#[serde(deny_unknown_fields)]
pub struct AppConfig {
    /// Application environment
    #[validate(length(min = 1))]
    pub environment: String,

    /// Logging level
    #[serde(default = "default_log_level")]
    #[validate(custom = "validate_log_level")]
    pub log_level: String,

    /// Log in JSON format (structured logging)
    #[serde(default)]
    pub log_json: bool,

    /// Capacity of the in-process event channel
    #[serde(default = "default_event_channel_capacity")]
    #[validate(custom = "validate_event_channel_capacity")]
    pub event_channel_capacity: usize,

    #[serde(default)]
    #[validate]
    pub freshness: FreshnessThresholds,

    #[serde(default)]
    #[validate]
    pub urgency: UrgencyThresholds,

    #[serde(default)]
    #[validate]
    pub compliance: ComplianceConfig,

    #[serde(default)]
    #[validate]
    pub stock: StockConfig,

    #[serde(default)]
    #[validate]
    pub predictor: PredictorConfig,

    #[serde(default)]
    #[validate]
    pub sweep: SweepConfig,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            environment: DEFAULT_ENV.to_string(),
            log_level: default_log_level(),
            log_json: false,
            event_channel_capacity: default_event_channel_capacity(),
            freshness: FreshnessThresholds::default(),
            urgency: UrgencyThresholds::default(),
            compliance: ComplianceConfig::default(),
            stock: StockConfig::default(),
            predictor: PredictorConfig::default(),
            sweep: SweepConfig::default(),
        }
    }
}

impl AppConfig {
    /// Checks if running in production
    pub fn is_production(&self) -> bool {
        self.environment.eq_ignore_ascii_case("production")
    }

    /// Gets log level reference
    pub fn log_level(&self) -> &str {
        &self.log_level
    }

    fn validate_additional_constraints(&self) -> Result<(), ValidationErrors> {
        let mut errors = ValidationErrors::new();

        if self.freshness.yellow >= self.freshness.green {
            let mut err = ValidationError::new("freshness_thresholds_order");
            err.message = Some("freshness.yellow must be strictly below freshness.green".into());
            errors.add("freshness", err);
        }

        if !(self.urgency.critical_days < self.urgency.high_days
            && self.urgency.high_days < self.urgency.medium_days)
        {
            let mut err = ValidationError::new("urgency_thresholds_order");
            err.message = Some(
                "urgency tiers must be strictly ascending: critical_days < high_days < medium_days"
                    .into(),
            );
            errors.add("urgency", err);
        }

        let has_endpoint = self
            .predictor
            .endpoint
            .as_deref()
            .map_or(false, |e| !e.trim().is_empty());
        if self.predictor.enabled && !has_endpoint {
            let mut err = ValidationError::new("predictor_endpoint_required");
            err.message = Some(
                "Set APP__PREDICTOR__ENDPOINT or disable the predictor with APP__PREDICTOR__ENABLED=false"
                    .into(),
            );
            errors.add("predictor", err);
        }

        if errors.errors().is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }
}

/// Configuration loading errors
#[derive(Debug, Error)]
pub enum AppConfigError {
    #[error("Configuration loading failed: {0}")]
    Load(#[from] ConfigError),

    #[error("Configuration validation failed: {0}")]
    Validation(#[from] validator::ValidationErrors),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Default value functions
fn default_log_level() -> String {
    DEFAULT_LOG_LEVEL.to_string()
}
fn default_event_channel_capacity() -> usize {
    DEFAULT_EVENT_CHANNEL_CAPACITY
}
fn default_min_batches() -> usize {
    2
}
fn default_low_stock_threshold() -> Decimal {
    dec!(5)
}
fn default_predictor_timeout_ms() -> u64 {
    5_000
}
fn default_predictor_max_retries() -> u32 {
    1
}
fn default_circuit_breaker_failures() -> u32 {
    5
}
fn default_circuit_breaker_timeout() -> u64 {
    60
}
fn default_sweep_interval() -> u64 {
    DEFAULT_SWEEP_INTERVAL_SECS
}
fn default_cleanup_interval() -> u64 {
    DEFAULT_CLEANUP_INTERVAL_SECS
}
fn default_device_offline_minutes() -> i64 {
    DEFAULT_DEVICE_OFFLINE_MINUTES
}

/// Validates log level values
fn validate_log_level(level: &str) -> Result<(), ValidationError> {
    let valid_levels = ["trace", "debug", "info", "warn", "error"];
    if valid_levels.contains(&level.to_lowercase().as_str()) {
        Ok(())
    } else {
        let mut err = ValidationError::new("log_level");
        err.message = Some("Must be one of: trace, debug, info, warn, error".into());
        Err(err)
    }
}

fn validate_event_channel_capacity(capacity: usize) -> Result<(), ValidationError> {
    if capacity == 0 {
        let mut err = ValidationError::new("event_channel_capacity");
        err.message = Some("event_channel_capacity must be greater than 0".into());
        return Err(err);
    }
    Ok(())
}

fn validate_positive_decimal(value: &Decimal) -> Result<(), ValidationError> {
    if *value <= Decimal::ZERO {
        let mut err = ValidationError::new("positive_decimal");
        err.message = Some("value must be greater than 0".into());
        return Err(err);
    }
    Ok(())
}

/// Initializes tracing using the provided log level as the default filter
pub fn init_tracing(level: &str, json: bool) {
    use tracing_subscriber::fmt;

    let default_directive = format!("kitchen_fifo={}", level);
    let filter_directive = env::var("RUST_LOG")
        .ok()
        .filter(|s| !s.trim().is_empty())
        .unwrap_or(default_directive);

    if json {
        let _ = fmt().with_env_filter(filter_directive).json().try_init();
    } else {
        let _ = fmt().with_env_filter(filter_directive).try_init();
    }
}

/// Loads application configuration from the `config` directory of the working directory.
pub fn load_config() -> Result<AppConfig, AppConfigError> {
    load_config_from(Path::new(CONFIG_DIR))
}

/// Loads application configuration
///
/// Layers configuration sources in this order:
/// 1. Built-in defaults
/// 2. Default config (`{dir}/default.toml`)
/// 3. Environment-specific config (`{dir}/{env}.toml`)
/// 4. Environment variables (`APP__*`)
pub fn load_config_from(config_dir: &Path) -> Result<AppConfig, AppConfigError> {
    // Support both RUN_ENV and APP_ENV for selecting config profile
    let run_env = env::var("RUN_ENV")
        .or_else(|_| env::var("APP_ENV"))
        .unwrap_or_else(|_| DEFAULT_ENV.to_string());
    info!("Loading configuration for environment: {}", run_env);

    if !config_dir.exists() {
        info!(
            "Config directory '{}' not found; relying on built-in defaults and environment variables",
            config_dir.display()
        );
    }

    let config = Config::builder()
        .set_default("environment", run_env.as_str())?
        .set_default("log_level", DEFAULT_LOG_LEVEL)?
        .set_default("log_json", false)?
        .add_source(File::from(config_dir.join("default")).required(false))
        .add_source(File::from(config_dir.join(&run_env)).required(false))
        .add_source(Environment::with_prefix("APP").separator("__"))
        .build()?;

    let app_config: AppConfig = config.try_deserialize()?;

    app_config.validate().map_err(|e| {
        error!("Configuration validation failed: {:?}", e);
        AppConfigError::Validation(e)
    })?;

    app_config.validate_additional_constraints().map_err(|e| {
        error!("Configuration consistency validation failed: {:?}", e);
        AppConfigError::Validation(e)
    })?;

    info!("Configuration loaded successfully");
    Ok(app_config)
}

#[cfg(test)]
mod constraint_tests {
    use super::*;

    #[test]
    fn defaults_pass_validation() {
        let cfg = AppConfig::default();
        assert!(cfg.validate().is_ok());
        assert!(cfg.validate_additional_constraints().is_ok());
    }

    #[test]
    fn inverted_freshness_thresholds_are_rejected() {
        let mut cfg = AppConfig::default();
        cfg.freshness.yellow = 0.8;
        let errors = cfg.validate_additional_constraints().unwrap_err();
        assert!(errors.errors().contains_key("freshness"));
    }

    #[test]
    fn urgency_tiers_must_ascend() {
        let mut cfg = AppConfig::default();
        cfg.urgency.high_days = 1;
        assert!(cfg.validate_additional_constraints().is_err());
    }

    #[test]
    fn enabled_predictor_requires_endpoint() {
        let mut cfg = AppConfig::default();
        cfg.predictor.enabled = true;
        assert!(cfg.validate_additional_constraints().is_err());

        cfg.predictor.endpoint = Some("https://ml.example.com/score".into());
        assert!(cfg.validate_additional_constraints().is_ok());
    }

    #[test]
    fn more_than_one_retry_is_rejected() {
        let mut cfg = AppConfig::default();
        cfg.predictor.max_retries = 3;
        assert!(cfg.validate().is_err());
    }
}
