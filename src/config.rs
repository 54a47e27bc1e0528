//! Pipeline configuration.
//!
//! All policy constants (retry bound and delay, budget ceiling, timeouts,
//! per-call cost estimates, default location) live in [`PipelineConfig`]. It
//! deserializes from JSON with per-field defaults and can be overridden from
//! `WAYFINDER_*` environment variables.

use serde::{Deserialize, Serialize};
use std::env;
use std::path::Path;
use std::time::Duration;

use crate::error::{Error, Result};
use crate::metrics::BudgetCeiling;
use crate::retry::RetryPolicy;
use crate::state::Location;

/// Estimated cost units charged per outbound call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CostTable {
    /// Geolocation lookup (free tier).
    #[serde(default)]
    pub location: f64,
    /// Weather lookup.
    #[serde(default = "default_weather_cost")]
    pub weather: f64,
    /// Primary route lookup.
    #[serde(default = "default_route_cost")]
    pub route: f64,
    /// Alternatives lookup.
    #[serde(default = "default_route_cost")]
    pub alternatives: f64,
    /// Synthesis cost per thousand tokens.
    #[serde(default = "default_synthesis_per_1k_tokens")]
    pub synthesis_per_1k_tokens: f64,
}

fn default_weather_cost() -> f64 {
    0.0015
}

fn default_route_cost() -> f64 {
    0.005
}

fn default_synthesis_per_1k_tokens() -> f64 {
    0.002
}

impl Default for CostTable {
    fn default() -> Self {
        Self {
            location: 0.0,
            weather: default_weather_cost(),
            route: default_route_cost(),
            alternatives: default_route_cost(),
            synthesis_per_1k_tokens: default_synthesis_per_1k_tokens(),
        }
    }
}

impl CostTable {
    /// Cost of a synthesis call that used `tokens` tokens.
    pub fn synthesis(&self, tokens: u64) -> f64 {
        tokens as f64 / 1000.0 * self.synthesis_per_1k_tokens
    }
}

/// Configuration for a [`Supervisor`](crate::Supervisor).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PipelineConfig {
    /// Retry policy applied uniformly to every step.
    #[serde(default)]
    pub retry: RetryPolicy,

    /// Per-request budget ceiling.
    #[serde(default)]
    pub budget: BudgetCeiling,

    /// Per-call cost estimates.
    #[serde(default)]
    pub costs: CostTable,

    /// Timeout for a single outbound call, in milliseconds.
    #[serde(default = "default_call_timeout_ms")]
    pub call_timeout_ms: u64,

    /// Timeout for the whole pipeline, in milliseconds.
    #[serde(default = "default_request_timeout_ms")]
    pub request_timeout_ms: u64,

    /// Address handed to the geolocation provider.
    #[serde(default = "default_probe_ip")]
    pub probe_ip: String,

    /// Location used when geolocation fails. `None` makes that failure fatal.
    #[serde(default = "default_location")]
    pub default_location: Option<Location>,

    /// Upper bound on alternative itineraries requested.
    #[serde(default = "default_max_alternatives")]
    pub max_alternatives: usize,
}

fn default_call_timeout_ms() -> u64 {
    10_000
}

fn default_request_timeout_ms() -> u64 {
    45_000
}

fn default_probe_ip() -> String {
    "8.8.8.8".to_string()
}

fn default_location() -> Option<Location> {
    Some(Location::new_york())
}

fn default_max_alternatives() -> usize {
    3
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            retry: RetryPolicy::default(),
            budget: BudgetCeiling::default(),
            costs: CostTable::default(),
            call_timeout_ms: default_call_timeout_ms(),
            request_timeout_ms: default_request_timeout_ms(),
            probe_ip: default_probe_ip(),
            default_location: default_location(),
            max_alternatives: default_max_alternatives(),
        }
    }
}

impl PipelineConfig {
    /// Parse configuration from a JSON document; missing fields take defaults.
    pub fn from_json_str(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a JSON file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| {
            Error::Config(format!("Failed to read config file {}: {}", path.display(), e))
        })?;
        Self::from_json_str(&content)
    }

    /// Load configuration from a JSON file, then apply environment overrides.
    pub fn from_file_with_env(path: impl AsRef<Path>) -> Result<Self> {
        let mut config = Self::from_file(path)?;
        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    /// Defaults plus environment overrides.
    pub fn from_env() -> Result<Self> {
        let mut config = Self::default();
        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    /// Apply overrides from the process environment.
    ///
    /// Supported variables:
    /// - `WAYFINDER_MAX_RETRIES`
    /// - `WAYFINDER_RETRY_DELAY_MS`
    /// - `WAYFINDER_MAX_API_CALLS`
    /// - `WAYFINDER_MAX_COST_UNITS`
    /// - `WAYFINDER_MAX_ELAPSED_MS`
    /// - `WAYFINDER_CALL_TIMEOUT_MS`
    /// - `WAYFINDER_REQUEST_TIMEOUT_MS`
    /// - `WAYFINDER_PROBE_IP`
    /// - `WAYFINDER_MAX_ALTERNATIVES`
    ///
    /// Unparseable values are ignored.
    pub fn apply_env_overrides(&mut self) {
        self.apply_overrides(|key| env::var(key).ok());
    }

    /// Apply overrides from an arbitrary key lookup.
    pub fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        fn parsed<T: std::str::FromStr>(
            lookup: &impl Fn(&str) -> Option<String>,
            key: &str,
        ) -> Option<T> {
            lookup(key).and_then(|v| v.trim().parse().ok())
        }

        if let Some(v) = parsed(&lookup, "WAYFINDER_MAX_RETRIES") {
            self.retry.max_retries = v;
        }
        if let Some(v) = parsed(&lookup, "WAYFINDER_RETRY_DELAY_MS") {
            self.retry.delay_ms = v;
        }
        if let Some(v) = parsed(&lookup, "WAYFINDER_MAX_API_CALLS") {
            self.budget.max_api_calls = v;
        }
        if let Some(v) = parsed(&lookup, "WAYFINDER_MAX_COST_UNITS") {
            self.budget.max_cost_units = v;
        }
        if let Some(v) = parsed(&lookup, "WAYFINDER_MAX_ELAPSED_MS") {
            self.budget.max_elapsed_ms = v;
        }
        if let Some(v) = parsed(&lookup, "WAYFINDER_CALL_TIMEOUT_MS") {
            self.call_timeout_ms = v;
        }
        if let Some(v) = parsed(&lookup, "WAYFINDER_REQUEST_TIMEOUT_MS") {
            self.request_timeout_ms = v;
        }
        if let Some(v) = lookup("WAYFINDER_PROBE_IP") {
            self.probe_ip = v.trim().to_string();
        }
        if let Some(v) = parsed(&lookup, "WAYFINDER_MAX_ALTERNATIVES") {
            self.max_alternatives = v;
        }
    }

    /// Validate configuration values.
    pub fn validate(&self) -> Result<()> {
        if self.call_timeout_ms == 0 {
            return Err(Error::Config("call_timeout_ms must be positive".to_string()));
        }
        if self.request_timeout_ms == 0 {
            return Err(Error::Config("request_timeout_ms must be positive".to_string()));
        }
        if self.retry.max_retries > 10 {
            return Err(Error::Config(format!(
                "max_retries must be at most 10, got {}",
                self.retry.max_retries
            )));
        }
        if self.budget.max_cost_units.is_nan() || self.budget.max_cost_units < 0.0 {
            return Err(Error::Config(format!(
                "max_cost_units must be non-negative, got {}",
                self.budget.max_cost_units
            )));
        }
        let costs = [
            self.costs.location,
            self.costs.weather,
            self.costs.route,
            self.costs.alternatives,
            self.costs.synthesis_per_1k_tokens,
        ];
        if costs.iter().any(|c| !c.is_finite() || *c < 0.0) {
            return Err(Error::Config("costs must be finite and non-negative".to_string()));
        }
        if self.probe_ip.is_empty() {
            return Err(Error::Config("probe_ip cannot be empty".to_string()));
        }
        Ok(())
    }

    /// Timeout for one outbound call.
    pub fn call_timeout(&self) -> Duration {
        Duration::from_millis(self.call_timeout_ms)
    }

    /// Timeout for the whole pipeline.
    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }
}
