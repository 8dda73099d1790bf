//! Configuration management for experiment analysis
//!
//! Values are layered: compiled-in defaults, then an optional YAML file, then
//! environment variables prefixed with `ABTEST_` (nested keys split on `__`,
//! e.g. `ABTEST_INFERENCE__SEED=7`).

use figment::{
    providers::{Env, Format, Serialized, Yaml},
    Figment,
};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use thiserror::Error;
use tracing::debug;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to load configuration: {0}")]
    LoadError(String),

    #[error("Invalid configuration: {0}")]
    ValidationError(String),
}

pub type Result<T> = std::result::Result<T, ConfigError>;

/// Main analysis configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct AnalysisConfig {
    /// Hypothesis testing and resampling settings
    pub inference: InferenceConfig,

    /// Pre-experiment power planning
    pub planning: PlanningConfig,

    /// Revenue impact projection
    pub impact: ImpactConfig,

    /// Observability settings
    pub observability: ObservabilityConfig,
}

impl AnalysisConfig {
    /// Load configuration from file and environment
    pub fn load(config_path: Option<PathBuf>) -> Result<Self> {
        let mut figment = Figment::from(Serialized::defaults(AnalysisConfig::default()));

        // Load from file if provided
        if let Some(path) = config_path {
            figment = figment.merge(Yaml::file(path));
        }

        // Override with environment variables (prefixed with ABTEST_)
        figment = figment.merge(Env::prefixed("ABTEST_").split("__"));

        let config: AnalysisConfig = figment
            .extract()
            .map_err(|e| ConfigError::LoadError(e.to_string()))?;
        config.validate()?;
        debug!(
            "Loaded analysis configuration: alpha={}, seed={}",
            config.inference.alpha, config.inference.seed
        );
        Ok(config)
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<()> {
        self.inference.validate()?;
        self.planning.validate()?;
        self.impact.validate()?;

        if self.planning.power <= self.inference.alpha {
            return Err(ConfigError::ValidationError(format!(
                "planning.power ({}) must exceed inference.alpha ({})",
                self.planning.power, self.inference.alpha
            )));
        }

        Ok(())
    }
}

fn check_open_unit(name: &str, value: f64) -> Result<()> {
    if value.is_finite() && value > 0.0 && value < 1.0 {
        Ok(())
    } else {
        Err(ConfigError::ValidationError(format!(
            "{name} must lie in (0, 1), got {value}"
        )))
    }
}

/// Inference settings
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct InferenceConfig {
    /// Type-I error budget for every two-sided test
    pub alpha: f64,

    /// Confidence level of the bootstrap interval
    pub confidence_level: f64,

    /// Bootstrap resample count
    pub bootstrap_resamples: usize,

    /// Permutation count for the primary metric
    pub permutations: usize,

    /// Seed threaded through every resampling routine
    pub seed: u64,

    /// Number of simultaneous comparisons for the Bonferroni threshold
    pub comparisons: usize,

    /// Significance level of the sample-ratio-mismatch check
    pub srm_alpha: f64,

    /// Expected share of sessions allocated to treatment
    pub expected_treatment_share: f64,
}

impl Default for InferenceConfig {
    fn default() -> Self {
        Self {
            alpha: 0.05,
            confidence_level: 0.95,
            bootstrap_resamples: 10_000,
            permutations: 10_000,
            seed: 42,
            comparisons: 3,
            srm_alpha: 0.01,
            expected_treatment_share: 0.5,
        }
    }
}

impl InferenceConfig {
    pub fn validate(&self) -> Result<()> {
        check_open_unit("inference.alpha", self.alpha)?;
        check_open_unit("inference.confidence_level", self.confidence_level)?;
        check_open_unit("inference.srm_alpha", self.srm_alpha)?;
        check_open_unit(
            "inference.expected_treatment_share",
            self.expected_treatment_share,
        )?;

        if self.bootstrap_resamples == 0 {
            return Err(ConfigError::ValidationError(
                "inference.bootstrap_resamples must be positive".to_string(),
            ));
        }
        if self.permutations == 0 {
            return Err(ConfigError::ValidationError(
                "inference.permutations must be positive".to_string(),
            ));
        }
        if self.comparisons == 0 {
            return Err(ConfigError::ValidationError(
                "inference.comparisons must be positive".to_string(),
            ));
        }

        Ok(())
    }
}

/// Pre-experiment power planning
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PlanningConfig {
    /// Assumed control conversion rate
    pub baseline_rate: f64,

    /// Absolute minimum detectable effects to plan for
    pub mde_candidates: Vec<f64>,

    /// Target power (1 - beta)
    pub power: f64,

    /// Expected sessions per arm per day, used to convert sizes to durations
    pub sessions_per_group_per_day: f64,
}

impl Default for PlanningConfig {
    fn default() -> Self {
        Self {
            baseline_rate: 0.032,
            mde_candidates: vec![0.003, 0.004, 0.005],
            power: 0.80,
            sessions_per_group_per_day: 1_750.0,
        }
    }
}

impl PlanningConfig {
    pub fn validate(&self) -> Result<()> {
        check_open_unit("planning.baseline_rate", self.baseline_rate)?;
        check_open_unit("planning.power", self.power)?;

        if self.mde_candidates.is_empty() {
            return Err(ConfigError::ValidationError(
                "planning.mde_candidates must not be empty".to_string(),
            ));
        }
        if let Some(bad) = self
            .mde_candidates
            .iter()
            .find(|m| !m.is_finite() || **m <= 0.0)
        {
            return Err(ConfigError::ValidationError(format!(
                "planning.mde_candidates must be positive, got {bad}"
            )));
        }
        if !(self.sessions_per_group_per_day > 0.0) {
            return Err(ConfigError::ValidationError(
                "planning.sessions_per_group_per_day must be positive".to_string(),
            ));
        }

        Ok(())
    }
}

/// Revenue impact projection
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ImpactConfig {
    /// Projection horizon in days
    pub projection_days: f64,
}

impl Default for ImpactConfig {
    fn default() -> Self {
        Self {
            projection_days: 365.0,
        }
    }
}

impl ImpactConfig {
    pub fn validate(&self) -> Result<()> {
        if !(self.projection_days > 0.0) || !self.projection_days.is_finite() {
            return Err(ConfigError::ValidationError(
                "impact.projection_days must be positive".to_string(),
            ));
        }
        Ok(())
    }
}

/// Observability configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ObservabilityConfig {
    /// Log filter directive (e.g. "info" or "decision=debug,warn")
    pub log_level: String,

    /// Enable structured JSON logging
    pub json_logging: bool,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            json_logging: false,
        }
    }
}

impl ObservabilityConfig {
    /// Install a global tracing subscriber for this configuration
    ///
    /// Fails if the filter directive is malformed or a global subscriber is
    /// already installed.
    pub fn init_tracing(&self) -> Result<()> {
        let filter = EnvFilter::try_new(&self.log_level)
            .map_err(|e| ConfigError::ValidationError(format!("log_level: {e}")))?;

        let registry = tracing_subscriber::registry().with(filter);
        let result = if self.json_logging {
            registry
                .with(fmt::layer().json().with_target(false))
                .try_init()
        } else {
            registry.with(fmt::layer().with_target(false)).try_init()
        };

        result.map_err(|e| ConfigError::LoadError(e.to_string()))
    }
}
