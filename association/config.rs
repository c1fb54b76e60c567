use super::mantel::MantelOptions;
use super::ols::RegressionOptions;
use crate::genealogy::DEFAULT_PSD_TOLERANCE;
use serde::{Deserialize, Serialize};
use std::path::Path;
use thiserror::Error;

pub const DEFAULT_HISTOGRAM_BINS: usize = 500;
pub const DEFAULT_Q_VALUE_SCALE: f64 = 10.0;

/// What happens when a single tree or site fails.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailurePolicy {
    /// The first failing unit aborts the run and nothing is committed.
    #[default]
    Abort,
    /// Failing units keep the sentinel and are listed in the run summary.
    SkipAndContinue,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReportOptions {
    pub histogram_bins: usize,
    pub q_value_scale: f64,
}

impl Default for ReportOptions {
    fn default() -> Self {
        Self {
            histogram_bins: DEFAULT_HISTOGRAM_BINS,
            q_value_scale: DEFAULT_Q_VALUE_SCALE,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AssociationConfig {
    pub failure_policy: FailurePolicy,
    /// Evaluate units on the rayon pool.
    pub parallel: bool,
    pub psd_tolerance: f64,
    pub mantel: MantelOptions,
    pub regression: RegressionOptions,
    pub report: ReportOptions,
}

impl Default for AssociationConfig {
    fn default() -> Self {
        Self {
            failure_policy: FailurePolicy::default(),
            parallel: true,
            psd_tolerance: DEFAULT_PSD_TOLERANCE,
            mantel: MantelOptions::default(),
            regression: RegressionOptions::default(),
            report: ReportOptions::default(),
        }
    }
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("failed to read configuration file: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to parse configuration: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("invalid configuration: {0}")]
    Invalid(String),
}

impl AssociationConfig {
    pub fn from_toml_str(text: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_path(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path)?;
        let config = Self::from_toml_str(&text)?;
        log::debug!("loaded association configuration from {}", path.display());
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if !self.psd_tolerance.is_finite() || self.psd_tolerance < 0.0 {
            return Err(ConfigError::Invalid(format!(
                "psd_tolerance must be finite and non-negative, got {}",
                self.psd_tolerance
            )));
        }
        if self.mantel.permutations == 0 {
            return Err(ConfigError::Invalid(
                "mantel.permutations must be positive".into(),
            ));
        }
        if self.report.histogram_bins == 0 {
            return Err(ConfigError::Invalid(
                "report.histogram_bins must be positive".into(),
            ));
        }
        if !(self.report.q_value_scale.is_finite() && self.report.q_value_scale > 0.0) {
            return Err(ConfigError::Invalid(format!(
                "report.q_value_scale must be positive, got {}",
                self.report.q_value_scale
            )));
        }
        Ok(())
    }
}
