use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::error::{RatioEngineError, Result};

/// Engine configuration. Every field has a default, so a partial JSON
/// document (or `{}`) is a valid configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineSettings {
    /// Enables custom ratios and the merged configuration.
    pub dev_mode: bool,
    /// Average extraction confidence below which analysis reports a warning.
    pub low_confidence_threshold: f64,
    /// Decimal places kept on every computed ratio.
    pub decimal_places: u32,
    /// Custom `%` ratios below this value are treated as fractions and scaled by 100.
    pub percent_fraction_threshold: f64,
    /// Directory holding one `<user>_ratios.json` file per user.
    pub storage_dir: PathBuf,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            dev_mode: false,
            low_confidence_threshold: 0.8,
            decimal_places: 2,
            percent_fraction_threshold: 10.0,
            storage_dir: PathBuf::from("data/custom_ratios"),
        }
    }
}

impl EngineSettings {
    pub fn from_json_str(json: &str) -> Result<Self> {
        let settings: EngineSettings = serde_json::from_str(json)?;
        settings.validate()?;
        Ok(settings)
    }

    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        Self::from_json_str(&contents)
    }

    pub fn validate(&self) -> Result<()> {
        if !(0.0..=1.0).contains(&self.low_confidence_threshold) {
            return Err(RatioEngineError::InvalidSettings(format!(
                "low_confidence_threshold {} must be between 0.0 and 1.0",
                self.low_confidence_threshold
            )));
        }
        if self.decimal_places > 10 {
            return Err(RatioEngineError::InvalidSettings(format!(
                "decimal_places {} must be at most 10",
                self.decimal_places
            )));
        }
        if !self.percent_fraction_threshold.is_finite() || self.percent_fraction_threshold < 0.0 {
            return Err(RatioEngineError::InvalidSettings(format!(
                "percent_fraction_threshold {} must be a non-negative number",
                self.percent_fraction_threshold
            )));
        }
        Ok(())
    }

    pub fn with_dev_mode(mut self, dev_mode: bool) -> Self {
        self.dev_mode = dev_mode;
        self
    }
}
