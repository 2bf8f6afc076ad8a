//! Pipeline configuration
//!
//! Every field is optional in the TOML file; missing fields take the defaults
//! below. Values are validated before any computation.

use std::collections::HashMap;
use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::data::feature_set::FeatureSet;
use crate::data::features::DEFAULT_WINDOW_SIZE;
use crate::data::future::grid_positions;
use crate::error::{
    validate_season, validate_season_length, validate_window_size, PipelineError, Result,
};

/// Rounds in the 2025 calendar
pub const DEFAULT_SEASON_LENGTH: u32 = 24;

/// Earliest season with lap data from the results provider
pub const DEFAULT_FIRST_SEASON: i32 = 2018;
pub const DEFAULT_LAST_SEASON: i32 = 2025;

/// 2025 grid order
pub const DEFAULT_GRID: [&str; 20] = [
    "VER", "NOR", "PIA", "HUL", "RUS", "ALO", "SAI", "HAM", "ALB", "LEC", "ANT", "HAD", "GAS",
    "STR", "LAW", "BEA", "COL", "TSU", "OCO", "BOR",
];

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct PipelineConfig {
    /// Prior races in each rolling window
    pub window_size: usize,
    /// Last round of the current season
    pub season_length: u32,
    /// Starting grid of the next race, pole first
    pub grid_order: Vec<String>,
    pub first_season: i32,
    pub last_season: i32,
    pub feature_set: FeatureSet,
    /// Circuit of the next race, when known
    pub next_circuit: Option<String>,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            window_size: DEFAULT_WINDOW_SIZE,
            season_length: DEFAULT_SEASON_LENGTH,
            grid_order: DEFAULT_GRID.iter().map(|d| d.to_string()).collect(),
            first_season: DEFAULT_FIRST_SEASON,
            last_season: DEFAULT_LAST_SEASON,
            feature_set: FeatureSet::Blind,
            next_circuit: None,
        }
    }
}

impl PipelineConfig {
    /// Load and validate a TOML config file
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)?;
        let config = Self::from_toml_str(&content)?;
        info!("Loaded pipeline config from {:?}", path);
        Ok(config)
    }

    pub fn from_toml_str(content: &str) -> Result<Self> {
        let config: Self = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        validate_window_size(self.window_size)?;
        validate_season_length(self.season_length)?;

        if self.first_season > self.last_season {
            return Err(PipelineError::Config(format!(
                "first_season {} is after last_season {}",
                self.first_season, self.last_season
            )));
        }

        let mut seen = std::collections::HashSet::new();
        for driver in &self.grid_order {
            if !seen.insert(driver.as_str()) {
                return Err(PipelineError::Config(format!(
                    "Driver {} appears twice in grid_order",
                    driver
                )));
            }
        }

        if self.feature_set.uses_grid() && self.grid_order.is_empty() {
            return Err(PipelineError::Config(
                "grid-aware prediction needs a non-empty grid_order".to_string(),
            ));
        }

        Ok(())
    }

    /// Reject seasons outside the supported range
    pub fn check_seasons(&self, years: &[i32]) -> Result<()> {
        for &year in years {
            validate_season(year, self.first_season, self.last_season)?;
        }
        Ok(())
    }

    /// Starting positions, only when grid-aware prediction is requested
    pub fn grid_map(&self) -> Option<HashMap<String, u32>> {
        self.feature_set
            .uses_grid()
            .then(|| grid_positions(&self.grid_order))
    }
}
