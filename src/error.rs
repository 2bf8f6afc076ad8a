use polars::prelude::PolarsError;
use thiserror::Error;

/// Pipeline error types
#[derive(Debug, Error)]
pub enum PipelineError {
    /// Required column absent or row set malformed
    #[error("Schema error: {0}")]
    Schema(String),

    /// Requested season/race or configuration value outside the supported range
    #[error("Configuration error: {0}")]
    Config(String),

    /// The most recent race is the last round of its season
    #[error(
        "Season {year} is complete: round {race_id} reached season length {season_length}, no race left to predict"
    )]
    SeasonComplete {
        year: i32,
        race_id: u32,
        season_length: u32,
    },

    /// A stage received a table with no rows
    #[error("Empty table: {0}")]
    EmptyTable(String),

    /// Model fitting or scoring failure
    #[error("Prediction error: {0}")]
    Prediction(String),

    #[error("Data frame error: {0}")]
    Polars(#[from] PolarsError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse config: {0}")]
    ConfigParse(#[from] toml::de::Error),
}

pub type Result<T> = std::result::Result<T, PipelineError>;

/// Validation functions
pub fn validate_window_size(window: usize) -> Result<()> {
    if window == 0 {
        return Err(PipelineError::Config(
            "Rolling window size must be at least 1, got 0".to_string(),
        ));
    }
    Ok(())
}

pub fn validate_season(year: i32, first: i32, last: i32) -> Result<()> {
    if !(first..=last).contains(&year) {
        return Err(PipelineError::Config(format!(
            "Season {} not available. Available seasons are: {}-{}",
            year, first, last
        )));
    }
    Ok(())
}

pub fn validate_race_number(year: i32, race: u32, rounds_in_season: u32) -> Result<()> {
    if race == 0 || race > rounds_in_season {
        return Err(PipelineError::Config(format!(
            "Race number is out of bounds. Season {} had {} races, got {}",
            year, rounds_in_season, race
        )));
    }
    Ok(())
}

pub fn validate_season_length(season_length: u32) -> Result<()> {
    if season_length == 0 {
        return Err(PipelineError::Config(
            "Season length must be at least 1 round".to_string(),
        ));
    }
    Ok(())
}
