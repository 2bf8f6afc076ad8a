//! Future race synthesis
//!
//! Clones the most recent race's driver block into a placeholder for the next
//! round, so a second engine pass can fill in its historical features.

use std::collections::HashMap;

use tracing::{debug, warn};

use crate::data::features::FeatureTable;
use crate::error::{validate_season_length, PipelineError, Result};
use crate::models::RaceRecord;

/// Result of asking for the next race
#[derive(Debug, Clone, PartialEq)]
pub enum FutureRace {
    /// Next-round rows with outcomes unknown and `is_prediction_data` set
    Scheduled(Vec<RaceRecord>),
    /// The source block was the last round of its season; returned unmodified
    SeasonComplete(Vec<RaceRecord>),
}

impl FutureRace {
    pub fn is_scheduled(&self) -> bool {
        matches!(self, FutureRace::Scheduled(_))
    }

    pub fn rows(&self) -> &[RaceRecord] {
        match self {
            FutureRace::Scheduled(rows) | FutureRace::SeasonComplete(rows) => rows,
        }
    }
}

/// Optional knowledge about the next race
#[derive(Debug, Clone, Default)]
pub struct NextRaceOverrides {
    /// Driver code to starting position
    pub grid: Option<HashMap<String, u32>>,
    /// Circuit of the next race; defaults to the previous race's circuit
    pub circuit_name: Option<String>,
}

/// Builds the synthetic next-race block
#[derive(Debug, Clone)]
pub struct FutureRowSynthesizer {
    season_length: u32,
}

impl FutureRowSynthesizer {
    pub fn new(season_length: u32) -> Result<Self> {
        validate_season_length(season_length)?;
        Ok(Self { season_length })
    }

    pub fn season_length(&self) -> u32 {
        self.season_length
    }

    /// Synthesize the race after the most recent historical race
    ///
    /// The source block is every historical row sharing the last row's
    /// (Year, raceID).
    pub fn synthesize(
        &self,
        table: &FeatureTable,
        overrides: &NextRaceOverrides,
    ) -> Result<FutureRace> {
        let history: Vec<&RaceRecord> = table
            .rows()
            .iter()
            .map(|r| &r.record)
            .filter(|r| !r.is_prediction_data)
            .collect();

        let last_key = history
            .last()
            .map(|r| r.race_key())
            .ok_or_else(|| PipelineError::EmptyTable("no historical race to extend".to_string()))?;

        let block: Vec<RaceRecord> = history
            .iter()
            .rev()
            .take_while(|r| r.race_key() == last_key)
            .map(|r| (*r).clone())
            .collect::<Vec<_>>()
            .into_iter()
            .rev()
            .collect();

        let (year, race_id) = last_key;
        if race_id >= self.season_length {
            warn!(
                "Round {} of {} reaches season length {}; no next race to synthesize",
                race_id, year, self.season_length
            );
            return Ok(FutureRace::SeasonComplete(block));
        }

        let future: Vec<RaceRecord> = block
            .into_iter()
            .map(|source| {
                let grid_position = overrides
                    .grid
                    .as_ref()
                    .and_then(|grid| grid.get(&source.driver).copied());
                let circuit_name = overrides
                    .circuit_name
                    .clone()
                    .unwrap_or(source.circuit_name);

                RaceRecord {
                    year: source.year,
                    race_id: source.race_id + 1,
                    driver: source.driver,
                    team: source.team,
                    circuit_name,
                    avg_lap_time_s: None,
                    std_lap_time_s: None,
                    laps_completed: None,
                    grid_position,
                    position: None,
                    is_dnf: None,
                    is_prediction_data: true,
                }
            })
            .collect();

        debug!(
            "Synthesized {} rows for {} round {}",
            future.len(),
            year,
            race_id + 1
        );

        Ok(FutureRace::Scheduled(future))
    }
}

/// Starting positions from a grid order (1-based)
pub fn grid_positions(order: &[String]) -> HashMap<String, u32> {
    order
        .iter()
        .enumerate()
        .map(|(i, driver)| (driver.clone(), i as u32 + 1))
        .collect()
}
