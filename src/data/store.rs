//! Race Record Store
//!
//! The canonical row-per-driver-per-race table. Rows are kept in (Year, raceID)
//! order and (Year, raceID, Driver) is unique; every rolling computation relies
//! on both.

use std::collections::{BTreeSet, HashSet};

use tracing::debug;

use crate::error::{PipelineError, Result};
use crate::models::{RaceKey, RaceRecord};

/// Chronologically ordered race results
#[derive(Debug, Clone, PartialEq, Default)]
pub struct RaceTable {
    rows: Vec<RaceRecord>,
}

impl RaceTable {
    /// Build a table, sorting rows by (Year, raceID) and rejecting duplicate keys
    ///
    /// The sort is stable, so the order of drivers within a race is preserved.
    pub fn new(mut rows: Vec<RaceRecord>) -> Result<Self> {
        rows.sort_by_key(|r| r.race_key());

        let mut seen: HashSet<(i32, u32, &str)> = HashSet::with_capacity(rows.len());
        for r in &rows {
            if !seen.insert((r.year, r.race_id, r.driver.as_str())) {
                return Err(PipelineError::Schema(format!(
                    "Duplicate result for driver {} in {} round {}",
                    r.driver, r.year, r.race_id
                )));
            }
        }

        debug!("Built race table with {} rows", rows.len());
        Ok(Self { rows })
    }

    /// Wrap rows already known to be ordered and unique
    pub(crate) fn from_validated(rows: Vec<RaceRecord>) -> Self {
        Self { rows }
    }

    /// Concatenate several tables (typically one per season) into one
    pub fn concat<I>(tables: I) -> Result<Self>
    where
        I: IntoIterator<Item = RaceTable>,
    {
        let rows: Vec<RaceRecord> = tables.into_iter().flat_map(|t| t.rows).collect();
        Self::new(rows)
    }

    /// Append a synthesized future race, returning a new table
    ///
    /// `self` is left untouched; the block never enters the historical store.
    pub fn with_future_race(&self, block: Vec<RaceRecord>) -> Result<Self> {
        let mut rows = Vec::with_capacity(self.rows.len() + block.len());
        rows.extend(self.rows.iter().cloned());
        rows.extend(block);
        Self::new(rows)
    }

    pub fn rows(&self) -> &[RaceRecord] {
        &self.rows
    }

    pub fn into_rows(self) -> Vec<RaceRecord> {
        self.rows
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Distinct races in chronological order
    pub fn races(&self) -> Vec<RaceKey> {
        let mut races: Vec<RaceKey> = self.rows.iter().map(|r| r.race_key()).collect();
        races.dedup();
        races
    }

    /// Distinct seasons in ascending order
    pub fn seasons(&self) -> Vec<i32> {
        self.rows
            .iter()
            .map(|r| r.year)
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect()
    }

    /// Most recent race in the table
    pub fn last_race(&self) -> Option<RaceKey> {
        self.rows.last().map(|r| r.race_key())
    }

    /// Number of distinct drivers on record
    pub fn driver_count(&self) -> usize {
        self.rows
            .iter()
            .map(|r| r.driver.as_str())
            .collect::<HashSet<_>>()
            .len()
    }
}
