//! Null row purge
//!
//! Drops rows whose driver, team or circuit has no prior observation yet.

use tracing::debug;

use crate::data::feature_set::REQUIRED_HISTORY_COLUMNS;
use crate::data::features::{FeatureRow, FeatureTable};

/// Feature rows with complete history
///
/// Only built by [`NullRowPurge::purge`] from a [`FeatureTable`].
#[derive(Debug, Clone, PartialEq)]
pub struct PurgedTable {
    rows: Vec<FeatureRow>,
    dropped: usize,
}

impl PurgedTable {
    pub fn rows(&self) -> &[FeatureRow] {
        &self.rows
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Number of rows removed by the purge
    pub fn dropped(&self) -> usize {
        self.dropped
    }

    pub fn historical_rows(&self) -> impl Iterator<Item = &FeatureRow> {
        self.rows.iter().filter(|r| !r.is_prediction_data())
    }

    pub fn prediction_rows(&self) -> impl Iterator<Item = &FeatureRow> {
        self.rows.iter().filter(|r| r.is_prediction_data())
    }
}

pub struct NullRowPurge;

impl NullRowPurge {
    /// Keep only rows where every required historical feature is present
    pub fn purge(table: FeatureTable) -> PurgedTable {
        let total = table.len();
        let rows: Vec<FeatureRow> = table
            .into_rows()
            .into_iter()
            .filter(Self::has_complete_history)
            .collect();
        let dropped = total - rows.len();

        debug!("Purged {} of {} rows with incomplete history", dropped, total);
        PurgedTable { rows, dropped }
    }

    pub fn has_complete_history(row: &FeatureRow) -> bool {
        REQUIRED_HISTORY_COLUMNS
            .iter()
            .all(|column| row.value(column).is_some())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::features::RollingFeatureEngine;
    use crate::data::store::tests::row;
    use crate::data::store::RaceTable;

    #[test]
    fn test_driver_with_single_race_is_dropped() {
        let rows = vec![
            row(2024, 1, "LEC", "Ferrari", 2),
            row(2024, 1, "SAI", "Ferrari", 3),
            row(2024, 2, "LEC", "Ferrari", 1),
            row(2024, 2, "SAI", "Ferrari", 4),
            row(2024, 2, "NEW", "Haas", 15),
        ]
        .into_iter()
        .map(|mut r| {
            r.circuit_name = "Italian Grand Prix".to_string();
            r
        })
        .collect();
        let engineered = RollingFeatureEngine::default().run(&RaceTable::new(rows).unwrap());
        let purged = NullRowPurge::purge(engineered);

        let kept: Vec<(&str, u32)> = purged
            .rows()
            .iter()
            .map(|r| (r.record.driver.as_str(), r.record.race_id))
            .collect();
        assert_eq!(kept, vec![("LEC", 2), ("SAI", 2)]);
        assert_eq!(purged.dropped(), 3);
    }

    #[test]
    fn test_rows_with_full_history_survive() {
        // Same circuit both years so track history exists
        let mut rows = Vec::new();
        for year in [2023, 2024] {
            for (driver, pos) in [("LEC", 1), ("SAI", 2)] {
                let mut r = row(year, 1, driver, "Ferrari", pos);
                r.circuit_name = "Bahrain Grand Prix".to_string();
                rows.push(r);
            }
        }
        let engineered = RollingFeatureEngine::default().run(&RaceTable::new(rows).unwrap());
        let purged = NullRowPurge::purge(engineered);

        assert_eq!(purged.len(), 2);
        assert!(purged.rows().iter().all(|r| r.record.year == 2024));
        assert_eq!(purged.historical_rows().count(), 2);
        assert_eq!(purged.prediction_rows().count(), 0);
    }
}
