//! Feature set declaration and predictor slices
//!
//! The column order here is the classifier's input order.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::data::features::{columns, FeatureRow};
use crate::data::purge::PurgedTable;
use crate::models::RaceIdentity;

/// Historical features every row must have to survive the purge
pub const REQUIRED_HISTORY_COLUMNS: [&str; 12] = [
    columns::PREV_AVG_AVG_LAP_TIME_NORM,
    columns::PREV_AVG_STD_LAP_TIME_NORM,
    columns::PREV_AVG_GRID_POSITION,
    columns::PREV_AVG_POSITION,
    columns::ROLLING_PREV_AVG_AVG_LAP_TIME_NORM,
    columns::ROLLING_PREV_AVG_STD_LAP_TIME_NORM,
    columns::ROLLING_PREV_AVG_GRID_POSITION,
    columns::ROLLING_PREV_AVG_POSITION,
    columns::PREV_AVG_FINISH_TRACK,
    columns::ROLLING_PREV_AVG_FINISH_TRACK,
    columns::ROLLING_PREV_AVG_TEAM_PACE,
    columns::ROLLING_PREV_AVG_TEAM_FINAL_POS,
];

const BLIND_FEATURES: [&str; 12] = [
    columns::PREV_AVG_GRID_POSITION,
    columns::PREV_AVG_POSITION,
    columns::PREV_AVG_AVG_LAP_TIME_NORM,
    columns::PREV_AVG_STD_LAP_TIME_NORM,
    columns::ROLLING_PREV_AVG_AVG_LAP_TIME_NORM,
    columns::ROLLING_PREV_AVG_STD_LAP_TIME_NORM,
    columns::ROLLING_PREV_AVG_GRID_POSITION,
    columns::ROLLING_PREV_AVG_POSITION,
    columns::PREV_AVG_FINISH_TRACK,
    columns::ROLLING_PREV_AVG_FINISH_TRACK,
    columns::ROLLING_PREV_AVG_TEAM_PACE,
    columns::ROLLING_PREV_AVG_TEAM_FINAL_POS,
];

const GRID_AWARE_FEATURES: [&str; 13] = [
    columns::PREV_AVG_GRID_POSITION,
    columns::PREV_AVG_POSITION,
    columns::PREV_AVG_AVG_LAP_TIME_NORM,
    columns::PREV_AVG_STD_LAP_TIME_NORM,
    columns::ROLLING_PREV_AVG_AVG_LAP_TIME_NORM,
    columns::ROLLING_PREV_AVG_STD_LAP_TIME_NORM,
    columns::ROLLING_PREV_AVG_GRID_POSITION,
    columns::ROLLING_PREV_AVG_POSITION,
    columns::PREV_AVG_FINISH_TRACK,
    columns::ROLLING_PREV_AVG_FINISH_TRACK,
    columns::ROLLING_PREV_AVG_TEAM_PACE,
    columns::ROLLING_PREV_AVG_TEAM_FINAL_POS,
    columns::GRID_POSITION,
];

/// Which input vector the classifier sees
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum FeatureSet {
    /// History only; the upcoming starting grid is unknown
    #[default]
    Blind,
    /// History plus the current starting grid position
    GridAware,
}

impl FeatureSet {
    pub fn columns(self) -> &'static [&'static str] {
        match self {
            FeatureSet::Blind => &BLIND_FEATURES,
            FeatureSet::GridAware => &GRID_AWARE_FEATURES,
        }
    }

    pub fn uses_grid(self) -> bool {
        self == FeatureSet::GridAware
    }

    /// Feature vector for one row, or `None` if any selected column is null
    pub fn vector(self, row: &FeatureRow) -> Option<Vec<f64>> {
        self.columns().iter().map(|c| row.value(c)).collect()
    }
}

impl fmt::Display for FeatureSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FeatureSet::Blind => write!(f, "blind"),
            FeatureSet::GridAware => write!(f, "grid-aware"),
        }
    }
}

impl FromStr for FeatureSet {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "blind" => Ok(FeatureSet::Blind),
            "grid-aware" | "grid" => Ok(FeatureSet::GridAware),
            other => Err(format!(
                "Unknown feature set: {}. Use 'blind' or 'grid-aware'",
                other
            )),
        }
    }
}

/// Get feature column names for a feature set
pub fn get_feature_names(set: FeatureSet) -> Vec<&'static str> {
    set.columns().to_vec()
}

/// Historical rows with their winner labels
#[derive(Debug, Clone, Default)]
pub struct TrainingSlice {
    pub columns: Vec<&'static str>,
    pub features: Vec<Vec<f64>>,
    pub labels: Vec<bool>,
    pub ids: Vec<RaceIdentity>,
}

impl TrainingSlice {
    pub fn len(&self) -> usize {
        self.features.len()
    }

    pub fn is_empty(&self) -> bool {
        self.features.is_empty()
    }

    pub fn winners(&self) -> usize {
        self.labels.iter().filter(|&&l| l).count()
    }

    /// Split into (other seasons, given season)
    pub fn split_by_year(&self, year: i32) -> (TrainingSlice, TrainingSlice) {
        let mut rest = TrainingSlice {
            columns: self.columns.clone(),
            ..Default::default()
        };
        let mut holdout = rest.clone();

        for ((x, y), id) in self.features.iter().zip(&self.labels).zip(&self.ids) {
            let target = if id.year == year { &mut holdout } else { &mut rest };
            target.features.push(x.clone());
            target.labels.push(*y);
            target.ids.push(id.clone());
        }

        (rest, holdout)
    }
}

/// Synthetic next-race rows, unlabelled
#[derive(Debug, Clone, Default)]
pub struct FutureSlice {
    pub columns: Vec<&'static str>,
    pub features: Vec<Vec<f64>>,
    pub ids: Vec<RaceIdentity>,
}

impl FutureSlice {
    pub fn len(&self) -> usize {
        self.features.len()
    }

    pub fn is_empty(&self) -> bool {
        self.features.is_empty()
    }
}

/// Everything the predictor receives
#[derive(Debug, Clone)]
pub struct PredictionSet {
    pub feature_set: FeatureSet,
    pub train: TrainingSlice,
    pub future: FutureSlice,
}

impl PredictionSet {
    /// Slice a purged table into training and prediction inputs
    ///
    /// Rows whose selected vector still has a null (a grid-aware row with no
    /// starting position) are left out of both slices.
    pub fn select(table: &PurgedTable, feature_set: FeatureSet) -> Self {
        let columns = get_feature_names(feature_set);
        let mut train = TrainingSlice {
            columns: columns.clone(),
            ..Default::default()
        };
        let mut future = FutureSlice {
            columns,
            ..Default::default()
        };
        let mut skipped = 0usize;

        for row in table.rows() {
            let Some(x) = feature_set.vector(row) else {
                skipped += 1;
                continue;
            };
            if row.is_prediction_data() {
                future.features.push(x);
                future.ids.push(row.record.identity());
            } else {
                train.features.push(x);
                train.labels.push(row.record.is_winner());
                train.ids.push(row.record.identity());
            }
        }

        if skipped > 0 {
            debug!("Skipped {} rows with null {} features", skipped, feature_set);
        }

        Self {
            feature_set,
            train,
            future,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::features::RollingFeatureEngine;
    use crate::data::purge::NullRowPurge;
    use crate::data::store::tests::row;
    use crate::data::store::RaceTable;
    use crate::models::RaceRecord;

    fn purged(rows: Vec<RaceRecord>) -> PurgedTable {
        let rows = rows
            .into_iter()
            .map(|mut r| {
                r.circuit_name = "Monaco Grand Prix".to_string();
                r
            })
            .collect();
        let engineered = RollingFeatureEngine::default().run(&RaceTable::new(rows).unwrap());
        NullRowPurge::purge(engineered)
    }

    #[test]
    fn test_feature_names() {
        let blind = get_feature_names(FeatureSet::Blind);
        assert_eq!(blind.len(), 12);
        assert!(!blind.contains(&columns::GRID_POSITION));

        let grid = get_feature_names(FeatureSet::GridAware);
        assert_eq!(grid.len(), 13);
        assert_eq!(grid[..12], blind[..]);
        assert_eq!(grid[12], "GridPosition");
    }

    #[test]
    fn test_every_declared_column_resolves() {
        let table = purged(vec![
            row(2024, 1, "LEC", "Ferrari", 2),
            row(2024, 2, "LEC", "Ferrari", 1),
        ]);
        let r = &table.rows()[0];
        for c in FeatureSet::GridAware.columns() {
            assert!(r.value(c).is_some(), "column {} did not resolve", c);
        }
        for c in REQUIRED_HISTORY_COLUMNS {
            assert!(BLIND_FEATURES.contains(&c));
        }
    }

    #[test]
    fn test_feature_set_parse() {
        assert_eq!("blind".parse::<FeatureSet>().unwrap(), FeatureSet::Blind);
        assert_eq!("Grid-Aware".parse::<FeatureSet>().unwrap(), FeatureSet::GridAware);
        assert!("telemetry".parse::<FeatureSet>().is_err());
        assert_eq!(FeatureSet::GridAware.to_string(), "grid-aware");
    }

    #[test]
    fn test_select_splits_history_and_future() {
        let mut future = row(2024, 3, "LEC", "Ferrari", 1);
        future.position = None;
        future.grid_position = None;
        future.avg_lap_time_s = None;
        future.std_lap_time_s = None;
        future.is_dnf = None;
        future.is_prediction_data = true;

        let table = purged(vec![
            row(2024, 1, "LEC", "Ferrari", 3),
            row(2024, 2, "LEC", "Ferrari", 1),
            future,
        ]);

        let set = PredictionSet::select(&table, FeatureSet::Blind);
        assert_eq!(set.train.len(), 1);
        assert_eq!(set.train.labels, vec![true]);
        assert_eq!(set.train.ids[0].race_id, 2);
        assert_eq!(set.future.len(), 1);
        assert_eq!(set.future.ids[0].race_id, 3);
        assert_eq!(set.future.features[0].len(), 12);
        // Blind vector starts with Prev_Avg_GridPosition, Prev_Avg_Position
        assert_eq!(set.future.features[0][0], 2.0);
        assert_eq!(set.future.features[0][1], 2.0);

        // Without a grid position the future row cannot be grid-aware
        let set = PredictionSet::select(&table, FeatureSet::GridAware);
        assert_eq!(set.train.len(), 1);
        assert!(set.future.is_empty());
    }

    #[test]
    fn test_split_by_year() {
        let slice = TrainingSlice {
            columns: vec!["x"],
            features: vec![vec![1.0], vec![2.0], vec![3.0]],
            labels: vec![true, false, true],
            ids: vec![
                RaceIdentity { driver: "A".into(), year: 2024, race_id: 1 },
                RaceIdentity { driver: "A".into(), year: 2025, race_id: 1 },
                RaceIdentity { driver: "A".into(), year: 2025, race_id: 2 },
            ],
        };
        let (rest, holdout) = slice.split_by_year(2025);

        assert_eq!(rest.len(), 1);
        assert_eq!(holdout.len(), 2);
        assert_eq!(holdout.winners(), 1);
        assert_eq!(holdout.columns, vec!["x"]);
    }
}
