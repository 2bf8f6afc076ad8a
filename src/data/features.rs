//! Rolling Feature Engineering
//!
//! Historical per-driver, per-team and per-circuit statistics. Every feature
//! for a race is computed from strictly earlier races of the same group.

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::data::store::RaceTable;
use crate::data::window::{
    group_transform, mean_of, min_of, trailing_aggregate, Aggregate, Window,
};
use crate::error::{validate_window_size, Result};
use crate::models::RaceRecord;

/// Default number of prior races in a rolling window
pub const DEFAULT_WINDOW_SIZE: usize = 5;

/// Position above which a finish counts as a bad result
const BAD_RESULT_THRESHOLD: u32 = 10;

/// Column names as they appear in exported tables and feature sets
pub mod columns {
    pub const YEAR: &str = "Year";
    pub const RACE_ID: &str = "raceID";
    pub const DRIVER: &str = "Driver";
    pub const TEAM: &str = "Team";
    pub const CIRCUIT_NAME: &str = "CircuitName";
    pub const AVG_LAP_TIME: &str = "avgLapTime_s";
    pub const STD_LAP_TIME: &str = "stdLapTime_s";
    pub const LAPS_COMPLETED: &str = "lapsCompleted";
    pub const GRID_POSITION: &str = "GridPosition";
    pub const POSITION: &str = "Position";
    pub const IS_DNF: &str = "isDNF";
    pub const IS_PREDICTION_DATA: &str = "isPredictionData";
    pub const WINNER: &str = "Winner";

    pub const PER_RACE_MIN_AVG_LAP_TIME: &str = "perRaceMinAvgLapTime";
    pub const AVG_LAP_TIME_NORM: &str = "avgLapTime_s_norm";
    pub const STD_LAP_TIME_NORM: &str = "stdLapTime_s_norm";
    pub const PREV_AVG_AVG_LAP_TIME_NORM: &str = "Prev_Avg_avgLapTime_s_norm";
    pub const ROLLING_PREV_AVG_AVG_LAP_TIME_NORM: &str = "Rolling_Prev_Avg_avgLapTime_s_norm";
    pub const PREV_AVG_STD_LAP_TIME_NORM: &str = "Prev_Avg_stdLapTime_s_norm";
    pub const ROLLING_PREV_AVG_STD_LAP_TIME_NORM: &str = "Rolling_Prev_Avg_stdLapTime_s_norm";
    pub const PREV_AVG_GRID_POSITION: &str = "Prev_Avg_GridPosition";
    pub const ROLLING_PREV_AVG_GRID_POSITION: &str = "Rolling_Prev_Avg_GridPosition";
    pub const PREV_AVG_POSITION: &str = "Prev_Avg_Position";
    pub const ROLLING_PREV_AVG_POSITION: &str = "Rolling_Prev_Avg_Position";
    pub const PREV_AVG_FINISH_TRACK: &str = "Prev_Avg_Finish_Track";
    pub const ROLLING_PREV_AVG_FINISH_TRACK: &str = "Rolling_Prev_Avg_Finish_Track";
    pub const ROLLING_PREV_AVG_TEAM_PACE: &str = "Rolling_Prev_Avg_TeamPace";
    pub const PER_RACE_TEAM_AVG_POS: &str = "perRace_Team_Avg_Pos";
    pub const ROLLING_PREV_AVG_TEAM_FINAL_POS: &str = "Rolling_Prev_Avg_TeamFinalPos";
    pub const ROLLING_PREV_DNF_STATUS: &str = "Rolling_Prev_DNF_Status";
    pub const BAD_RESULT: &str = "BadResult";
}

/// Columns computed by the engine for one row
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct DerivedFeatures {
    // Same-race normalization
    pub per_race_min_avg_lap_time: Option<f64>,
    pub avg_lap_time_s_norm: Option<f64>,
    pub std_lap_time_s_norm: Option<f64>,
    // Driver history
    pub prev_avg_avg_lap_time_s_norm: Option<f64>,
    pub rolling_prev_avg_avg_lap_time_s_norm: Option<f64>,
    pub prev_avg_std_lap_time_s_norm: Option<f64>,
    pub rolling_prev_avg_std_lap_time_s_norm: Option<f64>,
    pub prev_avg_grid_position: Option<f64>,
    pub rolling_prev_avg_grid_position: Option<f64>,
    pub prev_avg_position: Option<f64>,
    pub rolling_prev_avg_position: Option<f64>,
    // Driver history at this circuit
    pub prev_avg_finish_track: Option<f64>,
    pub rolling_prev_avg_finish_track: Option<f64>,
    // Team trends
    pub rolling_prev_avg_team_pace: Option<f64>,
    pub per_race_team_avg_pos: Option<f64>,
    pub rolling_prev_avg_team_final_pos: Option<f64>,
    // Reliability
    pub rolling_prev_dnf_status: f64,
    pub bad_result: Option<bool>,
}

/// A race record together with its engineered columns
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeatureRow {
    pub record: RaceRecord,
    pub derived: DerivedFeatures,
}

impl FeatureRow {
    /// Look up a numeric column by name
    ///
    /// Returns `None` both for unknown names and for null values.
    pub fn value(&self, column: &str) -> Option<f64> {
        let r = &self.record;
        let d = &self.derived;
        match column {
            columns::YEAR => Some(r.year as f64),
            columns::RACE_ID => Some(r.race_id as f64),
            columns::AVG_LAP_TIME => r.avg_lap_time_s,
            columns::STD_LAP_TIME => r.std_lap_time_s,
            columns::LAPS_COMPLETED => r.laps_completed.map(f64::from),
            columns::GRID_POSITION => r.grid_position.map(f64::from),
            columns::POSITION => r.position.map(f64::from),
            columns::IS_DNF => r.is_dnf.map(bool_to_f64),
            columns::PER_RACE_MIN_AVG_LAP_TIME => d.per_race_min_avg_lap_time,
            columns::AVG_LAP_TIME_NORM => d.avg_lap_time_s_norm,
            columns::STD_LAP_TIME_NORM => d.std_lap_time_s_norm,
            columns::PREV_AVG_AVG_LAP_TIME_NORM => d.prev_avg_avg_lap_time_s_norm,
            columns::ROLLING_PREV_AVG_AVG_LAP_TIME_NORM => d.rolling_prev_avg_avg_lap_time_s_norm,
            columns::PREV_AVG_STD_LAP_TIME_NORM => d.prev_avg_std_lap_time_s_norm,
            columns::ROLLING_PREV_AVG_STD_LAP_TIME_NORM => d.rolling_prev_avg_std_lap_time_s_norm,
            columns::PREV_AVG_GRID_POSITION => d.prev_avg_grid_position,
            columns::ROLLING_PREV_AVG_GRID_POSITION => d.rolling_prev_avg_grid_position,
            columns::PREV_AVG_POSITION => d.prev_avg_position,
            columns::ROLLING_PREV_AVG_POSITION => d.rolling_prev_avg_position,
            columns::PREV_AVG_FINISH_TRACK => d.prev_avg_finish_track,
            columns::ROLLING_PREV_AVG_FINISH_TRACK => d.rolling_prev_avg_finish_track,
            columns::ROLLING_PREV_AVG_TEAM_PACE => d.rolling_prev_avg_team_pace,
            columns::PER_RACE_TEAM_AVG_POS => d.per_race_team_avg_pos,
            columns::ROLLING_PREV_AVG_TEAM_FINAL_POS => d.rolling_prev_avg_team_final_pos,
            columns::ROLLING_PREV_DNF_STATUS => Some(d.rolling_prev_dnf_status),
            columns::BAD_RESULT => d.bad_result.map(bool_to_f64),
            _ => None,
        }
    }

    pub fn is_prediction_data(&self) -> bool {
        self.record.is_prediction_data
    }
}

/// Output of one engine pass
///
/// Only [`RollingFeatureEngine::run`] builds one, so holding a `FeatureTable`
/// means every derived column has been computed over the whole table.
#[derive(Debug, Clone, PartialEq)]
pub struct FeatureTable {
    rows: Vec<FeatureRow>,
    window_size: usize,
}

impl FeatureTable {
    pub fn rows(&self) -> &[FeatureRow] {
        &self.rows
    }

    pub fn into_rows(self) -> Vec<FeatureRow> {
        self.rows
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn window_size(&self) -> usize {
        self.window_size
    }

    /// The raw records underneath, for re-running the engine
    pub fn base_table(&self) -> RaceTable {
        // Rows came out of a validated RaceTable in the same order
        let rows = self.rows.iter().map(|r| r.record.clone()).collect();
        RaceTable::from_validated(rows)
    }
}

/// Computes all historical features over a chronologically ordered table
#[derive(Debug, Clone)]
pub struct RollingFeatureEngine {
    window_size: usize,
}

impl Default for RollingFeatureEngine {
    fn default() -> Self {
        Self {
            window_size: DEFAULT_WINDOW_SIZE,
        }
    }
}

impl RollingFeatureEngine {
    pub fn new(window_size: usize) -> Result<Self> {
        validate_window_size(window_size)?;
        Ok(Self { window_size })
    }

    pub fn window_size(&self) -> usize {
        self.window_size
    }

    /// Compute every derived column from the raw base columns
    ///
    /// Derived values already present on the input are ignored, so running
    /// the engine on its own output gives the same result.
    pub fn run(&self, table: &RaceTable) -> FeatureTable {
        let rows = table.rows();
        let rolling = Window::Trailing(self.window_size);

        // Grouping keys
        let race_keys: Vec<(i32, u32)> = rows.iter().map(|r| r.race_key()).collect();
        let driver_keys: Vec<&str> = rows.iter().map(|r| r.driver.as_str()).collect();
        let team_keys: Vec<&str> = rows.iter().map(|r| r.team.as_str()).collect();
        let track_keys: Vec<(&str, &str)> = rows
            .iter()
            .map(|r| (r.driver.as_str(), r.circuit_name.as_str()))
            .collect();
        let race_team_keys: Vec<(i32, u32, &str)> = rows
            .iter()
            .map(|r| (r.year, r.race_id, r.team.as_str()))
            .collect();

        // Per-race lap time normalization
        let avg_lap: Vec<Option<f64>> = rows.iter().map(|r| r.avg_lap_time_s).collect();
        let race_min = group_transform(&avg_lap, &race_keys, min_of);
        let avg_norm: Vec<Option<f64>> = rows
            .iter()
            .zip(&race_min)
            .map(|(r, min)| match (r.avg_lap_time_s, *min) {
                (Some(t), Some(m)) => Some((t - m) / m),
                _ => None,
            })
            .collect();
        let std_norm: Vec<Option<f64>> = rows
            .iter()
            .zip(&race_min)
            .map(|(r, min)| match (r.std_lap_time_s, *min) {
                (Some(s), Some(m)) => Some(s / m),
                _ => None,
            })
            .collect();

        let grid: Vec<Option<f64>> = rows.iter().map(|r| r.grid_position.map(f64::from)).collect();
        let position: Vec<Option<f64>> = rows.iter().map(|r| r.position.map(f64::from)).collect();
        let dnf: Vec<Option<f64>> = rows.iter().map(|r| r.is_dnf.map(bool_to_f64)).collect();

        // Driver history
        let driver_mean = |values: &[Option<f64>], window| {
            trailing_aggregate(values, &driver_keys, &race_keys, Aggregate::Mean, window)
        };
        let prev_avg_norm = driver_mean(&avg_norm, Window::Expanding);
        let rolling_avg_norm = driver_mean(&avg_norm, rolling);
        let prev_std_norm = driver_mean(&std_norm, Window::Expanding);
        let rolling_std_norm = driver_mean(&std_norm, rolling);
        let prev_grid = driver_mean(&grid, Window::Expanding);
        let rolling_grid = driver_mean(&grid, rolling);
        let prev_pos = driver_mean(&position, Window::Expanding);
        let rolling_pos = driver_mean(&position, rolling);

        // Driver history at the circuit
        let track_mean = |window| {
            trailing_aggregate(&position, &track_keys, &race_keys, Aggregate::Mean, window)
        };
        let prev_track = track_mean(Window::Expanding);
        let rolling_track = track_mean(rolling);

        // Team trends
        let team_pace =
            trailing_aggregate(&avg_norm, &team_keys, &race_keys, Aggregate::Mean, rolling);
        let team_avg_pos = group_transform(&position, &race_team_keys, mean_of);
        let team_final_pos =
            trailing_aggregate(&team_avg_pos, &team_keys, &race_keys, Aggregate::Mean, rolling);

        // Reliability
        let dnf_status =
            trailing_aggregate(&dnf, &driver_keys, &race_keys, Aggregate::Sum, rolling);

        let features: Vec<FeatureRow> = rows
            .iter()
            .enumerate()
            .map(|(i, r)| FeatureRow {
                record: r.clone(),
                derived: DerivedFeatures {
                    per_race_min_avg_lap_time: race_min[i],
                    avg_lap_time_s_norm: avg_norm[i],
                    std_lap_time_s_norm: std_norm[i],
                    prev_avg_avg_lap_time_s_norm: prev_avg_norm[i],
                    rolling_prev_avg_avg_lap_time_s_norm: rolling_avg_norm[i],
                    prev_avg_std_lap_time_s_norm: prev_std_norm[i],
                    rolling_prev_avg_std_lap_time_s_norm: rolling_std_norm[i],
                    prev_avg_grid_position: prev_grid[i],
                    rolling_prev_avg_grid_position: rolling_grid[i],
                    prev_avg_position: prev_pos[i],
                    rolling_prev_avg_position: rolling_pos[i],
                    prev_avg_finish_track: prev_track[i],
                    rolling_prev_avg_finish_track: rolling_track[i],
                    rolling_prev_avg_team_pace: team_pace[i],
                    per_race_team_avg_pos: team_avg_pos[i],
                    rolling_prev_avg_team_final_pos: team_final_pos[i],
                    // No DNFs on record counts as none observed
                    rolling_prev_dnf_status: dnf_status[i].unwrap_or(0.0),
                    bad_result: r.position.map(|p| p > BAD_RESULT_THRESHOLD),
                },
            })
            .collect();

        debug!(
            "Engineered {} rows over {} races (window {})",
            features.len(),
            table.races().len(),
            self.window_size
        );

        FeatureTable {
            rows: features,
            window_size: self.window_size,
        }
    }
}

fn bool_to_f64(b: bool) -> f64 {
    if b {
        1.0
    } else {
        0.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::store::tests::row;

    fn engineered(rows: Vec<RaceRecord>) -> FeatureTable {
        let table = RaceTable::new(rows).unwrap();
        RollingFeatureEngine::default().run(&table)
    }

    fn driver_rows<'a>(table: &'a FeatureTable, driver: &str) -> Vec<&'a FeatureRow> {
        table
            .rows()
            .iter()
            .filter(|r| r.record.driver == driver)
            .collect()
    }

    #[test]
    fn test_prev_avg_position_example() {
        let table = engineered(vec![
            row(2024, 1, "VER", "Red Bull", 1),
            row(2024, 2, "VER", "Red Bull", 3),
            row(2024, 3, "VER", "Red Bull", 2),
        ]);

        let prev: Vec<Option<f64>> = table.rows().iter().map(|r| r.derived.prev_avg_position).collect();
        let rolling: Vec<Option<f64>> = table
            .rows()
            .iter()
            .map(|r| r.derived.rolling_prev_avg_position)
            .collect();

        assert_eq!(prev, vec![None, Some(1.0), Some(2.0)]);
        assert_eq!(rolling, vec![None, Some(1.0), Some(2.0)]);
    }

    #[test]
    fn test_rolling_uses_at_most_window_races() {
        let positions = [20, 1, 1, 1, 1, 1, 1];
        let rows = positions
            .iter()
            .enumerate()
            .map(|(i, &p)| row(2024, i as u32 + 1, "ALO", "Aston Martin", p))
            .collect();
        let table = engineered(rows);
        let last = &table.rows()[6].derived;

        // Expanding still remembers the 20th place, the 5-race window does not
        assert!((last.prev_avg_position.unwrap() - 25.0 / 6.0).abs() < 1e-12);
        assert!((last.rolling_prev_avg_position.unwrap() - 1.0).abs() < 1e-12);
    }

    #[test]
    fn test_history_spans_seasons() {
        let table = engineered(vec![
            row(2023, 22, "HAM", "Mercedes", 4),
            row(2024, 1, "HAM", "Mercedes", 6),
        ]);
        assert_eq!(table.rows()[1].derived.prev_avg_position, Some(4.0));
    }

    #[test]
    fn test_per_race_normalization() {
        let mut a = row(2024, 1, "VER", "Red Bull", 1);
        a.avg_lap_time_s = Some(90.0);
        a.std_lap_time_s = Some(1.8);
        let mut b = row(2024, 1, "SAR", "Williams", 18);
        b.avg_lap_time_s = Some(94.5);
        b.std_lap_time_s = None;

        let table = engineered(vec![a, b]);
        let ver = &table.rows()[0].derived;
        let sar = &table.rows()[1].derived;

        assert_eq!(ver.per_race_min_avg_lap_time, Some(90.0));
        assert!((ver.avg_lap_time_s_norm.unwrap() - 0.0).abs() < 1e-12);
        assert!((ver.std_lap_time_s_norm.unwrap() - 0.02).abs() < 1e-12);
        assert!((sar.avg_lap_time_s_norm.unwrap() - 0.05).abs() < 1e-12);
        assert_eq!(sar.std_lap_time_s_norm, None);
    }

    #[test]
    fn test_team_average_position_example() {
        let table = engineered(vec![
            row(2024, 1, "NOR", "McLaren", 2),
            row(2024, 1, "PIA", "McLaren", 4),
            row(2024, 1, "LEC", "Ferrari", 1),
        ]);

        for r in driver_rows(&table, "NOR").iter().chain(driver_rows(&table, "PIA").iter()) {
            assert_eq!(r.derived.per_race_team_avg_pos, Some(3.0));
        }
        assert_eq!(driver_rows(&table, "LEC")[0].derived.per_race_team_avg_pos, Some(1.0));
    }

    #[test]
    fn test_team_final_pos_trend_excludes_current_race() {
        let table = engineered(vec![
            row(2024, 1, "NOR", "McLaren", 2),
            row(2024, 1, "PIA", "McLaren", 4),
            row(2024, 2, "NOR", "McLaren", 1),
            row(2024, 2, "PIA", "McLaren", 1),
        ]);

        // Neither race-1 row sees its teammate's same-race result
        assert_eq!(table.rows()[0].derived.rolling_prev_avg_team_final_pos, None);
        assert_eq!(table.rows()[1].derived.rolling_prev_avg_team_final_pos, None);
        assert_eq!(table.rows()[1].derived.rolling_prev_avg_team_pace, None);
        // Race-2 rows see the race-1 team average only
        assert_eq!(table.rows()[2].derived.rolling_prev_avg_team_final_pos, Some(3.0));
        assert_eq!(table.rows()[3].derived.rolling_prev_avg_team_final_pos, Some(3.0));
    }

    #[test]
    fn test_team_pace_averages_teammates_per_race() {
        // LEC and SAI at Ferrari; ALB sets the per-race minimum of 100.0
        let laps = [
            (1, Some(101.0), Some(103.0)),
            (2, Some(104.0), None),
            (3, Some(101.0), Some(105.0)),
        ];
        let mut rows = Vec::new();
        for (race, lec, sai) in laps {
            for (driver, team, lap) in [
                ("ALB", "Williams", Some(100.0)),
                ("LEC", "Ferrari", lec),
                ("SAI", "Ferrari", sai),
            ] {
                let mut r = row(2024, race, driver, team, 5);
                r.avg_lap_time_s = lap;
                rows.push(r);
            }
        }
        let table = engineered(rows);
        let pace = |driver: &str| -> Vec<Option<f64>> {
            driver_rows(&table, driver)
                .iter()
                .map(|r| r.derived.rolling_prev_avg_team_pace)
                .collect()
        };

        // Race 1 norms 0.01 and 0.03 fold to 0.02; race 2 is LEC's 0.04 alone
        for driver in ["LEC", "SAI"] {
            let p = pace(driver);
            assert_eq!(p[0], None);
            assert!((p[1].unwrap() - 0.02).abs() < 1e-12);
            assert!((p[2].unwrap() - 0.03).abs() < 1e-12);
        }
        assert_eq!(driver_rows(&table, "SAI")[1].derived.avg_lap_time_s_norm, None);

        let williams = pace("ALB");
        assert_eq!(williams[0], None);
        assert_eq!(williams[1], Some(0.0));
        assert_eq!(williams[2], Some(0.0));
    }

    #[test]
    fn test_track_history_grouped_by_circuit() {
        let mut r1 = row(2023, 1, "RUS", "Mercedes", 5);
        r1.circuit_name = "Bahrain Grand Prix".to_string();
        let mut r2 = row(2023, 2, "RUS", "Mercedes", 2);
        r2.circuit_name = "Saudi Arabian Grand Prix".to_string();
        let mut r3 = row(2024, 1, "RUS", "Mercedes", 3);
        r3.circuit_name = "Bahrain Grand Prix".to_string();

        let table = engineered(vec![r1, r2, r3]);
        assert_eq!(table.rows()[1].derived.prev_avg_finish_track, None);
        assert_eq!(table.rows()[2].derived.prev_avg_finish_track, Some(5.0));
        assert_eq!(table.rows()[2].derived.rolling_prev_avg_finish_track, Some(5.0));
    }

    #[test]
    fn test_dnf_status_never_null() {
        let mut rows: Vec<RaceRecord> = (1..=7)
            .map(|i| row(2024, i, "STR", "Aston Martin", 12))
            .collect();
        rows[0].is_dnf = Some(true);
        rows[2].is_dnf = Some(true);
        rows[3].is_dnf = None;

        let table = engineered(rows);
        let dnf: Vec<f64> = table
            .rows()
            .iter()
            .map(|r| r.derived.rolling_prev_dnf_status)
            .collect();
        assert_eq!(dnf, vec![0.0, 1.0, 1.0, 2.0, 2.0, 2.0, 1.0]);
    }

    #[test]
    fn test_bad_result_label() {
        let mut unknown = row(2024, 2, "BOT", "Sauber", 11);
        unknown.position = None;
        let table = engineered(vec![
            row(2024, 1, "BOT", "Sauber", 11),
            row(2024, 1, "ZHO", "Sauber", 10),
            unknown,
        ]);

        assert_eq!(table.rows()[0].derived.bad_result, Some(true));
        assert_eq!(table.rows()[1].derived.bad_result, Some(false));
        assert_eq!(table.rows()[2].derived.bad_result, None);
    }

    #[test]
    fn test_engine_is_idempotent() {
        let first = engineered(vec![
            row(2024, 1, "VER", "Red Bull", 1),
            row(2024, 1, "PER", "Red Bull", 5),
            row(2024, 2, "VER", "Red Bull", 2),
            row(2024, 2, "PER", "Red Bull", 11),
            row(2024, 3, "VER", "Red Bull", 1),
        ]);
        let second = RollingFeatureEngine::default().run(&first.base_table());
        assert_eq!(first, second);
    }

    #[test]
    fn test_value_lookup_by_column_name() {
        let table = engineered(vec![
            row(2024, 1, "GAS", "Alpine", 9),
            row(2024, 2, "GAS", "Alpine", 7),
        ]);
        let r = &table.rows()[1];

        assert_eq!(r.value(columns::PREV_AVG_POSITION), Some(9.0));
        assert_eq!(r.value(columns::GRID_POSITION), Some(7.0));
        assert_eq!(r.value(columns::ROLLING_PREV_DNF_STATUS), Some(0.0));
        assert_eq!(r.value("not_a_column"), None);
    }

    #[test]
    fn test_window_size_validation() {
        assert!(RollingFeatureEngine::new(0).is_err());
        assert_eq!(RollingFeatureEngine::new(3).unwrap().window_size(), 3);
    }
}
