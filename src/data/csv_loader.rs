//! CSV data loading for season results and export of feature tables

use polars::prelude::*;
use std::fs::File;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

use crate::data::features::{columns, FeatureRow, FeatureTable};
use crate::data::store::RaceTable;
use crate::error::{validate_race_number, validate_season, PipelineError, Result};
use crate::models::RaceRecord;

/// Columns every results file must provide
pub const REQUIRED_COLUMNS: [&str; 11] = [
    columns::DRIVER,
    columns::TEAM,
    columns::CIRCUIT_NAME,
    columns::GRID_POSITION,
    columns::POSITION,
    columns::AVG_LAP_TIME,
    columns::STD_LAP_TIME,
    columns::LAPS_COMPLETED,
    columns::IS_DNF,
    columns::RACE_ID,
    columns::YEAR,
];

/// Supplies race results per season or per race
pub trait SeasonLoader {
    /// All championship rounds of a season, in round order
    fn load_season(&self, year: i32) -> Result<RaceTable>;

    /// One round of a season
    fn load_race(&self, year: i32, race: u32) -> Result<RaceTable> {
        let season = self.load_season(year)?;
        let rounds = season.races().last().map(|&(_, r)| r).unwrap_or(0);
        validate_race_number(year, race, rounds)?;

        let rows = season
            .into_rows()
            .into_iter()
            .filter(|r| r.race_id == race)
            .collect();
        RaceTable::new(rows)
    }

    /// Several seasons concatenated chronologically
    fn load_seasons(&self, years: &[i32]) -> Result<RaceTable> {
        let seasons = years
            .iter()
            .map(|&y| self.load_season(y))
            .collect::<Result<Vec<_>>>()?;
        RaceTable::concat(seasons)
    }
}

/// Where the results files live
#[derive(Debug, Clone)]
pub enum CsvSource {
    /// One file holding every season, filtered by `Year`
    Combined(PathBuf),
    /// A directory of `results_<year>.csv` files
    PerSeason(PathBuf),
}

/// Season loader over CSV files written by the results downloader
#[derive(Debug, Clone)]
pub struct CsvSeasonLoader {
    source: CsvSource,
    first_season: i32,
    last_season: i32,
}

impl CsvSeasonLoader {
    pub fn new(source: CsvSource, first_season: i32, last_season: i32) -> Self {
        Self {
            source,
            first_season,
            last_season,
        }
    }

    /// Pick the source layout from the path: directories hold one file per season
    pub fn from_path<P: AsRef<Path>>(path: P, first_season: i32, last_season: i32) -> Self {
        let path = path.as_ref().to_path_buf();
        let source = if path.is_dir() {
            CsvSource::PerSeason(path)
        } else {
            CsvSource::Combined(path)
        };
        Self::new(source, first_season, last_season)
    }

    fn read_season_frame(&self, year: i32) -> Result<DataFrame> {
        match &self.source {
            CsvSource::Combined(path) => {
                let mut lf = LazyCsvReader::new(path).with_has_header(true).finish()?;
                let schema = lf.collect_schema()?;
                check_schema(path, |name| schema.contains(name))?;

                let df = lf.filter(col(columns::YEAR).eq(lit(year as i64))).collect()?;
                Ok(df)
            }
            CsvSource::PerSeason(dir) => {
                let path = dir.join(format!("results_{}.csv", year));
                if !path.exists() {
                    return Err(PipelineError::Config(format!(
                        "No results file for season {} at {:?}",
                        year, path
                    )));
                }
                let df = CsvReadOptions::default()
                    .with_has_header(true)
                    .try_into_reader_with_file_path(Some(path.clone()))?
                    .finish()?;
                check_schema(&path, |name| df.get_column_index(name).is_some())?;
                Ok(df)
            }
        }
    }
}

impl SeasonLoader for CsvSeasonLoader {
    fn load_season(&self, year: i32) -> Result<RaceTable> {
        validate_season(year, self.first_season, self.last_season)?;

        let df = self.read_season_frame(year)?;
        let records = dataframe_to_records(&df)?;
        let total = records.len();

        // Round 0 is pre-season testing
        let records: Vec<RaceRecord> = records
            .into_iter()
            .filter(|r| r.race_id != 0 && r.year == year)
            .collect();
        if records.len() < total {
            debug!("Dropped {} non-championship rows from {}", total - records.len(), year);
        }

        let table = RaceTable::new(records)?;
        info!(
            "Loaded season {}: {} rows over {} races",
            year,
            table.len(),
            table.races().len()
        );
        Ok(table)
    }
}

fn check_schema<F>(path: &Path, has_column: F) -> Result<()>
where
    F: Fn(&str) -> bool,
{
    let missing: Vec<&str> = REQUIRED_COLUMNS
        .iter()
        .copied()
        .filter(|c| !has_column(c))
        .collect();
    if missing.is_empty() {
        Ok(())
    } else {
        Err(PipelineError::Schema(format!(
            "{:?} is missing required columns: {}",
            path,
            missing.join(", ")
        )))
    }
}

fn float_column(df: &DataFrame, name: &str) -> Result<Float64Chunked> {
    let column = df.column(name)?.cast(&DataType::Float64)?;
    Ok(column.f64()?.clone())
}

fn int_column(df: &DataFrame, name: &str) -> Result<Int64Chunked> {
    let column = df.column(name)?.cast(&DataType::Int64)?;
    Ok(column.i64()?.clone())
}

fn str_column(df: &DataFrame, name: &str) -> Result<StringChunked> {
    let column = df.column(name)?.cast(&DataType::String)?;
    Ok(column.str()?.clone())
}

/// Convert a results DataFrame to race records
///
/// Integer-valued measurements may arrive as floats (`1.0`) because the
/// downloader writes missing values as empty cells; both are accepted.
pub fn dataframe_to_records(df: &DataFrame) -> Result<Vec<RaceRecord>> {
    let year_col = int_column(df, columns::YEAR)?;
    let race_col = int_column(df, columns::RACE_ID)?;
    let driver_col = str_column(df, columns::DRIVER)?;
    let team_col = str_column(df, columns::TEAM)?;
    let circuit_col = str_column(df, columns::CIRCUIT_NAME)?;
    let avg_col = float_column(df, columns::AVG_LAP_TIME)?;
    let std_col = float_column(df, columns::STD_LAP_TIME)?;
    let laps_col = float_column(df, columns::LAPS_COMPLETED)?;
    let grid_col = float_column(df, columns::GRID_POSITION)?;
    let pos_col = float_column(df, columns::POSITION)?;
    let dnf_col = float_column(df, columns::IS_DNF)?;

    let mut records = Vec::with_capacity(df.height());
    for i in 0..df.height() {
        let (Some(year), Some(race_id), Some(driver)) =
            (year_col.get(i), race_col.get(i), driver_col.get(i))
        else {
            return Err(PipelineError::Schema(format!(
                "Row {} is missing Year, raceID or Driver",
                i
            )));
        };
        if race_id < 0 {
            return Err(PipelineError::Schema(format!(
                "Row {} has negative raceID {}",
                i, race_id
            )));
        }

        // Team and circuit are grouping keys; a null would merge unrelated rows
        let (Some(team), Some(circuit_name)) = (team_col.get(i), circuit_col.get(i)) else {
            return Err(PipelineError::Schema(format!(
                "Row {} ({} {} round {}) is missing Team or CircuitName",
                i, driver, year, race_id
            )));
        };

        records.push(RaceRecord {
            year: year as i32,
            race_id: race_id as u32,
            driver: driver.to_string(),
            team: team.to_string(),
            circuit_name: circuit_name.to_string(),
            avg_lap_time_s: avg_col.get(i).filter(|v| v.is_finite()),
            std_lap_time_s: std_col.get(i).filter(|v| v.is_finite()),
            laps_completed: laps_col.get(i).and_then(to_count),
            grid_position: grid_col.get(i).and_then(to_count),
            position: pos_col.get(i).and_then(to_count),
            is_dnf: dnf_col.get(i).filter(|v| !v.is_nan()).map(|v| v != 0.0),
            is_prediction_data: false,
        });
    }

    Ok(records)
}

fn to_count(v: f64) -> Option<u32> {
    v.is_finite().then(|| v.round().max(0.0) as u32)
}

/// Build a DataFrame holding identity, raw and engineered columns
pub fn feature_rows_to_dataframe(rows: &[FeatureRow]) -> Result<DataFrame> {
    let numeric = |name: &str| -> Vec<Option<f64>> { rows.iter().map(|r| r.value(name)).collect() };

    let mut frame_columns: Vec<Column> = vec![
        Column::new(
            columns::YEAR.into(),
            rows.iter().map(|r| r.record.year).collect::<Vec<i32>>(),
        ),
        Column::new(
            columns::RACE_ID.into(),
            rows.iter().map(|r| r.record.race_id).collect::<Vec<u32>>(),
        ),
        Column::new(
            columns::DRIVER.into(),
            rows.iter().map(|r| r.record.driver.as_str()).collect::<Vec<&str>>(),
        ),
        Column::new(
            columns::TEAM.into(),
            rows.iter().map(|r| r.record.team.as_str()).collect::<Vec<&str>>(),
        ),
        Column::new(
            columns::CIRCUIT_NAME.into(),
            rows.iter()
                .map(|r| r.record.circuit_name.as_str())
                .collect::<Vec<&str>>(),
        ),
    ];

    for name in EXPORTED_NUMERIC_COLUMNS {
        frame_columns.push(Column::new(name.into(), numeric(name)));
    }

    frame_columns.push(Column::new(
        columns::IS_PREDICTION_DATA.into(),
        rows.iter().map(|r| r.is_prediction_data()).collect::<Vec<bool>>(),
    ));
    frame_columns.push(Column::new(
        columns::WINNER.into(),
        rows.iter()
            .map(|r| r.record.winner())
            .collect::<Vec<Option<bool>>>(),
    ));

    Ok(DataFrame::new(frame_columns)?)
}

const EXPORTED_NUMERIC_COLUMNS: [&str; 24] = [
    columns::AVG_LAP_TIME,
    columns::STD_LAP_TIME,
    columns::LAPS_COMPLETED,
    columns::GRID_POSITION,
    columns::POSITION,
    columns::IS_DNF,
    columns::PER_RACE_MIN_AVG_LAP_TIME,
    columns::AVG_LAP_TIME_NORM,
    columns::STD_LAP_TIME_NORM,
    columns::PREV_AVG_AVG_LAP_TIME_NORM,
    columns::ROLLING_PREV_AVG_AVG_LAP_TIME_NORM,
    columns::PREV_AVG_STD_LAP_TIME_NORM,
    columns::ROLLING_PREV_AVG_STD_LAP_TIME_NORM,
    columns::PREV_AVG_GRID_POSITION,
    columns::ROLLING_PREV_AVG_GRID_POSITION,
    columns::PREV_AVG_POSITION,
    columns::ROLLING_PREV_AVG_POSITION,
    columns::PREV_AVG_FINISH_TRACK,
    columns::ROLLING_PREV_AVG_FINISH_TRACK,
    columns::ROLLING_PREV_AVG_TEAM_PACE,
    columns::PER_RACE_TEAM_AVG_POS,
    columns::ROLLING_PREV_AVG_TEAM_FINAL_POS,
    columns::ROLLING_PREV_DNF_STATUS,
    columns::BAD_RESULT,
];

/// Write an engineered table to CSV
pub fn write_feature_table<P: AsRef<Path>>(path: P, table: &FeatureTable) -> Result<()> {
    write_feature_rows(path, table.rows())
}

/// Write any slice of engineered rows, such as a purged table, to CSV
pub fn write_feature_rows<P: AsRef<Path>>(path: P, rows: &[FeatureRow]) -> Result<()> {
    let mut df = feature_rows_to_dataframe(rows)?;
    let mut file = File::create(path.as_ref())?;
    CsvWriter::new(&mut file)
        .include_header(true)
        .finish(&mut df)?;
    info!("Wrote {} feature rows to {:?}", df.height(), path.as_ref());
    Ok(())
}
