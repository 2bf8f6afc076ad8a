use serde::{Deserialize, Serialize};

/// Race key for ordering and grouping: (Year, raceID)
pub type RaceKey = (i32, u32);

/// One driver's result in one race
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RaceRecord {
    pub year: i32,
    /// Season-relative round number
    pub race_id: u32,
    /// Stable three-letter driver code
    pub driver: String,
    pub team: String,
    pub circuit_name: String,
    pub avg_lap_time_s: Option<f64>,
    pub std_lap_time_s: Option<f64>,
    pub laps_completed: Option<u32>,
    pub grid_position: Option<u32>,
    pub position: Option<u32>,
    pub is_dnf: Option<bool>,
    /// Set only on rows of a synthesized next race
    #[serde(default)]
    pub is_prediction_data: bool,
}

impl RaceRecord {
    pub fn race_key(&self) -> RaceKey {
        (self.year, self.race_id)
    }

    /// `Winner` column: `None` while the position is unknown
    pub fn winner(&self) -> Option<bool> {
        self.position.map(|p| p == 1)
    }

    /// Training label; an unknown position is not a win
    pub fn is_winner(&self) -> bool {
        self.winner().unwrap_or(false)
    }

    pub fn identity(&self) -> RaceIdentity {
        RaceIdentity {
            driver: self.driver.clone(),
            year: self.year,
            race_id: self.race_id,
        }
    }
}

/// Identity columns handed to the predictor alongside each feature slice
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RaceIdentity {
    pub driver: String,
    pub year: i32,
    pub race_id: u32,
}

/// Estimated probability of a driver winning a race
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WinProbability {
    pub driver: String,
    pub year: i32,
    pub race_id: u32,
    pub probability: f64,
}

impl WinProbability {
    /// Probability formatted as a percentage, e.g. "41.27%"
    pub fn percent(&self) -> String {
        format!("{:.2}%", self.probability * 100.0)
    }
}
