//! F1 Predictor - next-race winner prediction from race history
//!
//! This library provides:
//! - Per-driver, per-team and per-circuit rolling features that only ever see
//!   earlier races
//! - Synthesis of the next race so it can be featurized like any other
//! - Null purge and feature selection for blind or grid-aware prediction
//! - A baseline winner classifier and holdout classification report
//!
//! # Example
//!
//! ```no_run
//! use f1_predictor::config::PipelineConfig;
//! use f1_predictor::data::{CsvSeasonLoader, SeasonLoader};
//! use f1_predictor::pipeline::RacePipeline;
//! use f1_predictor::predictor::LogisticPredictor;
//!
//! let config = PipelineConfig::default();
//! let loader = CsvSeasonLoader::from_path("data/results.csv", config.first_season, config.last_season);
//! let history = loader.load_seasons(&[2024, 2025]).unwrap();
//!
//! let pipeline = RacePipeline::new(config).unwrap();
//! let mut predictor = LogisticPredictor::new();
//! for w in pipeline.predict(&history, &mut predictor).unwrap() {
//!     println!("{} {}", w.driver, w.percent());
//! }
//! ```

pub mod config;
pub mod data;
pub mod error;
pub mod evaluation;
pub mod models;
pub mod pipeline;
pub mod predictor;

// Re-export commonly used types
pub use config::PipelineConfig;
pub use data::{FeatureSet, FeatureTable, PredictionSet, PurgedTable, RaceTable};
pub use error::{PipelineError, Result};
pub use evaluation::{holdout_report, ClassificationReport};
pub use models::{RaceIdentity, RaceRecord, WinProbability};
pub use pipeline::{PipelineOutput, RacePipeline};
pub use predictor::{rank_winners, LogisticPredictor, WinPredictor};
