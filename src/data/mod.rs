//! Race result storage, feature engineering and predictor inputs

pub mod csv_loader;
pub mod feature_set;
pub mod features;
pub mod future;
pub mod purge;
pub mod store;
pub mod window;

// Re-export commonly used types
pub use csv_loader::{
    write_feature_rows, write_feature_table, CsvSeasonLoader, CsvSource, SeasonLoader,
};
pub use feature_set::{
    get_feature_names, FeatureSet, FutureSlice, PredictionSet, TrainingSlice,
    REQUIRED_HISTORY_COLUMNS,
};
pub use features::{
    columns, DerivedFeatures, FeatureRow, FeatureTable, RollingFeatureEngine, DEFAULT_WINDOW_SIZE,
};
pub use future::{grid_positions, FutureRace, FutureRowSynthesizer, NextRaceOverrides};
pub use purge::{NullRowPurge, PurgedTable};
pub use store::RaceTable;
pub use window::{trailing_aggregate, Aggregate, Window};
