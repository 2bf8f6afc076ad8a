//! Two-pass feature pipeline
//!
//! engine pass 1 -> synthesize next race -> engine pass 2 -> purge -> select

use tracing::info;

use crate::config::PipelineConfig;
use crate::data::feature_set::PredictionSet;
use crate::data::features::{FeatureTable, RollingFeatureEngine};
use crate::data::future::{FutureRace, FutureRowSynthesizer, NextRaceOverrides};
use crate::data::purge::{NullRowPurge, PurgedTable};
use crate::data::store::RaceTable;
use crate::error::{PipelineError, Result};
use crate::models::{RaceKey, WinProbability};
use crate::predictor::{rank_winners, WinPredictor};

/// Every stage output of one pipeline run
#[derive(Debug, Clone)]
pub struct PipelineOutput {
    /// Second-pass table with the synthesized next race, or the first pass
    /// alone when the season is complete
    pub engineered: FeatureTable,
    pub purged: PurgedTable,
    pub prediction_set: PredictionSet,
    /// Race the future slice belongs to; `None` once the season is complete
    pub next_race: Option<RaceKey>,
}

pub struct RacePipeline {
    config: PipelineConfig,
    engine: RollingFeatureEngine,
    synthesizer: FutureRowSynthesizer,
}

impl RacePipeline {
    pub fn new(config: PipelineConfig) -> Result<Self> {
        config.validate()?;
        let engine = RollingFeatureEngine::new(config.window_size)?;
        let synthesizer = FutureRowSynthesizer::new(config.season_length)?;
        Ok(Self {
            config,
            engine,
            synthesizer,
        })
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    fn overrides(&self) -> NextRaceOverrides {
        NextRaceOverrides {
            grid: self.config.grid_map(),
            circuit_name: self.config.next_circuit.clone(),
        }
    }

    /// Run every stage up to the predictor inputs
    pub fn prepare(&self, history: &RaceTable) -> Result<PipelineOutput> {
        if history.is_empty() {
            return Err(PipelineError::EmptyTable(
                "no race results to build features from".to_string(),
            ));
        }

        let first_pass = self.engine.run(history);

        let (engineered, future_rows, next_race) =
            match self.synthesizer.synthesize(&first_pass, &self.overrides())? {
                FutureRace::Scheduled(block) => {
                    let next_race = block.first().map(|r| r.race_key());
                    let future_rows = block.len();
                    let extended = history.with_future_race(block)?;
                    (self.engine.run(&extended), future_rows, next_race)
                }
                // History is still usable for evaluation and export
                FutureRace::SeasonComplete(_) => (first_pass, 0, None),
            };

        let purged = NullRowPurge::purge(engineered.clone());
        let prediction_set = PredictionSet::select(&purged, self.config.feature_set);

        info!(
            "Prepared {} training rows and {} of {} next-race rows ({} features)",
            prediction_set.train.len(),
            prediction_set.future.len(),
            future_rows,
            self.config.feature_set
        );

        Ok(PipelineOutput {
            engineered,
            purged,
            prediction_set,
            next_race,
        })
    }

    /// Fit the predictor on history and rank the next race's drivers
    pub fn predict(
        &self,
        history: &RaceTable,
        predictor: &mut dyn WinPredictor,
    ) -> Result<Vec<WinProbability>> {
        let output = self.prepare(history)?;
        if output.next_race.is_none() {
            let (year, race_id) = history.last_race().unwrap_or_default();
            return Err(PipelineError::SeasonComplete {
                year,
                race_id,
                season_length: self.synthesizer.season_length(),
            });
        }
        let set = &output.prediction_set;
        if set.future.is_empty() {
            return Err(PipelineError::Prediction(
                "no driver in the next race has complete history".to_string(),
            ));
        }

        predictor.fit(&set.train)?;
        let probs = predictor.predict_proba(&set.future.features)?;
        rank_winners(&set.future.ids, &probs)
    }
}
