//! F1 Predictor CLI - next-race winner prediction from season results

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use colored::Colorize;
use indicatif::{ProgressBar, ProgressStyle};
use std::path::{Path, PathBuf};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

use f1_predictor::config::PipelineConfig;
use f1_predictor::data::{
    write_feature_rows, write_feature_table, CsvSeasonLoader, FeatureSet, RaceTable, SeasonLoader,
};
use f1_predictor::evaluation::holdout_report;
use f1_predictor::pipeline::RacePipeline;
use f1_predictor::predictor::LogisticPredictor;
use f1_predictor::WinProbability;

/// Default results location (relative to project root)
const DEFAULT_RESULTS: &str = "data/results";
const DEFAULT_YEARS: [i32; 4] = [2022, 2023, 2024, 2025];

#[derive(Parser)]
#[command(name = "f1-predictor")]
#[command(author, version, about = "F1 next-race winner prediction CLI", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Pipeline config file (TOML)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Combined results CSV, or a directory of results_<year>.csv files
    #[arg(long, global = true, default_value = DEFAULT_RESULTS)]
    results: PathBuf,

    /// Seasons to load, comma separated
    #[arg(long, global = true, value_delimiter = ',')]
    years: Vec<i32>,

    /// More log output (-v debug, -vv trace)
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    verbose: u8,
}

#[derive(Subcommand)]
enum Commands {
    /// Rank the drivers of the next race by win probability
    Predict {
        /// Use the configured starting grid as a feature
        #[arg(long)]
        grid: bool,

        /// Number of drivers to show
        #[arg(long, default_value = "10")]
        top: usize,

        /// Print the full ranking as JSON
        #[arg(long)]
        json: bool,
    },

    /// Export the engineered feature table to CSV
    Features {
        /// Output CSV path
        #[arg(short, long)]
        output: PathBuf,

        /// Only rows with complete history
        #[arg(long)]
        purged: bool,
    },

    /// Train on all but one season and report on the held-out season
    Report {
        /// Season to hold out (default: last loaded season)
        #[arg(long)]
        holdout_year: Option<i32>,
    },

    /// Check config and results files without predicting
    Validate,
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose)?;

    let mut config = match &cli.config {
        Some(path) => PipelineConfig::load(path)
            .with_context(|| format!("Failed to load config from {:?}", path))?,
        None => PipelineConfig::default(),
    };

    let years = if cli.years.is_empty() {
        DEFAULT_YEARS.to_vec()
    } else {
        cli.years.clone()
    };
    config
        .check_seasons(&years)
        .context("Requested seasons are outside the configured range")?;

    if let Commands::Predict { grid: true, .. } = cli.command {
        config.feature_set = FeatureSet::GridAware;
        config.validate().context("Invalid grid-aware configuration")?;
    }

    let json_output = matches!(cli.command, Commands::Predict { json: true, .. });
    if !json_output {
        println!("{}", "F1 Predictor CLI v0.1.0".cyan().bold());
        println!();
    }

    let history = load_history(&cli.results, &years, &config, !json_output)?;

    match cli.command {
        Commands::Predict { top, json, .. } => run_predict(&history, config, top, json)?,
        Commands::Features { output, purged } => run_features(&history, config, &output, purged)?,
        Commands::Report { holdout_year } => run_report(&history, config, holdout_year, &years)?,
        Commands::Validate => run_validate(&history, config)?,
    }

    Ok(())
}

fn init_logging(verbose: u8) -> Result<()> {
    let default_level = match verbose {
        0 => "warn",
        1 => "debug",
        _ => "trace",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    let subscriber = FmtSubscriber::builder()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .finish();
    tracing::subscriber::set_global_default(subscriber).context("Failed to set subscriber")?;
    Ok(())
}

fn load_history(
    results: &Path,
    years: &[i32],
    config: &PipelineConfig,
    show_progress: bool,
) -> Result<RaceTable> {
    let pb = if show_progress {
        ProgressBar::new_spinner()
    } else {
        ProgressBar::hidden()
    };
    pb.set_style(ProgressStyle::default_spinner().template("{spinner:.green} {msg}")?);
    pb.set_message(format!("Loading seasons {:?}...", years));

    let loader = CsvSeasonLoader::from_path(results, config.first_season, config.last_season);
    let history = loader
        .load_seasons(years)
        .with_context(|| format!("Failed to load results from {:?}", results))?;

    pb.finish_and_clear();

    if history.is_empty() {
        bail!("No race results found in {:?} for {:?}", results, years);
    }
    Ok(history)
}

fn run_predict(history: &RaceTable, config: PipelineConfig, top: usize, json: bool) -> Result<()> {
    let feature_set = config.feature_set;
    let pipeline = RacePipeline::new(config)?;
    let mut predictor = LogisticPredictor::new();
    let ranking = pipeline
        .predict(history, &mut predictor)
        .context("Prediction failed")?;

    if json {
        println!("{}", serde_json::to_string_pretty(&ranking)?);
        return Ok(());
    }

    let (year, race_id) = ranking
        .first()
        .map(|w| (w.year, w.race_id))
        .unwrap_or_default();
    println!(
        "{}: {} round {} ({})",
        "Predicting".green(),
        year,
        race_id,
        feature_set
    );
    println!();
    print_ranking(&ranking, top);
    Ok(())
}

fn print_ranking(ranking: &[WinProbability], top: usize) {
    println!("{}", "Win probabilities:".yellow().bold());
    println!("{:>4} {:<8} {:>12}", "#", "Driver", "Probability");
    println!("{}", "-".repeat(26));

    for (i, w) in ranking.iter().take(top).enumerate() {
        let line = format!("{:>4} {:<8} {:>12}", i + 1, w.driver, w.percent());
        if i == 0 {
            println!("{}", line.green().bold());
        } else {
            println!("{}", line);
        }
    }

    if ranking.len() > top {
        println!("{}", format!("... and {} more", ranking.len() - top).dimmed());
    }
}

fn run_features(
    history: &RaceTable,
    config: PipelineConfig,
    output: &Path,
    purged: bool,
) -> Result<()> {
    let pipeline = RacePipeline::new(config)?;
    let prepared = pipeline.prepare(history)?;

    let written = if purged {
        write_feature_rows(output, prepared.purged.rows())
    } else {
        write_feature_table(output, &prepared.engineered)
    };
    written.with_context(|| format!("Failed to write features to {:?}", output))?;

    let rows = if purged {
        prepared.purged.len()
    } else {
        prepared.engineered.len()
    };
    println!(
        "{} {} rows to {:?}",
        "Wrote".green(),
        rows,
        output
    );
    if purged {
        println!(
            "{}",
            format!("({} rows without complete history removed)", prepared.purged.dropped()).dimmed()
        );
    }
    Ok(())
}

fn run_report(
    history: &RaceTable,
    config: PipelineConfig,
    holdout_year: Option<i32>,
    years: &[i32],
) -> Result<()> {
    let Some(year) = holdout_year.or_else(|| years.iter().copied().max()) else {
        bail!("No season to hold out");
    };

    let pipeline = RacePipeline::new(config)?;
    let prepared = pipeline.prepare(history)?;
    let mut predictor = LogisticPredictor::new();
    let report = holdout_report(&prepared.prediction_set.train, year, &mut predictor)
        .with_context(|| format!("Failed to evaluate holdout season {}", year))?;

    println!("{}", "Classification report:".yellow().bold());
    println!("{}", report);
    Ok(())
}

fn run_validate(history: &RaceTable, config: PipelineConfig) -> Result<()> {
    println!("{}", "Configuration:".yellow().bold());
    println!("  window size:    {}", config.window_size);
    println!("  season length:  {}", config.season_length);
    println!("  seasons:        {}-{}", config.first_season, config.last_season);
    println!("  feature set:    {}", config.feature_set);
    println!("  grid entries:   {}", config.grid_order.len());
    println!();

    println!("{}", "Results:".yellow().bold());
    println!("  rows:           {}", history.len());
    println!("  races:          {}", history.races().len());
    println!("  drivers:        {}", history.driver_count());
    println!("  seasons:        {:?}", history.seasons());
    if let Some((year, race)) = history.last_race() {
        println!("  last race:      {} round {}", year, race);
    }
    println!();

    let pipeline = RacePipeline::new(config)?;
    match pipeline.prepare(history) {
        Ok(prepared) => {
            let set = &prepared.prediction_set;
            println!(
                "{} {} training rows, {} next-race rows",
                "OK".green().bold(),
                set.train.len(),
                set.future.len()
            );
            if prepared.next_race.is_none() {
                println!(
                    "{}",
                    "Season complete: report and features work, predict does not".yellow()
                );
            }
            Ok(())
        }
        Err(e) => {
            println!("{} {}", "FAILED".red().bold(), e);
            Err(e.into())
        }
    }
}
