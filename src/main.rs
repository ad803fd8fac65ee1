mod aggregate;
mod bracket;
mod config;
mod elo;
mod error;
mod ingest;
mod report;
mod series;
mod tournament;

#[cfg(test)]
mod testutil;

use aggregate::SimulationAggregator;
use bracket::BracketGraph;
use clap::Parser;
use config::{Config, TopN};
use error::AppError;
use indicatif::{ProgressBar, ProgressStyle};
use ingest::TournamentInfo;
use std::sync::atomic::Ordering;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

/// Monte Carlo championship odds for an elimination bracket
#[derive(Parser, Debug)]
#[command(name = "bracket-odds")]
#[command(about = "Simulate a rated elimination bracket and report championship odds")]
struct Cli {
    /// YAML config file (defaults to config.yaml, config.yml or .bracket-odds.yaml if present)
    #[arg(long)]
    config: Option<String>,

    /// Number of simulated tournaments
    #[arg(short = 's', long)]
    simulations: Option<i64>,

    /// Single draw per matchup on fixed ratings instead of best-of-seven series
    #[arg(long)]
    cold: bool,

    /// Base K-factor for rating updates
    #[arg(long)]
    k_factor: Option<f64>,

    /// Rows per odds table: a positive integer or "all"
    #[arg(long)]
    top_n: Option<TopN>,

    /// Seed for a reproducible run
    #[arg(long)]
    seed: Option<u64>,

    /// Worker threads
    #[arg(long)]
    workers: Option<usize>,

    #[arg(long)]
    teams_file: Option<String>,

    #[arg(long)]
    matchups_file: Option<String>,

    /// Write the per-entrant table to this CSV file
    #[arg(long)]
    export_csv: Option<String>,

    /// Write the full report to this JSON file
    #[arg(long)]
    export_json: Option<String>,

    /// Also print the rating vs success breakdown
    #[arg(long)]
    analyze: bool,

    /// Debug logging
    #[arg(short, long)]
    verbose: bool,

    /// Print a commented sample config and exit
    #[arg(long)]
    sample_config: bool,
}

impl Cli {
    /// Flags win over the config file
    fn apply_to(&self, config: &mut Config) {
        let sim = &mut config.simulation;
        if let Some(n) = self.simulations {
            sim.trials = n;
        }
        if self.cold {
            sim.mode = "cold".to_string();
        }
        if let Some(k) = self.k_factor {
            sim.k_factor = k;
        }
        if let Some(top_n) = self.top_n {
            sim.top_n = top_n;
        }
        if self.seed.is_some() {
            sim.seed = self.seed;
        }
        if self.workers.is_some() {
            sim.workers = self.workers;
        }
        if let Some(path) = &self.teams_file {
            config.input.teams_file = path.clone();
        }
        if let Some(path) = &self.matchups_file {
            config.input.matchups_file = path.clone();
        }
        if self.export_csv.is_some() {
            config.output.export_csv = self.export_csv.clone();
        }
        if self.export_json.is_some() {
            config.output.export_json = self.export_json.clone();
        }
    }
}

fn main() {
    let cli = Cli::parse();

    if cli.sample_config {
        print!("{}", config::generate_sample_config());
        return;
    }

    let default_level = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)))
        .with_target(false)
        .init();

    if let Err(e) = run(&cli) {
        error!("{}", e);
        std::process::exit(1);
    }
}

fn run(cli: &Cli) -> Result<(), AppError> {
    let mut config = Config::load_or_default(cli.config.as_deref())?;
    cli.apply_to(&mut config);
    let settings = config.run_settings()?;
    let trials = config.trials()?;
    let top_n = config.simulation.top_n;

    let tournamentinfo = TournamentInfo::from_csv_files(&config.input.teams_file, &config.input.matchups_file)?;
    let graph = BracketGraph::new(&tournamentinfo);
    if !graph.issues().is_empty() {
        warn!("{} bracket structure issue(s), affected matchups will be skipped", graph.issues().len());
    }
    info!("Using K-factor: {}", settings.model.base_k);

    let progress = ProgressBar::new(trials);
    progress.set_style(
        ProgressStyle::default_bar()
            .template("[{elapsed_precise}] [{bar:40}] {pos}/{len} trials ({eta})")
            .progress_chars("=> "),
    );

    let mut aggregator = SimulationAggregator::new(&tournamentinfo, &graph, settings).with_progress(progress.clone());
    let cancel = aggregator.cancel_handle();
    if let Err(e) = ctrlc::set_handler(move || {
        cancel.store(true, Ordering::SeqCst);
    }) {
        warn!("Could not install Ctrl-C handler: {}", e);
    }
    let run_summary = aggregator.run_trials(trials);
    progress.finish_and_clear();

    report::print_report(&aggregator, top_n);
    if cli.analyze {
        report::print_analysis(&report::analyze(&aggregator));
    }

    if let Some(path) = &config.output.export_csv {
        report::export_csv(&aggregator, path)?;
    }
    if let Some(path) = &config.output.export_json {
        report::export_json(&aggregator, TopN::All, Some(run_summary), path)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_flags_override_config() {
        let cli = Cli::parse_from([
            "bracket-odds",
            "-s",
            "250",
            "--cold",
            "--top-n",
            "all",
            "--seed",
            "3",
            "--export-csv",
            "odds.csv",
        ]);
        let mut config = Config::default();
        cli.apply_to(&mut config);

        assert_eq!(config.simulation.trials, 250);
        assert_eq!(config.simulation.mode, "cold");
        assert_eq!(config.simulation.top_n, TopN::All);
        assert_eq!(config.simulation.seed, Some(3));
        assert_eq!(config.output.export_csv.as_deref(), Some("odds.csv"));
        assert_eq!(config.input.teams_file, "playoff_teams.csv");
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_bad_flags_rejected_before_simulating() {
        let cli = Cli::parse_from(["bracket-odds", "--simulations", "0"]);
        let mut config = Config::default();
        cli.apply_to(&mut config);
        assert!(config.run_settings().is_err());

        assert!(Cli::try_parse_from(["bracket-odds", "--top-n", "zero"]).is_err());
    }
}
