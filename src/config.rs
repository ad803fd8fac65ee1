// Configuration module for the bracket odds simulator
// Supports YAML configuration files for simulation, input and output settings

use serde::{Deserialize, Serialize};
use std::fmt;
use std::fs;
use std::path::Path;
use std::str::FromStr;
use tracing::{info, warn};

use crate::aggregate::RunSettings;
use crate::elo::RatingModel;
use crate::error::ConfigError;
use crate::series::SimulationMode;

const DEFAULT_CONFIG_PATHS: [&str; 3] = ["config.yaml", "config.yml", ".bracket-odds.yaml"];

/// Root configuration structure
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub simulation: SimulationSettings,
    #[serde(default)]
    pub input: InputSettings,
    #[serde(default)]
    pub output: OutputSettings,
}

impl Config {
    /// Load configuration from a YAML file
    pub fn from_file(path: &str) -> Result<Self, ConfigError> {
        if !Path::new(path).exists() {
            return Err(ConfigError::NotFound(path.to_string()));
        }

        let content = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_string(),
            source,
        })?;

        Ok(serde_yaml::from_str(&content)?)
    }

    /// Load the named file, or the first default location that parses, or the defaults.
    /// Only a named file that can't be loaded is an error.
    pub fn load_or_default(path: Option<&str>) -> Result<Self, ConfigError> {
        if let Some(p) = path {
            let config = Self::from_file(p)?;
            info!("Loaded configuration from {}", p);
            return Ok(config);
        }

        for default_path in DEFAULT_CONFIG_PATHS {
            if !Path::new(default_path).exists() {
                continue;
            }
            match Self::from_file(default_path) {
                Ok(config) => {
                    info!("Loaded configuration from {}", default_path);
                    return Ok(config);
                }
                Err(e) => {
                    warn!("{}", e);
                    warn!("Using default configuration.");
                    return Ok(Self::default());
                }
            }
        }
        Ok(Self::default())
    }

    /// Reject bad settings before any simulation work starts
    pub fn validate(&self) -> Result<(), ConfigError> {
        let sim = &self.simulation;
        if sim.trials <= 0 {
            return Err(ConfigError::InvalidTrials(sim.trials));
        }
        sim.mode.parse::<SimulationMode>()?;
        if !sim.k_factor.is_finite() || sim.k_factor <= 0.0 {
            return Err(ConfigError::InvalidKFactor(sim.k_factor));
        }
        if sim.top_n == TopN::Count(0) {
            return Err(ConfigError::InvalidTopN("0".to_string()));
        }
        if sim.workers == Some(0) {
            return Err(ConfigError::InvalidWorkers);
        }
        Ok(())
    }

    /// Validated trial count
    pub fn trials(&self) -> Result<u64, ConfigError> {
        self.validate()?;
        Ok(self.simulation.trials as u64)
    }

    /// Validated settings for the aggregator
    pub fn run_settings(&self) -> Result<RunSettings, ConfigError> {
        self.validate()?;
        let sim = &self.simulation;
        Ok(RunSettings {
            mode: sim.mode.parse()?,
            model: RatingModel::new(sim.k_factor),
            seed: sim.seed,
            workers: sim.workers.unwrap_or_else(num_cpus::get),
        })
    }
}

/// How many rows an odds table shows
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "TopNValue", into = "TopNValue")]
pub enum TopN {
    Count(usize),
    All,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
enum TopNValue {
    Count(i64),
    Word(String),
}

impl TryFrom<TopNValue> for TopN {
    type Error = ConfigError;

    fn try_from(value: TopNValue) -> Result<Self, Self::Error> {
        match value {
            TopNValue::Count(n) if n > 0 => Ok(TopN::Count(n as usize)),
            TopNValue::Count(n) => Err(ConfigError::InvalidTopN(n.to_string())),
            TopNValue::Word(word) => word.parse(),
        }
    }
}

impl From<TopN> for TopNValue {
    fn from(top_n: TopN) -> Self {
        match top_n {
            TopN::Count(n) => TopNValue::Count(n as i64),
            TopN::All => TopNValue::Word("all".to_string()),
        }
    }
}

impl FromStr for TopN {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if s.eq_ignore_ascii_case("all") {
            return Ok(TopN::All);
        }
        match s.parse::<usize>() {
            Ok(n) if n > 0 => Ok(TopN::Count(n)),
            _ => Err(ConfigError::InvalidTopN(s.to_string())),
        }
    }
}

impl fmt::Display for TopN {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TopN::Count(n) => write!(f, "{}", n),
            TopN::All => write!(f, "all"),
        }
    }
}

/// Simulation settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SimulationSettings {
    /// Number of simulated tournaments
    #[serde(default = "default_trials")]
    pub trials: i64,

    /// "hot" (best-of-seven with live rating updates) or "cold" (single draw on fixed ratings)
    #[serde(default = "default_mode")]
    pub mode: String,

    /// Base K-factor for rating updates
    #[serde(default = "default_k_factor")]
    pub k_factor: f64,

    /// Rows shown per odds table: a positive integer or "all"
    #[serde(default = "default_top_n")]
    pub top_n: TopN,

    /// Fixed seed for reproducible runs
    #[serde(default)]
    pub seed: Option<u64>,

    /// Worker threads (defaults to the number of CPUs)
    #[serde(default)]
    pub workers: Option<usize>,
}

impl Default for SimulationSettings {
    fn default() -> Self {
        SimulationSettings {
            trials: default_trials(),
            mode: default_mode(),
            k_factor: default_k_factor(),
            top_n: default_top_n(),
            seed: None,
            workers: None,
        }
    }
}

fn default_trials() -> i64 { 10_000 }
fn default_mode() -> String { "hot".to_string() }
fn default_k_factor() -> f64 { crate::elo::DEFAULT_BASE_K }
fn default_top_n() -> TopN { TopN::Count(20) }

/// Input table locations
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InputSettings {
    #[serde(default = "default_teams_file")]
    pub teams_file: String,

    #[serde(default = "default_matchups_file")]
    pub matchups_file: String,
}

impl Default for InputSettings {
    fn default() -> Self {
        InputSettings {
            teams_file: default_teams_file(),
            matchups_file: default_matchups_file(),
        }
    }
}

fn default_teams_file() -> String { "playoff_teams.csv".to_string() }
fn default_matchups_file() -> String { "playoff_matchups.csv".to_string() }

/// Optional export paths
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct OutputSettings {
    #[serde(default)]
    pub export_csv: Option<String>,

    #[serde(default)]
    pub export_json: Option<String>,
}

/// Generate a sample configuration file
pub fn generate_sample_config() -> String {
    r#"# Bracket Odds Simulator Configuration
# All values shown are defaults - uncomment and modify as needed

# Simulation settings
simulation:
  # Number of simulated tournaments (higher = more accurate but slower)
  trials: 10000
  # "hot" = best-of-seven series, ratings update after every game
  # "cold" = one draw per matchup on fixed ratings
  mode: hot
  # Base K-factor for rating updates (scaled down as entrants play more games)
  k_factor: 128.0
  # Rows per odds table: a positive integer or "all"
  top_n: 20
  # Fixed seed for reproducible runs (random when omitted)
  # seed: 42
  # Worker threads (number of CPUs when omitted)
  # workers: 8

# Input tables
input:
  teams_file: playoff_teams.csv
  matchups_file: playoff_matchups.csv

# Optional exports (nothing is written when omitted)
# output:
#   export_csv: tournament_odds.csv
#   export_json: tournament_odds.json
"#
    .to_string()
}
