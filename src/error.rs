// Error types for the odds simulator.
// Only the boundaries (config, table loading, export) can fail; anything that goes wrong
// inside a trial degrades that trial instead of surfacing here.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("config file not found: {0}")]
    NotFound(String),

    #[error("failed to read config file {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config file: {0}")]
    Parse(#[from] serde_yaml::Error),

    #[error("number of trials must be a positive integer, got {0}")]
    InvalidTrials(i64),

    #[error("unknown simulation mode '{0}' (expected 'hot' or 'cold')")]
    UnknownMode(String),

    #[error("k-factor must be a positive number, got {0}")]
    InvalidKFactor(f64),

    #[error("top-n must be a positive integer or \"all\", got '{0}'")]
    InvalidTopN(String),

    #[error("worker count must be at least 1")]
    InvalidWorkers,
}

#[derive(Debug, Error)]
pub enum IngestError {
    #[error("failed to open {path}: {source}")]
    Open {
        path: String,
        #[source]
        source: csv::Error,
    },

    #[error("malformed row in {table} table: {source}")]
    Row {
        table: &'static str,
        #[source]
        source: csv::Error,
    },

    #[error("duplicate entrant id '{0}'")]
    DuplicateEntrant(String),

    #[error("duplicate matchup id '{0}'")]
    DuplicateMatchup(String),
}

#[derive(Debug, Error)]
pub enum ExportError {
    #[error("failed to write csv export: {0}")]
    Csv(#[from] csv::Error),

    #[error("failed to write json export: {0}")]
    Json(#[from] serde_json::Error),

    #[error("failed to write {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
}

/// Anything that stops the command line run
#[derive(Debug, Error)]
pub enum AppError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Ingest(#[from] IngestError),

    #[error(transparent)]
    Export(#[from] ExportError),
}
