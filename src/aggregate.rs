// This file runs the Monte Carlo trials and folds them into odds.
// Trials are split into shards that rayon runs in parallel; each shard owns its own rating checkpoint,
// rng and counters, and the shard counters are merged at the end in shard order.
// With a fixed seed and worker count a run is reproducible regardless of thread scheduling.

use crate::bracket::BracketGraph;
use crate::config::TopN;
use crate::elo::RatingModel;
use crate::ingest::{RatingBook, TournamentInfo};
use crate::series::{SeriesSimulator, SimulationMode, SERIES_WINS_NEEDED};
use crate::tournament::{RunnerState, TournamentRunner, TrialResult, UpsetRecord};
use indicatif::ProgressBar;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rayon::prelude::*;
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Spreads shard seeds apart so neighbouring shards don't get correlated streams
const SHARD_SEED_STRIDE: u64 = 0x9E37_79B9_7F4A_7C15;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RunSettings {
    pub mode: SimulationMode,
    pub model: RatingModel,
    /// None draws a fresh seed per run (and logs it)
    pub seed: Option<u64>,
    pub workers: usize,
}

impl Default for RunSettings {
    fn default() -> Self {
        RunSettings {
            mode: SimulationMode::default(),
            model: RatingModel::default(),
            seed: None,
            workers: num_cpus::get(),
        }
    }
}

/// Counters for a batch of trials. Merging two batches is order independent for every counter.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AggregateStatistics {
    pub trials_run: u64,
    pub unresolved_trials: u64,
    /// Indexed by entrant
    pub championships: Vec<u64>,
    /// round -> wins in that round, indexed by entrant
    pub round_reaches: BTreeMap<u32, Vec<u64>>,
    pub upsets: Vec<UpsetRecord>,
    /// games played -> number of series
    pub series_lengths: BTreeMap<usize, u64>,
    /// |final - initial| for each side of each series
    pub rating_swings: Vec<f64>,
    pub comebacks_from_0_3: u64,
}

impl AggregateStatistics {
    pub fn new(entrants: usize, graph: &BracketGraph) -> Self {
        AggregateStatistics {
            championships: vec![0; entrants],
            round_reaches: graph.round_numbers().map(|r| (r, vec![0; entrants])).collect(),
            ..AggregateStatistics::default()
        }
    }

    /// Fold one finished trial in. A trial with no champion only counts toward the unresolved total.
    pub fn record(&mut self, graph: &BracketGraph, trial: TrialResult) {
        self.trials_run += 1;
        let Some(champion) = trial.champion else {
            self.unresolved_trials += 1;
            return;
        };
        self.championships[champion] += 1;

        for (round, reaches) in self.round_reaches.iter_mut() {
            for &idx in graph.round(*round) {
                if let Some(winner) = trial.winner_of(idx) {
                    reaches[winner] += 1;
                }
            }
        }

        for series in &trial.series {
            *self.series_lengths.entry(series.detail.games_played()).or_insert(0) += 1;
            self.rating_swings.extend(series.detail.rating_swings());
            if series.detail.is_comeback_from_0_3() {
                self.comebacks_from_0_3 += 1;
            }
        }
        self.upsets.extend(trial.upsets);
    }

    pub fn merge(&mut self, other: AggregateStatistics) {
        self.trials_run += other.trials_run;
        self.unresolved_trials += other.unresolved_trials;
        add_counts(&mut self.championships, &other.championships);
        for (round, reaches) in other.round_reaches {
            add_counts(self.round_reaches.entry(round).or_default(), &reaches);
        }
        for (games, count) in other.series_lengths {
            *self.series_lengths.entry(games).or_insert(0) += count;
        }
        self.upsets.extend(other.upsets);
        self.rating_swings.extend(other.rating_swings);
        self.comebacks_from_0_3 += other.comebacks_from_0_3;
    }
}

fn add_counts(into: &mut Vec<u64>, from: &[u64]) {
    if into.len() < from.len() {
        into.resize(from.len(), 0);
    }
    for (a, b) in into.iter_mut().zip(from) {
        *a += b;
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum RunStatus {
    Completed,
    /// Stopped early; trials_run covers the trials that finished
    Cancelled,
    /// Nothing to simulate (no entrants or no matchups)
    EmptyBracket,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct RunSummary {
    pub requested: u64,
    pub trials_run: u64,
    pub unresolved_trials: u64,
    pub status: RunStatus,
    pub seed: Option<u64>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChampionshipOdds {
    pub entrant: usize,
    pub entrant_id: String,
    pub display_name: String,
    pub wins: u64,
    pub probability: f64,
    pub odds: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RoundOdds {
    pub entrant: usize,
    pub entrant_id: String,
    pub display_name: String,
    pub reaches: u64,
    pub probability: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SeriesStatistics {
    pub total_series: u64,
    pub mean_length: f64,
    pub length_distribution: BTreeMap<usize, u64>,
    pub sweeps: u64,
    pub seven_game_series: u64,
    pub comebacks_from_0_3: u64,
    pub mean_rating_swing: f64,
    pub max_rating_swing: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct UpsetStatistics {
    pub total_upsets: u64,
    pub upsets_per_trial: f64,
    pub upsets_by_round: BTreeMap<u32, u64>,
    pub mean_rating_gap: f64,
    pub biggest_upset_gap: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TournamentSummary {
    pub mode: SimulationMode,
    pub entrants: usize,
    pub entrants_with_title: usize,
    /// Share of the field that won at least one simulated title
    pub competitive_balance: f64,
    pub trials_run: u64,
    pub unresolved_trials: u64,
}

pub struct SimulationAggregator<'a> {
    info: &'a TournamentInfo,
    graph: &'a BracketGraph,
    settings: RunSettings,
    /// Checkpointed entrant ratings used by the sequential path
    ratings: RatingBook,
    stats: AggregateStatistics,
    cancel: Arc<AtomicBool>,
    progress: Option<ProgressBar>,
}

impl<'a> SimulationAggregator<'a> {
    pub fn new(info: &'a TournamentInfo, graph: &'a BracketGraph, settings: RunSettings) -> Self {
        SimulationAggregator {
            info,
            graph,
            settings,
            ratings: RatingBook::from_tournament(info),
            stats: AggregateStatistics::new(info.entrants.len(), graph),
            cancel: Arc::new(AtomicBool::new(false)),
            progress: None,
        }
    }

    pub fn with_progress(mut self, progress: ProgressBar) -> Self {
        self.progress = Some(progress);
        self
    }

    /// Set the returned flag to stop a run between trials
    pub fn cancel_handle(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.cancel)
    }

    /// Zero every counter, put every entrant back on its base rating and clear a pending cancel
    pub fn reset(&mut self) {
        self.clear_counters();
        self.cancel.store(false, Ordering::SeqCst);
    }

    /// A cancel raised before a run still stops it
    fn clear_counters(&mut self) {
        self.stats = AggregateStatistics::new(self.info.entrants.len(), self.graph);
        self.ratings.restore();
    }

    pub fn info(&self) -> &'a TournamentInfo {
        self.info
    }

    pub fn graph(&self) -> &'a BracketGraph {
        self.graph
    }

    #[cfg(test)]
    pub fn ratings(&self) -> &RatingBook {
        &self.ratings
    }

    pub fn statistics(&self) -> &AggregateStatistics {
        &self.stats
    }

    pub fn settings(&self) -> &RunSettings {
        &self.settings
    }

    fn simulator(&self) -> SeriesSimulator {
        SeriesSimulator::new(self.settings.mode, self.settings.model)
    }

    fn is_degenerate(&self) -> bool {
        self.graph.is_empty() || self.info.entrants.is_empty()
    }

    /// Run `n` trials across the worker pool, replacing any previous statistics
    pub fn run_trials(&mut self, n: u64) -> RunSummary {
        self.clear_counters();
        if self.is_degenerate() {
            warn!("bracket has no entrants or no matchups, nothing to simulate");
            return self.run_summary(n, RunStatus::EmptyBracket, None);
        }

        let seed = self.settings.seed.unwrap_or_else(|| rand::thread_rng().gen());
        let workers = self.settings.workers.max(1);
        info!(trials = n, workers, seed, "Running {} tournament simulations", self.settings.mode);

        let shards = shard_sizes(n, workers);
        let graph = self.graph;
        let simulator = self.simulator();
        let base_ratings = RatingBook::from_tournament(self.info);
        let entrants = self.info.entrants.len();
        let cancel = &*self.cancel;
        let progress = self.progress.as_ref();

        let shard_stats: Vec<AggregateStatistics> = shards
            .par_iter()
            .enumerate()
            .map(|(shard, &count)| {
                let mut ratings = base_ratings.clone();
                let mut rng = StdRng::seed_from_u64(seed.wrapping_add((shard as u64).wrapping_mul(SHARD_SEED_STRIDE)));
                let mut stats = AggregateStatistics::new(entrants, graph);
                run_shard(graph, simulator, &mut ratings, &mut stats, count, &mut rng, cancel, progress);
                debug!(shard, trials = stats.trials_run, "shard finished");
                stats
            })
            .collect();

        for stats in shard_stats {
            self.stats.merge(stats);
        }
        self.finish(n, Some(seed))
    }

    /// Run `n` trials on the calling thread with a caller-supplied rng, replacing any previous statistics.
    /// Leaves the aggregator's working ratings where the last trial left them until the next reset.
    #[cfg(test)]
    pub fn run_trials_with_rng<R: Rng + ?Sized>(&mut self, n: u64, rng: &mut R) -> RunSummary {
        self.clear_counters();
        if self.is_degenerate() {
            warn!("bracket has no entrants or no matchups, nothing to simulate");
            return self.run_summary(n, RunStatus::EmptyBracket, None);
        }
        let simulator = self.simulator();
        run_shard(
            self.graph,
            simulator,
            &mut self.ratings,
            &mut self.stats,
            n,
            rng,
            &self.cancel,
            self.progress.as_ref(),
        );
        self.finish(n, self.settings.seed)
    }

    fn finish(&self, requested: u64, seed: Option<u64>) -> RunSummary {
        let status = if self.stats.trials_run < requested { RunStatus::Cancelled } else { RunStatus::Completed };
        if self.stats.unresolved_trials > 0 {
            warn!(unresolved = self.stats.unresolved_trials, "some trials produced no champion");
        }
        info!(trials = self.stats.trials_run, ?status, "Simulation complete");
        self.run_summary(requested, status, seed)
    }

    fn run_summary(&self, requested: u64, status: RunStatus, seed: Option<u64>) -> RunSummary {
        RunSummary {
            requested,
            trials_run: self.stats.trials_run,
            unresolved_trials: self.stats.unresolved_trials,
            status,
            seed,
        }
    }

    pub fn trials_run(&self) -> u64 {
        self.stats.trials_run
    }

    /// Championship probability for every entrant with at least one title, best first
    pub fn championship_odds(&self, top_n: TopN) -> Vec<ChampionshipOdds> {
        if self.stats.trials_run == 0 {
            return Vec::new();
        }
        let trials = self.stats.trials_run as f64;
        ranked(&self.stats.championships, top_n)
            .into_iter()
            .map(|(entrant, wins)| {
                let e = self.info.entrant(entrant);
                let probability = wins as f64 / trials;
                ChampionshipOdds {
                    entrant,
                    entrant_id: e.id.clone(),
                    display_name: e.name.clone(),
                    wins,
                    probability,
                    odds: format!("1 in {}", (1.0 / probability).floor() as u64),
                }
            })
            .collect()
    }

    /// Probability of winning a matchup in `round`, best first
    pub fn round_advancement_odds(&self, round: u32, top_n: TopN) -> Vec<RoundOdds> {
        if self.stats.trials_run == 0 {
            return Vec::new();
        }
        let Some(reaches) = self.stats.round_reaches.get(&round) else {
            return Vec::new();
        };
        let trials = self.stats.trials_run as f64;
        ranked(reaches, top_n)
            .into_iter()
            .map(|(entrant, count)| {
                let e = self.info.entrant(entrant);
                RoundOdds {
                    entrant,
                    entrant_id: e.id.clone(),
                    display_name: e.name.clone(),
                    reaches: count,
                    probability: count as f64 / trials,
                }
            })
            .collect()
    }

    /// Probability per entrant; zero for entrants that never got there
    pub fn championship_probability(&self, entrant: usize) -> f64 {
        probability(&self.stats.championships, entrant, self.stats.trials_run)
    }

    pub fn round_probability(&self, round: u32, entrant: usize) -> f64 {
        self.stats
            .round_reaches
            .get(&round)
            .map(|reaches| probability(reaches, entrant, self.stats.trials_run))
            .unwrap_or(0.0)
    }

    /// None when no hot series were played
    pub fn series_statistics(&self) -> Option<SeriesStatistics> {
        let total_series: u64 = self.stats.series_lengths.values().sum();
        if total_series == 0 {
            return None;
        }
        let total_games: u64 = self.stats.series_lengths.iter().map(|(&len, &count)| len as u64 * count).sum();
        let swings = &self.stats.rating_swings;
        let mean_rating_swing = if swings.is_empty() { 0.0 } else { swings.iter().sum::<f64>() / swings.len() as f64 };
        let max_rating_swing = swings.iter().copied().fold(0.0, f64::max);

        Some(SeriesStatistics {
            total_series,
            mean_length: total_games as f64 / total_series as f64,
            length_distribution: self.stats.series_lengths.clone(),
            sweeps: self.series_of_length(SERIES_WINS_NEEDED as usize),
            seven_game_series: self.series_of_length(2 * SERIES_WINS_NEEDED as usize - 1),
            comebacks_from_0_3: self.stats.comebacks_from_0_3,
            mean_rating_swing,
            max_rating_swing,
        })
    }

    fn series_of_length(&self, games: usize) -> u64 {
        self.stats.series_lengths.get(&games).copied().unwrap_or(0)
    }

    /// None when no upsets were recorded
    pub fn upset_statistics(&self) -> Option<UpsetStatistics> {
        let upsets = &self.stats.upsets;
        if upsets.is_empty() || self.stats.trials_run == 0 {
            return None;
        }
        let mut upsets_by_round: BTreeMap<u32, u64> = BTreeMap::new();
        for upset in upsets {
            *upsets_by_round.entry(upset.round).or_insert(0) += 1;
        }
        let gaps = upsets.iter().map(UpsetRecord::rating_gap);
        let mean_rating_gap = gaps.clone().sum::<f64>() / upsets.len() as f64;
        let biggest_upset_gap = gaps.fold(f64::MIN, f64::max);

        Some(UpsetStatistics {
            total_upsets: upsets.len() as u64,
            upsets_per_trial: upsets.len() as f64 / self.stats.trials_run as f64,
            upsets_by_round,
            mean_rating_gap,
            biggest_upset_gap,
        })
    }

    pub fn summary(&self) -> TournamentSummary {
        let entrants = self.info.entrants.len();
        let entrants_with_title = self.stats.championships.iter().filter(|&&wins| wins > 0).count();
        TournamentSummary {
            mode: self.settings.mode,
            entrants,
            entrants_with_title,
            competitive_balance: if entrants == 0 { 0.0 } else { entrants_with_title as f64 / entrants as f64 },
            trials_run: self.stats.trials_run,
            unresolved_trials: self.stats.unresolved_trials,
        }
    }
}

#[allow(clippy::too_many_arguments)]
fn run_shard<R: Rng + ?Sized>(
    graph: &BracketGraph,
    simulator: SeriesSimulator,
    ratings: &mut RatingBook,
    stats: &mut AggregateStatistics,
    count: u64,
    rng: &mut R,
    cancel: &AtomicBool,
    progress: Option<&ProgressBar>,
) {
    let mut runner = TournamentRunner::new(graph, simulator);
    for _ in 0..count {
        if cancel.load(Ordering::Relaxed) {
            break;
        }
        ratings.restore();
        let trial = runner.run(ratings, rng);
        debug_assert_eq!(runner.state(), RunnerState::Complete);
        stats.record(graph, trial);
        if let Some(pb) = progress {
            pb.inc(1);
        }
    }
}

/// Split n trials across workers as evenly as possible, dropping empty shards
fn shard_sizes(n: u64, workers: usize) -> Vec<u64> {
    let workers = workers as u64;
    let base = n / workers;
    let extra = n % workers;
    (0..workers)
        .map(|i| base + u64::from(i < extra))
        .filter(|&size| size > 0)
        .collect()
}

/// Entrants with a non-zero count, highest first, ties by entrant order
fn ranked(counts: &[u64], top_n: TopN) -> Vec<(usize, u64)> {
    let mut ranked: Vec<(usize, u64)> = counts
        .iter()
        .enumerate()
        .filter(|&(_, &count)| count > 0)
        .map(|(entrant, &count)| (entrant, count))
        .collect();
    ranked.sort_by(|a, b| b.1.cmp(&a.1).then(a.0.cmp(&b.0)));
    if let TopN::Count(n) = top_n {
        ranked.truncate(n);
    }
    ranked
}

fn probability(counts: &[u64], entrant: usize, trials: u64) -> f64 {
    if trials == 0 {
        return 0.0;
    }
    counts.get(entrant).copied().unwrap_or(0) as f64 / trials as f64
}
