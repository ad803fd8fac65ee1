// Runs one full tournament (a trial) over a BracketGraph.
// Rounds are played in increasing order and matchups within a round in bracket-position order,
// so a given random stream always produces the same trace.

use crate::bracket::{BracketGraph, Feeders};
use crate::ingest::RatingBook;
use crate::series::{SeriesDetail, SeriesSimulator};
use rand::Rng;
use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunnerState {
    NotStarted,
    RoundInProgress(u32),
    Complete,
}

/// A matchup won by the side that carried the lower rating into it
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct UpsetRecord {
    pub round: u32,
    pub matchup: usize,
    pub winner: usize,
    pub loser: usize,
    pub winner_rating_before: f64,
    pub loser_rating_before: f64,
    pub winner_rating_after: f64,
    pub loser_rating_after: f64,
}

impl UpsetRecord {
    /// How many rating points the winner was giving up
    pub fn rating_gap(&self) -> f64 {
        self.loser_rating_before - self.winner_rating_before
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SeriesRecord {
    pub round: u32,
    pub matchup: usize,
    pub winner: usize,
    pub detail: SeriesDetail,
}

/// Everything one trial produced. Folded into the aggregate counters and then dropped.
#[derive(Debug, Clone, Default)]
pub struct TrialResult {
    /// Winner per matchup index; None for matchups that were skipped
    pub winners: Vec<Option<usize>>,
    pub upsets: Vec<UpsetRecord>,
    pub series: Vec<SeriesRecord>,
    /// Matchups that produced no result this trial
    pub skipped: Vec<usize>,
    pub champion: Option<usize>,
}

impl TrialResult {
    pub fn winner_of(&self, matchup: usize) -> Option<usize> {
        self.winners.get(matchup).copied().flatten()
    }
}

pub struct TournamentRunner<'a> {
    graph: &'a BracketGraph,
    simulator: SeriesSimulator,
    state: RunnerState,
}

impl<'a> TournamentRunner<'a> {
    pub fn new(graph: &'a BracketGraph, simulator: SeriesSimulator) -> Self {
        TournamentRunner { graph, simulator, state: RunnerState::NotStarted }
    }

    pub fn state(&self) -> RunnerState {
        self.state
    }

    /// Play every round once. The caller owns rating isolation: restore `ratings` before each trial.
    /// A runner can be reused; each call starts again from NotStarted.
    pub fn run<R: Rng + ?Sized>(&mut self, ratings: &mut RatingBook, rng: &mut R) -> TrialResult {
        self.state = RunnerState::NotStarted;
        let graph = self.graph;
        let mut result = TrialResult {
            winners: vec![None; graph.len()],
            ..TrialResult::default()
        };

        for round in graph.round_numbers() {
            self.state = RunnerState::RoundInProgress(round);
            for &idx in graph.round(round) {
                let Some((team1, team2)) = self.slot_entrants(idx, &result) else {
                    result.skipped.push(idx);
                    continue;
                };

                let Some(outcome) = self.simulator.play(team1, team2, ratings, rng) else {
                    result.skipped.push(idx);
                    continue;
                };

                result.winners[idx] = Some(outcome.winner);
                if let (true, Some(loser)) = (outcome.upset, outcome.loser) {
                    result.upsets.push(UpsetRecord {
                        round,
                        matchup: idx,
                        winner: outcome.winner,
                        loser,
                        winner_rating_before: outcome.ratings_before.0,
                        loser_rating_before: outcome.ratings_before.1,
                        winner_rating_after: outcome.ratings_after.0,
                        loser_rating_after: outcome.ratings_after.1,
                    });
                }
                if let Some(detail) = outcome.detail {
                    result.series.push(SeriesRecord { round, matchup: idx, winner: outcome.winner, detail });
                }
            }
        }

        result.champion = graph.championship_matchup().and_then(|idx| result.winner_of(idx));
        self.state = RunnerState::Complete;
        result
    }

    /// Who sits in slots A and B of a matchup this trial. None means the matchup can't be played.
    /// A feeder that produced no winner leaves its slot empty, which the simulator treats as a bye.
    fn slot_entrants(&self, idx: usize, result: &TrialResult) -> Option<(Option<usize>, Option<usize>)> {
        let matchup = self.graph.matchup(idx);
        if matchup.round == 1 {
            return Some((matchup.entrants[0], matchup.entrants[1]));
        }
        match self.graph.feeders_at(idx) {
            Feeders::Pair(a, b) => Some((result.winner_of(a), result.winner_of(b))),
            Feeders::Bye(a) => Some((result.winner_of(a), None)),
            Feeders::Unresolved => None,
        }
    }
}
