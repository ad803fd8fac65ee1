// This module implements the ELO math used by the series simulator
// Ratings come in finished from the external fitters; here we only turn them into win probabilities
// and apply the in-series update that a hot simulation uses between games

/// Default starting ELO rating for entrants with no rating in the table
pub const DEFAULT_RATING: f64 = 1500.0;

/// Base K-factor, matches the live voting system's BASE_K_FACTOR
pub const DEFAULT_BASE_K: f64 = 128.0;

/// Simulated games carry no human vote, so every game counts as one full vote
pub const SIMULATED_VOTE_WEIGHT: f64 = 1.0;

/// Games played below this many keep a larger step size; the experience factor bottoms out at 0.5
const EXPERIENCE_HORIZON: f64 = 200.0;
const MIN_EXPERIENCE_FACTOR: f64 = 0.5;

/// Calculate the probability that A beats B
/// Uses the standard ELO formula: P(A) = 1 / (1 + 10^((R_B - R_A) / 400))
pub fn win_probability(rating_a: f64, rating_b: f64) -> f64 {
    1.0 / (1.0 + 10.0_f64.powf((rating_b - rating_a) / 400.0))
}

/// Rating update parameters for a simulation run.
/// Passed explicitly into the series simulator so runs never read the K-factor from global state.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RatingModel {
    pub base_k: f64,
}

impl Default for RatingModel {
    fn default() -> Self {
        RatingModel { base_k: DEFAULT_BASE_K }
    }
}

impl RatingModel {
    pub fn new(base_k: f64) -> Self {
        RatingModel { base_k }
    }

    /// Adaptive K-factor: newer entrants move faster, floor at half the weighted base
    pub fn k_factor(&self, vote_weight: f64, games_played: u32) -> f64 {
        let experience = (1.0 - games_played as f64 / EXPERIENCE_HORIZON).max(MIN_EXPERIENCE_FACTOR);
        self.base_k * vote_weight * experience
    }

    /// Apply one game's result and return (new_winner_rating, new_loser_rating).
    /// Each side's K uses its own game count. Results are rounded to whole points like the live system.
    pub fn update_after_game(
        &self,
        winner_rating: f64,
        loser_rating: f64,
        vote_weight: f64,
        winner_games_played: u32,
        loser_games_played: u32,
    ) -> (f64, f64) {
        let winner_expected = win_probability(winner_rating, loser_rating);
        let loser_expected = 1.0 - winner_expected;

        let winner_k = self.k_factor(vote_weight, winner_games_played);
        let loser_k = self.k_factor(vote_weight, loser_games_played);

        let new_winner = winner_rating + winner_k * (1.0 - winner_expected);
        let new_loser = loser_rating + loser_k * (0.0 - loser_expected);

        (new_winner.round(), new_loser.round())
    }
}
