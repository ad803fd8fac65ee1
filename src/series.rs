// Head-to-head resolution for one matchup.
// Cold mode is a single draw on base ratings; hot mode plays a best-of-seven where both sides'
// ratings move after every game, and the drifted ratings carry into later rounds of the same trial.

use crate::elo::{win_probability, RatingModel, SIMULATED_VOTE_WEIGHT};
use crate::error::ConfigError;
use crate::ingest::RatingBook;
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// First to this many game wins takes a hot series
pub const SERIES_WINS_NEEDED: u8 = 4;

/// Game count both sides start a series with, so game one isn't taken at the maximal K
pub const BASELINE_GAMES_PLAYED: u32 = 10;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SimulationMode {
    /// Best-of-seven with in-series rating updates
    Hot,
    /// Single draw on fixed ratings
    Cold,
}

impl Default for SimulationMode {
    fn default() -> Self {
        SimulationMode::Hot
    }
}

impl FromStr for SimulationMode {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "hot" => Ok(SimulationMode::Hot),
            "cold" => Ok(SimulationMode::Cold),
            _ => Err(ConfigError::UnknownMode(s.to_string())),
        }
    }
}

impl fmt::Display for SimulationMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SimulationMode::Hot => write!(f, "hot (game-by-game)"),
            SimulationMode::Cold => write!(f, "cold (single matchup)"),
        }
    }
}

/// One game inside a hot series, from slot A's point of view
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct GameRecord {
    pub game_num: u8,
    pub team1_won: bool,
    pub team1_rating_after: f64,
    pub team2_rating_after: f64,
    /// Series score after this game (team1 wins, team2 wins)
    pub score: (u8, u8),
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SeriesDetail {
    pub team1: usize,
    pub team2: usize,
    pub initial_team1_rating: f64,
    pub initial_team2_rating: f64,
    pub final_team1_rating: f64,
    pub final_team2_rating: f64,
    pub team1_wins: u8,
    pub team2_wins: u8,
    pub games: Vec<GameRecord>,
}

impl SeriesDetail {
    pub fn games_played(&self) -> usize {
        self.games.len()
    }

    /// Absolute rating movement of each side over the series
    pub fn rating_swings(&self) -> [f64; 2] {
        [
            (self.final_team1_rating - self.initial_team1_rating).abs(),
            (self.final_team2_rating - self.initial_team2_rating).abs(),
        ]
    }

    /// The series winner dropped each of the first three games
    pub fn is_comeback_from_0_3(&self) -> bool {
        if self.games.len() < 3 {
            return false;
        }
        let team1_took_series = self.team1_wins == SERIES_WINS_NEEDED;
        self.games[..3].iter().all(|g| g.team1_won != team1_took_series)
    }
}

/// Result of one matchup
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SeriesOutcome {
    pub winner: usize,
    /// None when the winner advanced on a bye
    pub loser: Option<usize>,
    pub upset: bool,
    /// Ratings the two sides carried into the matchup, (winner, loser)
    pub ratings_before: (f64, f64),
    /// Ratings after it; equal to ratings_before in cold mode
    pub ratings_after: (f64, f64),
    /// Only present for hot series
    pub detail: Option<SeriesDetail>,
}

#[derive(Debug, Clone, Copy)]
pub struct SeriesSimulator {
    pub mode: SimulationMode,
    pub model: RatingModel,
}

impl SeriesSimulator {
    pub fn new(mode: SimulationMode, model: RatingModel) -> Self {
        SeriesSimulator { mode, model }
    }

    /// Resolve one matchup between the entrants in slot A and slot B.
    /// A missing side is a bye for the other; with both missing there is no result.
    /// In hot mode the entrants' working ratings in `ratings` are left at their post-series values.
    pub fn play<R: Rng + ?Sized>(
        &self,
        team1: Option<usize>,
        team2: Option<usize>,
        ratings: &mut RatingBook,
        rng: &mut R,
    ) -> Option<SeriesOutcome> {
        match (team1, team2) {
            (Some(team1), Some(team2)) => Some(match self.mode {
                SimulationMode::Cold => self.play_cold(team1, team2, ratings, rng),
                SimulationMode::Hot => self.play_hot(team1, team2, ratings, rng),
            }),
            (Some(only), None) | (None, Some(only)) => {
                let rating = ratings.working(only);
                Some(SeriesOutcome {
                    winner: only,
                    loser: None,
                    upset: false,
                    ratings_before: (rating, rating),
                    ratings_after: (rating, rating),
                    detail: None,
                })
            }
            (None, None) => None,
        }
    }

    fn play_cold<R: Rng + ?Sized>(&self, team1: usize, team2: usize, ratings: &RatingBook, rng: &mut R) -> SeriesOutcome {
        let team1_rating = ratings.base(team1);
        let team2_rating = ratings.base(team2);
        let team1_prob = win_probability(team1_rating, team2_rating);
        let (winner, loser, winner_rating, loser_rating) = if rng.gen::<f64>() < team1_prob {
            (team1, team2, team1_rating, team2_rating)
        } else {
            (team2, team1, team2_rating, team1_rating)
        };
        SeriesOutcome {
            winner,
            loser: Some(loser),
            upset: winner_rating < loser_rating,
            ratings_before: (winner_rating, loser_rating),
            ratings_after: (winner_rating, loser_rating),
            detail: None,
        }
    }

    fn play_hot<R: Rng + ?Sized>(&self, team1: usize, team2: usize, ratings: &mut RatingBook, rng: &mut R) -> SeriesOutcome {
        let initial_team1_rating = ratings.working(team1);
        let initial_team2_rating = ratings.working(team2);
        let mut team1_rating = initial_team1_rating;
        let mut team2_rating = initial_team2_rating;
        let mut team1_games = BASELINE_GAMES_PLAYED;
        let mut team2_games = BASELINE_GAMES_PLAYED;
        let mut team1_wins: u8 = 0;
        let mut team2_wins: u8 = 0;
        let mut games: Vec<GameRecord> = Vec::with_capacity(7);

        while team1_wins < SERIES_WINS_NEEDED && team2_wins < SERIES_WINS_NEEDED {
            let team1_won = rng.gen::<f64>() < win_probability(team1_rating, team2_rating);
            if team1_won {
                team1_wins += 1;
                (team1_rating, team2_rating) =
                    self.model.update_after_game(team1_rating, team2_rating, SIMULATED_VOTE_WEIGHT, team1_games, team2_games);
            } else {
                team2_wins += 1;
                (team2_rating, team1_rating) =
                    self.model.update_after_game(team2_rating, team1_rating, SIMULATED_VOTE_WEIGHT, team2_games, team1_games);
            }
            team1_games += 1;
            team2_games += 1;
            games.push(GameRecord {
                game_num: games.len() as u8 + 1,
                team1_won,
                team1_rating_after: team1_rating,
                team2_rating_after: team2_rating,
                score: (team1_wins, team2_wins),
            });
        }

        ratings.set_working(team1, team1_rating);
        ratings.set_working(team2, team2_rating);

        let team1_took_series = team1_wins == SERIES_WINS_NEEDED;
        let (winner, loser) = if team1_took_series { (team1, team2) } else { (team2, team1) };
        let (before, after) = if team1_took_series {
            ((initial_team1_rating, initial_team2_rating), (team1_rating, team2_rating))
        } else {
            ((initial_team2_rating, initial_team1_rating), (team2_rating, team1_rating))
        };

        SeriesOutcome {
            winner,
            loser: Some(loser),
            // judged on what each side brought into the series, not the in-series drift
            upset: before.0 < before.1,
            ratings_before: before,
            ratings_after: after,
            detail: Some(SeriesDetail {
                team1,
                team2,
                initial_team1_rating,
                initial_team2_rating,
                final_team1_rating: team1_rating,
                final_team2_rating: team2_rating,
                team1_wins,
                team2_wins,
                games,
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::{ScriptedRng, FAVOR_A, FAVOR_B};
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn hot() -> SeriesSimulator {
        SeriesSimulator::new(SimulationMode::Hot, RatingModel::default())
    }

    fn cold() -> SeriesSimulator {
        SeriesSimulator::new(SimulationMode::Cold, RatingModel::default())
    }

    #[test]
    fn test_mode_parsing() {
        assert_eq!("hot".parse::<SimulationMode>().unwrap(), SimulationMode::Hot);
        assert_eq!(" COLD ".parse::<SimulationMode>().unwrap(), SimulationMode::Cold);
        assert!(matches!("lukewarm".parse::<SimulationMode>(), Err(ConfigError::UnknownMode(_))));
    }

    #[test]
    fn test_cold_favorite_wins_on_low_draw() {
        let mut book = RatingBook::new(vec![1600.0, 1500.0]);
        let outcome = cold().play(Some(0), Some(1), &mut book, &mut ScriptedRng::always_a()).unwrap();
        assert_eq!(outcome.winner, 0);
        assert_eq!(outcome.loser, Some(1));
        assert!(!outcome.upset);
        assert!(outcome.detail.is_none());
    }

    #[test]
    fn test_cold_upset_flag() {
        let mut book = RatingBook::new(vec![1600.0, 1500.0]);
        let outcome = cold().play(Some(0), Some(1), &mut book, &mut ScriptedRng::always_b()).unwrap();
        assert_eq!(outcome.winner, 1);
        assert!(outcome.upset);
        assert_eq!(outcome.ratings_before, (1500.0, 1600.0));
    }

    #[test]
    fn test_cold_equal_ratings_never_upset() {
        let mut book = RatingBook::new(vec![1500.0, 1500.0]);
        let outcome = cold().play(Some(0), Some(1), &mut book, &mut ScriptedRng::always_b()).unwrap();
        assert_eq!(outcome.winner, 1);
        assert!(!outcome.upset);
    }

    #[test]
    fn test_cold_uses_base_ratings() {
        let mut book = RatingBook::new(vec![1500.0, 1500.0]);
        book.set_working(0, 2400.0);
        // draw of 0.75 loses for slot A at even base ratings
        let mut rng = ScriptedRng::new(&[0xC000_0000_0000_0000]);
        let outcome = cold().play(Some(0), Some(1), &mut book, &mut rng).unwrap();
        assert_eq!(outcome.winner, 1);
    }

    #[test]
    fn test_hot_alternating_goes_seven() {
        let mut book = RatingBook::new(vec![1500.0, 1500.0]);
        let outcome = hot().play(Some(0), Some(1), &mut book, &mut ScriptedRng::alternating(7)).unwrap();
        let detail = outcome.detail.unwrap();
        assert_eq!(detail.games_played(), 7);
        assert_eq!((detail.team1_wins, detail.team2_wins), (4, 3));
        assert_eq!(outcome.winner, 0);
        assert!(!outcome.upset);
        assert_eq!(detail.games[6].score, (4, 3));
        assert_eq!(detail.games[0].team1_rating_after, 1561.0);
        assert_eq!(detail.games[0].team2_rating_after, 1439.0);
        // game 2 is played at 11 games each, K = 120.96
        assert!(!detail.games[1].team1_won);
        assert_eq!(detail.games[1].team1_rating_after, 1480.0);
        assert_eq!(detail.games[1].team2_rating_after, 1520.0);
        // the book now carries the post-series ratings
        assert_eq!(book.working(0), detail.final_team1_rating);
        assert_eq!(book.working(1), detail.final_team2_rating);
        assert!(book.is_drifted());
        book.restore();
        assert_eq!(book.working(0), 1500.0);
        assert_eq!(book.working(1), 1500.0);
    }

    #[test]
    fn test_hot_sweep() {
        let mut book = RatingBook::new(vec![1500.0, 1700.0]);
        let outcome = hot().play(Some(0), Some(1), &mut book, &mut ScriptedRng::always_b()).unwrap();
        let detail = outcome.detail.as_ref().unwrap();
        assert_eq!(detail.games_played(), 4);
        assert_eq!((detail.team1_wins, detail.team2_wins), (0, 4));
        assert_eq!(outcome.winner, 1);
        assert!(!outcome.upset);
        assert!(book.working(1) > 1700.0);
        assert!(book.working(0) < 1500.0);
    }

    #[test]
    fn test_hot_upset_judged_on_starting_ratings() {
        // underdog loses the first three, then wins four
        let mut book = RatingBook::new(vec![1450.0, 1550.0]);
        let mut rng = ScriptedRng::new(&[FAVOR_B, FAVOR_B, FAVOR_B, FAVOR_A, FAVOR_A, FAVOR_A, FAVOR_A]);
        let outcome = hot().play(Some(0), Some(1), &mut book, &mut rng).unwrap();
        let detail = outcome.detail.as_ref().unwrap();
        assert_eq!(outcome.winner, 0);
        assert!(outcome.upset);
        assert_eq!(outcome.ratings_before, (1450.0, 1550.0));
        assert!(detail.is_comeback_from_0_3());
        assert_eq!(detail.games_played(), 7);
    }

    #[test]
    fn test_hot_series_always_four_to_seven_games() {
        let mut rng = StdRng::seed_from_u64(7);
        let sim = hot();
        for i in 0..500 {
            let mut book = RatingBook::new(vec![1300.0 + i as f64, 1700.0 - i as f64]);
            let outcome = sim.play(Some(0), Some(1), &mut book, &mut rng).unwrap();
            let detail = outcome.detail.unwrap();
            assert!((4..=7).contains(&detail.games_played()));
            assert_eq!(detail.team1_wins.max(detail.team2_wins), SERIES_WINS_NEEDED);
            assert_eq!(detail.team1_wins as usize + detail.team2_wins as usize, detail.games_played());
        }
    }

    #[test]
    fn test_bye_advances_without_detail() {
        let mut book = RatingBook::new(vec![1500.0, 1800.0]);
        for sim in [hot(), cold()] {
            let outcome = sim.play(None, Some(0), &mut book, &mut ScriptedRng::always_b()).unwrap();
            assert_eq!(outcome.winner, 0);
            assert_eq!(outcome.loser, None);
            assert!(!outcome.upset);
            assert!(outcome.detail.is_none());
        }
        assert!(!book.is_drifted());
    }

    #[test]
    fn test_both_absent_no_result() {
        let mut book = RatingBook::new(vec![1500.0]);
        assert!(hot().play(None, None, &mut book, &mut ScriptedRng::always_a()).is_none());
    }

    #[test]
    fn test_rating_swings() {
        let mut book = RatingBook::new(vec![1500.0, 1500.0]);
        let outcome = hot().play(Some(0), Some(1), &mut book, &mut ScriptedRng::always_a()).unwrap();
        let detail = outcome.detail.unwrap();
        let [s1, s2] = detail.rating_swings();
        assert_eq!(s1, detail.final_team1_rating - 1500.0);
        assert_eq!(s2, 1500.0 - detail.final_team2_rating);
        assert!(!detail.is_comeback_from_0_3());
    }
}
