// This file ingests the entrant and matchup tables produced by the rating fitters and stores them
// in a form the simulation can index cheaply.
// Entrants are addressed by a dense index (like a team_index) so per-trial state can live in plain Vecs.

use crate::elo::DEFAULT_RATING;
use crate::error::IngestError;
use fnv::{FnvHashMap, FnvHashSet};
use serde::{Deserialize, Serialize};
use std::io::Read;
use tracing::{info, warn};

/// One row of the entrant table
#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct EntrantRow {
    #[serde(alias = "team_id")]
    pub entrant_id: String,
    #[serde(alias = "username")]
    pub display_name: String,
    #[serde(alias = "elo", default)]
    pub base_rating: Option<f64>,
}

/// One row of the matchup table. Empty cells deserialize to None.
#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct MatchupRow {
    #[serde(alias = "matchup_id")]
    pub id: String,
    pub round_number: u32,
    pub bracket_position: i64,
    #[serde(default)]
    pub parent_matchup_id: Option<String>,
    #[serde(alias = "parent_slot", default)]
    pub parent_position: Option<u8>,
    #[serde(default)]
    pub team1_id: Option<String>,
    #[serde(default)]
    pub team2_id: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Entrant {
    pub id: String,
    pub name: String,
    /// Pre-tournament strength, fixed for the whole run
    pub base_rating: f64,
    /// Index into TournamentInfo::entrants
    pub index: usize,
}

/// A matchup with its round-1 entrants resolved against the entrant table
#[derive(Debug, Clone, PartialEq)]
pub struct Matchup {
    pub id: String,
    pub round: u32,
    pub position: i64,
    pub parent: Option<String>,
    /// 0 puts this matchup's winner in the parent's first slot, 1 in the second
    pub parent_slot: u8,
    /// Only meaningful in round 1; None is an empty slot (bye) or an unknown entrant
    pub entrants: [Option<usize>; 2],
}

#[derive(Debug, Clone)]
pub struct TournamentInfo {
    pub entrants: Vec<Entrant>,
    pub matchups: Vec<Matchup>,
    entrant_lookup: FnvHashMap<String, usize>,
}

impl TournamentInfo {
    /// Load both tables from csv files on disk
    pub fn from_csv_files(teams_path: &str, matchups_path: &str) -> Result<TournamentInfo, IngestError> {
        let teams = csv::Reader::from_path(teams_path).map_err(|source| IngestError::Open {
            path: teams_path.to_string(),
            source,
        })?;
        let matchups = csv::Reader::from_path(matchups_path).map_err(|source| IngestError::Open {
            path: matchups_path.to_string(),
            source,
        })?;
        let info = Self::from_csv_readers(teams, matchups)?;
        info!(
            entrants = info.entrants.len(),
            matchups = info.matchups.len(),
            "loaded {} and {}",
            teams_path,
            matchups_path
        );
        Ok(info)
    }

    pub fn from_csv_readers<T: Read, M: Read>(
        mut teams: csv::Reader<T>,
        mut matchups: csv::Reader<M>,
    ) -> Result<TournamentInfo, IngestError> {
        let entrant_rows = teams
            .deserialize()
            .collect::<Result<Vec<EntrantRow>, _>>()
            .map_err(|source| IngestError::Row { table: "entrant", source })?;
        let matchup_rows = matchups
            .deserialize()
            .collect::<Result<Vec<MatchupRow>, _>>()
            .map_err(|source| IngestError::Row { table: "matchup", source })?;
        Self::from_rows(entrant_rows, matchup_rows)
    }

    pub fn from_rows(entrant_rows: Vec<EntrantRow>, matchup_rows: Vec<MatchupRow>) -> Result<TournamentInfo, IngestError> {
        let mut entrants: Vec<Entrant> = Vec::with_capacity(entrant_rows.len());
        let mut entrant_lookup: FnvHashMap<String, usize> = FnvHashMap::default();

        for row in entrant_rows {
            if entrant_lookup.contains_key(&row.entrant_id) {
                return Err(IngestError::DuplicateEntrant(row.entrant_id));
            }
            let index = entrants.len();
            entrant_lookup.insert(row.entrant_id.clone(), index);
            entrants.push(Entrant {
                id: row.entrant_id,
                name: row.display_name,
                base_rating: row.base_rating.filter(|r| r.is_finite()).unwrap_or(DEFAULT_RATING),
                index,
            });
        }

        let mut info = TournamentInfo {
            entrants,
            matchups: Vec::with_capacity(matchup_rows.len()),
            entrant_lookup,
        };
        let mut seen_matchups: FnvHashSet<String> = FnvHashSet::default();
        for row in matchup_rows {
            if !seen_matchups.insert(row.id.clone()) {
                return Err(IngestError::DuplicateMatchup(row.id));
            }
            let entrants_in_slots = if row.round_number == 1 {
                [
                    info.resolve_slot(&row.id, row.team1_id.as_deref()),
                    info.resolve_slot(&row.id, row.team2_id.as_deref()),
                ]
            } else {
                [None, None]
            };
            info.matchups.push(Matchup {
                id: row.id,
                round: row.round_number,
                position: row.bracket_position,
                parent: row.parent_matchup_id.filter(|p| !p.is_empty()),
                parent_slot: row.parent_position.unwrap_or(0),
                entrants: entrants_in_slots,
            });
        }

        Ok(info)
    }

    /// Round-1 slot entrant; blank or unknown ids leave the slot empty
    fn resolve_slot(&self, matchup_id: &str, id: Option<&str>) -> Option<usize> {
        let id = id.filter(|id| !id.is_empty())?;
        let index = self.entrant_index(id);
        if index.is_none() {
            warn!(matchup = matchup_id, entrant = id, "entrant not in entrant table, treating slot as empty");
        }
        index
    }

    /// Get an entrant's dense index by id
    pub fn entrant_index(&self, id: &str) -> Option<usize> {
        self.entrant_lookup.get(id).copied()
    }

    pub fn entrant(&self, index: usize) -> &Entrant {
        &self.entrants[index]
    }

    pub fn base_ratings(&self) -> Vec<f64> {
        self.entrants.iter().map(|e| e.base_rating).collect()
    }
}

/// Base and working ratings for one simulation worker.
/// Working ratings drift during hot series and are restored from the base checkpoint before every trial.
#[derive(Debug, Clone)]
pub struct RatingBook {
    base: Vec<f64>,
    working: Vec<f64>,
}

impl RatingBook {
    pub fn new(base: Vec<f64>) -> Self {
        let working = base.clone();
        RatingBook { base, working }
    }

    pub fn from_tournament(info: &TournamentInfo) -> Self {
        Self::new(info.base_ratings())
    }

    #[inline]
    pub fn base(&self, index: usize) -> f64 {
        self.base[index]
    }

    #[inline]
    pub fn working(&self, index: usize) -> f64 {
        self.working[index]
    }

    #[inline]
    pub fn set_working(&mut self, index: usize, rating: f64) {
        self.working[index] = rating;
    }

    /// Restore every working rating to its base rating
    pub fn restore(&mut self) {
        self.working.copy_from_slice(&self.base);
    }

    #[cfg(test)]
    pub fn is_drifted(&self) -> bool {
        self.base != self.working
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const TEAMS_CSV: &str = "team_id,username,elo
a,Alpha,1600
b,Bravo,
c,Charlie,1450.5
";

    const MATCHUPS_CSV: &str = "id,round_number,bracket_position,parent_matchup_id,parent_position,team1_id,team2_id
m1,1,0,f,0,a,b
m2,1,1,f,1,c,ghost
f,2,0,,,,
";

    fn load(teams: &str, matchups: &str) -> Result<TournamentInfo, IngestError> {
        TournamentInfo::from_csv_readers(
            csv::Reader::from_reader(teams.as_bytes()),
            csv::Reader::from_reader(matchups.as_bytes()),
        )
    }

    #[test]
    fn test_load_tables() {
        let info = load(TEAMS_CSV, MATCHUPS_CSV).unwrap();
        assert_eq!(info.entrants.len(), 3);
        assert_eq!(info.matchups.len(), 3);
        assert_eq!(info.entrant(0).name, "Alpha");
        assert_eq!(info.entrant(0).base_rating, 1600.0);
        assert_eq!(info.entrant_index("c"), Some(2));
    }

    #[test]
    fn test_missing_rating_defaults() {
        let info = load(TEAMS_CSV, MATCHUPS_CSV).unwrap();
        assert_eq!(info.entrant(1).base_rating, DEFAULT_RATING);
    }

    #[test]
    fn test_unknown_entrant_becomes_empty_slot() {
        let info = load(TEAMS_CSV, MATCHUPS_CSV).unwrap();
        let m2 = info.matchups.iter().find(|m| m.id == "m2").unwrap();
        assert_eq!(m2.entrants, [Some(2), None]);
        assert_eq!(m2.parent.as_deref(), Some("f"));
        assert_eq!(m2.parent_slot, 1);
    }

    #[test]
    fn test_final_has_no_parent() {
        let info = load(TEAMS_CSV, MATCHUPS_CSV).unwrap();
        let f = info.matchups.iter().find(|m| m.id == "f").unwrap();
        assert_eq!(f.parent, None);
        assert_eq!(f.round, 2);
        assert_eq!(f.entrants, [None, None]);
    }

    #[test]
    fn test_alias_columns() {
        let teams = "entrant_id,display_name,base_rating\nx,Xray,1510\n";
        let matchups = "matchup_id,round_number,bracket_position,parent_matchup_id,parent_slot,team1_id,team2_id\nm,1,0,,,x,\n";
        let info = load(teams, matchups).unwrap();
        assert_eq!(info.entrant(0).id, "x");
        assert_eq!(info.matchups[0].entrants, [Some(0), None]);
    }

    #[test]
    fn test_duplicate_entrant_rejected() {
        let teams = "team_id,username,elo\na,Alpha,1500\na,Again,1500\n";
        let err = load(teams, MATCHUPS_CSV).unwrap_err();
        assert!(matches!(err, IngestError::DuplicateEntrant(id) if id == "a"));
    }

    #[test]
    fn test_duplicate_matchup_rejected() {
        let matchups = "id,round_number,bracket_position,parent_matchup_id,parent_position,team1_id,team2_id\nm,1,0,,,a,b\nm,1,1,,,c,\n";
        let err = load(TEAMS_CSV, matchups).unwrap_err();
        assert!(matches!(err, IngestError::DuplicateMatchup(id) if id == "m"));
    }

    #[test]
    fn test_malformed_row() {
        let matchups = "id,round_number,bracket_position,parent_matchup_id,parent_position,team1_id,team2_id\nm,first,0,,,a,b\n";
        let err = load(TEAMS_CSV, matchups).unwrap_err();
        assert!(matches!(err, IngestError::Row { table: "matchup", .. }));
    }

    #[test]
    fn test_rating_book_restore() {
        let mut book = RatingBook::new(vec![1500.0, 1620.0]);
        book.set_working(0, 1711.0);
        book.set_working(1, 1388.0);
        assert!(book.is_drifted());
        book.restore();
        assert!(!book.is_drifted());
        assert_eq!(book.working(0), 1500.0);
        assert_eq!(book.working(1), 1620.0);
        assert_eq!(book.base(1), 1620.0);
    }
}
