// This contains the bracket structure the simulations walk.
// Matchups arrive as flat parent-pointer rows (each matchup names the later matchup its winner feeds).
// BracketGraph inverts those pointers once per load into a round-indexed structure plus a feeder table,
// so every trial only pays for lookups.

use crate::ingest::{Matchup, TournamentInfo};
use fnv::FnvHashMap;
use std::collections::BTreeMap;
use std::fmt;
use tracing::{debug, info, warn};

/// Which earlier matchups populate a later matchup's two slots
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Feeders {
    /// Slot 0 feeder first
    Pair(usize, usize),
    /// Only one feeder, the other slot is a bye
    Bye(usize),
    /// Nothing feeds this matchup. Round 1 matchups are seeded directly and always report this.
    Unresolved,
}

/// Problems found while building the graph. None of these stop a run; the affected matchups are skipped.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StructuralIssue {
    NoFeeders { matchup: String, round: u32 },
    ExtraFeeders { matchup: String, count: usize },
    MultipleFinals { round: u32, count: usize },
    UnknownParent { matchup: String, parent: String },
    ParentNotLater { matchup: String, parent: String },
    InvalidRound { matchup: String },
}

impl fmt::Display for StructuralIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StructuralIssue::NoFeeders { matchup, round } => {
                write!(f, "matchup {} in round {} has no feeder matchups", matchup, round)
            }
            StructuralIssue::ExtraFeeders { matchup, count } => {
                write!(f, "matchup {} has {} feeders, using the first two by slot", matchup, count)
            }
            StructuralIssue::MultipleFinals { round, count } => {
                write!(f, "final round {} has {} matchups, using the first by bracket position", round, count)
            }
            StructuralIssue::UnknownParent { matchup, parent } => {
                write!(f, "matchup {} points at unknown parent {}", matchup, parent)
            }
            StructuralIssue::ParentNotLater { matchup, parent } => {
                write!(f, "matchup {} points at parent {} which is not in a later round", matchup, parent)
            }
            StructuralIssue::InvalidRound { matchup } => write!(f, "matchup {} has round number 0", matchup),
        }
    }
}

#[derive(Debug, Clone)]
pub struct BracketGraph {
    /// Sorted by (round, bracket position); everything else indexes into this
    matchups: Vec<Matchup>,
    rounds: BTreeMap<u32, Vec<usize>>,
    feeders: Vec<Feeders>,
    lookup: FnvHashMap<String, usize>,
    issues: Vec<StructuralIssue>,
}

impl BracketGraph {
    pub fn new(tournamentinfo: &TournamentInfo) -> BracketGraph {
        Self::from_matchups(tournamentinfo.matchups.clone())
    }

    pub fn from_matchups(mut matchups: Vec<Matchup>) -> BracketGraph {
        let mut issues: Vec<StructuralIssue> = Vec::new();

        matchups.retain(|m| {
            if m.round == 0 {
                issues.push(StructuralIssue::InvalidRound { matchup: m.id.clone() });
                false
            } else {
                true
            }
        });
        matchups.sort_by(|a, b| (a.round, a.position, &a.id).cmp(&(b.round, b.position, &b.id)));

        let lookup: FnvHashMap<String, usize> = matchups
            .iter()
            .enumerate()
            .map(|(idx, m)| (m.id.clone(), idx))
            .collect();

        let mut rounds: BTreeMap<u32, Vec<usize>> = BTreeMap::new();
        for (idx, m) in matchups.iter().enumerate() {
            rounds.entry(m.round).or_default().push(idx);
        }

        // invert the parent pointers: parent idx -> (slot, child idx)
        let mut children: Vec<Vec<(u8, usize)>> = vec![Vec::new(); matchups.len()];
        for (idx, m) in matchups.iter().enumerate() {
            let Some(parent_id) = &m.parent else { continue };
            match lookup.get(parent_id) {
                None => issues.push(StructuralIssue::UnknownParent {
                    matchup: m.id.clone(),
                    parent: parent_id.clone(),
                }),
                Some(&parent_idx) if matchups[parent_idx].round <= m.round => {
                    issues.push(StructuralIssue::ParentNotLater {
                        matchup: m.id.clone(),
                        parent: parent_id.clone(),
                    })
                }
                Some(&parent_idx) => children[parent_idx].push((m.parent_slot, idx)),
            }
        }

        let mut feeders: Vec<Feeders> = Vec::with_capacity(matchups.len());
        for (idx, m) in matchups.iter().enumerate() {
            if m.round == 1 {
                feeders.push(Feeders::Unresolved);
                continue;
            }
            let candidates = &mut children[idx];
            // children were pushed in (round, position) order, so a stable sort by slot keeps ties deterministic
            candidates.sort_by_key(|&(slot, _)| slot);
            let resolved = match candidates.as_slice() {
                [] => {
                    issues.push(StructuralIssue::NoFeeders { matchup: m.id.clone(), round: m.round });
                    Feeders::Unresolved
                }
                [(_, only)] => Feeders::Bye(*only),
                [(_, first), (_, second)] => Feeders::Pair(*first, *second),
                [(_, first), (_, second), ..] => {
                    issues.push(StructuralIssue::ExtraFeeders {
                        matchup: m.id.clone(),
                        count: candidates.len(),
                    });
                    Feeders::Pair(*first, *second)
                }
            };
            feeders.push(resolved);
        }

        if let Some((&round, final_matchups)) = rounds.iter().next_back() {
            if final_matchups.len() > 1 {
                issues.push(StructuralIssue::MultipleFinals { round, count: final_matchups.len() });
            }
        }

        let graph = BracketGraph { matchups, rounds, feeders, lookup, issues };
        graph.log_structure();
        graph
    }

    fn log_structure(&self) {
        match self.max_round() {
            Some(max_round) => info!("Tournament has {} rounds", max_round),
            None => warn!("bracket has no matchups"),
        }
        for (round, matchups) in &self.rounds {
            debug!("  Round {}: {} matchups", round, matchups.len());
        }
        if let Some(final_idx) = self.championship_matchup() {
            let id = &self.matchups[final_idx].id;
            debug!("  Championship {} fed by {:?}", id, self.feeders_of(id));
        }
        for issue in &self.issues {
            warn!("bracket structure: {}", issue);
        }
    }

    /// Highest round number present, None for an empty bracket
    pub fn max_round(&self) -> Option<u32> {
        self.rounds.keys().next_back().copied()
    }

    /// The first matchup (by bracket position) of the highest round
    pub fn championship_matchup(&self) -> Option<usize> {
        self.rounds.values().next_back().and_then(|m| m.first().copied())
    }

    /// Round numbers present, ascending
    pub fn round_numbers(&self) -> impl Iterator<Item = u32> + '_ {
        self.rounds.keys().copied()
    }

    /// Matchup indices of one round in bracket-position order
    pub fn round(&self, round: u32) -> &[usize] {
        self.rounds.get(&round).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn matchup(&self, idx: usize) -> &Matchup {
        &self.matchups[idx]
    }

    pub fn matchup_index(&self, id: &str) -> Option<usize> {
        self.lookup.get(id).copied()
    }

    pub fn feeders_at(&self, idx: usize) -> Feeders {
        self.feeders[idx]
    }

    pub fn feeders_of(&self, matchup_id: &str) -> Feeders {
        self.matchup_index(matchup_id)
            .map(|idx| self.feeders[idx])
            .unwrap_or(Feeders::Unresolved)
    }

    pub fn len(&self) -> usize {
        self.matchups.len()
    }

    pub fn is_empty(&self) -> bool {
        self.matchups.is_empty()
    }

    pub fn issues(&self) -> &[StructuralIssue] {
        &self.issues
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::{four_team_info, matchup};

    #[test]
    fn test_four_team_structure() {
        let graph = BracketGraph::new(&four_team_info());
        assert_eq!(graph.len(), 3);
        assert_eq!(graph.max_round(), Some(2));
        assert_eq!(graph.round_numbers().collect::<Vec<_>>(), vec![1, 2]);
        assert_eq!(graph.round(1).len(), 2);
        let final_idx = graph.championship_matchup().unwrap();
        assert_eq!(graph.matchup(final_idx).id, "M3");
        assert!(graph.issues().is_empty());
    }

    #[test]
    fn test_feeders_ordered_by_slot() {
        let graph = BracketGraph::new(&four_team_info());
        let m1 = graph.matchup_index("M1").unwrap();
        let m2 = graph.matchup_index("M2").unwrap();
        assert_eq!(graph.feeders_of("M3"), Feeders::Pair(m1, m2));
    }

    #[test]
    fn test_slot_beats_row_order() {
        // M2 appears first and has a lower bracket position but feeds slot 1
        let graph = BracketGraph::from_matchups(vec![
            matchup("M2", 1, 0, Some("F"), 1, [Some(2), Some(3)]),
            matchup("M1", 1, 1, Some("F"), 0, [Some(0), Some(1)]),
            matchup("F", 2, 0, None, 0, [None, None]),
        ]);
        let m1 = graph.matchup_index("M1").unwrap();
        let m2 = graph.matchup_index("M2").unwrap();
        assert_eq!(graph.feeders_of("F"), Feeders::Pair(m1, m2));
    }

    #[test]
    fn test_rounds_sorted_by_position() {
        let graph = BracketGraph::from_matchups(vec![
            matchup("b", 1, 7, Some("F"), 1, [Some(2), Some(3)]),
            matchup("a", 1, 3, Some("F"), 0, [Some(0), Some(1)]),
            matchup("F", 2, 0, None, 0, [None, None]),
        ]);
        let ids: Vec<&str> = graph.round(1).iter().map(|&i| graph.matchup(i).id.as_str()).collect();
        assert_eq!(ids, vec!["a", "b"]);
    }

    #[test]
    fn test_single_feeder_is_bye() {
        let graph = BracketGraph::from_matchups(vec![
            matchup("M1", 1, 0, Some("F"), 0, [Some(0), Some(1)]),
            matchup("F", 2, 0, None, 0, [None, None]),
        ]);
        let m1 = graph.matchup_index("M1").unwrap();
        assert_eq!(graph.feeders_of("F"), Feeders::Bye(m1));
        assert!(graph.issues().is_empty());
    }

    #[test]
    fn test_orphan_matchup_reported() {
        let graph = BracketGraph::from_matchups(vec![
            matchup("M1", 1, 0, Some("S1"), 0, [Some(0), Some(1)]),
            matchup("M2", 1, 1, Some("S1"), 1, [Some(2), Some(3)]),
            matchup("S1", 2, 0, Some("F"), 0, [None, None]),
            matchup("S2", 2, 1, Some("F"), 1, [None, None]),
            matchup("F", 3, 0, None, 0, [None, None]),
        ]);
        assert_eq!(graph.feeders_of("S2"), Feeders::Unresolved);
        assert_eq!(
            graph.issues(),
            &[StructuralIssue::NoFeeders { matchup: "S2".to_string(), round: 2 }]
        );
    }

    #[test]
    fn test_extra_feeders_truncated() {
        let graph = BracketGraph::from_matchups(vec![
            matchup("a", 1, 0, Some("F"), 0, [Some(0), Some(1)]),
            matchup("b", 1, 1, Some("F"), 1, [Some(2), Some(3)]),
            matchup("c", 1, 2, Some("F"), 1, [Some(4), Some(5)]),
            matchup("F", 2, 0, None, 0, [None, None]),
        ]);
        let a = graph.matchup_index("a").unwrap();
        let b = graph.matchup_index("b").unwrap();
        assert_eq!(graph.feeders_of("F"), Feeders::Pair(a, b));
        assert!(matches!(graph.issues()[0], StructuralIssue::ExtraFeeders { count: 3, .. }));
    }

    #[test]
    fn test_bad_parent_pointers_ignored() {
        let graph = BracketGraph::from_matchups(vec![
            matchup("a", 1, 0, Some("nowhere"), 0, [Some(0), Some(1)]),
            matchup("b", 1, 1, Some("a"), 0, [Some(2), Some(3)]),
        ]);
        assert!(graph.issues().contains(&StructuralIssue::UnknownParent {
            matchup: "a".to_string(),
            parent: "nowhere".to_string()
        }));
        assert!(graph.issues().contains(&StructuralIssue::ParentNotLater {
            matchup: "b".to_string(),
            parent: "a".to_string()
        }));
    }

    #[test]
    fn test_multiple_finals_picks_first() {
        let graph = BracketGraph::from_matchups(vec![
            matchup("x", 1, 5, None, 0, [Some(0), Some(1)]),
            matchup("y", 1, 2, None, 0, [Some(2), Some(3)]),
        ]);
        let y = graph.matchup_index("y").unwrap();
        assert_eq!(graph.championship_matchup(), Some(y));
        assert_eq!(graph.issues(), &[StructuralIssue::MultipleFinals { round: 1, count: 2 }]);
    }

    #[test]
    fn test_empty_bracket() {
        let graph = BracketGraph::from_matchups(Vec::new());
        assert!(graph.is_empty());
        assert_eq!(graph.max_round(), None);
        assert_eq!(graph.championship_matchup(), None);
        assert_eq!(graph.feeders_of("anything"), Feeders::Unresolved);
    }

    #[test]
    fn test_round_zero_dropped() {
        let graph = BracketGraph::from_matchups(vec![matchup("z", 0, 0, None, 0, [Some(0), Some(1)])]);
        assert!(graph.is_empty());
        assert_eq!(graph.issues(), &[StructuralIssue::InvalidRound { matchup: "z".to_string() }]);
    }
}
