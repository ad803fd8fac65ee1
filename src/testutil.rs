// Shared fixtures for the unit tests

use crate::ingest::{EntrantRow, Matchup, TournamentInfo};
use rand::RngCore;
use std::collections::VecDeque;

pub fn matchup(id: &str, round: u32, position: i64, parent: Option<&str>, slot: u8, entrants: [Option<usize>; 2]) -> Matchup {
    Matchup {
        id: id.to_string(),
        round,
        position,
        parent: parent.map(str::to_string),
        parent_slot: slot,
        entrants,
    }
}

pub fn entrant_row(id: &str, name: &str, rating: f64) -> EntrantRow {
    EntrantRow {
        entrant_id: id.to_string(),
        display_name: name.to_string(),
        base_rating: Some(rating),
    }
}

/// A(1600) vs B(1500) in M1, C(1500) vs D(1500) in M2, winners meet in M3
pub fn four_team_info() -> TournamentInfo {
    let mut info = TournamentInfo::from_rows(
        vec![
            entrant_row("A", "Alpha", 1600.0),
            entrant_row("B", "Bravo", 1500.0),
            entrant_row("C", "Charlie", 1500.0),
            entrant_row("D", "Delta", 1500.0),
        ],
        Vec::new(),
    )
    .unwrap();
    info.matchups = vec![
        matchup("M1", 1, 0, Some("M3"), 0, [Some(0), Some(1)]),
        matchup("M2", 1, 1, Some("M3"), 1, [Some(2), Some(3)]),
        matchup("M3", 2, 0, None, 0, [None, None]),
    ];
    info
}

/// 2^rounds entrants with ratings spread from 1400 upward, bracketed in order
pub fn power_of_two_info(rounds: u32) -> TournamentInfo {
    let size = 1usize << rounds;
    let rows = (0..size)
        .map(|i| entrant_row(&format!("e{}", i), &format!("Entrant {}", i), 1400.0 + 25.0 * i as f64))
        .collect();
    let mut info = TournamentInfo::from_rows(rows, Vec::new()).unwrap();

    let mut matchups = Vec::new();
    for round in 1..=rounds {
        let games = size >> round;
        for game in 0..games {
            let parent = if round < rounds { Some(format!("r{}g{}", round + 1, game / 2)) } else { None };
            let entrants = if round == 1 { [Some(game * 2), Some(game * 2 + 1)] } else { [None, None] };
            matchups.push(matchup(
                &format!("r{}g{}", round, game),
                round,
                game as i64,
                parent.as_deref(),
                (game % 2) as u8,
                entrants,
            ));
        }
    }
    info.matchups = matchups;
    info
}

/// Feeds a fixed sequence of raw words to rand, so `gen::<f64>()` yields chosen values.
/// 0 maps to 0.0 (slot A wins any game), u64::MAX maps to just under 1.0 (slot B wins).
pub struct ScriptedRng {
    words: VecDeque<u64>,
    fallback: u64,
}

pub const FAVOR_A: u64 = 0;
pub const FAVOR_B: u64 = u64::MAX;

impl ScriptedRng {
    pub fn new(words: &[u64]) -> Self {
        ScriptedRng { words: words.iter().copied().collect(), fallback: FAVOR_A }
    }

    /// Every draw favors slot A
    pub fn always_a() -> Self {
        Self::new(&[])
    }

    pub fn always_b() -> Self {
        ScriptedRng { words: VecDeque::new(), fallback: FAVOR_B }
    }

    pub fn alternating(len: usize) -> Self {
        let words: Vec<u64> = (0..len).map(|i| if i % 2 == 0 { FAVOR_A } else { FAVOR_B }).collect();
        Self::new(&words)
    }
}

impl RngCore for ScriptedRng {
    fn next_u32(&mut self) -> u32 {
        (self.next_u64() >> 32) as u32
    }

    fn next_u64(&mut self) -> u64 {
        self.words.pop_front().unwrap_or(self.fallback)
    }

    fn fill_bytes(&mut self, dest: &mut [u8]) {
        for chunk in dest.chunks_mut(8) {
            let bytes = self.next_u64().to_le_bytes();
            chunk.copy_from_slice(&bytes[..chunk.len()]);
        }
    }

    fn try_fill_bytes(&mut self, dest: &mut [u8]) -> Result<(), rand::Error> {
        self.fill_bytes(dest);
        Ok(())
    }
}
