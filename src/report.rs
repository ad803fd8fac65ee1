// Presentation of a finished run: the console report, CSV/JSON exports
// and the rating-vs-success breakdown.

use crate::aggregate::{
    ChampionshipOdds, RoundOdds, RunSummary, SeriesStatistics, SimulationAggregator, TournamentSummary,
    UpsetStatistics,
};
use crate::config::TopN;
use crate::error::ExportError;
use serde::Serialize;
use std::collections::BTreeMap;
use std::fs::File;
use std::io::{BufWriter, Write};
use tracing::info;

/// Rows per table in the round-advancement section
const ROUND_TABLE_ROWS: usize = 10;

/// Largest upsets listed in the console report
const UPSET_TABLE_ROWS: usize = 5;

/// Entrants below this rating count as dark horses
const DARK_HORSE_RATING: f64 = 1650.0;

/// How many favourites the "top share" insight adds up
const TOP_SHARE_COUNT: usize = 10;

/// Rating bands as [low, high)
const RATING_BANDS: [(f64, f64); 5] = [
    (f64::NEG_INFINITY, 1600.0),
    (1600.0, 1700.0),
    (1700.0, 1750.0),
    (1750.0, 1800.0),
    (1800.0, f64::INFINITY),
];

/// One exported line per entrant
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EntrantExportRow {
    pub team_id: String,
    pub username: String,
    pub elo: f64,
    pub championships: u64,
    pub championship_probability: f64,
    /// round -> probability of winning a matchup in that round
    pub round_probabilities: BTreeMap<u32, f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RatingBand {
    pub label: String,
    pub entrants: usize,
    pub mean_championship_probability: f64,
    pub total_championship_probability: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RatingSuccessSummary {
    /// Pearson correlation of base rating against championship probability
    pub championship_correlation: Option<f64>,
    /// Same against reaching the last four, when the bracket is deep enough
    pub final_four_correlation: Option<f64>,
    pub bands: Vec<RatingBand>,
}

/// One logged upset, with entrants named
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct UpsetLogRow {
    pub round: u32,
    pub winner_id: String,
    pub winner_name: String,
    pub loser_id: String,
    pub loser_name: String,
    pub winner_rating_before: f64,
    pub loser_rating_before: f64,
    pub winner_rating_after: f64,
    pub loser_rating_after: f64,
}

/// Entrants that share a display name, added up
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DisplayNameTotal {
    pub display_name: String,
    pub entrants: usize,
    pub mean_rating: f64,
    pub max_rating: f64,
    pub min_rating: f64,
    pub total_championship_probability: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RoundAdvancementSummary {
    pub round: u32,
    pub name: String,
    pub mean_probability: f64,
    pub top_probability: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct KeyInsights {
    /// (display name, championship probability)
    pub favorite: Option<(String, f64)>,
    /// (display name, base rating)
    pub highest_rated: Option<(String, f64)>,
    pub entrants_with_title: usize,
    pub mean_championship_probability: f64,
    /// Best title chance among entrants rated under the dark-horse line
    pub dark_horse_probability: Option<f64>,
    pub rating_range: Option<(f64, f64)>,
    pub top_ten_share: f64,
}

/// The post-run breakdown printed by `--analyze`
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TournamentAnalysis {
    pub rating_success: RatingSuccessSummary,
    pub display_names: Vec<DisplayNameTotal>,
    pub rounds: Vec<RoundAdvancementSummary>,
    pub insights: KeyInsights,
}

/// Everything the JSON export carries
#[derive(Debug, Clone, Serialize)]
pub struct JsonReport {
    pub run: Option<RunSummary>,
    pub summary: TournamentSummary,
    pub championship_odds: Vec<ChampionshipOdds>,
    pub round_advancement: BTreeMap<u32, Vec<RoundOdds>>,
    pub series_statistics: Option<SeriesStatistics>,
    pub upset_statistics: Option<UpsetStatistics>,
    pub upsets: Vec<UpsetLogRow>,
    pub analysis: TournamentAnalysis,
    pub entrants: Vec<EntrantExportRow>,
}

/// Rounds shown in the console report
pub fn key_rounds(max_round: u32) -> Vec<u32> {
    let mut rounds = if max_round >= 6 { vec![2, 4, 6, max_round] } else { vec![2, max_round] };
    rounds.retain(|r| (1..=max_round).contains(r));
    rounds.dedup();
    rounds
}

/// Name a round by how many entrants are still standing after it
pub fn round_name(round: u32, max_round: u32) -> String {
    match max_round.checked_sub(round) {
        Some(0) => "Championship".to_string(),
        Some(1) => "Finalists".to_string(),
        Some(2) => "Final Four".to_string(),
        Some(3) => "Elite 8".to_string(),
        Some(4) => "Sweet 16".to_string(),
        _ => format!("Round {}", round),
    }
}

/// One row per entrant, best championship probability first
pub fn export_rows(agg: &SimulationAggregator) -> Vec<EntrantExportRow> {
    let rounds: Vec<u32> = agg.graph().round_numbers().collect();
    let stats = agg.statistics();
    let mut rows: Vec<EntrantExportRow> = agg
        .info()
        .entrants
        .iter()
        .map(|e| EntrantExportRow {
            team_id: e.id.clone(),
            username: e.name.clone(),
            elo: e.base_rating,
            championships: stats.championships.get(e.index).copied().unwrap_or(0),
            championship_probability: agg.championship_probability(e.index),
            round_probabilities: rounds.iter().map(|&r| (r, agg.round_probability(r, e.index))).collect(),
        })
        .collect();
    // stable, so equal probabilities keep entrant order
    rows.sort_by(|a, b| b.championship_probability.total_cmp(&a.championship_probability));
    rows
}

/// The upset log in the order the trials produced it
pub fn upset_log(agg: &SimulationAggregator) -> Vec<UpsetLogRow> {
    let info = agg.info();
    agg.statistics()
        .upsets
        .iter()
        .map(|u| {
            let winner = info.entrant(u.winner);
            let loser = info.entrant(u.loser);
            UpsetLogRow {
                round: u.round,
                winner_id: winner.id.clone(),
                winner_name: winner.name.clone(),
                loser_id: loser.id.clone(),
                loser_name: loser.name.clone(),
                winner_rating_before: u.winner_rating_before,
                loser_rating_before: u.loser_rating_before,
                winner_rating_after: u.winner_rating_after,
                loser_rating_after: u.loser_rating_after,
            }
        })
        .collect()
}

/// Write the per-entrant table as CSV with a `round_<r>_prob` column per round
pub fn write_csv<W: Write>(agg: &SimulationAggregator, writer: W) -> Result<(), ExportError> {
    let rounds: Vec<u32> = agg.graph().round_numbers().collect();
    let mut wtr = csv::Writer::from_writer(writer);

    let mut header: Vec<String> = ["team_id", "username", "elo", "championships", "championship_probability"]
        .iter()
        .map(|s| s.to_string())
        .collect();
    header.extend(rounds.iter().map(|r| format!("round_{}_prob", r)));
    wtr.write_record(&header)?;

    for row in export_rows(agg) {
        let mut record = vec![
            row.team_id,
            row.username,
            row.elo.to_string(),
            row.championships.to_string(),
            row.championship_probability.to_string(),
        ];
        record.extend(rounds.iter().map(|r| row.round_probabilities.get(r).copied().unwrap_or(0.0).to_string()));
        wtr.write_record(&record)?;
    }
    wtr.flush().map_err(csv::Error::from)?;
    Ok(())
}

pub fn export_csv(agg: &SimulationAggregator, path: &str) -> Result<(), ExportError> {
    let file = File::create(path).map_err(|source| ExportError::Io { path: path.to_string(), source })?;
    write_csv(agg, BufWriter::new(file))?;
    info!("Results exported to {}", path);
    Ok(())
}

pub fn build_report(agg: &SimulationAggregator, top_n: TopN, run: Option<RunSummary>) -> JsonReport {
    JsonReport {
        run,
        summary: agg.summary(),
        championship_odds: agg.championship_odds(top_n),
        round_advancement: agg
            .graph()
            .round_numbers()
            .map(|r| (r, agg.round_advancement_odds(r, top_n)))
            .collect(),
        series_statistics: agg.series_statistics(),
        upset_statistics: agg.upset_statistics(),
        upsets: upset_log(agg),
        analysis: analyze(agg),
        entrants: export_rows(agg),
    }
}

pub fn export_json(agg: &SimulationAggregator, top_n: TopN, run: Option<RunSummary>, path: &str) -> Result<(), ExportError> {
    let file = File::create(path).map_err(|source| ExportError::Io { path: path.to_string(), source })?;
    let mut writer = BufWriter::new(file);
    serde_json::to_writer_pretty(&mut writer, &build_report(agg, top_n, run))?;
    writer.flush().map_err(|source| ExportError::Io { path: path.to_string(), source })?;
    info!("Report exported to {}", path);
    Ok(())
}

/// Pearson correlation; None with fewer than two points or no spread
pub fn pearson(xs: &[f64], ys: &[f64]) -> Option<f64> {
    let n = xs.len().min(ys.len());
    if n < 2 {
        return None;
    }
    let mean_x = xs[..n].iter().sum::<f64>() / n as f64;
    let mean_y = ys[..n].iter().sum::<f64>() / n as f64;
    let (mut cov, mut var_x, mut var_y) = (0.0, 0.0, 0.0);
    for (x, y) in xs.iter().zip(ys) {
        let (dx, dy) = (x - mean_x, y - mean_y);
        cov += dx * dy;
        var_x += dx * dx;
        var_y += dy * dy;
    }
    if var_x == 0.0 || var_y == 0.0 {
        return None;
    }
    Some(cov / (var_x * var_y).sqrt())
}

pub fn rating_success_summary(agg: &SimulationAggregator) -> RatingSuccessSummary {
    let entrants = &agg.info().entrants;
    let ratings: Vec<f64> = entrants.iter().map(|e| e.base_rating).collect();
    let champ: Vec<f64> = entrants.iter().map(|e| agg.championship_probability(e.index)).collect();

    let final_four_correlation = agg
        .graph()
        .max_round()
        .and_then(|max| max.checked_sub(2))
        .filter(|&r| r >= 1)
        .and_then(|round| {
            let reach: Vec<f64> = entrants.iter().map(|e| agg.round_probability(round, e.index)).collect();
            pearson(&ratings, &reach)
        });

    let bands = RATING_BANDS
        .iter()
        .filter_map(|&(low, high)| {
            let in_band: Vec<f64> = ratings
                .iter()
                .zip(&champ)
                .filter(|&(&r, _)| r >= low && r < high)
                .map(|(_, &p)| p)
                .collect();
            if in_band.is_empty() {
                return None;
            }
            let total: f64 = in_band.iter().sum();
            Some(RatingBand {
                label: band_label(low, high),
                entrants: in_band.len(),
                mean_championship_probability: total / in_band.len() as f64,
                total_championship_probability: total,
            })
        })
        .collect();

    RatingSuccessSummary {
        championship_correlation: pearson(&ratings, &champ),
        final_four_correlation,
        bands,
    }
}

/// Display names carried by more than one entrant, highest combined title chance first
pub fn display_name_totals(rows: &[EntrantExportRow]) -> Vec<DisplayNameTotal> {
    let mut groups: BTreeMap<&str, Vec<&EntrantExportRow>> = BTreeMap::new();
    for row in rows {
        groups.entry(row.username.as_str()).or_default().push(row);
    }

    let mut totals: Vec<DisplayNameTotal> = groups
        .into_iter()
        .filter(|(_, group)| group.len() > 1)
        .map(|(name, group)| {
            let ratings: Vec<f64> = group.iter().map(|r| r.elo).collect();
            DisplayNameTotal {
                display_name: name.to_string(),
                entrants: group.len(),
                mean_rating: ratings.iter().sum::<f64>() / ratings.len() as f64,
                max_rating: ratings.iter().copied().fold(f64::MIN, f64::max),
                min_rating: ratings.iter().copied().fold(f64::MAX, f64::min),
                total_championship_probability: group.iter().map(|r| r.championship_probability).sum(),
            }
        })
        .collect();
    totals.sort_by(|a, b| b.total_championship_probability.total_cmp(&a.total_championship_probability));
    totals
}

/// Mean and best advancement probability for every round
pub fn round_advancement_summary(rows: &[EntrantExportRow], max_round: u32) -> Vec<RoundAdvancementSummary> {
    if rows.is_empty() {
        return Vec::new();
    }
    let rounds: Vec<u32> = rows[0].round_probabilities.keys().copied().collect();
    rounds
        .into_iter()
        .map(|round| {
            let probs: Vec<f64> = rows
                .iter()
                .map(|r| r.round_probabilities.get(&round).copied().unwrap_or(0.0))
                .collect();
            RoundAdvancementSummary {
                round,
                name: round_name(round, max_round),
                mean_probability: probs.iter().sum::<f64>() / probs.len() as f64,
                top_probability: probs.iter().copied().fold(0.0, f64::max),
            }
        })
        .collect()
}

/// Expects rows sorted best championship probability first, as `export_rows` returns them
pub fn key_insights(rows: &[EntrantExportRow]) -> KeyInsights {
    let favorite = rows.first().map(|r| (r.username.clone(), r.championship_probability));
    let highest_rated = rows
        .iter()
        .max_by(|a, b| a.elo.total_cmp(&b.elo))
        .map(|r| (r.username.clone(), r.elo));
    let dark_horse_probability = rows
        .iter()
        .filter(|r| r.elo < DARK_HORSE_RATING && r.championship_probability > 0.0)
        .map(|r| r.championship_probability)
        .reduce(f64::max);
    let rating_range = rows.iter().map(|r| (r.elo, r.elo)).reduce(|(lo, hi), (a, b)| (lo.min(a), hi.max(b)));
    let mean_championship_probability = if rows.is_empty() {
        0.0
    } else {
        rows.iter().map(|r| r.championship_probability).sum::<f64>() / rows.len() as f64
    };

    KeyInsights {
        favorite,
        highest_rated,
        entrants_with_title: rows.iter().filter(|r| r.championship_probability > 0.0).count(),
        mean_championship_probability,
        dark_horse_probability,
        rating_range,
        top_ten_share: rows.iter().take(TOP_SHARE_COUNT).map(|r| r.championship_probability).sum(),
    }
}

pub fn analyze(agg: &SimulationAggregator) -> TournamentAnalysis {
    let rows = export_rows(agg);
    TournamentAnalysis {
        rating_success: rating_success_summary(agg),
        display_names: display_name_totals(&rows),
        rounds: round_advancement_summary(&rows, agg.graph().max_round().unwrap_or(0)),
        insights: key_insights(&rows),
    }
}

fn band_label(low: f64, high: f64) -> String {
    if low == f64::NEG_INFINITY {
        format!("<{}", high)
    } else if high == f64::INFINITY {
        format!("{}+", low)
    } else {
        format!("{}-{}", low, high)
    }
}

pub fn print_report(agg: &SimulationAggregator, top_n: TopN) {
    let trials = agg.trials_run();
    println!("\n{}", "=".repeat(80));
    println!("TOURNAMENT SIMULATION RESULTS ({} simulations, {})", trials, agg.settings().mode);
    println!("{}", "=".repeat(80));

    if trials == 0 {
        println!("\nNo trials were run; there are no odds to report.");
        return;
    }

    let title = match top_n {
        TopN::Count(n) => format!("Top {}", n),
        TopN::All => "All".to_string(),
    };
    println!("\nCHAMPIONSHIP ODDS ({}):", title);
    println!("{:<4} {:<20} {:<40} {:<8} {:<12} Odds", "Rank", "Username", "Team ID", "Wins", "Probability");
    println!("{}", "-".repeat(100));
    for (rank, odds) in agg.championship_odds(top_n).iter().enumerate() {
        println!(
            "{:<4} {:<20} {:<40} {:<8} {:<12} {}",
            rank + 1,
            odds.display_name,
            odds.entrant_id,
            odds.wins,
            format!("{:.3}%", odds.probability * 100.0),
            odds.odds
        );
    }

    if let Some(max_round) = agg.graph().max_round() {
        for round in key_rounds(max_round) {
            let round_odds = agg.round_advancement_odds(round, TopN::Count(ROUND_TABLE_ROWS));
            if round_odds.is_empty() {
                continue;
            }
            println!("\n{} ODDS (Top {}):", round_name(round, max_round).to_uppercase(), ROUND_TABLE_ROWS);
            println!("{:<20} {:<40} {:<8} Probability", "Username", "Team ID", "Reaches");
            println!("{}", "-".repeat(80));
            for odds in round_odds {
                println!(
                    "{:<20} {:<40} {:<8} {:.3}%",
                    odds.display_name,
                    odds.entrant_id,
                    odds.reaches,
                    odds.probability * 100.0
                );
            }
        }
    }

    if let Some(series) = agg.series_statistics() {
        println!("\nSERIES ANALYSIS (Hot Simulation):");
        println!("  Total series played: {}", series.total_series);
        println!("  Average series length: {:.2} games", series.mean_length);
        println!("  Sweeps (4-0): {}", series.sweeps);
        println!("  Seven-game series: {}", series.seven_game_series);
        println!("  Comebacks from 0-3: {}", series.comebacks_from_0_3);
        println!("  Average rating swing per team: {:.1}", series.mean_rating_swing);
        println!("  Maximum rating swing: {:.1}", series.max_rating_swing);
        println!("\n  Series length distribution:");
        for (length, count) in &series.length_distribution {
            let pct = *count as f64 / series.total_series as f64 * 100.0;
            println!("    {} games: {} ({:.1}%)", length, count, pct);
        }
    }

    if let Some(upsets) = agg.upset_statistics() {
        println!("\nUPSET ANALYSIS:");
        println!("  Total upsets: {}", upsets.total_upsets);
        println!("  Upsets per simulation: {:.2}", upsets.upsets_per_trial);
        println!("  Average rating gap in upsets: {:.1}", upsets.mean_rating_gap);
        println!("  Biggest upset (rating gap): {:.1}", upsets.biggest_upset_gap);
        for (round, count) in &upsets.upsets_by_round {
            println!("    Round {}: {}", round, count);
        }

        let mut log = upset_log(agg);
        log.sort_by(|a, b| {
            let gap_a = a.loser_rating_before - a.winner_rating_before;
            let gap_b = b.loser_rating_before - b.winner_rating_before;
            gap_b.total_cmp(&gap_a)
        });
        println!("\n  Largest upsets:");
        for row in log.iter().take(UPSET_TABLE_ROWS) {
            println!(
                "    Round {}: {} ({:.0}) over {} ({:.0})",
                row.round, row.winner_name, row.winner_rating_before, row.loser_name, row.loser_rating_before
            );
        }
    }

    let summary = agg.summary();
    println!("\nTOURNAMENT SUMMARY:");
    println!("  Total teams: {}", summary.entrants);
    println!("  Teams that won at least one championship: {}", summary.entrants_with_title);
    println!("  Competitive balance: {:.1}% of teams have a chance", summary.competitive_balance * 100.0);
    if summary.unresolved_trials > 0 {
        println!("  Trials without a champion: {}", summary.unresolved_trials);
    }
}

pub fn print_analysis(analysis: &TournamentAnalysis) {
    let summary = &analysis.rating_success;
    println!("\n{}", "=".repeat(60));
    println!("RATING vs TOURNAMENT SUCCESS");
    println!("{}", "=".repeat(60));
    match summary.championship_correlation {
        Some(r) => println!("Rating vs Championship Probability Correlation: {:.3}", r),
        None => println!("Rating vs Championship Probability Correlation: n/a"),
    }
    if let Some(r) = summary.final_four_correlation {
        println!("Rating vs Final Four Probability Correlation: {:.3}", r);
    }

    println!("\nChampionship odds by rating range:");
    println!("{:<15} {:<6} {:<12} {:<15}", "Rating Range", "Teams", "Avg Champ %", "Total Champ %");
    println!("{}", "-".repeat(55));
    for band in &summary.bands {
        println!(
            "{:<15} {:<6} {:<12.3} {:<15.1}",
            band.label,
            band.entrants,
            band.mean_championship_probability * 100.0,
            band.total_championship_probability * 100.0
        );
    }

    println!("\nUsers with multiple teams: {}", analysis.display_names.len());
    if !analysis.display_names.is_empty() {
        println!("{:<20} {:<6} {:<14} {:<10}", "Username", "Teams", "Total Champ %", "Avg Rating");
        println!("{}", "-".repeat(60));
        for total in analysis.display_names.iter().take(15) {
            println!(
                "{:<20} {:<6} {:<14.2} {:<10.0}",
                total.display_name,
                total.entrants,
                total.total_championship_probability * 100.0,
                total.mean_rating
            );
        }
    }

    println!("\nAverage advancement probability by round:");
    println!("{:<8} {:<15} {:<10} {:<12}", "Round", "Round Name", "Avg %", "Top Team %");
    println!("{}", "-".repeat(50));
    for round in &analysis.rounds {
        println!(
            "{:<8} {:<15} {:<10.2} {:<12.1}",
            round.round,
            round.name,
            round.mean_probability * 100.0,
            round.top_probability * 100.0
        );
    }

    let insights = &analysis.insights;
    println!("\nKEY INSIGHTS:");
    if let Some((name, p)) = &insights.favorite {
        println!("  Championship favorite: {} ({:.2}% chance)", name, p * 100.0);
    }
    if let Some((name, rating)) = &insights.highest_rated {
        println!("  Highest rating: {} ({:.1})", name, rating);
    }
    println!("  Teams with a championship chance: {}", insights.entrants_with_title);
    println!("  Average championship probability: {:.3}%", insights.mean_championship_probability * 100.0);
    if let Some(p) = insights.dark_horse_probability {
        println!("  Biggest dark horse: {:.3}% (rating < {})", p * 100.0, DARK_HORSE_RATING);
    }
    if let Some((lo, hi)) = insights.rating_range {
        println!("  Rating range: {:.1} - {:.1} ({:.1} point spread)", lo, hi, hi - lo);
    }
    println!("  Top {} teams control: {:.1}% of championship probability", TOP_SHARE_COUNT, insights.top_ten_share * 100.0);
}
