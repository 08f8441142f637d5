//! Lifetime statistics derived from match history
//!
//! Stats are a pure fold over recorded matches and rounds, so any store can
//! rebuild them deterministically by replaying its records in order:
//! - matches played, wins, losses, draws
//! - total and best match points
//! - longest valid word
//!
//! There is no rating system; the leaderboard orders by wins, then points.

use crate::game::engine::{RoundDetails, RoundResult};
use crate::game::{MatchId, PlayerId};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::HashMap;

/// One participant's line in a finished match.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MatchParticipantRecord {
    pub player_id: PlayerId,
    pub display_name: String,
    pub score: u32,
}

/// A finished match as stored in history
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MatchRecord {
    pub match_id: MatchId,
    pub ranked: bool,
    pub players: Vec<MatchParticipantRecord>,
    /// `None` for a draw
    pub winner_player_id: Option<PlayerId>,
    pub forfeited: bool,
    /// Unix millis
    pub finished_at_ms: u64,
}

impl MatchRecord {
    pub fn outcome_for(&self, player_id: &str) -> Option<Outcome> {
        if !self.players.iter().any(|p| p.player_id == player_id) {
            return None;
        }
        Some(match self.winner_player_id.as_deref() {
            None => Outcome::Draw,
            Some(winner) if winner == player_id => Outcome::Win,
            Some(_) => Outcome::Loss,
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Win,
    Loss,
    Draw,
}

/// Player lifetime statistics
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlayerStats {
    pub player_id: PlayerId,
    /// Most recent display name seen for this player
    pub display_name: String,
    pub matches_played: u32,
    pub wins: u32,
    pub losses: u32,
    pub draws: u32,
    pub total_points: u32,
    pub best_match_score: u32,
    pub longest_word: String,
}

impl PlayerStats {
    pub fn new(player_id: PlayerId, display_name: String) -> Self {
        PlayerStats {
            player_id,
            display_name,
            ..Default::default()
        }
    }

    /// Average points per match
    pub fn average_score(&self) -> f64 {
        if self.matches_played == 0 {
            0.0
        } else {
            self.total_points as f64 / self.matches_played as f64
        }
    }

    pub fn win_rate(&self) -> f64 {
        if self.matches_played == 0 {
            0.0
        } else {
            self.wins as f64 / self.matches_played as f64
        }
    }
}

/// Leaderboard order: wins desc, then points desc, then name for stability.
pub fn leaderboard_order(a: &PlayerStats, b: &PlayerStats) -> Ordering {
    b.wins
        .cmp(&a.wins)
        .then_with(|| b.total_points.cmp(&a.total_points))
        .then_with(|| a.display_name.cmp(&b.display_name))
        .then_with(|| a.player_id.cmp(&b.player_id))
}

/// Folds match and round records into per-player stats
#[derive(Debug, Default)]
pub struct StatsTracker {
    stats: HashMap<PlayerId, PlayerStats>,
}

impl StatsTracker {
    pub fn new() -> Self {
        StatsTracker::default()
    }

    fn entry(&mut self, player_id: &str, display_name: &str) -> &mut PlayerStats {
        let stats = self
            .stats
            .entry(player_id.to_string())
            .or_insert_with(|| PlayerStats::new(player_id.to_string(), display_name.to_string()));
        if !display_name.is_empty() {
            stats.display_name = display_name.to_string();
        }
        stats
    }

    /// Look up by player id, falling back to a case-insensitive display name match
    pub fn find(&self, player: &str) -> Option<&PlayerStats> {
        self.stats.get(player).or_else(|| {
            let wanted = player.to_lowercase();
            self.stats
                .values()
                .find(|s| s.display_name.to_lowercase() == wanted)
        })
    }

    /// Process a finished match
    pub fn process_match(&mut self, record: &MatchRecord) {
        for player in &record.players {
            let outcome = record.outcome_for(&player.player_id);
            let stats = self.entry(&player.player_id, &player.display_name);
            stats.matches_played += 1;
            stats.total_points += player.score;
            stats.best_match_score = stats.best_match_score.max(player.score);
            match outcome {
                Some(Outcome::Win) => stats.wins += 1,
                Some(Outcome::Loss) => stats.losses += 1,
                Some(Outcome::Draw) => stats.draws += 1,
                None => {}
            }
        }
    }

    /// Process a closed round (tracks the longest valid word)
    pub fn process_round(&mut self, result: &RoundResult) {
        let RoundDetails::Letters { submissions, .. } = &result.details else {
            return;
        };
        for submission in submissions.iter().filter(|s| s.result.is_valid) {
            let word = &submission.result.normalized_word;
            let stats = self.entry(&submission.player_id, "");
            if word.len() > stats.longest_word.len() {
                stats.longest_word = word.clone();
            }
        }
    }

    /// Players with at least one finished match, in leaderboard order
    pub fn leaderboard(&self, limit: usize) -> Vec<PlayerStats> {
        let mut rows: Vec<PlayerStats> = self
            .stats
            .values()
            .filter(|s| s.matches_played > 0)
            .cloned()
            .collect();
        rows.sort_by(leaderboard_order);
        rows.truncate(limit);
        rows
    }
}
