// Individual pick records and the append-only draft history.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::player::Player;

/// Team identity captured at the moment of a pick.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TeamRef {
    pub team_id: String,
    pub team_name: String,
}

/// A single draft pick record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Pick {
    /// Sequential pick number (1-indexed).
    pub pick_number: u32,
    /// Index into the session's turn sequence (0-indexed).
    pub turn_index: usize,
    /// Round number (1-indexed).
    pub round: u32,
    /// Position within the round (1-indexed).
    pub pick_in_round: u32,
    pub team: TeamRef,
    pub player: Player,
    pub timestamp: DateTime<Utc>,
    /// Whether the system picked on the team's behalf.
    pub is_auto_pick: bool,
}

/// Round number (1-indexed) for a turn index.
pub fn round_for_turn(turn_index: usize, team_count: usize) -> u32 {
    (turn_index / team_count.max(1)) as u32 + 1
}

/// Position within the round (1-indexed) for a turn index.
pub fn pick_in_round_for_turn(turn_index: usize, team_count: usize) -> u32 {
    (turn_index % team_count.max(1)) as u32 + 1
}

/// One entry in the draft ledger. The ledger is never edited; an undo is
/// recorded as a compensating entry naming the pick it reverted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum HistoryEntry {
    Pick(Pick),
    Undo {
        reverted: Pick,
        timestamp: DateTime<Utc>,
    },
}

/// Replay a ledger into the list of picks that currently stand.
pub fn live_picks(history: &[HistoryEntry]) -> Vec<&Pick> {
    let mut picks = Vec::new();
    for entry in history {
        match entry {
            HistoryEntry::Pick(pick) => picks.push(pick),
            HistoryEntry::Undo { .. } => {
                picks.pop();
            }
        }
    }
    picks
}
