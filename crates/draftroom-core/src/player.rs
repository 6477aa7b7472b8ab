// Player records and the immutable, rank-ordered player pool.

use std::collections::HashSet;
use std::fmt;

use serde::{Deserialize, Serialize};
use tracing::warn;

/// Football positions a player can be drafted at.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Position {
    #[serde(rename = "QB")]
    Quarterback,
    #[serde(rename = "RB")]
    RunningBack,
    #[serde(rename = "WR")]
    WideReceiver,
    #[serde(rename = "TE")]
    TightEnd,
    #[serde(rename = "K")]
    Kicker,
    #[serde(rename = "DEF")]
    Defense,
}

impl Position {
    /// Every position, in roster display order.
    pub const ALL: [Position; 6] = [
        Position::Quarterback,
        Position::RunningBack,
        Position::WideReceiver,
        Position::TightEnd,
        Position::Kicker,
        Position::Defense,
    ];

    /// Parse a position string into a Position enum.
    ///
    /// Case-insensitive. Accepts the common defense aliases ("D/ST", "DST", "D")
    /// and "PK" for kickers.
    pub fn from_str_pos(s: &str) -> Option<Self> {
        match s.trim().to_uppercase().as_str() {
            "QB" => Some(Position::Quarterback),
            "RB" => Some(Position::RunningBack),
            "WR" => Some(Position::WideReceiver),
            "TE" => Some(Position::TightEnd),
            "K" | "PK" => Some(Position::Kicker),
            "DEF" | "D/ST" | "DST" | "D" => Some(Position::Defense),
            _ => None,
        }
    }

    /// Return the display string for this position.
    pub fn display_str(&self) -> &'static str {
        match self {
            Position::Quarterback => "QB",
            Position::RunningBack => "RB",
            Position::WideReceiver => "WR",
            Position::TightEnd => "TE",
            Position::Kicker => "K",
            Position::Defense => "DEF",
        }
    }
}

impl fmt::Display for Position {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.display_str())
    }
}

/// A draftable player. Never mutated after the pool is loaded.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Player {
    /// Stable catalog identifier.
    pub id: String,
    pub name: String,
    pub position: Position,
    /// Real-world team abbreviation (e.g. "KC").
    pub team: String,
    /// Overall rank; lower is better.
    pub rank: u32,
}

/// The full catalog of draftable players, sorted by rank.
///
/// Sessions copy this snapshot into their own available list, so the pool
/// itself is shared read-only between sessions.
#[derive(Debug, Clone, Default)]
pub struct PlayerPool {
    players: Vec<Player>,
}

impl PlayerPool {
    /// Build a pool from an unordered list of players.
    ///
    /// Players are sorted by rank (ties broken by id). When the same id appears
    /// more than once only the best-ranked entry is kept.
    pub fn new(mut players: Vec<Player>) -> Self {
        players.sort_by(|a, b| a.rank.cmp(&b.rank).then_with(|| a.id.cmp(&b.id)));

        let mut seen = HashSet::new();
        players.retain(|p| {
            if seen.insert(p.id.clone()) {
                true
            } else {
                warn!("Dropping duplicate player id '{}' ({})", p.id, p.name);
                false
            }
        });

        PlayerPool { players }
    }

    /// All players in rank order.
    pub fn players(&self) -> &[Player] {
        &self.players
    }

    pub fn get(&self, player_id: &str) -> Option<&Player> {
        self.players.iter().find(|p| p.id == player_id)
    }

    pub fn len(&self) -> usize {
        self.players.len()
    }

    pub fn is_empty(&self) -> bool {
        self.players.is_empty()
    }

    /// Number of players available at each position.
    pub fn count_at(&self, position: Position) -> usize {
        self.players.iter().filter(|p| p.position == position).count()
    }
}
