// Roster construction and position caps.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::player::{Player, Position};

/// Maximum number of roster slots a team may fill at each position.
///
/// Positions missing from the table have a cap of zero.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PositionCaps {
    caps: BTreeMap<Position, usize>,
}

impl PositionCaps {
    pub fn new(caps: BTreeMap<Position, usize>) -> Self {
        PositionCaps { caps }
    }

    /// Build the cap table from the string-keyed form used in config files,
    /// e.g. `{"QB": 3, "RB": 6, ...}`. Unknown keys are returned as errors.
    pub fn from_config(config: &BTreeMap<String, usize>) -> Result<Self, String> {
        let mut caps = BTreeMap::new();
        for (pos_str, &count) in config {
            let pos = Position::from_str_pos(pos_str)
                .ok_or_else(|| format!("unknown position `{pos_str}`"))?;
            caps.insert(pos, count);
        }
        Ok(PositionCaps { caps })
    }

    pub fn cap(&self, position: Position) -> usize {
        self.caps.get(&position).copied().unwrap_or(0)
    }

    /// Sum of all caps: the most players a single team could ever roster.
    pub fn total(&self) -> usize {
        self.caps.values().sum()
    }

    pub fn iter(&self) -> impl Iterator<Item = (Position, usize)> + '_ {
        self.caps.iter().map(|(&pos, &cap)| (pos, cap))
    }
}

impl Default for PositionCaps {
    /// Standard limits for a 1QB/2RB/2WR/1TE/1K/1DEF league with a bench.
    fn default() -> Self {
        let caps = BTreeMap::from([
            (Position::Quarterback, 4),
            (Position::RunningBack, 8),
            (Position::WideReceiver, 8),
            (Position::TightEnd, 3),
            (Position::Kicker, 3),
            (Position::Defense, 3),
        ]);
        PositionCaps { caps }
    }
}

/// A team's drafted players, in the order they were picked.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Roster {
    pub players: Vec<Player>,
}

impl Roster {
    pub fn new() -> Self {
        Roster { players: Vec::new() }
    }

    /// Number of rostered players at the given position.
    pub fn count_at(&self, position: Position) -> usize {
        self.players.iter().filter(|p| p.position == position).count()
    }

    /// Whether the roster can take one more player at `position`.
    pub fn has_room_for(&self, position: Position, caps: &PositionCaps) -> bool {
        self.count_at(position) < caps.cap(position)
    }

    pub fn has_player(&self, player_id: &str) -> bool {
        self.players.iter().any(|p| p.id == player_id)
    }

    pub fn add_player(&mut self, player: Player) {
        self.players.push(player);
    }

    /// Remove a player by id, returning it if it was rostered.
    pub fn remove_player(&mut self, player_id: &str) -> Option<Player> {
        let idx = self.players.iter().position(|p| p.id == player_id)?;
        Some(self.players.remove(idx))
    }

    /// Number of filled slots.
    pub fn filled_count(&self) -> usize {
        self.players.len()
    }
}
