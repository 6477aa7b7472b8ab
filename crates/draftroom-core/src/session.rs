// Draft session state: teams, rosters, the available pool, the turn pointer
// and the pick ledger.

use std::collections::HashSet;

use rand::Rng;
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::error::DraftError;
use crate::pick::{live_picks, round_for_turn, HistoryEntry, Pick};
use crate::player::{Player, PlayerPool};
use crate::roster::{PositionCaps, Roster};
use crate::turn_order::{self, DraftMode};

/// A team slot supplied by league configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TeamConfig {
    pub team_id: String,
    pub team_name: String,
}

/// Everything needed to create a draft session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionConfig {
    pub session_id: String,
    pub teams: Vec<TeamConfig>,
    pub rounds: usize,
    #[serde(default)]
    pub mode: DraftMode,
    /// Seconds on the clock for each turn.
    pub clock_secs: u32,
    /// Time-extension tokens granted to each team.
    pub extension_tokens: u32,
    #[serde(default)]
    pub position_caps: PositionCaps,
    /// Explicit base order. When absent the order is randomized.
    #[serde(default)]
    pub manual_order: Option<Vec<String>>,
}

impl SessionConfig {
    pub fn team_ids(&self) -> Vec<String> {
        self.teams.iter().map(|t| t.team_id.clone()).collect()
    }

    /// Reject configs the engine cannot run to completion.
    pub fn validate(&self, pool: &PlayerPool) -> Result<(), DraftError> {
        let invalid = |field: &str, message: String| DraftError::InvalidConfig {
            field: field.into(),
            message,
        };

        if self.session_id.trim().is_empty() {
            return Err(invalid("session_id", "must not be empty".into()));
        }
        if self.teams.is_empty() {
            return Err(invalid("teams", "at least one team is required".into()));
        }
        let mut seen = HashSet::new();
        for team in &self.teams {
            if !seen.insert(team.team_id.as_str()) {
                return Err(invalid("teams", format!("duplicate team id `{}`", team.team_id)));
            }
        }
        if self.rounds == 0 {
            return Err(invalid("rounds", "must be greater than 0".into()));
        }
        if self.clock_secs == 0 {
            return Err(invalid("clock_secs", "must be greater than 0".into()));
        }
        if self.position_caps.total() < self.rounds {
            return Err(invalid(
                "position_caps",
                format!(
                    "caps allow {} players per team but the draft has {} rounds",
                    self.position_caps.total(),
                    self.rounds
                ),
            ));
        }
        let needed = self.teams.len() * self.rounds;
        if pool.len() < needed {
            return Err(invalid(
                "players",
                format!("pool has {} players but the draft needs {needed}", pool.len()),
            ));
        }
        if let Some(order) = &self.manual_order {
            turn_order::validate_manual_order(&self.team_ids(), order)?;
        }
        Ok(())
    }
}

/// The state of a single team during the draft.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Team {
    pub team_id: String,
    pub team_name: String,
    pub roster: Roster,
    pub extensions_remaining: u32,
    /// Whether the team's manager is connected.
    pub present: bool,
    /// Whether the system may pick for this team without waiting out the clock
    /// when the manager is absent.
    pub auto_pick: bool,
}

/// The complete state of one draft.
#[derive(Debug, Clone)]
pub struct DraftSession {
    pub session_id: String,
    pub config: SessionConfig,
    pub teams: Vec<Team>,
    /// Flat sequence of team ids, one entry per turn. Empty until generated.
    pub turn_order: Vec<String>,
    /// Index into `turn_order` of the team on the clock.
    pub current_turn: usize,
    /// Players not yet drafted, in rank order.
    pub available: Vec<Player>,
    /// Append-only pick ledger.
    pub history: Vec<HistoryEntry>,
    pub started: bool,
    pub complete: bool,
}

impl DraftSession {
    /// Create a session from a validated config and a pool snapshot.
    pub fn new(config: SessionConfig, pool: &PlayerPool) -> Result<Self, DraftError> {
        config.validate(pool)?;

        let teams = config
            .teams
            .iter()
            .map(|t| Team {
                team_id: t.team_id.clone(),
                team_name: t.team_name.clone(),
                roster: Roster::new(),
                extensions_remaining: config.extension_tokens,
                present: true,
                auto_pick: false,
            })
            .collect();

        Ok(DraftSession {
            session_id: config.session_id.clone(),
            teams,
            turn_order: Vec::new(),
            current_turn: 0,
            available: pool.players().to_vec(),
            history: Vec::new(),
            started: false,
            complete: false,
            config,
        })
    }

    /// Generate the turn sequence if it does not exist yet.
    ///
    /// Returns `true` when a new order was generated.
    pub fn ensure_turn_order<R: Rng + ?Sized>(&mut self, rng: &mut R) -> Result<bool, DraftError> {
        if !self.turn_order.is_empty() {
            return Ok(false);
        }
        self.turn_order = turn_order::generate(
            &self.config.team_ids(),
            self.config.rounds,
            self.config.mode,
            self.config.manual_order.as_deref(),
            rng,
        )?;
        info!(
            session = %self.session_id,
            "Generated {} turn order with {} turns",
            self.config.mode,
            self.turn_order.len()
        );
        Ok(true)
    }

    pub fn team_count(&self) -> usize {
        self.teams.len()
    }

    pub fn total_turns(&self) -> usize {
        self.turn_order.len()
    }

    /// Id of the team whose turn it is, if the draft is running.
    pub fn team_on_clock_id(&self) -> Option<&str> {
        if self.complete {
            return None;
        }
        self.turn_order.get(self.current_turn).map(String::as_str)
    }

    pub fn team_on_clock(&self) -> Option<&Team> {
        let id = self.team_on_clock_id()?;
        self.team(id)
    }

    /// Current round (1-indexed).
    pub fn current_round(&self) -> u32 {
        round_for_turn(self.current_turn, self.team_count())
    }

    pub fn team(&self, team_id: &str) -> Option<&Team> {
        self.teams.iter().find(|t| t.team_id == team_id)
    }

    pub fn team_mut(&mut self, team_id: &str) -> Option<&mut Team> {
        self.teams.iter_mut().find(|t| t.team_id == team_id)
    }

    pub fn is_available(&self, player_id: &str) -> bool {
        self.available.iter().any(|p| p.id == player_id)
    }

    /// Picks that currently stand, after replaying undo entries.
    pub fn live_picks(&self) -> Vec<&Pick> {
        live_picks(&self.history)
    }

    /// Put a player back into the available list at its rank position.
    pub(crate) fn return_to_pool(&mut self, player: Player) {
        let idx = self
            .available
            .partition_point(|p| (p.rank, p.id.as_str()) < (player.rank, player.id.as_str()));
        self.available.insert(idx, player);
    }
}
