// Outbound payloads the engine hands to the broadcast boundary.
//
// Serialized as `{"type": "...", "payload": {...}}` so transports can forward
// them to clients without re-shaping.

use draftroom_core::pick::{HistoryEntry, Pick};
use draftroom_core::player::Player;
use draftroom_core::session::{DraftSession, Team};
use draftroom_core::turn_order::DraftMode;
use serde::{Deserialize, Serialize};

use crate::timer::TimerState;

/// Countdown update for the team on the clock.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClockTick {
    pub team_id: String,
    pub remaining_seconds: u32,
    /// Whether the team on the clock still holds an extension token.
    pub can_extend: bool,
    /// 1-indexed overall pick number being timed.
    pub turn_number: u32,
}

/// Client-facing view of one team.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TeamSnapshot {
    pub team_id: String,
    pub team_name: String,
    pub roster: Vec<Player>,
    pub extensions_remaining: u32,
    pub present: bool,
    pub auto_pick: bool,
}

impl From<&Team> for TeamSnapshot {
    fn from(team: &Team) -> Self {
        TeamSnapshot {
            team_id: team.team_id.clone(),
            team_name: team.team_name.clone(),
            roster: team.roster.players.clone(),
            extensions_remaining: team.extensions_remaining,
            present: team.present,
            auto_pick: team.auto_pick,
        }
    }
}

/// Complete client-facing view of a session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionSnapshot {
    pub session_id: String,
    pub mode: DraftMode,
    pub rounds: usize,
    pub clock_secs: u32,
    pub teams: Vec<TeamSnapshot>,
    pub turn_order: Vec<String>,
    pub current_turn: usize,
    pub current_round: u32,
    /// Team on the clock; `None` before the turn order exists or once complete.
    pub on_the_clock: Option<String>,
    pub available: Vec<Player>,
    /// Picks that currently stand.
    pub picks: Vec<Pick>,
    /// Full append-only ledger, including undo entries.
    pub history: Vec<HistoryEntry>,
    pub started: bool,
    pub complete: bool,
    pub timer_state: TimerState,
    pub remaining_seconds: Option<u32>,
}

impl SessionSnapshot {
    pub fn from_session(
        session: &DraftSession,
        timer_state: TimerState,
        remaining_seconds: Option<u32>,
    ) -> Self {
        SessionSnapshot {
            session_id: session.session_id.clone(),
            mode: session.config.mode,
            rounds: session.config.rounds,
            clock_secs: session.config.clock_secs,
            teams: session.teams.iter().map(TeamSnapshot::from).collect(),
            turn_order: session.turn_order.clone(),
            current_turn: session.current_turn,
            current_round: session.current_round(),
            on_the_clock: session.team_on_clock_id().map(str::to_string),
            available: session.available.clone(),
            picks: session.live_picks().into_iter().cloned().collect(),
            history: session.history.clone(),
            started: session.started,
            complete: session.complete,
            timer_state,
            remaining_seconds,
        }
    }
}

/// Everything the engine publishes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "payload", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EngineEvent {
    SessionSnapshot(Box<SessionSnapshot>),
    ClockTick(ClockTick),
}
