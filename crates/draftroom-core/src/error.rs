// Error taxonomy for every operation that validates or mutates a draft.

use thiserror::Error;

use crate::player::Position;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DraftError {
    #[error("draft session not found: {0}")]
    SessionNotFound(String),

    #[error("draft session {0} is already complete")]
    SessionComplete(String),

    #[error("draft session {0} has no turn order yet")]
    SessionNotStarted(String),

    #[error("player {0} is not available")]
    PlayerUnavailable(String),

    #[error("team {team_id} already has {cap} {position} (position cap)")]
    PositionCapExceeded {
        team_id: String,
        position: Position,
        cap: usize,
    },

    #[error("invalid turn order: {0}")]
    InvalidTurnOrder(String),

    /// No player in the pool fits the team's open positions. The cap table and
    /// pool size are supposed to make this impossible.
    #[error("no eligible player left in the pool for team {team_id}")]
    PoolExhausted { team_id: String },

    #[error("team {0} has no time extensions left")]
    NoExtensionsRemaining(String),

    #[error("no clock is running for session {0}")]
    TimerNotRunning(String),

    #[error("nothing to undo in session {0}")]
    NothingToUndo(String),

    #[error("team {0} is not part of this session")]
    TeamNotFound(String),

    #[error("invalid session config for field `{field}`: {message}")]
    InvalidConfig { field: String, message: String },
}

impl DraftError {
    /// Short machine-readable code, used in command results sent to clients.
    pub fn code(&self) -> &'static str {
        match self {
            DraftError::SessionNotFound(_) => "SESSION_NOT_FOUND",
            DraftError::SessionComplete(_) => "SESSION_COMPLETE",
            DraftError::SessionNotStarted(_) => "SESSION_NOT_STARTED",
            DraftError::PlayerUnavailable(_) => "PLAYER_UNAVAILABLE",
            DraftError::PositionCapExceeded { .. } => "POSITION_CAP_EXCEEDED",
            DraftError::InvalidTurnOrder(_) => "INVALID_TURN_ORDER",
            DraftError::PoolExhausted { .. } => "POOL_EXHAUSTED",
            DraftError::NoExtensionsRemaining(_) => "NO_EXTENSIONS_REMAINING",
            DraftError::TimerNotRunning(_) => "TIMER_NOT_RUNNING",
            DraftError::NothingToUndo(_) => "NOTHING_TO_UNDO",
            DraftError::TeamNotFound(_) => "TEAM_NOT_FOUND",
            DraftError::InvalidConfig { .. } => "INVALID_CONFIG",
        }
    }
}
