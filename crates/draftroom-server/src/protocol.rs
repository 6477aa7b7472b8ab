// WebSocket message protocol between the draft server and its clients.
//
// Every frame is `{"type": "...", "payload": {...}}`. Outbound frames also
// carry a top-level `session_id` so a client watching several drafts can
// route them.

use draftroom_core::pick::Pick;
use draftroom_core::turn_order::DraftMode;
use draftroom_core::DraftError;
use draftroom_engine::{ClockTick, EngineEvent, SessionSnapshot};
use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Client -> server
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(tag = "type", content = "payload", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ClientCommand {
    StartSession {
        session_id: String,
        #[serde(default)]
        mode: Option<DraftMode>,
        #[serde(default)]
        manual_order: Option<Vec<String>>,
    },
    StartClock {
        session_id: String,
    },
    SubmitPick {
        session_id: String,
        player_id: String,
    },
    ExtendTime {
        session_id: String,
    },
    AdminAutoPlay {
        session_id: String,
        #[serde(default)]
        interval_ms: Option<u64>,
    },
    StopAutoPlay {
        session_id: String,
    },
    UndoPick {
        session_id: String,
    },
    SetPresence {
        session_id: String,
        team_id: String,
        present: bool,
    },
    SetAutoPick {
        session_id: String,
        team_id: String,
        enabled: bool,
    },
    GetSnapshot {
        session_id: String,
    },
}

impl ClientCommand {
    /// Wire name of the command, echoed back in its result.
    pub fn name(&self) -> &'static str {
        match self {
            ClientCommand::StartSession { .. } => "START_SESSION",
            ClientCommand::StartClock { .. } => "START_CLOCK",
            ClientCommand::SubmitPick { .. } => "SUBMIT_PICK",
            ClientCommand::ExtendTime { .. } => "EXTEND_TIME",
            ClientCommand::AdminAutoPlay { .. } => "ADMIN_AUTO_PLAY",
            ClientCommand::StopAutoPlay { .. } => "STOP_AUTO_PLAY",
            ClientCommand::UndoPick { .. } => "UNDO_PICK",
            ClientCommand::SetPresence { .. } => "SET_PRESENCE",
            ClientCommand::SetAutoPick { .. } => "SET_AUTO_PICK",
            ClientCommand::GetSnapshot { .. } => "GET_SNAPSHOT",
        }
    }

    pub fn session_id(&self) -> &str {
        match self {
            ClientCommand::StartSession { session_id, .. }
            | ClientCommand::StartClock { session_id }
            | ClientCommand::SubmitPick { session_id, .. }
            | ClientCommand::ExtendTime { session_id }
            | ClientCommand::AdminAutoPlay { session_id, .. }
            | ClientCommand::StopAutoPlay { session_id }
            | ClientCommand::UndoPick { session_id }
            | ClientCommand::SetPresence { session_id, .. }
            | ClientCommand::SetAutoPick { session_id, .. }
            | ClientCommand::GetSnapshot { session_id } => session_id,
        }
    }
}

// ---------------------------------------------------------------------------
// Server -> client
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommandError {
    pub code: String,
    pub message: String,
}

impl From<&DraftError> for CommandError {
    fn from(err: &DraftError) -> Self {
        CommandError {
            code: err.code().to_string(),
            message: err.to_string(),
        }
    }
}

/// Outcome of one client command.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CommandResult {
    pub ok: bool,
    pub command: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<CommandError>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pick: Option<Pick>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub remaining_seconds: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub snapshot: Option<Box<SessionSnapshot>>,
}

impl CommandResult {
    pub fn success(command: &str) -> Self {
        CommandResult {
            ok: true,
            command: command.to_string(),
            error: None,
            pick: None,
            remaining_seconds: None,
            snapshot: None,
        }
    }

    pub fn failure(command: &str, error: CommandError) -> Self {
        CommandResult {
            ok: false,
            error: Some(error),
            ..CommandResult::success(command)
        }
    }

    pub fn with_pick(mut self, pick: Pick) -> Self {
        self.pick = Some(pick);
        self
    }

    pub fn with_remaining(mut self, seconds: u32) -> Self {
        self.remaining_seconds = Some(seconds);
        self
    }

    pub fn with_snapshot(mut self, snapshot: SessionSnapshot) -> Self {
        self.snapshot = Some(Box::new(snapshot));
        self
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "payload", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ServerMessage {
    SessionSnapshot(Box<SessionSnapshot>),
    ClockTick(ClockTick),
    CommandResult(CommandResult),
}

impl From<EngineEvent> for ServerMessage {
    fn from(event: EngineEvent) -> Self {
        match event {
            EngineEvent::SessionSnapshot(snapshot) => ServerMessage::SessionSnapshot(snapshot),
            EngineEvent::ClockTick(tick) => ServerMessage::ClockTick(tick),
        }
    }
}

/// Serialize an outbound frame, tagging it with the session it concerns.
pub fn encode_frame(session_id: Option<&str>, message: &ServerMessage) -> Result<String, serde_json::Error> {
    let mut value = serde_json::to_value(message)?;
    if let (Some(id), Some(obj)) = (session_id, value.as_object_mut()) {
        obj.insert("session_id".into(), id.into());
    }
    serde_json::to_string(&value)
}
