// Fallback selection for a team that does not pick in time.

use chrono::{DateTime, Utc};

use crate::error::DraftError;
use crate::pick::Pick;
use crate::resolver::apply_pick;
use crate::session::DraftSession;

/// Best-ranked available player the team still has room for.
pub fn auto_select(session: &DraftSession, team_id: &str) -> Result<String, DraftError> {
    let team = session
        .team(team_id)
        .ok_or_else(|| DraftError::TeamNotFound(team_id.to_string()))?;
    let caps = &session.config.position_caps;

    session
        .available
        .iter()
        .find(|p| team.roster.has_room_for(p.position, caps))
        .map(|p| p.id.clone())
        .ok_or_else(|| DraftError::PoolExhausted {
            team_id: team_id.to_string(),
        })
}

/// Pick on behalf of the team on the clock.
pub fn auto_pick(session: &mut DraftSession, now: DateTime<Utc>) -> Result<Pick, DraftError> {
    if session.complete {
        return Err(DraftError::SessionComplete(session.session_id.clone()));
    }
    let team_id = session
        .team_on_clock_id()
        .ok_or_else(|| DraftError::SessionNotStarted(session.session_id.clone()))?
        .to_string();
    let player_id = auto_select(session, &team_id)?;
    apply_pick(session, &player_id, true, now)
}
