// Pick validation and application.
//
// Every check runs before any mutation, so a rejected pick leaves the session
// exactly as it was.

use chrono::{DateTime, Utc};
use tracing::info;

use crate::error::DraftError;
use crate::pick::{pick_in_round_for_turn, round_for_turn, HistoryEntry, Pick, TeamRef};
use crate::session::DraftSession;

/// Validate and apply a pick for the team on the clock.
///
/// Checks, first failure wins:
/// 1. the session is not complete and has a turn order
/// 2. the player is still available
/// 3. the team has room at the player's position
pub fn apply_pick(
    session: &mut DraftSession,
    player_id: &str,
    is_auto_pick: bool,
    now: DateTime<Utc>,
) -> Result<Pick, DraftError> {
    if session.complete {
        return Err(DraftError::SessionComplete(session.session_id.clone()));
    }
    let team_id = session
        .team_on_clock_id()
        .ok_or_else(|| DraftError::SessionNotStarted(session.session_id.clone()))?
        .to_string();

    let pool_idx = session
        .available
        .iter()
        .position(|p| p.id == player_id)
        .ok_or_else(|| DraftError::PlayerUnavailable(player_id.to_string()))?;
    let position = session.available[pool_idx].position;

    let caps = &session.config.position_caps;
    let team = session
        .team(&team_id)
        .ok_or_else(|| DraftError::TeamNotFound(team_id.clone()))?;
    if !team.roster.has_room_for(position, caps) {
        return Err(DraftError::PositionCapExceeded {
            team_id,
            position,
            cap: caps.cap(position),
        });
    }

    // All checks passed; mutate.
    let player = session.available.remove(pool_idx);
    let turn_index = session.current_turn;
    let team_count = session.team_count();
    let team = session
        .team_mut(&team_id)
        .ok_or_else(|| DraftError::TeamNotFound(team_id.clone()))?;
    team.roster.add_player(player.clone());

    let pick = Pick {
        pick_number: turn_index as u32 + 1,
        turn_index,
        round: round_for_turn(turn_index, team_count),
        pick_in_round: pick_in_round_for_turn(turn_index, team_count),
        team: TeamRef {
            team_id: team.team_id.clone(),
            team_name: team.team_name.clone(),
        },
        player,
        timestamp: now,
        is_auto_pick,
    };

    session.history.push(HistoryEntry::Pick(pick.clone()));
    session.current_turn += 1;
    if session.current_turn >= session.total_turns() {
        session.complete = true;
        info!(session = %session.session_id, "Draft complete after {} picks", session.current_turn);
    }

    info!(
        session = %session.session_id,
        "Pick {}.{} (#{}): {} -> {}{}",
        pick.round,
        pick.pick_in_round,
        pick.pick_number,
        pick.player.name,
        pick.team.team_name,
        if is_auto_pick { " [auto]" } else { "" }
    );

    Ok(pick)
}

/// Revert the most recent standing pick.
///
/// The player goes back into the pool at its rank position, leaves the
/// roster, the turn pointer rewinds by one and the completion flag clears.
/// The ledger gains an `Undo` entry; nothing already in it changes.
pub fn undo_last_pick(session: &mut DraftSession, now: DateTime<Utc>) -> Result<Pick, DraftError> {
    let last = session
        .live_picks()
        .last()
        .map(|p| (*p).clone())
        .ok_or_else(|| DraftError::NothingToUndo(session.session_id.clone()))?;

    let team = session
        .team_mut(&last.team.team_id)
        .ok_or_else(|| DraftError::TeamNotFound(last.team.team_id.clone()))?;
    let player = team
        .roster
        .remove_player(&last.player.id)
        .ok_or_else(|| DraftError::PlayerUnavailable(last.player.id.clone()))?;

    session.return_to_pool(player);
    session.current_turn = last.turn_index;
    session.complete = false;
    session.history.push(HistoryEntry::Undo {
        reverted: last.clone(),
        timestamp: now,
    });

    info!(
        session = %session.session_id,
        "Undid pick #{}: {} returned to pool",
        last.pick_number,
        last.player.name
    );

    Ok(last)
}
