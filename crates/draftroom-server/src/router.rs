// Routes parsed client commands to the engine and shapes their results.

use std::sync::Arc;
use std::time::Duration;

use draftroom_core::DraftError;
use draftroom_engine::DraftEngine;
use tracing::{debug, info, warn};

use crate::config::{Config, ConfigError};
use crate::protocol::{ClientCommand, CommandError, CommandResult};

pub struct CommandRouter {
    engine: DraftEngine,
    config: Arc<Config>,
}

impl CommandRouter {
    pub fn new(engine: DraftEngine, config: Arc<Config>) -> Self {
        CommandRouter { engine, config }
    }

    pub fn engine(&self) -> &DraftEngine {
        &self.engine
    }

    /// Parse one text frame. A frame that is not a known command yields the
    /// failure result to send back instead.
    pub fn parse(&self, text: &str) -> Result<ClientCommand, CommandResult> {
        serde_json::from_str::<ClientCommand>(text).map_err(|e| {
            warn!("Rejecting unparseable client message: {e}");
            let error = CommandError {
                code: "BAD_REQUEST".into(),
                message: e.to_string(),
            };
            CommandResult::failure("UNKNOWN", error)
        })
    }

    pub async fn dispatch(&self, cmd: ClientCommand) -> CommandResult {
        let name = cmd.name();
        let session_id = cmd.session_id().to_string();
        match self.execute(cmd).await {
            Ok(result) => {
                debug!(session = %session_id, "{name} ok");
                result
            }
            Err(err) => {
                info!(session = %session_id, "{name} rejected: {err}");
                CommandResult::failure(name, CommandError::from(&err))
            }
        }
    }

    async fn execute(&self, cmd: ClientCommand) -> Result<CommandResult, DraftError> {
        let name = cmd.name();
        let engine = &self.engine;
        let done = CommandResult::success(name);

        match cmd {
            ClientCommand::StartSession {
                session_id,
                mode,
                manual_order,
            } => {
                let session = self
                    .config
                    .session_config(&session_id, mode, manual_order)
                    .map_err(config_error)?;
                let snapshot = engine.start_session(session).await?;
                Ok(done.with_snapshot(snapshot))
            }
            ClientCommand::StartClock { session_id } => {
                engine.start_clock(&session_id).await?;
                Ok(done.with_snapshot(engine.snapshot(&session_id).await?))
            }
            ClientCommand::SubmitPick {
                session_id,
                player_id,
            } => {
                let pick = engine.submit_pick(&session_id, &player_id).await?;
                Ok(done.with_pick(pick))
            }
            ClientCommand::ExtendTime { session_id } => {
                let remaining = engine.extend_time(&session_id).await?;
                Ok(done.with_remaining(remaining))
            }
            ClientCommand::AdminAutoPlay {
                session_id,
                interval_ms,
            } => {
                let every = interval_ms
                    .map(Duration::from_millis)
                    .unwrap_or_else(|| self.config.autoplay_interval());
                engine.admin_auto_play(&session_id, every).await?;
                Ok(done)
            }
            ClientCommand::StopAutoPlay { session_id } => {
                engine.stop_auto_play(&session_id).await?;
                Ok(done)
            }
            ClientCommand::UndoPick { session_id } => {
                let reverted = engine.undo_last_pick(&session_id).await?;
                Ok(done.with_pick(reverted))
            }
            ClientCommand::SetPresence {
                session_id,
                team_id,
                present,
            } => {
                engine.set_team_presence(&session_id, &team_id, present).await?;
                Ok(done)
            }
            ClientCommand::SetAutoPick {
                session_id,
                team_id,
                enabled,
            } => {
                engine.set_team_auto_pick(&session_id, &team_id, enabled).await?;
                Ok(done)
            }
            ClientCommand::GetSnapshot { session_id } => {
                Ok(done.with_snapshot(engine.snapshot(&session_id).await?))
            }
        }
    }
}

fn config_error(err: ConfigError) -> DraftError {
    match err {
        ConfigError::ValidationError { field, message } => DraftError::InvalidConfig { field, message },
        other => DraftError::InvalidConfig {
            field: "config".into(),
            message: other.to_string(),
        },
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use draftroom_core::player::{Player, PlayerPool, Position};
    use draftroom_engine::{NullSink, TimerState};

    pub(crate) const LEAGUE: &str = r#"
[server]
port = 0

[draft]
rounds = 2
mode = "snake"
clock_secs = 30
extension_tokens = 1
settle_delay_ms = 0
autoplay_interval_ms = 50

[draft.position_caps]
QB = 2
RB = 2
WR = 2
TE = 1
K = 1
DEF = 1

[league]
name = "Test League"

[[league.teams]]
id = "t1"
name = "One"

[[league.teams]]
id = "t2"
name = "Two"

[data]
players = "unused.csv"
"#;

    pub(crate) fn router() -> CommandRouter {
        let config: Config = toml::from_str(LEAGUE).unwrap();
        let players = Position::ALL
            .iter()
            .enumerate()
            .flat_map(|(i, &pos)| {
                (0..3).map(move |j| Player {
                    id: format!("{}{j}", pos.display_str().to_lowercase()),
                    name: format!("{pos} {j}"),
                    position: pos,
                    team: "NE".into(),
                    rank: (i * 3 + j) as u32 + 1,
                })
            })
            .collect();
        let engine = DraftEngine::new(
            Arc::new(PlayerPool::new(players)),
            Arc::new(NullSink),
            config.timer_config(),
        );
        CommandRouter::new(engine, Arc::new(config))
    }

    fn start(session_id: &str) -> ClientCommand {
        ClientCommand::StartSession {
            session_id: session_id.into(),
            mode: None,
            manual_order: Some(vec!["t1".into(), "t2".into()]),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn start_session_then_pick() {
        let router = router();
        let result = router.dispatch(start("s1")).await;
        assert!(result.ok, "{result:?}");
        let snapshot = result.snapshot.unwrap();
        assert_eq!(snapshot.turn_order, vec!["t1", "t2", "t2", "t1"]);

        let result = router
            .dispatch(ClientCommand::SubmitPick {
                session_id: "s1".into(),
                player_id: "rb0".into(),
            })
            .await;
        assert!(result.ok);
        let pick = result.pick.unwrap();
        assert_eq!(pick.team.team_id, "t1");
        assert_eq!(pick.player.id, "rb0");
    }

    #[tokio::test(start_paused = true)]
    async fn engine_errors_become_coded_failures() {
        let router = router();
        let result = router
            .dispatch(ClientCommand::GetSnapshot {
                session_id: "ghost".into(),
            })
            .await;
        assert!(!result.ok);
        assert_eq!(result.command, "GET_SNAPSHOT");
        assert_eq!(result.error.unwrap().code, "SESSION_NOT_FOUND");

        router.dispatch(start("s1")).await;
        let result = router
            .dispatch(ClientCommand::ExtendTime {
                session_id: "s1".into(),
            })
            .await;
        assert_eq!(result.error.unwrap().code, "TIMER_NOT_RUNNING");
    }

    #[tokio::test(start_paused = true)]
    async fn extend_time_reports_remaining() {
        let router = router();
        router.dispatch(start("s1")).await;
        let result = router
            .dispatch(ClientCommand::StartClock {
                session_id: "s1".into(),
            })
            .await;
        assert_eq!(result.snapshot.unwrap().timer_state, TimerState::Armed);

        let result = router
            .dispatch(ClientCommand::ExtendTime {
                session_id: "s1".into(),
            })
            .await;
        assert_eq!(result.remaining_seconds, Some(60));

        let result = router
            .dispatch(ClientCommand::ExtendTime {
                session_id: "s1".into(),
            })
            .await;
        assert_eq!(result.error.unwrap().code, "NO_EXTENSIONS_REMAINING");
    }

    #[tokio::test(start_paused = true)]
    async fn bad_manual_order_is_invalid_turn_order() {
        let router = router();
        let result = router
            .dispatch(ClientCommand::StartSession {
                session_id: "s1".into(),
                mode: None,
                manual_order: Some(vec!["t1".into(), "t9".into()]),
            })
            .await;
        assert_eq!(result.error.unwrap().code, "INVALID_TURN_ORDER");
        assert!(router.engine().session_ids().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn unparseable_text_is_bad_request() {
        let router = router();
        let result = router.parse("{not json").unwrap_err();
        assert!(!result.ok);
        assert_eq!(result.command, "UNKNOWN");
        assert_eq!(result.error.unwrap().code, "BAD_REQUEST");
    }

    #[tokio::test(start_paused = true)]
    async fn admin_auto_play_uses_configured_interval() {
        let router = router();
        router.dispatch(start("s1")).await;
        let cmd = router
            .parse(r#"{"type":"ADMIN_AUTO_PLAY","payload":{"session_id":"s1"}}"#)
            .unwrap();
        let result = router.dispatch(cmd).await;
        assert!(result.ok);

        tokio::time::sleep(Duration::from_millis(500)).await;
        let snapshot = router.engine().snapshot("s1").await.unwrap();
        assert!(snapshot.complete);
        assert_eq!(snapshot.picks.len(), 4);
    }
}
