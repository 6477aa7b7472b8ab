// Configuration loading and validation (config/draftroom.toml).

use std::collections::{BTreeMap, HashSet};
use std::path::{Path, PathBuf};
use std::time::Duration;

use draftroom_core::player::Position;
use draftroom_core::roster::PositionCaps;
use draftroom_core::session::{SessionConfig, TeamConfig};
use draftroom_core::turn_order::DraftMode;
use draftroom_engine::TimerConfig;
use serde::Deserialize;
use thiserror::Error;

// ---------------------------------------------------------------------------
// Error types
// ---------------------------------------------------------------------------

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("config file not found: {path}")]
    FileNotFound { path: PathBuf },

    #[error("failed to parse config file {path}: {source}")]
    ParseError {
        path: PathBuf,
        source: toml::de::Error,
    },

    #[error("validation error for field `{field}`: {message}")]
    ValidationError { field: String, message: String },
}

// ---------------------------------------------------------------------------
// draftroom.toml structs
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub server: ServerConfig,
    pub draft: DraftSettings,
    pub league: LeagueConfig,
    pub data: DataPaths,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    pub port: u16,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DraftSettings {
    pub rounds: usize,
    #[serde(default)]
    pub mode: DraftMode,
    pub clock_secs: u32,
    pub extension_tokens: u32,
    #[serde(default = "default_extension_secs")]
    pub extension_secs: u32,
    #[serde(default = "default_absent_grace_secs")]
    pub absent_grace_secs: u64,
    #[serde(default = "default_settle_delay_ms")]
    pub settle_delay_ms: u64,
    #[serde(default = "default_autoplay_interval_ms")]
    pub autoplay_interval_ms: u64,
    /// Position key (`QB`, `RB`, ...) to roster cap.
    pub position_caps: BTreeMap<String, usize>,
}

fn default_extension_secs() -> u32 {
    30
}

fn default_absent_grace_secs() -> u64 {
    90
}

fn default_settle_delay_ms() -> u64 {
    250
}

fn default_autoplay_interval_ms() -> u64 {
    1_000
}

#[derive(Debug, Clone, Deserialize)]
pub struct LeagueConfig {
    pub name: String,
    pub teams: Vec<TeamEntry>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TeamEntry {
    pub id: String,
    pub name: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DataPaths {
    pub players: String,
}

impl Config {
    /// Scheduler tuning for the engine.
    pub fn timer_config(&self) -> TimerConfig {
        TimerConfig {
            settle_delay: Duration::from_millis(self.draft.settle_delay_ms),
            extension_secs: self.draft.extension_secs,
            absent_grace: Duration::from_secs(self.draft.absent_grace_secs),
            ..TimerConfig::default()
        }
    }

    pub fn autoplay_interval(&self) -> Duration {
        Duration::from_millis(self.draft.autoplay_interval_ms)
    }

    /// Session settings for a new draft in this league.
    ///
    /// `mode` overrides the configured mode; `manual_order` fixes the base
    /// order instead of shuffling.
    pub fn session_config(
        &self,
        session_id: &str,
        mode: Option<DraftMode>,
        manual_order: Option<Vec<String>>,
    ) -> Result<SessionConfig, ConfigError> {
        let position_caps = PositionCaps::from_config(&self.draft.position_caps).map_err(|message| {
            ConfigError::ValidationError {
                field: "draft.position_caps".into(),
                message,
            }
        })?;

        Ok(SessionConfig {
            session_id: session_id.to_string(),
            teams: self
                .league
                .teams
                .iter()
                .map(|t| TeamConfig {
                    team_id: t.id.clone(),
                    team_name: t.name.clone(),
                })
                .collect(),
            rounds: self.draft.rounds,
            mode: mode.unwrap_or(self.draft.mode),
            clock_secs: self.draft.clock_secs,
            extension_tokens: self.draft.extension_tokens,
            position_caps,
            manual_order,
        })
    }
}

// ---------------------------------------------------------------------------
// Loading logic
// ---------------------------------------------------------------------------

/// Load and validate `config/draftroom.toml` relative to `base_dir`.
pub fn load_config_from(base_dir: &Path) -> Result<Config, ConfigError> {
    let path = base_dir.join("config").join("draftroom.toml");
    let text = std::fs::read_to_string(&path).map_err(|_| ConfigError::FileNotFound {
        path: path.clone(),
    })?;
    let config = parse_config(&text, &path)?;
    validate(&config)?;
    Ok(config)
}

/// Loads config relative to the current working directory.
pub fn load_config() -> Result<Config, ConfigError> {
    let cwd = std::env::current_dir().map_err(|_| ConfigError::FileNotFound {
        path: PathBuf::from("."),
    })?;
    load_config_from(&cwd)
}

fn parse_config(text: &str, path: &Path) -> Result<Config, ConfigError> {
    toml::from_str(text).map_err(|e| ConfigError::ParseError {
        path: path.to_path_buf(),
        source: e,
    })
}

// ---------------------------------------------------------------------------
// Validation
// ---------------------------------------------------------------------------

fn invalid(field: &str, message: impl Into<String>) -> ConfigError {
    ConfigError::ValidationError {
        field: field.into(),
        message: message.into(),
    }
}

pub fn validate(config: &Config) -> Result<(), ConfigError> {
    let teams = &config.league.teams;
    if teams.len() < 2 {
        return Err(invalid(
            "league.teams",
            format!("at least 2 teams are required, got {}", teams.len()),
        ));
    }
    let mut seen = HashSet::new();
    for team in teams {
        if team.id.trim().is_empty() {
            return Err(invalid("league.teams", "team id must not be empty"));
        }
        if !seen.insert(team.id.as_str()) {
            return Err(invalid(
                "league.teams",
                format!("duplicate team id `{}`", team.id),
            ));
        }
    }

    let draft = &config.draft;
    if draft.rounds == 0 {
        return Err(invalid("draft.rounds", "must be greater than 0"));
    }
    if draft.clock_secs == 0 {
        return Err(invalid("draft.clock_secs", "must be greater than 0"));
    }
    if draft.extension_secs == 0 || draft.extension_secs > draft.clock_secs {
        return Err(invalid(
            "draft.extension_secs",
            format!(
                "must be between 1 and clock_secs ({}), got {}",
                draft.clock_secs, draft.extension_secs
            ),
        ));
    }
    if draft.absent_grace_secs <= u64::from(draft.clock_secs) {
        return Err(invalid(
            "draft.absent_grace_secs",
            format!(
                "must be longer than clock_secs ({}), got {}",
                draft.clock_secs, draft.absent_grace_secs
            ),
        ));
    }
    if draft.autoplay_interval_ms == 0 {
        return Err(invalid("draft.autoplay_interval_ms", "must be greater than 0"));
    }

    let caps = PositionCaps::from_config(&draft.position_caps)
        .map_err(|message| invalid("draft.position_caps", message))?;
    for pos in Position::ALL {
        if !draft
            .position_caps
            .keys()
            .any(|k| Position::from_str_pos(k) == Some(pos))
        {
            return Err(invalid(
                "draft.position_caps",
                format!("missing cap for {pos}"),
            ));
        }
    }
    if caps.total() < draft.rounds {
        return Err(invalid(
            "draft.position_caps",
            format!(
                "caps allow {} players per team but the draft has {} rounds",
                caps.total(),
                draft.rounds
            ),
        ));
    }

    if config.data.players.trim().is_empty() {
        return Err(invalid("data.players", "must not be empty"));
    }

    Ok(())
}

// ---------------------------------------------------------------------------
// Unit tests
// ---------------------------------------------------------------------------
