// Player catalog loading from CSV.
//
// Expected columns: id,name,position,team,rank. Extra columns are ignored.

use std::fs::File;
use std::io::Read;
use std::path::Path;

use draftroom_core::player::{Player, PlayerPool, Position};
use serde::Deserialize;
use tracing::{info, warn};

#[derive(Debug, thiserror::Error)]
pub enum PoolLoadError {
    #[error("failed to read file {path}: {source}")]
    Io {
        path: String,
        source: std::io::Error,
    },

    #[error("CSV error in {path}: {source}")]
    Csv { path: String, source: csv::Error },

    #[error("validation error: {0}")]
    Validation(String),
}

#[derive(Debug, Deserialize)]
struct RawPlayer {
    id: String,
    name: String,
    position: String,
    #[serde(default)]
    team: String,
    rank: u32,
}

fn load_players_from_reader<R: Read>(rdr: R) -> Result<Vec<Player>, csv::Error> {
    let mut reader = csv::ReaderBuilder::new().trim(csv::Trim::All).from_reader(rdr);
    let mut players = Vec::new();
    for result in reader.deserialize::<RawPlayer>() {
        match result {
            Ok(raw) => {
                let id = raw.id.trim();
                if id.is_empty() {
                    warn!("skipping player '{}': empty id", raw.name);
                    continue;
                }
                let Some(position) = Position::from_str_pos(&raw.position) else {
                    warn!("skipping player '{}': unknown position '{}'", raw.name, raw.position);
                    continue;
                };
                players.push(Player {
                    id: id.to_string(),
                    name: raw.name.trim().to_string(),
                    position,
                    team: raw.team.trim().to_string(),
                    rank: raw.rank,
                });
            }
            Err(e) => {
                warn!("skipping malformed player row: {}", e);
            }
        }
    }
    Ok(players)
}

/// Build a pool from CSV text already in memory.
pub fn pool_from_reader<R: Read>(rdr: R, origin: &str) -> Result<PlayerPool, PoolLoadError> {
    let players = load_players_from_reader(rdr).map_err(|source| PoolLoadError::Csv {
        path: origin.to_string(),
        source,
    })?;
    if players.is_empty() {
        return Err(PoolLoadError::Validation(format!(
            "no valid players found in {origin}"
        )));
    }
    Ok(PlayerPool::new(players))
}

/// Load the player catalog from a CSV file.
pub fn load_pool(path: &Path) -> Result<PlayerPool, PoolLoadError> {
    let display = path.display().to_string();
    let file = File::open(path).map_err(|source| PoolLoadError::Io {
        path: display.clone(),
        source,
    })?;
    let pool = pool_from_reader(file, &display)?;
    info!(
        "Loaded {} players from {} ({} QB, {} RB, {} WR, {} TE, {} K, {} DEF)",
        pool.len(),
        path.display(),
        pool.count_at(Position::Quarterback),
        pool.count_at(Position::RunningBack),
        pool.count_at(Position::WideReceiver),
        pool.count_at(Position::TightEnd),
        pool.count_at(Position::Kicker),
        pool.count_at(Position::Defense),
    );
    Ok(pool)
}
