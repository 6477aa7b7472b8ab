// Draft room server entry point.
//
// Startup sequence:
// 1. Initialize tracing
// 2. Load config
// 3. Load the player catalog
// 4. Build the engine with a channel sink for broadcasts
// 5. Spawn the WebSocket server task
// 6. Wait for Ctrl+C, then clean up every session

use std::path::Path;
use std::sync::Arc;

use anyhow::Context;
use draftroom_engine::{ChannelSink, DraftEngine};
use draftroom_server::config;
use draftroom_server::pool_loader;
use draftroom_server::router::CommandRouter;
use draftroom_server::ws_server;
use tracing::{error, info, warn};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // 1. Initialize tracing
    init_tracing()?;
    info!("Draft room starting up");

    // 2. Load config
    let config = config::load_config().context("failed to load configuration")?;
    info!(
        "Config loaded: league={}, {} teams, {} rounds ({}), {}s clock",
        config.league.name,
        config.league.teams.len(),
        config.draft.rounds,
        config.draft.mode,
        config.draft.clock_secs
    );

    // 3. Load the player catalog
    let pool = pool_loader::load_pool(Path::new(&config.data.players))
        .context("failed to load player catalog")?;

    // 4. Build the engine
    let sink = ChannelSink::new(1024);
    let engine = DraftEngine::new(Arc::new(pool), Arc::new(sink.clone()), config.timer_config());
    let port = config.server.port;
    let router = Arc::new(CommandRouter::new(engine.clone(), Arc::new(config)));

    // 5. Spawn WebSocket server task
    let ws_handle = tokio::spawn(async move {
        if let Err(e) = ws_server::run(port, router, sink).await {
            error!("WebSocket server error on port {port}: {e}");
        }
    });
    info!("Draft room ready on ws://127.0.0.1:{port}");

    // 6. Wait for shutdown
    tokio::signal::ctrl_c()
        .await
        .context("failed to listen for shutdown signal")?;
    info!("Shutdown requested");

    ws_handle.abort();
    for session_id in engine.session_ids() {
        match engine.cleanup(&session_id).await {
            Ok(snapshot) => info!(
                session = %session_id,
                "Closed with {} picks (complete: {})",
                snapshot.picks.len(),
                snapshot.complete
            ),
            Err(e) => warn!(session = %session_id, "Cleanup failed: {e}"),
        }
    }

    let stats = engine.stats();
    info!(
        "Draft room shut down cleanly (broadcast failures: {}, timer arm races: {}, abandoned turns: {})",
        stats.broadcast_failures, stats.timer_arm_races, stats.abandoned_turns
    );
    Ok(())
}

fn init_tracing() -> anyhow::Result<()> {
    use tracing_subscriber::fmt;
    use tracing_subscriber::EnvFilter;

    let subscriber = fmt::Subscriber::builder()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("draftroom=info,warn")),
        )
        .with_writer(std::io::stderr)
        .with_target(true)
        .with_thread_ids(true)
        .with_line_number(true)
        .finish();

    tracing::subscriber::set_global_default(subscriber)
        .context("failed to set tracing subscriber")?;

    Ok(())
}
