//! Tank Game Server
//!
//! Replays a game file through the rules engine, then reads raw actions
//! from stdin (one JSON object per line) and commits each to the game.

use std::sync::Arc;

use anyhow::{bail, Context, Result};
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{error, info, warn};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

use tank_game::{
    core::hash::short_hex,
    game::{GameFile, Interactor, SaveHandler},
    GameEngine, ProcessEngine, RawLogEntry, ServerConfig, VERSION,
};

#[tokio::main]
async fn main() -> Result<()> {
    let config = ServerConfig::from_env();

    // Initialize logging
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.log_filter));
    let subscriber = FmtSubscriber::builder().with_env_filter(filter).finish();
    tracing::subscriber::set_global_default(subscriber).context("failed to set tracing subscriber")?;

    info!("Tank Game Server v{}", VERSION);

    let Some(path) = std::env::args().nth(1) else {
        bail!("usage: tank-game-server <game-file>");
    };

    let game_config = config.load_game_config().await?;
    let file = Arc::new(GameFile::new(&path));
    let snapshot = file
        .load(game_config.as_ref())
        .await
        .with_context(|| format!("failed to load {}", path))?;

    let engine: Arc<dyn GameEngine> = Arc::new(ProcessEngine::from_config(&config.engine)?);
    let save_handler: Arc<dyn SaveHandler> = file.clone();
    let interactor = Interactor::new(engine, snapshot, Some(save_handler));

    if let Err(e) = interactor.loaded().await {
        error!("Failed to replay {}: {}", path, e);
        interactor.shutdown().await.ok();
        return Err(e.into());
    }

    let count = interactor.state_count().await;
    match count.checked_sub(1) {
        Some(last) => {
            let hash = interactor.state_hash(last).await.unwrap_or_default();
            info!("Replayed {} entries, final state hash {}", count, short_hex(&hash));
        }
        None => info!("Log book is empty"),
    }

    if !interactor.is_game_open().await {
        warn!("Game is outside its open hours, new entries will be refused");
    }

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = lines.next_line().await? {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }

        let raw: RawLogEntry = match serde_json::from_str(line) {
            Ok(raw) => raw,
            Err(e) => {
                warn!("Ignoring input that is not a JSON object: {}", e);
                continue;
            }
        };

        match interactor.add_log_book_entry(raw).await {
            Ok(id) => {
                let hash = interactor.state_hash(id).await.unwrap_or_default();
                info!("Entry {} committed, state hash {}", id, short_hex(&hash));
            }
            Err(e) if e.is_fatal() => {
                error!("Giving up: {}", e);
                interactor.shutdown().await.ok();
                return Err(e.into());
            }
            Err(e) => warn!("Entry rejected: {}", e),
        }
    }

    interactor.shutdown().await?;
    info!("Shut down cleanly");
    Ok(())
}
