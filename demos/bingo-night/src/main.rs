use std::sync::Arc;
use std::time::Duration;

use drawhall::prelude::*;
use drawhall::protocol::{Codec, JsonCodec, Role, RoomEvent};
use drawhall::round::FREE;
use drawhall::telemetry;
use tracing::{info, warn};

// ---------------------------------------------------------------------------
// Table setup
// ---------------------------------------------------------------------------

const PLAYERS: [&str; 4] = ["ada", "bob", "cleo", "dmitri"];

/// The participant who drops out for a few draws and comes back.
const FLAKY: ParticipantId = ParticipantId(3);

/// Fast settings so a round finishes in under a minute.
fn demo_config() -> EngineConfig {
    let mut config = EngineConfig::default();
    config.tiers.easy.draw_interval = Duration::from_millis(400);
    config.pool.wait_for_players = Duration::from_secs(1);
    config.pool.countdown_secs = 3;
    config.round.reconnect_grace = Duration::from_secs(5);
    config
}

fn load_config() -> Result<EngineConfig, DrawhallError> {
    match std::env::var("DRAWHALL_CONFIG") {
        Ok(path) => {
            info!(%path, "loading config");
            Ok(EngineConfig::load(path)?)
        }
        Err(_) => Ok(demo_config()),
    }
}

// ---------------------------------------------------------------------------
// Player logic
// ---------------------------------------------------------------------------

/// The first fully drawn line on `board` among `patterns`, free cell
/// excluded.
fn complete_line(board: &Board, drawn: &[u8], patterns: &[Pattern]) -> Option<(Pattern, Vec<u8>)> {
    patterns.iter().find_map(|&pattern| {
        board
            .lines(pattern)
            .into_iter()
            .find(|line| line.iter().all(|n| *n == FREE || drawn.contains(n)))
            .map(|line| (pattern, line.into_iter().filter(|n| *n != FREE).collect()))
    })
}

/// Every active participant with a complete line shouts at once.
async fn shout_claims(handle: &EngineHandle, round_id: RoundId) -> Result<(), DrawhallError> {
    let Some(round) = handle.round_snapshot(round_id).await? else {
        return Ok(());
    };
    let patterns = [Pattern::Row, Pattern::Column, Pattern::Diagonal];
    for player in round.participants.iter().filter(|p| p.role == Role::Active) {
        let Some((pattern, cells)) = complete_line(&player.board, &round.drawn, &patterns) else {
            continue;
        };
        let claim = Claim::new(player.id, pattern).with_cells(cells);
        let verdict = handle.submit_claim(round_id, claim).await?;
        info!(participant = %player.id, name = %player.name, %pattern, ?verdict, "claim");
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Main
// ---------------------------------------------------------------------------

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    telemetry::init();
    let config = load_config()?;

    let (engine, handle) = Engine::new(config, Arc::new(MemoryStore::new()));
    let task = engine.spawn();

    let room = handle.find_or_open_room(Tier::Easy).await?;
    let mut events = handle.subscribe_room(room.room_id);
    for (i, name) in PLAYERS.iter().enumerate() {
        let id = ParticipantId(i as u64 + 1);
        handle.join(room.room_id, Entrant::new(id, *name)).await?;
    }

    let codec = JsonCodec;
    let mut round_id = None;
    let mut draws = 0u32;
    while let Some(event) = events.recv().await {
        let line = codec.encode(&RoomEvent {
            room_id: room.room_id,
            event: event.clone(),
        })?;
        println!("{}", String::from_utf8_lossy(&line));

        match event {
            Event::RoundStarted { round_id: id, .. } => round_id = Some(id),
            Event::NumberDrawn { .. } => {
                let Some(id) = round_id else { continue };
                draws += 1;
                let presence = match draws {
                    5 => handle.disconnect(id, FLAKY).await,
                    9 => handle.reconnect(id, FLAKY).await.map(|_board| ()),
                    _ => Ok(()),
                };
                if let Err(e) = presence {
                    warn!(participant = %FLAKY, error = %e, "presence change refused");
                }
                shout_claims(&handle, id).await?;
            }
            Event::RoundOver { .. } => break,
            _ => {}
        }
    }

    let report = handle.shutdown().await?;
    info!(?report, "bingo night over");
    task.await?;
    Ok(())
}
