//! Two peers on localhost play a short match over UDP.
//!
//! Run with `RUST_LOG=debug cargo run -p duel` to watch the wire traffic.

use std::sync::Arc;
use std::time::Duration;

use lansync::logging::init_logging;
use lansync::prelude::*;
use serde_json::json;
use tracing::info;

type Engine = SyncEngine<UdpTransport>;

struct Peer {
    engine: Arc<Engine>,
    _tasks: Vec<TaskHandle>,
}

async fn bind(name: &str) -> Result<UdpTransport, Box<dyn std::error::Error>> {
    let transport = UdpTransport::bind("127.0.0.1:0".parse()?).await?;
    info!(peer = name, addr = %transport.local_addr()?, "bound");
    Ok(transport)
}

fn start(name: &str, transport: UdpTransport) -> (Arc<SecureChannel<UdpTransport>>, Peer) {
    let (inbox, receiver) = transport.spawn_receiver();
    let channel = Arc::new(SecureChannel::new(name, transport));
    let engine = Arc::new(SyncEngine::new(Arc::clone(&channel), EngineConfig::default()));
    let tasks = vec![
        receiver,
        engine.spawn_pump(inbox),
        engine.spawn_maintenance(),
        channel.spawn_heartbeat(),
    ];
    (channel, Peer { engine, _tasks: tasks })
}

async fn settle() {
    tokio::time::sleep(Duration::from_millis(50)).await;
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    init_logging()?;

    let red = bind("red").await?;
    let blue = bind("blue").await?;
    red.add_peer("blue", blue.local_addr()?);
    blue.add_peer("red", red.local_addr()?);

    let (red_channel, red) = start("red", red);
    let (blue_channel, blue) = start("blue", blue);
    red.engine
        .establish_authenticated_connection("blue", blue_channel.public_key())?;
    blue.engine
        .establish_authenticated_connection("red", red_channel.public_key())?;

    let arena = SessionId::from("arena");
    red.engine.create_session(arena.clone(), [PeerId::from("blue")])?;
    settle().await;

    blue.engine.subscribe(&arena, |update| {
        info!(from = %update.origin_peer, action = %update.action, "blue saw update");
    });

    // Both first moves take sequence slot 1; one of them wins on every peer.
    red.engine
        .apply_update(&arena, "player_move", json!({ "x": 2, "y": 5 }))?;
    blue.engine
        .apply_update(&arena, "player_move", json!({ "x": 8, "y": 5 }))?;
    red.engine
        .apply_update(&arena, "game_event", json!({ "kind": "shot", "by": "red" }))?;
    settle().await;

    red.engine.apply_update(&arena, "score_update", json!({ "score": 1 }))?;
    blue.engine.apply_update(&arena, "score_update", json!({ "score": 1 }))?;
    settle().await;

    let red_state = red.engine.get_state(&arena);
    let blue_state = blue.engine.get_state(&arena);
    info!(state = %json!(red_state), "red");
    info!(state = %json!(blue_state), "blue");
    info!(converged = red_state == blue_state, "match over");

    red.engine.end_session(&arena);
    settle().await;
    info!(blue_sessions = blue.engine.sessions().len(), "session closed");
    Ok(())
}
