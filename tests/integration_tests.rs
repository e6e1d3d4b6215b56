//! Integration tests for the sync server and client
//!
//! Every test starts a real server on an ephemeral port and talks to it over
//! WebSocket with the client library.

use assert_approx_eq::assert_approx_eq;
use client::connection::SyncClient;
use client::view::WorldView;
use server::config::{BroadcastCadence, ServerConfig, WorldBounds};
use server::network::Server;
use shared::{
    default_name, palette_color, DeclaredRole, Direction, PlayerEntity, ServerEvent, WorldSnapshot,
};
use std::time::Duration;
use tokio::time::timeout;
use tokio_test::assert_ok;

const WAIT: Duration = Duration::from_secs(2);
const QUIET: Duration = Duration::from_millis(250);

async fn start_server(config: ServerConfig) -> String {
    let server = assert_ok!(Server::bind("127.0.0.1:0", config).await);
    let addr = assert_ok!(server.local_addr());
    tokio::spawn(server.run());
    format!("ws://{}", addr)
}

async fn connect(url: &str) -> SyncClient {
    assert_ok!(SyncClient::connect(url).await)
}

async fn next(client: &mut SyncClient) -> ServerEvent {
    let event = timeout(WAIT, client.next_event())
        .await
        .expect("timed out waiting for an event");
    assert_ok!(event).expect("server closed the connection")
}

async fn next_players(client: &mut SyncClient) -> WorldSnapshot {
    match next(client).await {
        ServerEvent::Players(players) => players,
        other => panic!("expected players, got {:?}", other),
    }
}

async fn assert_silent(client: &mut SyncClient) {
    assert!(
        timeout(QUIET, client.next_event()).await.is_err(),
        "unexpected event"
    );
}

/// Connects, declares `player` and consumes the join events.
async fn join_player(url: &str) -> (SyncClient, PlayerEntity) {
    let mut client = connect(url).await;
    assert_ok!(client.set_role(DeclaredRole::Player).await);

    let me = match next(&mut client).await {
        ServerEvent::PlayerData(player) => player,
        other => panic!("expected playerData, got {:?}", other),
    };
    let players = next_players(&mut client).await;
    assert_eq!(players.get(&me.id), Some(&me));

    (client, me)
}

/// Connects, declares `viewer` and consumes the initial player set.
async fn join_viewer(url: &str) -> (SyncClient, WorldSnapshot) {
    let mut client = connect(url).await;
    assert_ok!(client.set_role(DeclaredRole::Viewer).await);
    let players = next_players(&mut client).await;
    (client, players)
}

/// SESSION LIFECYCLE TESTS
mod lifecycle_tests {
    use super::*;

    /// Two players and a viewer: joins, a move and a leave, as seen by everyone
    #[tokio::test]
    async fn players_and_viewer_share_one_world() {
        let url = start_server(ServerConfig::default()).await;

        let (mut first, me) = join_player(&url).await;
        assert_eq!(me.position(), (0.0, 0.0));
        assert_eq!(me.color, palette_color(0));
        assert_eq!(me.name, default_name(me.id));

        let mut view = WorldView::new();
        let (mut viewer, players) = join_viewer(&url).await;
        let change = view.apply(ServerEvent::Players(players));
        assert_eq!(change.joined, vec![me.id]);

        assert_ok!(first.send_move(Direction::Up).await);
        let seen_by_mover = next_players(&mut first).await;
        let seen_by_viewer = next_players(&mut viewer).await;
        assert_eq!(seen_by_mover, seen_by_viewer);

        let change = view.apply(ServerEvent::Players(seen_by_viewer));
        assert_eq!(change.moved, vec![me.id]);
        let moved = view.player(me.id).unwrap();
        assert_approx_eq!(moved.x, 0.0);
        assert_approx_eq!(moved.y, -4.0);

        let (mut second, other) = join_player(&url).await;
        assert_ne!(other.id, me.id);
        assert_eq!(other.color, palette_color(1));
        assert_eq!(next_players(&mut first).await.len(), 2);
        let change = view.apply(ServerEvent::Players(next_players(&mut viewer).await));
        assert_eq!(change.joined, vec![other.id]);

        assert_ok!(first.close().await);

        let remaining = next_players(&mut second).await;
        assert_eq!(remaining.keys().copied().collect::<Vec<_>>(), vec![other.id]);
        let change = view.apply(ServerEvent::Players(next_players(&mut viewer).await));
        assert_eq!(change.left, vec![me.id]);
        assert_eq!(view.players().len(), 1);
    }

    /// A dropped socket without a close frame still removes the player
    #[tokio::test]
    async fn abrupt_disconnect_removes_player() {
        let url = start_server(ServerConfig::default()).await;

        let (player, _) = join_player(&url).await;
        let (mut viewer, players) = join_viewer(&url).await;
        assert_eq!(players.len(), 1);

        drop(player);

        assert!(next_players(&mut viewer).await.is_empty());
    }

    /// Connections past the limit are closed right after the handshake
    #[tokio::test]
    async fn connection_over_capacity_is_refused() {
        let config = ServerConfig {
            max_clients: 1,
            ..ServerConfig::default()
        };
        let url = start_server(config).await;

        let (mut admitted, _) = join_viewer(&url).await;

        let mut refused = connect(&url).await;
        let result = assert_ok!(timeout(WAIT, refused.next_event()).await);
        assert!(!matches!(result, Ok(Some(_))), "refused client got an event");

        assert_ok!(admitted.set_role(DeclaredRole::Player).await);
        assert_silent(&mut admitted).await;
    }
}

/// ROLE AND MOVEMENT TESTS
mod role_tests {
    use super::*;

    /// The first role declaration is final
    #[tokio::test]
    async fn role_declaration_is_final() {
        let url = start_server(ServerConfig::default()).await;

        let (mut player, me) = join_player(&url).await;
        assert_ok!(player.set_role(DeclaredRole::Viewer).await);
        assert_ok!(player.send_move(Direction::Right).await);

        let players = next_players(&mut player).await;
        assert_eq!(players[&me.id].position(), (4.0, 0.0));

        let (mut viewer, _) = join_viewer(&url).await;
        assert_ok!(viewer.set_role(DeclaredRole::Player).await);
        assert_ok!(viewer.send_move(Direction::Up).await);
        assert_silent(&mut viewer).await;
        assert_silent(&mut player).await;

        assert_ok!(player.send_move(Direction::Down).await);
        let players = next_players(&mut viewer).await;
        assert_eq!(players.len(), 1);
        assert_eq!(players[&me.id].position(), (4.0, 4.0));
    }

    /// A move before any role is dropped unless promotion is enabled
    #[tokio::test]
    async fn move_without_role() {
        let url = start_server(ServerConfig::default()).await;
        let mut anonymous = connect(&url).await;
        assert_ok!(anonymous.send_move(Direction::Left).await);
        assert_silent(&mut anonymous).await;

        let config = ServerConfig {
            promote_on_move: true,
            ..ServerConfig::default()
        };
        let url = start_server(config).await;
        let mut anonymous = connect(&url).await;
        assert_ok!(anonymous.send_move(Direction::Left).await);

        let me = match next(&mut anonymous).await {
            ServerEvent::PlayerData(player) => player,
            other => panic!("expected playerData, got {:?}", other),
        };
        assert_eq!(next_players(&mut anonymous).await[&me.id].position(), (0.0, 0.0));
        assert_eq!(next_players(&mut anonymous).await[&me.id].position(), (-4.0, 0.0));
    }

    /// Positions stay inside the configured bounds
    #[tokio::test]
    async fn moves_are_clamped_to_bounds() {
        let config = ServerConfig {
            bounds: Some(WorldBounds::new(-4.0, -4.0, 4.0, 4.0)),
            ..ServerConfig::default()
        };
        let url = start_server(config).await;
        let (mut player, me) = join_player(&url).await;

        for expected in [-4.0, -4.0, -4.0] {
            assert_ok!(player.send_move(Direction::Up).await);
            let players = next_players(&mut player).await;
            assert_approx_eq!(players[&me.id].y, expected);
        }
    }
}

/// WIRE FORMAT AND ERROR HANDLING TESTS
mod protocol_tests {
    use super::*;

    /// Malformed and unknown frames are dropped without closing the connection
    #[tokio::test]
    async fn malformed_frames_keep_connection_open() {
        let url = start_server(ServerConfig::default()).await;
        let mut client = connect(&url).await;

        assert_ok!(client.send_raw("{not json").await);
        assert_ok!(client.send_raw(r#"{"event":"dance","data":1}"#).await);
        assert_ok!(client.send_raw(r#"{"event":"setRole","data":"admin"}"#).await);
        assert_silent(&mut client).await;

        assert_ok!(client.send_raw(r#"{"event":"setRole","data":"player"}"#).await);
        let me = match next(&mut client).await {
            ServerEvent::PlayerData(player) => player,
            other => panic!("expected playerData, got {:?}", other),
        };
        next_players(&mut client).await;

        assert_ok!(client.send_raw(r#"{"event":"move","data":{"direction":"jump"}}"#).await);
        assert_ok!(client.send_raw(r#"{"event":"move","data":{"direction":"down"}}"#).await);
        let players = next_players(&mut client).await;
        assert_eq!(players[&me.id].position(), (0.0, 4.0));
    }

    /// Outgoing frames use the `{"event", "data"}` envelope
    #[test]
    fn server_event_wire_shape() {
        let player = PlayerEntity::new(7, (0.0, -4.0), palette_color(0), default_name(7));
        let frame = assert_ok!(ServerEvent::PlayerData(player).encode());
        let value: serde_json::Value = assert_ok!(serde_json::from_str(&frame));

        assert_eq!(value["event"], "playerData");
        assert_eq!(value["data"]["id"], 7);
        assert_eq!(value["data"]["y"], -4.0);
        assert_eq!(value["data"]["color"], "#ff0000");
        assert_eq!(value["data"]["name"], "Player 7");
    }
}

/// BROADCAST CADENCE TESTS
mod cadence_tests {
    use super::*;

    /// With a tick rate, moves are applied on the tick and every tick
    /// carries the full set
    #[tokio::test]
    async fn interval_cadence_applies_moves_on_tick() {
        let config = ServerConfig {
            cadence: BroadcastCadence::Interval(Duration::from_millis(50)),
            ..ServerConfig::default()
        };
        let url = start_server(config).await;

        let mut player = connect(&url).await;
        assert_ok!(player.set_role(DeclaredRole::Player).await);
        let me = match next(&mut player).await {
            ServerEvent::PlayerData(player) => player,
            other => panic!("expected playerData, got {:?}", other),
        };

        assert_ok!(player.send_move(Direction::Down).await);

        let mut position = me.position();
        while position != (0.0, 4.0) {
            position = next_players(&mut player).await[&me.id].position();
        }

        // Idle ticks keep repeating the same set.
        for _ in 0..2 {
            assert_eq!(next_players(&mut player).await[&me.id].position(), (0.0, 4.0));
        }
    }
}
