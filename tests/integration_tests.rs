//! Integration tests for the canvas server
//!
//! These tests start a real server on an ephemeral port and drive it with
//! WebSocket clients.

use futures::{SinkExt, StreamExt};
use server::assets::{AssetCounts, FixedInventory};
use server::config::ServerConfig;
use server::network::Server;
use shared::{
    ClientPacket, Identity, ResourceId, ServerPacket, SessionId, CHAOS_MAX_DURATION_MS,
    CHAOS_MIN_DURATION_MS,
};
use std::net::SocketAddr;
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::time::timeout;
use tokio_test::assert_ok;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};

type Ws = WebSocketStream<MaybeTlsStream<TcpStream>>;

const RECV_TIMEOUT: Duration = Duration::from_secs(2);

async fn start_server(max_sessions: usize, regular: u32, peaceful: u32) -> SocketAddr {
    let config = ServerConfig {
        host: "127.0.0.1".to_string(),
        port: 0,
        max_sessions,
        ..ServerConfig::default()
    };
    let inventory = FixedInventory(AssetCounts { regular, peaceful });

    let server = Server::new(&config, Box::new(inventory))
        .await
        .expect("Failed to bind server");
    let addr = server.local_addr();
    tokio::spawn(server.run());
    addr
}

async fn connect(addr: SocketAddr) -> Ws {
    let (ws, _) = connect_async(format!("ws://{}", addr))
        .await
        .expect("WS connect failed");
    ws
}

/// Connects and consumes the bootstrap up to the peer snapshot
async fn join(addr: SocketAddr) -> (Ws, SessionId, Vec<ServerPacket>) {
    let mut ws = connect(addr).await;
    let mut bootstrap = Vec::new();

    let session_id = match recv(&mut ws).await {
        ServerPacket::Welcome { session_id } => session_id,
        other => panic!("Expected welcome, got {:?}", other),
    };

    loop {
        let packet = recv(&mut ws).await;
        let done = matches!(packet, ServerPacket::PeerSnapshot { .. });
        bootstrap.push(packet);
        if done {
            break;
        }
    }

    (ws, session_id, bootstrap)
}

async fn send(ws: &mut Ws, packet: ClientPacket) {
    ws.send(Message::text(packet.encode().unwrap()))
        .await
        .expect("WS send failed");
}

async fn recv(ws: &mut Ws) -> ServerPacket {
    loop {
        let frame = timeout(RECV_TIMEOUT, ws.next())
            .await
            .expect("Timed out waiting for packet")
            .expect("Connection closed")
            .expect("WS error");

        if let Message::Text(text) = frame {
            return ServerPacket::decode(text.as_str()).expect("Undecodable packet");
        }
    }
}

/// Reads packets until one matches, discarding the rest
async fn recv_until<F>(ws: &mut Ws, mut predicate: F) -> ServerPacket
where
    F: FnMut(&ServerPacket) -> bool,
{
    loop {
        let packet = recv(ws).await;
        if predicate(&packet) {
            return packet;
        }
    }
}

fn place(is_continuation: bool, use_existing_resource: Option<bool>) -> ClientPacket {
    ClientPacket::PlaceResource {
        x: 50.0,
        y: 60.0,
        is_continuation,
        use_existing_resource,
        is_chaos_variant: false,
        scale: 1.2,
    }
}

/// CONNECTION LIFECYCLE TESTS
mod lifecycle_tests {
    use super::*;

    #[tokio::test]
    async fn bootstrap_reports_resource_counts() {
        let addr = start_server(8, 12, 3).await;
        let (_ws, _, bootstrap) = join(addr).await;

        assert!(bootstrap.contains(&ServerPacket::ResourceCounts {
            regular: 12,
            peaceful: 3
        }));
        assert!(bootstrap.contains(&ServerPacket::PeerSnapshot { peers: vec![] }));
    }

    #[tokio::test]
    async fn late_joiner_sees_existing_identity() {
        let addr = start_server(8, 5, 0).await;
        let (mut a, a_id, _) = join(addr).await;

        send(
            &mut a,
            ClientPacket::AnnounceIdentity {
                name: "Foo".to_string(),
                color: "#fff".to_string(),
            },
        )
        .await;
        recv_until(&mut a, |p| matches!(p, ServerPacket::IdentityUpdate { .. })).await;

        let (_b, b_id, bootstrap) = join(addr).await;
        assert_ne!(a_id, b_id);

        let peers = bootstrap
            .iter()
            .find_map(|packet| match packet {
                ServerPacket::PeerSnapshot { peers } => Some(peers.clone()),
                _ => None,
            })
            .unwrap();

        assert_eq!(peers.len(), 1);
        assert_eq!(peers[0].session_id, a_id);
        assert_eq!(peers[0].identity, Identity::new("Foo", "#fff").unwrap());
    }

    #[tokio::test]
    async fn late_joiner_sees_existing_cursor() {
        let addr = start_server(8, 5, 0).await;
        let (mut a, a_id, _) = join(addr).await;

        send(&mut a, ClientPacket::MoveCursor { x: 7.0, y: 8.0 }).await;
        recv_until(&mut a, |p| matches!(p, ServerPacket::CursorUpdate { .. })).await;

        let (mut b, _, _) = join(addr).await;
        let packet = recv(&mut b).await;
        assert_eq!(
            packet,
            ServerPacket::CursorUpdate {
                session_id: a_id,
                x: 7.0,
                y: 8.0
            }
        );
    }

    #[tokio::test]
    async fn disconnect_notifies_remaining_peers() {
        let addr = start_server(8, 5, 0).await;
        let (a, a_id, _) = join(addr).await;
        let (mut b, _, _) = join(addr).await;

        drop(a);

        let packet =
            recv_until(&mut b, |p| matches!(p, ServerPacket::PeerLeft { .. })).await;
        assert_eq!(packet, ServerPacket::PeerLeft { session_id: a_id });
    }

    #[tokio::test]
    async fn full_server_turns_connection_away() {
        let addr = start_server(1, 5, 0).await;
        let (_a, _, _) = join(addr).await;

        let mut b = connect(addr).await;
        assert_eq!(
            recv(&mut b).await,
            ServerPacket::ServerFull {
                reason: "Server full".to_string()
            }
        );
    }
}

/// PLACEMENT AND BROADCAST TESTS
mod broadcast_tests {
    use super::*;

    #[tokio::test]
    async fn placement_reaches_sender_and_peers() {
        let addr = start_server(8, 10, 0).await;
        let (mut a, a_id, _) = join(addr).await;
        let (mut b, _, _) = join(addr).await;

        send(&mut a, place(false, None)).await;

        let seen_by_a =
            recv_until(&mut a, |p| matches!(p, ServerPacket::Placement { .. })).await;
        let seen_by_b =
            recv_until(&mut b, |p| matches!(p, ServerPacket::Placement { .. })).await;
        assert_eq!(seen_by_a, seen_by_b);

        match seen_by_a {
            ServerPacket::Placement {
                session_id,
                resource_id,
                is_continuation,
                ..
            } => {
                assert_eq!(session_id, a_id);
                assert!(resource_id.map(|r| r.0 < 10).unwrap_or(false));
                assert!(!is_continuation);
            }
            _ => unreachable!(),
        }
    }

    async fn placed_resources(ws: &mut Ws, count: usize) -> Vec<Option<ResourceId>> {
        let mut resources = Vec::new();
        for _ in 0..count {
            match recv_until(ws, |p| matches!(p, ServerPacket::Placement { .. })).await {
                ServerPacket::Placement { resource_id, .. } => resources.push(resource_id),
                _ => unreachable!(),
            }
        }
        resources
    }

    #[tokio::test]
    async fn drag_gesture_keeps_its_resource() {
        let addr = start_server(8, 10, 0).await;
        let (mut a, _, _) = join(addr).await;

        send(&mut a, place(false, None)).await;
        send(&mut a, place(true, Some(true))).await;
        for _ in 0..3 {
            send(&mut a, place(true, None)).await;
        }

        let resources = placed_resources(&mut a, 5).await;
        assert!(resources[0].is_some());
        assert!(resources.iter().all(|r| *r == resources[0]));
    }

    #[tokio::test]
    async fn drag_can_switch_to_a_new_resource() {
        let addr = start_server(8, 10, 0).await;
        let (mut a, _, _) = join(addr).await;

        send(&mut a, place(false, None)).await;
        send(&mut a, place(true, Some(false))).await;
        send(&mut a, place(true, None)).await;

        let resources = placed_resources(&mut a, 3).await;
        assert!(resources[1].is_some());
        assert_ne!(resources[0], resources[1]);
        assert_eq!(resources[1], resources[2]);
    }

    #[tokio::test]
    async fn clear_canvas_reaches_everyone() {
        let addr = start_server(8, 5, 0).await;
        let (mut a, _, _) = join(addr).await;
        let (mut b, _, _) = join(addr).await;

        send(&mut a, ClientPacket::ClearCanvasRequest).await;

        recv_until(&mut a, |p| *p == ServerPacket::CanvasCleared).await;
        recv_until(&mut b, |p| *p == ServerPacket::CanvasCleared).await;
    }

    #[tokio::test]
    async fn malformed_frames_do_not_drop_connection() {
        let addr = start_server(8, 5, 0).await;
        let (mut a, a_id, _) = join(addr).await;

        assert_ok!(a.send(Message::text("not json")).await);
        assert_ok!(
            a.send(Message::text(r#"{"type":"move-cursor","x":1e40,"y":0}"#))
                .await
        );
        assert_ok!(a.send(Message::binary(vec![1u8, 2, 3])).await);
        send(&mut a, ClientPacket::MoveCursor { x: 3.0, y: 4.0 }).await;

        assert_eq!(
            recv(&mut a).await,
            ServerPacket::CursorUpdate {
                session_id: a_id,
                x: 3.0,
                y: 4.0
            }
        );
    }
}

/// CHAOS MODE TESTS
mod chaos_tests {
    use super::*;

    #[tokio::test]
    async fn chaos_start_then_end_reaches_everyone() {
        let addr = start_server(8, 5, 4).await;
        let (mut a, _, _) = join(addr).await;
        let (mut b, _, _) = join(addr).await;

        send(&mut a, ClientPacket::ChaosTrigger).await;

        for ws in [&mut a, &mut b] {
            match recv(ws).await {
                ServerPacket::ChaosStarted {
                    resource_id,
                    duration_ms,
                } => {
                    assert!((CHAOS_MIN_DURATION_MS..=CHAOS_MAX_DURATION_MS).contains(&duration_ms));
                    assert!(resource_id.map(|r| r.0 < 4).unwrap_or(false));
                }
                other => panic!("Expected chaos start, got {:?}", other),
            }
        }

        send(&mut b, ClientPacket::ChaosEnd).await;
        assert_eq!(recv(&mut a).await, ServerPacket::ChaosEnded);
        assert_eq!(recv(&mut b).await, ServerPacket::ChaosEnded);

        // A second end for the same cycle is ignored
        send(&mut b, ClientPacket::ChaosEnd).await;
        send(&mut b, ClientPacket::ClearCanvasRequest).await;
        assert_eq!(recv(&mut b).await, ServerPacket::CanvasCleared);
    }
}
