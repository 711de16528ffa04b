//! Server network layer handling WebSocket connections and event fan-out
//!
//! One task owns the [`Router`] and processes [`ServerMessage`]s strictly in
//! arrival order, so no handler ever observes another half-applied. Connection
//! tasks only decode frames and forward them; each connection drains its own
//! outbound queue in a separate writer task.

use crate::assets::AssetInventory;
use crate::config::ServerConfig;
use crate::router::{Effect, Router};
use futures::{SinkExt, StreamExt};
use log::{debug, error, info, warn};
use shared::{ClientPacket, ProtocolError, ServerPacket, SessionId};
use std::collections::HashMap;
use std::net::SocketAddr;
use std::time::Duration;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::Message;

/// Messages sent from connection tasks and timers to the main server loop
#[derive(Debug)]
pub enum ServerMessage {
    SessionOpened {
        session_id: SessionId,
        addr: SocketAddr,
        outbound: mpsc::UnboundedSender<ServerPacket>,
    },
    PacketReceived {
        session_id: SessionId,
        packet: ClientPacket,
    },
    SessionClosed {
        session_id: SessionId,
    },
    ChaosTimerElapsed {
        generation: u64,
    },
    Shutdown,
}

/// Main server coordinating connections and shared canvas state
pub struct Server {
    listener: Option<TcpListener>,
    local_addr: SocketAddr,
    inventory: Box<dyn AssetInventory>,
    router: Router,
    peers: HashMap<SessionId, mpsc::UnboundedSender<ServerPacket>>,
    chaos_timer: Option<JoinHandle<()>>,

    server_tx: mpsc::UnboundedSender<ServerMessage>,
    server_rx: mpsc::UnboundedReceiver<ServerMessage>,
}

impl Server {
    pub async fn new(
        config: &ServerConfig,
        inventory: Box<dyn AssetInventory>,
    ) -> Result<Self, Box<dyn std::error::Error>> {
        let listener = TcpListener::bind(config.bind_address()).await?;
        let local_addr = listener.local_addr()?;
        info!("Server listening on {}", local_addr);

        let (server_tx, server_rx) = mpsc::unbounded_channel();

        Ok(Server {
            listener: Some(listener),
            local_addr,
            inventory,
            router: Router::new(config.max_sessions),
            peers: HashMap::new(),
            chaos_timer: None,
            server_tx,
            server_rx,
        })
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Channel into the main loop; send [`ServerMessage::Shutdown`] to stop it
    pub fn handle(&self) -> mpsc::UnboundedSender<ServerMessage> {
        self.server_tx.clone()
    }

    /// Spawns task that accepts connections and assigns session ids
    fn spawn_acceptor(&mut self) -> Option<JoinHandle<()>> {
        let listener = self.listener.take()?;
        let server_tx = self.server_tx.clone();

        Some(tokio::spawn(async move {
            let mut next_session_id = 1u64;

            loop {
                match listener.accept().await {
                    Ok((stream, addr)) => {
                        let session_id = SessionId(next_session_id);
                        next_session_id += 1;

                        debug!("Accepted TCP connection from {}", addr);
                        tokio::spawn(handle_connection(
                            stream,
                            addr,
                            session_id,
                            server_tx.clone(),
                        ));
                    }
                    Err(e) => {
                        error!("Error accepting connection: {}", e);
                        tokio::time::sleep(Duration::from_millis(10)).await;
                    }
                }
            }
        }))
    }

    /// Scans the asset inventory once, before the first bootstrap
    fn ensure_resource_counts(&mut self) {
        if self.router.resource_counts().is_none() {
            let counts = self.inventory.counts();
            self.router.set_resource_counts(counts);
        }
    }

    fn open_session(
        &mut self,
        session_id: SessionId,
        addr: SocketAddr,
        outbound: mpsc::UnboundedSender<ServerPacket>,
    ) {
        self.ensure_resource_counts();

        match self.router.connect(session_id) {
            Some(effects) => {
                info!("Session {} connected from {}", session_id, addr);
                self.peers.insert(session_id, outbound);
                self.apply(effects);
            }
            None => {
                warn!("Rejecting connection from {}: server full", addr);
                let packet = ServerPacket::ServerFull {
                    reason: "Server full".to_string(),
                };
                if outbound.send(packet).is_err() {
                    debug!("Connection from {} closed before rejection", addr);
                }
                // Dropping the queue lets the writer close the socket
            }
        }
    }

    fn close_session(&mut self, session_id: SessionId) {
        self.peers.remove(&session_id);
        let effects = self.router.disconnect(session_id);
        if !effects.is_empty() {
            info!("Session {} disconnected", session_id);
        }
        self.apply(effects);
    }

    fn apply(&mut self, effects: Vec<Effect>) {
        for effect in effects {
            match effect {
                Effect::Send { session_id, packet } => self.send_packet(session_id, packet),
                Effect::Broadcast { packet } => self.broadcast_packet(&packet),
                Effect::ScheduleChaosEnd { generation, after } => {
                    self.schedule_chaos_end(generation, after)
                }
            }
        }
    }

    fn send_packet(&self, session_id: SessionId, packet: ServerPacket) {
        match self.peers.get(&session_id) {
            Some(outbound) => {
                if outbound.send(packet).is_err() {
                    debug!("Session {} outbound queue closed", session_id);
                }
            }
            None => warn!("No connection for session {}", session_id),
        }
    }

    fn broadcast_packet(&self, packet: &ServerPacket) {
        for (session_id, outbound) in &self.peers {
            if outbound.send(packet.clone()).is_err() {
                debug!("Session {} outbound queue closed", session_id);
            }
        }
    }

    /// Replaces any pending chaos timer with one for `generation`
    fn schedule_chaos_end(&mut self, generation: u64, after: Duration) {
        if let Some(previous) = self.chaos_timer.take() {
            previous.abort();
        }

        let server_tx = self.server_tx.clone();
        self.chaos_timer = Some(tokio::spawn(async move {
            tokio::time::sleep(after).await;
            if let Err(e) = server_tx.send(ServerMessage::ChaosTimerElapsed { generation }) {
                error!("Failed to deliver chaos timer: {}", e);
            }
        }));
    }

    fn handle_message(&mut self, message: ServerMessage) {
        match message {
            ServerMessage::SessionOpened {
                session_id,
                addr,
                outbound,
            } => self.open_session(session_id, addr, outbound),
            ServerMessage::PacketReceived { session_id, packet } => {
                let effects = self.router.handle_packet(session_id, packet);
                self.apply(effects);
            }
            ServerMessage::SessionClosed { session_id } => self.close_session(session_id),
            ServerMessage::ChaosTimerElapsed { generation } => {
                let effects = self.router.chaos_timer_elapsed(generation);
                self.apply(effects);
            }
            ServerMessage::Shutdown => {}
        }
    }

    /// Main server loop; returns after [`ServerMessage::Shutdown`]
    pub async fn run(mut self) {
        let acceptor = self.spawn_acceptor();
        info!("Server started successfully");

        while let Some(message) = self.server_rx.recv().await {
            if let ServerMessage::Shutdown = message {
                info!("Server shutting down");
                break;
            }
            self.handle_message(message);
        }

        if let Some(acceptor) = acceptor {
            acceptor.abort();
        }
        if let Some(timer) = self.chaos_timer.take() {
            timer.abort();
        }
    }
}

/// Runs one WebSocket connection until either side closes it
async fn handle_connection(
    stream: TcpStream,
    addr: SocketAddr,
    session_id: SessionId,
    server_tx: mpsc::UnboundedSender<ServerMessage>,
) {
    let ws = match tokio_tungstenite::accept_async(stream).await {
        Ok(ws) => ws,
        Err(e) => {
            warn!("WebSocket handshake with {} failed: {}", addr, e);
            return;
        }
    };

    let (mut ws_tx, mut ws_rx) = ws.split();
    let (outbound_tx, mut outbound_rx) = mpsc::unbounded_channel::<ServerPacket>();

    if server_tx
        .send(ServerMessage::SessionOpened {
            session_id,
            addr,
            outbound: outbound_tx,
        })
        .is_err()
    {
        error!("Server loop is gone, dropping connection from {}", addr);
        return;
    }

    let writer = tokio::spawn(async move {
        while let Some(packet) = outbound_rx.recv().await {
            let text = match packet.encode() {
                Ok(text) => text,
                Err(e) => {
                    error!("Failed to encode packet for session {}: {}", session_id, e);
                    continue;
                }
            };

            if let Err(e) = ws_tx.send(Message::text(text)).await {
                debug!("Failed to send to session {}: {}", session_id, e);
                break;
            }
        }
        let _ = ws_tx.close().await;
    });

    while let Some(frame) = ws_rx.next().await {
        match frame {
            Ok(Message::Text(text)) => match ClientPacket::decode(text.as_str()) {
                Ok(packet) => {
                    if server_tx
                        .send(ServerMessage::PacketReceived { session_id, packet })
                        .is_err()
                    {
                        break;
                    }
                }
                Err(e) => warn!("Invalid packet from session {}: {}", session_id, e),
            },
            Ok(Message::Binary(_)) => {
                warn!(
                    "Invalid packet from session {}: {}",
                    session_id,
                    ProtocolError::UnsupportedFrame
                );
            }
            Ok(Message::Close(_)) => break,
            Ok(_) => {}
            Err(e) => {
                debug!("Connection error on session {}: {}", session_id, e);
                break;
            }
        }
    }

    if server_tx
        .send(ServerMessage::SessionClosed { session_id })
        .is_err()
    {
        debug!("Server loop gone before session {} closed", session_id);
    }

    // The writer stops once the main loop drops this session's queue
    let _ = writer.await;
}
