//! # Shared Canvas Server Library
//!
//! This library provides the authoritative server for a multi-user canvas
//! where clients stamp images at their pointer, see each other's cursors, and
//! can set off a synchronized "chaos mode" across every connected session.
//!
//! ## Core Responsibilities
//!
//! ### Resource Distribution
//! Images are handed out from a pool without repeats until every image has
//! been used once, after which the pool refills and a new generation begins.
//! The draw happens exactly once per gesture, on the server, so every client
//! sees the same image for the same stroke.
//!
//! ### Session Tracking
//! Each connection owns ephemeral state: its announced name and color, its
//! last cursor position, and the image pinned to an in-progress drag.
//!
//! ### Event Fan-out
//! State-changing events are broadcast to every session, the sender
//! included, so clients render from the server's resolved event rather than
//! a local guess. Bootstrap data goes only to the session that connected.
//!
//! ## Architecture Design
//!
//! ### Single-Writer Event Loop
//! All shared state lives in one [`router::Router`] owned by the main server
//! task. Connection tasks forward decoded packets over a channel and the loop
//! applies them one at a time, so a pool draw can never interleave with
//! another and commit order matches arrival order.
//!
//! ### WebSocket Transport
//! Clients speak JSON over WebSocket. Delivery is best-effort: a slow or
//! dead connection only loses its own packets.
//!
//! ## Module Organization
//!
//! ### Pool Module (`pool`)
//! The no-repeat resource pool and its generation cycling.
//!
//! ### Session Registry Module (`session_registry`)
//! Per-connection identity, cursor and pinned-resource records.
//!
//! ### Router Module (`router`)
//! The protocol state machine mapping inbound packets to outbound effects,
//! including the chaos cycle and its timer generations.
//!
//! ### Network Module (`network`)
//! Connection accept, WebSocket framing, the main loop and chaos timers.
//!
//! ### Assets and Config (`assets`, `config`)
//! Image counts scanned from disk and the server's runtime settings.
//!
//! ## Usage Example
//!
//! ```rust,no_run
//! use server::assets::DirectoryInventory;
//! use server::config::ServerConfig;
//! use server::network::Server;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = ServerConfig::default();
//!     let inventory = DirectoryInventory::new(&config.images_dir, &config.peaceful_dir);
//!
//!     let server = Server::new(&config, Box::new(inventory)).await?;
//!     server.run().await;
//!
//!     Ok(())
//! }
//! ```

pub mod assets;
pub mod config;
pub mod network;
pub mod pool;
pub mod router;
pub mod session_registry;
