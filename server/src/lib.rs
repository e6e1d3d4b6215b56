//! # Venue Sync Server Library
//!
//! This library provides the authoritative server for the venue presence and
//! movement layer. Three kinds of clients connect to it: the venue screen
//! (a passive viewer), mobile controllers (players) and the dashboard
//! (another viewer). The server holds the only copy of the shared player set
//! and pushes it to everyone whenever it changes.
//!
//! ## Core Responsibilities
//!
//! ### Role Classification
//! Every connection starts unassigned and declares itself once as either a
//! `player` or a `viewer`. The declaration is final; repeated declarations
//! are ignored.
//!
//! ### Player Registry
//! Each player connection owns exactly one entity (position, colour, display
//! name). The entity appears with the role and disappears with the
//! connection, including abrupt drops and idle timeouts.
//!
//! ### Movement
//! Players send directional `move` commands. Each command is one fixed-size
//! step applied to the current position; viewers cannot move anything.
//!
//! ### State Broadcasting
//! After every change the full player set is sent to every connection. A new
//! player additionally receives its own entity, and a new viewer receives
//! the current set straight away.
//!
//! ## Architecture Design
//!
//! ### Single Writer
//! All state lives in one [`session::Session`] owned by the main loop in
//! [`network::Server::run`]. Connection tasks only parse frames and forward
//! them over a channel, so mutations are applied one at a time and never
//! interleave.
//!
//! ### WebSocket Transport
//! Clients talk JSON over WebSocket text frames: `{"event": ..., "data": ...}`.
//! Each connection has a reader task feeding the main loop and a writer task
//! draining a per-connection outbox, which keeps outgoing frames in order.
//!
//! ## Module Organization
//!
//! - `registry`: live connections and their roles
//! - `store`: player entities and snapshots
//! - `movement`: direction parsing, step application, per-tick coalescing
//! - `broadcast`: per-connection outboxes and fan-out
//! - `session`: lifecycle state machine tying the above together
//! - `network`: listener, connection tasks and main loop
//! - `config`: server tunables
//! - `error`: error type
//!
//! ## Usage Example
//!
//! ```rust,no_run
//! use server::config::ServerConfig;
//! use server::network::Server;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let server = Server::bind("127.0.0.1:3001", ServerConfig::default()).await?;
//!     server.run().await.map_err(|e| e.to_string())?;
//!     Ok(())
//! }
//! ```

pub mod broadcast;
pub mod config;
pub mod error;
pub mod movement;
pub mod network;
pub mod registry;
pub mod session;
pub mod store;
