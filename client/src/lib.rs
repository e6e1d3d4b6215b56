//! # Venue Sync Client Library
//!
//! Client side of the venue presence layer. It covers the three kinds of
//! participant the server knows about: the venue screen watching the world,
//! a phone controller moving one player, and an operator dashboard.
//!
//! ## Module Organization
//!
//! ### Connection Module (`connection`)
//! WebSocket session with the server:
//! - Role declaration and `move` commands
//! - Decoding of `playerData` and `players` events
//! - Splitting into sender and receiver halves for concurrent loops
//!
//! ### View Module (`view`)
//! Local mirror of the player set. Each snapshot replaces the previous one
//! and reports who joined, left or moved.
//!
//! ### Input Module (`input`)
//! Held directions with most-recent-wins per axis, plus parsing of the text
//! commands the controller reads from stdin.
//!
//! ### Runner Module (`runner`)
//! The viewer, controller and dashboard loops the binary runs.
//!
//! ## Usage Example
//!
//! ```rust,no_run
//! use client::connection::SyncClient;
//! use client::view::WorldView;
//! use shared::{DeclaredRole, Direction};
//!
//! # async fn demo() -> client::connection::ClientResult<()> {
//! let mut client = SyncClient::connect("ws://127.0.0.1:3001").await?;
//! client.set_role(DeclaredRole::Player).await?;
//! client.send_move(Direction::Up).await?;
//!
//! let mut view = WorldView::new();
//! while let Some(event) = client.next_event().await? {
//!     let change = view.apply(event);
//!     println!("{} players, {} moved", view.players().len(), change.moved.len());
//! }
//! # Ok(())
//! # }
//! ```

pub mod connection;
pub mod input;
pub mod runner;
pub mod view;
