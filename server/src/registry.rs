//! Connection registry for the sync server
//!
//! This module tracks every live connection and the role it has declared:
//! - Connection lifecycle (register, remove, idle detection)
//! - One-shot role classification (`unassigned` -> `player` | `viewer`)
//! - Buffered movement commands for tick-based broadcasting
//! - Capacity management and identifier allocation
//!
//! The registry is a leaf component. It knows nothing about player entities;
//! the session pairs role changes with the player store.

use crate::error::{SyncError, SyncResult};
use log::info;
use shared::{ConnectionId, DeclaredRole, Direction, Role};
use std::collections::HashMap;
use std::net::SocketAddr;
use std::time::{Duration, Instant};

/// A live transport session and its classification
#[derive(Debug)]
pub struct Connection {
    /// Unique identifier assigned by the registry
    pub id: ConnectionId,
    /// Peer address, kept for logging
    pub addr: SocketAddr,
    /// Declared role; starts as `Unassigned`
    pub role: Role,
    /// Last time we received any frame from this connection
    pub last_seen: Instant,
    /// Moves waiting for the next broadcast tick
    pub pending_moves: Vec<Direction>,
}

impl Connection {
    /// Creates an unassigned connection marked as recently active.
    pub fn new(id: ConnectionId, addr: SocketAddr) -> Self {
        Self {
            id,
            addr,
            role: Role::Unassigned,
            last_seen: Instant::now(),
            pending_moves: Vec::new(),
        }
    }

    pub fn is_player(&self) -> bool {
        self.role == Role::Player
    }

    /// Returns true if nothing has been received within `timeout`.
    pub fn is_timed_out(&self, timeout: Duration) -> bool {
        self.last_seen.elapsed() > timeout
    }
}

/// All live connections, indexed by id
///
/// Identifiers come from a monotonic counter starting at 1, so an id is
/// never handed out twice during the lifetime of the process, even after
/// its connection is gone.
pub struct ConnectionRegistry {
    connections: HashMap<ConnectionId, Connection>,
    next_id: ConnectionId,
    max_clients: usize,
}

impl ConnectionRegistry {
    pub fn new(max_clients: usize) -> Self {
        Self {
            connections: HashMap::new(),
            next_id: 1,
            max_clients,
        }
    }

    /// Registers a new connection with role `Unassigned`.
    ///
    /// Fails with `ServerFull` when the capacity limit is reached.
    pub fn register(&mut self, addr: SocketAddr) -> SyncResult<ConnectionId> {
        if self.connections.len() >= self.max_clients {
            return Err(SyncError::ServerFull {
                max: self.max_clients,
            });
        }

        let id = self.next_id;
        self.next_id += 1;

        info!("Connection {} registered from {}", id, addr);
        self.connections.insert(id, Connection::new(id, addr));

        Ok(id)
    }

    /// Assigns the declared role exactly once.
    ///
    /// A second call, whatever the value, fails with `AlreadyAssigned` and
    /// leaves the stored role untouched.
    pub fn set_role(&mut self, id: ConnectionId, role: DeclaredRole) -> SyncResult<Role> {
        let connection = self
            .connections
            .get_mut(&id)
            .ok_or(SyncError::NotFound(id))?;

        if connection.role != Role::Unassigned {
            return Err(SyncError::AlreadyAssigned(id));
        }

        connection.role = role.into();
        info!("Connection {} declared role {}", id, connection.role);
        Ok(connection.role)
    }

    pub fn lookup(&self, id: ConnectionId) -> SyncResult<&Connection> {
        self.connections.get(&id).ok_or(SyncError::NotFound(id))
    }

    /// Role of a connection, `None` once it is gone.
    pub fn role(&self, id: ConnectionId) -> Option<Role> {
        self.connections.get(&id).map(|connection| connection.role)
    }

    /// Removes a connection. Returns the removed entry, if any.
    pub fn remove(&mut self, id: ConnectionId) -> Option<Connection> {
        let removed = self.connections.remove(&id);
        if let Some(connection) = &removed {
            info!(
                "Connection {} removed (role {})",
                connection.id, connection.role
            );
        }
        removed
    }

    /// Refreshes the activity timestamp. Returns false for unknown ids.
    pub fn touch(&mut self, id: ConnectionId) -> bool {
        match self.connections.get_mut(&id) {
            Some(connection) => {
                connection.last_seen = Instant::now();
                true
            }
            None => false,
        }
    }

    /// Lists connections that have been silent for longer than `timeout`.
    /// Removal is left to the caller so entities can be torn down with them.
    pub fn idle_connections(&self, timeout: Duration) -> Vec<ConnectionId> {
        let mut idle: Vec<ConnectionId> = self
            .connections
            .values()
            .filter(|connection| connection.is_timed_out(timeout))
            .map(|connection| connection.id)
            .collect();
        idle.sort_unstable();
        idle
    }

    /// Buffers a move for the next tick. Only players may queue moves.
    pub fn queue_move(&mut self, id: ConnectionId, direction: Direction) -> SyncResult<()> {
        let connection = self
            .connections
            .get_mut(&id)
            .ok_or(SyncError::NotAPlayer(id))?;

        if !connection.is_player() {
            return Err(SyncError::NotAPlayer(id));
        }

        connection.pending_moves.push(direction);
        Ok(())
    }

    /// Drains buffered moves of every connection, in arrival order per
    /// connection. Connections without pending moves are skipped.
    pub fn take_pending_moves(&mut self) -> Vec<(ConnectionId, Vec<Direction>)> {
        let mut batches: Vec<(ConnectionId, Vec<Direction>)> = self
            .connections
            .values_mut()
            .filter(|connection| !connection.pending_moves.is_empty())
            .map(|connection| (connection.id, std::mem::take(&mut connection.pending_moves)))
            .collect();
        batches.sort_unstable_by_key(|(id, _)| *id);
        batches
    }

    pub fn ids(&self) -> Vec<ConnectionId> {
        let mut ids: Vec<ConnectionId> = self.connections.keys().copied().collect();
        ids.sort_unstable();
        ids
    }

    pub fn count_role(&self, role: Role) -> usize {
        self.connections
            .values()
            .filter(|connection| connection.role == role)
            .count()
    }

    pub fn len(&self) -> usize {
        self.connections.len()
    }

    pub fn is_empty(&self) -> bool {
        self.connections.is_empty()
    }
}
