//! Session lifecycle handling
//!
//! The `Session` owns the connection registry, the player store and the
//! broadcaster, and is the only thing that mutates them. The network layer
//! feeds it one event at a time from a single task, so every mutation runs
//! to completion before the next one starts and no reader ever sees a
//! connection whose role and entity disagree.
//!
//! Per connection:
//!
//! ```text
//! Connecting --handshake--> Unassigned --setRole--> Player | Viewer --close--> Disconnected
//! ```

use crate::broadcast::{Broadcaster, Outbox};
use crate::config::{BroadcastCadence, ServerConfig};
use crate::error::{SyncError, SyncResult};
use crate::movement::{parse_direction, MovementProcessor};
use crate::registry::ConnectionRegistry;
use crate::store::PlayerStore;
use log::{debug, info, warn};
use shared::{
    default_name, palette_color, ClientEvent, ConnectionId, DeclaredRole, PlayerEntity, Role,
    ServerEvent, WorldSnapshot,
};
use std::net::SocketAddr;
use std::time::Duration;

/// Where a connection is in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Unassigned,
    Player,
    Viewer,
    /// Never connected, or already torn down.
    Disconnected,
}

impl From<Role> for SessionState {
    fn from(role: Role) -> Self {
        match role {
            Role::Unassigned => SessionState::Unassigned,
            Role::Player => SessionState::Player,
            Role::Viewer => SessionState::Viewer,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SessionStats {
    pub connections: usize,
    pub players: usize,
    pub viewers: usize,
    pub unassigned: usize,
}

pub struct Session {
    config: ServerConfig,
    registry: ConnectionRegistry,
    store: PlayerStore,
    movement: MovementProcessor,
    broadcaster: Broadcaster,
    /// Players spawned so far; picks the palette colour.
    players_joined: usize,
}

impl Session {
    pub fn new(config: ServerConfig) -> Self {
        Self {
            registry: ConnectionRegistry::new(config.max_clients),
            store: PlayerStore::new(),
            movement: MovementProcessor::new(config.step, config.bounds),
            broadcaster: Broadcaster::new(),
            players_joined: 0,
            config,
        }
    }

    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    pub fn registry(&self) -> &ConnectionRegistry {
        &self.registry
    }

    pub fn store(&self) -> &PlayerStore {
        &self.store
    }

    /// Registers a connection whose handshake has completed and attaches
    /// its outbox. The connection starts `Unassigned`.
    pub fn connect(&mut self, addr: SocketAddr, outbox: Outbox) -> SyncResult<ConnectionId> {
        let id = self.registry.register(addr)?;
        self.broadcaster.attach(id, outbox);
        Ok(id)
    }

    /// Dispatches one client event. Failures are absorbed here: commands
    /// are best-effort and nothing is reported back to the client.
    pub fn handle_event(&mut self, id: ConnectionId, event: ClientEvent) {
        if !self.registry.touch(id) {
            debug!("Dropping event from unknown connection {}", id);
            return;
        }

        match event {
            ClientEvent::SetRole(role) => match self.declare_role(id, role) {
                Ok(_) => {}
                Err(SyncError::AlreadyAssigned(_)) => {
                    debug!("Ignoring repeated setRole from connection {}", id);
                }
                Err(e) => warn!("setRole from connection {} failed: {}", id, e),
            },
            ClientEvent::Move(command) => match self.handle_move(id, &command.direction) {
                Ok(_) => {}
                Err(SyncError::NotAPlayer(_)) => {
                    debug!("Dropping move from non-player connection {}", id);
                }
                Err(e) => warn!("Dropping move from connection {}: {}", id, e),
            },
        }
    }

    /// Records liveness traffic (pongs) without any other effect.
    pub fn heartbeat(&mut self, id: ConnectionId) -> bool {
        self.registry.touch(id)
    }

    /// Assigns the declared role. A player gets its entity in the same step
    /// and is announced; a viewer receives the current player set.
    pub fn declare_role(&mut self, id: ConnectionId, role: DeclaredRole) -> SyncResult<Role> {
        let result = self.assign_role(id, role);
        self.evict_overflowed();
        result
    }

    fn assign_role(&mut self, id: ConnectionId, role: DeclaredRole) -> SyncResult<Role> {
        let role = self.registry.set_role(id, role)?;

        match role {
            Role::Player => {
                self.spawn_player(id)?;
            }
            Role::Viewer => {
                self.broadcaster.on_viewer_join(id, &self.store.snapshot());
            }
            Role::Unassigned => {}
        }

        Ok(role)
    }

    fn spawn_player(&mut self, id: ConnectionId) -> SyncResult<PlayerEntity> {
        let position = self.config.spawn_position();
        let color = palette_color(self.players_joined);
        let player =
            self.store
                .create_entity(&self.registry, id, position, color, default_name(id))?;
        self.players_joined += 1;

        match self.config.cadence {
            BroadcastCadence::OnChange => {
                self.broadcaster
                    .on_player_join(id, &player, &self.store.snapshot());
            }
            BroadcastCadence::Interval(_) => {
                self.broadcaster
                    .send_to(id, &ServerEvent::PlayerData(player.clone()));
            }
        }

        Ok(player)
    }

    /// Handles a `move` command.
    ///
    /// With push-on-change the step is applied and fanned out at once and
    /// the new position is returned. With interval cadence the move is only
    /// validated and buffered for the next `tick`, and `None` is returned.
    pub fn handle_move(
        &mut self,
        id: ConnectionId,
        raw_direction: &str,
    ) -> SyncResult<Option<(f32, f32)>> {
        let result = self.apply_move(id, raw_direction);
        self.evict_overflowed();
        result
    }

    fn apply_move(
        &mut self,
        id: ConnectionId,
        raw_direction: &str,
    ) -> SyncResult<Option<(f32, f32)>> {
        if self.config.promote_on_move && self.registry.role(id) == Some(Role::Unassigned) {
            parse_direction(raw_direction)?;
            info!("Promoting connection {} to player on first move", id);
            self.assign_role(id, DeclaredRole::Player)?;
        }

        match self.config.cadence {
            BroadcastCadence::OnChange => {
                let position =
                    self.movement
                        .process_move(&self.registry, &mut self.store, id, raw_direction)?;
                self.broadcaster.on_movement(&self.store.snapshot());
                Ok(Some(position))
            }
            BroadcastCadence::Interval(_) => {
                if self.registry.role(id) != Some(Role::Player) {
                    return Err(SyncError::NotAPlayer(id));
                }
                let direction = parse_direction(raw_direction)?;
                self.registry.queue_move(id, direction)?;
                Ok(None)
            }
        }
    }

    /// One broadcast tick: applies buffered moves (at most one per axis per
    /// player) and sends the resulting set to every connection. Returns the
    /// number of players that moved.
    pub fn tick(&mut self) -> usize {
        let mut moved = 0;
        for (id, moves) in self.registry.take_pending_moves() {
            match self
                .movement
                .apply_batch(&self.registry, &mut self.store, id, &moves)
            {
                Ok(Some(_)) => moved += 1,
                Ok(None) => {}
                Err(e) => debug!("Dropping buffered moves of connection {}: {}", id, e),
            }
        }

        self.broadcaster.broadcast_snapshot(&self.store.snapshot());
        self.evict_overflowed();
        moved
    }

    /// Tears a connection down: registry entry, outbox and, for players,
    /// the entity, followed by a broadcast of the reduced set. Returns false
    /// if the connection was already gone.
    pub fn disconnect(&mut self, id: ConnectionId) -> bool {
        let removed = self.teardown(id);
        self.evict_overflowed();
        removed
    }

    fn teardown(&mut self, id: ConnectionId) -> bool {
        let Some(connection) = self.registry.remove(id) else {
            return false;
        };
        self.broadcaster.detach(id);

        if self.store.remove(id).is_some() {
            if self.config.cadence == BroadcastCadence::OnChange {
                self.broadcaster.on_leave(&self.store.snapshot());
            }
        } else if connection.is_player() {
            warn!("Player connection {} had no entity at teardown", id);
        }

        true
    }

    /// Tears down connections whose outbox overflowed. A teardown can
    /// broadcast a leave that overflows another outbox, so this runs until
    /// nothing new is reported.
    fn evict_overflowed(&mut self) {
        loop {
            let overflowed = self.broadcaster.take_overflowed();
            if overflowed.is_empty() {
                break;
            }
            for id in overflowed {
                warn!("Dropping connection {}: not reading its updates", id);
                self.teardown(id);
            }
        }
    }

    /// Disconnects every connection that has been silent for `timeout`.
    pub fn expire_idle(&mut self, timeout: Duration) -> Vec<ConnectionId> {
        let idle = self.registry.idle_connections(timeout);
        for id in &idle {
            warn!("Connection {} timed out", id);
            self.disconnect(*id);
        }
        idle
    }

    pub fn state(&self, id: ConnectionId) -> SessionState {
        self.registry
            .role(id)
            .map(SessionState::from)
            .unwrap_or(SessionState::Disconnected)
    }

    pub fn snapshot(&self) -> WorldSnapshot {
        self.store.snapshot()
    }

    pub fn player(&self, id: ConnectionId) -> Option<&PlayerEntity> {
        self.store.get(id)
    }

    pub fn stats(&self) -> SessionStats {
        SessionStats {
            connections: self.registry.len(),
            players: self.registry.count_role(Role::Player),
            viewers: self.registry.count_role(Role::Viewer),
            unassigned: self.registry.count_role(Role::Unassigned),
        }
    }
}
