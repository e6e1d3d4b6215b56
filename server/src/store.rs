use crate::config::WorldBounds;
use crate::error::{SyncError, SyncResult};
use crate::registry::ConnectionRegistry;
use log::{debug, info};
use shared::{ConnectionId, Direction, PlayerEntity, Role, WorldSnapshot};
use std::collections::HashMap;

/// Authoritative player entities, one per connection with role `Player`.
#[derive(Debug, Clone, Default)]
pub struct PlayerStore {
    players: HashMap<ConnectionId, PlayerEntity>,
}

impl PlayerStore {
    pub fn new() -> Self {
        Self {
            players: HashMap::new(),
        }
    }

    /// Creates the entity for a connection that has just become a player.
    ///
    /// The registry is consulted again here: an entity is only ever created
    /// for a connection whose role is `Player` at call time.
    pub fn create_entity(
        &mut self,
        registry: &ConnectionRegistry,
        id: ConnectionId,
        position: (f32, f32),
        color: String,
        name: String,
    ) -> SyncResult<PlayerEntity> {
        if registry.role(id) != Some(Role::Player) {
            return Err(SyncError::NotAPlayer(id));
        }

        let player = PlayerEntity::new(id, position, color, name);
        info!(
            "Added player {} at ({}, {}) as {} {}",
            id, player.x, player.y, player.name, player.color
        );
        self.players.insert(id, player.clone());
        Ok(player)
    }

    /// Moves a player one step and returns its new position, clamped into
    /// `bounds` when the world has them.
    pub fn apply_movement(
        &mut self,
        id: ConnectionId,
        direction: Direction,
        step: f32,
        bounds: Option<&WorldBounds>,
    ) -> SyncResult<(f32, f32)> {
        let player = self
            .players
            .get_mut(&id)
            .ok_or(SyncError::NotAPlayer(id))?;

        let (dx, dy) = direction.delta(step);
        let (x, y) = (player.x + dx, player.y + dy);
        let (x, y) = match bounds {
            Some(bounds) => bounds.clamp(x, y),
            None => (x, y),
        };
        player.x = x;
        player.y = y;

        debug!("Player {} moved {} to ({}, {})", id, direction, x, y);
        Ok((x, y))
    }

    pub fn remove(&mut self, id: ConnectionId) -> Option<PlayerEntity> {
        let removed = self.players.remove(&id);
        if removed.is_some() {
            info!("Removed player {}", id);
        }
        removed
    }

    /// Owned copy of every player as it is right now.
    pub fn snapshot(&self) -> WorldSnapshot {
        self.players
            .iter()
            .map(|(id, player)| (*id, player.clone()))
            .collect()
    }

    pub fn get(&self, id: ConnectionId) -> Option<&PlayerEntity> {
        self.players.get(&id)
    }

    pub fn contains(&self, id: ConnectionId) -> bool {
        self.players.contains_key(&id)
    }

    pub fn len(&self) -> usize {
        self.players.len()
    }

    pub fn is_empty(&self) -> bool {
        self.players.is_empty()
    }
}
