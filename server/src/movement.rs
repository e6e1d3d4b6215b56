//! Movement command validation and application.
//!
//! A move is a single unit-step delta against the player's current
//! position, never an absolute position. Rejected moves leave all state
//! untouched.

use crate::config::WorldBounds;
use crate::error::{SyncError, SyncResult};
use crate::registry::ConnectionRegistry;
use crate::store::PlayerStore;
use shared::{Axis, ConnectionId, Direction, Role};

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MovementProcessor {
    step: f32,
    bounds: Option<WorldBounds>,
}

impl MovementProcessor {
    pub fn new(step: f32, bounds: Option<WorldBounds>) -> Self {
        Self { step, bounds }
    }

    pub fn step(&self) -> f32 {
        self.step
    }

    /// Parses `raw_direction` and applies it for `id`.
    pub fn process_move(
        &self,
        registry: &ConnectionRegistry,
        store: &mut PlayerStore,
        id: ConnectionId,
        raw_direction: &str,
    ) -> SyncResult<(f32, f32)> {
        Self::check_player(registry, id)?;
        let direction = parse_direction(raw_direction)?;
        self.apply(registry, store, id, direction)
    }

    pub fn apply(
        &self,
        registry: &ConnectionRegistry,
        store: &mut PlayerStore,
        id: ConnectionId,
        direction: Direction,
    ) -> SyncResult<(f32, f32)> {
        Self::check_player(registry, id)?;
        store.apply_movement(id, direction, self.step, self.bounds.as_ref())
    }

    /// Applies one tick worth of buffered moves after coalescing them.
    /// Returns the final position, or `None` if there was nothing to apply.
    pub fn apply_batch(
        &self,
        registry: &ConnectionRegistry,
        store: &mut PlayerStore,
        id: ConnectionId,
        moves: &[Direction],
    ) -> SyncResult<Option<(f32, f32)>> {
        let mut position = None;
        for direction in coalesce(moves) {
            position = Some(self.apply(registry, store, id, direction)?);
        }
        Ok(position)
    }

    fn check_player(registry: &ConnectionRegistry, id: ConnectionId) -> SyncResult<()> {
        match registry.role(id) {
            Some(Role::Player) => Ok(()),
            _ => Err(SyncError::NotAPlayer(id)),
        }
    }
}

pub fn parse_direction(raw: &str) -> SyncResult<Direction> {
    raw.parse()
        .map_err(|err: shared::UnknownDirection| SyncError::InvalidDirection(err.0))
}

/// Reduces a tick's moves to at most one direction per axis. The most
/// recent command on each axis wins; horizontal and vertical are
/// independent, so a diagonal survives as one of each.
pub fn coalesce(moves: &[Direction]) -> Vec<Direction> {
    let latest = |axis: Axis| moves.iter().rev().find(|d| d.axis() == axis).copied();

    [latest(Axis::Horizontal), latest(Axis::Vertical)]
        .into_iter()
        .flatten()
        .collect()
}
