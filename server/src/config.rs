//! Server tunables. Built from command-line arguments in `main.rs`; tests
//! construct them directly, usually from `ServerConfig::default()`.

use crate::error::{SyncError, SyncResult};
use rand::Rng;
use shared::{DEFAULT_SPAWN, DEFAULT_STEP, WORLD_HEIGHT, WORLD_WIDTH};
use std::time::Duration;

/// Axis-aligned rectangle that player positions are clamped into.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct WorldBounds {
    pub min_x: f32,
    pub min_y: f32,
    pub max_x: f32,
    pub max_y: f32,
}

impl WorldBounds {
    pub fn new(min_x: f32, min_y: f32, max_x: f32, max_y: f32) -> Self {
        Self {
            min_x: min_x.min(max_x),
            min_y: min_y.min(max_y),
            max_x: min_x.max(max_x),
            max_y: min_y.max(max_y),
        }
    }

    /// The default play area with its top-left corner at the origin.
    pub fn default_area() -> Self {
        Self::new(0.0, 0.0, WORLD_WIDTH, WORLD_HEIGHT)
    }

    pub fn clamp(&self, x: f32, y: f32) -> (f32, f32) {
        (x.clamp(self.min_x, self.max_x), y.clamp(self.min_y, self.max_y))
    }

    pub fn contains(&self, x: f32, y: f32) -> bool {
        x >= self.min_x && x <= self.max_x && y >= self.min_y && y <= self.max_y
    }

    pub fn is_finite(&self) -> bool {
        [self.min_x, self.min_y, self.max_x, self.max_y]
            .iter()
            .all(|v| v.is_finite())
    }
}

/// Where new players appear.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum SpawnPolicy {
    Fixed { x: f32, y: f32 },
    /// Uniformly random inside the world bounds, or the default area when
    /// the world is unbounded.
    Scatter,
}

impl SpawnPolicy {
    pub fn position(&self, bounds: Option<&WorldBounds>) -> (f32, f32) {
        match *self {
            SpawnPolicy::Fixed { x, y } => match bounds {
                Some(bounds) => bounds.clamp(x, y),
                None => (x, y),
            },
            SpawnPolicy::Scatter => {
                let area = bounds.copied().unwrap_or_else(WorldBounds::default_area);
                let mut rng = rand::thread_rng();
                let x = if area.max_x > area.min_x {
                    rng.gen_range(area.min_x..area.max_x)
                } else {
                    area.min_x
                };
                let y = if area.max_y > area.min_y {
                    rng.gen_range(area.min_y..area.max_y)
                } else {
                    area.min_y
                };
                (x, y)
            }
        }
    }
}

impl Default for SpawnPolicy {
    fn default() -> Self {
        SpawnPolicy::Fixed {
            x: DEFAULT_SPAWN.0,
            y: DEFAULT_SPAWN.1,
        }
    }
}

/// When `players` snapshots are fanned out.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BroadcastCadence {
    /// Every mutation triggers an immediate fan-out.
    OnChange,
    /// Fan out every period whether or not anything changed. Moves are
    /// buffered and applied once per tick.
    Interval(Duration),
}

#[derive(Debug, Clone, PartialEq)]
pub struct ServerConfig {
    pub step: f32,
    pub spawn: SpawnPolicy,
    pub bounds: Option<WorldBounds>,
    pub cadence: BroadcastCadence,
    pub max_clients: usize,
    /// Connections with no inbound traffic for this long are torn down.
    pub client_timeout: Duration,
    pub heartbeat_interval: Duration,
    /// Frames that may wait for a slow connection before it is dropped.
    pub outbox_capacity: usize,
    /// Treat a `move` from an unassigned connection as an implicit
    /// `setRole("player")`.
    pub promote_on_move: bool,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            step: DEFAULT_STEP,
            spawn: SpawnPolicy::default(),
            bounds: None,
            cadence: BroadcastCadence::OnChange,
            max_clients: 256,
            client_timeout: Duration::from_secs(30),
            heartbeat_interval: Duration::from_secs(10),
            outbox_capacity: 64,
            promote_on_move: false,
        }
    }
}

impl ServerConfig {
    pub fn spawn_position(&self) -> (f32, f32) {
        self.spawn.position(self.bounds.as_ref())
    }

    /// Rejects values the main loop cannot run with. Geometry must be
    /// finite, the heartbeat must be shorter than the client timeout, and
    /// the outbox must hold at least one frame.
    pub fn validate(&self) -> SyncResult<()> {
        if !self.step.is_finite() || self.step <= 0.0 {
            return Err(SyncError::InvalidConfig(format!(
                "step must be a positive finite number, got {}",
                self.step
            )));
        }
        if let SpawnPolicy::Fixed { x, y } = self.spawn {
            if !x.is_finite() || !y.is_finite() {
                return Err(SyncError::InvalidConfig(format!(
                    "spawn position ({}, {}) is not finite",
                    x, y
                )));
            }
        }
        if let Some(bounds) = &self.bounds {
            if !bounds.is_finite() {
                return Err(SyncError::InvalidConfig(format!(
                    "bounds {:?} are not finite",
                    bounds
                )));
            }
        }
        if self.heartbeat_interval >= self.client_timeout {
            return Err(SyncError::InvalidConfig(format!(
                "heartbeat ({:?}) must be shorter than the client timeout ({:?})",
                self.heartbeat_interval, self.client_timeout
            )));
        }
        if self.outbox_capacity == 0 {
            return Err(SyncError::InvalidConfig(
                "outbox capacity must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}
