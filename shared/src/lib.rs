use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

pub const DEFAULT_PORT: u16 = 3001;
pub const DEFAULT_STEP: f32 = 4.0;
pub const DEFAULT_SPAWN: (f32, f32) = (0.0, 0.0);
pub const WORLD_WIDTH: f32 = 800.0;
pub const WORLD_HEIGHT: f32 = 600.0;

/// Colours handed out to players in join order.
pub const PLAYER_COLORS: [&str; 8] = [
    "#ff0000", "#0000ff", "#00aa00", "#800080", "#ffa500", "#00ffff", "#ff00ff", "#ffd700",
];

/// Server-assigned identifier of a live connection. Never reused.
pub type ConnectionId = u32;

/// Current player set keyed by owning connection.
pub type WorldSnapshot = BTreeMap<ConnectionId, PlayerEntity>;

/// Classification of a connection. `Unassigned` until the client declares
/// itself, then fixed for the rest of the connection's life.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Role {
    Unassigned,
    Player,
    Viewer,
}

/// Roles a client may declare with `setRole`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeclaredRole {
    Player,
    Viewer,
}

impl From<DeclaredRole> for Role {
    fn from(role: DeclaredRole) -> Self {
        match role {
            DeclaredRole::Player => Role::Player,
            DeclaredRole::Viewer => Role::Viewer,
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Role::Unassigned => "unassigned",
            Role::Player => "player",
            Role::Viewer => "viewer",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Axis {
    Horizontal,
    Vertical,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    Up,
    Down,
    Left,
    Right,
}

impl Direction {
    pub const ALL: [Direction; 4] = [
        Direction::Up,
        Direction::Down,
        Direction::Left,
        Direction::Right,
    ];

    pub fn axis(self) -> Axis {
        match self {
            Direction::Left | Direction::Right => Axis::Horizontal,
            Direction::Up | Direction::Down => Axis::Vertical,
        }
    }

    /// Position delta for a single step. Screen coordinates: `up` decreases y.
    pub fn delta(self, step: f32) -> (f32, f32) {
        match self {
            Direction::Up => (0.0, -step),
            Direction::Down => (0.0, step),
            Direction::Left => (-step, 0.0),
            Direction::Right => (step, 0.0),
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Direction::Up => "up",
            Direction::Down => "down",
            Direction::Left => "left",
            Direction::Right => "right",
        }
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnknownDirection(pub String);

impl fmt::Display for UnknownDirection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "unknown direction {:?}", self.0)
    }
}

impl std::error::Error for UnknownDirection {}

impl FromStr for Direction {
    type Err = UnknownDirection;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "up" => Ok(Direction::Up),
            "down" => Ok(Direction::Down),
            "left" => Ok(Direction::Left),
            "right" => Ok(Direction::Right),
            other => Err(UnknownDirection(other.to_string())),
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct PlayerEntity {
    pub id: ConnectionId,
    pub x: f32,
    pub y: f32,
    pub color: String,
    pub name: String,
}

impl PlayerEntity {
    pub fn new(id: ConnectionId, position: (f32, f32), color: String, name: String) -> Self {
        Self {
            id,
            x: position.0,
            y: position.1,
            color,
            name,
        }
    }

    pub fn position(&self) -> (f32, f32) {
        (self.x, self.y)
    }
}

/// Payload of a `move` event. The direction stays a raw string on the wire
/// so the server can tell an unknown direction apart from a broken frame.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct MoveCommand {
    pub direction: String,
}

impl From<Direction> for MoveCommand {
    fn from(direction: Direction) -> Self {
        Self {
            direction: direction.as_str().to_string(),
        }
    }
}

/// Events sent by clients, framed as `{"event": ..., "data": ...}`.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(tag = "event", content = "data", rename_all = "camelCase")]
pub enum ClientEvent {
    SetRole(DeclaredRole),
    Move(MoveCommand),
}

/// Events pushed by the server.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(tag = "event", content = "data", rename_all = "camelCase")]
pub enum ServerEvent {
    PlayerData(PlayerEntity),
    Players(WorldSnapshot),
}

impl ClientEvent {
    pub fn encode(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }

    pub fn decode(text: &str) -> serde_json::Result<Self> {
        serde_json::from_str(text)
    }
}

impl ServerEvent {
    pub fn encode(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }

    pub fn decode(text: &str) -> serde_json::Result<Self> {
        serde_json::from_str(text)
    }
}

/// Picks the palette colour for the `ordinal`-th player to join (0-based).
pub fn palette_color(ordinal: usize) -> String {
    PLAYER_COLORS[ordinal % PLAYER_COLORS.len()].to_string()
}

pub fn default_name(id: ConnectionId) -> String {
    format!("Player {}", id)
}
