//! Controller input: held directions and text commands

use shared::{Axis, Direction};

/// Tracks which directions are held and in which order they were pressed.
///
/// Opposing directions on one axis never both apply: the most recently
/// pressed one wins. The two axes are independent, so holding `left` and
/// `up` moves diagonally.
#[derive(Debug, Clone, Default)]
pub struct InputManager {
    /// Held directions, oldest press first
    held: Vec<Direction>,
}

impl InputManager {
    pub fn new() -> Self {
        Self { held: Vec::new() }
    }

    pub fn press(&mut self, direction: Direction) {
        self.held.retain(|d| *d != direction);
        self.held.push(direction);
    }

    pub fn release(&mut self, direction: Direction) {
        self.held.retain(|d| *d != direction);
    }

    pub fn clear(&mut self) {
        self.held.clear();
    }

    pub fn is_idle(&self) -> bool {
        self.held.is_empty()
    }

    /// Directions to send this input tick: at most one per axis,
    /// horizontal first.
    pub fn active_directions(&self) -> Vec<Direction> {
        let latest = |axis: Axis| self.held.iter().rev().find(|d| d.axis() == axis).copied();

        [latest(Axis::Horizontal), latest(Axis::Vertical)]
            .into_iter()
            .flatten()
            .collect()
    }
}

/// One line of controller input.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    /// Single step
    Tap(Direction),
    /// Start moving every input tick
    Hold(Direction),
    Release(Direction),
    Stop,
    Quit,
}

/// Parses controller commands: `up`/`w` taps, `+up` holds, `-up` releases,
/// `stop` releases everything, `quit` exits.
pub fn parse_command(line: &str) -> Option<Command> {
    let line = line.trim().to_ascii_lowercase();

    match line.as_str() {
        "stop" => return Some(Command::Stop),
        "quit" | "exit" | "q" => return Some(Command::Quit),
        _ => {}
    }

    if let Some(rest) = line.strip_prefix('+') {
        return parse_direction(rest).map(Command::Hold);
    }
    if let Some(rest) = line.strip_prefix('-') {
        return parse_direction(rest).map(Command::Release);
    }
    parse_direction(&line).map(Command::Tap)
}

fn parse_direction(word: &str) -> Option<Direction> {
    match word {
        "w" => Some(Direction::Up),
        "s" => Some(Direction::Down),
        "a" => Some(Direction::Left),
        "d" => Some(Direction::Right),
        other => other.parse().ok(),
    }
}
