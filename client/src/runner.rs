//! Client run modes: viewer, controller and dashboard loops

use crate::connection::{ClientResult, SyncClient};
use crate::input::{parse_command, Command, InputManager};
use crate::view::{ViewChange, WorldView};
use log::{debug, info, warn};
use shared::DeclaredRole;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::time::{interval, MissedTickBehavior};

/// Watches the world without controlling anything.
pub async fn run_viewer(url: &str) -> ClientResult<WorldView> {
    let mut client = SyncClient::connect(url).await?;
    client.set_role(DeclaredRole::Viewer).await?;
    info!("Watching as viewer");

    let mut view = WorldView::new();
    while let Some(event) = client.next_event().await? {
        let change = view.apply(event);
        log_change(&view, &change);
    }

    info!("Server closed the connection");
    Ok(view)
}

/// Joins as a player and turns stdin commands into moves.
///
/// Taps send one move right away. Held directions are resent every
/// `input_rate` until released.
pub async fn run_controller(url: &str, input_rate: Duration) -> ClientResult<WorldView> {
    let client = SyncClient::connect(url).await?;
    let (mut sender, mut receiver) = client.into_split();
    sender.set_role(DeclaredRole::Player).await?;
    info!("Joined as player. Commands: up/down/left/right (or w/a/s/d), +dir to hold, -dir to release, stop, quit");

    let mut view = WorldView::new();
    let mut input = InputManager::new();
    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    let mut input_tick = interval(input_rate);
    input_tick.set_missed_tick_behavior(MissedTickBehavior::Skip);

    loop {
        tokio::select! {
            line = lines.next_line() => {
                let Some(line) = line? else {
                    info!("Input closed");
                    break;
                };
                match parse_command(&line) {
                    Some(Command::Tap(direction)) => sender.send_move(direction).await?,
                    Some(Command::Hold(direction)) => input.press(direction),
                    Some(Command::Release(direction)) => input.release(direction),
                    Some(Command::Stop) => input.clear(),
                    Some(Command::Quit) => break,
                    None if line.trim().is_empty() => {}
                    None => warn!("Unknown command: {}", line.trim()),
                }
            },

            _ = input_tick.tick(), if !input.is_idle() => {
                for direction in input.active_directions() {
                    sender.send_move(direction).await?;
                }
            },

            event = receiver.next_event() => match event? {
                Some(event) => {
                    let change = view.apply(event);
                    log_change(&view, &change);
                }
                None => {
                    info!("Server closed the connection");
                    return Ok(view);
                }
            },
        }
    }

    sender.close().await?;
    Ok(view)
}

/// Viewer that prints a summary of the world every `every`.
pub async fn run_dashboard(url: &str, every: Duration) -> ClientResult<WorldView> {
    let mut client = SyncClient::connect(url).await?;
    client.set_role(DeclaredRole::Viewer).await?;

    let mut view = WorldView::new();
    let mut report = interval(every);
    report.set_missed_tick_behavior(MissedTickBehavior::Skip);

    loop {
        tokio::select! {
            event = client.next_event() => match event? {
                Some(event) => {
                    view.apply(event);
                }
                None => {
                    info!("Server closed the connection");
                    return Ok(view);
                }
            },

            _ = report.tick() => {
                let stats = view.stats();
                match stats.extent {
                    Some((min_x, min_y, max_x, max_y)) => info!(
                        "{} players, {} snapshots, extent ({:.1}, {:.1})..({:.1}, {:.1})",
                        stats.players, stats.snapshots, min_x, min_y, max_x, max_y
                    ),
                    None => info!("{} players, {} snapshots", stats.players, stats.snapshots),
                }
            },
        }
    }
}

fn log_change(view: &WorldView, change: &ViewChange) {
    for id in &change.joined {
        if let Some(player) = view.player(*id) {
            info!(
                "{} joined at ({:.1}, {:.1}) as {}",
                player.name, player.x, player.y, player.color
            );
        }
    }
    for id in &change.left {
        info!("Player {} left", id);
    }
    for id in &change.moved {
        if let Some(player) = view.player(*id) {
            debug!("{} moved to ({:.1}, {:.1})", player.name, player.x, player.y);
        }
    }
}
