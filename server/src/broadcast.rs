//! Fan-out of server events to connections.
//!
//! Each connection owns a bounded FIFO of encoded text frames that its
//! writer task drains onto the socket. Enqueueing never blocks, so the
//! session can fan out while it holds the world state without waiting on
//! network I/O. Only the session enqueues, which keeps every connection's
//! frames in production order.
//!
//! A connection whose FIFO is full is not reading fast enough. Its outbox
//! is dropped on the spot and its id is reported through
//! [`Broadcaster::take_overflowed`] so the session can tear it down.

use log::{debug, error, warn};
use shared::{ConnectionId, PlayerEntity, ServerEvent, WorldSnapshot};
use std::collections::HashMap;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;

pub type Outbox = mpsc::Sender<String>;

#[derive(Debug, Default)]
pub struct Broadcaster {
    outboxes: HashMap<ConnectionId, Outbox>,
    overflowed: Vec<ConnectionId>,
}

/// Outcome of queueing one frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Delivery {
    Queued,
    Closed,
    Full,
}

impl Broadcaster {
    pub fn new() -> Self {
        Self {
            outboxes: HashMap::new(),
            overflowed: Vec::new(),
        }
    }

    pub fn attach(&mut self, id: ConnectionId, outbox: Outbox) {
        self.outboxes.insert(id, outbox);
    }

    /// Drops the connection's outbox, which ends its writer task.
    pub fn detach(&mut self, id: ConnectionId) -> bool {
        self.outboxes.remove(&id).is_some()
    }

    pub fn is_attached(&self, id: ConnectionId) -> bool {
        self.outboxes.contains_key(&id)
    }

    pub fn len(&self) -> usize {
        self.outboxes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.outboxes.is_empty()
    }

    /// Connections dropped for a full outbox since the last call.
    pub fn take_overflowed(&mut self) -> Vec<ConnectionId> {
        std::mem::take(&mut self.overflowed)
    }

    /// `playerData` to the new player only, then the updated set to everyone.
    pub fn on_player_join(
        &mut self,
        id: ConnectionId,
        player: &PlayerEntity,
        snapshot: &WorldSnapshot,
    ) {
        self.send_to(id, &ServerEvent::PlayerData(player.clone()));
        self.broadcast_snapshot(snapshot);
    }

    /// Viewers get the current set straight away instead of waiting for the
    /// next change.
    pub fn on_viewer_join(&mut self, id: ConnectionId, snapshot: &WorldSnapshot) {
        self.send_to(id, &ServerEvent::Players(snapshot.clone()));
    }

    pub fn on_movement(&mut self, snapshot: &WorldSnapshot) {
        self.broadcast_snapshot(snapshot);
    }

    pub fn on_leave(&mut self, snapshot: &WorldSnapshot) {
        self.broadcast_snapshot(snapshot);
    }

    pub fn broadcast_snapshot(&mut self, snapshot: &WorldSnapshot) {
        self.broadcast(&ServerEvent::Players(snapshot.clone()));
    }

    /// Sends one event to a single connection. Returns false if the
    /// connection is unknown or its writer is already gone.
    pub fn send_to(&mut self, id: ConnectionId, event: &ServerEvent) -> bool {
        let Some(outbox) = self.outboxes.get(&id) else {
            return false;
        };

        let frame = match event.encode() {
            Ok(frame) => frame,
            Err(e) => {
                error!("Failed to encode event for connection {}: {}", id, e);
                return false;
            }
        };

        match Self::enqueue(id, outbox, frame) {
            Delivery::Queued => true,
            Delivery::Closed => false,
            Delivery::Full => {
                self.overflow(id);
                false
            }
        }
    }

    /// Encodes once, then enqueues the same frame for every connection.
    /// Returns the number of connections the frame was queued for.
    pub fn broadcast(&mut self, event: &ServerEvent) -> usize {
        if self.outboxes.is_empty() {
            return 0;
        }

        let frame = match event.encode() {
            Ok(frame) => frame,
            Err(e) => {
                error!("Failed to encode broadcast: {}", e);
                return 0;
            }
        };

        let mut delivered = 0;
        let mut full = Vec::new();
        for (id, outbox) in &self.outboxes {
            match Self::enqueue(*id, outbox, frame.clone()) {
                Delivery::Queued => delivered += 1,
                Delivery::Closed => {}
                Delivery::Full => full.push(*id),
            }
        }

        for id in full {
            self.overflow(id);
        }
        delivered
    }

    fn enqueue(id: ConnectionId, outbox: &Outbox, frame: String) -> Delivery {
        match outbox.try_send(frame) {
            Ok(()) => Delivery::Queued,
            // The reader side reports the disconnect; teardown happens there.
            Err(TrySendError::Closed(_)) => {
                debug!("Writer for connection {} already closed", id);
                Delivery::Closed
            }
            Err(TrySendError::Full(_)) => Delivery::Full,
        }
    }

    fn overflow(&mut self, id: ConnectionId) {
        warn!("Outbox of connection {} is full, dropping it", id);
        self.outboxes.remove(&id);
        self.overflowed.push(id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn player(id: ConnectionId) -> PlayerEntity {
        PlayerEntity::new(id, (0.0, 0.0), "#ff0000".into(), format!("P{}", id))
    }

    fn snapshot_of(players: &[PlayerEntity]) -> WorldSnapshot {
        players.iter().map(|p| (p.id, p.clone())).collect()
    }

    fn outbox() -> (Outbox, mpsc::Receiver<String>) {
        mpsc::channel(16)
    }

    fn drain(rx: &mut mpsc::Receiver<String>) -> Vec<ServerEvent> {
        let mut events = Vec::new();
        while let Ok(frame) = rx.try_recv() {
            events.push(ServerEvent::decode(&frame).unwrap());
        }
        events
    }

    #[test]
    fn test_player_join_sends_player_data_then_players() {
        let mut broadcaster = Broadcaster::new();
        let (tx1, mut rx1) = outbox();
        let (tx2, mut rx2) = outbox();
        broadcaster.attach(1, tx1);
        broadcaster.attach(2, tx2);

        let joined = player(1);
        let snapshot = snapshot_of(&[joined.clone()]);
        broadcaster.on_player_join(1, &joined, &snapshot);

        assert_eq!(
            drain(&mut rx1),
            vec![
                ServerEvent::PlayerData(joined.clone()),
                ServerEvent::Players(snapshot.clone())
            ]
        );
        assert_eq!(drain(&mut rx2), vec![ServerEvent::Players(snapshot)]);
    }

    #[test]
    fn test_viewer_join_only_reaches_viewer() {
        let mut broadcaster = Broadcaster::new();
        let (tx1, mut rx1) = outbox();
        let (tx2, mut rx2) = outbox();
        broadcaster.attach(1, tx1);
        broadcaster.attach(2, tx2);

        let snapshot = snapshot_of(&[player(1)]);
        broadcaster.on_viewer_join(2, &snapshot);

        assert!(drain(&mut rx1).is_empty());
        assert_eq!(drain(&mut rx2), vec![ServerEvent::Players(snapshot)]);
    }

    #[test]
    fn test_broadcast_preserves_order_per_connection() {
        let mut broadcaster = Broadcaster::new();
        let (tx, mut rx) = outbox();
        broadcaster.attach(1, tx);

        let mut moved = player(1);
        let first = snapshot_of(&[moved.clone()]);
        moved.x = 4.0;
        let second = snapshot_of(&[moved]);

        broadcaster.on_movement(&first);
        broadcaster.on_movement(&second);
        broadcaster.on_leave(&WorldSnapshot::new());

        assert_eq!(
            drain(&mut rx),
            vec![
                ServerEvent::Players(first),
                ServerEvent::Players(second),
                ServerEvent::Players(WorldSnapshot::new())
            ]
        );
    }

    #[test]
    fn test_closed_writer_is_skipped() {
        let mut broadcaster = Broadcaster::new();
        let (tx1, rx1) = outbox();
        let (tx2, mut rx2) = outbox();
        broadcaster.attach(1, tx1);
        broadcaster.attach(2, tx2);
        drop(rx1);

        let delivered = broadcaster.broadcast(&ServerEvent::Players(WorldSnapshot::new()));

        assert_eq!(delivered, 1);
        assert_eq!(drain(&mut rx2).len(), 1);
        assert!(!broadcaster.send_to(1, &ServerEvent::Players(WorldSnapshot::new())));
    }

    #[test]
    fn test_detach_closes_outbox() {
        let mut broadcaster = Broadcaster::new();
        let (tx, mut rx) = outbox();
        broadcaster.attach(1, tx);

        assert!(broadcaster.detach(1));
        assert!(!broadcaster.detach(1));
        assert!(broadcaster.is_empty());
        assert!(rx.try_recv().is_err());
        assert!(!broadcaster.send_to(1, &ServerEvent::Players(WorldSnapshot::new())));
    }

    #[test]
    fn test_full_outbox_is_dropped_and_reported() {
        let mut broadcaster = Broadcaster::new();
        let (slow_tx, mut slow_rx) = mpsc::channel(2);
        let (fast_tx, mut fast_rx) = outbox();
        broadcaster.attach(1, slow_tx);
        broadcaster.attach(2, fast_tx);

        let event = ServerEvent::Players(WorldSnapshot::new());
        assert_eq!(broadcaster.broadcast(&event), 2);
        assert_eq!(broadcaster.broadcast(&event), 2);
        assert!(broadcaster.take_overflowed().is_empty());

        assert_eq!(broadcaster.broadcast(&event), 1);

        assert_eq!(broadcaster.take_overflowed(), vec![1]);
        assert!(broadcaster.take_overflowed().is_empty());
        assert!(!broadcaster.is_attached(1));
        assert!(broadcaster.is_attached(2));
        assert_eq!(drain(&mut fast_rx).len(), 3);

        // Frames queued before the overflow are still delivered, then the
        // writer sees the channel close.
        assert_eq!(drain(&mut slow_rx).len(), 2);
        assert!(matches!(
            slow_rx.try_recv(),
            Err(mpsc::error::TryRecvError::Disconnected)
        ));
    }

    #[test]
    fn test_send_to_full_outbox_overflows() {
        let mut broadcaster = Broadcaster::new();
        let (tx, _rx) = mpsc::channel(1);
        broadcaster.attach(7, tx);

        let event = ServerEvent::Players(WorldSnapshot::new());
        assert!(broadcaster.send_to(7, &event));
        assert!(!broadcaster.send_to(7, &event));

        assert_eq!(broadcaster.take_overflowed(), vec![7]);
        assert!(broadcaster.is_empty());
    }
}
