use shared::{ConnectionId, PlayerEntity, ServerEvent, WorldSnapshot};

/// Which players appeared, disappeared or moved with the latest snapshot.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ViewChange {
    pub joined: Vec<ConnectionId>,
    pub left: Vec<ConnectionId>,
    pub moved: Vec<ConnectionId>,
}

impl ViewChange {
    pub fn is_empty(&self) -> bool {
        self.joined.is_empty() && self.left.is_empty() && self.moved.is_empty()
    }
}

/// Summary a dashboard prints.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ViewStats {
    pub players: usize,
    pub snapshots: u64,
    /// Bounding box of all players as (min_x, min_y, max_x, max_y).
    pub extent: Option<(f32, f32, f32, f32)>,
}

/// Client-side mirror of the server's player set.
///
/// Every `players` event replaces the whole set: players missing from it
/// are dropped, new ones are added, existing ones take their new position.
#[derive(Debug, Clone, Default)]
pub struct WorldView {
    players: WorldSnapshot,
    own: Option<PlayerEntity>,
    snapshots: u64,
}

impl WorldView {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn apply(&mut self, event: ServerEvent) -> ViewChange {
        match event {
            ServerEvent::PlayerData(player) => {
                self.own = Some(player);
                ViewChange::default()
            }
            ServerEvent::Players(players) => self.replace(players),
        }
    }

    fn replace(&mut self, players: WorldSnapshot) -> ViewChange {
        let mut change = ViewChange::default();

        for id in self.players.keys() {
            if !players.contains_key(id) {
                change.left.push(*id);
            }
        }

        for (id, player) in &players {
            match self.players.get(id) {
                None => change.joined.push(*id),
                Some(previous) if previous.position() != player.position() => {
                    change.moved.push(*id)
                }
                Some(_) => {}
            }
        }

        if let Some(own) = &mut self.own {
            if let Some(current) = players.get(&own.id) {
                *own = current.clone();
            }
        }

        self.players = players;
        self.snapshots += 1;
        change
    }

    pub fn players(&self) -> &WorldSnapshot {
        &self.players
    }

    pub fn player(&self, id: ConnectionId) -> Option<&PlayerEntity> {
        self.players.get(&id)
    }

    /// This client's own entity, once `playerData` has arrived.
    pub fn own(&self) -> Option<&PlayerEntity> {
        self.own.as_ref()
    }

    pub fn stats(&self) -> ViewStats {
        let extent = self.players.values().fold(None, |extent, p| {
            Some(match extent {
                None => (p.x, p.y, p.x, p.y),
                Some((min_x, min_y, max_x, max_y)) => (
                    f32::min(min_x, p.x),
                    f32::min(min_y, p.y),
                    f32::max(max_x, p.x),
                    f32::max(max_y, p.y),
                ),
            })
        });

        ViewStats {
            players: self.players.len(),
            snapshots: self.snapshots,
            extent,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn player(id: ConnectionId, x: f32, y: f32) -> PlayerEntity {
        PlayerEntity::new(id, (x, y), "#ff0000".into(), format!("Player {}", id))
    }

    fn snapshot(players: &[PlayerEntity]) -> ServerEvent {
        ServerEvent::Players(players.iter().map(|p| (p.id, p.clone())).collect())
    }

    #[test]
    fn test_first_snapshot_joins_everyone() {
        let mut view = WorldView::new();

        let change = view.apply(snapshot(&[player(1, 0.0, 0.0), player(2, 5.0, 5.0)]));

        assert_eq!(change.joined, vec![1, 2]);
        assert!(change.left.is_empty());
        assert!(change.moved.is_empty());
        assert_eq!(view.players().len(), 2);
    }

    #[test]
    fn test_snapshot_diff() {
        let mut view = WorldView::new();
        view.apply(snapshot(&[player(1, 0.0, 0.0), player(2, 5.0, 5.0)]));

        let change = view.apply(snapshot(&[player(2, 5.0, 1.0), player(3, 0.0, 0.0)]));

        assert_eq!(
            change,
            ViewChange {
                joined: vec![3],
                left: vec![1],
                moved: vec![2],
            }
        );
        assert!(view.player(1).is_none());
        assert_eq!(view.player(2).unwrap().position(), (5.0, 1.0));
    }

    #[test]
    fn test_unchanged_snapshot_is_empty_change() {
        let mut view = WorldView::new();
        view.apply(snapshot(&[player(1, 0.0, 0.0)]));

        assert!(view.apply(snapshot(&[player(1, 0.0, 0.0)])).is_empty());
    }

    #[test]
    fn test_player_data_tracks_own_entity() {
        let mut view = WorldView::new();

        assert!(view.apply(ServerEvent::PlayerData(player(4, 0.0, 0.0))).is_empty());
        assert_eq!(view.own().unwrap().id, 4);

        view.apply(snapshot(&[player(4, 0.0, -4.0)]));
        assert_eq!(view.own().unwrap().position(), (0.0, -4.0));
    }

    #[test]
    fn test_stats() {
        let mut view = WorldView::new();
        assert_eq!(view.stats().extent, None);

        view.apply(snapshot(&[player(1, -4.0, 10.0), player(2, 8.0, -2.0)]));
        let stats = view.stats();

        assert_eq!(stats.players, 2);
        assert_eq!(stats.snapshots, 1);
        assert_eq!(stats.extent, Some((-4.0, -2.0, 8.0, 10.0)));
    }
}
