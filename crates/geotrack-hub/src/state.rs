//! Shared hub state: connections, groups, and per-connection interest.
//!
//! [`HubState`] is the in-process pub/sub hub. Each `WebSocket` connection
//! registers and gets an outbox; groups map a [`GroupKey`] to the
//! connections subscribed to it. The hub also remembers each connection's
//! last applied set of cells (its baseline), so clients only send the
//! cells they want now.

use std::collections::{BTreeSet, HashMap, HashSet};
use std::sync::Arc;

use geotrack_core::subscription::{next_baseline, sync_groups};
use geotrack_core::{HubError, PubSubHub};
use geotrack_types::{ConnectionId, GridCell, GroupKey, GroupOp, Notification};
use tokio::sync::{RwLock, mpsc};
use tracing::{debug, warn};

/// Capacity of each connection's outbox.
///
/// A client that falls further behind than this loses messages rather
/// than slowing down ingestion.
pub const OUTBOX_CAPACITY: usize = 256;

/// Serialized message queued for one connection.
pub type Outbound = Arc<str>;

/// One registered subscriber.
#[derive(Debug)]
struct Connection {
    outbox: mpsc::Sender<Outbound>,
    groups: HashSet<GroupKey>,
    baseline: BTreeSet<GridCell>,
}

#[derive(Debug, Default)]
struct Registry {
    connections: HashMap<ConnectionId, Connection>,
    groups: HashMap<GroupKey, HashSet<ConnectionId>>,
}

impl Registry {
    fn apply(&mut self, op: &GroupOp) -> Result<(), HubError> {
        let connection_id = op.connection_id();
        let connection = self
            .connections
            .get_mut(&connection_id)
            .ok_or(HubError::UnknownConnection { connection_id })?;
        match op {
            GroupOp::AddToGroup { group, .. } => {
                connection.groups.insert(group.clone());
                self.groups
                    .entry(group.clone())
                    .or_default()
                    .insert(connection_id);
            }
            GroupOp::RemoveFromGroup { group, .. } => {
                connection.groups.remove(group);
                leave(&mut self.groups, group, connection_id);
            }
            GroupOp::RemoveFromAllGroups { .. } => {
                for group in connection.groups.drain() {
                    leave(&mut self.groups, &group, connection_id);
                }
            }
        }
        Ok(())
    }
}

/// Remove `connection_id` from `group`, dropping the group once empty.
fn leave(
    groups: &mut HashMap<GroupKey, HashSet<ConnectionId>>,
    group: &GroupKey,
    connection_id: ConnectionId,
) {
    if let Some(members) = groups.get_mut(group) {
        members.remove(&connection_id);
        if members.is_empty() {
            groups.remove(group);
        }
    }
}

/// Counts reported by the health endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
pub struct HubStats {
    /// Open connections.
    pub connections: usize,
    /// Groups with at least one member.
    pub groups: usize,
}

/// The in-process pub/sub hub.
///
/// Wrapped in [`Arc`] and shared between the `axum` handlers and the
/// ingestion loop.
#[derive(Debug, Default)]
pub struct HubState {
    registry: RwLock<Registry>,
}

impl HubState {
    /// An empty hub.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a new connection and return its id and outbox receiver.
    pub async fn register(&self) -> (ConnectionId, mpsc::Receiver<Outbound>) {
        let (outbox, rx) = mpsc::channel(OUTBOX_CAPACITY);
        let connection_id = ConnectionId::new();
        self.registry.write().await.connections.insert(
            connection_id,
            Connection {
                outbox,
                groups: HashSet::new(),
                baseline: BTreeSet::new(),
            },
        );
        debug!(%connection_id, "connection registered");
        (connection_id, rx)
    }

    /// Forget a connection and remove it from every group.
    pub async fn unregister(&self, connection_id: ConnectionId) {
        let mut registry = self.registry.write().await;
        let _ = registry.apply(&GroupOp::RemoveFromAllGroups { connection_id });
        registry.connections.remove(&connection_id);
        debug!(%connection_id, "connection unregistered");
    }

    /// Move a connection's interest to `new_cells`.
    ///
    /// Computes the group ops against the remembered baseline, applies them,
    /// and only then replaces the baseline. Returns the applied ops.
    pub async fn update_interest(
        &self,
        connection_id: ConnectionId,
        new_cells: BTreeSet<GridCell>,
    ) -> Result<Vec<GroupOp>, HubError> {
        let previous = self
            .baseline(connection_id)
            .await
            .ok_or(HubError::UnknownConnection { connection_id })?;
        let ops = sync_groups(connection_id, &new_cells, &previous);
        if !ops.is_empty() {
            self.apply_group_ops(&ops).await?;
        }

        let mut registry = self.registry.write().await;
        let connection = registry
            .connections
            .get_mut(&connection_id)
            .ok_or(HubError::UnknownConnection { connection_id })?;
        connection.baseline = next_baseline(new_cells);
        Ok(ops)
    }

    /// The cells a connection is currently subscribed to.
    pub async fn baseline(&self, connection_id: ConnectionId) -> Option<BTreeSet<GridCell>> {
        self.registry
            .read()
            .await
            .connections
            .get(&connection_id)
            .map(|c| c.baseline.clone())
    }

    /// Members of `group`.
    pub async fn members(&self, group: &GroupKey) -> BTreeSet<ConnectionId> {
        self.registry
            .read()
            .await
            .groups
            .get(group)
            .map(|m| m.iter().copied().collect())
            .unwrap_or_default()
    }

    /// Connection and group counts.
    pub async fn stats(&self) -> HubStats {
        let registry = self.registry.read().await;
        HubStats {
            connections: registry.connections.len(),
            groups: registry.groups.len(),
        }
    }
}

impl PubSubHub for HubState {
    async fn apply_group_ops(&self, ops: &[GroupOp]) -> Result<(), HubError> {
        let mut registry = self.registry.write().await;
        for op in ops {
            registry.apply(op)?;
        }
        Ok(())
    }

    async fn publish(&self, notifications: &[Notification]) -> Result<(), HubError> {
        let registry = self.registry.read().await;
        for notification in notifications {
            let Some(members) = registry.groups.get(notification.group()) else {
                continue;
            };
            let json: Outbound = match serde_json::to_string(&notification.to_message()) {
                Ok(json) => json.into(),
                Err(e) => {
                    warn!(error = %e, "failed to serialize notification");
                    continue;
                }
            };
            for connection_id in members {
                let Some(connection) = registry.connections.get(connection_id) else {
                    continue;
                };
                if connection.outbox.try_send(Arc::clone(&json)).is_err() {
                    warn!(%connection_id, "outbox full or closed, dropping message");
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use geotrack_types::{EntityId, group_key};

    use super::*;

    fn cells(pairs: &[(i32, i32)]) -> BTreeSet<GridCell> {
        pairs.iter().map(|&(lng, lat)| GridCell::new(lng, lat)).collect()
    }

    fn location(lng: i32, lat: i32) -> Notification {
        Notification::LocationUpdated {
            entity_id: EntityId::new(),
            lat: f64::from(lat) + 0.5,
            lng: f64::from(lng) + 0.5,
            ts_millis: 0,
            group: group_key(GridCell::new(lng, lat)),
        }
    }

    #[tokio::test]
    async fn interest_updates_diff_against_baseline() {
        let hub = HubState::new();
        let (id, _rx) = hub.register().await;

        let ops = hub.update_interest(id, cells(&[(1, 1), (2, 2)])).await;
        assert_eq!(ops.as_ref().map(Vec::len).ok(), Some(2));

        let ops = hub.update_interest(id, cells(&[(2, 2), (3, 3)])).await;
        assert_eq!(ops.as_ref().map(Vec::len).ok(), Some(2));
        assert_eq!(hub.baseline(id).await, Some(cells(&[(2, 2), (3, 3)])));
        assert!(hub.members(&group_key(GridCell::new(1, 1))).await.is_empty());
        assert!(hub.members(&group_key(GridCell::new(3, 3))).await.contains(&id));
    }

    #[tokio::test]
    async fn overflow_clears_groups_and_baseline() {
        let hub = HubState::new();
        let (id, _rx) = hub.register().await;
        assert!(hub.update_interest(id, cells(&[(1, 1)])).await.is_ok());

        let many: BTreeSet<GridCell> = (0..60).map(|n| GridCell::new(n, 0)).collect();
        let ops = hub.update_interest(id, many).await.unwrap_or_default();
        assert_eq!(ops, vec![GroupOp::RemoveFromAllGroups { connection_id: id }]);
        assert_eq!(hub.baseline(id).await, Some(BTreeSet::new()));
        assert_eq!(hub.stats().await.groups, 0);
    }

    #[tokio::test]
    async fn publish_reaches_only_group_members() {
        let hub = HubState::new();
        let (inside, mut inside_rx) = hub.register().await;
        let (outside, mut outside_rx) = hub.register().await;
        assert!(hub.update_interest(inside, cells(&[(24, 60)])).await.is_ok());
        assert!(hub.update_interest(outside, cells(&[(25, 60)])).await.is_ok());

        assert!(hub.publish(&[location(24, 60)]).await.is_ok());

        let delivered = inside_rx.try_recv().ok();
        assert!(delivered.is_some_and(|m| m.contains("\"target\":\"locationUpdated\"")));
        assert!(outside_rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn unknown_connection_is_an_error() {
        let hub = HubState::new();
        let ghost = ConnectionId::new();
        let result = hub.update_interest(ghost, cells(&[(0, 0)])).await;
        assert!(matches!(result, Err(HubError::UnknownConnection { .. })));
    }

    #[tokio::test]
    async fn unregister_leaves_every_group() {
        let hub = HubState::new();
        let (id, _rx) = hub.register().await;
        assert!(hub.update_interest(id, cells(&[(1, 1), (2, 2)])).await.is_ok());
        assert_eq!(hub.stats().await, HubStats { connections: 1, groups: 2 });

        hub.unregister(id).await;
        assert_eq!(hub.stats().await, HubStats { connections: 0, groups: 0 });
    }
}
