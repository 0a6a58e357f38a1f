//! Hub-facing messages: outbound notifications and group membership ops.
//!
//! A [`Notification`] is addressed to exactly one [`GroupKey`]; the hub
//! delivers it to every connection in that group as a [`HubMessage`] with a
//! message name and an ordered argument list. [`GroupOp`]s change which
//! groups a connection belongs to.

use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use ts_rs::TS;

use crate::grid::GroupKey;
use crate::ids::{ConnectionId, EntityId, GeofenceId};

/// Message name for [`Notification::LocationUpdated`].
pub const LOCATION_UPDATED: &str = "locationUpdated";
/// Message name for [`Notification::GeofenceEntered`].
pub const GEOFENCE_ENTERED: &str = "geofenceEntered";
/// Message name for [`Notification::GeofenceExited`].
pub const GEOFENCE_EXITED: &str = "geofenceExited";

/// A real-time notification produced while ingesting one location event.
#[derive(Debug, Clone, PartialEq)]
pub enum Notification {
    /// An entity reported a new position.
    LocationUpdated {
        /// The entity that moved.
        entity_id: EntityId,
        /// Latitude in degrees.
        lat: f64,
        /// Longitude in degrees.
        lng: f64,
        /// Event timestamp as Unix milliseconds.
        ts_millis: i64,
        /// The group covering the reported position.
        group: GroupKey,
    },
    /// An entity entered a geofence.
    GeofenceEntered {
        /// The entity that entered.
        entity_id: EntityId,
        /// The geofence entered.
        geofence_id: GeofenceId,
        /// The group covering the reported position.
        group: GroupKey,
    },
    /// An entity left a geofence.
    GeofenceExited {
        /// The entity that left.
        entity_id: EntityId,
        /// The geofence left.
        geofence_id: GeofenceId,
        /// The group covering the reported position.
        group: GroupKey,
    },
}

impl Notification {
    /// The message name subscribers dispatch on.
    pub const fn name(&self) -> &'static str {
        match self {
            Self::LocationUpdated { .. } => LOCATION_UPDATED,
            Self::GeofenceEntered { .. } => GEOFENCE_ENTERED,
            Self::GeofenceExited { .. } => GEOFENCE_EXITED,
        }
    }

    /// The target group.
    pub const fn group(&self) -> &GroupKey {
        match self {
            Self::LocationUpdated { group, .. }
            | Self::GeofenceEntered { group, .. }
            | Self::GeofenceExited { group, .. } => group,
        }
    }

    /// The ordered argument list.
    ///
    /// - `locationUpdated`: entity id, latitude, longitude, timestamp millis
    /// - `geofenceEntered` / `geofenceExited`: entity id, geofence id
    pub fn arguments(&self) -> Vec<Value> {
        match self {
            Self::LocationUpdated {
                entity_id,
                lat,
                lng,
                ts_millis,
                ..
            } => vec![
                json!(entity_id.to_string()),
                json!(lat),
                json!(lng),
                json!(ts_millis),
            ],
            Self::GeofenceEntered {
                entity_id,
                geofence_id,
                ..
            }
            | Self::GeofenceExited {
                entity_id,
                geofence_id,
                ..
            } => vec![
                json!(entity_id.to_string()),
                json!(geofence_id.to_string()),
            ],
        }
    }

    /// The wire message delivered to each subscriber in the group.
    pub fn to_message(&self) -> HubMessage {
        HubMessage {
            target: self.name().to_owned(),
            arguments: self.arguments(),
        }
    }
}

/// A named message with positional arguments, as sent to subscribers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[ts(export, export_to = "bindings/")]
pub struct HubMessage {
    /// Message name (`locationUpdated`, `geofenceEntered`, `geofenceExited`).
    pub target: String,
    /// Ordered arguments.
    pub arguments: Vec<Value>,
}

/// A change to a connection's group membership on the hub.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GroupOp {
    /// Add the connection to a group.
    AddToGroup {
        /// The subscriber connection.
        connection_id: ConnectionId,
        /// The group to join.
        group: GroupKey,
    },
    /// Remove the connection from a group.
    RemoveFromGroup {
        /// The subscriber connection.
        connection_id: ConnectionId,
        /// The group to leave.
        group: GroupKey,
    },
    /// Remove the connection from every group it belongs to.
    RemoveFromAllGroups {
        /// The subscriber connection.
        connection_id: ConnectionId,
    },
}

impl GroupOp {
    /// The connection this op applies to.
    pub const fn connection_id(&self) -> ConnectionId {
        match self {
            Self::AddToGroup { connection_id, .. }
            | Self::RemoveFromGroup { connection_id, .. }
            | Self::RemoveFromAllGroups { connection_id } => *connection_id,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::grid::{GridCell, group_key};
    use uuid::Uuid;

    #[test]
    fn location_updated_arguments_are_ordered() {
        let entity_id = EntityId::from(Uuid::nil());
        let notification = Notification::LocationUpdated {
            entity_id,
            lat: 60.5,
            lng: 24.5,
            ts_millis: 1_700_000_000_000,
            group: group_key(GridCell::new(24, 60)),
        };
        let message = notification.to_message();
        assert_eq!(message.target, "locationUpdated");
        assert_eq!(
            message.arguments,
            vec![
                json!("00000000-0000-0000-0000-000000000000"),
                json!(60.5),
                json!(24.5),
                json!(1_700_000_000_000_i64),
            ]
        );
        assert_eq!(notification.group().as_str(), "grid:24:60");
    }

    #[test]
    fn geofence_notifications_carry_both_ids() {
        let entity_id = EntityId::new();
        let geofence_id = GeofenceId::new();
        let group = group_key(GridCell::new(0, 0));
        let entered = Notification::GeofenceEntered {
            entity_id,
            geofence_id,
            group: group.clone(),
        };
        let exited = Notification::GeofenceExited {
            entity_id,
            geofence_id,
            group,
        };
        assert_eq!(entered.name(), GEOFENCE_ENTERED);
        assert_eq!(exited.name(), GEOFENCE_EXITED);
        assert_eq!(entered.arguments(), exited.arguments());
        assert_eq!(
            entered.arguments().get(1),
            Some(&json!(geofence_id.to_string()))
        );
    }

    #[test]
    fn hub_message_wire_shape() {
        let message = HubMessage {
            target: GEOFENCE_EXITED.to_owned(),
            arguments: vec![json!("a"), json!("b")],
        };
        let json = serde_json::to_value(&message).ok();
        assert_eq!(
            json,
            Some(json!({"target": "geofenceExited", "arguments": ["a", "b"]}))
        );
    }

    #[test]
    fn group_op_exposes_connection() {
        let connection_id = ConnectionId::new();
        let op = GroupOp::RemoveFromAllGroups { connection_id };
        assert_eq!(op.connection_id(), connection_id);
    }
}
