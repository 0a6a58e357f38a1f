//! Core records: location pings, geofences, and membership intervals.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use ts_rs::TS;

use crate::grid::{GridCell, cell_of};
use crate::ids::{EntityId, GeofenceId};

// ---------------------------------------------------------------------------
// Position
// ---------------------------------------------------------------------------

/// A WGS84 coordinate pair, serialized in `GeoJSON` order as `[lng, lat]`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(from = "[f64; 2]", into = "[f64; 2]")]
pub struct Position {
    /// Longitude in degrees.
    pub lng: f64,
    /// Latitude in degrees.
    pub lat: f64,
}

impl Position {
    /// Create a position from longitude and latitude.
    pub const fn new(lng: f64, lat: f64) -> Self {
        Self { lng, lat }
    }
}

impl From<[f64; 2]> for Position {
    fn from([lng, lat]: [f64; 2]) -> Self {
        Self { lng, lat }
    }
}

impl From<Position> for [f64; 2] {
    fn from(p: Position) -> Self {
        [p.lng, p.lat]
    }
}

// ---------------------------------------------------------------------------
// LocationEvent
// ---------------------------------------------------------------------------

/// A single location ping from a tracked entity.
///
/// One per wire message. Devices publish `PascalCase` field names
/// (`Id`, `Lng`, `Lat`, `Ts`); lower-case names are accepted as aliases.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[ts(export, export_to = "bindings/")]
pub struct LocationEvent {
    /// The entity that reported this position.
    #[serde(rename = "Id")]
    #[serde(alias = "id")]
    pub entity_id: EntityId,
    /// Longitude in WGS84 degrees.
    #[serde(rename = "Lng")]
    #[serde(alias = "lng")]
    pub lng: f64,
    /// Latitude in WGS84 degrees.
    #[serde(rename = "Lat")]
    #[serde(alias = "lat")]
    pub lat: f64,
    /// When the device took the reading.
    #[serde(rename = "Ts")]
    #[serde(alias = "ts")]
    pub ts: DateTime<Utc>,
}

impl LocationEvent {
    /// Whether both coordinates are finite and inside the WGS84 ranges.
    pub fn has_valid_coordinates(&self) -> bool {
        self.lng.is_finite()
            && self.lat.is_finite()
            && (-180.0..=180.0).contains(&self.lng)
            && (-90.0..=90.0).contains(&self.lat)
    }

    /// The grid cell this ping falls in.
    pub fn cell(&self) -> GridCell {
        cell_of(self.lng, self.lat)
    }

    /// The event timestamp as Unix milliseconds.
    pub fn ts_millis(&self) -> i64 {
        self.ts.timestamp_millis()
    }
}

// ---------------------------------------------------------------------------
// Geofence
// ---------------------------------------------------------------------------

/// A named polygonal region.
///
/// Geofences are provisioned elsewhere and are read-only here. The
/// `grid_cell` is the storage partition: the cell of the polygon's
/// representative point (its envelope centre).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Geofence {
    /// Geofence identifier.
    pub id: GeofenceId,
    /// Display name.
    pub name: String,
    /// Closed outer ring, first and last position equal.
    pub border: Vec<Position>,
    /// Owning grid cell used as the storage partition key.
    pub grid_cell: GridCell,
}

impl Geofence {
    /// Build a geofence, deriving its owning cell from the border.
    ///
    /// An empty border has no representative point and is filed under the
    /// default cell; it can never contain a point.
    pub fn new(id: GeofenceId, name: impl Into<String>, border: Vec<Position>) -> Self {
        let grid_cell = envelope_center(&border)
            .map(|c| cell_of(c.lng, c.lat))
            .unwrap_or_default();
        Self {
            id,
            name: name.into(),
            border,
            grid_cell,
        }
    }

    /// Centre of the border's bounding envelope.
    pub fn center(&self) -> Option<Position> {
        envelope_center(&self.border)
    }
}

/// Centre of the axis-aligned envelope around `ring`.
fn envelope_center(ring: &[Position]) -> Option<Position> {
    let first = ring.first()?;
    let (mut min_lng, mut max_lng) = (first.lng, first.lng);
    let (mut min_lat, mut max_lat) = (first.lat, first.lat);
    for p in ring {
        min_lng = min_lng.min(p.lng);
        max_lng = max_lng.max(p.lng);
        min_lat = min_lat.min(p.lat);
        max_lat = max_lat.max(p.lat);
    }
    Some(Position::new(
        (min_lng + max_lng) / 2.0,
        (min_lat + max_lat) / 2.0,
    ))
}

// ---------------------------------------------------------------------------
// MembershipInterval
// ---------------------------------------------------------------------------

/// A span of time during which an entity was inside a geofence.
///
/// At most one interval per (entity, geofence) pair is open (has no exit
/// timestamp) at any time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[serde(rename_all = "camelCase")]
#[ts(export, export_to = "bindings/")]
pub struct MembershipInterval {
    /// The entity inside the geofence.
    pub entity_id: EntityId,
    /// The geofence entered.
    pub geofence_id: GeofenceId,
    /// Timestamp of the ping that entered the geofence.
    pub entry_timestamp: DateTime<Utc>,
    /// Timestamp of the ping that left it, if it has left.
    pub exit_timestamp: Option<DateTime<Utc>>,
}

impl MembershipInterval {
    /// A new open interval starting at `entry_timestamp`.
    pub const fn open(
        entity_id: EntityId,
        geofence_id: GeofenceId,
        entry_timestamp: DateTime<Utc>,
    ) -> Self {
        Self {
            entity_id,
            geofence_id,
            entry_timestamp,
            exit_timestamp: None,
        }
    }

    /// Whether the entity has not yet left the geofence.
    pub const fn is_open(&self) -> bool {
        self.exit_timestamp.is_none()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn location_event_accepts_device_field_names() {
        let json = r#"{
            "Id": "01945c2a-3b4f-7def-8a12-bc34567890ab",
            "Lng": 24.94,
            "Lat": 60.17,
            "Ts": "2024-03-01T12:00:00.1234567Z"
        }"#;
        let event: Result<LocationEvent, _> = serde_json::from_str(json);
        assert!(event.is_ok());
        let event = event.unwrap_or_else(|_| sample_event());
        assert_eq!(event.cell(), GridCell::new(24, 60));
        assert_eq!(event.ts_millis(), 1_709_294_400_123);
    }

    #[test]
    fn location_event_accepts_lowercase_aliases() {
        let json = r#"{"id":"01945c2a-3b4f-7def-8a12-bc34567890ab","lng":1.5,"lat":2.5,"ts":"2024-03-01T12:00:00Z"}"#;
        let event: Result<LocationEvent, _> = serde_json::from_str(json);
        assert!(event.is_ok());
    }

    #[test]
    fn location_event_binding_uses_device_field_names() {
        let decl = LocationEvent::decl();
        for field in ["Id:", "Lng:", "Lat:", "Ts:"] {
            assert!(decl.contains(field), "{field} missing from {decl}");
        }
        assert!(!decl.contains("entity_id"));
    }

    #[test]
    fn location_event_requires_every_field() {
        let json = r#"{"Id":"01945c2a-3b4f-7def-8a12-bc34567890ab","Lng":1.5,"Lat":2.5}"#;
        let event: Result<LocationEvent, _> = serde_json::from_str(json);
        assert!(event.is_err());
    }

    #[test]
    fn coordinate_validation() {
        let mut event = sample_event();
        assert!(event.has_valid_coordinates());
        event.lat = 90.5;
        assert!(!event.has_valid_coordinates());
        event.lat = 0.0;
        event.lng = f64::NAN;
        assert!(!event.has_valid_coordinates());
    }

    #[test]
    fn geofence_is_filed_under_envelope_center_cell() {
        let geofence = Geofence::new(
            GeofenceId::new(),
            "Helsinki Station",
            vec![
                Position::new(24.938_572_961_813_4, 60.171_159_217_212_3),
                Position::new(24.938_572_961_813_4, 60.170_012_113_402_1),
                Position::new(24.944_558_285_421_2, 60.170_012_113_402_1),
                Position::new(24.944_558_285_421_2, 60.171_159_217_212_3),
                Position::new(24.938_572_961_813_4, 60.171_159_217_212_3),
            ],
        );
        assert_eq!(geofence.grid_cell, GridCell::new(24, 60));
        assert!(geofence.center().is_some());
    }

    #[test]
    fn empty_border_has_no_center() {
        let geofence = Geofence::new(GeofenceId::new(), "empty", Vec::new());
        assert_eq!(geofence.center(), None);
        assert_eq!(geofence.grid_cell, GridCell::default());
    }

    #[test]
    fn interval_open_and_closed() {
        let ts = Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).single().unwrap_or_default();
        let mut interval = MembershipInterval::open(EntityId::new(), GeofenceId::new(), ts);
        assert!(interval.is_open());
        interval.exit_timestamp = Some(ts);
        assert!(!interval.is_open());
    }

    fn sample_event() -> LocationEvent {
        LocationEvent {
            entity_id: EntityId::new(),
            lng: 0.0,
            lat: 0.0,
            ts: DateTime::<Utc>::default(),
        }
    }
}
