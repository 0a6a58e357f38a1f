//! Point-in-polygon testing for geofence borders.
//!
//! A [`GeofenceShape`] is a geofence border converted to a `geo` polygon
//! plus its bounding rectangle. The rectangle is checked first so that the
//! common "nowhere near it" case costs four comparisons.
//!
//! Containment follows `geo::Contains`: a point on the border is *not*
//! inside. The rule is the same for every geofence, so an entity sitting
//! exactly on an edge is consistently outside.

use geo::{BoundingRect, Contains};
use geo_types::{Coord, LineString, Point, Polygon, Rect};
use geotrack_types::{Geofence, GeofenceId};

/// A geofence border prepared for containment queries.
#[derive(Debug, Clone)]
pub struct GeofenceShape {
    id: GeofenceId,
    polygon: Polygon<f64>,
    bbox: Option<Rect<f64>>,
}

impl GeofenceShape {
    /// Build the shape for `geofence`. An unclosed ring is closed implicitly.
    pub fn new(geofence: &Geofence) -> Self {
        let ring: LineString<f64> = geofence
            .border
            .iter()
            .map(|p| Coord { x: p.lng, y: p.lat })
            .collect();
        let polygon = Polygon::new(ring, Vec::new());
        let bbox = polygon.bounding_rect();
        Self {
            id: geofence.id,
            polygon,
            bbox,
        }
    }

    /// The geofence this shape belongs to.
    pub const fn id(&self) -> GeofenceId {
        self.id
    }

    /// Whether `(lng, lat)` lies strictly inside the border.
    pub fn contains(&self, lng: f64, lat: f64) -> bool {
        let Some(bbox) = self.bbox else {
            return false;
        };
        let (min, max) = (bbox.min(), bbox.max());
        if lng < min.x || lng > max.x || lat < min.y || lat > max.y {
            return false;
        }
        self.polygon.contains(&Point::new(lng, lat))
    }
}
