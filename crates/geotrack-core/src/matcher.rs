//! Geofence matching for a single point.
//!
//! Geofences are partitioned by owning cell, so one partition lookup yields
//! every candidate. A geofence that reaches into a neighbouring cell but is
//! owned elsewhere is never matched from that neighbour.

use std::collections::BTreeSet;

use geotrack_types::{GeofenceId, cell_of};

use crate::error::StoreError;
use crate::geometry::GeofenceShape;
use crate::store::GeofenceStore;

/// Finds the geofences containing a point.
#[derive(Debug, Clone)]
pub struct GeofenceMatcher<G> {
    store: G,
}

impl<G: GeofenceStore> GeofenceMatcher<G> {
    /// A matcher reading geofences from `store`.
    pub const fn new(store: G) -> Self {
        Self { store }
    }

    /// Ids of the geofences owned by the point's cell whose border strictly
    /// contains `(lng, lat)`.
    pub async fn colliding_geofences(
        &self,
        lng: f64,
        lat: f64,
    ) -> Result<BTreeSet<GeofenceId>, StoreError> {
        let candidates = self.store.geofences_in_cell(cell_of(lng, lat)).await?;
        Ok(candidates
            .iter()
            .map(GeofenceShape::new)
            .filter(|shape| shape.contains(lng, lat))
            .map(|shape| shape.id())
            .collect())
    }

    /// The underlying geofence store.
    pub const fn store(&self) -> &G {
        &self.store
    }
}
