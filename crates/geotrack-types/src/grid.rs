//! One-degree grid indexing shared by storage partitioning and hub routing.
//!
//! Every coordinate maps to a [`GridCell`] of `(floor(lng), floor(lat))`.
//! The same cell is used twice: geofences are stored under the cell of their
//! representative point, and hub groups are named after the cell so that a
//! location event and a subscriber viewport covering the same square meet
//! in the same [`GroupKey`].
//!
//! Cells are always normalized: longitude wraps into `[-180, 180)` and
//! latitude into `[-90, 90)`.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};
use ts_rs::TS;

/// Prefix of every hub group name.
const GROUP_PREFIX: &str = "grid";

/// A normalized one-degree grid cell.
///
/// Serialized as a `[lng, lat]` integer pair, which is also the shape
/// subscribers send when they list the cells they are interested in.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(from = "[i32; 2]", into = "[i32; 2]")]
pub struct GridCell {
    lng: i32,
    lat: i32,
}

impl GridCell {
    /// Create a cell, wrapping both indexes into their valid ranges.
    pub const fn new(lng: i32, lat: i32) -> Self {
        Self {
            lng: normalize_longitude(lng),
            lat: normalize_latitude(lat),
        }
    }

    /// Longitude index in `[-180, 180)`.
    pub const fn lng(self) -> i32 {
        self.lng
    }

    /// Latitude index in `[-90, 90)`.
    pub const fn lat(self) -> i32 {
        self.lat
    }
}

impl From<[i32; 2]> for GridCell {
    fn from([lng, lat]: [i32; 2]) -> Self {
        Self::new(lng, lat)
    }
}

impl From<GridCell> for [i32; 2] {
    fn from(cell: GridCell) -> Self {
        [cell.lng, cell.lat]
    }
}

/// Storage partition key form: `{lng},{lat}`.
impl core::fmt::Display for GridCell {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "{},{}", self.lng, self.lat)
    }
}

/// Name of a pub/sub group covering one grid cell.
///
/// Only constructed from a [`GridCell`], so two keys are equal exactly when
/// their cells are equal. The textual form is `grid:{lng}:{lat}`.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, TS)]
#[serde(transparent)]
#[ts(export, export_to = "bindings/")]
pub struct GroupKey(String);

impl GroupKey {
    /// The group name for `cell`.
    pub fn for_cell(cell: GridCell) -> Self {
        Self(format!("{GROUP_PREFIX}:{}:{}", cell.lng, cell.lat))
    }

    /// The group name as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Recover the cell this key was built from.
    ///
    /// Returns `None` only for malformed names, which cannot be produced
    /// through [`GroupKey::for_cell`].
    pub fn cell(&self) -> Option<GridCell> {
        let mut parts = self.0.split(':');
        if parts.next() != Some(GROUP_PREFIX) {
            return None;
        }
        let lng = parts.next()?.parse().ok()?;
        let lat = parts.next()?.parse().ok()?;
        if parts.next().is_some() {
            return None;
        }
        Some(GridCell::new(lng, lat))
    }
}

impl core::fmt::Display for GroupKey {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<GridCell> for GroupKey {
    fn from(cell: GridCell) -> Self {
        Self::for_cell(cell)
    }
}

/// Wrap a longitude index into `[-180, 180)`.
///
/// Equivalent to repeatedly adding or subtracting 360.
pub const fn normalize_longitude(n: i32) -> i32 {
    wrap(n, 180)
}

/// Wrap a latitude index into `[-90, 90)`.
///
/// Equivalent to repeatedly adding or subtracting 180.
pub const fn normalize_latitude(n: i32) -> i32 {
    wrap(n, 90)
}

/// Wrap `n` into `[-half, half)`.
///
/// The result lies in `[-half, half)`, which always fits in an `i32`.
#[allow(clippy::cast_possible_truncation, clippy::cast_lossless)]
const fn wrap(n: i32, half: i64) -> i32 {
    let span = half.saturating_mul(2);
    (n as i64)
        .saturating_add(half)
        .rem_euclid(span)
        .saturating_sub(half) as i32
}

/// The grid cell containing `(lng, lat)`.
///
/// Total over all inputs: non-finite values saturate (NaN maps to 0) and the
/// result is normalized like every other cell.
pub fn cell_of(lng: f64, lat: f64) -> GridCell {
    GridCell::new(floor_index(lng), floor_index(lat))
}

/// The hub group name for `cell`.
pub fn group_key(cell: GridCell) -> GroupKey {
    GroupKey::for_cell(cell)
}

/// Cells covered by a map viewport.
///
/// West and south are floored, east and north are ceiled, and the ranges are
/// half-open, so a viewport that exactly spans one degree covers one cell.
/// Viewports that cross the antimeridian may have `east > 180`; the cells
/// wrap through normalization.
///
/// An empty or inverted viewport covers no cells. Spans wider than the globe
/// are clipped to 360 longitude and 180 latitude indexes.
///
/// Enumeration stops as soon as more than `cap` distinct cells have been
/// found, which is enough for callers that only need to know whether a
/// ceiling was exceeded.
pub fn cells_in_viewport(
    west: f64,
    south: f64,
    east: f64,
    north: f64,
    cap: usize,
) -> BTreeSet<GridCell> {
    let west = floor_index(west);
    let south = floor_index(south);
    let east = ceil_index(east);
    let north = ceil_index(north);

    let mut cells = BTreeSet::new();
    if east <= west || north <= south {
        return cells;
    }
    let east = east.min(west.saturating_add(LONGITUDE_CELLS));
    let north = north.min(south.saturating_add(LATITUDE_CELLS));

    for lng in west..east {
        for lat in south..north {
            cells.insert(GridCell::new(lng, lat));
            if cells.len() > cap {
                return cells;
            }
        }
    }
    cells
}

/// Distinct longitude indexes around the globe.
const LONGITUDE_CELLS: i32 = 360;

/// Distinct latitude indexes from pole to pole.
const LATITUDE_CELLS: i32 = 180;

/// Floor to an integer index. `as` saturates and maps NaN to 0.
#[allow(clippy::cast_possible_truncation)]
fn floor_index(value: f64) -> i32 {
    value.floor() as i32
}

/// Ceil to an integer index. `as` saturates and maps NaN to 0.
#[allow(clippy::cast_possible_truncation)]
fn ceil_index(value: f64) -> i32 {
    value.ceil() as i32
}
