//! Subscriber interest in grid cells, expressed as hub group operations.
//!
//! A subscriber tells the hub which cells its map shows; the hub keeps the
//! previous set and asks [`sync_groups`] for the smallest list of group
//! changes. More than [`MAX_CELLS_PER_CONNECTION`] cells trips a breaker
//! that drops the connection from every group instead.

use std::collections::BTreeSet;

use geotrack_types::{ConnectionId, GridCell, GroupOp, group_key};
use tracing::{debug, info};

/// Most cells a single connection may subscribe to.
pub const MAX_CELLS_PER_CONNECTION: usize = 50;

/// Group operations that move `connection_id` from `previous_cells` to
/// `new_cells`.
///
/// Removals come first, then additions, each in cell order. Cells present
/// in both sets produce no op. If `new_cells` exceeds the ceiling the only
/// op is [`GroupOp::RemoveFromAllGroups`].
pub fn sync_groups(
    connection_id: ConnectionId,
    new_cells: &BTreeSet<GridCell>,
    previous_cells: &BTreeSet<GridCell>,
) -> Vec<GroupOp> {
    if exceeds_ceiling(new_cells) {
        info!(
            %connection_id,
            requested = new_cells.len(),
            "too many grid cells, removing connection from all groups"
        );
        return vec![GroupOp::RemoveFromAllGroups { connection_id }];
    }

    let removals = previous_cells.difference(new_cells).map(|&cell| {
        debug!(%connection_id, %cell, "leaving group");
        GroupOp::RemoveFromGroup {
            connection_id,
            group: group_key(cell),
        }
    });
    let additions = new_cells.difference(previous_cells).map(|&cell| {
        debug!(%connection_id, %cell, "joining group");
        GroupOp::AddToGroup {
            connection_id,
            group: group_key(cell),
        }
    });
    removals.chain(additions).collect()
}

/// Whether `cells` is over the per-connection ceiling.
pub fn exceeds_ceiling(cells: &BTreeSet<GridCell>) -> bool {
    cells.len() > MAX_CELLS_PER_CONNECTION
}

/// The baseline to remember once the ops for `new_cells` were applied.
///
/// An over-ceiling request leaves the connection in no group, so its
/// baseline is empty.
pub fn next_baseline(new_cells: BTreeSet<GridCell>) -> BTreeSet<GridCell> {
    if exceeds_ceiling(&new_cells) {
        BTreeSet::new()
    } else {
        new_cells
    }
}
