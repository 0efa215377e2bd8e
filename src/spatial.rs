//! Per-page point index over instance centroids.

use rstar::primitives::GeomWithData;
use rstar::RTree;
use tracing::debug;

use crate::geo::Point;
use crate::logging::SPATIAL_INDEX;

/// Centroid tagged with its dense page-local slot.
pub type IndexedCentroid = GeomWithData<[f64; 2], usize>;

#[derive(Debug)]
pub struct SpatialIndex {
    tree: RTree<IndexedCentroid>,
}

impl SpatialIndex {
    /// Bulk-load an index from `(slot, centroid)` pairs.
    pub fn build<I>(points: I) -> Self
    where
        I: IntoIterator<Item = (usize, Point)>,
    {
        let entries: Vec<IndexedCentroid> = points
            .into_iter()
            .map(|(slot, p)| GeomWithData::new([p.x, p.y], slot))
            .collect();
        debug!(target: SPATIAL_INDEX, points = entries.len(), "bulk loading r-tree");
        Self {
            tree: RTree::bulk_load(entries),
        }
    }

    /// Every slot whose centroid lies within `radius` of `center`
    /// (boundary inclusive). Order is unspecified.
    pub fn query_radius(&self, center: Point, radius: f64) -> Vec<usize> {
        self.tree
            .locate_within_distance([center.x, center.y], radius * radius)
            .map(|entry| entry.data)
            .collect()
    }

    pub fn len(&self) -> usize {
        self.tree.size()
    }

    pub fn is_empty(&self) -> bool {
        self.tree.size() == 0
    }
}

/// Pairwise reference for [`SpatialIndex::query_radius`].
pub fn brute_force_radius(points: &[(usize, Point)], center: Point, radius: f64) -> Vec<usize> {
    let max_distance_2 = radius * radius;
    points
        .iter()
        .filter(|(_, p)| center.distance_2(p) <= max_distance_2)
        .map(|(slot, _)| *slot)
        .collect()
}
