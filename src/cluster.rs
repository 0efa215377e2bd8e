//! Relative-signature evidence between neighbouring shape instances.
//!
//! Every instance on a page looks at its neighbours within the search
//! radius. Each `(subject shape, neighbour shape, displacement)` triple is
//! quantized into a bucket and counted. Buckets that collect enough support
//! are accepted and turn into edges of the grouping graph.
//!
//! Signatures are directional: the pair (A, B) adds one count to
//! `A -> B @ quantize(d)` and, when B is the subject, one to
//! `B -> A @ quantize(-d)`. Half-ties round up on both sides, so at an exact
//! tie the reverse bucket is not the mirror of the forward one.

use std::collections::{BTreeSet, HashMap};

use serde::Serialize;
use tracing::{debug, trace};

use crate::config::AnalysisConfig;
use crate::geo::Point;
use crate::logging::RELATIVE_SIGNATURES;
use crate::registry::{InstanceId, ShapeId};
use crate::spatial::SpatialIndex;

/// The slice of a placed instance the page stages need.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PageInstance {
    pub instance_id: InstanceId,
    pub shape_id: ShapeId,
    pub centroid: Point,
}

/// Bucket index of `value` for buckets `tolerance` wide.
///
/// Bucket `k` covers `[(k - 0.5) * tolerance, (k + 0.5) * tolerance)`; a value
/// exactly halfway between two bucket centres goes to the upper one (round
/// half toward positive infinity), for negative values too.
pub fn quantize(value: f64, tolerance: f64) -> i64 {
    (value / tolerance + 0.5).floor() as i64
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct SignatureKey {
    pub from: ShapeId,
    pub to: ShapeId,
    pub dx: i64,
    pub dy: i64,
}

impl SignatureKey {
    pub fn between(subject: &PageInstance, neighbour: &PageInstance, tolerance: f64) -> Self {
        SignatureKey {
            from: subject.shape_id,
            to: neighbour.shape_id,
            dx: quantize(neighbour.centroid.x - subject.centroid.x, tolerance),
            dy: quantize(neighbour.centroid.y - subject.centroid.y, tolerance),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RelativeSignature {
    pub from: ShapeId,
    pub to: ShapeId,
    /// Bucket centre.
    pub displacement: Point,
    pub support: u32,
}

#[derive(Debug, Clone, Copy)]
struct CandidatePair {
    subject: usize,
    neighbour: usize,
    key: SignatureKey,
}

/// Support counts for one page, plus the instance pairs behind them.
#[derive(Debug)]
pub struct SignatureTable {
    support: HashMap<SignatureKey, u32>,
    pairs: Vec<CandidatePair>,
    tolerance: f64,
}

impl SignatureTable {
    /// `index` must hold the centroids of `instances`, keyed by slice position.
    pub fn accumulate(
        instances: &[PageInstance],
        index: &SpatialIndex,
        config: &AnalysisConfig,
    ) -> Self {
        let radius = config.search_radius;
        let max_distance_2 = radius * radius;
        let tolerance = config.quantization_tolerance;

        let mut support: HashMap<SignatureKey, u32> = HashMap::new();
        let mut pairs = Vec::new();

        for (subject, a) in instances.iter().enumerate() {
            for neighbour in index.query_radius(a.centroid, radius) {
                if neighbour == subject {
                    continue;
                }
                let Some(b) = instances.get(neighbour) else {
                    continue;
                };
                if a.centroid.distance_2(&b.centroid) > max_distance_2 {
                    continue;
                }
                let key = SignatureKey::between(a, b, tolerance);
                *support.entry(key).or_insert(0) += 1;
                pairs.push(CandidatePair {
                    subject,
                    neighbour,
                    key,
                });
            }
        }

        debug!(
            target: RELATIVE_SIGNATURES,
            instances = instances.len(),
            pairs = pairs.len(),
            signatures = support.len(),
            "accumulated relative signatures"
        );

        SignatureTable {
            support,
            pairs,
            tolerance,
        }
    }

    pub fn support(&self, key: &SignatureKey) -> u32 {
        self.support.get(key).copied().unwrap_or(0)
    }

    pub fn is_accepted(&self, key: &SignatureKey, min_support: u32) -> bool {
        self.support(key) >= min_support
    }

    pub fn signature_count(&self) -> usize {
        self.support.len()
    }

    pub fn pair_count(&self) -> usize {
        self.pairs.len()
    }

    /// Accepted signatures, sorted by key.
    pub fn accepted(&self, min_support: u32) -> Vec<RelativeSignature> {
        let mut keys: Vec<(&SignatureKey, &u32)> = self
            .support
            .iter()
            .filter(|(_, count)| **count >= min_support)
            .collect();
        keys.sort_unstable_by_key(|(key, _)| **key);

        keys.into_iter()
            .map(|(key, &support)| {
                trace!(
                    target: RELATIVE_SIGNATURES,
                    from = key.from,
                    to = key.to,
                    dx = key.dx,
                    dy = key.dy,
                    support,
                    "accepted signature"
                );
                RelativeSignature {
                    from: key.from,
                    to: key.to,
                    displacement: Point::new(
                        key.dx as f64 * self.tolerance,
                        key.dy as f64 * self.tolerance,
                    ),
                    support,
                }
            })
            .collect()
    }

    /// Undirected edges `(low slot, high slot)` whose displacement matches an
    /// accepted signature in either direction. Sorted and deduplicated.
    pub fn strong_edges(&self, min_support: u32) -> Vec<(usize, usize)> {
        let edges: BTreeSet<(usize, usize)> = self
            .pairs
            .iter()
            .filter(|pair| self.is_accepted(&pair.key, min_support))
            .map(|pair| {
                (
                    pair.subject.min(pair.neighbour),
                    pair.subject.max(pair.neighbour),
                )
            })
            .collect();
        edges.into_iter().collect()
    }
}
