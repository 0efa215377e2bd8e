use serde::Serialize;
use tracing::warn;

use crate::geo::{Affine, Point, Rect};
use crate::logging::SHAPE_REGISTRY;
use crate::registry::ShapeId;

/// Matrices with `|det|` below this collapse a shape to a line or a point.
pub const DEGENERATE_DETERMINANT: f64 = 1e-9;

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Placement {
    pub global_bbox: Rect,
    pub centroid: Point,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DegenerateTransform {
    pub determinant: f64,
}

pub fn is_degenerate(transform: &Affine) -> bool {
    !transform.is_finite() || transform.determinant().abs() < DEGENERATE_DETERMINANT
}

/// Place a shape's local bbox in page space.
///
/// All four corners go through the transform, so rotation and shear widen
/// the envelope correctly. The centroid is the envelope's centre.
pub fn resolve(
    shape_id: ShapeId,
    local_bbox: &Rect,
    transform: &Affine,
) -> Result<Placement, DegenerateTransform> {
    if is_degenerate(transform) {
        let determinant = transform.determinant();
        warn!(
            target: SHAPE_REGISTRY,
            shape_id,
            determinant,
            "degenerate transform, instance left out of spatial clustering"
        );
        return Err(DegenerateTransform { determinant });
    }

    let corners = local_bbox.corners().map(|p| transform.apply(p));
    let global_bbox = Rect::enclosing(corners).unwrap_or(*local_bbox);
    let centroid = global_bbox.center();
    if !global_bbox.is_finite() || !(centroid.x.is_finite() && centroid.y.is_finite()) {
        let determinant = transform.determinant();
        warn!(
            target: SHAPE_REGISTRY,
            shape_id,
            %global_bbox,
            "placement overflows, instance left out of spatial clustering"
        );
        return Err(DegenerateTransform { determinant });
    }
    Ok(Placement {
        global_bbox,
        centroid,
    })
}
