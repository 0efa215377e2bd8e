use indexmap::IndexMap;
use serde::Serialize;
use tracing::{debug, trace};

use crate::error::BlockError;
use crate::geo::{Affine, Point, Rect, Rgb};
use crate::logging::SHAPE_REGISTRY;
use crate::normalize::is_closed;
use crate::transform::resolve;

pub type ShapeId = u32;
pub type InstanceId = u32;

/// One distinct drawing-command signature, i.e. one CAD block.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ShapeDefinition {
    pub id: ShapeId,
    pub count: u32,
    pub color: Rgb,
    pub closed: bool,
    /// Local extent of the first occurrence.
    pub local_bbox: Rect,
    pub signature: String,
}

/// Distinct colour per shape id, stable across runs.
pub fn palette_color(id: ShapeId) -> Rgb {
    const GOLDEN_RATIO_CONJUGATE: f64 = 0.618_033_988_749_895;
    let hue = (id as f64 * GOLDEN_RATIO_CONJUGATE).fract() as f32;
    Rgb::from_hsv(hue, 0.95, 0.9)
}

/// Signature to definition map. Ids are handed out in first-seen order,
/// starting at 1, and never reused.
#[derive(Debug, Default)]
pub struct ShapeRegistry {
    by_signature: IndexMap<String, ShapeId>,
    definitions: Vec<ShapeDefinition>,
}

impl ShapeRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Look up `signature`, creating a definition on first sight. Every call
    /// counts one occurrence.
    pub fn register(&mut self, signature: &str, color: Option<Rgb>, local_bbox: Rect) -> ShapeId {
        if let Some(&id) = self.by_signature.get(signature) {
            self.definitions[(id - 1) as usize].count += 1;
            trace!(target: SHAPE_REGISTRY, shape_id = id, "repeat occurrence");
            return id;
        }

        let id = self.definitions.len() as ShapeId + 1;
        let definition = ShapeDefinition {
            id,
            count: 1,
            color: color.unwrap_or_else(|| palette_color(id)),
            closed: is_closed(signature),
            local_bbox,
            signature: signature.to_string(),
        };
        debug!(
            target: SHAPE_REGISTRY,
            shape_id = id,
            closed = definition.closed,
            "new shape definition"
        );
        self.by_signature.insert(definition.signature.clone(), id);
        self.definitions.push(definition);
        id
    }

    pub fn get(&self, id: ShapeId) -> Option<&ShapeDefinition> {
        id.checked_sub(1)
            .and_then(|idx| self.definitions.get(idx as usize))
    }

    pub fn lookup(&self, signature: &str) -> Option<ShapeId> {
        self.by_signature.get(signature).copied()
    }

    pub fn len(&self) -> usize {
        self.definitions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.definitions.is_empty()
    }

    pub fn definitions(&self) -> &[ShapeDefinition] {
        &self.definitions
    }

    pub fn into_definitions(self) -> Vec<ShapeDefinition> {
        self.definitions
    }

    /// Check the id and count bookkeeping against the instance list.
    pub fn verify(&self, instances: &[ShapeInstance]) -> Result<(), BlockError> {
        if self.by_signature.len() != self.definitions.len() {
            return Err(BlockError::Invariant(format!(
                "{} signatures map to {} definitions",
                self.by_signature.len(),
                self.definitions.len()
            )));
        }
        for (idx, definition) in self.definitions.iter().enumerate() {
            if definition.id as usize != idx + 1 {
                return Err(BlockError::Invariant(format!(
                    "definition at slot {} carries id {}",
                    idx + 1,
                    definition.id
                )));
            }
            if self.by_signature.get(&definition.signature) != Some(&definition.id) {
                return Err(BlockError::Invariant(format!(
                    "signature of shape {} does not map back to it",
                    definition.id
                )));
            }
        }

        let mut counts = vec![0u32; self.definitions.len()];
        for instance in instances {
            let slot = instance
                .shape_id
                .checked_sub(1)
                .and_then(|idx| counts.get_mut(idx as usize))
                .ok_or_else(|| {
                    BlockError::Invariant(format!(
                        "instance {} references unknown shape {}",
                        instance.id, instance.shape_id
                    ))
                })?;
            *slot += 1;
        }
        for (definition, seen) in self.definitions.iter().zip(&counts) {
            if definition.count != *seen {
                return Err(BlockError::Invariant(format!(
                    "shape {} counts {} occurrences but owns {} instances",
                    definition.id, definition.count, seen
                )));
            }
        }
        Ok(())
    }
}

/// One placed occurrence of a shape definition.
///
/// The global bbox and centroid are derived from `local_bbox` and `transform`
/// at construction and cannot be set independently.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ShapeInstance {
    pub id: InstanceId,
    pub page: u32,
    pub shape_id: ShapeId,
    pub local_bbox: Rect,
    pub transform: Affine,
    global_bbox: Option<Rect>,
    centroid: Option<Point>,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub raw: String,
}

impl ShapeInstance {
    pub fn new(
        id: InstanceId,
        page: u32,
        shape_id: ShapeId,
        local_bbox: Rect,
        transform: Affine,
        raw: String,
    ) -> Self {
        let placement = resolve(shape_id, &local_bbox, &transform).ok();
        Self {
            id,
            page,
            shape_id,
            local_bbox,
            transform,
            global_bbox: placement.map(|p| p.global_bbox),
            centroid: placement.map(|p| p.centroid),
            raw,
        }
    }

    pub fn global_bbox(&self) -> Option<Rect> {
        self.global_bbox
    }

    pub fn centroid(&self) -> Option<Point> {
        self.centroid
    }

    /// True when the transform collapsed the shape and it has no placement.
    pub fn is_degenerate(&self) -> bool {
        self.centroid.is_none()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn unit() -> Rect {
        Rect::new(0.0, 0.0, 1.0, 1.0)
    }

    #[test]
    fn ids_follow_first_seen_order() {
        let mut registry = ShapeRegistry::new();
        assert_eq!(registry.register("0 0 m 1 1 l S", None, unit()), 1);
        assert_eq!(registry.register("0 0 1 1 re f", None, unit()), 2);
        assert_eq!(registry.register("0 0 m 1 1 l S", None, unit()), 1);
        assert_eq!(registry.len(), 2);
        assert_eq!(registry.get(1).map(|d| d.count), Some(2));
        assert_eq!(registry.get(2).map(|d| d.count), Some(1));
        assert!(registry.get(0).is_none());
        assert_eq!(registry.lookup("0 0 1 1 re f"), Some(2));
    }

    #[test]
    fn first_color_wins() {
        let mut registry = ShapeRegistry::new();
        let red = Rgb::new(1.0, 0.0, 0.0);
        let id = registry.register("0 0 m 1 1 l S", Some(red), unit());
        registry.register("0 0 m 1 1 l S", Some(Rgb::BLACK), unit());
        assert_eq!(registry.get(id).unwrap().color, red);
    }

    #[test]
    fn missing_color_falls_back_to_palette() {
        let mut registry = ShapeRegistry::new();
        let id = registry.register("0 0 m 1 1 l S", None, unit());
        assert_eq!(registry.get(id).unwrap().color, palette_color(id));
        assert_ne!(palette_color(1), palette_color(2));
    }

    #[test]
    fn verify_catches_count_drift() {
        let mut registry = ShapeRegistry::new();
        let id = registry.register("0 0 m 1 1 l S", None, unit());
        registry.register("0 0 m 1 1 l S", None, unit());
        let one = ShapeInstance::new(1, 1, id, unit(), Affine::IDENTITY, String::new());
        assert!(registry.verify(&[one.clone()]).is_err());
        let two = ShapeInstance::new(2, 1, id, unit(), Affine::IDENTITY, String::new());
        assert!(registry.verify(&[one, two]).is_ok());
    }

    #[test]
    fn degenerate_instances_have_no_placement() {
        let squashed = Affine::new(1.0, 0.0, 0.0, 0.0, 5.0, 5.0);
        let instance = ShapeInstance::new(1, 1, 1, unit(), squashed, String::new());
        assert!(instance.is_degenerate());
        assert!(instance.global_bbox().is_none());
    }
}
