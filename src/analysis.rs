//! Document-level pipeline: normalize, register, place, then cluster each
//! page and merge the page results into shared group types.

use std::collections::{BTreeMap, HashSet};

use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, info_span, warn};

use crate::cluster::{PageInstance, RelativeSignature, SignatureTable};
use crate::config::AnalysisConfig;
use crate::error::{BlockError, ParseError};
use crate::geo::{Affine, Rgb};
use crate::grouping::{connected_components, Component, GroupDefinition, GroupInstance, GroupRegistry};
use crate::logging::{BLOCK_PARSE, GROUPING, SHAPE_REGISTRY};
use crate::normalize::{normalize, NormalizedBlock};
use crate::registry::{InstanceId, ShapeDefinition, ShapeId, ShapeInstance, ShapeRegistry};
use crate::spatial::SpatialIndex;

/// One `q cm ... Q` block as it appeared on a page.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawBlock {
    /// 1-based.
    pub page: u32,
    pub commands: String,
    pub transform: Affine,
    pub color: Option<Rgb>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum AnalysisWarning {
    /// A block that could not be normalized; it takes no further part.
    ParseSkip {
        page: u32,
        block: usize,
        reason: String,
    },
    /// An instance whose placement collapses or overflows; it is registered
    /// but left out of clustering.
    DegenerateTransform {
        page: u32,
        instance_id: InstanceId,
        shape_id: ShapeId,
        determinant: f64,
    },
    /// A page whose content stream could not be decoded.
    UnreadablePage { page: u32, reason: String },
}

#[derive(Debug, Clone, PartialEq, Default, Serialize)]
pub struct AnalysisMetadata {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,
    pub pages: usize,
    pub total_instances: usize,
    pub unique_shapes: usize,
    /// Shapes with at least `min_shape_repeats` occurrences.
    pub repeated_shapes: usize,
    pub degenerate_instances: usize,
    pub skipped_blocks: usize,
    pub group_types: usize,
    pub group_instances: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PageSignatures {
    pub page: u32,
    pub signatures: Vec<RelativeSignature>,
}

/// Everything recovered from one document.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DocumentAnalysis {
    pub metadata: AnalysisMetadata,
    pub shapes: Vec<ShapeDefinition>,
    pub instances: Vec<ShapeInstance>,
    pub groups: Vec<GroupDefinition>,
    pub group_instances: Vec<GroupInstance>,
    pub signatures: Vec<PageSignatures>,
    pub warnings: Vec<AnalysisWarning>,
}

impl DocumentAnalysis {
    pub fn to_json(&self, pretty: bool) -> Result<String, BlockError> {
        let json = if pretty {
            serde_json::to_string_pretty(self)?
        } else {
            serde_json::to_string(self)?
        };
        Ok(json)
    }

    pub fn with_source(mut self, source: impl Into<String>) -> Self {
        self.metadata.source = Some(source.into());
        self
    }

    pub fn shape(&self, id: ShapeId) -> Option<&ShapeDefinition> {
        id.checked_sub(1)
            .and_then(|idx| self.shapes.get(idx as usize))
    }

    pub fn instance(&self, id: InstanceId) -> Option<&ShapeInstance> {
        id.checked_sub(1)
            .and_then(|idx| self.instances.get(idx as usize))
    }

    pub fn groups_on_page(&self, page: u32) -> impl Iterator<Item = &GroupInstance> {
        self.group_instances.iter().filter(move |g| g.page == page)
    }
}

/// Clustering result for a single page.
#[derive(Debug, Clone, PartialEq)]
pub struct PageOutcome {
    pub page: u32,
    pub signatures: Vec<RelativeSignature>,
    pub components: Vec<Component>,
}

/// Index, score and group the clusterable instances of one page.
///
/// The result depends only on the set of `instances`, not their order.
pub fn analyze_page(page: u32, instances: &[PageInstance], config: &AnalysisConfig) -> PageOutcome {
    let _span = info_span!(target: GROUPING, "page", page, instances = instances.len()).entered();

    let index = SpatialIndex::build(
        instances
            .iter()
            .enumerate()
            .map(|(slot, instance)| (slot, instance.centroid)),
    );
    let table = SignatureTable::accumulate(instances, &index, config);
    let edges = table.strong_edges(config.min_support);
    let components = connected_components(instances, &edges, config.min_group_size);

    debug!(
        target: GROUPING,
        page,
        edges = edges.len(),
        groups = components.len(),
        "page clustered"
    );

    PageOutcome {
        page,
        signatures: table.accepted(config.min_support),
        components,
    }
}

fn normalize_all(
    blocks: &[RawBlock],
    config: &AnalysisConfig,
) -> Vec<Result<NormalizedBlock, ParseError>> {
    if config.parallel_pages {
        blocks
            .par_iter()
            .map(|block| normalize(&block.commands, config.strictness))
            .collect()
    } else {
        blocks
            .iter()
            .map(|block| normalize(&block.commands, config.strictness))
            .collect()
    }
}

/// No instance may belong to more than one group instance.
fn verify_partition(group_instances: &[GroupInstance]) -> Result<(), BlockError> {
    let mut seen: HashSet<InstanceId> = HashSet::new();
    for group in group_instances {
        for &member in &group.members {
            if !seen.insert(member) {
                return Err(BlockError::Invariant(format!(
                    "instance {} belongs to more than one group",
                    member
                )));
            }
        }
    }
    Ok(())
}

/// Run the whole pipeline over page-ordered blocks.
///
/// Blocks are processed in `(page, position)` order; a block that fails to
/// normalize is skipped with a warning. Configuration errors and broken
/// registry invariants abort the run.
pub fn analyze_blocks(
    blocks: &[RawBlock],
    config: &AnalysisConfig,
) -> Result<DocumentAnalysis, BlockError> {
    config.validate()?;
    let _span = info_span!("analyze", blocks = blocks.len()).entered();

    let normalized = normalize_all(blocks, config);

    let mut order: Vec<usize> = (0..blocks.len()).collect();
    order.sort_by_key(|&idx| blocks[idx].page);

    let mut registry = ShapeRegistry::new();
    let mut instances: Vec<ShapeInstance> = Vec::with_capacity(blocks.len());
    let mut warnings = Vec::new();
    let mut skipped_blocks = 0;

    for idx in order {
        let block = &blocks[idx];
        let normalized = match &normalized[idx] {
            Ok(normalized) => normalized,
            Err(reason) => {
                warn!(
                    target: BLOCK_PARSE,
                    page = block.page,
                    block = idx,
                    %reason,
                    "skipping unparseable block"
                );
                skipped_blocks += 1;
                warnings.push(AnalysisWarning::ParseSkip {
                    page: block.page,
                    block: idx,
                    reason: reason.to_string(),
                });
                continue;
            }
        };

        let shape_id = registry.register(&normalized.signature, block.color, normalized.local_bbox);
        let instance = ShapeInstance::new(
            instances.len() as InstanceId + 1,
            block.page,
            shape_id,
            normalized.local_bbox,
            block.transform,
            block.commands.clone(),
        );
        if instance.is_degenerate() {
            warnings.push(AnalysisWarning::DegenerateTransform {
                page: instance.page,
                instance_id: instance.id,
                shape_id,
                determinant: instance.transform.determinant(),
            });
        }
        instances.push(instance);
    }
    registry.verify(&instances)?;

    let repeated: HashSet<ShapeId> = registry
        .definitions()
        .iter()
        .filter(|definition| definition.count >= config.min_shape_repeats)
        .map(|definition| definition.id)
        .collect();
    info!(
        target: SHAPE_REGISTRY,
        shapes = registry.len(),
        repeated = repeated.len(),
        instances = instances.len(),
        "shape registry built"
    );

    let mut pages: BTreeMap<u32, Vec<PageInstance>> = BTreeMap::new();
    for instance in &instances {
        let page = pages.entry(instance.page).or_default();
        if !repeated.contains(&instance.shape_id) {
            continue;
        }
        if let Some(centroid) = instance.centroid() {
            page.push(PageInstance {
                instance_id: instance.id,
                shape_id: instance.shape_id,
                centroid,
            });
        }
    }
    let pages: Vec<(u32, Vec<PageInstance>)> = pages.into_iter().collect();

    let outcomes: Vec<PageOutcome> = if config.parallel_pages {
        pages
            .par_iter()
            .map(|(page, page_instances)| analyze_page(*page, page_instances, config))
            .collect()
    } else {
        pages
            .iter()
            .map(|(page, page_instances)| analyze_page(*page, page_instances, config))
            .collect()
    };

    let mut groups = GroupRegistry::new();
    let mut group_instances = Vec::new();
    let mut signatures = Vec::with_capacity(outcomes.len());
    for outcome in outcomes {
        for component in outcome.components {
            group_instances.push(groups.place(outcome.page, component));
        }
        signatures.push(PageSignatures {
            page: outcome.page,
            signatures: outcome.signatures,
        });
    }
    verify_partition(&group_instances)?;

    let degenerate_instances = instances.iter().filter(|i| i.is_degenerate()).count();
    let metadata = AnalysisMetadata {
        source: None,
        pages: pages.len(),
        total_instances: instances.len(),
        unique_shapes: registry.len(),
        repeated_shapes: repeated.len(),
        degenerate_instances,
        skipped_blocks,
        group_types: groups.len(),
        group_instances: group_instances.len(),
    };
    info!(
        target: GROUPING,
        group_types = metadata.group_types,
        group_instances = metadata.group_instances,
        "grouping finished"
    );

    Ok(DocumentAnalysis {
        metadata,
        shapes: registry.into_definitions(),
        instances,
        groups: groups.into_definitions(),
        group_instances,
        signatures,
        warnings,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geo::Point;

    fn block(page: u32, commands: &str, x: f64, y: f64) -> RawBlock {
        RawBlock {
            page,
            commands: commands.to_string(),
            transform: Affine::translate(x, y),
            color: None,
        }
    }

    #[test]
    fn empty_input_is_empty_output() {
        let analysis = analyze_blocks(&[], &AnalysisConfig::default()).unwrap();
        assert!(analysis.shapes.is_empty());
        assert!(analysis.group_instances.is_empty());
        assert_eq!(analysis.metadata.pages, 0);
    }

    #[test]
    fn invalid_config_fails_before_parsing() {
        let config = AnalysisConfig {
            search_radius: 0.0,
            ..Default::default()
        };
        let err = analyze_blocks(&[block(1, "garbage", 0.0, 0.0)], &config).unwrap_err();
        assert!(matches!(err, BlockError::Config(_)));
    }

    #[test]
    fn blocks_are_taken_in_page_order() {
        let blocks = [
            block(2, "0 0 m 1 1 l S", 0.0, 0.0),
            block(1, "0 0 1 1 re f", 0.0, 0.0),
        ];
        let analysis = analyze_blocks(&blocks, &AnalysisConfig::default()).unwrap();
        assert_eq!(analysis.instances[0].page, 1);
        assert_eq!(analysis.instances[0].shape_id, 1);
        assert_eq!(analysis.shape(1).map(|s| s.signature.as_str()), Some("0 0 1 1 re f"));
        assert_eq!(analysis.metadata.pages, 2);
    }

    #[test]
    fn unique_shapes_stay_out_of_clustering() {
        let config = AnalysisConfig {
            min_support: 1,
            ..Default::default()
        };
        let blocks = [
            block(1, "0 0 m 10 0 l S", 0.0, 0.0),
            block(1, "0 0 10 10 re f", 20.0, 0.0),
        ];
        let analysis = analyze_blocks(&blocks, &config).unwrap();
        assert!(analysis.group_instances.is_empty());
        assert_eq!(analysis.metadata.repeated_shapes, 0);
    }

    #[test]
    fn partition_check_rejects_shared_members() {
        let group = |members: Vec<InstanceId>| GroupInstance {
            group_id: 1,
            page: 1,
            centroid: Point::default(),
            members,
        };
        assert!(verify_partition(&[group(vec![1, 2]), group(vec![3, 4])]).is_ok());
        assert!(verify_partition(&[group(vec![1, 2]), group(vec![2, 3])]).is_err());
    }
}
