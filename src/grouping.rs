//! Connected components over accepted relative-signature edges.

use std::collections::HashMap;

use indexmap::IndexMap;
use serde::Serialize;
use tracing::{debug, trace};

use crate::cluster::PageInstance;
use crate::geo::Point;
use crate::logging::GROUPING;
use crate::registry::{InstanceId, ShapeId};

pub type GroupId = u32;

/// Disjoint sets over dense slots `0..n`, union by rank with path halving.
#[derive(Debug, Clone)]
pub struct UnionFind {
    parent: Vec<usize>,
    rank: Vec<u8>,
}

impl UnionFind {
    pub fn new(n: usize) -> Self {
        Self {
            parent: (0..n).collect(),
            rank: vec![0; n],
        }
    }

    pub fn find(&mut self, mut x: usize) -> usize {
        while self.parent[x] != x {
            let grandparent = self.parent[self.parent[x]];
            self.parent[x] = grandparent;
            x = grandparent;
        }
        x
    }

    /// Merge the sets of `x` and `y`; false if they already shared one.
    pub fn union(&mut self, x: usize, y: usize) -> bool {
        let root_x = self.find(x);
        let root_y = self.find(y);
        if root_x == root_y {
            return false;
        }
        match self.rank[root_x].cmp(&self.rank[root_y]) {
            std::cmp::Ordering::Greater => self.parent[root_y] = root_x,
            std::cmp::Ordering::Less => self.parent[root_x] = root_y,
            std::cmp::Ordering::Equal => {
                self.parent[root_y] = root_x;
                self.rank[root_x] += 1;
            }
        }
        true
    }

    pub fn len(&self) -> usize {
        self.parent.len()
    }

    pub fn is_empty(&self) -> bool {
        self.parent.is_empty()
    }
}

/// A connected component before it is given a group type.
#[derive(Debug, Clone, PartialEq)]
pub struct Component {
    /// Sorted ascending.
    pub members: Vec<InstanceId>,
    /// Member shape ids, sorted ascending (a multiset).
    pub composition: Vec<ShapeId>,
    /// Mean of member centroids.
    pub centroid: Point,
}

/// Partition the instances touched by `edges` into components of at least
/// `min_group_size` members. Instances without an edge are left out.
///
/// Output is ordered by each component's smallest instance id, so the result
/// does not depend on the order of `instances` or `edges`.
pub fn connected_components(
    instances: &[PageInstance],
    edges: &[(usize, usize)],
    min_group_size: usize,
) -> Vec<Component> {
    let mut sets = UnionFind::new(instances.len());
    let mut linked = vec![false; instances.len()];
    for &(a, b) in edges {
        sets.union(a, b);
        linked[a] = true;
        linked[b] = true;
    }

    let mut by_root: HashMap<usize, Vec<usize>> = HashMap::new();
    for slot in (0..instances.len()).filter(|&slot| linked[slot]) {
        by_root.entry(sets.find(slot)).or_default().push(slot);
    }

    let mut components: Vec<Component> = by_root
        .into_values()
        .filter(|slots| slots.len() >= min_group_size)
        .map(|mut slots| {
            slots.sort_unstable_by_key(|&slot| instances[slot].instance_id);
            let (sum_x, sum_y) = slots.iter().fold((0.0, 0.0), |(x, y), &slot| {
                let c = instances[slot].centroid;
                (x + c.x, y + c.y)
            });
            let n = slots.len() as f64;
            let mut composition: Vec<ShapeId> =
                slots.iter().map(|&slot| instances[slot].shape_id).collect();
            composition.sort_unstable();
            Component {
                members: slots
                    .iter()
                    .map(|&slot| instances[slot].instance_id)
                    .collect(),
                composition,
                centroid: Point::new(sum_x / n, sum_y / n),
            }
        })
        .collect();
    components.sort_unstable_by_key(|component| component.members[0]);

    debug!(
        target: GROUPING,
        linked = linked.iter().filter(|&&l| l).count(),
        components = components.len(),
        "extracted connected components"
    );
    components
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GroupDefinition {
    pub id: GroupId,
    pub composition: Vec<ShapeId>,
    pub count: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GroupInstance {
    pub group_id: GroupId,
    pub page: u32,
    pub centroid: Point,
    pub members: Vec<InstanceId>,
}

/// Composition to group type map; ids in first-seen order from 1.
#[derive(Debug, Default)]
pub struct GroupRegistry {
    by_composition: IndexMap<Vec<ShapeId>, GroupId>,
    definitions: Vec<GroupDefinition>,
}

impl GroupRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// `composition` must already be sorted.
    pub fn register(&mut self, composition: &[ShapeId]) -> GroupId {
        if let Some(&id) = self.by_composition.get(composition) {
            self.definitions[(id - 1) as usize].count += 1;
            return id;
        }
        let id = self.definitions.len() as GroupId + 1;
        trace!(target: GROUPING, group_id = id, ?composition, "new group definition");
        self.by_composition.insert(composition.to_vec(), id);
        self.definitions.push(GroupDefinition {
            id,
            composition: composition.to_vec(),
            count: 1,
        });
        id
    }

    /// Register `component` and build its group instance on `page`.
    pub fn place(&mut self, page: u32, component: Component) -> GroupInstance {
        let group_id = self.register(&component.composition);
        GroupInstance {
            group_id,
            page,
            centroid: component.centroid,
            members: component.members,
        }
    }

    pub fn get(&self, id: GroupId) -> Option<&GroupDefinition> {
        id.checked_sub(1)
            .and_then(|idx| self.definitions.get(idx as usize))
    }

    pub fn len(&self) -> usize {
        self.definitions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.definitions.is_empty()
    }

    pub fn into_definitions(self) -> Vec<GroupDefinition> {
        self.definitions
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn instance(instance_id: InstanceId, shape_id: ShapeId, x: f64) -> PageInstance {
        PageInstance {
            instance_id,
            shape_id,
            centroid: Point::new(x, 0.0),
        }
    }

    #[test]
    fn union_find_merges_transitively() {
        let mut sets = UnionFind::new(5);
        assert!(sets.union(0, 1));
        assert!(sets.union(3, 4));
        assert!(sets.union(1, 4));
        assert!(!sets.union(0, 3));
        assert_eq!(sets.find(0), sets.find(4));
        assert_ne!(sets.find(2), sets.find(0));
    }

    #[test]
    fn long_chains_do_not_recurse() {
        let n = 200_000;
        let mut sets = UnionFind::new(n);
        for i in 1..n {
            sets.union(i - 1, i);
        }
        assert_eq!(sets.find(0), sets.find(n - 1));
    }

    #[test]
    fn components_skip_unlinked_and_sort_members() {
        let instances = [
            instance(7, 2, 10.0),
            instance(3, 1, 0.0),
            instance(9, 1, 500.0),
            instance(5, 3, 20.0),
        ];
        let components = connected_components(&instances, &[(0, 1), (3, 0)], 2);
        assert_eq!(
            components,
            vec![Component {
                members: vec![3, 5, 7],
                composition: vec![1, 2, 3],
                centroid: Point::new(10.0, 0.0),
            }]
        );
    }

    #[test]
    fn min_group_size_filters_small_components() {
        let instances = [instance(1, 1, 0.0), instance(2, 2, 1.0), instance(3, 1, 2.0)];
        assert_eq!(connected_components(&instances, &[(0, 1)], 2).len(), 1);
        assert!(connected_components(&instances, &[(0, 1)], 3).is_empty());
    }

    #[test]
    fn compositions_dedupe_into_group_types() {
        let mut registry = GroupRegistry::new();
        assert_eq!(registry.register(&[1, 2]), 1);
        assert_eq!(registry.register(&[1, 1, 2]), 2);
        assert_eq!(registry.register(&[1, 2]), 1);
        assert_eq!(registry.get(1).map(|g| g.count), Some(2));
        assert_eq!(registry.len(), 2);
    }
}
