//! Bounding-volume hierarchy over static world objects
//!
//! The BVH is built once over the whole object table and traversed every
//! frame by the coarse culling stage. Construction physically permutes the
//! object table so that each leaf's objects occupy a contiguous range, then
//! flattens the ownership tree into a depth-first pre-order array: node `i`'s
//! first child always sits at `i + 1`, and interior nodes record only the
//! index of the second child. The build-time tree never survives past
//! flattening.

use crate::scene::StaticObject;
use crate::spatial::{BoundingSphere, Containment, Frustum};
use crate::foundation::math::Vec3;
use serde::{Deserialize, Serialize};

/// Recursion cap for pathological inputs (e.g. all-duplicate centroids).
/// Ranges still unsplit at this depth become forced leaves.
const MAX_BUILD_DEPTH: u32 = 64;

/// Rule for partitioning a node's object range into two children during
/// construction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SplitPolicy {
    /// Partition at the spatial midpoint of the widest centroid axis
    Middle,
    /// Partition at the index midpoint, ordering objects by centroid along
    /// the widest axis (balanced counts, not balanced volume)
    EqualCounts,
    /// 16-bucket volume-cost split: a cheaper surrogate for the surface-area
    /// heuristic that still approximates expected traversal cost
    VolumeHeuristic,
}

/// Configuration for BVH construction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BvhConfig {
    /// Maximum objects per leaf (the volume heuristic may force larger
    /// leaves when splitting costs more than not splitting)
    pub max_objects_per_leaf: u32,

    /// Partitioning rule
    pub split_policy: SplitPolicy,
}

impl Default for BvhConfig {
    fn default() -> Self {
        Self {
            max_objects_per_leaf: 1,
            split_policy: SplitPolicy::Middle,
        }
    }
}

/// Flattened BVH node in depth-first pre-order
///
/// `count > 0` marks a leaf: `offset` is the first slot of its object range
/// in the permuted object table. `count == 0` marks an interior node:
/// `offset` is the array index of its second child, and its first child is
/// implicitly the next array slot.
#[derive(Debug, Clone, Copy)]
pub struct LinearBvhNode {
    /// Merged bound of everything beneath this node
    pub bound: BoundingSphere,
    /// Object offset (leaf) or second-child index (interior)
    pub offset: u32,
    /// Number of objects; zero for interior nodes
    pub count: u32,
}

impl LinearBvhNode {
    /// Check if this node is a leaf
    pub fn is_leaf(&self) -> bool {
        self.count > 0
    }
}

/// Static bounding-volume hierarchy with a linearized query structure
#[derive(Debug, Clone, Default)]
pub struct Bvh {
    nodes: Vec<LinearBvhNode>,
}

impl Bvh {
    /// Build a BVH over `objects`, permuting the table in place so that each
    /// leaf's objects are contiguous
    ///
    /// An empty table produces an empty hierarchy. Panics if the table
    /// exceeds the `u32` index range; that is a scale/configuration error,
    /// not a runtime condition.
    pub fn build(objects: &mut Vec<StaticObject>, config: &BvhConfig) -> Self {
        assert!(config.max_objects_per_leaf >= 1, "leaf capacity must be at least 1");
        if objects.is_empty() {
            return Self { nodes: Vec::new() };
        }
        assert!(
            u32::try_from(objects.len()).is_ok(),
            "object table exceeds u32 index range"
        );

        let object_count = objects.len();
        let (root, ordered, total_nodes) = {
            let mut builder = Builder {
                info: objects
                    .iter()
                    .enumerate()
                    .map(|(index, object)| ObjectInfo {
                        bound: object.bounding_sphere(),
                        object_index: index as u32,
                    })
                    .collect(),
                objects: objects.as_slice(),
                ordered: Vec::with_capacity(object_count),
                total_nodes: 0,
                config: *config,
            };
            let root = builder.build_range(0, object_count, 0);
            (root, builder.ordered, builder.total_nodes)
        };
        debug_assert_eq!(ordered.len(), object_count);
        *objects = ordered;

        let mut nodes = Vec::with_capacity(total_nodes as usize);
        flatten(&root, &mut nodes);
        assert_eq!(
            nodes.len(),
            total_nodes as usize,
            "flattened node count must match build count"
        );

        log::debug!(
            "built BVH: {} objects, {} nodes, policy {:?}",
            objects.len(),
            nodes.len(),
            config.split_policy
        );
        Self { nodes }
    }

    /// Coarse cull: collect the indices (into the permuted object table) of
    /// every object whose leaf is not disjoint from the frustum
    ///
    /// Iterative stack-based traversal; the result may contain objects the
    /// exact per-object test would reject, which is why the fine pass exists.
    /// The order is unspecified but deterministic for a given tree + frustum.
    pub fn cull(&self, frustum: &Frustum) -> Vec<u32> {
        let mut visible = Vec::new();
        if self.nodes.is_empty() {
            return visible;
        }

        let mut to_visit = vec![0u32];
        while let Some(index) = to_visit.pop() {
            let node = &self.nodes[index as usize];
            if frustum.classify_sphere(&node.bound) == Containment::Disjoint {
                continue;
            }
            if node.is_leaf() {
                visible.extend(node.offset..node.offset + node.count);
            } else {
                to_visit.push(node.offset);
                // First child sits next in the array; visit it first for
                // cache locality.
                to_visit.push(index + 1);
            }
        }
        visible
    }

    /// Read-only view of the linearized node array (debug visualization)
    pub fn nodes(&self) -> &[LinearBvhNode] {
        &self.nodes
    }

    /// Number of nodes in the hierarchy
    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    /// Check if the hierarchy is empty
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Depth of every node, indexed like [`Bvh::nodes`]
    ///
    /// Used by debug renderers that draw node bounds colored by depth.
    pub fn node_depths(&self) -> Vec<u32> {
        let mut depths = vec![0u32; self.nodes.len()];
        if self.nodes.is_empty() {
            return depths;
        }
        let mut to_visit = vec![(0u32, 0u32)];
        while let Some((index, depth)) = to_visit.pop() {
            depths[index as usize] = depth;
            let node = &self.nodes[index as usize];
            if !node.is_leaf() {
                to_visit.push((node.offset, depth + 1));
                to_visit.push((index + 1, depth + 1));
            }
        }
        depths
    }
}

// Per-object build bookkeeping: the bound plus the object's slot in the
// original (pre-permutation) table.
#[derive(Clone, Copy)]
struct ObjectInfo {
    bound: BoundingSphere,
    object_index: u32,
}

// Build-time tree; parent owns children, dropped after flattening.
enum BuildNode {
    Leaf {
        bound: BoundingSphere,
        offset: u32,
        count: u32,
    },
    Interior {
        bound: BoundingSphere,
        children: [Box<BuildNode>; 2],
    },
}

impl BuildNode {
    fn bound(&self) -> &BoundingSphere {
        match self {
            Self::Leaf { bound, .. } | Self::Interior { bound, .. } => bound,
        }
    }
}

// Axis-aligned bound over the range's sphere centers; only used to pick the
// split axis and normalize bucket coordinates.
struct CentroidBounds {
    min: Vec3,
    max: Vec3,
}

impl CentroidBounds {
    fn from_range(info: &[ObjectInfo]) -> Self {
        let mut min = info[0].bound.center;
        let mut max = min;
        for object in &info[1..] {
            min = min.inf(&object.bound.center);
            max = max.sup(&object.bound.center);
        }
        Self { min, max }
    }

    fn widest_axis(&self) -> usize {
        let extent = self.max - self.min;
        if extent.x > extent.y && extent.x > extent.z {
            0
        } else if extent.y > extent.z {
            1
        } else {
            2
        }
    }

    fn midpoint(&self, axis: usize) -> f32 {
        (self.min[axis] + self.max[axis]) * 0.5
    }

    // Normalized position of `value` along `axis`, in [0, 1].
    fn offset_along(&self, axis: usize, value: f32) -> f32 {
        let extent = self.max[axis] - self.min[axis];
        if extent > f32::EPSILON {
            (value - self.min[axis]) / extent
        } else {
            0.0
        }
    }
}

struct Builder<'a> {
    info: Vec<ObjectInfo>,
    objects: &'a [StaticObject],
    ordered: Vec<StaticObject>,
    total_nodes: u32,
    config: BvhConfig,
}

impl Builder<'_> {
    fn build_range(&mut self, start: usize, end: usize, depth: u32) -> BuildNode {
        assert!(self.total_nodes < u32::MAX, "BVH node counter overflow");
        self.total_nodes += 1;

        let bound = self.info[start..end]
            .iter()
            .skip(1)
            .fold(self.info[start].bound, |merged, object| {
                BoundingSphere::merged(&merged, &object.bound)
            });

        let count = end - start;
        if count <= self.config.max_objects_per_leaf as usize || depth >= MAX_BUILD_DEPTH {
            return self.make_leaf(start, end, bound);
        }

        let centroids = CentroidBounds::from_range(&self.info[start..end]);
        let axis = centroids.widest_axis();

        let mid = match self.config.split_policy {
            SplitPolicy::Middle => {
                let pivot = centroids.midpoint(axis);
                start
                    + partition_in_place(&mut self.info[start..end], |object| {
                        object.bound.center[axis] < pivot
                    })
            }
            SplitPolicy::EqualCounts => {
                let mid = (start + end) / 2;
                self.info[start..end].select_nth_unstable_by(mid - start, |a, b| {
                    a.bound.center[axis].total_cmp(&b.bound.center[axis])
                });
                mid
            }
            SplitPolicy::VolumeHeuristic => {
                match self.volume_split(start, end, axis, &centroids, &bound) {
                    Some(mid) => mid,
                    None => return self.make_leaf(start, end, bound),
                }
            }
        };

        // A degenerate partition (every centroid on one side) would recurse
        // forever; fall back to the index midpoint.
        let mid = if mid == start || mid == end {
            (start + end) / 2
        } else {
            mid
        };

        let first = self.build_range(start, mid, depth + 1);
        let second = self.build_range(mid, end, depth + 1);
        BuildNode::Interior {
            bound: BoundingSphere::merged(first.bound(), second.bound()),
            children: [Box::new(first), Box::new(second)],
        }
    }

    // Append the range's objects, in their current order, to the permuted
    // output table and emit the leaf.
    fn make_leaf(&mut self, start: usize, end: usize, bound: BoundingSphere) -> BuildNode {
        let offset = self.ordered.len() as u32;
        for object in &self.info[start..end] {
            self.ordered.push(self.objects[object.object_index as usize]);
        }
        BuildNode::Leaf {
            bound,
            offset,
            count: (end - start) as u32,
        }
    }

    // 16-bucket volume-cost split. Returns the partition midpoint, or None
    // when terminating as a leaf is cheaper than the best split.
    fn volume_split(
        &mut self,
        start: usize,
        end: usize,
        axis: usize,
        centroids: &CentroidBounds,
        total_bound: &BoundingSphere,
    ) -> Option<usize> {
        const BUCKET_COUNT: usize = 16;

        let bucket_of = |object: &ObjectInfo| -> usize {
            let offset = centroids.offset_along(axis, object.bound.center[axis]);
            ((BUCKET_COUNT as f32 * offset) as usize).min(BUCKET_COUNT - 1)
        };

        let mut counts = [0usize; BUCKET_COUNT];
        let mut bounds: [Option<BoundingSphere>; BUCKET_COUNT] = [None; BUCKET_COUNT];
        for object in &self.info[start..end] {
            let bucket = bucket_of(object);
            counts[bucket] += 1;
            bounds[bucket] = Some(match bounds[bucket] {
                Some(existing) => BoundingSphere::merged(&existing, &object.bound),
                None => object.bound,
            });
        }

        // Cost of each of the 15 candidate splits between buckets:
        // 1 + (n0*r0^3 + n1*r1^3) / rT^3, a volume-proportional surrogate
        // for expected traversal cost.
        let side_cost = |range: std::ops::Range<usize>| -> f32 {
            let mut count = 0usize;
            let mut merged: Option<BoundingSphere> = None;
            for bucket in range {
                count += counts[bucket];
                if let Some(bound) = bounds[bucket] {
                    merged = Some(match merged {
                        Some(existing) => BoundingSphere::merged(&existing, &bound),
                        None => bound,
                    });
                }
            }
            let radius = merged.map_or(0.0, |bound| bound.radius);
            count as f32 * radius.powi(3)
        };

        let total_volume = total_bound.radius.powi(3);
        let (best_bucket, best_cost) = (0..BUCKET_COUNT - 1)
            .map(|split| {
                let cost =
                    1.0 + (side_cost(0..split + 1) + side_cost(split + 1..BUCKET_COUNT)) / total_volume;
                (split, cost)
            })
            .min_by(|a, b| a.1.total_cmp(&b.1))
            .unwrap_or((0, f32::INFINITY));

        let count = end - start;
        let leaf_cost = count as f32;
        if count > self.config.max_objects_per_leaf as usize || best_cost < leaf_cost {
            let mid = start
                + partition_in_place(&mut self.info[start..end], |object| {
                    bucket_of(object) <= best_bucket
                });
            Some(mid)
        } else {
            None
        }
    }
}

// Depth-first pre-order flattening; returns the node's own array index so
// the caller can record it as a second-child offset.
fn flatten(node: &BuildNode, nodes: &mut Vec<LinearBvhNode>) -> u32 {
    let my_index = nodes.len() as u32;
    match node {
        BuildNode::Leaf { bound, offset, count } => {
            nodes.push(LinearBvhNode {
                bound: *bound,
                offset: *offset,
                count: *count,
            });
        }
        BuildNode::Interior { bound, children } => {
            nodes.push(LinearBvhNode {
                bound: *bound,
                offset: 0,
                count: 0,
            });
            flatten(&children[0], nodes);
            let second = flatten(&children[1], nodes);
            nodes[my_index as usize].offset = second;
        }
    }
    my_index
}

// Two-pointer partition; returns the number of elements satisfying `pred`,
// which end up in the slice's prefix.
fn partition_in_place<T>(slice: &mut [T], mut pred: impl FnMut(&T) -> bool) -> usize {
    let mut first = 0;
    for i in 0..slice.len() {
        if pred(&slice[i]) {
            slice.swap(first, i);
            first += 1;
        }
    }
    first
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::foundation::math::Quat;
    use rand::{rngs::StdRng, Rng, SeedableRng};

    fn object_at(position: Vec3, radius: f32, color: u32) -> StaticObject {
        StaticObject::new(position, Quat::identity(), radius, 0, 0, color)
    }

    fn four_spread_objects() -> Vec<StaticObject> {
        vec![
            object_at(Vec3::new(0.0, 0.0, 0.0), 1.0, 0),
            object_at(Vec3::new(100.0, 0.0, 0.0), 1.0, 1),
            object_at(Vec3::new(0.0, 100.0, 0.0), 1.0, 2),
            object_at(Vec3::new(0.0, 0.0, 100.0), 1.0, 3),
        ]
    }

    fn random_objects(count: usize, seed: u64) -> Vec<StaticObject> {
        let mut rng = StdRng::seed_from_u64(seed);
        (0..count)
            .map(|i| {
                object_at(
                    Vec3::new(
                        rng.gen_range(-2000.0..2000.0),
                        rng.gen_range(-2000.0..2000.0),
                        rng.gen_range(-2000.0..2000.0),
                    ),
                    rng.gen_range(10.0..50.0),
                    i as u32,
                )
            })
            .collect()
    }

    #[test]
    fn test_empty_build_and_cull() {
        let mut objects = Vec::new();
        let bvh = Bvh::build(&mut objects, &BvhConfig::default());
        assert!(bvh.is_empty());
        assert!(bvh
            .cull(&Frustum::axis_aligned_box(Vec3::zeros(), 1000.0))
            .is_empty());
    }

    #[test]
    fn test_four_objects_single_object_leaves() {
        let mut objects = four_spread_objects();
        let bvh = Bvh::build(&mut objects, &BvhConfig::default());

        // 4 leaves + 3 interior nodes.
        assert_eq!(bvh.node_count(), 7);
        let leaves: Vec<_> = bvh.nodes().iter().filter(|node| node.is_leaf()).collect();
        assert_eq!(leaves.len(), 4);
        assert!(leaves.iter().all(|leaf| leaf.count == 1));
    }

    #[test]
    fn test_preorder_layout_and_flatten_fidelity() {
        for policy in [
            SplitPolicy::Middle,
            SplitPolicy::EqualCounts,
            SplitPolicy::VolumeHeuristic,
        ] {
            let mut objects = random_objects(257, 7);
            let config = BvhConfig {
                max_objects_per_leaf: 4,
                split_policy: policy,
            };
            let bvh = Bvh::build(&mut objects, &config);

            // Every interior node's second-child offset must land inside the
            // array, strictly past the first child at i + 1.
            for (index, node) in bvh.nodes().iter().enumerate() {
                if !node.is_leaf() {
                    assert!(node.offset as usize > index + 1);
                    assert!((node.offset as usize) < bvh.node_count());
                }
            }
        }
    }

    #[test]
    fn test_permutation_preserves_object_set() {
        for policy in [
            SplitPolicy::Middle,
            SplitPolicy::EqualCounts,
            SplitPolicy::VolumeHeuristic,
        ] {
            let mut objects = random_objects(100, 11);
            Bvh::build(
                &mut objects,
                &BvhConfig {
                    max_objects_per_leaf: 2,
                    split_policy: policy,
                },
            );
            let mut colors: Vec<u32> = objects.iter().map(|object| object.color).collect();
            colors.sort_unstable();
            assert_eq!(colors, (0..100).collect::<Vec<u32>>());
        }
    }

    #[test]
    fn test_leaf_bound_property() {
        for policy in [SplitPolicy::Middle, SplitPolicy::EqualCounts] {
            let mut objects = random_objects(500, 3);
            let config = BvhConfig {
                max_objects_per_leaf: 8,
                split_policy: policy,
            };
            let bvh = Bvh::build(&mut objects, &config);
            for node in bvh.nodes() {
                if node.is_leaf() {
                    assert!(node.count <= config.max_objects_per_leaf);
                }
            }
        }
    }

    #[test]
    fn test_containment_invariant() {
        for policy in [
            SplitPolicy::Middle,
            SplitPolicy::EqualCounts,
            SplitPolicy::VolumeHeuristic,
        ] {
            let mut objects = random_objects(300, 5);
            let bvh = Bvh::build(
                &mut objects,
                &BvhConfig {
                    max_objects_per_leaf: 4,
                    split_policy: policy,
                },
            );

            for (index, node) in bvh.nodes().iter().enumerate() {
                if node.is_leaf() {
                    for object in &objects[node.offset as usize..(node.offset + node.count) as usize] {
                        assert!(node.bound.contains(&object.bounding_sphere()));
                    }
                } else {
                    let first = &bvh.nodes()[index + 1];
                    let second = &bvh.nodes()[node.offset as usize];
                    assert!(node.bound.contains(&first.bound));
                    assert!(node.bound.contains(&second.bound));
                }
            }
        }
    }

    #[test]
    fn test_duplicate_centroids_terminate() {
        // Every centroid identical: Middle's partition degenerates and the
        // index-midpoint fallback must still terminate.
        let mut objects: Vec<StaticObject> = (0..33)
            .map(|i| object_at(Vec3::new(1.0, 2.0, 3.0), 5.0, i))
            .collect();
        let bvh = Bvh::build(&mut objects, &BvhConfig::default());
        let leaf_total: u32 = bvh
            .nodes()
            .iter()
            .filter(|node| node.is_leaf())
            .map(|node| node.count)
            .sum();
        assert_eq!(leaf_total, 33);
    }

    #[test]
    fn test_coarse_cull_soundness() {
        let mut objects = random_objects(1000, 13);
        let bvh = Bvh::build(
            &mut objects,
            &BvhConfig {
                max_objects_per_leaf: 4,
                split_policy: SplitPolicy::VolumeHeuristic,
            },
        );

        let frustum = Frustum::axis_aligned_box(Vec3::new(500.0, 0.0, -300.0), 800.0);
        let candidates = bvh.cull(&frustum);

        // Every object the exact test accepts must be in the candidate set.
        let candidate_set: std::collections::HashSet<u32> = candidates.into_iter().collect();
        for (index, object) in objects.iter().enumerate() {
            if frustum.intersects_sphere(&object.bounding_sphere()) {
                assert!(
                    candidate_set.contains(&(index as u32)),
                    "coarse cull dropped a visible object"
                );
            }
        }
    }

    #[test]
    fn test_cull_prunes_at_disjoint_root() {
        let mut objects = four_spread_objects();
        let bvh = Bvh::build(&mut objects, &BvhConfig::default());

        let far_away = Frustum::axis_aligned_box(Vec3::new(10000.0, 0.0, 0.0), 1000.0);
        assert_eq!(
            far_away.classify_sphere(&bvh.nodes()[0].bound),
            Containment::Disjoint
        );
        assert!(bvh.cull(&far_away).is_empty());
    }

    #[test]
    fn test_cull_is_deterministic() {
        let mut objects = random_objects(200, 17);
        let bvh = Bvh::build(&mut objects, &BvhConfig::default());
        let frustum = Frustum::axis_aligned_box(Vec3::zeros(), 1500.0);
        assert_eq!(bvh.cull(&frustum), bvh.cull(&frustum));
    }

    #[test]
    fn test_node_depths() {
        let mut objects = four_spread_objects();
        let bvh = Bvh::build(&mut objects, &BvhConfig::default());
        let depths = bvh.node_depths();
        assert_eq!(depths.len(), 7);
        assert_eq!(depths[0], 0);
        assert!(depths.iter().skip(1).all(|&depth| depth >= 1));
    }
}
