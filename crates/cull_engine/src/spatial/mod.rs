//! Spatial partitioning and visibility volumes
//!
//! Provides the bounding volumes, frustum geometry, and the bounding-volume
//! hierarchy used by the coarse culling stage.

mod bounds;
mod bvh;

pub use bounds::{BoundingSphere, Containment, Frustum, Plane};
pub use bvh::{Bvh, BvhConfig, LinearBvhNode, SplitPolicy};
