//! Scene management and per-frame orchestration
//!
//! Owns the static object table and drives the two culling stages each tick:
//!
//! ```text
//! Camera ──► Frustum ──► BVH traversal ──► SoA plane test ──► Instances
//! ```
//!
//! The object table is immutable after population; rebuilding the BVH
//! permutes it wholesale and invalidates every cached world transform.

mod camera;
mod static_object;
mod world_system;

pub use camera::Camera;
pub use static_object::{Instance, InstanceData, StaticObject};
pub use world_system::{generate_random, WorldError, WorldSystem};
