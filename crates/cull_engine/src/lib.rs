//! # Cull Engine
//!
//! A two-stage frustum culling engine for large static worlds.
//!
//! Tens of thousands of static objects are tested against the camera frustum
//! every frame in two stages:
//!
//! 1. **Coarse cull** — a bounding-volume hierarchy built once over the whole
//!    object table is traversed per frame, pruning entire spatial regions.
//! 2. **Fine cull** — the surviving candidates are re-tested exactly against
//!    the six frustum planes in a structure-of-arrays layout, processed in
//!    SIMD batches and optionally fanned out across a fixed worker pool.
//!
//! ```text
//! StaticObject table ──► BVH traversal ──► candidate indices
//!                                              │
//!                                              ▼
//!                        SoA plane test ──► surviving indices ──► Instances
//! ```
//!
//! The [`scene::WorldSystem`] orchestrator owns the object table and drives
//! both stages each tick, emitting one [`scene::Instance`] per visible object
//! for the rendering backend to upload.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use cull_engine::prelude::*;
//!
//! let config = CullingConfig::default();
//! let mut world = WorldSystem::new(&config)?;
//! world.populate_random(&WorldGenConfig::default(), 42, &config.bvh);
//!
//! let camera = Camera::perspective(Vec3::new(0.0, 50.0, -200.0), 75.0, 16.0 / 9.0, 0.1, 4000.0);
//! let instances = world.tick(&camera);
//! # Ok::<(), cull_engine::scene::WorldError>(())
//! ```

#![warn(missing_docs)]
#![warn(clippy::all, clippy::pedantic, clippy::nursery)]
#![allow(clippy::module_name_repetitions, clippy::similar_names, clippy::too_many_arguments)]

pub mod core;
pub mod culling;
pub mod foundation;
pub mod scene;
pub mod spatial;

/// Common imports for engine users
pub mod prelude {
    pub use crate::{
        core::config::{Config, ConfigError, CullingConfig, WorldGenConfig},
        culling::CullingSoa,
        foundation::math::{Mat4, Quat, Vec3},
        scene::{Camera, Instance, StaticObject, WorldError, WorldSystem},
        spatial::{BoundingSphere, Bvh, BvhConfig, Frustum, SplitPolicy},
    };
}
