//! # World System
//!
//! Per-frame orchestrator for the two-stage culling pipeline. Owns the
//! static object table, the BVH over it, the SoA scratch buffers, and the
//! worker pool, and turns a camera into the frame's visible instance list:
//!
//! 1. derive the frustum from the camera,
//! 2. coarse cull against the BVH to collect candidate indices,
//! 3. fine cull the candidate spheres on the worker pool,
//! 4. remap surviving sub-indices back through the candidate list and emit
//!    one [`Instance`] per survivor from the cached world transforms.
//!
//! World transforms are computed once per (re)build, not per frame; the
//! BVH permutes the object table, so the transform cache is rebuilt right
//! after it.

use crate::core::config::{CullingConfig, WorldGenConfig};
use crate::foundation::math::{Mat4, Quat, Vec3};
use crate::scene::{Camera, Instance, StaticObject};
use crate::spatial::{Bvh, BvhConfig, Frustum, LinearBvhNode};
use crate::culling::CullingSoa;
use rand::{rngs::StdRng, Rng, SeedableRng};

/// World system errors
#[derive(thiserror::Error, Debug)]
pub enum WorldError {
    /// Worker pool construction failed
    #[error("Failed to build culling worker pool: {0}")]
    ThreadPool(#[from] rayon::ThreadPoolBuildError),
}

/// Owner of the static world and driver of the per-frame culling pipeline
pub struct WorldSystem {
    objects: Vec<StaticObject>,
    world_matrices: Vec<Mat4>,
    bvh: Bvh,
    soa: CullingSoa,
    pool: rayon::ThreadPool,
    worker_threads: usize,
}

impl WorldSystem {
    /// Create an empty world with the given pipeline configuration
    ///
    /// The worker pool is built once here and reused for every tick.
    pub fn new(config: &CullingConfig) -> Result<Self, WorldError> {
        let worker_threads = config.worker_threads.max(1);
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(worker_threads)
            .thread_name(|i| format!("cull-worker-{i}"))
            .build()?;

        log::info!(
            "World system initialized: SoA capacity {}, {} worker threads",
            config.soa_capacity,
            worker_threads
        );

        Ok(Self {
            objects: Vec::new(),
            world_matrices: Vec::new(),
            bvh: Bvh::default(),
            soa: CullingSoa::new(config.soa_capacity),
            pool,
            worker_threads,
        })
    }

    /// Replace the world contents and build the hierarchy over them
    pub fn populate(&mut self, objects: Vec<StaticObject>, bvh_config: &BvhConfig) {
        self.objects = objects;
        self.rebuild(bvh_config);
    }

    /// Populate with procedurally generated objects
    pub fn populate_random(
        &mut self,
        gen_config: &WorldGenConfig,
        seed: u64,
        bvh_config: &BvhConfig,
    ) {
        self.populate(generate_random(gen_config, seed), bvh_config);
    }

    /// Rebuild the hierarchy and the world-transform cache in place
    ///
    /// Construction permutes the object table, so every cached transform is
    /// recomputed afterwards. Call this after changing split parameters.
    pub fn rebuild(&mut self, bvh_config: &BvhConfig) {
        self.bvh = Bvh::build(&mut self.objects, bvh_config);
        self.world_matrices = self
            .objects
            .iter()
            .map(StaticObject::world_matrix)
            .collect();
        log::info!(
            "World rebuilt: {} objects, {} BVH nodes",
            self.objects.len(),
            self.bvh.node_count()
        );
    }

    /// Run both culling stages for the camera's current frustum and emit the
    /// frame's visible instances
    pub fn tick(&mut self, camera: &Camera) -> Vec<Instance> {
        self.tick_with_frustum(&camera.frustum())
    }

    /// [`WorldSystem::tick`] with an explicit frustum (debug tooling freezes
    /// the frustum while the camera keeps moving)
    pub fn tick_with_frustum(&mut self, frustum: &Frustum) -> Vec<Instance> {
        let candidates = self.bvh.cull(frustum);

        let spheres: Vec<_> = candidates
            .iter()
            .map(|&index| self.objects[index as usize].bounding_sphere())
            .collect();

        let survivors = self
            .soa
            .cull_parallel(&spheres, frustum, &self.pool, self.worker_threads);

        let instances: Vec<Instance> = survivors
            .into_iter()
            .map(|sub| {
                let index = candidates[sub] as usize;
                let object = &self.objects[index];
                Instance {
                    world: self.world_matrices[index],
                    geometry_index: object.geometry_index,
                    material_index: object.material_index,
                    color: object.color,
                }
            })
            .collect();

        log::trace!(
            "tick: {} candidates, {} visible",
            candidates.len(),
            instances.len()
        );
        instances
    }

    /// Number of objects in the world
    pub fn object_count(&self) -> u32 {
        self.objects.len() as u32
    }

    /// Read-only view of the (permuted) object table
    pub fn objects(&self) -> &[StaticObject] {
        &self.objects
    }

    /// Linearized BVH nodes, for debug visualization
    pub fn linear_tree(&self) -> &[LinearBvhNode] {
        self.bvh.nodes()
    }

    /// Per-node depths matching [`WorldSystem::linear_tree`]
    pub fn node_depths(&self) -> Vec<u32> {
        self.bvh.node_depths()
    }

    /// Candidates dropped by the most recent tick because the SoA buffers
    /// were over capacity
    pub fn last_dropped(&self) -> usize {
        self.soa.dropped_last_tick()
    }
}

/// Generate a uniformly scattered object field
///
/// Deterministic for a given config and seed. Colors pack random RGB with
/// full alpha.
pub fn generate_random(config: &WorldGenConfig, seed: u64) -> Vec<StaticObject> {
    let mut rng = StdRng::seed_from_u64(seed);
    let extent = config.half_extent;

    (0..config.object_count)
        .map(|_| {
            let position = Vec3::new(
                rng.gen_range(-extent..=extent),
                rng.gen_range(-extent..=extent),
                rng.gen_range(-extent..=extent),
            );
            let rotation = Quat::from_euler_angles(
                rng.gen_range(0.0..std::f32::consts::TAU),
                rng.gen_range(0.0..std::f32::consts::TAU),
                rng.gen_range(0.0..std::f32::consts::TAU),
            );
            let scale = rng.gen_range(config.scale_min..=config.scale_max);

            let r: u32 = rng.gen_range(0..256);
            let g: u32 = rng.gen_range(0..256);
            let b: u32 = rng.gen_range(0..256);
            let color = (r << 24) | (g << 16) | (b << 8) | 0xff;

            StaticObject::new(
                position,
                rotation,
                scale,
                rng.gen_range(0..config.geometry_count),
                rng.gen_range(0..config.material_count),
                color,
            )
        })
        .collect()
}
