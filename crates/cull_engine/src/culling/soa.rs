//! Structure-of-arrays culling engine
//!
//! Candidate bounding spheres are loaded into parallel column arrays
//! (`x`, `y`, `z`, `radius`) so the six plane tests can run over contiguous
//! lanes. A sphere survives exactly when, for every plane,
//! `plane.distance + normal · center < radius` — the sign convention makes
//! "outside" positive, so one fully-outside plane culls the sphere.
//!
//! Three paths produce identical results: a scalar reference loop, an
//! 8-lane [`wide::f32x8`] batch loop with a scalar tail, and a partitioned
//! variant that runs the batch loop per chunk on an injected worker pool.

use crate::spatial::{BoundingSphere, Frustum, Plane};
use rayon::prelude::*;
use wide::{f32x8, CmpEq, CmpLt};

/// Number of lanes in one vector batch
pub const LANES: usize = 8;

/// Fixed-capacity SoA scratch buffers for the fine culling pass
///
/// The columns are allocated once and never grown; they are fully rewritten
/// every tick up to the logical length, and entries past it are stale and
/// never read. Candidates beyond capacity are dropped (degraded visibility,
/// not an error) — size the capacity to the worst expected candidate count
/// per tick, or chunk on the caller side.
#[derive(Debug)]
pub struct CullingSoa {
    x: Vec<f32>,
    y: Vec<f32>,
    z: Vec<f32>,
    radius: Vec<f32>,
    visible: Vec<bool>,
    len: usize,
    capacity: usize,
    dropped: usize,
}

impl CullingSoa {
    /// Allocate column buffers for at most `capacity` candidates
    pub fn new(capacity: usize) -> Self {
        Self {
            x: vec![0.0; capacity],
            y: vec![0.0; capacity],
            z: vec![0.0; capacity],
            radius: vec![0.0; capacity],
            visible: vec![false; capacity],
            len: 0,
            capacity,
            dropped: 0,
        }
    }

    /// Maximum number of candidates per tick
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Logical size after the most recent load
    pub fn len(&self) -> usize {
        self.len
    }

    /// Check if the most recent load was empty
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Candidates dropped by the most recent load because they exceeded
    /// capacity
    pub fn dropped_last_tick(&self) -> usize {
        self.dropped
    }

    /// Scalar reference path: test every candidate against every plane, one
    /// object at a time
    ///
    /// Returns the indices into `spheres` that pass, in ascending order.
    pub fn cull_scalar(&mut self, spheres: &[BoundingSphere], frustum: &Frustum) -> Vec<usize> {
        self.load(spheres);
        let planes = &frustum.planes;
        for i in 0..self.len {
            self.visible[i] = planes.iter().all(|plane| {
                plane.distance
                    + plane.normal.x * self.x[i]
                    + plane.normal.y * self.y[i]
                    + plane.normal.z * self.z[i]
                    < self.radius[i]
            });
        }
        self.compact()
    }

    /// Vector batch path: 8 lanes of each column per step, with a scalar
    /// remainder loop for the tail
    ///
    /// Agrees with [`CullingSoa::cull_scalar`] for every input.
    pub fn cull_simd(&mut self, spheres: &[BoundingSphere], frustum: &Frustum) -> Vec<usize> {
        self.load(spheres);
        let len = self.len;
        cull_chunk(
            &self.x[..len],
            &self.y[..len],
            &self.z[..len],
            &self.radius[..len],
            &mut self.visible[..len],
            &frustum.planes,
        );
        self.compact()
    }

    /// Partitioned vector path: the logical size is divided into `chunks`
    /// contiguous ranges, each tested independently on `pool`, joining
    /// before compaction
    ///
    /// Chunk sizes use a ceiling division so trailing objects are always
    /// covered — no candidate is lost when the size does not divide evenly.
    pub fn cull_parallel(
        &mut self,
        spheres: &[BoundingSphere],
        frustum: &Frustum,
        pool: &rayon::ThreadPool,
        chunks: usize,
    ) -> Vec<usize> {
        self.load(spheres);
        let len = self.len;
        if len == 0 {
            return Vec::new();
        }

        let chunk_len = len.div_ceil(chunks.max(1));
        let planes = frustum.planes;
        let Self {
            x,
            y,
            z,
            radius,
            visible,
            ..
        } = self;

        pool.install(|| {
            visible[..len]
                .par_chunks_mut(chunk_len)
                .enumerate()
                .for_each(|(chunk_index, chunk_visible)| {
                    let from = chunk_index * chunk_len;
                    let to = from + chunk_visible.len();
                    cull_chunk(
                        &x[from..to],
                        &y[from..to],
                        &z[from..to],
                        &radius[from..to],
                        chunk_visible,
                        &planes,
                    );
                });
        });

        self.compact()
    }

    // Refill the columns from the candidate list, clamping to capacity.
    fn load(&mut self, spheres: &[BoundingSphere]) {
        self.len = spheres.len().min(self.capacity);
        self.dropped = spheres.len() - self.len;
        if self.dropped > 0 {
            log::warn!(
                "culling SoA over capacity: dropped {} of {} candidates",
                self.dropped,
                spheres.len()
            );
        }
        for (i, sphere) in spheres[..self.len].iter().enumerate() {
            self.x[i] = sphere.center.x;
            self.y[i] = sphere.center.y;
            self.z[i] = sphere.center.z;
            self.radius[i] = sphere.radius;
        }
    }

    // Emit the indices whose visibility flag is set, ascending.
    fn compact(&self) -> Vec<usize> {
        (0..self.len).filter(|&i| self.visible[i]).collect()
    }
}

// Plane-test kernel over one contiguous chunk of the columns. Shared by the
// single-threaded SIMD path and by each worker partition.
fn cull_chunk(
    x: &[f32],
    y: &[f32],
    z: &[f32],
    radius: &[f32],
    visible: &mut [bool],
    planes: &[Plane; 6],
) {
    let len = visible.len();
    let aligned = len - len % LANES;

    let mut i = 0;
    while i < aligned {
        let mut mask = f32x8::ZERO.cmp_eq(f32x8::ZERO);
        for plane in planes {
            // 3 multiplies, 3 adds, 1 compare per plane.
            let mut distance = f32x8::splat(plane.distance);
            distance += f32x8::from(&x[i..i + LANES]) * f32x8::splat(plane.normal.x);
            distance += f32x8::from(&y[i..i + LANES]) * f32x8::splat(plane.normal.y);
            distance += f32x8::from(&z[i..i + LANES]) * f32x8::splat(plane.normal.z);
            mask &= distance.cmp_lt(f32x8::from(&radius[i..i + LANES]));
        }
        let lanes = mask.to_array();
        for (lane, value) in lanes.iter().enumerate() {
            visible[i + lane] = value.to_bits() != 0;
        }
        i += LANES;
    }

    for i in aligned..len {
        visible[i] = planes.iter().all(|plane| {
            plane.distance + plane.normal.x * x[i] + plane.normal.y * y[i] + plane.normal.z * z[i]
                < radius[i]
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::foundation::math::{Mat4, Mat4Ext, Vec3};
    use rand::{rngs::StdRng, Rng, SeedableRng};

    fn random_spheres(count: usize, seed: u64) -> Vec<BoundingSphere> {
        let mut rng = StdRng::seed_from_u64(seed);
        (0..count)
            .map(|_| {
                BoundingSphere::new(
                    Vec3::new(
                        rng.gen_range(-1500.0..1500.0),
                        rng.gen_range(-1500.0..1500.0),
                        rng.gen_range(-1500.0..1500.0),
                    ),
                    rng.gen_range(1.0..50.0),
                )
            })
            .collect()
    }

    fn perspective_frustum() -> Frustum {
        let view = Mat4::look_at(
            Vec3::new(0.0, 100.0, -500.0),
            Vec3::zeros(),
            Vec3::new(0.0, 1.0, 0.0),
        );
        let proj = Mat4::perspective(std::f32::consts::FRAC_PI_2, 16.0 / 9.0, 0.1, 2000.0);
        Frustum::from_view_projection(&(proj * view))
    }

    fn test_pool(threads: usize) -> rayon::ThreadPool {
        rayon::ThreadPoolBuilder::new()
            .num_threads(threads)
            .build()
            .unwrap()
    }

    #[test]
    fn test_scalar_and_simd_agree() {
        let frustum = perspective_frustum();
        // Lengths around the batch width, including exact multiples and tails.
        for count in [0, 1, 3, 7, 8, 9, 16, 17, 100, 1000] {
            let spheres = random_spheres(count, count as u64);
            let mut soa = CullingSoa::new(2048);
            let scalar = soa.cull_scalar(&spheres, &frustum);
            let simd = soa.cull_simd(&spheres, &frustum);
            assert_eq!(scalar, simd, "paths diverged at {count} candidates");
        }
    }

    #[test]
    fn test_scalar_and_simd_agree_on_box_frustum() {
        let frustum = Frustum::axis_aligned_box(Vec3::new(200.0, -100.0, 0.0), 900.0);
        let spheres = random_spheres(500, 99);
        let mut soa = CullingSoa::new(512);
        assert_eq!(
            soa.cull_scalar(&spheres, &frustum),
            soa.cull_simd(&spheres, &frustum)
        );
    }

    #[test]
    fn test_no_lost_objects_under_partitioning() {
        // 17 objects over 4 chunks: 17 % 4 != 0, so the remainder must still
        // be tested. All 17 sit inside the frustum.
        let frustum = Frustum::axis_aligned_box(Vec3::zeros(), 1000.0);
        let spheres: Vec<BoundingSphere> = (0..17)
            .map(|i| BoundingSphere::new(Vec3::new(i as f32 * 10.0, 0.0, 0.0), 1.0))
            .collect();

        let pool = test_pool(4);
        let mut soa = CullingSoa::new(64);
        let parallel = soa.cull_parallel(&spheres, &frustum, &pool, 4);
        assert_eq!(parallel, (0..17).collect::<Vec<usize>>());
    }

    #[test]
    fn test_partitioned_matches_single_threaded() {
        let frustum = perspective_frustum();
        let spheres = random_spheres(1037, 21);
        let pool = test_pool(4);

        for chunks in [1, 2, 3, 4, 7, 16] {
            let mut soa = CullingSoa::new(2048);
            let scalar = soa.cull_scalar(&spheres, &frustum);
            let parallel = soa.cull_parallel(&spheres, &frustum, &pool, chunks);
            assert_eq!(scalar, parallel, "partitioning into {chunks} chunks lost objects");
        }
    }

    #[test]
    fn test_over_capacity_drops_tail() {
        let frustum = Frustum::axis_aligned_box(Vec3::zeros(), 1000.0);
        let spheres: Vec<BoundingSphere> = (0..12)
            .map(|i| BoundingSphere::new(Vec3::new(i as f32, 0.0, 0.0), 1.0))
            .collect();

        let mut soa = CullingSoa::new(8);
        let result = soa.cull_scalar(&spheres, &frustum);
        assert_eq!(result, (0..8).collect::<Vec<usize>>());
        assert_eq!(soa.dropped_last_tick(), 4);
    }

    #[test]
    fn test_result_is_ascending() {
        let frustum = perspective_frustum();
        let spheres = random_spheres(300, 5);
        let mut soa = CullingSoa::new(512);
        let result = soa.cull_simd(&spheres, &frustum);
        assert!(result.windows(2).all(|pair| pair[0] < pair[1]));
    }

    #[test]
    fn test_sphere_on_plane_boundary() {
        // Center exactly on a plane: distance 0 < radius, so it survives;
        // center outside by exactly the radius does not.
        let frustum = Frustum::axis_aligned_box(Vec3::zeros(), 100.0);
        let on_boundary = vec![BoundingSphere::new(Vec3::new(100.0, 0.0, 0.0), 5.0)];
        let outside = vec![BoundingSphere::new(Vec3::new(105.0, 0.0, 0.0), 5.0)];

        let mut soa = CullingSoa::new(8);
        assert_eq!(soa.cull_scalar(&on_boundary, &frustum), vec![0]);
        assert!(soa.cull_scalar(&outside, &frustum).is_empty());
    }
}
