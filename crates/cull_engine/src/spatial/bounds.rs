//! Bounding volumes and frustum geometry
//!
//! Spheres are the only bounding volume the pipeline carries per object: an
//! object's sphere is centered at its position with radius equal to its
//! uniform scale, and interior BVH nodes merge their children's spheres.
//! The frustum is six outward-facing half-space planes extracted from the
//! camera's view-projection matrix.

use crate::foundation::math::{Mat4, Vec3};

/// Bounding sphere (center + radius)
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BoundingSphere {
    /// Sphere center in world space
    pub center: Vec3,
    /// Sphere radius
    pub radius: f32,
}

impl BoundingSphere {
    /// Create a new bounding sphere
    pub fn new(center: Vec3, radius: f32) -> Self {
        Self { center, radius }
    }

    /// Smallest sphere enclosing both `a` and `b`
    ///
    /// If one sphere already contains the other, that sphere is returned
    /// unchanged.
    pub fn merged(a: &Self, b: &Self) -> Self {
        let offset = b.center - a.center;
        let distance = offset.magnitude();

        if distance + b.radius <= a.radius {
            return *a;
        }
        if distance + a.radius <= b.radius {
            return *b;
        }

        let radius = (distance + a.radius + b.radius) * 0.5;
        let center = if distance > f32::EPSILON {
            a.center + offset * ((radius - a.radius) / distance)
        } else {
            a.center
        };
        Self { center, radius }
    }

    /// Check whether `other` lies entirely inside this sphere (with a small
    /// tolerance for accumulated merge error)
    pub fn contains(&self, other: &Self) -> bool {
        let distance = (other.center - self.center).magnitude();
        distance + other.radius <= self.radius + 1e-3
    }
}

/// Half-space plane with the normal pointing **out** of the frustum
///
/// The signed distance of a point is positive outside the frustum, so a
/// sphere survives a plane exactly when `signed_distance(center) < radius`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Plane {
    /// Unit normal, pointing away from the frustum interior
    pub normal: Vec3,
    /// Signed distance term: `normal · p + distance = 0` on the plane
    pub distance: f32,
}

impl Plane {
    /// Create a plane from an (unnormalized) normal and distance term,
    /// normalizing both so signed distances are metric
    pub fn new(normal: Vec3, distance: f32) -> Self {
        let length = normal.magnitude();
        Self {
            normal: normal / length,
            distance: distance / length,
        }
    }

    /// Signed distance from the plane to a point (positive = outside)
    pub fn signed_distance(&self, point: Vec3) -> f32 {
        self.normal.dot(&point) + self.distance
    }
}

/// Result of classifying a bound against the frustum
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Containment {
    /// Entirely outside at least one plane
    Disjoint,
    /// Straddles the frustum boundary
    Intersects,
    /// Entirely inside all six planes
    Contains,
}

/// The six-plane convex region visible to a camera
#[derive(Debug, Clone, PartialEq)]
pub struct Frustum {
    /// Outward-facing planes: left, right, bottom, top, near, far
    pub planes: [Plane; 6],
}

impl Frustum {
    /// Create a frustum from six outward-facing planes
    pub fn from_planes(planes: [Plane; 6]) -> Self {
        Self { planes }
    }

    /// Extract frustum planes from a view-projection matrix
    ///
    /// Uses the Gribb-Hartmann method for a `[0, 1]` depth range (the
    /// convention of [`crate::foundation::math::Mat4Ext::perspective`]).
    /// The extracted planes are normalized and flipped to face outward.
    pub fn from_view_projection(view_projection: &Mat4) -> Self {
        let m = view_projection;
        let r0 = m.row(0);
        let r1 = m.row(1);
        let r2 = m.row(2);
        let r3 = m.row(3);

        // Inward-facing combinations; near is row 2 alone for [0,1] depth.
        let left = r3 + r0;
        let right = r3 - r0;
        let bottom = r3 + r1;
        let top = r3 - r1;
        let near = r2.into_owned();
        let far = r3 - r2;

        let outward = |row: nalgebra::RowVector4<f32>| {
            Plane::new(Vec3::new(-row[0], -row[1], -row[2]), -row[3])
        };

        Self {
            planes: [
                outward(left),
                outward(right),
                outward(bottom),
                outward(top),
                outward(near),
                outward(far),
            ],
        }
    }

    /// Axis-aligned box "frustum" with the given half extent
    ///
    /// Used by the debug UI and tests; behaves like an all-encompassing
    /// camera volume around `center`.
    pub fn axis_aligned_box(center: Vec3, half_extent: f32) -> Self {
        let face = |normal: Vec3| Plane::new(normal, -(normal.dot(&center) + half_extent));
        Self {
            planes: [
                face(Vec3::new(-1.0, 0.0, 0.0)),
                face(Vec3::new(1.0, 0.0, 0.0)),
                face(Vec3::new(0.0, -1.0, 0.0)),
                face(Vec3::new(0.0, 1.0, 0.0)),
                face(Vec3::new(0.0, 0.0, -1.0)),
                face(Vec3::new(0.0, 0.0, 1.0)),
            ],
        }
    }

    /// Three-way classification of a sphere against the frustum
    pub fn classify_sphere(&self, sphere: &BoundingSphere) -> Containment {
        let mut intersects = false;
        for plane in &self.planes {
            let distance = plane.signed_distance(sphere.center);
            if distance >= sphere.radius {
                return Containment::Disjoint;
            }
            if distance > -sphere.radius {
                intersects = true;
            }
        }
        if intersects {
            Containment::Intersects
        } else {
            Containment::Contains
        }
    }

    /// Check whether a sphere is at least partially inside the frustum
    pub fn intersects_sphere(&self, sphere: &BoundingSphere) -> bool {
        self.classify_sphere(sphere) != Containment::Disjoint
    }
}
