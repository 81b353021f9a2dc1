//! Static world objects and per-frame instance records

use crate::foundation::math::{Mat4, Quat, Vec3};
use crate::spatial::BoundingSphere;
use bytemuck::{Pod, Zeroable};

/// One static world object, created at population time
///
/// Immutable during a frame and replaced wholesale on rebuild. The BVH
/// builder physically permutes the backing array so spatially-coherent
/// objects become contiguous; nothing else ever reorders it.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StaticObject {
    /// Position in world space
    pub position: Vec3,
    /// Orientation
    pub rotation: Quat,
    /// Uniform scale; doubles as the bounding-sphere radius
    pub scale: f32,
    /// Index into the geometry table of the (external) asset pipeline
    pub geometry_index: u32,
    /// Index into the material table of the (external) asset pipeline
    pub material_index: u32,
    /// Packed RGBA color
    pub color: u32,
}

impl StaticObject {
    /// Create a new static object
    pub fn new(
        position: Vec3,
        rotation: Quat,
        scale: f32,
        geometry_index: u32,
        material_index: u32,
        color: u32,
    ) -> Self {
        Self {
            position,
            rotation,
            scale,
            geometry_index,
            material_index,
            color,
        }
    }

    /// Bounding sphere used by both culling stages
    pub fn bounding_sphere(&self) -> BoundingSphere {
        BoundingSphere::new(self.position, self.scale)
    }

    /// World transform: translation × rotation × uniform scale
    pub fn world_matrix(&self) -> Mat4 {
        Mat4::new_translation(&self.position)
            * self.rotation.to_homogeneous()
            * Mat4::new_scaling(self.scale)
    }
}

/// One visible object for the current frame
///
/// Rebuilt every tick, never retained across frames.
#[derive(Debug, Clone, PartialEq)]
pub struct Instance {
    /// Cached world transform
    pub world: Mat4,
    /// Geometry tag copied from the source object
    pub geometry_index: u32,
    /// Material tag copied from the source object
    pub material_index: u32,
    /// Packed RGBA color copied from the source object
    pub color: u32,
}

impl Instance {
    /// Raw layout for instance-buffer upload
    pub fn to_gpu(&self) -> InstanceData {
        InstanceData {
            world: self.world.into(),
            geometry_index: self.geometry_index,
            material_index: self.material_index,
            color: self.color,
            _reserved: 0,
        }
    }
}

/// GPU-facing instance record (column-major world matrix)
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Pod, Zeroable)]
pub struct InstanceData {
    /// World transform, column-major
    pub world: [[f32; 4]; 4],
    /// Geometry tag
    pub geometry_index: u32,
    /// Material tag
    pub material_index: u32,
    /// Packed RGBA color
    pub color: u32,
    /// Reserved; keeps the record 16-byte aligned
    pub _reserved: u32,
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_world_matrix_composition() {
        let object = StaticObject::new(
            Vec3::new(10.0, -5.0, 3.0),
            Quat::from_euler_angles(0.0, std::f32::consts::FRAC_PI_2, 0.0),
            2.0,
            0,
            0,
            0xffff_ffff,
        );
        let world = object.world_matrix();

        // The origin lands at the object position.
        let origin = world.transform_point(&nalgebra::Point3::origin());
        assert_relative_eq!(origin.x, 10.0, epsilon = 1e-5);
        assert_relative_eq!(origin.y, -5.0, epsilon = 1e-5);
        assert_relative_eq!(origin.z, 3.0, epsilon = 1e-5);

        // A unit vector is scaled by the uniform scale.
        let unit = world.transform_vector(&Vec3::new(1.0, 0.0, 0.0));
        assert_relative_eq!(unit.magnitude(), 2.0, epsilon = 1e-5);
    }

    #[test]
    fn test_gpu_record_size_and_content() {
        assert_eq!(std::mem::size_of::<InstanceData>(), 80);

        let instance = Instance {
            world: Mat4::identity(),
            geometry_index: 3,
            material_index: 7,
            color: 0x1020_30ff,
        };
        let data = instance.to_gpu();
        assert_eq!(data.world[0][0], 1.0);
        assert_eq!(data.geometry_index, 3);
        assert_eq!(data.material_index, 7);
        assert_eq!(data.color, 0x1020_30ff);
    }
}
