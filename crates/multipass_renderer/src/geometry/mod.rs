//! Geometry primitives for culling
//!
//! Bounding volumes, planes and frustums shared by the culling index, the occlusion
//! rasterizer and the shadow generator.

pub mod bounds;
pub mod frustum;

pub use bounds::{BoundingSphere, Cone, OrientedBox, AABB};
pub use frustum::{Frustum, Plane};

/// Shape a culling proxy is tested with
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum CullingShape {
    /// Axis-aligned box (models, particle systems)
    Aabb(AABB),
    /// Sphere (point light influence)
    Sphere(BoundingSphere),
    /// Cone (spot light influence)
    Cone(Cone),
    /// Oriented box (occluders)
    OrientedBox(OrientedBox),
}

impl CullingShape {
    /// World-space box enclosing the shape
    pub fn aabb(&self) -> AABB {
        match self {
            Self::Aabb(aabb) => *aabb,
            Self::Sphere(sphere) => sphere.aabb(),
            Self::Cone(cone) => cone.aabb(),
            Self::OrientedBox(obb) => obb.aabb(),
        }
    }

    /// Narrow-phase overlap against an object's box, used by light contact queries
    pub fn intersects_aabb(&self, aabb: &AABB) -> bool {
        match self {
            Self::Aabb(own) => own.intersects(aabb),
            Self::Sphere(sphere) => sphere.intersects_aabb(aabb),
            Self::Cone(cone) => cone.intersects_aabb(aabb),
            Self::OrientedBox(obb) => obb.aabb().intersects(aabb),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::foundation::math::Vec3;

    #[test]
    fn test_sphere_shape_contacts_are_tighter_than_its_box() {
        let shape = CullingShape::Sphere(BoundingSphere::new(Vec3::zeros(), 1.0));
        // Inside the enclosing box corner but outside the sphere
        let corner = AABB::from_center_extents(Vec3::new(0.95, 0.95, 0.95), Vec3::repeat(0.01));
        assert!(shape.aabb().intersects(&corner));
        assert!(!shape.intersects_aabb(&corner));
    }
}
