//! View frustum extraction and containment tests

use crate::foundation::math::{Mat4, Vec3, Vec4};

use super::bounds::{BoundingSphere, AABB};

/// Plane defined by normal and distance from origin
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Plane {
    /// Normal vector (normalized when built through [`Plane::from_coefficients`])
    pub normal: Vec3,
    /// Distance from origin along the normal
    pub distance: f32,
}

impl Plane {
    /// Create a new plane from normal and distance
    pub fn new(normal: Vec3, distance: f32) -> Self {
        Self { normal: normal.normalize(), distance }
    }

    /// Plane from `ax + by + cz + d = 0`, optionally normalized
    pub fn from_coefficients(coefficients: Vec4, normalize: bool) -> Self {
        let normal = coefficients.xyz();
        let length = if normalize { normal.magnitude().max(f32::EPSILON) } else { 1.0 };
        Self {
            normal: normal / length,
            distance: coefficients.w / length,
        }
    }

    /// Calculate signed distance from plane to point
    pub fn distance_to_point(&self, point: Vec3) -> f32 {
        self.normal.dot(&point) + self.distance
    }
}

/// Frustum for visibility culling
#[derive(Debug, Clone, PartialEq)]
pub struct Frustum {
    /// Six planes defining the frustum (left, right, bottom, top, near, far), normals inward
    pub planes: [Plane; 6],
}

impl Frustum {
    /// Create a frustum from six planes
    pub fn new(planes: [Plane; 6]) -> Self {
        Self { planes }
    }

    /// Extract frustum planes from a view-projection matrix (Gribb-Hartmann)
    ///
    /// Planes only feed sign tests, so `normalize` may be `false` for point queries;
    /// sphere tests need normalized planes.
    pub fn from_matrix(vp_matrix: &Mat4, normalize: bool) -> Self {
        let row = |i: usize| -> Vec4 { vp_matrix.row(i).transpose() };
        let (r0, r1, r2, r3) = (row(0), row(1), row(2), row(3));

        Self {
            planes: [
                Plane::from_coefficients(r3 + r0, normalize),
                Plane::from_coefficients(r3 - r0, normalize),
                Plane::from_coefficients(r3 + r1, normalize),
                Plane::from_coefficients(r3 - r1, normalize),
                Plane::from_coefficients(r3 + r2, normalize),
                Plane::from_coefficients(r3 - r2, normalize),
            ],
        }
    }

    /// Check if an AABB is inside or intersects the frustum
    ///
    /// A box touching a plane counts as inside.
    pub fn intersects_aabb(&self, aabb: &AABB) -> bool {
        for plane in &self.planes {
            // Corner furthest along the plane normal
            let mut p = aabb.min;
            if plane.normal.x >= 0.0 { p.x = aabb.max.x; }
            if plane.normal.y >= 0.0 { p.y = aabb.max.y; }
            if plane.normal.z >= 0.0 { p.z = aabb.max.z; }

            if plane.distance_to_point(p) < 0.0 {
                return false;
            }
        }

        true
    }

    /// Check if a sphere is inside or intersects the frustum
    pub fn intersects_sphere(&self, sphere: &BoundingSphere) -> bool {
        self.planes
            .iter()
            .all(|plane| plane.distance_to_point(sphere.center) >= -sphere.radius)
    }

    /// Check if the whole box lies inside the frustum
    pub fn contains_aabb(&self, aabb: &AABB) -> bool {
        aabb.corners()
            .iter()
            .all(|corner| self.planes.iter().all(|plane| plane.distance_to_point(*corner) >= 0.0))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::foundation::math::Mat4Ext;

    fn camera_frustum() -> Frustum {
        let projection = Mat4::perspective(std::f32::consts::FRAC_PI_2, 1.0, 0.1, 100.0);
        let view = Mat4::look_at(Vec3::zeros(), Vec3::new(0.0, 0.0, -1.0), Vec3::y());
        Frustum::from_matrix(&(projection * view), true)
    }

    #[test]
    fn test_box_in_front_is_visible() {
        let frustum = camera_frustum();
        let aabb = AABB::from_center_extents(Vec3::new(0.0, 0.0, -10.0), Vec3::repeat(1.0));
        assert!(frustum.intersects_aabb(&aabb));
        assert!(frustum.contains_aabb(&aabb));
    }

    #[test]
    fn test_box_behind_is_culled() {
        let frustum = camera_frustum();
        let aabb = AABB::from_center_extents(Vec3::new(0.0, 0.0, 10.0), Vec3::repeat(1.0));
        assert!(!frustum.intersects_aabb(&aabb));
    }

    #[test]
    fn test_box_beyond_far_plane_is_culled() {
        let frustum = camera_frustum();
        let aabb = AABB::from_center_extents(Vec3::new(0.0, 0.0, -150.0), Vec3::repeat(1.0));
        assert!(!frustum.intersects_aabb(&aabb));
    }

    #[test]
    fn test_box_touching_side_plane_counts_as_inside() {
        // 90° fov: the right plane is x = -z. A box whose min.x sits exactly on it.
        let frustum = camera_frustum();
        let aabb = AABB::new(Vec3::new(10.0, -1.0, -11.0), Vec3::new(12.0, 1.0, -10.0));
        assert!(frustum.intersects_aabb(&aabb));
    }

    #[test]
    fn test_sphere_straddling_near_plane_is_visible() {
        let frustum = camera_frustum();
        assert!(frustum.intersects_sphere(&BoundingSphere::new(Vec3::new(0.0, 0.0, 0.5), 1.0)));
        assert!(!frustum.intersects_sphere(&BoundingSphere::new(Vec3::new(0.0, 0.0, 5.0), 1.0)));
    }
}
