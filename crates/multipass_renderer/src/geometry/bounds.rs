//! Bounding volumes used by culling
//!
//! Axis-aligned boxes, spheres, cones and oriented boxes, with the overlap tests the
//! culling index needs.

use crate::foundation::math::{Mat4, Point3, Vec3};

/// Axis-Aligned Bounding Box for spatial queries
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AABB {
    /// Minimum corner of the bounding box
    pub min: Vec3,
    /// Maximum corner of the bounding box
    pub max: Vec3,
}

impl AABB {
    /// Create a new AABB from min and max points
    pub fn new(min: Vec3, max: Vec3) -> Self {
        Self { min, max }
    }

    /// Create an AABB centered at a point with given extents
    pub fn from_center_extents(center: Vec3, extents: Vec3) -> Self {
        Self {
            min: center - extents,
            max: center + extents,
        }
    }

    /// Smallest box containing every point
    pub fn from_points(points: &[Vec3]) -> Self {
        let mut min = Vec3::repeat(f32::MAX);
        let mut max = Vec3::repeat(f32::MIN);
        for point in points {
            min = min.inf(point);
            max = max.sup(point);
        }
        Self { min, max }
    }

    /// Get the center of the AABB
    pub fn center(&self) -> Vec3 {
        (self.min + self.max) * 0.5
    }

    /// Get the extents (half-size) of the AABB
    pub fn extents(&self) -> Vec3 {
        (self.max - self.min) * 0.5
    }

    /// Eight corner points
    pub fn corners(&self) -> [Vec3; 8] {
        let (a, b) = (self.min, self.max);
        [
            Vec3::new(a.x, a.y, a.z),
            Vec3::new(b.x, a.y, a.z),
            Vec3::new(a.x, b.y, a.z),
            Vec3::new(b.x, b.y, a.z),
            Vec3::new(a.x, a.y, b.z),
            Vec3::new(b.x, a.y, b.z),
            Vec3::new(a.x, b.y, b.z),
            Vec3::new(b.x, b.y, b.z),
        ]
    }

    /// Check if this AABB contains a point
    pub fn contains_point(&self, point: Vec3) -> bool {
        point.x >= self.min.x && point.x <= self.max.x &&
        point.y >= self.min.y && point.y <= self.max.y &&
        point.z >= self.min.z && point.z <= self.max.z
    }

    /// Check if this AABB fully contains another one
    pub fn contains(&self, other: &AABB) -> bool {
        self.contains_point(other.min) && self.contains_point(other.max)
    }

    /// Check if this AABB intersects another AABB
    pub fn intersects(&self, other: &AABB) -> bool {
        self.min.x <= other.max.x && self.max.x >= other.min.x &&
        self.min.y <= other.max.y && self.max.y >= other.min.y &&
        self.min.z <= other.max.z && self.max.z >= other.min.z
    }

    /// Union of two boxes
    #[must_use]
    pub fn merged(&self, other: &AABB) -> AABB {
        AABB::new(self.min.inf(&other.min), self.max.sup(&other.max))
    }

    /// Box grown by `margin` on every side
    #[must_use]
    pub fn inflated(&self, margin: f32) -> AABB {
        let m = Vec3::repeat(margin);
        AABB::new(self.min - m, self.max + m)
    }

    /// Surface area, used as the insertion cost of the culling tree
    pub fn surface_area(&self) -> f32 {
        let d = self.max - self.min;
        2.0 * (d.x * d.y + d.y * d.z + d.z * d.x)
    }

    /// World-space box of this (local-space) box under an affine transform
    #[must_use]
    pub fn transformed(&self, matrix: &Mat4) -> AABB {
        let center = matrix.transform_point(&Point3::from(self.center())).coords;
        let extents = self.extents();
        let mut world_extents = Vec3::zeros();
        for row in 0..3 {
            world_extents[row] = (0..3).map(|col| matrix[(row, col)].abs() * extents[col]).sum();
        }
        AABB::from_center_extents(center, world_extents)
    }

    /// Squared distance from a point to the closest point of the box
    pub fn distance_squared_to(&self, point: Vec3) -> f32 {
        let closest = Vec3::new(
            point.x.clamp(self.min.x, self.max.x),
            point.y.clamp(self.min.y, self.max.y),
            point.z.clamp(self.min.z, self.max.z),
        );
        (closest - point).magnitude_squared()
    }
}

/// A bounding sphere
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BoundingSphere {
    /// The center position of the sphere in world space
    pub center: Vec3,
    /// The radius of the sphere
    pub radius: f32,
}

impl BoundingSphere {
    /// Creates a new bounding sphere with the given center and radius
    pub fn new(center: Vec3, radius: f32) -> Self {
        Self { center, radius }
    }

    /// Check if this sphere intersects with another
    pub fn intersects(&self, other: &BoundingSphere) -> bool {
        let distance_squared = (self.center - other.center).magnitude_squared();
        let radius_sum = self.radius + other.radius;
        distance_squared <= radius_sum * radius_sum
    }

    /// Check if this sphere touches a box
    pub fn intersects_aabb(&self, aabb: &AABB) -> bool {
        aabb.distance_squared_to(self.center) <= self.radius * self.radius
    }

    /// Enclosing box
    pub fn aabb(&self) -> AABB {
        AABB::from_center_extents(self.center, Vec3::repeat(self.radius))
    }
}

/// Upper limit on cone half angles; wider cones degenerate into half spaces
const MAX_CONE_HALF_ANGLE: f32 = 89.0 * std::f32::consts::PI / 180.0;

/// Spot light influence volume: apex, axis, length and half angle
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Cone {
    /// Tip of the cone
    pub apex: Vec3,
    /// Unit axis pointing away from the apex
    pub direction: Vec3,
    /// Length along the axis
    pub height: f32,
    /// Half opening angle in radians
    pub half_angle: f32,
}

impl Cone {
    /// Creates a cone; the direction is normalized and the angle clamped below 90°
    pub fn new(apex: Vec3, direction: Vec3, height: f32, half_angle: f32) -> Self {
        Self {
            apex,
            direction: direction.normalize(),
            height,
            half_angle: half_angle.clamp(0.0, MAX_CONE_HALF_ANGLE),
        }
    }

    /// Tight box around the apex and the base disc
    pub fn aabb(&self) -> AABB {
        let base_center = self.apex + self.direction * self.height;
        let base_radius = self.height * self.half_angle.tan();
        let d = self.direction;
        let disc_extents = Vec3::new(
            base_radius * (1.0 - d.x * d.x).max(0.0).sqrt(),
            base_radius * (1.0 - d.y * d.y).max(0.0).sqrt(),
            base_radius * (1.0 - d.z * d.z).max(0.0).sqrt(),
        );
        AABB::new(
            self.apex.inf(&(base_center - disc_extents)),
            self.apex.sup(&(base_center + disc_extents)),
        )
    }

    /// Conservative cone/sphere overlap
    pub fn intersects_sphere(&self, sphere: &BoundingSphere) -> bool {
        let v = sphere.center - self.apex;
        let v_len_sq = v.magnitude_squared();
        let v1_len = v.dot(&self.direction);
        let closest = self.half_angle.cos() * (v_len_sq - v1_len * v1_len).max(0.0).sqrt()
            - v1_len * self.half_angle.sin();

        let angle_cull = closest > sphere.radius;
        let front_cull = v1_len > sphere.radius + self.height;
        let back_cull = v1_len < -sphere.radius;
        !(angle_cull || front_cull || back_cull)
    }

    /// Conservative cone/box overlap through the box's bounding sphere
    pub fn intersects_aabb(&self, aabb: &AABB) -> bool {
        self.aabb().intersects(aabb)
            && self.intersects_sphere(&BoundingSphere::new(aabb.center(), aabb.extents().magnitude()))
    }
}

/// Box with arbitrary orientation, used for occluders
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct OrientedBox {
    /// Half size along each local axis
    pub half_extents: Vec3,
    /// Local-to-world transform
    pub transform: Mat4,
}

impl OrientedBox {
    /// Creates an oriented box
    pub fn new(half_extents: Vec3, transform: Mat4) -> Self {
        Self { half_extents, transform }
    }

    /// World-space corners in the same order as [`AABB::corners`]
    pub fn corners(&self) -> [Vec3; 8] {
        AABB::from_center_extents(Vec3::zeros(), self.half_extents)
            .corners()
            .map(|corner| self.transform.transform_point(&Point3::from(corner)).coords)
    }

    /// Enclosing world-space box
    pub fn aabb(&self) -> AABB {
        AABB::from_center_extents(Vec3::zeros(), self.half_extents).transformed(&self.transform)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_aabb_contains_point() {
        let aabb = AABB::new(
            Vec3::new(-1.0, -1.0, -1.0),
            Vec3::new(1.0, 1.0, 1.0),
        );

        assert!(aabb.contains_point(Vec3::zeros()));
        assert!(aabb.contains_point(Vec3::new(0.5, 0.5, 0.5)));
        assert!(!aabb.contains_point(Vec3::new(2.0, 0.0, 0.0)));
    }

    #[test]
    fn test_aabb_intersects() {
        let aabb1 = AABB::new(Vec3::new(0.0, 0.0, 0.0), Vec3::new(2.0, 2.0, 2.0));
        let aabb2 = AABB::new(Vec3::new(1.0, 1.0, 1.0), Vec3::new(3.0, 3.0, 3.0));
        let aabb3 = AABB::new(Vec3::new(5.0, 5.0, 5.0), Vec3::new(7.0, 7.0, 7.0));

        assert!(aabb1.intersects(&aabb2));
        assert!(!aabb1.intersects(&aabb3));
    }

    #[test]
    fn test_aabb_transformed_by_rotation_grows() {
        let unit = AABB::from_center_extents(Vec3::zeros(), Vec3::new(1.0, 1.0, 1.0));
        let rotation = Mat4::from_axis_angle(&Vec3::z_axis(), std::f32::consts::FRAC_PI_4);
        let world = unit.transformed(&(Mat4::new_translation(&Vec3::new(5.0, 0.0, 0.0)) * rotation));

        assert_relative_eq!(world.center().x, 5.0, epsilon = 1.0e-5);
        assert_relative_eq!(world.extents().x, 2.0_f32.sqrt(), epsilon = 1.0e-5);
        assert_relative_eq!(world.extents().z, 1.0, epsilon = 1.0e-5);
    }

    #[test]
    fn test_sphere_aabb_overlap() {
        let aabb = AABB::new(Vec3::zeros(), Vec3::new(1.0, 1.0, 1.0));
        assert!(BoundingSphere::new(Vec3::new(2.0, 0.5, 0.5), 1.0).intersects_aabb(&aabb));
        assert!(!BoundingSphere::new(Vec3::new(2.5, 0.5, 0.5), 1.0).intersects_aabb(&aabb));
    }

    #[test]
    fn test_cone_rejects_objects_behind_and_outside() {
        let cone = Cone::new(Vec3::zeros(), Vec3::new(0.0, 0.0, -1.0), 10.0, 0.5);

        let ahead = BoundingSphere::new(Vec3::new(0.0, 0.0, -5.0), 0.5);
        let behind = BoundingSphere::new(Vec3::new(0.0, 0.0, 5.0), 0.5);
        let beside = BoundingSphere::new(Vec3::new(8.0, 0.0, -2.0), 0.5);
        let too_far = BoundingSphere::new(Vec3::new(0.0, 0.0, -20.0), 0.5);

        assert!(cone.intersects_sphere(&ahead));
        assert!(!cone.intersects_sphere(&behind));
        assert!(!cone.intersects_sphere(&beside));
        assert!(!cone.intersects_sphere(&too_far));
    }

    #[test]
    fn test_cone_aabb_contains_apex_and_base() {
        let cone = Cone::new(Vec3::new(1.0, 2.0, 3.0), Vec3::new(1.0, 0.0, 0.0), 4.0, 0.3);
        let aabb = cone.aabb();
        assert!(aabb.contains_point(cone.apex));
        assert!(aabb.contains_point(cone.apex + cone.direction * cone.height));
    }
}
