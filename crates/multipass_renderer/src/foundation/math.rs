//! Math utilities and types
//!
//! Provides fundamental math types for 3D rendering. All projection helpers follow
//! OpenGL clip-space conventions: right-handed view space looking down `-Z`, clip
//! depth in `[-w, w]`.

pub use nalgebra::{
    Vector2, Vector3, Vector4,
    Matrix3, Matrix4,
    Quaternion,
    Unit,
};

/// 2D vector type
pub type Vec2 = Vector2<f32>;

/// 3D vector type
pub type Vec3 = Vector3<f32>;

/// 4D vector type
pub type Vec4 = Vector4<f32>;

/// 3x3 matrix type
pub type Mat3 = Matrix3<f32>;

/// 4x4 matrix type
pub type Mat4 = Matrix4<f32>;

/// 3D point type
pub type Point3 = nalgebra::Point3<f32>;

/// Quaternion type for rotations
pub type Quat = Unit<Quaternion<f32>>;

/// Transform representing position, rotation, and scale
#[derive(Debug, Clone, PartialEq)]
pub struct Transform {
    /// Position in 3D space
    pub position: Vec3,

    /// Rotation quaternion
    pub rotation: Quat,

    /// Scale factors
    pub scale: Vec3,
}

impl Default for Transform {
    fn default() -> Self {
        Self {
            position: Vec3::zeros(),
            rotation: Quat::identity(),
            scale: Vec3::new(1.0, 1.0, 1.0),
        }
    }
}

impl Transform {
    /// Create a new identity transform
    pub fn identity() -> Self {
        Self::default()
    }

    /// Create a transform with only position
    pub fn from_position(position: Vec3) -> Self {
        Self {
            position,
            ..Default::default()
        }
    }

    /// Builder-style uniform or non-uniform scale
    #[must_use]
    pub fn with_scale(mut self, scale: Vec3) -> Self {
        self.scale = scale;
        self
    }

    /// Builder-style rotation
    #[must_use]
    pub fn with_rotation(mut self, rotation: Quat) -> Self {
        self.rotation = rotation;
        self
    }

    /// Convert to a transformation matrix
    pub fn to_matrix(&self) -> Mat4 {
        Mat4::new_translation(&self.position)
            * self.rotation.to_homogeneous()
            * Mat4::new_nonuniform_scaling(&self.scale)
    }
}

/// Extension trait for Mat4 with additional convenience methods
pub trait Mat4Ext {
    /// Create an OpenGL-style perspective projection matrix
    fn perspective(fov_y: f32, aspect: f32, near: f32, far: f32) -> Mat4;

    /// Create an OpenGL-style orthographic projection matrix
    fn orthographic(left: f32, right: f32, bottom: f32, top: f32, near: f32, far: f32) -> Mat4;

    /// Create a right-handed look-at view matrix
    fn look_at(eye: Vec3, target: Vec3, up: Vec3) -> Mat4;

    /// Translation part of an affine matrix
    fn translation_part(&self) -> Vec3;
}

impl Mat4Ext for Mat4 {
    fn perspective(fov_y: f32, aspect: f32, near: f32, far: f32) -> Mat4 {
        Mat4::new_perspective(aspect, fov_y, near, far)
    }

    fn orthographic(left: f32, right: f32, bottom: f32, top: f32, near: f32, far: f32) -> Mat4 {
        Mat4::new_orthographic(left, right, bottom, top, near, far)
    }

    fn look_at(eye: Vec3, target: Vec3, up: Vec3) -> Mat4 {
        // Degenerate when looking straight along `up`; pick another up axis then.
        let forward = (target - eye).normalize();
        let up = if forward.cross(&up).magnitude_squared() < 1.0e-8 {
            Vec3::new(1.0, 0.0, 0.0)
        } else {
            up
        };
        Mat4::look_at_rh(&Point3::from(eye), &Point3::from(target), &up)
    }

    fn translation_part(&self) -> Vec3 {
        Vec3::new(self.m14, self.m24, self.m34)
    }
}

/// Substitute used for a zero quadratic attenuation term
pub const QUADRATIC_ATTENUATION_EPSILON: f32 = 1.0e-4;

/// Smallest radius reported for any light
pub const MIN_LIGHT_RADIUS: f32 = 1.0e-3;

/// Distance at which `1 / (c + l*d + q*d^2)` drops to `cutoff`.
///
/// A zero (or negative) quadratic term is replaced by
/// [`QUADRATIC_ATTENUATION_EPSILON`] so the result is always finite and positive.
pub fn approximate_attenuation_radius(constant: f32, linear: f32, quadratic: f32, cutoff: f32) -> f32 {
    let quadratic = if quadratic <= QUADRATIC_ATTENUATION_EPSILON {
        QUADRATIC_ATTENUATION_EPSILON
    } else {
        quadratic
    };
    let cutoff = cutoff.max(f32::EPSILON);

    // q*d^2 + l*d + (c - 1/cutoff) = 0
    let c = constant - 1.0 / cutoff;
    let discriminant = linear * linear - 4.0 * quadratic * c;
    if discriminant <= 0.0 {
        return MIN_LIGHT_RADIUS;
    }

    let radius = (-linear + discriminant.sqrt()) / (2.0 * quadratic);
    if radius.is_finite() {
        radius.max(MIN_LIGHT_RADIUS)
    } else {
        MIN_LIGHT_RADIUS
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_attenuation_radius_is_finite_and_positive() {
        let radius = approximate_attenuation_radius(1.0, 0.0, 0.01, 1.0 / 256.0);
        assert!(radius.is_finite());
        assert!(radius > 0.0);

        // 1 / (1 + 0.01 d^2) == 1/256  =>  d = sqrt(25500)
        assert_relative_eq!(radius, 25500.0_f32.sqrt(), epsilon = 1.0e-2);
    }

    #[test]
    fn test_attenuation_radius_zero_quadratic_uses_epsilon() {
        let radius = approximate_attenuation_radius(1.0, 0.0, 0.0, 1.0 / 256.0);
        assert!(radius.is_finite());
        assert!(radius > 0.0);

        let with_epsilon =
            approximate_attenuation_radius(1.0, 0.0, QUADRATIC_ATTENUATION_EPSILON, 1.0 / 256.0);
        assert_relative_eq!(radius, with_epsilon);
    }

    #[test]
    fn test_attenuation_radius_never_below_minimum() {
        // Light already below the cutoff at distance zero
        let radius = approximate_attenuation_radius(1000.0, 0.0, 1.0, 1.0 / 256.0);
        assert_relative_eq!(radius, MIN_LIGHT_RADIUS);
    }

    #[test]
    fn test_transform_to_matrix_translates() {
        let transform = Transform::from_position(Vec3::new(1.0, 2.0, 3.0))
            .with_scale(Vec3::new(2.0, 2.0, 2.0));
        let point = transform.to_matrix().transform_point(&Point3::new(1.0, 0.0, 0.0));
        assert_relative_eq!(point.x, 3.0);
        assert_relative_eq!(point.y, 2.0);
        assert_relative_eq!(point.z, 3.0);
    }

    #[test]
    fn test_look_at_handles_parallel_up() {
        let view = Mat4::look_at(Vec3::new(0.0, 10.0, 0.0), Vec3::zeros(), Vec3::y());
        assert!(view.iter().all(|v| v.is_finite()));
    }
}
