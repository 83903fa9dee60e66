//! Light components
//!
//! Pure data describing a light source. The renderer never reads these while drawing;
//! it copies them into snapshots when the light is collected.

use serde::{Deserialize, Serialize};

use crate::culling::ProxyOwner;
use crate::foundation::collections::LightKey;
use crate::foundation::math::{approximate_attenuation_radius, Vec3};
use crate::geometry::{BoundingSphere, Cone, CullingShape};

/// Distance falloff `1 / (constant + linear*d + quadratic*d^2)`
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Attenuation {
    /// Constant term
    pub constant: f32,
    /// Linear term
    pub linear: f32,
    /// Quadratic term
    pub quadratic: f32,
}

impl Default for Attenuation {
    fn default() -> Self {
        Self::new(1.0, 0.0, 0.01)
    }
}

impl Attenuation {
    /// Create an attenuation triple
    pub fn new(constant: f32, linear: f32, quadratic: f32) -> Self {
        Self {
            constant,
            linear,
            quadratic,
        }
    }

    /// Distance where the falloff reaches `cutoff`; always finite and positive
    pub fn radius(&self, cutoff: f32) -> f32 {
        approximate_attenuation_radius(self.constant, self.linear, self.quadratic, cutoff)
    }

    /// Falloff at a distance
    pub fn at(&self, distance: f32) -> f32 {
        1.0 / (self.constant + self.linear * distance + self.quadratic * distance * distance).max(f32::EPSILON)
    }
}

/// Light type and its type-specific parameters
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum LightKind {
    /// Uniform light from every direction
    Ambient,
    /// Parallel rays along `direction`
    Directional,
    /// Omnidirectional light at `position`
    Point {
        /// Distance falloff
        attenuation: Attenuation,
    },
    /// Cone of light from `position` along `direction`
    Spot {
        /// Distance falloff
        attenuation: Attenuation,
        /// Half angle of full intensity, radians
        inner_angle: f32,
        /// Half angle where intensity reaches zero, radians
        outer_angle: f32,
    },
}

/// Pure data component for lights
#[derive(Debug, Clone, PartialEq)]
pub struct LightComponent {
    /// Type and type-specific parameters
    pub kind: LightKind,
    /// RGB color, intensity premultiplied
    pub color: Vec3,
    /// World position (point, spot; directional shadow origin)
    pub position: Vec3,
    /// World direction (directional, spot)
    pub direction: Vec3,
    /// Render a shadow map for this light
    pub cast_shadows: bool,
}

impl LightComponent {
    /// Ambient light
    pub fn ambient(color: Vec3) -> Self {
        Self {
            kind: LightKind::Ambient,
            color,
            position: Vec3::zeros(),
            direction: Vec3::new(0.0, -1.0, 0.0),
            cast_shadows: false,
        }
    }

    /// Directional light with world-space direction
    pub fn directional(direction: Vec3, color: Vec3) -> Self {
        Self {
            kind: LightKind::Directional,
            color,
            position: Vec3::zeros(),
            direction: direction.normalize(),
            cast_shadows: false,
        }
    }

    /// Point light with world-space position
    pub fn point(position: Vec3, color: Vec3, attenuation: Attenuation) -> Self {
        Self {
            kind: LightKind::Point { attenuation },
            color,
            position,
            direction: Vec3::new(0.0, -1.0, 0.0),
            cast_shadows: false,
        }
    }

    /// Spot light with world-space position and direction; angles are half angles in radians
    pub fn spot(
        position: Vec3,
        direction: Vec3,
        color: Vec3,
        attenuation: Attenuation,
        inner_angle: f32,
        outer_angle: f32,
    ) -> Self {
        Self {
            kind: LightKind::Spot {
                attenuation,
                inner_angle: inner_angle.min(outer_angle),
                outer_angle,
            },
            color,
            position,
            direction: direction.normalize(),
            cast_shadows: false,
        }
    }

    /// Enable or disable shadows
    #[must_use]
    pub fn with_shadows(mut self, cast_shadows: bool) -> Self {
        self.cast_shadows = cast_shadows && !matches!(self.kind, LightKind::Ambient);
        self
    }

    /// Set the position (directional lights use it as the shadow volume center)
    #[must_use]
    pub fn with_position(mut self, position: Vec3) -> Self {
        self.position = position;
        self
    }

    /// Attenuation of point and spot lights
    pub fn attenuation(&self) -> Option<Attenuation> {
        match self.kind {
            LightKind::Point { attenuation } | LightKind::Spot { attenuation, .. } => Some(attenuation),
            LightKind::Ambient | LightKind::Directional => None,
        }
    }

    /// Influence radius of point and spot lights
    pub fn radius(&self, cutoff: f32) -> Option<f32> {
        self.attenuation().map(|attenuation| attenuation.radius(cutoff))
    }

    /// Culling proxy owner for this light
    pub fn proxy_owner(&self, key: LightKey) -> ProxyOwner {
        match self.kind {
            LightKind::Ambient => ProxyOwner::AmbientLight(key),
            LightKind::Directional => ProxyOwner::DirectionalLight(key),
            LightKind::Point { .. } => ProxyOwner::PointLight(key),
            LightKind::Spot { .. } => ProxyOwner::SpotLight(key),
        }
    }

    /// World-space influence volume
    pub fn culling_shape(&self, cutoff: f32) -> CullingShape {
        match self.kind {
            LightKind::Ambient | LightKind::Directional => {
                CullingShape::Sphere(BoundingSphere::new(self.position, 0.0))
            }
            LightKind::Point { attenuation } => {
                CullingShape::Sphere(BoundingSphere::new(self.position, attenuation.radius(cutoff)))
            }
            LightKind::Spot {
                attenuation,
                outer_angle,
                ..
            } => CullingShape::Cone(Cone::new(
                self.position,
                self.direction,
                attenuation.radius(cutoff),
                outer_angle,
            )),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_point_light_sphere_uses_attenuation_radius() {
        let light = LightComponent::point(Vec3::new(1.0, 2.0, 3.0), Vec3::repeat(1.0), Attenuation::new(1.0, 0.0, 0.01));
        let CullingShape::Sphere(sphere) = light.culling_shape(1.0 / 256.0) else {
            panic!("point lights use spheres");
        };
        assert_relative_eq!(sphere.radius, 25500.0_f32.sqrt(), epsilon = 1.0e-2);
        assert_relative_eq!(sphere.center, Vec3::new(1.0, 2.0, 3.0));
    }

    #[test]
    fn test_zero_quadratic_attenuation_radius_is_finite() {
        let attenuation = Attenuation::new(1.0, 0.0, 0.0);
        let radius = attenuation.radius(1.0 / 256.0);
        assert!(radius.is_finite() && radius > 0.0);
    }

    #[test]
    fn test_ambient_lights_never_cast_shadows() {
        let light = LightComponent::ambient(Vec3::repeat(1.0)).with_shadows(true);
        assert!(!light.cast_shadows);
        let light = LightComponent::directional(Vec3::new(0.0, -1.0, 0.0), Vec3::repeat(1.0)).with_shadows(true);
        assert!(light.cast_shadows);
    }

    #[test]
    fn test_falloff_at_distance() {
        let attenuation = Attenuation::new(1.0, 0.0, 0.01);
        assert_relative_eq!(attenuation.at(0.0), 1.0);
        assert_relative_eq!(attenuation.at(10.0), 0.5);
    }
}
