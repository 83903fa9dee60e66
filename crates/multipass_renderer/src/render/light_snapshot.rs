//! Light parameter snapshots
//!
//! Value copies of light components taken when a light is collected. Passes read
//! only these, so editing a light while a frame is built cannot tear it.

use crate::config::RendererSettings;
use crate::foundation::math::{Mat4, Mat4Ext, Vec3};
use crate::gpu::{CubeFace, GpuResult, GraphicsDevice, ParameterValue};
use crate::scene::{Attenuation, LightComponent, LightKind};

/// Light category; lighting passes run in this order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum LightClass {
    /// Ambient lights
    Ambient,
    /// Directional lights
    Directional,
    /// Point lights
    Point,
    /// Spot lights
    Spot,
}

impl LightClass {
    /// All classes in pass order
    pub const ALL: [Self; 4] = [Self::Ambient, Self::Directional, Self::Point, Self::Spot];

    /// Check if lights of this class are attached to every visible model
    pub fn is_global(&self) -> bool {
        matches!(self, Self::Ambient | Self::Directional)
    }
}

/// View matrices of a shadow map
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ShadowViews {
    /// One view (directional, spot)
    Single(Mat4),
    /// One view per cube face in [`CubeFace::ALL`] order (point)
    Cube([Mat4; 6]),
}

/// Matrices a shadow map is rendered and sampled with
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ShadowSnapshot {
    /// Projection shared by every view
    pub projection: Mat4,
    /// View matrices
    pub views: ShadowViews,
    /// Eye position every view looks from
    pub origin: Vec3,
    /// Distance stored as depth 1.0
    pub far_plane: f32,
}

impl ShadowSnapshot {
    /// Number of views (1 or 6)
    pub fn view_count(&self) -> usize {
        match self.views {
            ShadowViews::Single(_) => 1,
            ShadowViews::Cube(_) => 6,
        }
    }

    /// Projection times view for one view
    pub fn view_projection(&self, index: usize) -> Mat4 {
        match &self.views {
            ShadowViews::Single(view) => self.projection * view,
            ShadowViews::Cube(views) => self.projection * views[index.min(5)],
        }
    }

    /// Every view-projection matrix
    pub fn view_projections(&self) -> Vec<Mat4> {
        (0..self.view_count()).map(|i| self.view_projection(i)).collect()
    }

    /// Check if the map is a cube map
    pub fn is_cube(&self) -> bool {
        matches!(self.views, ShadowViews::Cube(_))
    }
}

/// Renderer-side copy of a light's parameters
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum LightSnapshot {
    /// Ambient light
    Ambient {
        /// RGB color
        color: Vec3,
    },
    /// Directional light
    Directional {
        /// RGB color
        color: Vec3,
        /// Shadow volume center
        position: Vec3,
        /// Normalized ray direction
        direction: Vec3,
    },
    /// Point light
    Point {
        /// RGB color
        color: Vec3,
        /// World position
        position: Vec3,
        /// Distance falloff
        attenuation: Attenuation,
        /// Influence radius derived from the falloff
        radius: f32,
    },
    /// Spot light
    Spot {
        /// RGB color
        color: Vec3,
        /// World position
        position: Vec3,
        /// Normalized cone axis
        direction: Vec3,
        /// Distance falloff
        attenuation: Attenuation,
        /// Influence radius derived from the falloff
        radius: f32,
        /// Half angle of full intensity
        inner_angle: f32,
        /// Half angle where intensity reaches zero
        outer_angle: f32,
    },
}

impl LightSnapshot {
    /// Copy a light's parameters
    pub fn capture(light: &LightComponent, cutoff: f32) -> Self {
        match light.kind {
            LightKind::Ambient => Self::Ambient { color: light.color },
            LightKind::Directional => Self::Directional {
                color: light.color,
                position: light.position,
                direction: light.direction,
            },
            LightKind::Point { attenuation } => Self::Point {
                color: light.color,
                position: light.position,
                attenuation,
                radius: attenuation.radius(cutoff),
            },
            LightKind::Spot {
                attenuation,
                inner_angle,
                outer_angle,
            } => Self::Spot {
                color: light.color,
                position: light.position,
                direction: light.direction,
                attenuation,
                radius: attenuation.radius(cutoff),
                inner_angle,
                outer_angle,
            },
        }
    }

    /// Category of the light
    pub fn class(&self) -> LightClass {
        match self {
            Self::Ambient { .. } => LightClass::Ambient,
            Self::Directional { .. } => LightClass::Directional,
            Self::Point { .. } => LightClass::Point,
            Self::Spot { .. } => LightClass::Spot,
        }
    }

    /// RGB color
    pub fn color(&self) -> Vec3 {
        match self {
            Self::Ambient { color }
            | Self::Directional { color, .. }
            | Self::Point { color, .. }
            | Self::Spot { color, .. } => *color,
        }
    }

    /// Shadow matrices for this light, `None` for ambient lights
    pub fn shadow(&self, settings: &RendererSettings) -> Option<ShadowSnapshot> {
        let near = settings.shadow_near_plane;
        match *self {
            Self::Ambient { .. } => None,
            Self::Directional {
                position, direction, ..
            } => {
                let extent = settings.directional_shadow_extent;
                let depth = settings.directional_shadow_depth;
                let eye = position - direction * (depth * 0.5);
                Some(ShadowSnapshot {
                    projection: Mat4::orthographic(-extent, extent, -extent, extent, 0.0, depth),
                    views: ShadowViews::Single(Mat4::look_at(eye, position, Vec3::y())),
                    origin: eye,
                    far_plane: depth,
                })
            }
            Self::Point { position, radius, .. } => {
                let views = CubeFace::ALL.map(|face| {
                    let (forward, up) = face.look_direction();
                    Mat4::look_at(position, position + forward, up)
                });
                Some(ShadowSnapshot {
                    projection: Mat4::perspective(std::f32::consts::FRAC_PI_2, 1.0, near, radius.max(near * 2.0)),
                    views: ShadowViews::Cube(views),
                    origin: position,
                    far_plane: radius,
                })
            }
            Self::Spot {
                position,
                direction,
                radius,
                outer_angle,
                ..
            } => {
                let fov = (outer_angle * 2.0).clamp(0.01, std::f32::consts::PI - 0.01);
                Some(ShadowSnapshot {
                    projection: Mat4::perspective(fov, 1.0, near, radius.max(near * 2.0)),
                    views: ShadowViews::Single(Mat4::look_at(position, position + direction, Vec3::y())),
                    origin: position,
                    far_plane: radius,
                })
            }
        }
    }

    /// Upload the light's uniforms to the bound program
    pub fn apply(&self, device: &mut dyn GraphicsDevice) -> GpuResult<()> {
        device.set_parameter("u_light_color", ParameterValue::Vec3(self.color()))?;
        match *self {
            Self::Ambient { .. } => {}
            Self::Directional { direction, .. } => {
                device.set_parameter("u_light_direction", ParameterValue::Vec3(direction))?;
            }
            Self::Point {
                position,
                attenuation,
                radius,
                ..
            } => {
                device.set_parameter("u_light_position", ParameterValue::Vec3(position))?;
                device.set_parameter("u_light_attenuation", ParameterValue::Vec3(attenuation_vector(attenuation)))?;
                device.set_parameter("u_light_radius", ParameterValue::Float(radius))?;
            }
            Self::Spot {
                position,
                direction,
                attenuation,
                radius,
                inner_angle,
                outer_angle,
                ..
            } => {
                device.set_parameter("u_light_position", ParameterValue::Vec3(position))?;
                device.set_parameter("u_light_direction", ParameterValue::Vec3(direction))?;
                device.set_parameter("u_light_attenuation", ParameterValue::Vec3(attenuation_vector(attenuation)))?;
                device.set_parameter("u_light_radius", ParameterValue::Float(radius))?;
                device.set_parameter("u_light_cos_inner", ParameterValue::Float(inner_angle.cos()))?;
                device.set_parameter("u_light_cos_outer", ParameterValue::Float(outer_angle.cos()))?;
            }
        }
        Ok(())
    }
}

fn attenuation_vector(attenuation: Attenuation) -> Vec3 {
    Vec3::new(attenuation.constant, attenuation.linear, attenuation.quadratic)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::foundation::math::{Point3, Vec4};
    use approx::assert_relative_eq;

    #[test]
    fn test_capture_is_a_value_copy() {
        let mut light = LightComponent::point(Vec3::new(1.0, 2.0, 3.0), Vec3::repeat(1.0), Attenuation::default());
        let first = LightSnapshot::capture(&light, 1.0 / 256.0);
        let second = LightSnapshot::capture(&light, 1.0 / 256.0);
        assert_eq!(first, second);

        light.position = Vec3::zeros();
        assert!(matches!(first, LightSnapshot::Point { position, .. } if position == Vec3::new(1.0, 2.0, 3.0)));
    }

    #[test]
    fn test_point_shadow_has_six_square_faces() {
        let light = LightComponent::point(Vec3::zeros(), Vec3::repeat(1.0), Attenuation::new(1.0, 0.0, 0.01));
        let snapshot = LightSnapshot::capture(&light, 1.0 / 256.0);
        let shadow = snapshot.shadow(&RendererSettings::default()).unwrap();
        assert!(shadow.is_cube());
        assert_eq!(shadow.view_count(), 6);
        assert!(shadow.far_plane.is_finite() && shadow.far_plane > 0.0);

        // +X face sees a point on the +X axis in the center of the image
        let clip = shadow.view_projection(0) * Vec4::new(5.0, 0.0, 0.0, 1.0);
        assert_relative_eq!(clip.x / clip.w, 0.0, epsilon = 1.0e-5);
        assert_relative_eq!(clip.y / clip.w, 0.0, epsilon = 1.0e-5);
        assert!(clip.z / clip.w > -1.0 && clip.z / clip.w < 1.0);
    }

    #[test]
    fn test_directional_shadow_volume_is_centered_on_position() {
        let light = LightComponent::directional(Vec3::new(0.0, -1.0, 0.0), Vec3::repeat(1.0))
            .with_position(Vec3::new(0.0, 5.0, 0.0));
        let snapshot = LightSnapshot::capture(&light, 1.0 / 256.0);
        let shadow = snapshot.shadow(&RendererSettings::default()).unwrap();
        let ndc = shadow.view_projection(0).transform_point(&Point3::new(0.0, 5.0, 0.0));
        assert_relative_eq!(ndc.x, 0.0, epsilon = 1.0e-5);
        assert_relative_eq!(ndc.y, 0.0, epsilon = 1.0e-5);
        assert_relative_eq!(ndc.z, 0.0, epsilon = 1.0e-4);
    }

    #[test]
    fn test_ambient_has_no_shadow() {
        let snapshot = LightSnapshot::capture(&LightComponent::ambient(Vec3::repeat(1.0)), 1.0 / 256.0);
        assert!(snapshot.shadow(&RendererSettings::default()).is_none());
        assert_eq!(snapshot.class(), LightClass::Ambient);
    }
}
