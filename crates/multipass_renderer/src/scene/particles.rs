//! Particle system and occluder components

use std::sync::Arc;

use crate::foundation::math::{Mat4, Vec3};
use crate::geometry::AABB;
use crate::gpu::{PrimitiveMode, VertexArrayHandle};
use crate::material::Material;

/// Particle system drawn as a single point or triangle batch
///
/// The simulation lives outside the renderer; it refreshes `vertex_array` and
/// `bounds` as particles move.
#[derive(Debug, Clone)]
pub struct ParticleSystemComponent {
    /// Particle geometry in world space
    pub vertex_array: VertexArrayHandle,
    /// Primitive assembly of the batch
    pub primitive: PrimitiveMode,
    /// Material; usually blended
    pub material: Option<Arc<Material>>,
    /// World-space bounds of every live particle
    pub bounds: AABB,
}

impl ParticleSystemComponent {
    /// Point-sprite particle system
    pub fn new(vertex_array: VertexArrayHandle, material: Arc<Material>, bounds: AABB) -> Self {
        Self {
            vertex_array,
            primitive: PrimitiveMode::Points,
            material: Some(material),
            bounds,
        }
    }
}

/// Oriented box that hides what lies behind it
///
/// Occluders are never drawn; they only feed the occlusion rasterizer.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct OccluderComponent {
    /// Half size along the local axes
    pub half_extents: Vec3,
    /// Box to world transform
    pub transform: Mat4,
}

impl OccluderComponent {
    /// Create an occluder
    pub fn new(half_extents: Vec3, transform: Mat4) -> Self {
        Self {
            half_extents,
            transform,
        }
    }
}
