//! Scene query interface consumed by the renderer

use crate::culling::{CullingStats, OcclusionRasterizer, VisibilityVisitor};
use crate::foundation::collections::{LightKey, ModelKey, ParticleSystemKey};
use crate::foundation::math::Mat4;

use super::light::LightComponent;
use super::model::ModelComponent;
use super::particles::ParticleSystemComponent;

/// Everything the renderer needs from a scene
///
/// Implementations own their culling structure; the renderer only walks it through
/// these queries and reads components by key.
pub trait SceneQuery {
    /// Report every object visible through `view_projection`
    fn query_visible_objects(
        &self,
        view_projection: &Mat4,
        visitor: &mut dyn VisibilityVisitor,
        occlusion: Option<&mut OcclusionRasterizer>,
    ) -> CullingStats;

    /// Report the objects a point light's sphere touches
    fn query_point_light_contacts(&self, light: LightKey, visitor: &mut dyn VisibilityVisitor) -> usize;

    /// Report the objects a spot light's cone touches
    fn query_spot_light_contacts(&self, light: LightKey, visitor: &mut dyn VisibilityVisitor) -> usize;

    /// Model lookup
    fn model(&self, key: ModelKey) -> Option<&ModelComponent>;

    /// Light lookup
    fn light(&self, key: LightKey) -> Option<&LightComponent>;

    /// Particle system lookup
    fn particle_system(&self, key: ParticleSystemKey) -> Option<&ParticleSystemComponent>;

    /// Attenuation value at which point and spot light volumes end
    fn light_cutoff(&self) -> f32;
}
