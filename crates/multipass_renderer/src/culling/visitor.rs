//! Callback interface for culling queries

use crate::foundation::collections::{LightKey, ModelKey, OccluderKey, ParticleSystemKey};

use super::proxy::ProxyOwner;

/// Receives the objects a culling query finds, one method per object kind
pub trait VisibilityVisitor {
    /// A model is visible (or touched, for contact queries)
    fn process_model(&mut self, model: ModelKey);

    /// A point light's influence sphere is visible
    fn process_point_light(&mut self, light: LightKey);

    /// A spot light's influence cone is visible
    fn process_spot_light(&mut self, light: LightKey);

    /// An ambient light; reported by every visibility query
    fn process_ambient_light(&mut self, light: LightKey);

    /// A directional light; reported by every visibility query
    fn process_directional_light(&mut self, light: LightKey);

    /// A particle system is visible
    fn process_particle_system(&mut self, _system: ParticleSystemKey) {}

    /// An occluder inside the frustum was fed to the occlusion rasterizer
    fn process_occluder(&mut self, _occluder: OccluderKey) {}
}

/// Route a proxy owner to the matching visitor method
pub(crate) fn dispatch(owner: ProxyOwner, visitor: &mut dyn VisibilityVisitor) {
    match owner {
        ProxyOwner::Model(key) => visitor.process_model(key),
        ProxyOwner::PointLight(key) => visitor.process_point_light(key),
        ProxyOwner::SpotLight(key) => visitor.process_spot_light(key),
        ProxyOwner::AmbientLight(key) => visitor.process_ambient_light(key),
        ProxyOwner::DirectionalLight(key) => visitor.process_directional_light(key),
        ProxyOwner::ParticleSystem(key) => visitor.process_particle_system(key),
        ProxyOwner::Occluder(key) => visitor.process_occluder(key),
    }
}

/// Visitor that records every callback; handy for queries that only need keys
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct CollectingVisitor {
    /// Reported models in callback order
    pub models: Vec<ModelKey>,
    /// Reported point lights
    pub point_lights: Vec<LightKey>,
    /// Reported spot lights
    pub spot_lights: Vec<LightKey>,
    /// Reported ambient lights
    pub ambient_lights: Vec<LightKey>,
    /// Reported directional lights
    pub directional_lights: Vec<LightKey>,
    /// Reported particle systems
    pub particle_systems: Vec<ParticleSystemKey>,
    /// Reported occluders
    pub occluders: Vec<OccluderKey>,
}

impl CollectingVisitor {
    /// Total number of callbacks received
    pub fn total(&self) -> usize {
        self.models.len()
            + self.point_lights.len()
            + self.spot_lights.len()
            + self.ambient_lights.len()
            + self.directional_lights.len()
            + self.particle_systems.len()
            + self.occluders.len()
    }
}

impl VisibilityVisitor for CollectingVisitor {
    fn process_model(&mut self, model: ModelKey) {
        self.models.push(model);
    }

    fn process_point_light(&mut self, light: LightKey) {
        self.point_lights.push(light);
    }

    fn process_spot_light(&mut self, light: LightKey) {
        self.spot_lights.push(light);
    }

    fn process_ambient_light(&mut self, light: LightKey) {
        self.ambient_lights.push(light);
    }

    fn process_directional_light(&mut self, light: LightKey) {
        self.directional_lights.push(light);
    }

    fn process_particle_system(&mut self, system: ParticleSystemKey) {
        self.particle_systems.push(system);
    }

    fn process_occluder(&mut self, occluder: OccluderKey) {
        self.occluders.push(occluder);
    }
}
