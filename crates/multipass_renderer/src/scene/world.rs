//! Default scene container
//!
//! Keeps models, lights, particle systems and occluders in slot maps and mirrors each
//! of them as a culling proxy. Every edit goes through the scene so proxies always
//! bound their owner's current world extent.

use log::{debug, trace};

use crate::config::RendererSettings;
use crate::culling::{box_occluder, world_aabb, CullingIndex, CullingProxy, CullingStats, OcclusionRasterizer, ProxyOwner, VisibilityVisitor};
use crate::foundation::collections::{LightKey, ModelKey, OccluderKey, ParticleSystemKey, ProxyKey, SlotMap};
use crate::foundation::math::Mat4;
use crate::geometry::CullingShape;

use super::light::{LightComponent, LightKind};
use super::model::ModelComponent;
use super::particles::{OccluderComponent, ParticleSystemComponent};
use super::query::SceneQuery;

#[derive(Debug, Clone)]
struct Entry<T> {
    component: T,
    proxy: ProxyKey,
}

/// Scene owning components and their culling index
#[derive(Debug, Clone)]
pub struct Scene {
    culling: CullingIndex,
    models: SlotMap<ModelKey, Entry<ModelComponent>>,
    lights: SlotMap<LightKey, Entry<LightComponent>>,
    particle_systems: SlotMap<ParticleSystemKey, Entry<ParticleSystemComponent>>,
    occluders: SlotMap<OccluderKey, Entry<OccluderComponent>>,
    light_cutoff: f32,
}

impl Default for Scene {
    fn default() -> Self {
        Self::from_settings(&RendererSettings::default())
    }
}

impl Scene {
    /// Create an empty scene
    pub fn new(tree_margin: f32, light_cutoff: f32) -> Self {
        Self {
            culling: CullingIndex::new(tree_margin),
            models: SlotMap::with_key(),
            lights: SlotMap::with_key(),
            particle_systems: SlotMap::with_key(),
            occluders: SlotMap::with_key(),
            light_cutoff,
        }
    }

    /// Create an empty scene using the renderer's culling settings
    pub fn from_settings(settings: &RendererSettings) -> Self {
        Self::new(settings.culling_tree_margin, settings.light_cutoff)
    }

    /// The culling index
    pub fn culling(&self) -> &CullingIndex {
        &self.culling
    }

    /// Culling proxy key of a model
    pub fn model_proxy(&self, key: ModelKey) -> Option<ProxyKey> {
        self.models.get(key).map(|entry| entry.proxy)
    }

    /// Culling proxy key of a light
    pub fn light_proxy(&self, key: LightKey) -> Option<ProxyKey> {
        self.lights.get(key).map(|entry| entry.proxy)
    }

    /// Number of models
    pub fn model_count(&self) -> usize {
        self.models.len()
    }

    /// Number of lights
    pub fn light_count(&self) -> usize {
        self.lights.len()
    }

    /// Iterate models
    pub fn models(&self) -> impl Iterator<Item = (ModelKey, &ModelComponent)> {
        self.models.iter().map(|(key, entry)| (key, &entry.component))
    }

    /// Iterate lights
    pub fn lights(&self) -> impl Iterator<Item = (LightKey, &LightComponent)> {
        self.lights.iter().map(|(key, entry)| (key, &entry.component))
    }

    /// Add a model
    pub fn add_model(&mut self, model: ModelComponent) -> ModelKey {
        let shape = world_aabb(&model.local_bounds(), &model.transform);
        let culling = &mut self.culling;
        let key = self.models.insert_with_key(|key| {
            let proxy = culling.insert(CullingProxy::new(ProxyOwner::Model(key), shape));
            Entry { component: model, proxy }
        });
        trace!("Model {:?} added", key);
        key
    }

    /// Remove a model and its proxy
    pub fn remove_model(&mut self, key: ModelKey) -> Option<ModelComponent> {
        let entry = self.models.remove(key)?;
        self.culling.remove(entry.proxy);
        Some(entry.component)
    }

    /// Edit a model; its proxy is reshaped afterwards
    pub fn update_model<R>(&mut self, key: ModelKey, edit: impl FnOnce(&mut ModelComponent) -> R) -> Option<R> {
        let entry = self.models.get_mut(key)?;
        let result = edit(&mut entry.component);
        let shape = world_aabb(&entry.component.local_bounds(), &entry.component.transform);
        self.culling.update_transform(entry.proxy, shape);
        Some(result)
    }

    /// Move a model
    pub fn set_model_transform(&mut self, key: ModelKey, transform: Mat4) -> bool {
        self.update_model(key, |model| model.transform = transform).is_some()
    }

    /// Add a light
    pub fn add_light(&mut self, light: LightComponent) -> LightKey {
        let shape = light.culling_shape(self.light_cutoff);
        let culling = &mut self.culling;
        let key = self.lights.insert_with_key(|key| {
            let proxy = culling.insert(CullingProxy::new(light.proxy_owner(key), shape));
            Entry { component: light, proxy }
        });
        debug!("Light {:?} added", key);
        key
    }

    /// Remove a light and its proxy
    pub fn remove_light(&mut self, key: LightKey) -> Option<LightComponent> {
        let entry = self.lights.remove(key)?;
        self.culling.remove(entry.proxy);
        Some(entry.component)
    }

    /// Edit a light; its proxy is reshaped afterwards
    ///
    /// Changing the light's kind replaces the proxy since its owner kind changes.
    pub fn update_light<R>(&mut self, key: LightKey, edit: impl FnOnce(&mut LightComponent) -> R) -> Option<R> {
        let entry = self.lights.get_mut(key)?;
        let previous = std::mem::discriminant(&entry.component.kind);
        let result = edit(&mut entry.component);
        let shape = entry.component.culling_shape(self.light_cutoff);

        if previous == std::mem::discriminant(&entry.component.kind) {
            self.culling.update_transform(entry.proxy, shape);
        } else {
            self.culling.remove(entry.proxy);
            entry.proxy = self
                .culling
                .insert(CullingProxy::new(entry.component.proxy_owner(key), shape));
        }
        Some(result)
    }

    /// Add a particle system
    pub fn add_particle_system(&mut self, system: ParticleSystemComponent) -> ParticleSystemKey {
        let shape = CullingShape::Aabb(system.bounds);
        let culling = &mut self.culling;
        self.particle_systems.insert_with_key(|key| {
            let proxy = culling.insert(CullingProxy::new(ProxyOwner::ParticleSystem(key), shape));
            Entry { component: system, proxy }
        })
    }

    /// Remove a particle system and its proxy
    pub fn remove_particle_system(&mut self, key: ParticleSystemKey) -> Option<ParticleSystemComponent> {
        let entry = self.particle_systems.remove(key)?;
        self.culling.remove(entry.proxy);
        Some(entry.component)
    }

    /// Edit a particle system; its proxy is reshaped afterwards
    pub fn update_particle_system<R>(
        &mut self,
        key: ParticleSystemKey,
        edit: impl FnOnce(&mut ParticleSystemComponent) -> R,
    ) -> Option<R> {
        let entry = self.particle_systems.get_mut(key)?;
        let result = edit(&mut entry.component);
        self.culling
            .update_transform(entry.proxy, CullingShape::Aabb(entry.component.bounds));
        Some(result)
    }

    /// Add an occluder
    pub fn add_occluder(&mut self, occluder: OccluderComponent) -> OccluderKey {
        let shape = box_occluder(occluder.half_extents, occluder.transform);
        let culling = &mut self.culling;
        self.occluders.insert_with_key(|key| {
            let proxy = culling.insert(CullingProxy::new(ProxyOwner::Occluder(key), shape));
            Entry { component: occluder, proxy }
        })
    }

    /// Remove an occluder and its proxy
    pub fn remove_occluder(&mut self, key: OccluderKey) -> Option<OccluderComponent> {
        let entry = self.occluders.remove(key)?;
        self.culling.remove(entry.proxy);
        Some(entry.component)
    }

    /// Move an occluder
    pub fn set_occluder_transform(&mut self, key: OccluderKey, transform: Mat4) -> bool {
        let Some(entry) = self.occluders.get_mut(key) else {
            return false;
        };
        entry.component.transform = transform;
        self.culling
            .update_transform(entry.proxy, box_occluder(entry.component.half_extents, transform));
        true
    }

    /// Occluder lookup
    pub fn occluder(&self, key: OccluderKey) -> Option<&OccluderComponent> {
        self.occluders.get(key).map(|entry| &entry.component)
    }

    fn light_contacts(&self, light: LightKey, visitor: &mut dyn VisibilityVisitor) -> usize {
        match self.lights.get(light) {
            Some(entry) => self.culling.query_volume_contacts(entry.proxy, visitor),
            None => {
                debug_assert!(false, "contact query for unknown light {light:?}");
                0
            }
        }
    }
}

impl SceneQuery for Scene {
    fn query_visible_objects(
        &self,
        view_projection: &Mat4,
        visitor: &mut dyn VisibilityVisitor,
        occlusion: Option<&mut OcclusionRasterizer>,
    ) -> CullingStats {
        self.culling.query_visible(view_projection, visitor, occlusion)
    }

    fn query_point_light_contacts(&self, light: LightKey, visitor: &mut dyn VisibilityVisitor) -> usize {
        debug_assert!(
            self.lights
                .get(light)
                .map_or(true, |entry| matches!(entry.component.kind, LightKind::Point { .. })),
            "point contact query for a non-point light"
        );
        self.light_contacts(light, visitor)
    }

    fn query_spot_light_contacts(&self, light: LightKey, visitor: &mut dyn VisibilityVisitor) -> usize {
        debug_assert!(
            self.lights
                .get(light)
                .map_or(true, |entry| matches!(entry.component.kind, LightKind::Spot { .. })),
            "spot contact query for a non-spot light"
        );
        self.light_contacts(light, visitor)
    }

    fn model(&self, key: ModelKey) -> Option<&ModelComponent> {
        self.models.get(key).map(|entry| &entry.component)
    }

    fn light(&self, key: LightKey) -> Option<&LightComponent> {
        self.lights.get(key).map(|entry| &entry.component)
    }

    fn particle_system(&self, key: ParticleSystemKey) -> Option<&ParticleSystemComponent> {
        self.particle_systems.get(key).map(|entry| &entry.component)
    }

    fn light_cutoff(&self) -> f32 {
        self.light_cutoff
    }
}
