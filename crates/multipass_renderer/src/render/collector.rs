//! Visible-object collector
//!
//! The visitor handed to a scene's visibility query. Callbacks only record keys and
//! light snapshots; [`VisibleObjectCollector::post_process`] then resolves light
//! contacts, expands models into per-submesh draw records (skinning first where a pose
//! is set) and gathers each shadow-casting light's caster list.

use std::collections::HashSet;
use std::sync::Arc;

use log::{debug, trace};

use crate::config::RendererSettings;
use crate::culling::{CollectingVisitor, OcclusionRasterizer, VisibilityVisitor};
use crate::foundation::collections::{LightKey, ModelKey, OccluderKey, ParticleSystemKey};
use crate::foundation::math::Mat4;
use crate::gpu::{GpuResult, GraphicsDevice};
use crate::material::Material;
use crate::scene::{MeshAsset, ModelComponent, RenderFlags, SceneQuery};

use super::draw_record::{MeshDrawRecord, TouchingListId};
use super::light_contacts::resolve_light_contacts;
use super::light_snapshot::LightSnapshot;
use super::skinning::SkinningCache;
use super::visible_set::{CollectedLight, VisibleSet};

/// Builds a [`VisibleSet`] from visibility callbacks
pub struct VisibleObjectCollector<'a> {
    scene: &'a dyn SceneQuery,
    settings: &'a RendererSettings,
    set: VisibleSet,
    seen_models: HashSet<ModelKey>,
}

impl<'a> VisibleObjectCollector<'a> {
    /// Create a collector for one query against `scene`
    pub fn new(scene: &'a dyn SceneQuery, settings: &'a RendererSettings) -> Self {
        Self {
            scene,
            settings,
            set: VisibleSet::new(),
            seen_models: HashSet::new(),
        }
    }

    /// Run the camera query and post-process the result
    pub fn collect(
        scene: &'a dyn SceneQuery,
        settings: &'a RendererSettings,
        view_projection: &Mat4,
        occlusion: Option<&mut OcclusionRasterizer>,
        device: &mut dyn GraphicsDevice,
        skinning: &mut SkinningCache,
        frame: u64,
    ) -> GpuResult<VisibleSet> {
        let mut collector = Self::new(scene, settings);
        let culling = scene.query_visible_objects(view_projection, &mut collector, occlusion);
        collector.set.culling = culling;
        collector.post_process(device, skinning, frame)?;
        Ok(collector.finish())
    }

    /// Result collected so far
    pub fn visible_set(&self) -> &VisibleSet {
        &self.set
    }

    /// Take the collected set
    pub fn finish(self) -> VisibleSet {
        self.set
    }

    /// Enqueue the bind-pose submeshes of a mesh
    ///
    /// Submeshes whose material slot is empty are skipped. Returns the number of
    /// records added.
    pub fn add_mesh(
        &mut self,
        mesh: &MeshAsset,
        materials: &[Option<Arc<Material>>],
        transform: Mat4,
        touching: Option<TouchingListId>,
        flags: RenderFlags,
    ) -> usize {
        let mut added = 0;
        for submesh in &mesh.submeshes {
            let material = materials.get(submesh.material_slot).cloned().flatten();
            if let Some(mut record) = MeshDrawRecord::new(submesh.vertex_array, submesh.primitive, material, transform, flags) {
                record.touching_lights = touching;
                self.set.add_record(record);
                added += 1;
            }
        }
        added
    }

    /// Resolve contacts, expand models and gather shadow casters
    pub fn post_process(
        &mut self,
        device: &mut dyn GraphicsDevice,
        skinning: &mut SkinningCache,
        frame: u64,
    ) -> GpuResult<()> {
        // (a) global lights and (b) point/spot contacts
        let contacts = resolve_light_contacts(self.scene, &mut self.set);

        // (c) per-submesh records
        let models = self.set.models.clone();
        let mut skipped = 0;
        for (index, key) in models.iter().enumerate() {
            let Some(model) = self.scene.model(*key) else {
                continue;
            };
            if model.mesh.is_none() {
                skipped += 1;
                continue;
            }
            for mut record in expand_model(device, skinning, frame, *key, model)? {
                record.touching_lights = Some(index);
                self.set.add_record(record);
            }
        }
        if skipped > 0 {
            debug!("Skipped {} visible models without a loaded mesh", skipped);
        }

        let globals = self.set.global_lights();
        for key in self.set.particle_systems.clone() {
            let Some(system) = self.scene.particle_system(key) else {
                continue;
            };
            let record = MeshDrawRecord::new(
                system.vertex_array,
                system.primitive,
                system.material.clone(),
                Mat4::identity(),
                RenderFlags::empty(),
            );
            if let Some(mut record) = record {
                record.touching_lights = Some(self.set.push_touching_list(globals.clone()));
                self.set.add_record(record);
            }
        }

        // (d) shadow casters per light view
        let mut shadow_lights = 0;
        for light_index in 0..self.set.lights.len() {
            let Some(shadow) = self.set.lights[light_index].shadow else {
                continue;
            };
            let mut casters = Vec::new();
            let mut seen = HashSet::new();
            for view_projection in shadow.view_projections() {
                let mut visitor = CollectingVisitor::default();
                self.scene.query_visible_objects(&view_projection, &mut visitor, None);
                for key in visitor.models {
                    if !seen.insert(key) {
                        continue;
                    }
                    let Some(model) = self.scene.model(key) else {
                        continue;
                    };
                    if !model.cast_shadows || model.mesh.is_none() {
                        continue;
                    }
                    casters.extend(
                        expand_model(device, skinning, frame, key, model)?
                            .into_iter()
                            .filter(|record| !record.material.is_refractive()),
                    );
                }
            }
            trace!(
                "Light {:?} has {} shadow casters",
                self.set.lights[light_index].source,
                casters.len()
            );
            self.set.lights[light_index].shadow_casters = casters;
            shadow_lights += 1;
        }

        debug!(
            "Collected {} models, {} lights ({} shadowed), {} contacts, {} opaque / {} blended / {} refractive records",
            self.set.models.len(),
            self.set.lights.len(),
            shadow_lights,
            contacts,
            self.set.opaque_len(),
            self.set.blended.len() + self.set.blended_last.len(),
            self.set.refractive.len()
        );
        Ok(())
    }

    /// Every notification gets its own entry, even for a light already collected
    fn collect_light(&mut self, key: LightKey) {
        let Some(light) = self.scene.light(key) else {
            return;
        };
        let snapshot = LightSnapshot::capture(light, self.scene.light_cutoff());
        let shadow = if light.cast_shadows {
            snapshot.shadow(self.settings)
        } else {
            None
        };
        self.set.lights.push(CollectedLight {
            source: key,
            snapshot,
            shadow,
            shadow_casters: Vec::new(),
        });
    }
}

impl VisibilityVisitor for VisibleObjectCollector<'_> {
    fn process_model(&mut self, model: ModelKey) {
        if self.seen_models.insert(model) {
            self.set.models.push(model);
        }
    }

    fn process_point_light(&mut self, light: LightKey) {
        self.collect_light(light);
    }

    fn process_spot_light(&mut self, light: LightKey) {
        self.collect_light(light);
    }

    fn process_ambient_light(&mut self, light: LightKey) {
        self.collect_light(light);
    }

    fn process_directional_light(&mut self, light: LightKey) {
        self.collect_light(light);
    }

    fn process_particle_system(&mut self, system: ParticleSystemKey) {
        self.set.particle_systems.push(system);
    }

    fn process_occluder(&mut self, occluder: OccluderKey) {
        self.set.occluders.push(occluder);
    }
}

/// Per-submesh records of a model, skinned where the model has a pose
fn expand_model(
    device: &mut dyn GraphicsDevice,
    skinning: &mut SkinningCache,
    frame: u64,
    key: ModelKey,
    model: &ModelComponent,
) -> GpuResult<Vec<MeshDrawRecord>> {
    let Some(mesh) = model.mesh.as_ref() else {
        return Ok(Vec::new());
    };
    let mut records = Vec::with_capacity(mesh.submeshes.len());
    for (index, submesh) in mesh.submeshes.iter().enumerate() {
        let Some(material) = model.material(submesh.material_slot) else {
            trace!("Submesh {} of '{}' has no material", index, mesh.name);
            continue;
        };
        let vertex_array = match (&submesh.skin, &model.pose) {
            (Some(skin), Some(pose)) => skinning.skinned_array(device, key, index, skin, pose, frame)?,
            _ => submesh.vertex_array,
        };
        let record = MeshDrawRecord::new(
            vertex_array,
            submesh.primitive,
            Some(Arc::clone(material)),
            model.transform,
            model.flags,
        );
        if let Some(mut record) = record {
            record.model = Some(key);
            records.push(record);
        }
    }
    Ok(records)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::foundation::collections::{MaterialDefinitionId, SlotMap};
    use crate::foundation::math::{Mat4Ext, Vec3, Vec4};
    use crate::geometry::AABB;
    use crate::gpu::HeadlessDevice;
    use crate::material::MaterialBlend;
    use crate::scene::{box_data, Attenuation, LightComponent, ParticleSystemComponent, Scene};

    struct Fixture {
        device: HeadlessDevice,
        scene: Scene,
        settings: RendererSettings,
        skinning: SkinningCache,
        mesh: Arc<MeshAsset>,
        definitions: SlotMap<MaterialDefinitionId, ()>,
    }

    impl Fixture {
        fn new() -> Self {
            let mut device = HeadlessDevice::new();
            let mesh = Arc::new(MeshAsset::upload(&mut device, "box", vec![box_data(Vec3::repeat(0.5))]).unwrap());
            let settings = RendererSettings::default();
            Self {
                device,
                scene: Scene::from_settings(&settings),
                settings,
                skinning: SkinningCache::new(10),
                mesh,
                definitions: SlotMap::with_key(),
            }
        }

        fn material(&mut self) -> Arc<Material> {
            Arc::new(Material::new(self.definitions.insert(())))
        }

        fn add_box(&mut self, material: Arc<Material>, position: Vec3) -> ModelKey {
            let model = ModelComponent::new(self.mesh.clone(), material).with_transform(Mat4::new_translation(&position));
            self.scene.add_model(model)
        }

        fn collect(&mut self, view_projection: &Mat4) -> VisibleSet {
            VisibleObjectCollector::collect(
                &self.scene,
                &self.settings,
                view_projection,
                None,
                &mut self.device,
                &mut self.skinning,
                1,
            )
            .unwrap()
        }
    }

    fn camera() -> Mat4 {
        let projection = Mat4::perspective(std::f32::consts::FRAC_PI_2, 1.0, 0.1, 100.0);
        projection * Mat4::look_at(Vec3::new(0.0, 0.0, 10.0), Vec3::zeros(), Vec3::y())
    }

    #[test]
    fn test_records_classified_and_bucketed() {
        let mut fixture = Fixture::new();
        let opaque = fixture.material();
        let blended = Arc::new(
            Material::new(fixture.definitions.insert(()))
                .with_diffuse_color(Vec4::new(1.0, 1.0, 1.0, 0.5))
                .with_blend(MaterialBlend::default()),
        );
        fixture.add_box(opaque.clone(), Vec3::new(-1.0, 0.0, 0.0));
        fixture.add_box(opaque, Vec3::new(1.0, 0.0, 0.0));
        fixture.add_box(blended, Vec3::zeros());

        let set = fixture.collect(&camera());
        assert_eq!(set.models.len(), 3);
        assert_eq!(set.opaque_buckets().len(), 1);
        assert_eq!(set.opaque_len(), 2);
        assert_eq!(set.blended.len(), 1);
        assert_eq!(set.touching.len(), 3);
    }

    #[test]
    fn test_models_without_mesh_are_skipped() {
        let mut fixture = Fixture::new();
        fixture.scene.add_model(ModelComponent::default());
        let set = fixture.collect(&camera());
        assert_eq!(set.models.len(), 1);
        assert_eq!(set.opaque_len(), 0);
    }

    #[test]
    fn test_shadow_casters_gathered_per_light() {
        let mut fixture = Fixture::new();
        let material = fixture.material();
        let caster = fixture.add_box(material.clone(), Vec3::zeros());
        let receiver_only = fixture.scene.add_model(
            ModelComponent::new(fixture.mesh.clone(), material)
                .with_transform(Mat4::new_translation(&Vec3::new(2.0, 0.0, 0.0)))
                .with_shadows(false),
        );
        fixture
            .scene
            .add_light(LightComponent::directional(Vec3::new(0.0, -1.0, 0.0), Vec3::repeat(1.0)).with_shadows(true));
        fixture.scene.add_light(LightComponent::ambient(Vec3::repeat(0.2)));

        let set = fixture.collect(&camera());
        assert_eq!(set.lights.len(), 2);
        let shadowed: Vec<_> = set.lights.iter().filter(|light| light.casts_shadows()).collect();
        assert_eq!(shadowed.len(), 1);
        let casters: Vec<_> = shadowed[0].shadow_casters.iter().filter_map(|record| record.model).collect();
        assert_eq!(casters, vec![caster]);
        assert!(!casters.contains(&receiver_only));
    }

    #[test]
    fn test_particles_get_global_lights() {
        let mut fixture = Fixture::new();
        let ambient = fixture.scene.add_light(LightComponent::ambient(Vec3::repeat(0.2)));
        let array = fixture.device.create_vertex_array().unwrap();
        let material = Arc::new(
            Material::new(fixture.definitions.insert(())).with_blend(MaterialBlend::default()),
        );
        fixture.scene.add_particle_system(ParticleSystemComponent::new(
            array,
            material,
            AABB::from_center_extents(Vec3::zeros(), Vec3::repeat(1.0)),
        ));

        let set = fixture.collect(&camera());
        assert_eq!(set.particle_systems.len(), 1);
        let record = &set.blended[0];
        let lights = set.touching_lights(record);
        assert_eq!(lights.len(), 1);
        assert_eq!(set.lights[lights[0]].source, ambient);
    }

    #[test]
    fn test_repeated_light_notifications_give_independent_snapshots() {
        let fixture = Fixture::new();
        let mut scene = Scene::from_settings(&fixture.settings);
        let light = scene.add_light(LightComponent::point(
            Vec3::new(1.0, 2.0, 3.0),
            Vec3::new(1.0, 0.5, 0.25),
            Attenuation::default(),
        ));

        let mut collector = VisibleObjectCollector::new(&scene, &fixture.settings);
        collector.process_point_light(light);
        collector.process_point_light(light);
        let set = collector.finish();

        assert_eq!(set.lights.len(), 2);
        assert_eq!(set.lights[0].source, light);
        assert_eq!(set.lights[1].source, light);
        assert_eq!(set.lights[0].snapshot, set.lights[1].snapshot);

        // Snapshots are copies; editing the light afterwards changes neither
        let captured = set.lights[0].snapshot;
        scene.update_light(light, |component| component.color = Vec3::zeros());
        assert_eq!(set.lights[0].snapshot, captured);
        assert_eq!(set.lights[1].snapshot, captured);
        assert_eq!(captured.color(), Vec3::new(1.0, 0.5, 0.25));
    }

    #[test]
    fn test_add_mesh_skips_empty_slots() {
        let mut fixture = Fixture::new();
        let scene = Scene::default();
        let mut collector = VisibleObjectCollector::new(&scene, &fixture.settings);
        let material = Arc::new(Material::new(fixture.definitions.insert(())));
        assert_eq!(collector.add_mesh(&fixture.mesh, &[None], Mat4::identity(), None, RenderFlags::empty()), 0);
        assert_eq!(collector.add_mesh(&fixture.mesh, &[Some(material)], Mat4::identity(), None, RenderFlags::empty()), 1);
        assert_eq!(collector.finish().opaque_len(), 1);
    }
}
