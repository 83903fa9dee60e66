//! Light-contact resolver
//!
//! Fills the touching-light list of every visible model. Ambient and directional
//! lights reach everything; point and spot lights reach what their volume contact
//! query reports.

use std::collections::HashMap;

use log::trace;

use crate::culling::VisibilityVisitor;
use crate::foundation::collections::{LightKey, ModelKey};
use crate::scene::SceneQuery;

use super::light_snapshot::LightClass;
use super::visible_set::VisibleSet;

/// Visitor keeping only the models a contact query touches
#[derive(Debug, Default)]
struct ContactVisitor {
    models: Vec<ModelKey>,
}

impl VisibilityVisitor for ContactVisitor {
    fn process_model(&mut self, model: ModelKey) {
        self.models.push(model);
    }

    fn process_point_light(&mut self, _light: LightKey) {}

    fn process_spot_light(&mut self, _light: LightKey) {}

    fn process_ambient_light(&mut self, _light: LightKey) {}

    fn process_directional_light(&mut self, _light: LightKey) {}
}

/// Resolve touching lights for `set.models`
///
/// `set.touching` ends up with one list per visible model, in the same order. Returns
/// the number of (model, local light) contacts found.
pub fn resolve_light_contacts(scene: &dyn SceneQuery, set: &mut VisibleSet) -> usize {
    let model_index: HashMap<ModelKey, usize> = set
        .models
        .iter()
        .enumerate()
        .map(|(index, key)| (*key, index))
        .collect();

    let globals = set.global_lights();
    set.touching.clear();
    set.touching.resize(set.models.len(), Vec::new());
    for list in &mut set.touching {
        list.extend_from_slice(&globals);
    }

    let mut contacts = 0;
    let mut visitor = ContactVisitor::default();
    for (light_index, light) in set.lights.iter().enumerate() {
        visitor.models.clear();
        match light.snapshot.class() {
            LightClass::Point => {
                scene.query_point_light_contacts(light.source, &mut visitor);
            }
            LightClass::Spot => {
                scene.query_spot_light_contacts(light.source, &mut visitor);
            }
            LightClass::Ambient | LightClass::Directional => continue,
        }

        for model in &visitor.models {
            // Touched but not visible: nothing to light
            if let Some(&index) = model_index.get(model) {
                set.touching[index].push(light_index);
                contacts += 1;
            }
        }
        trace!("Light {:?} touches {} models", light.source, visitor.models.len());
    }
    contacts
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RendererSettings;
    use crate::foundation::math::{Mat4, Vec3};
    use crate::render::light_snapshot::LightSnapshot;
    use crate::render::visible_set::CollectedLight;
    use crate::scene::{Attenuation, LightComponent, ModelComponent, Scene};

    fn collect(scene: &Scene, key: LightKey) -> CollectedLight {
        let light = scene.light(key).unwrap();
        let snapshot = LightSnapshot::capture(light, scene.light_cutoff());
        CollectedLight {
            source: key,
            snapshot,
            shadow: None,
            shadow_casters: Vec::new(),
        }
    }

    #[test]
    fn test_global_and_local_lights_resolved() {
        let mut scene = Scene::from_settings(&RendererSettings::default());
        let near = scene.add_model(ModelComponent::default().with_transform(Mat4::new_translation(&Vec3::new(2.0, 0.0, 0.0))));
        let far = scene.add_model(ModelComponent::default().with_transform(Mat4::new_translation(&Vec3::new(300.0, 0.0, 0.0))));
        let ambient = scene.add_light(LightComponent::ambient(Vec3::repeat(0.1)));
        let point = scene.add_light(LightComponent::point(Vec3::zeros(), Vec3::repeat(1.0), Attenuation::new(1.0, 0.0, 1.0)));

        let mut set = VisibleSet::new();
        set.models = vec![near, far];
        set.lights.push(collect(&scene, ambient));
        set.lights.push(collect(&scene, point));

        let contacts = resolve_light_contacts(&scene, &mut set);
        assert_eq!(contacts, 1);
        assert_eq!(set.touching[0], vec![0, 1]);
        assert_eq!(set.touching[1], vec![0]);
    }

    #[test]
    fn test_invisible_touched_models_are_ignored() {
        let mut scene = Scene::default();
        scene.add_model(ModelComponent::default());
        let point = scene.add_light(LightComponent::point(Vec3::zeros(), Vec3::repeat(1.0), Attenuation::default()));

        let mut set = VisibleSet::new();
        set.lights.push(collect(&scene, point));
        assert_eq!(resolve_light_contacts(&scene, &mut set), 0);
        assert!(set.touching.is_empty());
    }
}
