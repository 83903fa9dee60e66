//! Visible-object set
//!
//! Per-query result of the collector. Opaque records are bucketed by material
//! definition so meshes sharing a definition are drawn back to back; transparent
//! records stay in flat lists and are sorted by the compositor.

use std::collections::HashMap;

use crate::culling::CullingStats;
use crate::foundation::collections::{LightKey, MaterialDefinitionId, ModelKey, OccluderKey, ParticleSystemKey};

use super::draw_record::{MeshDrawRecord, TouchingListId};
use super::light_snapshot::{LightClass, LightSnapshot, ShadowSnapshot};

/// A light found by the visibility query
#[derive(Debug, Clone, PartialEq)]
pub struct CollectedLight {
    /// Component the snapshot was taken from
    pub source: LightKey,
    /// Parameter copy
    pub snapshot: LightSnapshot,
    /// Shadow matrices, for shadow casters
    pub shadow: Option<ShadowSnapshot>,
    /// Meshes visible from the light
    pub shadow_casters: Vec<MeshDrawRecord>,
}

impl CollectedLight {
    /// Check if the light renders a shadow map
    pub fn casts_shadows(&self) -> bool {
        self.shadow.is_some()
    }
}

/// Opaque records sharing one material definition
#[derive(Debug, Clone, PartialEq)]
pub struct OpaqueBucket {
    /// Shared definition
    pub definition: MaterialDefinitionId,
    /// Records in insertion order
    pub records: Vec<MeshDrawRecord>,
}

#[derive(Debug, Clone, Default)]
struct BucketList {
    buckets: Vec<OpaqueBucket>,
    lookup: HashMap<MaterialDefinitionId, usize>,
}

impl BucketList {
    fn push(&mut self, record: MeshDrawRecord) {
        let definition = record.material.definition;
        let buckets = &mut self.buckets;
        let index = *self.lookup.entry(definition).or_insert_with(|| {
            buckets.push(OpaqueBucket {
                definition,
                records: Vec::new(),
            });
            buckets.len() - 1
        });
        buckets[index].records.push(record);
    }

    fn records(&self) -> impl Iterator<Item = &MeshDrawRecord> {
        self.buckets.iter().flat_map(|bucket| bucket.records.iter())
    }

    fn len(&self) -> usize {
        self.buckets.iter().map(|bucket| bucket.records.len()).sum()
    }
}

/// Everything one visibility query found, ready for the passes
#[derive(Debug, Clone, Default)]
pub struct VisibleSet {
    opaque: BucketList,
    opaque_last: BucketList,
    /// Alpha-blended records
    pub blended: Vec<MeshDrawRecord>,
    /// Alpha-blended records drawn after `blended`
    pub blended_last: Vec<MeshDrawRecord>,
    /// Refractive records
    pub refractive: Vec<MeshDrawRecord>,
    /// Collected lights; touching lists index into this
    pub lights: Vec<CollectedLight>,
    /// Visible models; model `i` owns touching list `i`
    pub models: Vec<ModelKey>,
    /// Touching-light lists
    pub touching: Vec<Vec<usize>>,
    /// Visible particle systems
    pub particle_systems: Vec<ParticleSystemKey>,
    /// Occluders inside the frustum
    pub occluders: Vec<OccluderKey>,
    /// Counters of the query that built the set
    pub culling: CullingStats,
}

impl VisibleSet {
    /// Create an empty set
    pub fn new() -> Self {
        Self::default()
    }

    /// Classify a record: refractive, then blended, then opaque by definition
    pub fn add_record(&mut self, record: MeshDrawRecord) {
        let last = record.is_draw_last();
        if record.material.is_refractive() {
            self.refractive.push(record);
        } else if record.material.is_blended() {
            if last {
                self.blended_last.push(record);
            } else {
                self.blended.push(record);
            }
        } else if last {
            self.opaque_last.push(record);
        } else {
            self.opaque.push(record);
        }
    }

    /// Opaque buckets drawn first
    pub fn opaque_buckets(&self) -> &[OpaqueBucket] {
        &self.opaque.buckets
    }

    /// Opaque buckets drawn last
    pub fn opaque_last_buckets(&self) -> &[OpaqueBucket] {
        &self.opaque_last.buckets
    }

    /// Every opaque record, normal buckets first
    pub fn opaque_records(&self) -> impl Iterator<Item = &MeshDrawRecord> {
        self.opaque.records().chain(self.opaque_last.records())
    }

    /// Number of opaque records
    pub fn opaque_len(&self) -> usize {
        self.opaque.len() + self.opaque_last.len()
    }

    /// Add a touching-light list, returning its id
    pub fn push_touching_list(&mut self, lights: Vec<usize>) -> TouchingListId {
        self.touching.push(lights);
        self.touching.len() - 1
    }

    /// Lights reaching a record
    pub fn touching_lights(&self, record: &MeshDrawRecord) -> &[usize] {
        record
            .touching_lights
            .and_then(|id| self.touching.get(id))
            .map(Vec::as_slice)
            .unwrap_or_default()
    }

    /// Check if a light reaches a record
    pub fn is_touching(&self, record: &MeshDrawRecord, light: usize) -> bool {
        self.touching_lights(record).contains(&light)
    }

    /// Indices of collected lights of one class, with or without shadows
    pub fn lights_of(&self, class: LightClass, shadowed: bool) -> impl Iterator<Item = usize> + '_ {
        self.lights
            .iter()
            .enumerate()
            .filter(move |(_, light)| light.snapshot.class() == class && light.casts_shadows() == shadowed)
            .map(|(index, _)| index)
    }

    /// Indices of global (ambient and directional) lights
    pub fn global_lights(&self) -> Vec<usize> {
        self.lights
            .iter()
            .enumerate()
            .filter(|(_, light)| light.snapshot.class().is_global())
            .map(|(index, _)| index)
            .collect()
    }

    /// Lighting pass order: plain ambient, directional, point, spot, then the shadowed ones
    pub fn light_order(&self) -> Vec<usize> {
        let mut order = Vec::with_capacity(self.lights.len());
        for shadowed in [false, true] {
            for class in LightClass::ALL {
                order.extend(self.lights_of(class, shadowed));
            }
        }
        order
    }

    /// Number of shadow-casting lights
    pub fn shadow_light_count(&self) -> usize {
        self.lights.iter().filter(|light| light.casts_shadows()).count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use crate::foundation::collections::SlotMap;
    use crate::foundation::math::{Mat4, Vec3};
    use crate::gpu::{PrimitiveMode, VertexArrayHandle};
    use crate::material::{Material, MaterialBlend};
    use crate::render::light_snapshot::ShadowViews;
    use crate::scene::RenderFlags;

    struct Fixture {
        arrays: SlotMap<VertexArrayHandle, ()>,
        definitions: SlotMap<MaterialDefinitionId, ()>,
        lights: SlotMap<LightKey, ()>,
    }

    impl Fixture {
        fn new() -> Self {
            Self {
                arrays: SlotMap::with_key(),
                definitions: SlotMap::with_key(),
                lights: SlotMap::with_key(),
            }
        }

        fn record(&mut self, material: Material, flags: RenderFlags) -> MeshDrawRecord {
            MeshDrawRecord::new(
                self.arrays.insert(()),
                PrimitiveMode::Triangles,
                Some(Arc::new(material)),
                Mat4::identity(),
                flags,
            )
            .unwrap()
        }

        fn light(&mut self, snapshot: LightSnapshot, shadow: bool) -> CollectedLight {
            let shadow = shadow.then(|| ShadowSnapshot {
                projection: Mat4::identity(),
                views: ShadowViews::Single(Mat4::identity()),
                origin: Vec3::zeros(),
                far_plane: 1.0,
            });
            CollectedLight {
                source: self.lights.insert(()),
                snapshot,
                shadow,
                shadow_casters: Vec::new(),
            }
        }
    }

    #[test]
    fn test_bucket_determinism_across_call_orders() {
        let mut fixture = Fixture::new();
        let stone = fixture.definitions.insert(());
        let wood = fixture.definitions.insert(());

        let mut records: Vec<MeshDrawRecord> = (0..6)
            .map(|i| {
                let definition = if i % 2 == 0 { stone } else { wood };
                fixture.record(Material::new(definition), RenderFlags::empty())
            })
            .collect();

        for _ in 0..2 {
            let mut set = VisibleSet::new();
            for record in &records {
                set.add_record(record.clone());
            }
            assert_eq!(set.opaque_buckets().len(), 2);
            for bucket in set.opaque_buckets() {
                assert_eq!(bucket.records.len(), 3);
                assert!(bucket.records.iter().all(|r| r.material.definition == bucket.definition));
            }
            records.reverse();
        }
    }

    #[test]
    fn test_classification_priority() {
        let mut fixture = Fixture::new();
        let definition = fixture.definitions.insert(());

        let mut set = VisibleSet::new();
        set.add_record(fixture.record(
            Material::new(definition).with_blend(MaterialBlend::default()).with_refraction(0.2),
            RenderFlags::empty(),
        ));
        set.add_record(fixture.record(Material::new(definition).with_blend(MaterialBlend::default()), RenderFlags::empty()));
        set.add_record(fixture.record(
            Material::new(definition).with_blend(MaterialBlend::default()),
            RenderFlags::DRAW_LAST,
        ));
        set.add_record(fixture.record(Material::new(definition), RenderFlags::DRAW_LAST));
        set.add_record(fixture.record(Material::new(definition), RenderFlags::empty()));

        assert_eq!(set.refractive.len(), 1);
        assert_eq!(set.blended.len(), 1);
        assert_eq!(set.blended_last.len(), 1);
        assert_eq!(set.opaque_buckets().len(), 1);
        assert_eq!(set.opaque_last_buckets().len(), 1);
        assert_eq!(set.opaque_len(), 2);
        // Normal buckets come before draw-last ones
        let first = set.opaque_records().next().unwrap();
        assert!(!first.is_draw_last());
    }

    #[test]
    fn test_light_order_is_fixed() {
        let mut fixture = Fixture::new();
        let color = Vec3::repeat(1.0);
        let spot = LightSnapshot::Spot {
            color,
            position: Vec3::zeros(),
            direction: Vec3::new(0.0, -1.0, 0.0),
            attenuation: crate::scene::Attenuation::default(),
            radius: 10.0,
            inner_angle: 0.2,
            outer_angle: 0.4,
        };
        let point = LightSnapshot::Point {
            color,
            position: Vec3::zeros(),
            attenuation: crate::scene::Attenuation::default(),
            radius: 10.0,
        };
        let directional = LightSnapshot::Directional {
            color,
            position: Vec3::zeros(),
            direction: Vec3::new(0.0, -1.0, 0.0),
        };

        let mut set = VisibleSet::new();
        set.lights.push(fixture.light(spot, true)); // 0
        set.lights.push(fixture.light(point, false)); // 1
        set.lights.push(fixture.light(directional, true)); // 2
        set.lights.push(fixture.light(LightSnapshot::Ambient { color }, false)); // 3
        set.lights.push(fixture.light(spot, false)); // 4

        assert_eq!(set.light_order(), vec![3, 1, 4, 2, 0]);
        assert_eq!(set.global_lights(), vec![2, 3]);
        assert_eq!(set.shadow_light_count(), 2);
    }

    #[test]
    fn test_touching_lookup() {
        let mut fixture = Fixture::new();
        let definition = fixture.definitions.insert(());
        let mut set = VisibleSet::new();
        let list = set.push_touching_list(vec![0, 2]);

        let mut record = fixture.record(Material::new(definition), RenderFlags::empty());
        assert!(set.touching_lights(&record).is_empty());
        record.touching_lights = Some(list);
        assert!(set.is_touching(&record, 2));
        assert!(!set.is_touching(&record, 1));
    }
}
