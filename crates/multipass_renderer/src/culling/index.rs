//! Spatial culling index
//!
//! Owns every culling proxy of a scene. Local objects live in a bounding-volume tree;
//! ambient and directional lights are global and kept beside it. Two queries run against it:
//! a frustum (plus optional occlusion) visibility walk and a light volume contact walk.

use log::{debug, trace};

use crate::foundation::collections::{BvhNodeKey, ProxyKey, SlotMap};
use crate::foundation::math::{Mat4, Vec3};
use crate::geometry::{CullingShape, Frustum, AABB};

use super::bvh::BoundingVolumeTree;
use super::occlusion::OcclusionRasterizer;
use super::proxy::{CullingGroups, CullingProxy, ProxyOwner};
use super::visitor::{dispatch, VisibilityVisitor};

/// Counters for one visibility query
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CullingStats {
    /// Tree nodes whose bounds were tested
    pub nodes_tested: u32,
    /// Nodes rejected by the frustum
    pub frustum_culled: u32,
    /// Nodes rejected by the occlusion buffer (with their subtrees)
    pub occlusion_culled: u32,
    /// Occluders found inside the frustum
    pub occluders: u32,
    /// Visitor callbacks issued
    pub reported: u32,
}

#[derive(Debug, Clone)]
struct ProxyEntry {
    proxy: CullingProxy,
    leaf: Option<BvhNodeKey>,
}

/// Bounding-volume tree of culling proxies plus the global lights
#[derive(Debug, Clone, Default)]
pub struct CullingIndex {
    proxies: SlotMap<ProxyKey, ProxyEntry>,
    tree: BoundingVolumeTree,
    occluder_count: usize,
}

impl CullingIndex {
    /// Create an empty index; `margin` fattens leaf bounds in the tree
    pub fn new(margin: f32) -> Self {
        Self {
            proxies: SlotMap::with_key(),
            tree: BoundingVolumeTree::new(margin),
            occluder_count: 0,
        }
    }

    /// Number of proxies, global ones included
    pub fn len(&self) -> usize {
        self.proxies.len()
    }

    /// Check if the index holds no proxies
    pub fn is_empty(&self) -> bool {
        self.proxies.is_empty()
    }

    /// Proxy lookup
    pub fn proxy(&self, key: ProxyKey) -> Option<&CullingProxy> {
        self.proxies.get(key).map(|entry| &entry.proxy)
    }

    /// The tree holding local proxies
    pub fn tree(&self) -> &BoundingVolumeTree {
        &self.tree
    }

    /// Add a proxy; global lights bypass the tree
    pub fn insert(&mut self, proxy: CullingProxy) -> ProxyKey {
        let global = proxy.owner.is_global();
        let aabb = proxy.shape.aabb();
        if matches!(proxy.owner, ProxyOwner::Occluder(_)) {
            self.occluder_count += 1;
        }

        let key = self.proxies.insert(ProxyEntry { proxy, leaf: None });
        if !global {
            let leaf = self.tree.insert(key, aabb);
            if let Some(entry) = self.proxies.get_mut(key) {
                entry.leaf = Some(leaf);
            }
        }
        trace!("Culling proxy {:?} inserted (global: {})", key, global);
        key
    }

    /// Remove a proxy, returning it
    ///
    /// Removing a proxy that is not in the index is a caller error.
    pub fn remove(&mut self, key: ProxyKey) -> Option<CullingProxy> {
        debug_assert!(self.proxies.contains_key(key), "removing unknown culling proxy {key:?}");
        let entry = self.proxies.remove(key)?;
        if let Some(leaf) = entry.leaf {
            self.tree.remove(leaf);
        }
        if matches!(entry.proxy.owner, ProxyOwner::Occluder(_)) {
            self.occluder_count -= 1;
        }
        Some(entry.proxy)
    }

    /// Replace a proxy's world-space shape after its owner moved or changed bounds
    pub fn update_transform(&mut self, key: ProxyKey, shape: CullingShape) {
        let Some(entry) = self.proxies.get_mut(key) else {
            debug_assert!(false, "updating unknown culling proxy {key:?}");
            return;
        };
        entry.proxy.shape = shape;
        if let Some(leaf) = entry.leaf {
            self.tree.update(leaf, shape.aabb());
        }
    }

    /// Change which queries may match a proxy
    pub fn set_groups(&mut self, key: ProxyKey, groups: CullingGroups, mask: CullingGroups) {
        if let Some(entry) = self.proxies.get_mut(key) {
            entry.proxy.groups = groups;
            entry.proxy.mask = mask;
        }
    }

    /// Report everything visible through `view_projection`
    ///
    /// Global lights are always reported. When a rasterizer is given it is reset for the
    /// matrix and filled with the occluders inside the frustum, then consulted before each
    /// subtree is entered.
    pub fn query_visible(
        &self,
        view_projection: &Mat4,
        visitor: &mut dyn VisibilityVisitor,
        mut occlusion: Option<&mut OcclusionRasterizer>,
    ) -> CullingStats {
        let mut stats = CullingStats::default();
        if self.proxies.is_empty() {
            return stats;
        }
        let frustum = Frustum::from_matrix(view_projection, true);

        for entry in self.proxies.values() {
            if entry.leaf.is_none() && entry.proxy.is_queryable() {
                dispatch(entry.proxy.owner, visitor);
                stats.reported += 1;
            }
        }

        if self.occluder_count > 0 {
            let occluders = self.visible_occluders(&frustum);
            if let Some(rasterizer) = occlusion.as_deref_mut() {
                let (width, height) = (rasterizer.width(), rasterizer.height());
                rasterizer.reset(view_projection, width, height);
                for proxy in &occluders {
                    match proxy.shape {
                        CullingShape::OrientedBox(obb) => {
                            rasterizer.append_occluder(obb.half_extents, &obb.transform);
                        }
                        shape => {
                            let aabb = shape.aabb();
                            rasterizer.append_occluder(aabb.extents(), &Mat4::new_translation(&aabb.center()));
                        }
                    }
                }
            }
            for proxy in &occluders {
                dispatch(proxy.owner, visitor);
                stats.reported += 1;
                stats.occluders += 1;
            }
        } else if let Some(rasterizer) = occlusion.as_deref_mut() {
            let (width, height) = (rasterizer.width(), rasterizer.height());
            rasterizer.reset(view_projection, width, height);
        }

        self.tree.walk(|bounds, leaf| {
            stats.nodes_tested += 1;
            if !frustum.intersects_aabb(bounds) {
                stats.frustum_culled += 1;
                return false;
            }
            if stats.occluders > 0 {
                if let Some(rasterizer) = occlusion.as_deref_mut() {
                    if rasterizer.query_occluder(bounds.center(), bounds.extents()) {
                        stats.occlusion_culled += 1;
                        return false;
                    }
                }
            }

            if let Some(entry) = leaf.and_then(|key| self.proxies.get(key)) {
                let proxy = &entry.proxy;
                if proxy.is_queryable()
                    && !matches!(proxy.owner, ProxyOwner::Occluder(_))
                    && shape_in_frustum(&frustum, &proxy.shape)
                {
                    dispatch(proxy.owner, visitor);
                    stats.reported += 1;
                }
            }
            true
        });

        debug!(
            "Visibility query: {} nodes tested, {} frustum culled, {} occlusion culled, {} reported",
            stats.nodes_tested, stats.frustum_culled, stats.occlusion_culled, stats.reported
        );
        stats
    }

    /// Report proxies inside a light's influence volume
    ///
    /// Only proxies whose mask intersects the light's group are reported. Returns the
    /// number of callbacks.
    pub fn query_volume_contacts(&self, light: ProxyKey, visitor: &mut dyn VisibilityVisitor) -> usize {
        let Some(light_entry) = self.proxies.get(light) else {
            debug_assert!(false, "contact query for unknown culling proxy {light:?}");
            return 0;
        };
        let light_proxy = &light_entry.proxy;
        if !light_proxy.is_queryable() {
            return 0;
        }
        let volume = light_proxy.shape;
        let volume_bounds = volume.aabb();

        let mut reported = 0;
        self.tree.walk(|bounds, leaf| {
            if !volume_bounds.intersects(bounds) || !volume.intersects_aabb(bounds) {
                return false;
            }
            let Some(key) = leaf else {
                return true;
            };
            if key == light {
                return true;
            }
            if let Some(entry) = self.proxies.get(key) {
                let proxy = &entry.proxy;
                if proxy.is_queryable()
                    && proxy.mask.intersects(light_proxy.groups)
                    && volume.intersects_aabb(&proxy.shape.aabb())
                {
                    dispatch(proxy.owner, visitor);
                    reported += 1;
                }
            }
            true
        });
        reported
    }

    fn visible_occluders(&self, frustum: &Frustum) -> Vec<CullingProxy> {
        let mut occluders = Vec::new();
        self.tree.walk(|bounds, leaf| {
            if !frustum.intersects_aabb(bounds) {
                return false;
            }
            if let Some(entry) = leaf.and_then(|key| self.proxies.get(key)) {
                if entry.proxy.is_queryable()
                    && matches!(entry.proxy.owner, ProxyOwner::Occluder(_))
                    && frustum.intersects_aabb(&entry.proxy.shape.aabb())
                {
                    occluders.push(entry.proxy.clone());
                }
            }
            true
        });
        occluders
    }
}

fn shape_in_frustum(frustum: &Frustum, shape: &CullingShape) -> bool {
    match shape {
        CullingShape::Sphere(sphere) => frustum.intersects_sphere(sphere),
        other => frustum.intersects_aabb(&other.aabb()),
    }
}

/// World-space box helper for proxies built from a local box and a transform
pub fn world_aabb(local: &AABB, transform: &Mat4) -> CullingShape {
    CullingShape::Aabb(local.transformed(transform))
}

/// Shape helper for an oriented box occluder
pub fn box_occluder(half_extents: Vec3, transform: Mat4) -> CullingShape {
    CullingShape::OrientedBox(crate::geometry::OrientedBox::new(half_extents, transform))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::culling::visitor::CollectingVisitor;
    use crate::foundation::collections::{LightKey, ModelKey, OccluderKey};
    use crate::foundation::math::Mat4Ext;
    use crate::geometry::{BoundingSphere, Cone};

    struct Keys {
        models: SlotMap<ModelKey, ()>,
        lights: SlotMap<LightKey, ()>,
        occluders: SlotMap<OccluderKey, ()>,
    }

    impl Keys {
        fn new() -> Self {
            Self {
                models: SlotMap::with_key(),
                lights: SlotMap::with_key(),
                occluders: SlotMap::with_key(),
            }
        }
    }

    fn camera() -> Mat4 {
        let projection = Mat4::perspective(std::f32::consts::FRAC_PI_2, 1.0, 0.1, 100.0);
        let view = Mat4::look_at(Vec3::zeros(), Vec3::new(0.0, 0.0, -1.0), Vec3::y());
        projection * view
    }

    fn model_at(keys: &mut Keys, center: Vec3) -> (ModelKey, CullingProxy) {
        let model = keys.models.insert(());
        let shape = CullingShape::Aabb(AABB::from_center_extents(center, Vec3::repeat(0.5)));
        (model, CullingProxy::new(ProxyOwner::Model(model), shape))
    }

    #[test]
    fn test_empty_index_reports_nothing() {
        let index = CullingIndex::default();
        let mut visitor = CollectingVisitor::default();
        let stats = index.query_visible(&camera(), &mut visitor, None);
        assert_eq!(visitor.total(), 0);
        assert_eq!(stats, CullingStats::default());
    }

    #[test]
    fn test_frustum_culling_inside_and_outside() {
        let mut keys = Keys::new();
        let mut index = CullingIndex::new(0.1);

        let mut inside = Vec::new();
        let mut outside = Vec::new();
        for i in 0..20 {
            let (key, proxy) = model_at(&mut keys, Vec3::new(0.0, 0.0, -2.0 - i as f32 * 3.0));
            index.insert(proxy);
            inside.push(key);
            let (key, proxy) = model_at(&mut keys, Vec3::new(0.0, 0.0, 5.0 + i as f32 * 3.0));
            index.insert(proxy);
            outside.push(key);
        }

        let mut visitor = CollectingVisitor::default();
        index.query_visible(&camera(), &mut visitor, None);

        assert!(inside.iter().all(|k| visitor.models.contains(k)));
        assert!(outside.iter().all(|k| !visitor.models.contains(k)));
    }

    #[test]
    fn test_global_lights_always_reported() {
        let mut keys = Keys::new();
        let mut index = CullingIndex::default();
        let ambient = keys.lights.insert(());
        let directional = keys.lights.insert(());
        let far_away = CullingShape::Sphere(BoundingSphere::new(Vec3::new(0.0, 0.0, 1000.0), 1.0));
        index.insert(CullingProxy::new(ProxyOwner::AmbientLight(ambient), far_away));
        index.insert(CullingProxy::new(ProxyOwner::DirectionalLight(directional), far_away));

        let mut visitor = CollectingVisitor::default();
        index.query_visible(&camera(), &mut visitor, None);
        assert_eq!(visitor.ambient_lights, vec![ambient]);
        assert_eq!(visitor.directional_lights, vec![directional]);
    }

    #[test]
    fn test_nothing_group_never_matches() {
        let mut keys = Keys::new();
        let mut index = CullingIndex::default();
        let (_, proxy) = model_at(&mut keys, Vec3::new(0.0, 0.0, -5.0));
        index.insert(proxy.with_groups(CullingGroups::NOTHING, CullingGroups::all()));

        let mut visitor = CollectingVisitor::default();
        index.query_visible(&camera(), &mut visitor, None);
        assert!(visitor.models.is_empty());
    }

    #[test]
    fn test_occluder_hides_model_but_is_not_visible() {
        let mut keys = Keys::new();
        let mut index = CullingIndex::default();

        let (hidden, proxy) = model_at(&mut keys, Vec3::new(0.0, 0.0, -20.0));
        index.insert(proxy);
        let (shown, proxy) = model_at(&mut keys, Vec3::new(0.0, 0.0, -3.0));
        index.insert(proxy);

        let occluder = keys.occluders.insert(());
        let transform = Mat4::new_translation(&Vec3::new(0.0, 0.0, -8.0));
        index.insert(CullingProxy::new(
            ProxyOwner::Occluder(occluder),
            box_occluder(Vec3::new(6.0, 6.0, 0.5), transform),
        ));

        let mut rasterizer = OcclusionRasterizer::new(64, 64);
        let mut visitor = CollectingVisitor::default();
        let stats = index.query_visible(&camera(), &mut visitor, Some(&mut rasterizer));

        assert_eq!(visitor.models, vec![shown]);
        assert!(!visitor.models.contains(&hidden));
        assert_eq!(visitor.occluders, vec![occluder]);
        assert!(stats.occlusion_culled > 0);

        // Without occlusion the hidden model comes back
        let mut visitor = CollectingVisitor::default();
        index.query_visible(&camera(), &mut visitor, None);
        assert!(visitor.models.contains(&hidden));
    }

    #[test]
    fn test_update_transform_moves_proxy_out_of_view() {
        let mut keys = Keys::new();
        let mut index = CullingIndex::default();
        let (model, proxy) = model_at(&mut keys, Vec3::new(0.0, 0.0, -5.0));
        let key = index.insert(proxy);

        index.update_transform(
            key,
            CullingShape::Aabb(AABB::from_center_extents(Vec3::new(0.0, 0.0, 50.0), Vec3::repeat(0.5))),
        );
        let mut visitor = CollectingVisitor::default();
        index.query_visible(&camera(), &mut visitor, None);
        assert!(!visitor.models.contains(&model));

        assert!(index.remove(key).is_some());
        assert!(index.is_empty());
    }

    #[test]
    fn test_point_light_contacts_respect_volume_and_mask() {
        let mut keys = Keys::new();
        let mut index = CullingIndex::default();

        let (near, proxy) = model_at(&mut keys, Vec3::new(1.0, 0.0, 0.0));
        index.insert(proxy);
        let (far, proxy) = model_at(&mut keys, Vec3::new(20.0, 0.0, 0.0));
        index.insert(proxy);
        let (unlit, proxy) = model_at(&mut keys, Vec3::new(-1.0, 0.0, 0.0));
        index.insert(proxy.with_groups(CullingGroups::MODEL, CullingGroups::SPOT_LIGHT));

        let light = keys.lights.insert(());
        let light_key = index.insert(CullingProxy::new(
            ProxyOwner::PointLight(light),
            CullingShape::Sphere(BoundingSphere::new(Vec3::zeros(), 5.0)),
        ));

        let mut visitor = CollectingVisitor::default();
        let count = index.query_volume_contacts(light_key, &mut visitor);
        assert_eq!(count, 1);
        assert_eq!(visitor.models, vec![near]);
        assert!(!visitor.models.contains(&far));
        assert!(!visitor.models.contains(&unlit));
    }

    #[test]
    fn test_spot_light_contacts_only_inside_cone() {
        let mut keys = Keys::new();
        let mut index = CullingIndex::default();

        let (lit, proxy) = model_at(&mut keys, Vec3::new(0.0, -5.0, 0.0));
        index.insert(proxy);
        let (behind, proxy) = model_at(&mut keys, Vec3::new(0.0, 5.0, 0.0));
        index.insert(proxy);

        let light = keys.lights.insert(());
        let light_key = index.insert(CullingProxy::new(
            ProxyOwner::SpotLight(light),
            CullingShape::Cone(Cone::new(Vec3::zeros(), Vec3::new(0.0, -1.0, 0.0), 10.0, 0.4)),
        ));

        let mut visitor = CollectingVisitor::default();
        index.query_volume_contacts(light_key, &mut visitor);
        assert_eq!(visitor.models, vec![lit]);
        assert!(!visitor.models.contains(&behind));
    }
}
