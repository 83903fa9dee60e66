//! Culling proxies and their group/mask filtering
//!
//! Every scene object that takes part in culling is represented by one proxy: a world-space
//! bounding shape, the group it belongs to, the mask of groups it may be matched by, and a
//! back-reference to the owning scene object.

use crate::foundation::collections::{LightKey, ModelKey, OccluderKey, ParticleSystemKey};
use crate::geometry::CullingShape;

bitflags::bitflags! {
    /// Culling groups; a proxy is matched by a query only when the groups line up
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct CullingGroups: u32 {
        /// Renderable models
        const MODEL = 1 << 0;
        /// Point light influence spheres
        const POINT_LIGHT = 1 << 1;
        /// Spot light influence cones
        const SPOT_LIGHT = 1 << 2;
        /// Particle systems
        const PARTICLES = 1 << 3;
        /// Occluder boxes
        const OCCLUDER = 1 << 4;
        /// Ambient and directional lights (never stored in the tree)
        const GLOBAL_LIGHT = 1 << 5;
    }
}

impl CullingGroups {
    /// Matches nothing
    pub const NOTHING: Self = Self::empty();

    /// Default mask for models: lit by point and spot lights
    pub const LIT_BY_LOCAL_LIGHTS: Self = Self::POINT_LIGHT.union(Self::SPOT_LIGHT);

    /// Group/mask test used by contact queries, as in physics collision layers
    pub fn should_match(group_a: Self, mask_a: Self, group_b: Self, mask_b: Self) -> bool {
        group_a.intersects(mask_b) && group_b.intersects(mask_a)
    }
}

/// Scene object a proxy stands for
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ProxyOwner {
    /// Model component
    Model(ModelKey),
    /// Point light component
    PointLight(LightKey),
    /// Spot light component
    SpotLight(LightKey),
    /// Ambient light component (global)
    AmbientLight(LightKey),
    /// Directional light component (global)
    DirectionalLight(LightKey),
    /// Particle system component
    ParticleSystem(ParticleSystemKey),
    /// Occluder component
    Occluder(OccluderKey),
}

impl ProxyOwner {
    /// Group a proxy for this owner belongs to
    pub fn default_groups(&self) -> CullingGroups {
        match self {
            Self::Model(_) => CullingGroups::MODEL,
            Self::PointLight(_) => CullingGroups::POINT_LIGHT,
            Self::SpotLight(_) => CullingGroups::SPOT_LIGHT,
            Self::AmbientLight(_) | Self::DirectionalLight(_) => CullingGroups::GLOBAL_LIGHT,
            Self::ParticleSystem(_) => CullingGroups::PARTICLES,
            Self::Occluder(_) => CullingGroups::OCCLUDER,
        }
    }

    /// Mask a proxy for this owner is created with
    pub fn default_mask(&self) -> CullingGroups {
        match self {
            Self::Model(_) => CullingGroups::LIT_BY_LOCAL_LIGHTS,
            Self::PointLight(_) | Self::SpotLight(_) => CullingGroups::MODEL,
            Self::AmbientLight(_) | Self::DirectionalLight(_) => CullingGroups::MODEL,
            Self::ParticleSystem(_) | Self::Occluder(_) => CullingGroups::NOTHING,
        }
    }

    /// Ambient and directional lights touch everything and live outside the tree
    pub fn is_global(&self) -> bool {
        matches!(self, Self::AmbientLight(_) | Self::DirectionalLight(_))
    }
}

/// Bounding shape plus filtering data for one scene object
#[derive(Debug, Clone, PartialEq)]
pub struct CullingProxy {
    /// World-space bounding shape
    pub shape: CullingShape,
    /// Group this proxy belongs to
    pub groups: CullingGroups,
    /// Groups this proxy may be matched by
    pub mask: CullingGroups,
    /// Owning scene object
    pub owner: ProxyOwner,
}

impl CullingProxy {
    /// Create a proxy with the owner's default group and mask
    pub fn new(owner: ProxyOwner, shape: CullingShape) -> Self {
        Self {
            shape,
            groups: owner.default_groups(),
            mask: owner.default_mask(),
            owner,
        }
    }

    /// Builder-style group override
    #[must_use]
    pub fn with_groups(mut self, groups: CullingGroups, mask: CullingGroups) -> Self {
        self.groups = groups;
        self.mask = mask;
        self
    }

    /// Proxies in group `NOTHING` never match any query
    pub fn is_queryable(&self) -> bool {
        !self.groups.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_should_match_mutual() {
        assert!(CullingGroups::should_match(
            CullingGroups::MODEL,
            CullingGroups::LIT_BY_LOCAL_LIGHTS,
            CullingGroups::POINT_LIGHT,
            CullingGroups::MODEL,
        ));
    }

    #[test]
    fn test_nothing_never_matches() {
        assert!(!CullingGroups::should_match(
            CullingGroups::NOTHING,
            CullingGroups::all(),
            CullingGroups::POINT_LIGHT,
            CullingGroups::all(),
        ));
    }

    #[test]
    fn test_global_owners() {
        let key = LightKey::default();
        assert!(ProxyOwner::AmbientLight(key).is_global());
        assert!(ProxyOwner::DirectionalLight(key).is_global());
        assert!(!ProxyOwner::PointLight(key).is_global());
    }
}
