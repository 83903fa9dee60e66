//! Typed slot-map keys shared across the renderer
//!
//! Every arena in the crate (culling proxies, tree nodes, scene objects, viewports,
//! material definitions) hands out one of these stable keys instead of references.

pub use slotmap::{SlotMap, SecondaryMap, Key};

slotmap::new_key_type! {
    /// Culling proxy owned by a [`crate::culling::CullingIndex`]
    pub struct ProxyKey;

    /// Node of the bounding-volume tree
    pub struct BvhNodeKey;

    /// Model component in a [`crate::scene::Scene`]
    pub struct ModelKey;

    /// Light component in a [`crate::scene::Scene`]
    pub struct LightKey;

    /// Particle system component in a [`crate::scene::Scene`]
    pub struct ParticleSystemKey;

    /// Occluder component in a [`crate::scene::Scene`]
    pub struct OccluderKey;

    /// Material definition registered in a [`crate::material::MaterialLibrary`]
    pub struct MaterialDefinitionId;

    /// Viewport registered with a scene renderer
    pub struct ViewportId;

    /// Mesh registered outside the scene (gizmos, debug geometry)
    pub struct ExternalMeshKey;
}
