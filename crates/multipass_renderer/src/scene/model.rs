//! Model components
//!
//! A model places a mesh asset in the world with one material per submesh slot.

use std::sync::Arc;

use crate::foundation::math::{Mat4, Vec3};
use crate::geometry::AABB;
use crate::material::Material;

use super::mesh::MeshAsset;

bitflags::bitflags! {
    /// Per-mesh render behavior
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct RenderFlags: u32 {
        /// Drawn after every other mesh of its pass
        const DRAW_LAST = 1 << 0;
        /// Ignore the depth buffer
        const NO_DEPTH_TEST = 1 << 1;
        /// Do not write depth
        const NO_DEPTH_WRITE = 1 << 2;
        /// Shade with the interpolated vertex normal only
        const NO_NORMAL_MAPPING = 1 << 3;
        /// Overlay the selection highlight
        const HIGHLIGHT = 1 << 4;
    }
}

/// Placed mesh with its materials
#[derive(Debug, Clone)]
pub struct ModelComponent {
    /// Geometry; `None` while the asset is still loading
    pub mesh: Option<Arc<MeshAsset>>,
    /// Material per submesh slot; empty slots are not drawn
    pub materials: Vec<Option<Arc<Material>>>,
    /// Model to world transform
    pub transform: Mat4,
    /// Render behavior shared by every submesh
    pub flags: RenderFlags,
    /// Drawn into shadow maps
    pub cast_shadows: bool,
    /// Bone matrices for skinned submeshes
    pub pose: Option<Vec<Mat4>>,
    /// Bounds used while no mesh is loaded
    pub placeholder_bounds: AABB,
}

impl Default for ModelComponent {
    fn default() -> Self {
        Self {
            mesh: None,
            materials: Vec::new(),
            transform: Mat4::identity(),
            flags: RenderFlags::empty(),
            cast_shadows: true,
            pose: None,
            placeholder_bounds: AABB::from_center_extents(Vec3::zeros(), Vec3::repeat(0.5)),
        }
    }
}

impl ModelComponent {
    /// Model with a mesh and one material for every slot
    pub fn new(mesh: Arc<MeshAsset>, material: Arc<Material>) -> Self {
        let slots = mesh
            .submeshes
            .iter()
            .map(|submesh| submesh.material_slot + 1)
            .max()
            .unwrap_or(1);
        Self {
            mesh: Some(mesh),
            materials: vec![Some(material); slots],
            ..Default::default()
        }
    }

    /// Set the transform
    #[must_use]
    pub fn with_transform(mut self, transform: Mat4) -> Self {
        self.transform = transform;
        self
    }

    /// Set the render flags
    #[must_use]
    pub fn with_flags(mut self, flags: RenderFlags) -> Self {
        self.flags = flags;
        self
    }

    /// Set whether the model casts shadows
    #[must_use]
    pub fn with_shadows(mut self, cast_shadows: bool) -> Self {
        self.cast_shadows = cast_shadows;
        self
    }

    /// Material for a submesh slot
    pub fn material(&self, slot: usize) -> Option<&Arc<Material>> {
        self.materials.get(slot).and_then(Option::as_ref)
    }

    /// Check if the selection highlight is drawn
    pub fn is_highlighted(&self) -> bool {
        self.flags.contains(RenderFlags::HIGHLIGHT)
    }

    /// Model-space bounds
    pub fn local_bounds(&self) -> AABB {
        self.mesh
            .as_ref()
            .map_or(self.placeholder_bounds, |mesh| mesh.local_bounds)
    }

    /// World-space bounds
    pub fn world_bounds(&self) -> AABB {
        self.local_bounds().transformed(&self.transform)
    }
}
