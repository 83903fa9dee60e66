//! Mesh draw records

use std::sync::Arc;

use crate::foundation::collections::ModelKey;
use crate::foundation::math::{Mat4, Mat4Ext, Vec3};
use crate::gpu::{CompareFunc, DepthState, PrimitiveMode, VertexArrayHandle};
use crate::material::Material;
use crate::scene::RenderFlags;

/// Index of a touching-light list inside a [`super::VisibleSet`]
pub type TouchingListId = usize;

/// One submesh ready to draw
#[derive(Debug, Clone, PartialEq)]
pub struct MeshDrawRecord {
    /// Geometry
    pub vertex_array: VertexArrayHandle,
    /// Primitive assembly
    pub primitive: PrimitiveMode,
    /// Material; a record cannot exist without one
    pub material: Arc<Material>,
    /// Model to world transform
    pub world_transform: Mat4,
    /// Render behavior
    pub flags: RenderFlags,
    /// Lights that reach this mesh
    pub touching_lights: Option<TouchingListId>,
    /// Model the record was expanded from
    pub model: Option<ModelKey>,
}

impl MeshDrawRecord {
    /// Build a record; `None` when there is no material to draw with
    pub fn new(
        vertex_array: VertexArrayHandle,
        primitive: PrimitiveMode,
        material: Option<Arc<Material>>,
        world_transform: Mat4,
        flags: RenderFlags,
    ) -> Option<Self> {
        Some(Self {
            vertex_array,
            primitive,
            material: material?,
            world_transform,
            flags,
            touching_lights: None,
            model: None,
        })
    }

    /// Check if the record is drawn after its bucket peers
    pub fn is_draw_last(&self) -> bool {
        self.flags.contains(RenderFlags::DRAW_LAST)
    }

    /// World position of the record's origin
    pub fn position(&self) -> Vec3 {
        self.world_transform.translation_part()
    }

    /// Depth state for passes that write depth
    pub fn depth_state(&self) -> DepthState {
        DepthState {
            test: (!self.flags.contains(RenderFlags::NO_DEPTH_TEST)).then_some(CompareFunc::LessOrEqual),
            write: !self.flags.contains(RenderFlags::NO_DEPTH_WRITE),
        }
    }

    /// Depth state for passes that shade pixels the depth pre-pass resolved.
    /// Records that never write depth cannot match it exactly and test like the pre-pass.
    pub fn equal_depth_state(&self) -> DepthState {
        if self.flags.contains(RenderFlags::NO_DEPTH_TEST) {
            DepthState::disabled()
        } else if self.flags.contains(RenderFlags::NO_DEPTH_WRITE) {
            DepthState {
                test: Some(CompareFunc::LessOrEqual),
                write: false,
            }
        } else {
            DepthState::equal_read_only()
        }
    }

    /// Depth state for transparent draws: test against the opaque scene, never write
    pub fn transparent_depth_state(&self) -> DepthState {
        DepthState {
            test: (!self.flags.contains(RenderFlags::NO_DEPTH_TEST)).then_some(CompareFunc::LessOrEqual),
            write: false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::foundation::collections::{MaterialDefinitionId, SlotMap};

    fn array() -> VertexArrayHandle {
        let mut arrays: SlotMap<VertexArrayHandle, ()> = SlotMap::with_key();
        arrays.insert(())
    }

    #[test]
    fn test_record_requires_material() {
        let record = MeshDrawRecord::new(array(), PrimitiveMode::Triangles, None, Mat4::identity(), RenderFlags::empty());
        assert!(record.is_none());
    }

    #[test]
    fn test_flags_suppress_depth() {
        let mut definitions: SlotMap<MaterialDefinitionId, ()> = SlotMap::with_key();
        let material = Arc::new(Material::new(definitions.insert(())));
        let record = MeshDrawRecord::new(
            array(),
            PrimitiveMode::Triangles,
            Some(material),
            Mat4::identity(),
            RenderFlags::NO_DEPTH_TEST | RenderFlags::NO_DEPTH_WRITE,
        )
        .unwrap();
        assert_eq!(record.depth_state(), DepthState::disabled());
        assert_eq!(record.equal_depth_state(), DepthState::disabled());
    }

    #[test]
    fn test_unwritten_depth_is_not_tested_for_equality() {
        let mut definitions: SlotMap<MaterialDefinitionId, ()> = SlotMap::with_key();
        let material = Arc::new(Material::new(definitions.insert(())));
        let record = MeshDrawRecord::new(
            array(),
            PrimitiveMode::Triangles,
            Some(material),
            Mat4::identity(),
            RenderFlags::NO_DEPTH_WRITE,
        )
        .unwrap();
        let read_only = DepthState {
            test: Some(CompareFunc::LessOrEqual),
            write: false,
        };
        assert_eq!(record.depth_state(), read_only);
        assert_eq!(record.equal_depth_state(), read_only);
    }
}
