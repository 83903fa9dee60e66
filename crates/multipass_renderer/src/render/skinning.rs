//! CPU skinning cache
//!
//! Skinned submeshes are deformed on the CPU and uploaded into a vertex array owned by
//! this cache. Each array is refreshed at most once per frame and freed after it has
//! gone unused for the configured number of frames.

use std::collections::HashMap;

use log::{debug, trace};

use crate::foundation::collections::ModelKey;
use crate::foundation::math::Mat4;
use crate::gpu::{GpuResult, GraphicsDevice, VertexArrayHandle};
use crate::scene::mesh::{vertex_bytes, MeshVertex, SkinData};

#[derive(Debug, Clone, Copy)]
struct SkinnedBuffer {
    vertex_array: VertexArrayHandle,
    last_used: u64,
}

/// Per (model, submesh) skinned vertex arrays
#[derive(Debug, Default)]
pub struct SkinningCache {
    buffers: HashMap<(ModelKey, usize), SkinnedBuffer>,
    time_to_live: u64,
}

impl SkinningCache {
    /// Create an empty cache
    pub fn new(time_to_live: u32) -> Self {
        Self {
            buffers: HashMap::new(),
            time_to_live: u64::from(time_to_live),
        }
    }

    /// Number of live skinned arrays
    pub fn len(&self) -> usize {
        self.buffers.len()
    }

    /// Check if the cache holds nothing
    pub fn is_empty(&self) -> bool {
        self.buffers.is_empty()
    }

    /// Vertex array holding the submesh deformed by `pose`
    pub fn skinned_array(
        &mut self,
        device: &mut dyn GraphicsDevice,
        model: ModelKey,
        submesh: usize,
        skin: &SkinData,
        pose: &[Mat4],
        frame: u64,
    ) -> GpuResult<VertexArrayHandle> {
        if let Some(buffer) = self.buffers.get(&(model, submesh)) {
            if buffer.last_used == frame {
                return Ok(buffer.vertex_array);
            }
        }

        let vertex_array = match self.buffers.get(&(model, submesh)) {
            Some(buffer) => buffer.vertex_array,
            None => {
                trace!("Creating skinned buffer for {:?}/{}", model, submesh);
                device.create_vertex_array()?
            }
        };
        let vertices = skin.skin(pose);
        device.set_vertex_data(vertex_array, &vertex_bytes(&vertices), MeshVertex::STRIDE, &skin.indices)?;
        self.buffers.insert(
            (model, submesh),
            SkinnedBuffer {
                vertex_array,
                last_used: frame,
            },
        );
        Ok(vertex_array)
    }

    /// Free arrays unused for longer than the time-to-live
    pub fn collect_garbage(&mut self, device: &mut dyn GraphicsDevice, frame: u64) -> usize {
        let ttl = self.time_to_live;
        let before = self.buffers.len();
        self.buffers.retain(|_, buffer| {
            let alive = frame.saturating_sub(buffer.last_used) <= ttl;
            if !alive {
                device.delete_vertex_array(buffer.vertex_array);
            }
            alive
        });
        let freed = before - self.buffers.len();
        if freed > 0 {
            debug!("Freed {} skinned buffers", freed);
        }
        freed
    }

    /// Free every array
    pub fn release_all(&mut self, device: &mut dyn GraphicsDevice) {
        for (_, buffer) in self.buffers.drain() {
            device.delete_vertex_array(buffer.vertex_array);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::foundation::collections::SlotMap;
    use crate::gpu::HeadlessDevice;

    fn skin() -> SkinData {
        SkinData {
            bind_vertices: vec![MeshVertex::new([0.0, 0.0, 0.0], [0.0, 1.0, 0.0], [0.0, 0.0]); 3],
            indices: vec![0, 1, 2],
            bone_indices: vec![[0; 4]; 3],
            bone_weights: vec![[1.0, 0.0, 0.0, 0.0]; 3],
        }
    }

    #[test]
    fn test_array_reused_and_expired() {
        let mut models: SlotMap<ModelKey, ()> = SlotMap::with_key();
        let model = models.insert(());
        let mut device = HeadlessDevice::new();
        let mut cache = SkinningCache::new(2);
        let pose = [Mat4::identity()];

        let first = cache.skinned_array(&mut device, model, 0, &skin(), &pose, 1).unwrap();
        let again = cache.skinned_array(&mut device, model, 0, &skin(), &pose, 2).unwrap();
        assert_eq!(first, again);
        assert_eq!(device.vertex_array_count(), 1);

        assert_eq!(cache.collect_garbage(&mut device, 4), 0);
        assert_eq!(cache.collect_garbage(&mut device, 5), 1);
        assert!(cache.is_empty());
        assert_eq!(device.vertex_array_count(), 0);
    }
}
