//! Viewport framebuffer manager
//!
//! Every viewport owns one set of render targets, all sized to the viewport:
//!
//! * a depth buffer shared by every scene pass
//! * the HDR color buffer (mipmapped so bloom and exposure can read averaged levels)
//! * diffuse and specular light accumulation buffers
//! * a background copy read by refractive materials
//! * a bloom buffer and the final LDR output
//!
//! Resizing builds the new set before the old one is released, so a failed resize
//! leaves the viewport usable at its previous size.

use log::{debug, info, warn};

use crate::foundation::collections::{SlotMap, ViewportId};
use crate::gpu::{
    FramebufferHandle, GpuResult, GraphicsDevice, PrimitiveMode, TextureDescriptor, TextureFormat,
    TextureHandle, VertexArrayHandle, Viewport,
};
use crate::scene::mesh::{vertex_bytes, MeshVertex};

use super::error::{RenderError, RenderResult};

/// Scene framebuffer attachment receiving material color
pub const COLOR_ATTACHMENT: usize = 0;
/// Scene framebuffer attachment accumulating diffuse light
pub const DIFFUSE_ATTACHMENT: usize = 1;
/// Scene framebuffer attachment accumulating specular light
pub const SPECULAR_ATTACHMENT: usize = 2;

/// Render targets of one viewport
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ViewportFramebuffer {
    /// Width in pixels
    pub width: u32,
    /// Height in pixels
    pub height: u32,
    /// Shared depth buffer
    pub depth: TextureHandle,
    /// HDR scene color with a mip chain
    pub color: TextureHandle,
    /// Diffuse light accumulation
    pub diffuse_light: TextureHandle,
    /// Specular light accumulation
    pub specular_light: TextureHandle,
    /// Copy of the scene behind refractive objects
    pub background: TextureHandle,
    /// Bloom bright-pass output
    pub bloom: TextureHandle,
    /// Tone-mapped output
    pub output: TextureHandle,
    /// Depth + color + diffuse + specular
    pub scene_target: FramebufferHandle,
    /// Background only
    pub background_target: FramebufferHandle,
    /// Bloom only
    pub bloom_target: FramebufferHandle,
    /// Output only
    pub output_target: FramebufferHandle,
}

impl ViewportFramebuffer {
    /// Allocate every target at `width` x `height`
    pub fn create(device: &mut dyn GraphicsDevice, width: u32, height: u32) -> RenderResult<Self> {
        if width == 0 || height == 0 {
            return Err(RenderError::InvalidViewportSize { width, height });
        }

        let mut textures = Vec::with_capacity(7);
        let mut framebuffers = Vec::with_capacity(4);
        match Self::allocate(device, width, height, &mut textures, &mut framebuffers) {
            Ok(set) => Ok(set),
            Err(err) => {
                warn!("Failed to allocate {}x{} viewport targets: {}", width, height, err);
                for framebuffer in framebuffers {
                    device.delete_framebuffer(framebuffer);
                }
                for texture in textures {
                    device.delete_texture(texture);
                }
                Err(err.into())
            }
        }
    }

    fn allocate(
        device: &mut dyn GraphicsDevice,
        width: u32,
        height: u32,
        textures: &mut Vec<TextureHandle>,
        framebuffers: &mut Vec<FramebufferHandle>,
    ) -> GpuResult<Self> {
        let mut texture = |device: &mut dyn GraphicsDevice, descriptor: TextureDescriptor| {
            let handle = device.create_texture(&descriptor)?;
            textures.push(handle);
            Ok::<_, crate::gpu::GpuError>(handle)
        };

        let depth = texture(device, TextureDescriptor::new_2d(TextureFormat::Depth32F, width, height))?;
        let color = texture(device, TextureDescriptor::new_2d(TextureFormat::Rgba16F, width, height).with_mipmaps())?;
        let diffuse_light = texture(device, TextureDescriptor::new_2d(TextureFormat::Rgba16F, width, height))?;
        let specular_light = texture(device, TextureDescriptor::new_2d(TextureFormat::Rgba16F, width, height))?;
        let background = texture(device, TextureDescriptor::new_2d(TextureFormat::Rgba16F, width, height))?;
        let bloom = texture(device, TextureDescriptor::new_2d(TextureFormat::Rgba16F, width, height))?;
        let output = texture(device, TextureDescriptor::new_2d(TextureFormat::Rgba8, width, height))?;

        let mut framebuffer = |device: &mut dyn GraphicsDevice, depth: Option<TextureHandle>, color: &[TextureHandle]| {
            let handle = device.create_framebuffer(depth, color)?;
            framebuffers.push(handle);
            Ok::<_, crate::gpu::GpuError>(handle)
        };

        let scene_target = framebuffer(device, Some(depth), &[color, diffuse_light, specular_light])?;
        let background_target = framebuffer(device, None, &[background])?;
        let bloom_target = framebuffer(device, None, &[bloom])?;
        let output_target = framebuffer(device, None, &[output])?;

        Ok(Self {
            width,
            height,
            depth,
            color,
            diffuse_light,
            specular_light,
            background,
            bloom,
            output,
            scene_target,
            background_target,
            bloom_target,
            output_target,
        })
    }

    /// Viewport covering the whole target
    pub fn viewport(&self) -> Viewport {
        Viewport::sized(self.width, self.height)
    }

    /// Every texture of the set
    pub fn textures(&self) -> [TextureHandle; 7] {
        [
            self.depth,
            self.color,
            self.diffuse_light,
            self.specular_light,
            self.background,
            self.bloom,
            self.output,
        ]
    }

    /// Delete every target
    pub fn release(&self, device: &mut dyn GraphicsDevice) {
        for framebuffer in [self.scene_target, self.background_target, self.bloom_target, self.output_target] {
            device.delete_framebuffer(framebuffer);
        }
        for texture in self.textures() {
            device.delete_texture(texture);
        }
    }
}

/// Framebuffer sets keyed by viewport
#[derive(Debug, Default)]
pub struct FramebufferManager {
    viewports: SlotMap<ViewportId, ViewportFramebuffer>,
}

impl FramebufferManager {
    /// Create a manager with no viewports
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of live viewports
    pub fn len(&self) -> usize {
        self.viewports.len()
    }

    /// Check if there are no viewports
    pub fn is_empty(&self) -> bool {
        self.viewports.is_empty()
    }

    /// Allocate a viewport
    pub fn add(&mut self, device: &mut dyn GraphicsDevice, width: u32, height: u32) -> RenderResult<ViewportId> {
        let set = ViewportFramebuffer::create(device, width, height)?;
        let id = self.viewports.insert(set);
        info!("Viewport {:?} created at {}x{}", id, width, height);
        Ok(id)
    }

    /// Reallocate a viewport's targets at a new size
    pub fn resize(
        &mut self,
        device: &mut dyn GraphicsDevice,
        id: ViewportId,
        width: u32,
        height: u32,
    ) -> RenderResult<()> {
        let current = self.viewports.get(id).ok_or(RenderError::UnknownViewport(id))?;
        if current.width == width && current.height == height {
            return Ok(());
        }

        let replacement = ViewportFramebuffer::create(device, width, height)?;
        if let Some(slot) = self.viewports.get_mut(id) {
            let previous = std::mem::replace(slot, replacement);
            previous.release(device);
        }
        debug!("Viewport {:?} resized to {}x{}", id, width, height);
        Ok(())
    }

    /// Release a viewport
    pub fn remove(&mut self, device: &mut dyn GraphicsDevice, id: ViewportId) -> RenderResult<()> {
        let set = self.viewports.remove(id).ok_or(RenderError::UnknownViewport(id))?;
        set.release(device);
        info!("Viewport {:?} removed", id);
        Ok(())
    }

    /// Targets of a viewport
    pub fn get(&self, id: ViewportId) -> RenderResult<&ViewportFramebuffer> {
        self.viewports.get(id).ok_or(RenderError::UnknownViewport(id))
    }

    /// Release every viewport
    pub fn release_all(&mut self, device: &mut dyn GraphicsDevice) {
        for (_, set) in self.viewports.drain() {
            set.release(device);
        }
    }
}

/// Vertex array holding one triangle that covers the screen
pub fn create_fullscreen_triangle(device: &mut dyn GraphicsDevice) -> GpuResult<VertexArrayHandle> {
    let normal = [0.0, 0.0, 1.0];
    let vertices = [
        MeshVertex::new([-1.0, -1.0, 0.0], normal, [0.0, 0.0]),
        MeshVertex::new([3.0, -1.0, 0.0], normal, [2.0, 0.0]),
        MeshVertex::new([-1.0, 3.0, 0.0], normal, [0.0, 2.0]),
    ];
    let array = device.create_vertex_array()?;
    if let Err(err) = device.set_vertex_data(array, &vertex_bytes(&vertices), MeshVertex::STRIDE, &[0, 1, 2]) {
        device.delete_vertex_array(array);
        return Err(err);
    }
    Ok(array)
}

/// Primitive mode of [`create_fullscreen_triangle`]
pub const FULLSCREEN_PRIMITIVE: PrimitiveMode = PrimitiveMode::Triangles;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gpu::HeadlessDevice;

    #[test]
    fn test_add_allocates_full_size_targets() {
        let mut device = HeadlessDevice::new();
        let mut manager = FramebufferManager::new();
        let id = manager.add(&mut device, 320, 200).unwrap();
        let set = manager.get(id).unwrap();

        assert_eq!(device.texture_count(), 7);
        assert_eq!(device.framebuffer_count(), 4);
        for texture in set.textures() {
            let descriptor = device.texture_descriptor(texture).unwrap();
            assert_eq!((descriptor.width, descriptor.height), (320, 200));
        }
        assert!(device.texture_descriptor(set.color).unwrap().mipmapped);

        let (depth, color) = device.framebuffer_attachments(set.scene_target).unwrap();
        assert_eq!(depth, Some(set.depth));
        assert_eq!(color[DIFFUSE_ATTACHMENT], set.diffuse_light);
        assert_eq!(color[SPECULAR_ATTACHMENT], set.specular_light);
    }

    #[test]
    fn test_resize_replaces_and_releases() {
        let mut device = HeadlessDevice::new();
        let mut manager = FramebufferManager::new();
        let id = manager.add(&mut device, 800, 600).unwrap();
        let old_depth = manager.get(id).unwrap().depth;

        manager.resize(&mut device, id, 1920, 1080).unwrap();
        let set = manager.get(id).unwrap();
        assert_eq!((set.width, set.height), (1920, 1080));
        assert!(device.texture_descriptor(old_depth).is_none());
        assert_eq!(device.texture_count(), 7);
        assert_eq!(device.framebuffer_count(), 4);
    }

    #[test]
    fn test_failed_resize_keeps_previous_targets() {
        let mut device = HeadlessDevice::new();
        let mut manager = FramebufferManager::new();
        let id = manager.add(&mut device, 64, 64).unwrap();

        let result = manager.resize(&mut device, id, 0, 64);
        assert_eq!(result, Err(RenderError::InvalidViewportSize { width: 0, height: 64 }));
        assert_eq!(manager.get(id).unwrap().width, 64);
        assert_eq!(device.texture_count(), 7);
    }

    #[test]
    fn test_unknown_viewport_is_an_error() {
        let mut device = HeadlessDevice::new();
        let mut manager = FramebufferManager::new();
        let id = manager.add(&mut device, 16, 16).unwrap();
        manager.remove(&mut device, id).unwrap();

        assert_eq!(manager.get(id).err(), Some(RenderError::UnknownViewport(id)));
        assert_eq!(manager.remove(&mut device, id), Err(RenderError::UnknownViewport(id)));
        assert_eq!(device.texture_count(), 0);
    }
}
