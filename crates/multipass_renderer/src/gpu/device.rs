//! Graphics device abstraction
//!
//! The renderer talks to the GPU only through this immediate-mode interface: opaque
//! resource handles plus a small set of bind/set/draw operations. Implementations own
//! all resources they hand out until they are deleted.

use std::any::Any;

use super::types::{
    BlendState, CubeFace, DepthState, DrawCallStatistics, ParameterValue, PrimitiveMode,
    TextureDescriptor, Viewport,
};
use super::{FramebufferHandle, GpuResult, ProgramHandle, TextureHandle, VertexArrayHandle};

/// Stateful immediate-mode graphics API
pub trait GraphicsDevice {
    /// Human readable backend name
    fn name(&self) -> &str;

    /// Create an empty vertex array
    fn create_vertex_array(&mut self) -> GpuResult<VertexArrayHandle>;

    /// Upload interleaved vertex bytes and a triangle/line/point index list
    fn set_vertex_data(
        &mut self,
        array: VertexArrayHandle,
        vertices: &[u8],
        vertex_stride: usize,
        indices: &[u32],
    ) -> GpuResult<()>;

    /// Release a vertex array
    fn delete_vertex_array(&mut self, array: VertexArrayHandle);

    /// Allocate a texture
    fn create_texture(&mut self, descriptor: &TextureDescriptor) -> GpuResult<TextureHandle>;

    /// Upload texel data for mip 0 (all faces for cube textures)
    fn set_texture_data(&mut self, texture: TextureHandle, data: &[u8]) -> GpuResult<()>;

    /// Allocation parameters of a live texture
    fn texture_descriptor(&self, texture: TextureHandle) -> Option<TextureDescriptor>;

    /// Rebuild the mip chain from mip 0
    fn generate_mipmaps(&mut self, texture: TextureHandle) -> GpuResult<()>;

    /// Release a texture
    fn delete_texture(&mut self, texture: TextureHandle);

    /// Create a framebuffer from existing textures; all attachments must share one size
    fn create_framebuffer(
        &mut self,
        depth: Option<TextureHandle>,
        color: &[TextureHandle],
    ) -> GpuResult<FramebufferHandle>;

    /// Select which cube face a cube color attachment renders into
    fn set_cube_face(
        &mut self,
        framebuffer: FramebufferHandle,
        attachment: usize,
        face: CubeFace,
    ) -> GpuResult<()>;

    /// Release a framebuffer (its textures stay alive)
    fn delete_framebuffer(&mut self, framebuffer: FramebufferHandle);

    /// Compile and link a program
    fn create_program(
        &mut self,
        name: &str,
        vertex_source: &str,
        fragment_source: &str,
    ) -> GpuResult<ProgramHandle>;

    /// Release a program
    fn delete_program(&mut self, program: ProgramHandle);

    /// Make a framebuffer current; `None` selects the default back buffer
    fn bind_framebuffer(&mut self, framebuffer: Option<FramebufferHandle>) -> GpuResult<()>;

    /// Set the pixel rectangle draws and clears affect
    fn set_viewport(&mut self, viewport: Viewport);

    /// Select which color attachments of the current framebuffer receive output
    fn set_draw_buffers(&mut self, attachments: &[usize]) -> GpuResult<()>;

    /// Clear the enabled draw buffers and/or the depth attachment
    fn clear(&mut self, color: Option<[f32; 4]>, depth: Option<f32>);

    /// Make a program current; its parameters start unset
    fn bind_program(&mut self, program: ProgramHandle) -> GpuResult<()>;

    /// Set a named parameter on the current program
    fn set_parameter(&mut self, name: &str, value: ParameterValue) -> GpuResult<()>;

    /// Enable blending with the given state, or disable it with `None`
    fn set_blend_state(&mut self, blend: Option<BlendState>);

    /// Depth test and write state
    fn set_depth_state(&mut self, depth: DepthState);

    /// Enable or disable color writes
    fn set_color_write(&mut self, enabled: bool);

    /// Draw a vertex array with the current state
    fn draw(
        &mut self,
        array: VertexArrayHandle,
        primitive: PrimitiveMode,
    ) -> GpuResult<DrawCallStatistics>;

    /// Downcast to the concrete device
    fn as_any(&self) -> &dyn Any;

    /// Downcast to the concrete device mutably
    fn as_any_mut(&mut self) -> &mut dyn Any;
}
