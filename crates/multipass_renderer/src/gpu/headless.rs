//! Headless graphics device
//!
//! Tracks every resource in slot maps and records each state-changing command with a
//! snapshot of the bound state. No pixels are produced; the command log is what tests and
//! tools inspect.

use std::any::Any;
use std::collections::BTreeMap;

use log::{debug, trace, warn};

use crate::foundation::collections::SlotMap;

use super::device::GraphicsDevice;
use super::types::{
    BlendState, CubeFace, DepthState, DrawCallStatistics, ParameterValue, PrimitiveMode,
    TextureDescriptor, TextureKind, Viewport,
};
use super::{
    FramebufferHandle, GpuError, GpuResult, ProgramHandle, TextureHandle, VertexArrayHandle,
};

#[derive(Debug, Clone, Default)]
struct VertexArrayRecord {
    vertex_count: usize,
    index_count: usize,
}

#[derive(Debug, Clone)]
struct TextureRecord {
    descriptor: TextureDescriptor,
    uploaded_bytes: usize,
}

#[derive(Debug, Clone)]
struct FramebufferRecord {
    depth: Option<TextureHandle>,
    color: Vec<TextureHandle>,
    faces: Vec<Option<CubeFace>>,
}

#[derive(Debug, Clone)]
struct ProgramRecord {
    name: String,
}

/// Snapshot of the state a draw was issued with
#[derive(Debug, Clone, PartialEq)]
pub struct DrawRecord {
    /// Bound framebuffer (`None` = back buffer)
    pub framebuffer: Option<FramebufferHandle>,
    /// Active viewport
    pub viewport: Viewport,
    /// Enabled color attachments
    pub draw_buffers: Vec<usize>,
    /// Cube face of the first color attachment, for cube targets
    pub cube_face: Option<CubeFace>,
    /// Bound program
    pub program: ProgramHandle,
    /// Name the program was created with
    pub program_name: String,
    /// Drawn vertex array
    pub vertex_array: VertexArrayHandle,
    /// Primitive mode
    pub primitive: PrimitiveMode,
    /// Blend state (`None` = disabled)
    pub blend: Option<BlendState>,
    /// Depth state
    pub depth: DepthState,
    /// Color writes enabled
    pub color_write: bool,
    /// Parameters set on the program since it was bound
    pub parameters: BTreeMap<String, ParameterValue>,
}

impl DrawRecord {
    /// Parameter lookup
    pub fn parameter(&self, name: &str) -> Option<&ParameterValue> {
        self.parameters.get(name)
    }
}

/// One recorded device command
#[derive(Debug, Clone, PartialEq)]
pub enum DeviceCommand {
    /// Framebuffer binding changed
    BindFramebuffer(Option<FramebufferHandle>),
    /// Clear of the current framebuffer
    Clear {
        /// Cleared framebuffer
        framebuffer: Option<FramebufferHandle>,
        /// Viewport at clear time
        viewport: Viewport,
        /// Enabled color attachments
        draw_buffers: Vec<usize>,
        /// Color clear value
        color: Option<[f32; 4]>,
        /// Depth clear value
        depth: Option<f32>,
    },
    /// Draw call
    Draw(DrawRecord),
    /// Mip chain regeneration
    GenerateMipmaps(TextureHandle),
}

/// Graphics device that records instead of rendering
#[derive(Debug)]
pub struct HeadlessDevice {
    vertex_arrays: SlotMap<VertexArrayHandle, VertexArrayRecord>,
    textures: SlotMap<TextureHandle, TextureRecord>,
    framebuffers: SlotMap<FramebufferHandle, FramebufferRecord>,
    programs: SlotMap<ProgramHandle, ProgramRecord>,

    framebuffer: Option<FramebufferHandle>,
    viewport: Viewport,
    draw_buffers: Vec<usize>,
    program: Option<ProgramHandle>,
    parameters: BTreeMap<String, ParameterValue>,
    blend: Option<BlendState>,
    depth: DepthState,
    color_write: bool,

    commands: Vec<DeviceCommand>,
    failing_programs: Vec<String>,
    programs_created: usize,
}

impl Default for HeadlessDevice {
    fn default() -> Self {
        Self::new()
    }
}

impl HeadlessDevice {
    /// Create a device with no resources and default state
    pub fn new() -> Self {
        Self {
            vertex_arrays: SlotMap::with_key(),
            textures: SlotMap::with_key(),
            framebuffers: SlotMap::with_key(),
            programs: SlotMap::with_key(),
            framebuffer: None,
            viewport: Viewport::default(),
            draw_buffers: vec![0],
            program: None,
            parameters: BTreeMap::new(),
            blend: None,
            depth: DepthState::default(),
            color_write: true,
            commands: Vec::new(),
            failing_programs: Vec::new(),
            programs_created: 0,
        }
    }

    /// Make every program whose name contains `fragment` fail to compile
    pub fn fail_programs_named(&mut self, fragment: &str) {
        self.failing_programs.push(fragment.to_string());
    }

    /// Every command recorded since the last [`Self::clear_commands`]
    pub fn commands(&self) -> &[DeviceCommand] {
        &self.commands
    }

    /// Recorded draws in submission order
    pub fn draws(&self) -> impl Iterator<Item = &DrawRecord> {
        self.commands.iter().filter_map(|command| match command {
            DeviceCommand::Draw(draw) => Some(draw),
            _ => None,
        })
    }

    /// Drop the command log
    pub fn clear_commands(&mut self) {
        self.commands.clear();
    }

    /// Live texture count
    pub fn texture_count(&self) -> usize {
        self.textures.len()
    }

    /// Live framebuffer count
    pub fn framebuffer_count(&self) -> usize {
        self.framebuffers.len()
    }

    /// Live program count
    pub fn program_count(&self) -> usize {
        self.programs.len()
    }

    /// Programs successfully created over the device's lifetime
    pub fn programs_created(&self) -> usize {
        self.programs_created
    }

    /// Live vertex array count
    pub fn vertex_array_count(&self) -> usize {
        self.vertex_arrays.len()
    }

    /// Check if a program is still alive
    pub fn is_program_alive(&self, program: ProgramHandle) -> bool {
        self.programs.contains_key(program)
    }

    /// Name a live program was created with
    pub fn program_name(&self, program: ProgramHandle) -> Option<&str> {
        self.programs.get(program).map(|p| p.name.as_str())
    }

    /// Attachments of a live framebuffer: `(depth, color)`
    pub fn framebuffer_attachments(
        &self,
        framebuffer: FramebufferHandle,
    ) -> Option<(Option<TextureHandle>, &[TextureHandle])> {
        self.framebuffers
            .get(framebuffer)
            .map(|fb| (fb.depth, fb.color.as_slice()))
    }

    /// Bytes uploaded to a texture so far
    pub fn texture_uploaded_bytes(&self, texture: TextureHandle) -> Option<usize> {
        self.textures.get(texture).map(|t| t.uploaded_bytes)
    }

    fn check_attachment(
        &self,
        texture: TextureHandle,
        size: &mut Option<(u32, u32)>,
    ) -> GpuResult<TextureDescriptor> {
        let descriptor = self
            .textures
            .get(texture)
            .map(|t| t.descriptor)
            .ok_or(GpuError::InvalidHandle("texture"))?;
        let this = (descriptor.width, descriptor.height);
        match size {
            Some(expected) if *expected != this => Err(GpuError::AttachmentMismatch(format!(
                "{}x{} attachment in a {}x{} framebuffer",
                this.0, this.1, expected.0, expected.1
            ))),
            _ => {
                *size = Some(this);
                Ok(descriptor)
            }
        }
    }
}

impl GraphicsDevice for HeadlessDevice {
    fn name(&self) -> &str {
        "headless"
    }

    fn create_vertex_array(&mut self) -> GpuResult<VertexArrayHandle> {
        Ok(self.vertex_arrays.insert(VertexArrayRecord::default()))
    }

    fn set_vertex_data(
        &mut self,
        array: VertexArrayHandle,
        vertices: &[u8],
        vertex_stride: usize,
        indices: &[u32],
    ) -> GpuResult<()> {
        if vertex_stride == 0 || vertices.len() % vertex_stride != 0 {
            return Err(GpuError::InvalidDescriptor(format!(
                "{} vertex bytes do not divide into stride {}",
                vertices.len(),
                vertex_stride
            )));
        }
        let record = self
            .vertex_arrays
            .get_mut(array)
            .ok_or(GpuError::InvalidHandle("vertex array"))?;
        record.vertex_count = vertices.len() / vertex_stride;
        record.index_count = indices.len();
        Ok(())
    }

    fn delete_vertex_array(&mut self, array: VertexArrayHandle) {
        self.vertex_arrays.remove(array);
    }

    fn create_texture(&mut self, descriptor: &TextureDescriptor) -> GpuResult<TextureHandle> {
        if descriptor.width == 0 || descriptor.height == 0 {
            return Err(GpuError::InvalidDescriptor(format!(
                "zero-sized texture {}x{}",
                descriptor.width, descriptor.height
            )));
        }
        if descriptor.kind == TextureKind::Cube && descriptor.width != descriptor.height {
            return Err(GpuError::InvalidDescriptor("cube faces must be square".to_string()));
        }
        trace!("Texture created: {:?}", descriptor);
        Ok(self.textures.insert(TextureRecord {
            descriptor: *descriptor,
            uploaded_bytes: 0,
        }))
    }

    fn set_texture_data(&mut self, texture: TextureHandle, data: &[u8]) -> GpuResult<()> {
        let record = self
            .textures
            .get_mut(texture)
            .ok_or(GpuError::InvalidHandle("texture"))?;
        record.uploaded_bytes = data.len();
        Ok(())
    }

    fn texture_descriptor(&self, texture: TextureHandle) -> Option<TextureDescriptor> {
        self.textures.get(texture).map(|t| t.descriptor)
    }

    fn generate_mipmaps(&mut self, texture: TextureHandle) -> GpuResult<()> {
        let record = self
            .textures
            .get(texture)
            .ok_or(GpuError::InvalidHandle("texture"))?;
        if !record.descriptor.mipmapped {
            return Err(GpuError::InvalidState("texture has no mip chain"));
        }
        self.commands.push(DeviceCommand::GenerateMipmaps(texture));
        Ok(())
    }

    fn delete_texture(&mut self, texture: TextureHandle) {
        self.textures.remove(texture);
    }

    fn create_framebuffer(
        &mut self,
        depth: Option<TextureHandle>,
        color: &[TextureHandle],
    ) -> GpuResult<FramebufferHandle> {
        let mut size = None;
        if let Some(depth) = depth {
            let descriptor = self.check_attachment(depth, &mut size)?;
            if !descriptor.format.is_depth() {
                return Err(GpuError::AttachmentMismatch("depth attachment without depth format".to_string()));
            }
        }
        for texture in color {
            let descriptor = self.check_attachment(*texture, &mut size)?;
            if descriptor.format.is_depth() {
                return Err(GpuError::AttachmentMismatch("depth format used as color attachment".to_string()));
            }
        }

        Ok(self.framebuffers.insert(FramebufferRecord {
            depth,
            color: color.to_vec(),
            faces: vec![None; color.len()],
        }))
    }

    fn set_cube_face(
        &mut self,
        framebuffer: FramebufferHandle,
        attachment: usize,
        face: CubeFace,
    ) -> GpuResult<()> {
        let texture = self
            .framebuffers
            .get(framebuffer)
            .and_then(|fb| fb.color.get(attachment).copied())
            .ok_or(GpuError::InvalidHandle("framebuffer attachment"))?;
        let is_cube = self
            .textures
            .get(texture)
            .is_some_and(|t| t.descriptor.kind == TextureKind::Cube);
        if !is_cube {
            return Err(GpuError::InvalidState("cube face selected on a 2D attachment"));
        }
        if let Some(fb) = self.framebuffers.get_mut(framebuffer) {
            fb.faces[attachment] = Some(face);
        }
        Ok(())
    }

    fn delete_framebuffer(&mut self, framebuffer: FramebufferHandle) {
        if self.framebuffer == Some(framebuffer) {
            self.framebuffer = None;
        }
        self.framebuffers.remove(framebuffer);
    }

    fn create_program(
        &mut self,
        name: &str,
        vertex_source: &str,
        fragment_source: &str,
    ) -> GpuResult<ProgramHandle> {
        let forced_failure = self.failing_programs.iter().any(|f| name.contains(f.as_str()));
        if forced_failure || vertex_source.trim().is_empty() || fragment_source.trim().is_empty() {
            warn!("Program '{}' failed to compile", name);
            return Err(GpuError::CompileFailed {
                name: name.to_string(),
                log: "headless compile failure".to_string(),
            });
        }
        self.programs_created += 1;
        debug!("Program '{}' created", name);
        Ok(self.programs.insert(ProgramRecord { name: name.to_string() }))
    }

    fn delete_program(&mut self, program: ProgramHandle) {
        if self.program == Some(program) {
            self.program = None;
        }
        self.programs.remove(program);
    }

    fn bind_framebuffer(&mut self, framebuffer: Option<FramebufferHandle>) -> GpuResult<()> {
        if let Some(fb) = framebuffer {
            if !self.framebuffers.contains_key(fb) {
                return Err(GpuError::InvalidHandle("framebuffer"));
            }
        }
        self.framebuffer = framebuffer;
        self.draw_buffers = vec![0];
        self.commands.push(DeviceCommand::BindFramebuffer(framebuffer));
        Ok(())
    }

    fn set_viewport(&mut self, viewport: Viewport) {
        self.viewport = viewport;
    }

    fn set_draw_buffers(&mut self, attachments: &[usize]) -> GpuResult<()> {
        if let Some(fb) = self.framebuffer.and_then(|fb| self.framebuffers.get(fb)) {
            if attachments.iter().any(|a| *a >= fb.color.len()) {
                return Err(GpuError::InvalidState("draw buffer index out of range"));
            }
        }
        self.draw_buffers = attachments.to_vec();
        Ok(())
    }

    fn clear(&mut self, color: Option<[f32; 4]>, depth: Option<f32>) {
        self.commands.push(DeviceCommand::Clear {
            framebuffer: self.framebuffer,
            viewport: self.viewport,
            draw_buffers: self.draw_buffers.clone(),
            color,
            depth,
        });
    }

    fn bind_program(&mut self, program: ProgramHandle) -> GpuResult<()> {
        if !self.programs.contains_key(program) {
            return Err(GpuError::InvalidHandle("program"));
        }
        self.program = Some(program);
        self.parameters.clear();
        Ok(())
    }

    fn set_parameter(&mut self, name: &str, value: ParameterValue) -> GpuResult<()> {
        if self.program.is_none() {
            return Err(GpuError::InvalidState("no program bound"));
        }
        if let ParameterValue::Texture { texture, .. } = &value {
            if !self.textures.contains_key(*texture) {
                return Err(GpuError::InvalidHandle("texture"));
            }
        }
        self.parameters.insert(name.to_string(), value);
        Ok(())
    }

    fn set_blend_state(&mut self, blend: Option<BlendState>) {
        self.blend = blend;
    }

    fn set_depth_state(&mut self, depth: DepthState) {
        self.depth = depth;
    }

    fn set_color_write(&mut self, enabled: bool) {
        self.color_write = enabled;
    }

    fn draw(
        &mut self,
        array: VertexArrayHandle,
        primitive: PrimitiveMode,
    ) -> GpuResult<DrawCallStatistics> {
        let program = self.program.ok_or(GpuError::InvalidState("no program bound"))?;
        let program_name = self
            .programs
            .get(program)
            .map(|p| p.name.clone())
            .ok_or(GpuError::InvalidHandle("program"))?;
        let record = self
            .vertex_arrays
            .get(array)
            .ok_or(GpuError::InvalidHandle("vertex array"))?;

        let elements = if record.index_count > 0 { record.index_count } else { record.vertex_count };
        let primitives = match primitive {
            PrimitiveMode::Triangles => elements / 3,
            PrimitiveMode::Lines => elements / 2,
            PrimitiveMode::Points => elements,
        };

        let cube_face = self
            .framebuffer
            .and_then(|fb| self.framebuffers.get(fb))
            .and_then(|fb| fb.faces.first().copied().flatten());

        self.commands.push(DeviceCommand::Draw(DrawRecord {
            framebuffer: self.framebuffer,
            viewport: self.viewport,
            draw_buffers: self.draw_buffers.clone(),
            cube_face,
            program,
            program_name,
            vertex_array: array,
            primitive,
            blend: self.blend,
            depth: self.depth,
            color_write: self.color_write,
            parameters: self.parameters.clone(),
        }));
        Ok(DrawCallStatistics { primitives })
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gpu::types::TextureFormat;

    #[test]
    fn test_framebuffer_rejects_mismatched_attachments() {
        let mut device = HeadlessDevice::new();
        let depth = device
            .create_texture(&TextureDescriptor::new_2d(TextureFormat::Depth32F, 800, 600))
            .unwrap();
        let color = device
            .create_texture(&TextureDescriptor::new_2d(TextureFormat::Rgba8, 1024, 600))
            .unwrap();
        let result = device.create_framebuffer(Some(depth), &[color]);
        assert!(matches!(result, Err(GpuError::AttachmentMismatch(_))));
    }

    #[test]
    fn test_draw_records_bound_state() {
        let mut device = HeadlessDevice::new();
        let array = device.create_vertex_array().unwrap();
        device.set_vertex_data(array, &[0u8; 36], 12, &[0, 1, 2]).unwrap();
        let program = device.create_program("flat", "void main() {}", "void main() {}").unwrap();

        device.bind_program(program).unwrap();
        device.set_parameter("color", ParameterValue::Float(0.5)).unwrap();
        device.set_depth_state(DepthState::equal_read_only());
        device.set_blend_state(Some(BlendState::additive()));
        let stats = device.draw(array, PrimitiveMode::Triangles).unwrap();

        assert_eq!(stats.primitives, 1);
        let draw = device.draws().next().unwrap();
        assert_eq!(draw.program_name, "flat");
        assert_eq!(draw.depth, DepthState::equal_read_only());
        assert_eq!(draw.parameter("color"), Some(&ParameterValue::Float(0.5)));
    }

    #[test]
    fn test_forced_compile_failure() {
        let mut device = HeadlessDevice::new();
        device.fail_programs_named("broken");
        let result = device.create_program("broken_material", "void main() {}", "void main() {}");
        assert!(matches!(result, Err(GpuError::CompileFailed { .. })));
        assert_eq!(device.program_count(), 0);
    }

    #[test]
    fn test_draw_without_program_fails() {
        let mut device = HeadlessDevice::new();
        let array = device.create_vertex_array().unwrap();
        assert!(matches!(
            device.draw(array, PrimitiveMode::Triangles),
            Err(GpuError::InvalidState(_))
        ));
    }

    #[test]
    fn test_mipmaps_require_chain() {
        let mut device = HeadlessDevice::new();
        let plain = device
            .create_texture(&TextureDescriptor::new_2d(TextureFormat::Rgba16F, 64, 64))
            .unwrap();
        let mipped = device
            .create_texture(&TextureDescriptor::new_2d(TextureFormat::Rgba16F, 64, 64).with_mipmaps())
            .unwrap();
        assert!(device.generate_mipmaps(plain).is_err());
        assert!(device.generate_mipmaps(mipped).is_ok());
    }
}
