//! Multi-pass lighting compositor
//!
//! Per viewport and frame:
//!
//! 1. collect the visible set (plus externally registered meshes)
//! 2. render shadow maps of shadow-casting lights
//! 3. depth pre-pass with color writes off
//! 4. lighting accumulation into the diffuse/specular buffers, one additive pass per
//!    (light, touching mesh) with an equal depth test
//! 5. material pass combining material and accumulated light, then highlights
//! 6. blended meshes back to front, each with its own lighting micro-pass
//! 7. refractive meshes, each reading a fresh copy of the scene behind it
//! 8. composition into the LDR output: tone map (with optional bloom) or plain copy

use std::cell::RefCell;
use std::rc::Rc;

use log::{debug, info, warn};

use crate::config::RendererSettings;
use crate::culling::OcclusionRasterizer;
use crate::foundation::collections::{ExternalMeshKey, MaterialDefinitionId, SlotMap, ViewportId};
use crate::foundation::math::{Mat4, Mat4Ext, Vec3, Vec4};
use crate::gpu::{
    BlendFunc, BlendState, DepthState, GpuResult, GraphicsDevice, ParameterValue, ProgramHandle, TextureHandle,
    VertexArrayHandle, Viewport,
};
use crate::material::{MaterialHandlerId, MaterialLibrary};
use crate::scene::{RenderFlags, SceneQuery};

use super::collector::VisibleObjectCollector;
use super::draw_record::MeshDrawRecord;
use super::error::{RenderError, RenderResult};
use super::framebuffers::{
    create_fullscreen_triangle, FramebufferManager, ViewportFramebuffer, COLOR_ATTACHMENT, DIFFUSE_ATTACHMENT,
    FULLSCREEN_PRIMITIVE, SPECULAR_ATTACHMENT,
};
use super::light_snapshot::ShadowViews;
use super::shader_cache::{PassKind, ShaderPermutationCache};
use super::shader_library::{
    utility_sources, BACKGROUND_UNIT, BLOOM_UNIT, BRIGHT_PASS_FRAGMENT, COPY_FRAGMENT, DEPTH_FRAGMENT,
    DIFFUSE_LIGHT_UNIT, FULLSCREEN_VERTEX, HIGHLIGHT_FRAGMENT, MESH_VERTEX, SHADOW_MAP_UNIT, SOURCE_UNIT,
    SPECULAR_LIGHT_UNIT, TONE_MAP_FRAGMENT,
};
use super::shadow::ShadowMapGenerator;
use super::skinning::SkinningCache;
use super::stats::RenderStatistics;
use super::visible_set::{CollectedLight, VisibleSet};

const BLACK: [f32; 4] = [0.0, 0.0, 0.0, 1.0];

/// Camera matrices of one render call
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Camera {
    /// World to view
    pub view: Mat4,
    /// View to clip
    pub projection: Mat4,
    /// World position
    pub position: Vec3,
}

impl Camera {
    /// Camera from explicit matrices
    pub fn new(view: Mat4, projection: Mat4, position: Vec3) -> Self {
        Self {
            view,
            projection,
            position,
        }
    }

    /// Perspective camera looking from `eye` at `target`
    pub fn perspective(eye: Vec3, target: Vec3, fov_y: f32, aspect: f32, near: f32, far: f32) -> Self {
        Self {
            view: Mat4::look_at(eye, target, Vec3::y()),
            projection: Mat4::perspective(fov_y, aspect, near, far),
            position: eye,
        }
    }

    /// Projection times view
    pub fn view_projection(&self) -> Mat4 {
        self.projection * self.view
    }
}

/// Scene renderer interface
pub trait SceneRenderer {
    /// Create a viewport with its render targets
    fn add_viewport(&mut self, width: u32, height: u32) -> RenderResult<ViewportId>;

    /// Reallocate a viewport's render targets
    fn resize_viewport(&mut self, viewport: ViewportId, width: u32, height: u32) -> RenderResult<()>;

    /// Release a viewport
    fn remove_viewport(&mut self, viewport: ViewportId) -> RenderResult<()>;

    /// Render one frame of `scene` into a viewport
    fn render_viewport(
        &mut self,
        scene: &dyn SceneQuery,
        library: &MaterialLibrary,
        viewport: ViewportId,
        camera: &Camera,
    ) -> RenderResult<RenderStatistics>;

    /// Final LDR color texture of a viewport
    fn viewport_output(&self, viewport: ViewportId) -> RenderResult<TextureHandle>;

    /// Check if HDR rendering is enabled
    fn hdr_enabled(&self) -> bool;

    /// Enable or disable HDR rendering
    fn set_hdr_enabled(&mut self, enabled: bool);

    /// Check if bloom is enabled (has no effect without HDR)
    fn bloom_enabled(&self) -> bool;

    /// Enable or disable bloom
    fn set_bloom_enabled(&mut self, enabled: bool);

    /// Tone mapping exposure
    fn exposure(&self) -> f32;

    /// Set the tone mapping exposure
    fn set_exposure(&mut self, exposure: f32);

    /// Bloom weight
    fn bloom_factor(&self) -> f32;

    /// Set the bloom weight
    fn set_bloom_factor(&mut self, factor: f32);
}

#[derive(Debug, Clone, Copy)]
struct UtilityPrograms {
    depth: ProgramHandle,
    highlight: ProgramHandle,
    bright_pass: ProgramHandle,
    tone_map: ProgramHandle,
    copy: ProgramHandle,
}

impl UtilityPrograms {
    fn create(device: &mut dyn GraphicsDevice) -> GpuResult<Self> {
        let sources = [
            ("utility:depth", MESH_VERTEX, DEPTH_FRAGMENT),
            ("utility:highlight", MESH_VERTEX, HIGHLIGHT_FRAGMENT),
            ("utility:bright_pass", FULLSCREEN_VERTEX, BRIGHT_PASS_FRAGMENT),
            ("utility:tone_map", FULLSCREEN_VERTEX, TONE_MAP_FRAGMENT),
            ("utility:copy", FULLSCREEN_VERTEX, COPY_FRAGMENT),
        ];
        let mut programs = Vec::with_capacity(sources.len());
        for (name, vertex, fragment) in sources {
            let (vertex, fragment) = utility_sources(vertex, fragment);
            match device.create_program(name, &vertex, &fragment) {
                Ok(program) => programs.push(program),
                Err(err) => {
                    for program in programs {
                        device.delete_program(program);
                    }
                    return Err(err);
                }
            }
        }
        Ok(Self {
            depth: programs[0],
            highlight: programs[1],
            bright_pass: programs[2],
            tone_map: programs[3],
            copy: programs[4],
        })
    }

    fn release(&self, device: &mut dyn GraphicsDevice) {
        for program in [self.depth, self.highlight, self.bright_pass, self.tone_map, self.copy] {
            device.delete_program(program);
        }
    }
}

/// Everything the passes of one frame read
struct FrameContext<'a> {
    library: &'a MaterialLibrary,
    camera: &'a Camera,
    target: &'a ViewportFramebuffer,
    set: &'a VisibleSet,
    light_order: Vec<usize>,
    shadow_maps: Vec<Option<TextureHandle>>,
}

impl FrameContext<'_> {
    fn is_shadowed(&self, light: usize) -> bool {
        self.shadow_maps.get(light).copied().flatten().is_some()
    }
}

/// Default renderer driving a [`GraphicsDevice`]
pub struct DefaultSceneRenderer {
    device: Box<dyn GraphicsDevice>,
    settings: RendererSettings,
    framebuffers: FramebufferManager,
    shaders: Rc<RefCell<ShaderPermutationCache>>,
    shadows: ShadowMapGenerator,
    skinning: SkinningCache,
    occlusion: OcclusionRasterizer,
    programs: UtilityPrograms,
    fullscreen: VertexArrayHandle,
    external_meshes: SlotMap<ExternalMeshKey, MeshDrawRecord>,
    frame: u64,
}

impl DefaultSceneRenderer {
    /// Create a renderer and its device-side utility resources
    pub fn new(mut device: Box<dyn GraphicsDevice>, settings: RendererSettings) -> RenderResult<Self> {
        let programs = UtilityPrograms::create(device.as_mut())
            .map_err(|err| RenderError::InitializationFailed(format!("utility programs: {}", err)))?;
        let fullscreen = match create_fullscreen_triangle(device.as_mut()) {
            Ok(array) => array,
            Err(err) => {
                programs.release(device.as_mut());
                return Err(RenderError::InitializationFailed(format!("fullscreen triangle: {}", err)));
            }
        };
        let shadows = match ShadowMapGenerator::new(device.as_mut(), &settings) {
            Ok(shadows) => shadows,
            Err(err) => {
                programs.release(device.as_mut());
                device.delete_vertex_array(fullscreen);
                return Err(RenderError::InitializationFailed(format!("shadow maps: {}", err)));
            }
        };

        info!("Multi-pass renderer created on '{}' device", device.name());
        Ok(Self {
            skinning: SkinningCache::new(settings.resource_time_to_live),
            occlusion: OcclusionRasterizer::new(settings.occlusion_buffer_width, settings.occlusion_buffer_height),
            device,
            framebuffers: FramebufferManager::new(),
            shaders: ShaderPermutationCache::shared(),
            shadows,
            programs,
            fullscreen,
            external_meshes: SlotMap::with_key(),
            frame: 0,
            settings,
        })
    }

    /// Register the shader cache with a material library so edits invalidate programs
    pub fn attach_to_library(&self, library: &mut MaterialLibrary) -> MaterialHandlerId {
        library.attach_handler(Box::new(ShaderPermutationCache::invalidator(&self.shaders)))
    }

    /// Shared shader cache
    pub fn shader_cache(&self) -> &Rc<RefCell<ShaderPermutationCache>> {
        &self.shaders
    }

    /// Mesh drawn in every viewport regardless of culling
    pub fn add_external_mesh(&mut self, record: MeshDrawRecord) -> ExternalMeshKey {
        self.external_meshes.insert(record)
    }

    /// Stop drawing an external mesh
    pub fn remove_external_mesh(&mut self, key: ExternalMeshKey) -> Option<MeshDrawRecord> {
        self.external_meshes.remove(key)
    }

    /// Render targets of a viewport
    pub fn viewport_framebuffer(&self, viewport: ViewportId) -> RenderResult<&ViewportFramebuffer> {
        self.framebuffers.get(viewport)
    }

    /// Current settings
    pub fn settings(&self) -> &RendererSettings {
        &self.settings
    }

    /// Frames rendered so far
    pub fn frame(&self) -> u64 {
        self.frame
    }

    /// The graphics device
    pub fn device(&self) -> &dyn GraphicsDevice {
        self.device.as_ref()
    }

    /// The graphics device, mutably
    pub fn device_mut(&mut self) -> &mut dyn GraphicsDevice {
        self.device.as_mut()
    }

    /// Release every device resource the renderer owns
    pub fn shutdown(&mut self) {
        let device = self.device.as_mut();
        self.framebuffers.release_all(device);
        self.shaders.borrow_mut().clear(device);
        self.shadows.release_all(device);
        self.skinning.release_all(device);
        self.programs.release(device);
        device.delete_vertex_array(self.fullscreen);
        info!("Multi-pass renderer shut down after {} frames", self.frame);
    }

    fn begin_frame(&mut self) {
        let released = self.shaders.borrow_mut().release_pending(self.device.as_mut());
        if released > 0 {
            debug!("Released {} invalidated shader programs", released);
        }
        self.frame += 1;
        self.shadows.collect_garbage(self.device.as_mut(), self.frame);
        self.skinning.collect_garbage(self.device.as_mut(), self.frame);
    }

    fn program(&mut self, library: &MaterialLibrary, definition: MaterialDefinitionId, pass: PassKind) -> Option<ProgramHandle> {
        self.shaders
            .borrow_mut()
            .get_program(self.device.as_mut(), library, definition, pass)
    }

    fn draw(&mut self, record: &MeshDrawRecord, stats: &mut RenderStatistics) -> GpuResult<()> {
        let result = self.device.draw(record.vertex_array, record.primitive)?;
        stats.primitives += result.primitives;
        Ok(())
    }

    fn draw_fullscreen(&mut self, stats: &mut RenderStatistics) -> GpuResult<()> {
        let result = self.device.draw(self.fullscreen, FULLSCREEN_PRIMITIVE)?;
        stats.primitives += result.primitives;
        stats.composition_draws += 1;
        Ok(())
    }

    fn render_shadow_maps(
        &mut self,
        set: &VisibleSet,
        viewport: Viewport,
        stats: &mut RenderStatistics,
    ) -> RenderResult<Vec<Option<TextureHandle>>> {
        let mut maps = Vec::with_capacity(set.lights.len());
        for light in &set.lights {
            let rendered = self.shadows.render(self.device.as_mut(), light, self.frame, viewport)?;
            if let Some(rendered) = rendered {
                stats.shadow_maps += 1;
                stats.shadow_draws += rendered.draws;
                stats.primitives += rendered.primitives;
            }
            maps.push(rendered.map(|rendered| rendered.texture));
        }
        Ok(maps)
    }

    fn depth_pass(&mut self, ctx: &FrameContext<'_>, stats: &mut RenderStatistics) -> GpuResult<()> {
        let device = self.device.as_mut();
        device.bind_framebuffer(Some(ctx.target.scene_target))?;
        device.set_viewport(ctx.target.viewport());
        device.set_draw_buffers(&[COLOR_ATTACHMENT])?;
        device.set_blend_state(None);
        device.set_color_write(true);
        device.set_depth_state(DepthState::default());
        device.clear(Some(BLACK), Some(1.0));

        device.set_color_write(false);
        device.bind_program(self.programs.depth)?;
        device.set_parameter("u_view_projection", ParameterValue::Mat4(ctx.camera.view_projection()))?;
        for record in ctx.set.opaque_records() {
            self.device.set_depth_state(record.depth_state());
            self.device.set_parameter("u_model", ParameterValue::Mat4(record.world_transform))?;
            self.draw(record, stats)?;
            stats.depth_draws += 1;
        }
        self.device.set_color_write(true);
        Ok(())
    }

    fn lighting_pass(&mut self, ctx: &FrameContext<'_>, stats: &mut RenderStatistics) -> GpuResult<()> {
        self.device.set_draw_buffers(&[DIFFUSE_ATTACHMENT, SPECULAR_ATTACHMENT])?;
        self.device.clear(Some(BLACK), None);
        self.device.set_blend_state(Some(BlendState::additive()));

        for &light_index in &ctx.light_order {
            let light = &ctx.set.lights[light_index];
            let pass = PassKind::lighting(light.snapshot.class(), ctx.is_shadowed(light_index));
            let buckets = ctx.set.opaque_buckets().iter().chain(ctx.set.opaque_last_buckets());
            for bucket in buckets {
                let touching: Vec<&MeshDrawRecord> = bucket
                    .records
                    .iter()
                    .filter(|record| ctx.set.is_touching(record, light_index))
                    .collect();
                if touching.is_empty() {
                    continue;
                }
                let Some(program) = self.program(ctx.library, bucket.definition, pass) else {
                    stats.skipped_draws += touching.len();
                    continue;
                };
                self.bind_lighting_program(ctx, program, light, light_index)?;
                for record in touching {
                    self.device.set_depth_state(record.equal_depth_state());
                    set_object_parameters(self.device.as_mut(), record)?;
                    self.draw(record, stats)?;
                    stats.lighting_draws += 1;
                }
            }
        }
        self.device.set_blend_state(None);
        Ok(())
    }

    fn bind_lighting_program(
        &mut self,
        ctx: &FrameContext<'_>,
        program: ProgramHandle,
        light: &CollectedLight,
        light_index: usize,
    ) -> GpuResult<()> {
        let device = self.device.as_mut();
        device.bind_program(program)?;
        set_camera_parameters(device, ctx.camera)?;
        light.snapshot.apply(device)?;
        if let (Some(shadow), Some(texture)) = (light.shadow.as_ref(), ctx.shadow_maps[light_index]) {
            device.set_parameter(
                "u_shadow_map",
                ParameterValue::Texture {
                    texture,
                    unit: SHADOW_MAP_UNIT,
                },
            )?;
            device.set_parameter("u_shadow_far_plane", ParameterValue::Float(shadow.far_plane))?;
            device.set_parameter("u_shadow_intensity", ParameterValue::Float(self.settings.shadow_intensity))?;
            if let ShadowViews::Single(view) = shadow.views {
                device.set_parameter("u_light_view_projection", ParameterValue::Mat4(shadow.view_projection(0)))?;
                device.set_parameter("u_light_view", ParameterValue::Mat4(view))?;
            }
        }
        Ok(())
    }

    fn bind_material_program(&mut self, ctx: &FrameContext<'_>, program: ProgramHandle, background: bool) -> GpuResult<()> {
        let device = self.device.as_mut();
        device.bind_program(program)?;
        set_camera_parameters(device, ctx.camera)?;
        device.set_parameter(
            "u_diffuse_light",
            ParameterValue::Texture {
                texture: ctx.target.diffuse_light,
                unit: DIFFUSE_LIGHT_UNIT,
            },
        )?;
        device.set_parameter(
            "u_specular_light",
            ParameterValue::Texture {
                texture: ctx.target.specular_light,
                unit: SPECULAR_LIGHT_UNIT,
            },
        )?;
        device.set_parameter("u_use_background", ParameterValue::Bool(background))?;
        if background {
            device.set_parameter(
                "u_background",
                ParameterValue::Texture {
                    texture: ctx.target.background,
                    unit: BACKGROUND_UNIT,
                },
            )?;
        }
        Ok(())
    }

    fn material_pass(&mut self, ctx: &FrameContext<'_>, stats: &mut RenderStatistics) -> GpuResult<()> {
        self.device.set_draw_buffers(&[COLOR_ATTACHMENT])?;
        self.device.set_blend_state(None);

        let buckets = ctx.set.opaque_buckets().iter().chain(ctx.set.opaque_last_buckets());
        for bucket in buckets {
            let Some(program) = self.program(ctx.library, bucket.definition, PassKind::Material) else {
                stats.skipped_draws += bucket.records.len();
                continue;
            };
            self.bind_material_program(ctx, program, false)?;
            for record in &bucket.records {
                self.device.set_depth_state(record.equal_depth_state());
                set_object_parameters(self.device.as_mut(), record)?;
                self.draw(record, stats)?;
                stats.material_draws += 1;
            }
        }

        let highlighted: Vec<&MeshDrawRecord> = ctx
            .set
            .opaque_records()
            .filter(|record| record.flags.contains(RenderFlags::HIGHLIGHT))
            .collect();
        if !highlighted.is_empty() {
            let device = self.device.as_mut();
            device.bind_program(self.programs.highlight)?;
            device.set_parameter("u_view_projection", ParameterValue::Mat4(ctx.camera.view_projection()))?;
            device.set_parameter("u_color", ParameterValue::Vec4(Vec4::from(self.settings.highlight_color)))?;
            device.set_blend_state(Some(BlendState {
                func: BlendFunc::alpha(),
                ..Default::default()
            }));
            for record in highlighted {
                self.device.set_depth_state(record.equal_depth_state());
                self.device.set_parameter("u_model", ParameterValue::Mat4(record.world_transform))?;
                self.draw(record, stats)?;
                stats.highlight_draws += 1;
            }
            self.device.set_blend_state(None);
        }
        Ok(())
    }

    /// Accumulate the lights touching one transparent record; returns the draws issued
    fn object_lighting(&mut self, ctx: &FrameContext<'_>, record: &MeshDrawRecord, stats: &mut RenderStatistics) -> GpuResult<usize> {
        let device = self.device.as_mut();
        device.bind_framebuffer(Some(ctx.target.scene_target))?;
        device.set_draw_buffers(&[DIFFUSE_ATTACHMENT, SPECULAR_ATTACHMENT])?;
        device.clear(Some(BLACK), None);
        device.set_blend_state(Some(BlendState::additive()));
        device.set_depth_state(record.transparent_depth_state());

        let mut draws = 0;
        for &light_index in &ctx.light_order {
            if !ctx.set.is_touching(record, light_index) {
                continue;
            }
            let light = &ctx.set.lights[light_index];
            let pass = PassKind::lighting(light.snapshot.class(), ctx.is_shadowed(light_index));
            let Some(program) = self.program(ctx.library, record.material.definition, pass) else {
                stats.skipped_draws += 1;
                continue;
            };
            self.bind_lighting_program(ctx, program, light, light_index)?;
            set_object_parameters(self.device.as_mut(), record)?;
            self.draw(record, stats)?;
            draws += 1;
        }
        Ok(draws)
    }

    fn blended_pass(&mut self, ctx: &FrameContext<'_>, stats: &mut RenderStatistics) -> GpuResult<()> {
        let normal = back_to_front(&ctx.set.blended, ctx.camera.position);
        let last = back_to_front(&ctx.set.blended_last, ctx.camera.position);
        for record in normal.into_iter().chain(last) {
            let Some(program) = self.program(ctx.library, record.material.definition, PassKind::Material) else {
                stats.skipped_draws += 1;
                continue;
            };
            let lighting = self.object_lighting(ctx, record, stats)?;
            stats.blended_draws += lighting;

            self.device.set_draw_buffers(&[COLOR_ATTACHMENT])?;
            let blend = record.material.blend.unwrap_or_default().blend_state();
            self.device.set_blend_state(Some(blend));
            self.device.set_depth_state(record.transparent_depth_state());
            self.bind_material_program(ctx, program, false)?;
            set_object_parameters(self.device.as_mut(), record)?;
            self.draw(record, stats)?;
            stats.blended_draws += 1;
        }
        self.device.set_blend_state(None);
        Ok(())
    }

    fn refractive_pass(&mut self, ctx: &FrameContext<'_>, stats: &mut RenderStatistics) -> GpuResult<()> {
        for record in back_to_front(&ctx.set.refractive, ctx.camera.position) {
            let Some(program) = self.program(ctx.library, record.material.definition, PassKind::Material) else {
                stats.skipped_draws += 1;
                continue;
            };

            // Copy what is behind the record into the background target
            let device = self.device.as_mut();
            device.bind_framebuffer(Some(ctx.target.background_target))?;
            device.set_viewport(ctx.target.viewport());
            device.set_blend_state(None);
            device.set_depth_state(DepthState::disabled());
            device.bind_program(self.programs.copy)?;
            device.set_parameter(
                "u_source",
                ParameterValue::Texture {
                    texture: ctx.target.color,
                    unit: SOURCE_UNIT,
                },
            )?;
            let copy = device.draw(self.fullscreen, FULLSCREEN_PRIMITIVE)?;
            stats.primitives += copy.primitives;
            stats.refractive_draws += 1;

            let lighting = self.object_lighting(ctx, record, stats)?;
            stats.refractive_draws += lighting;

            self.device.set_draw_buffers(&[COLOR_ATTACHMENT])?;
            self.device.set_blend_state(None);
            self.device.set_depth_state(record.transparent_depth_state());
            self.bind_material_program(ctx, program, true)?;
            set_object_parameters(self.device.as_mut(), record)?;
            self.draw(record, stats)?;
            stats.refractive_draws += 1;
        }
        Ok(())
    }

    fn composition_pass(&mut self, ctx: &FrameContext<'_>, stats: &mut RenderStatistics) -> GpuResult<()> {
        let target = ctx.target;
        self.device.set_blend_state(None);
        self.device.set_depth_state(DepthState::disabled());
        self.device.set_viewport(target.viewport());

        if self.settings.hdr_enabled {
            self.device.generate_mipmaps(target.color)?;
            let bloom = self.settings.bloom_active();
            if bloom {
                let device = self.device.as_mut();
                device.bind_framebuffer(Some(target.bloom_target))?;
                device.bind_program(self.programs.bright_pass)?;
                device.set_parameter("u_source", ParameterValue::Texture { texture: target.color, unit: SOURCE_UNIT })?;
                device.set_parameter("u_threshold", ParameterValue::Float(self.settings.bloom_threshold))?;
                device.set_parameter("u_source_lod", ParameterValue::Float(self.settings.bloom_source_lod))?;
                self.draw_fullscreen(stats)?;
            }

            let luminance_lod = self
                .device
                .texture_descriptor(target.color)
                .map_or(0.0, |descriptor| descriptor.mip_levels().saturating_sub(1) as f32);
            let device = self.device.as_mut();
            device.bind_framebuffer(Some(target.output_target))?;
            device.bind_program(self.programs.tone_map)?;
            device.set_parameter("u_source", ParameterValue::Texture { texture: target.color, unit: SOURCE_UNIT })?;
            device.set_parameter("u_bloom", ParameterValue::Texture { texture: target.bloom, unit: BLOOM_UNIT })?;
            device.set_parameter("u_exposure", ParameterValue::Float(self.settings.hdr_exposure))?;
            let bloom_factor = if bloom { self.settings.bloom_factor } else { 0.0 };
            device.set_parameter("u_bloom_factor", ParameterValue::Float(bloom_factor))?;
            device.set_parameter("u_luminance_lod", ParameterValue::Float(luminance_lod))?;
            self.draw_fullscreen(stats)?;
        } else {
            let device = self.device.as_mut();
            device.bind_framebuffer(Some(target.output_target))?;
            device.bind_program(self.programs.copy)?;
            device.set_parameter("u_source", ParameterValue::Texture { texture: target.color, unit: SOURCE_UNIT })?;
            self.draw_fullscreen(stats)?;
        }

        self.device.bind_framebuffer(None)?;
        self.device.set_depth_state(DepthState::default());
        Ok(())
    }
}

impl SceneRenderer for DefaultSceneRenderer {
    fn add_viewport(&mut self, width: u32, height: u32) -> RenderResult<ViewportId> {
        self.framebuffers.add(self.device.as_mut(), width, height)
    }

    fn resize_viewport(&mut self, viewport: ViewportId, width: u32, height: u32) -> RenderResult<()> {
        self.framebuffers.resize(self.device.as_mut(), viewport, width, height)
    }

    fn remove_viewport(&mut self, viewport: ViewportId) -> RenderResult<()> {
        self.framebuffers.remove(self.device.as_mut(), viewport)
    }

    fn render_viewport(
        &mut self,
        scene: &dyn SceneQuery,
        library: &MaterialLibrary,
        viewport: ViewportId,
        camera: &Camera,
    ) -> RenderResult<RenderStatistics> {
        let target = self.framebuffers.get(viewport)?.clone();
        self.begin_frame();

        let mut stats = RenderStatistics::default();
        let occlusion = if self.settings.occlusion_culling {
            Some(&mut self.occlusion)
        } else {
            None
        };
        let mut set = VisibleObjectCollector::collect(
            scene,
            &self.settings,
            &camera.view_projection(),
            occlusion,
            self.device.as_mut(),
            &mut self.skinning,
            self.frame,
        )?;

        if !self.external_meshes.is_empty() {
            let list = set.push_touching_list(set.global_lights());
            for record in self.external_meshes.values() {
                let mut record = record.clone();
                record.touching_lights = Some(list);
                set.add_record(record);
            }
        }

        stats.culling = set.culling;
        stats.visible_models = set.models.len();
        stats.lights = set.lights.len();

        let shadow_maps = self.render_shadow_maps(&set, target.viewport(), &mut stats)?;
        let ctx = FrameContext {
            library,
            camera,
            target: &target,
            set: &set,
            light_order: set.light_order(),
            shadow_maps,
        };

        self.depth_pass(&ctx, &mut stats)?;
        self.lighting_pass(&ctx, &mut stats)?;
        self.material_pass(&ctx, &mut stats)?;
        self.blended_pass(&ctx, &mut stats)?;
        self.refractive_pass(&ctx, &mut stats)?;
        self.composition_pass(&ctx, &mut stats)?;

        if stats.skipped_draws > 0 {
            warn!("Frame {}: {} draws skipped for missing programs", self.frame, stats.skipped_draws);
        }
        debug!(
            "Frame {}: {} models, {} lights, {} shadow maps, {} draws",
            self.frame,
            stats.visible_models,
            stats.lights,
            stats.shadow_maps,
            stats.total_draws()
        );
        Ok(stats)
    }

    fn viewport_output(&self, viewport: ViewportId) -> RenderResult<TextureHandle> {
        Ok(self.framebuffers.get(viewport)?.output)
    }

    fn hdr_enabled(&self) -> bool {
        self.settings.hdr_enabled
    }

    fn set_hdr_enabled(&mut self, enabled: bool) {
        self.settings.hdr_enabled = enabled;
    }

    fn bloom_enabled(&self) -> bool {
        self.settings.bloom_enabled
    }

    fn set_bloom_enabled(&mut self, enabled: bool) {
        self.settings.bloom_enabled = enabled;
    }

    fn exposure(&self) -> f32 {
        self.settings.hdr_exposure
    }

    fn set_exposure(&mut self, exposure: f32) {
        self.settings.hdr_exposure = exposure;
    }

    fn bloom_factor(&self) -> f32 {
        self.settings.bloom_factor
    }

    fn set_bloom_factor(&mut self, factor: f32) {
        self.settings.bloom_factor = factor;
    }
}

fn set_camera_parameters(device: &mut dyn GraphicsDevice, camera: &Camera) -> GpuResult<()> {
    device.set_parameter("u_view_projection", ParameterValue::Mat4(camera.view_projection()))?;
    device.set_parameter("u_view", ParameterValue::Mat4(camera.view))?;
    device.set_parameter("u_camera_position", ParameterValue::Vec3(camera.position))
}

fn set_object_parameters(device: &mut dyn GraphicsDevice, record: &MeshDrawRecord) -> GpuResult<()> {
    device.set_parameter("u_model", ParameterValue::Mat4(record.world_transform))?;
    device.set_parameter(
        "u_normal_mapping",
        ParameterValue::Bool(!record.flags.contains(RenderFlags::NO_NORMAL_MAPPING)),
    )?;
    record.material.apply(device)
}

/// Records sorted farthest first from `eye`
fn back_to_front(records: &[MeshDrawRecord], eye: Vec3) -> Vec<&MeshDrawRecord> {
    let mut sorted: Vec<(f32, &MeshDrawRecord)> = records
        .iter()
        .map(|record| ((record.position() - eye).norm_squared(), record))
        .collect();
    sorted.sort_by(|a, b| b.0.total_cmp(&a.0));
    sorted.into_iter().map(|(_, record)| record).collect()
}
