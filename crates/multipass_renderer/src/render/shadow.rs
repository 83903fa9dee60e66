//! Variance shadow maps
//!
//! Shadow-casting lights render their casters into a two-channel moments target
//! holding `(d, d^2)` of the normalized light distance, then blur it with a separable
//! Gaussian. Point lights use a cube map, one face per render. Lighting passes read the
//! blurred moments and apply Chebyshev's inequality to get a soft visibility term.
//!
//! Maps are kept per light and reused across frames; a map unused for the configured
//! number of frames is released.

use std::collections::hash_map::Entry;
use std::collections::HashMap;

use log::{debug, trace};

use crate::config::RendererSettings;
use crate::foundation::collections::LightKey;
use crate::foundation::math::{Vec2, Vec3};
use crate::gpu::{
    CubeFace, DepthState, FramebufferHandle, GpuResult, GraphicsDevice, ParameterValue, ProgramHandle,
    TextureDescriptor, TextureFormat, TextureHandle, VertexArrayHandle, Viewport,
};

use super::error::RenderResult;
use super::framebuffers::{create_fullscreen_triangle, FULLSCREEN_PRIMITIVE};
use super::light_snapshot::{LightSnapshot, ShadowSnapshot};
use super::shader_library::{utility_sources, BLUR_FRAGMENT, FULLSCREEN_VERTEX, VARIANCE_FRAGMENT, VARIANCE_VERTEX};
use super::visible_set::CollectedLight;

/// Lowest variance the lookup uses, hides acne on flat receivers
pub const MIN_VARIANCE: f32 = 0.00002;
/// Fraction of the Chebyshev bound cut off to reduce light bleeding
pub const LIGHT_BLEED_REDUCTION: f32 = 0.2;

/// Visibility of a receiver at `depth` given blurred moments `(E[d], E[d^2])`
pub fn chebyshev_visibility(moments: Vec2, depth: f32) -> f32 {
    if depth <= moments.x {
        return 1.0;
    }
    let variance = (moments.y - moments.x * moments.x).max(MIN_VARIANCE);
    let d = depth - moments.x;
    let p_max = variance / (variance + d * d);
    ((p_max - LIGHT_BLEED_REDUCTION) / (1.0 - LIGHT_BLEED_REDUCTION)).clamp(0.0, 1.0)
}

/// Light intensity scale for a visibility term; fully shadowed gives `intensity`
pub fn shadow_factor(visibility: f32, intensity: f32) -> f32 {
    intensity + (1.0 - intensity) * visibility
}

/// Moments a map texel holds after blurring over `depths`
pub fn filtered_moments(depths: &[f32]) -> Vec2 {
    if depths.is_empty() {
        return Vec2::new(1.0, 1.0);
    }
    let count = depths.len() as f32;
    let sum = depths.iter().fold(Vec2::zeros(), |acc, d| acc + Vec2::new(*d, d * d));
    sum / count
}

/// Normalized distance a variance map stores for a world position
pub fn shadow_depth(light: &LightSnapshot, shadow: &ShadowSnapshot, world: Vec3) -> f32 {
    let distance = match light {
        LightSnapshot::Directional { direction, .. } => (world - shadow.origin).dot(&direction.normalize()),
        _ => (world - shadow.origin).norm(),
    };
    (distance / shadow.far_plane).clamp(0.0, 1.0)
}

/// Result of rendering one light's shadow map
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RenderedShadow {
    /// Blurred moments texture (2D or cube)
    pub texture: TextureHandle,
    /// Caster and blur draws issued
    pub draws: usize,
    /// Primitives submitted
    pub primitives: usize,
}

#[derive(Debug, Clone, Copy)]
struct ShadowMap {
    depth: TextureHandle,
    moments: TextureHandle,
    blur: TextureHandle,
    target: FramebufferHandle,
    blur_target: FramebufferHandle,
    cube: bool,
    last_used: u64,
}

impl ShadowMap {
    fn create(device: &mut dyn GraphicsDevice, size: u32, cube: bool) -> GpuResult<Self> {
        let depth = device.create_texture(&TextureDescriptor::new_2d(TextureFormat::Depth32F, size, size))?;
        let moments_descriptor = if cube {
            TextureDescriptor::new_cube(TextureFormat::Rg32F, size)
        } else {
            TextureDescriptor::new_2d(TextureFormat::Rg32F, size, size)
        };
        let moments = match device.create_texture(&moments_descriptor) {
            Ok(texture) => texture,
            Err(err) => {
                device.delete_texture(depth);
                return Err(err);
            }
        };
        let blur = match device.create_texture(&TextureDescriptor::new_2d(TextureFormat::Rg32F, size, size)) {
            Ok(texture) => texture,
            Err(err) => {
                device.delete_texture(depth);
                device.delete_texture(moments);
                return Err(err);
            }
        };

        let targets = device
            .create_framebuffer(Some(depth), &[moments])
            .and_then(|target| match device.create_framebuffer(None, &[blur]) {
                Ok(blur_target) => Ok((target, blur_target)),
                Err(err) => {
                    device.delete_framebuffer(target);
                    Err(err)
                }
            });
        match targets {
            Ok((target, blur_target)) => Ok(Self {
                depth,
                moments,
                blur,
                target,
                blur_target,
                cube,
                last_used: 0,
            }),
            Err(err) => {
                for texture in [depth, moments, blur] {
                    device.delete_texture(texture);
                }
                Err(err)
            }
        }
    }

    fn release(&self, device: &mut dyn GraphicsDevice) {
        device.delete_framebuffer(self.target);
        device.delete_framebuffer(self.blur_target);
        for texture in [self.depth, self.moments, self.blur] {
            device.delete_texture(texture);
        }
    }
}

/// Renders and caches variance shadow maps per light
#[derive(Debug)]
pub struct ShadowMapGenerator {
    maps: HashMap<LightKey, ShadowMap>,
    size: u32,
    blur_radius: f32,
    time_to_live: u64,
    variance_program: ProgramHandle,
    blur_program: ProgramHandle,
    fullscreen: VertexArrayHandle,
}

impl ShadowMapGenerator {
    /// Create the generator and its programs
    pub fn new(device: &mut dyn GraphicsDevice, settings: &RendererSettings) -> RenderResult<Self> {
        let (vertex, fragment) = utility_sources(VARIANCE_VERTEX, VARIANCE_FRAGMENT);
        let variance_program = device.create_program("shadow:variance", &vertex, &fragment)?;
        let (vertex, fragment) = utility_sources(FULLSCREEN_VERTEX, BLUR_FRAGMENT);
        let blur_program = match device.create_program("shadow:blur", &vertex, &fragment) {
            Ok(program) => program,
            Err(err) => {
                device.delete_program(variance_program);
                return Err(err.into());
            }
        };
        let fullscreen = match create_fullscreen_triangle(device) {
            Ok(array) => array,
            Err(err) => {
                device.delete_program(variance_program);
                device.delete_program(blur_program);
                return Err(err.into());
            }
        };

        Ok(Self {
            maps: HashMap::new(),
            size: settings.shadow_map_size.max(1),
            blur_radius: settings.shadow_blur_radius,
            time_to_live: u64::from(settings.resource_time_to_live),
            variance_program,
            blur_program,
            fullscreen,
        })
    }

    /// Map edge length in texels
    pub fn size(&self) -> u32 {
        self.size
    }

    /// Number of cached maps
    pub fn len(&self) -> usize {
        self.maps.len()
    }

    /// Check if no maps are cached
    pub fn is_empty(&self) -> bool {
        self.maps.is_empty()
    }

    /// Cached moments texture of a light
    pub fn texture(&self, light: LightKey) -> Option<TextureHandle> {
        self.maps.get(&light).map(|map| map.moments)
    }

    /// Render the shadow map of a collected light
    ///
    /// Returns `None` for lights without shadow matrices. On success the main
    /// framebuffer is bound again with `restore` as the viewport.
    pub fn render(
        &mut self,
        device: &mut dyn GraphicsDevice,
        light: &CollectedLight,
        frame: u64,
        restore: Viewport,
    ) -> RenderResult<Option<RenderedShadow>> {
        let Some(shadow) = light.shadow.as_ref() else {
            return Ok(None);
        };
        let map = self.acquire(device, light.source, shadow.is_cube(), frame)?;

        let mut rendered = RenderedShadow {
            texture: map.moments,
            draws: 0,
            primitives: 0,
        };
        let (directional, direction) = match light.snapshot {
            LightSnapshot::Directional { direction, .. } | LightSnapshot::Spot { direction, .. } => {
                (matches!(light.snapshot, LightSnapshot::Directional { .. }), direction)
            }
            _ => (false, Vec3::z()),
        };

        for view in 0..shadow.view_count() {
            let face = map.cube.then(|| CubeFace::ALL[view]);
            device.bind_framebuffer(Some(map.target))?;
            if let Some(face) = face {
                device.set_cube_face(map.target, 0, face)?;
            }
            device.set_viewport(Viewport::sized(self.size, self.size));
            device.set_blend_state(None);
            device.set_color_write(true);
            device.set_depth_state(DepthState::default());
            device.clear(Some([1.0, 1.0, 1.0, 1.0]), Some(1.0));

            if !light.shadow_casters.is_empty() {
                device.bind_program(self.variance_program)?;
                device.set_parameter("u_light_view_projection", ParameterValue::Mat4(shadow.view_projection(view)))?;
                device.set_parameter("u_shadow_origin", ParameterValue::Vec3(shadow.origin))?;
                device.set_parameter("u_light_direction", ParameterValue::Vec3(direction))?;
                device.set_parameter("u_directional", ParameterValue::Bool(directional))?;
                device.set_parameter("u_shadow_far_plane", ParameterValue::Float(shadow.far_plane))?;
                for caster in &light.shadow_casters {
                    device.set_parameter("u_model", ParameterValue::Mat4(caster.world_transform))?;
                    let stats = device.draw(caster.vertex_array, caster.primitive)?;
                    rendered.draws += 1;
                    rendered.primitives += stats.primitives;
                }
            }

            if self.blur_radius > 0.0 {
                rendered.draws += self.blur(device, &map, face)?;
            }
        }

        trace!(
            "Shadow map for {:?}: {} casters, {} views",
            light.source,
            light.shadow_casters.len(),
            shadow.view_count()
        );
        device.bind_framebuffer(None)?;
        device.set_viewport(restore);
        Ok(Some(rendered))
    }

    fn blur(&self, device: &mut dyn GraphicsDevice, map: &ShadowMap, face: Option<CubeFace>) -> RenderResult<usize> {
        let texel = 1.0 / self.size as f32;
        device.set_depth_state(DepthState::disabled());

        // Horizontal: moments (face) -> blur target
        device.bind_framebuffer(Some(map.blur_target))?;
        device.bind_program(self.blur_program)?;
        match face {
            Some(face) => {
                device.set_parameter("u_source_cube", ParameterValue::Texture { texture: map.moments, unit: 1 })?;
                device.set_parameter("u_cube_source", ParameterValue::Bool(true))?;
                device.set_parameter("u_face", ParameterValue::Int(face_index(face)))?;
            }
            None => {
                device.set_parameter("u_source", ParameterValue::Texture { texture: map.moments, unit: 0 })?;
                device.set_parameter("u_cube_source", ParameterValue::Bool(false))?;
            }
        }
        device.set_parameter("u_direction", ParameterValue::Vec2(Vec2::new(texel, 0.0)))?;
        device.set_parameter("u_radius", ParameterValue::Float(self.blur_radius))?;
        device.draw(self.fullscreen, FULLSCREEN_PRIMITIVE)?;

        // Vertical: blur target -> moments (face)
        device.bind_framebuffer(Some(map.target))?;
        if let Some(face) = face {
            device.set_cube_face(map.target, 0, face)?;
        }
        device.bind_program(self.blur_program)?;
        device.set_parameter("u_source", ParameterValue::Texture { texture: map.blur, unit: 0 })?;
        device.set_parameter("u_cube_source", ParameterValue::Bool(false))?;
        device.set_parameter("u_direction", ParameterValue::Vec2(Vec2::new(0.0, texel)))?;
        device.set_parameter("u_radius", ParameterValue::Float(self.blur_radius))?;
        device.draw(self.fullscreen, FULLSCREEN_PRIMITIVE)?;

        device.set_depth_state(DepthState::default());
        Ok(2)
    }

    fn acquire(&mut self, device: &mut dyn GraphicsDevice, light: LightKey, cube: bool, frame: u64) -> GpuResult<ShadowMap> {
        if let Some(map) = self.maps.get(&light) {
            if map.cube != cube {
                // Light changed kind; the old map has the wrong shape
                map.release(device);
                self.maps.remove(&light);
            }
        }
        let map = match self.maps.entry(light) {
            Entry::Occupied(entry) => entry.into_mut(),
            Entry::Vacant(entry) => {
                debug!("Allocating {} shadow map for {:?}", if cube { "cube" } else { "2D" }, light);
                entry.insert(ShadowMap::create(device, self.size, cube)?)
            }
        };
        map.last_used = frame;
        Ok(*map)
    }

    /// Release maps unused for longer than the time-to-live
    pub fn collect_garbage(&mut self, device: &mut dyn GraphicsDevice, frame: u64) -> usize {
        let ttl = self.time_to_live;
        let before = self.maps.len();
        self.maps.retain(|light, map| {
            let alive = frame.saturating_sub(map.last_used) <= ttl;
            if !alive {
                trace!("Releasing shadow map of {:?}", light);
                map.release(device);
            }
            alive
        });
        before - self.maps.len()
    }

    /// Release every map and program
    pub fn release_all(&mut self, device: &mut dyn GraphicsDevice) {
        for (_, map) in self.maps.drain() {
            map.release(device);
        }
        device.delete_program(self.variance_program);
        device.delete_program(self.blur_program);
        device.delete_vertex_array(self.fullscreen);
    }
}

fn face_index(face: CubeFace) -> i32 {
    CubeFace::ALL.iter().position(|f| *f == face).map_or(0, |index| index as i32)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use crate::foundation::collections::{MaterialDefinitionId, SlotMap};
    use crate::foundation::math::Mat4;
    use crate::gpu::{DeviceCommand, HeadlessDevice, PrimitiveMode};
    use crate::material::Material;
    use crate::render::draw_record::MeshDrawRecord;
    use crate::scene::{Attenuation, LightComponent, RenderFlags};

    const MAIN_VIEWPORT: Viewport = Viewport {
        x: 0,
        y: 0,
        width: 320,
        height: 240,
    };

    struct Fixture {
        device: HeadlessDevice,
        lights: SlotMap<LightKey, ()>,
        definitions: SlotMap<MaterialDefinitionId, ()>,
        settings: RendererSettings,
    }

    impl Fixture {
        fn new() -> Self {
            Self {
                device: HeadlessDevice::new(),
                lights: SlotMap::with_key(),
                definitions: SlotMap::with_key(),
                settings: RendererSettings {
                    shadow_map_size: 64,
                    ..RendererSettings::default()
                },
            }
        }

        fn light(&mut self, component: &LightComponent, casters: usize) -> CollectedLight {
            let snapshot = LightSnapshot::capture(component, self.settings.light_cutoff);
            let material = Arc::new(Material::new(self.definitions.insert(())));
            let shadow_casters = (0..casters)
                .map(|_| {
                    let array = self.device.create_vertex_array().unwrap();
                    MeshDrawRecord::new(array, PrimitiveMode::Triangles, Some(material.clone()), Mat4::identity(), RenderFlags::empty())
                        .unwrap()
                })
                .collect();
            CollectedLight {
                source: self.lights.insert(()),
                snapshot,
                shadow: snapshot.shadow(&self.settings),
                shadow_casters,
            }
        }
    }

    #[test]
    fn test_chebyshev_lit_and_shadowed() {
        let moments = filtered_moments(&[0.3; 9]);
        assert_eq!(chebyshev_visibility(moments, 0.25), 1.0);
        assert!(chebyshev_visibility(moments, 0.8) < 0.05);
        assert!((shadow_factor(0.0, 0.35) - 0.35).abs() < 1.0e-6);
        assert!((shadow_factor(1.0, 0.35) - 1.0).abs() < 1.0e-6);
    }

    #[test]
    fn test_penumbra_is_partial() {
        // Half the filter footprint sees the occluder at 0.3, half sees open space
        let moments = filtered_moments(&[0.3, 0.3, 0.3, 1.0, 1.0, 1.0]);
        let visibility = chebyshev_visibility(moments, 0.8);
        assert!(visibility > 0.0 && visibility < 1.0);
    }

    #[test]
    fn test_directional_map_clears_draws_and_blurs() {
        let mut fixture = Fixture::new();
        let light = fixture.light(&LightComponent::directional(Vec3::new(0.0, -1.0, 0.0), Vec3::repeat(1.0)).with_shadows(true), 2);
        let mut generator = ShadowMapGenerator::new(&mut fixture.device, &fixture.settings).unwrap();

        let rendered = generator.render(&mut fixture.device, &light, 1, MAIN_VIEWPORT).unwrap().unwrap();
        assert_eq!(rendered.draws, 4);
        let clears: Vec<_> = fixture
            .device
            .commands()
            .iter()
            .filter(|command| matches!(command, DeviceCommand::Clear { color: Some([1.0, 1.0, 1.0, 1.0]), depth: Some(_), .. }))
            .collect();
        assert_eq!(clears.len(), 1);

        let descriptor = fixture.device.texture_descriptor(rendered.texture).unwrap();
        assert_eq!(descriptor.format, TextureFormat::Rg32F);
        assert_eq!((descriptor.width, descriptor.height), (64, 64));
    }

    #[test]
    fn test_point_map_renders_six_faces() {
        let mut fixture = Fixture::new();
        let component = LightComponent::point(Vec3::zeros(), Vec3::repeat(1.0), Attenuation::default()).with_shadows(true);
        let light = fixture.light(&component, 1);
        let mut generator = ShadowMapGenerator::new(&mut fixture.device, &fixture.settings).unwrap();

        let rendered = generator.render(&mut fixture.device, &light, 1, MAIN_VIEWPORT).unwrap().unwrap();
        assert_eq!(rendered.draws, 6 * 3);
        let faces: Vec<_> = fixture
            .device
            .draws()
            .filter(|draw| draw.program_name == "shadow:variance")
            .filter_map(|draw| draw.cube_face)
            .collect();
        assert_eq!(faces, CubeFace::ALL.to_vec());
    }

    #[test]
    fn test_empty_caster_list_still_clears() {
        let mut fixture = Fixture::new();
        let light = fixture.light(&LightComponent::directional(Vec3::new(0.0, -1.0, 0.0), Vec3::repeat(1.0)).with_shadows(true), 0);
        let mut generator = ShadowMapGenerator::new(&mut fixture.device, &fixture.settings).unwrap();

        let rendered = generator.render(&mut fixture.device, &light, 1, MAIN_VIEWPORT).unwrap().unwrap();
        assert_eq!(rendered.draws, 2);
        assert!(fixture
            .device
            .commands()
            .iter()
            .any(|command| matches!(command, DeviceCommand::Clear { depth: Some(_), .. })));
    }

    #[test]
    fn test_main_target_is_restored_after_render() {
        let mut fixture = Fixture::new();
        let light = fixture.light(&LightComponent::directional(Vec3::new(0.0, -1.0, 0.0), Vec3::repeat(1.0)).with_shadows(true), 1);
        let mut generator = ShadowMapGenerator::new(&mut fixture.device, &fixture.settings).unwrap();

        generator.render(&mut fixture.device, &light, 1, MAIN_VIEWPORT).unwrap().unwrap();
        assert!(matches!(fixture.device.commands().last(), Some(DeviceCommand::BindFramebuffer(None))));

        // The next clear lands on the main target with the caller's viewport
        fixture.device.clear(Some([0.0; 4]), None);
        match fixture.device.commands().last() {
            Some(DeviceCommand::Clear { framebuffer, viewport, .. }) => {
                assert_eq!(*framebuffer, None);
                assert_eq!(*viewport, MAIN_VIEWPORT);
            }
            other => panic!("expected a clear, got {:?}", other),
        }
    }

    #[test]
    fn test_unused_maps_are_collected() {
        let mut fixture = Fixture::new();
        fixture.settings.resource_time_to_live = 3;
        let light = fixture.light(&LightComponent::directional(Vec3::new(0.0, -1.0, 0.0), Vec3::repeat(1.0)).with_shadows(true), 0);
        let mut generator = ShadowMapGenerator::new(&mut fixture.device, &fixture.settings).unwrap();

        generator.render(&mut fixture.device, &light, 1, MAIN_VIEWPORT).unwrap();
        assert_eq!(generator.collect_garbage(&mut fixture.device, 4), 0);
        assert_eq!(generator.collect_garbage(&mut fixture.device, 5), 1);
        assert!(generator.texture(light.source).is_none());
    }
}
