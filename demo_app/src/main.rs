//! Headless renderer demo
//!
//! Builds a randomized asteroid field with a shadowed sun and a few point lights,
//! renders it through the recording device and logs per-frame statistics.
//!
//! Usage: `headless_demo [settings.toml|settings.ron] [frames]`

use std::sync::Arc;

use multipass_renderer::config::ConfigError;
use multipass_renderer::foundation::logging;
use multipass_renderer::foundation::math::{Mat4, Transform, Vec3, Vec4};
use multipass_renderer::gpu::{GpuError, HeadlessDevice};
use multipass_renderer::material::{MaterialBlend, MaterialDefinition, MaterialLibrary};
use multipass_renderer::prelude::*;
use rand::Rng;
use thiserror::Error;

/// Errors that end the demo
#[derive(Error, Debug)]
enum DemoError {
    #[error("Settings: {0}")]
    Config(#[from] ConfigError),

    #[error("Renderer: {0}")]
    Render(#[from] RenderError),

    #[error("Device: {0}")]
    Gpu(#[from] GpuError),

    #[error("Invalid frame count '{0}'")]
    FrameCount(String),
}

const FIELD_RADIUS: f32 = 40.0;
const ASTEROID_COUNT: usize = 200;

struct Demo {
    renderer: DefaultSceneRenderer,
    library: MaterialLibrary,
    scene: Scene,
    viewport: multipass_renderer::foundation::collections::ViewportId,
}

impl Demo {
    fn new(settings: RendererSettings) -> Result<Self, DemoError> {
        log::info!("Creating headless renderer...");
        let mut renderer = DefaultSceneRenderer::new(Box::new(HeadlessDevice::new()), settings.clone())?;
        let mut library = MaterialLibrary::new();
        renderer.attach_to_library(&mut library);
        let viewport = renderer.add_viewport(1280, 720)?;

        let mut demo = Self {
            renderer,
            library,
            scene: Scene::from_settings(&settings),
            viewport,
        };
        demo.populate()?;
        Ok(demo)
    }

    fn populate(&mut self) -> Result<(), DemoError> {
        let mut rng = rand::thread_rng();

        let rock = self.library.create_definition(MaterialDefinition::new("rock"));
        let ice = self.library.create_definition(MaterialDefinition::new("ice"));
        let rock_mesh = Arc::new(MeshAsset::upload(
            self.renderer.device_mut(),
            "asteroid",
            vec![box_data(Vec3::repeat(1.0))],
        )?);
        let ground = Arc::new(MeshAsset::upload(self.renderer.device_mut(), "ground", vec![plane_data(FIELD_RADIUS)])?);

        let rock_material = Arc::new(Material::new(rock).with_diffuse_color(Vec4::new(0.45, 0.4, 0.35, 1.0)));
        let ice_material = Arc::new(
            Material::new(ice)
                .with_diffuse_color(Vec4::new(0.6, 0.8, 1.0, 0.5))
                .with_specular(Vec3::repeat(0.8), 64.0)
                .with_blend(MaterialBlend::default()),
        );

        self.scene.add_model(
            ModelComponent::new(ground, rock_material.clone())
                .with_transform(Mat4::new_translation(&Vec3::new(0.0, -5.0, 0.0))),
        );

        for i in 0..ASTEROID_COUNT {
            let position = Vec3::new(
                rng.gen_range(-FIELD_RADIUS..FIELD_RADIUS),
                rng.gen_range(-2.0..10.0),
                rng.gen_range(-FIELD_RADIUS..FIELD_RADIUS),
            );
            let transform = Transform::from_position(position).with_scale(Vec3::repeat(rng.gen_range(0.3..2.0)));
            let material = if i % 10 == 0 { ice_material.clone() } else { rock_material.clone() };
            self.scene
                .add_model(ModelComponent::new(rock_mesh.clone(), material).with_transform(transform.to_matrix()));
        }

        self.scene.add_occluder(OccluderComponent::new(
            Vec3::new(4.0, 6.0, 4.0),
            Mat4::new_translation(&Vec3::new(0.0, 2.0, 0.0)),
        ));

        self.scene.add_light(LightComponent::ambient(Vec3::repeat(0.08)));
        self.scene.add_light(
            LightComponent::directional(Vec3::new(-0.3, -1.0, -0.2).normalize(), Vec3::new(1.0, 0.95, 0.85))
                .with_shadows(true),
        );
        for _ in 0..4 {
            let position = Vec3::new(
                rng.gen_range(-FIELD_RADIUS..FIELD_RADIUS),
                rng.gen_range(2.0..8.0),
                rng.gen_range(-FIELD_RADIUS..FIELD_RADIUS),
            );
            let color = Vec3::new(rng.gen_range(0.5..1.0), rng.gen_range(0.3..1.0), rng.gen_range(0.2..1.0));
            self.scene
                .add_light(LightComponent::point(position, color, Attenuation::new(1.0, 0.1, 0.02)).with_shadows(true));
        }

        log::info!(
            "Scene populated: {} models, {} lights",
            self.scene.model_count(),
            self.scene.light_count()
        );
        Ok(())
    }

    fn run(&mut self, frames: u32) -> Result<(), DemoError> {
        for frame in 0..frames {
            let angle = frame as f32 * 0.05;
            let eye = Vec3::new(angle.cos() * 60.0, 25.0, angle.sin() * 60.0);
            let camera = Camera::perspective(eye, Vec3::zeros(), std::f32::consts::FRAC_PI_3, 1280.0 / 720.0, 0.1, 300.0);

            let stats = self
                .renderer
                .render_viewport(&self.scene, &self.library, self.viewport, &camera)?;
            log::info!(
                "Frame {}: {} visible models, {} lights, {} shadow maps, {} draws ({} skipped), {} primitives",
                frame,
                stats.visible_models,
                stats.lights,
                stats.shadow_maps,
                stats.total_draws(),
                stats.skipped_draws,
                stats.primitives
            );
        }

        let cache = self.renderer.shader_cache().borrow().stats();
        log::info!(
            "Shader cache: {} hits, {} builds, {} failures",
            cache.hits,
            cache.builds,
            cache.failures
        );
        Ok(())
    }
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    logging::init();

    let mut args = std::env::args().skip(1);
    let settings = match args.next() {
        Some(path) => RendererSettings::load_from_file(&path).map_err(DemoError::from)?,
        None => RendererSettings::default(),
    };
    let frames = match args.next() {
        Some(count) => count.parse().map_err(|_| DemoError::FrameCount(count))?,
        None => 10,
    };

    let mut demo = Demo::new(settings)?;
    demo.run(frames)?;
    demo.renderer.shutdown();
    log::info!("Demo finished");
    Ok(())
}
