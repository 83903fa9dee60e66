//! # Multi-pass Renderer
//!
//! A deferred multi-pass forward-lighting scene renderer.
//!
//! ## Features
//!
//! - **Culling**: Dynamic BVH with frustum queries and a software occlusion buffer
//! - **Light Contacts**: Per-object touching-light lists from light volume queries
//! - **Shader Permutations**: Lazily built material programs, invalidated on material edits
//! - **Shadows**: Variance shadow maps with separable blur, cube maps for point lights
//! - **Composition**: Depth pre-pass, additive lighting, material, blended and
//!   refractive passes, HDR tone mapping with optional bloom
//! - **Headless Device**: Command-recording backend for tests and tooling
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use multipass_renderer::prelude::*;
//! use std::sync::Arc;
//!
//! fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let settings = RendererSettings::default();
//!     let mut renderer = DefaultSceneRenderer::new(Box::new(HeadlessDevice::new()), settings.clone())?;
//!     let mut library = MaterialLibrary::new();
//!     renderer.attach_to_library(&mut library);
//!
//!     let definition = library.create_definition(MaterialDefinition::new("flat"));
//!     let mesh = MeshAsset::upload(renderer.device_mut(), "cube", vec![box_data(Vec3::repeat(1.0))])?;
//!     let mut scene = Scene::from_settings(&settings);
//!     scene.add_model(ModelComponent::new(Arc::new(mesh), Arc::new(Material::new(definition))));
//!     scene.add_light(LightComponent::ambient(Vec3::repeat(1.0)));
//!
//!     let viewport = renderer.add_viewport(1280, 720)?;
//!     let camera = Camera::perspective(Vec3::new(0.0, 2.0, 5.0), Vec3::zeros(), 1.0, 16.0 / 9.0, 0.1, 100.0);
//!     let stats = renderer.render_viewport(&scene, &library, viewport, &camera)?;
//!     println!("{} draws", stats.total_draws());
//!     Ok(())
//! }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all, clippy::pedantic, clippy::nursery)]
#![allow(clippy::module_name_repetitions, clippy::similar_names, clippy::too_many_arguments)]

pub mod foundation;
pub mod config;
pub mod geometry;
pub mod culling;
pub mod gpu;
pub mod material;
pub mod scene;
pub mod render;

/// Common imports for renderer users
pub mod prelude {
    pub use crate::{
        config::{Config, RendererSettings},
        foundation::math::{Mat4, Transform, Vec3, Vec4},
        gpu::{GraphicsDevice, HeadlessDevice},
        material::{Material, MaterialDefinition, MaterialLibrary},
        render::{Camera, DefaultSceneRenderer, RenderError, RenderStatistics, SceneRenderer},
        scene::{
            box_data, plane_data, Attenuation, LightComponent, MeshAsset, ModelComponent, OccluderComponent,
            RenderFlags, Scene, SceneQuery,
        },
    };
}
