//! Multi-pass scene renderer
//!
//! Turns a scene's visible set into a lit, composited image per viewport. The
//! [`DefaultSceneRenderer`] drives every pass through a [`crate::gpu::GraphicsDevice`];
//! the other modules are the pieces it is built from.

pub mod collector;
pub mod compositor;
pub mod draw_record;
pub mod error;
pub mod framebuffers;
pub mod light_contacts;
pub mod light_snapshot;
pub mod shader_cache;
pub mod shader_library;
pub mod shadow;
pub mod skinning;
pub mod stats;
pub mod visible_set;


pub use collector::VisibleObjectCollector;
pub use compositor::{Camera, DefaultSceneRenderer, SceneRenderer};
pub use draw_record::{MeshDrawRecord, TouchingListId};
pub use error::{RenderError, RenderResult};
pub use framebuffers::{FramebufferManager, ViewportFramebuffer};
pub use light_contacts::resolve_light_contacts;
pub use light_snapshot::{LightClass, LightSnapshot, ShadowSnapshot, ShadowViews};
pub use shader_cache::{PassKind, ShaderCacheInvalidator, ShaderCacheStats, ShaderPermutationCache};
pub use shadow::{RenderedShadow, ShadowMapGenerator};
pub use skinning::SkinningCache;
pub use stats::RenderStatistics;
pub use visible_set::{CollectedLight, OpaqueBucket, VisibleSet};
