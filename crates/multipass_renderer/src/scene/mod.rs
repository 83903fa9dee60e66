//! Scene collaborator
//!
//! Components the renderer draws, the [`SceneQuery`] interface it reads them through,
//! and [`Scene`], the default container keeping them in sync with a culling index.

pub mod light;
pub mod mesh;
pub mod model;
pub mod particles;
pub mod query;
pub mod world;

pub use light::{Attenuation, LightComponent, LightKind};
pub use mesh::{box_data, plane_data, MeshAsset, MeshVertex, SkinData, Submesh, SubmeshData};
pub use model::{ModelComponent, RenderFlags};
pub use particles::{OccluderComponent, ParticleSystemComponent};
pub use query::SceneQuery;
pub use world::Scene;
