//! Visibility culling
//!
//! Culling proxies in a dynamic bounding-volume tree, a software occlusion rasterizer,
//! and the visitor interface queries report through.

pub mod bvh;
pub mod index;
pub mod occlusion;
pub mod proxy;
pub mod visitor;

pub use bvh::BoundingVolumeTree;
pub use index::{box_occluder, world_aabb, CullingIndex, CullingStats};
pub use occlusion::{OcclusionRasterizer, OcclusionStats};
pub use proxy::{CullingGroups, CullingProxy, ProxyOwner};
pub use visitor::{CollectingVisitor, VisibilityVisitor};
