//! Thin GPU resource layer
//!
//! The renderer consumes vertex arrays, programs, framebuffers and textures as opaque
//! handles through [`GraphicsDevice`]. [`HeadlessDevice`] implements it without a GPU by
//! tracking resources and recording every command.

pub mod device;
pub mod headless;
pub mod types;

pub use device::GraphicsDevice;
pub use headless::{DeviceCommand, DrawRecord, HeadlessDevice};
pub use types::{
    BlendFactor, BlendFunc, BlendMode, BlendState, CompareFunc, CubeFace, DepthState,
    DrawCallStatistics, ParameterValue, PrimitiveMode, TextureDescriptor, TextureFormat,
    TextureKind, Viewport,
};

slotmap::new_key_type! {
    /// Vertex array owned by a graphics device
    pub struct VertexArrayHandle;

    /// Linked shader program owned by a graphics device
    pub struct ProgramHandle;

    /// Framebuffer owned by a graphics device
    pub struct FramebufferHandle;

    /// Texture owned by a graphics device
    pub struct TextureHandle;
}

/// Result type for device operations
pub type GpuResult<T> = Result<T, GpuError>;

/// Graphics device errors
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum GpuError {
    /// A handle that was never created or already deleted
    #[error("Invalid {0} handle")]
    InvalidHandle(&'static str),

    /// Shader compilation or linking failed
    #[error("Failed to compile program '{name}': {log}")]
    CompileFailed {
        /// Program name
        name: String,
        /// Compiler output
        log: String,
    },

    /// Resource parameters the device cannot satisfy
    #[error("Invalid descriptor: {0}")]
    InvalidDescriptor(String),

    /// Framebuffer attachments disagree in size or kind
    #[error("Attachment mismatch: {0}")]
    AttachmentMismatch(String),

    /// An operation needs state that is not bound
    #[error("Invalid state: {0}")]
    InvalidState(&'static str),
}
