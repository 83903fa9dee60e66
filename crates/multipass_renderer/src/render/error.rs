//! Rendering error types

use thiserror::Error;

use crate::foundation::collections::ViewportId;
use crate::gpu::GpuError;

/// High-level rendering error types
///
/// Per-object anomalies (missing meshes, materials or programs) are not errors; the
/// affected draw is skipped and logged. These values cover failed lookups and device
/// failures that abort the current call.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum RenderError {
    /// Renderer initialization failed during setup
    #[error("Renderer initialization failed: {0}")]
    InitializationFailed(String),

    /// A rendering operation failed during execution
    #[error("Rendering failed: {0}")]
    RenderingFailed(String),

    /// Resource creation or management failed
    #[error("Resource creation failed: {0}")]
    ResourceCreationFailed(String),

    /// The viewport was never added or was already removed
    #[error("Unknown viewport {0:?}")]
    UnknownViewport(ViewportId),

    /// Viewports need a non-zero size
    #[error("Invalid viewport size {width}x{height}")]
    InvalidViewportSize {
        /// Requested width
        width: u32,
        /// Requested height
        height: u32,
    },

    /// Error reported by the graphics device
    #[error("Backend error: {0}")]
    Backend(#[from] GpuError),
}

/// Result type for rendering operations
pub type RenderResult<T> = Result<T, RenderError>;
