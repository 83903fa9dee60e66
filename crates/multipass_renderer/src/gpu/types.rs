//! Value types passed through the graphics device interface

use serde::{Deserialize, Serialize};

use crate::foundation::math::{Mat4, Vec2, Vec3, Vec4};

use super::TextureHandle;

/// How vertices are assembled
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum PrimitiveMode {
    /// Indexed triangle list
    #[default]
    Triangles,
    /// Line list (debug geometry)
    Lines,
    /// Point list (particles)
    Points,
}

/// Texture dimensionality
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TextureKind {
    /// Single 2D image
    D2,
    /// Six square faces
    Cube,
}

/// Texel formats the renderer allocates
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TextureFormat {
    /// 8-bit LDR color
    Rgba8,
    /// Half-float HDR color and lighting buffers
    Rgba16F,
    /// Two-channel float variance moments
    Rg32F,
    /// Single-channel float
    R32F,
    /// Depth attachment
    Depth32F,
}

impl TextureFormat {
    /// Check if this is a depth format
    pub fn is_depth(&self) -> bool {
        matches!(self, Self::Depth32F)
    }
}

/// Cube map face order used by point light shadows
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CubeFace {
    /// +X
    PositiveX,
    /// -X
    NegativeX,
    /// +Y
    PositiveY,
    /// -Y
    NegativeY,
    /// +Z
    PositiveZ,
    /// -Z
    NegativeZ,
}

impl CubeFace {
    /// All faces in attachment order
    pub const ALL: [Self; 6] = [
        Self::PositiveX,
        Self::NegativeX,
        Self::PositiveY,
        Self::NegativeY,
        Self::PositiveZ,
        Self::NegativeZ,
    ];

    /// View direction and up vector of this face (OpenGL cube map convention)
    pub fn look_direction(&self) -> (Vec3, Vec3) {
        match self {
            Self::PositiveX => (Vec3::new(1.0, 0.0, 0.0), Vec3::new(0.0, -1.0, 0.0)),
            Self::NegativeX => (Vec3::new(-1.0, 0.0, 0.0), Vec3::new(0.0, -1.0, 0.0)),
            Self::PositiveY => (Vec3::new(0.0, 1.0, 0.0), Vec3::new(0.0, 0.0, 1.0)),
            Self::NegativeY => (Vec3::new(0.0, -1.0, 0.0), Vec3::new(0.0, 0.0, -1.0)),
            Self::PositiveZ => (Vec3::new(0.0, 0.0, 1.0), Vec3::new(0.0, -1.0, 0.0)),
            Self::NegativeZ => (Vec3::new(0.0, 0.0, -1.0), Vec3::new(0.0, -1.0, 0.0)),
        }
    }
}

/// Texture allocation parameters
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TextureDescriptor {
    /// 2D or cube
    pub kind: TextureKind,
    /// Texel format
    pub format: TextureFormat,
    /// Width in texels
    pub width: u32,
    /// Height in texels
    pub height: u32,
    /// Allocate a full mip chain
    pub mipmapped: bool,
}

impl TextureDescriptor {
    /// 2D texture without mips
    pub fn new_2d(format: TextureFormat, width: u32, height: u32) -> Self {
        Self {
            kind: TextureKind::D2,
            format,
            width,
            height,
            mipmapped: false,
        }
    }

    /// Cube texture with square faces
    pub fn new_cube(format: TextureFormat, size: u32) -> Self {
        Self {
            kind: TextureKind::Cube,
            format,
            width: size,
            height: size,
            mipmapped: false,
        }
    }

    /// Builder-style mip chain request
    #[must_use]
    pub fn with_mipmaps(mut self) -> Self {
        self.mipmapped = true;
        self
    }

    /// Number of levels in the mip chain
    pub fn mip_levels(&self) -> u32 {
        if self.mipmapped {
            32 - self.width.max(self.height).max(1).leading_zeros()
        } else {
            1
        }
    }
}

/// Blend factor, mirroring the fixed-function set
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum BlendFactor {
    /// 0
    #[default]
    Zero,
    /// 1
    One,
    /// Source color
    SrcColor,
    /// 1 - source color
    OneMinusSrcColor,
    /// Destination color
    DstColor,
    /// 1 - destination color
    OneMinusDstColor,
    /// Source alpha
    SrcAlpha,
    /// 1 - source alpha
    OneMinusSrcAlpha,
    /// Destination alpha
    DstAlpha,
    /// 1 - destination alpha
    OneMinusDstAlpha,
    /// Blend constant color
    ConstantColor,
    /// 1 - blend constant color
    OneMinusConstantColor,
    /// Blend constant alpha
    ConstantAlpha,
    /// 1 - blend constant alpha
    OneMinusConstantAlpha,
}

impl BlendFactor {
    /// Check if the factor reads the blend constant
    pub fn uses_constant(&self) -> bool {
        matches!(
            self,
            Self::ConstantColor
                | Self::OneMinusConstantColor
                | Self::ConstantAlpha
                | Self::OneMinusConstantAlpha
        )
    }
}

/// Blend equation operator
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum BlendMode {
    /// src + dst
    #[default]
    Add,
    /// src - dst
    Subtract,
    /// dst - src
    ReverseSubtract,
    /// min(src, dst)
    Min,
    /// max(src, dst)
    Max,
}

/// Source and destination factors
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct BlendFunc {
    /// Source factor
    pub sfactor: BlendFactor,
    /// Destination factor
    pub dfactor: BlendFactor,
}

impl BlendFunc {
    /// Create a blend function
    pub fn new(sfactor: BlendFactor, dfactor: BlendFactor) -> Self {
        Self { sfactor, dfactor }
    }

    /// `ONE, ONE` additive accumulation
    pub fn additive() -> Self {
        Self::new(BlendFactor::One, BlendFactor::One)
    }

    /// Classic alpha blending
    pub fn alpha() -> Self {
        Self::new(BlendFactor::SrcAlpha, BlendFactor::OneMinusSrcAlpha)
    }

    /// Check if either factor reads the blend constant
    pub fn uses_constant(&self) -> bool {
        self.sfactor.uses_constant() || self.dfactor.uses_constant()
    }
}

impl Default for BlendFunc {
    fn default() -> Self {
        Self::new(BlendFactor::One, BlendFactor::Zero)
    }
}

/// Full blend configuration
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct BlendState {
    /// Factors
    pub func: BlendFunc,
    /// Operator
    pub equation: BlendMode,
    /// Blend constant, set whenever a factor reads it
    pub constant_color: Option<[f32; 4]>,
}

impl BlendState {
    /// Additive `ONE, ONE` blending
    pub fn additive() -> Self {
        Self {
            func: BlendFunc::additive(),
            ..Default::default()
        }
    }
}

/// Depth comparison
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum CompareFunc {
    /// Never passes
    Never,
    /// Passes if nearer
    Less,
    /// Passes if exactly equal
    Equal,
    /// Passes if nearer or equal
    #[default]
    LessOrEqual,
    /// Passes if further
    Greater,
    /// Passes always
    Always,
}

/// Depth test and write configuration; `test: None` disables the test
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct DepthState {
    /// Comparison, or `None` for no depth test
    pub test: Option<CompareFunc>,
    /// Write passing fragments' depth
    pub write: bool,
}

impl Default for DepthState {
    fn default() -> Self {
        Self {
            test: Some(CompareFunc::LessOrEqual),
            write: true,
        }
    }
}

impl DepthState {
    /// Equal test without writes, used by lighting passes after the depth pre-pass
    pub fn equal_read_only() -> Self {
        Self {
            test: Some(CompareFunc::Equal),
            write: false,
        }
    }

    /// No test, no writes
    pub fn disabled() -> Self {
        Self { test: None, write: false }
    }
}

/// Pixel rectangle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Viewport {
    /// Left edge
    pub x: u32,
    /// Bottom edge
    pub y: u32,
    /// Width in pixels
    pub width: u32,
    /// Height in pixels
    pub height: u32,
}

impl Viewport {
    /// Rectangle anchored at the origin
    pub fn sized(width: u32, height: u32) -> Self {
        Self { x: 0, y: 0, width, height }
    }
}

/// Typed shader parameter value
#[derive(Debug, Clone, PartialEq)]
pub enum ParameterValue {
    /// `float`
    Float(f32),
    /// `int`
    Int(i32),
    /// `bool`
    Bool(bool),
    /// `vec2`
    Vec2(Vec2),
    /// `vec3`
    Vec3(Vec3),
    /// `vec4`
    Vec4(Vec4),
    /// `mat4`
    Mat4(Mat4),
    /// `mat4[]`
    Mat4Array(Vec<Mat4>),
    /// Sampler bound to a texture unit
    Texture {
        /// Texture to sample
        texture: TextureHandle,
        /// Unit the sampler reads from
        unit: u32,
    },
}

/// Counters returned by a draw
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct DrawCallStatistics {
    /// Primitives submitted
    pub primitives: usize,
}
