//! Material instances
//!
//! A material is a definition plus the values its shader functions read. Whether a
//! mesh is drawn opaque, blended or refractive is decided here.

use crate::foundation::collections::MaterialDefinitionId;
use crate::foundation::math::{Vec3, Vec4};
use crate::gpu::{BlendFunc, BlendMode, BlendState, GpuResult, GraphicsDevice, ParameterValue, TextureHandle};

/// Texture unit of the diffuse texture
pub const DIFFUSE_TEXTURE_UNIT: u32 = 0;
/// Texture unit of the emissive texture
pub const EMISSIVE_TEXTURE_UNIT: u32 = 1;
/// Texture unit of the normal map
pub const NORMAL_TEXTURE_UNIT: u32 = 2;
/// Texture unit of the shininess texture
pub const SHININESS_TEXTURE_UNIT: u32 = 3;

/// Optional textures sampled by the definition's shader functions
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MaterialTextures {
    /// Diffuse color texture
    pub diffuse: Option<TextureHandle>,
    /// Emission texture
    pub emissive: Option<TextureHandle>,
    /// Tangent-space normal map
    pub normal: Option<TextureHandle>,
    /// Specular exponent texture
    pub shininess: Option<TextureHandle>,
}

/// Per-material blending, applied when the material is drawn in the blended pass
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MaterialBlend {
    /// Source and destination factors
    pub func: BlendFunc,
    /// Blend operator
    pub equation: BlendMode,
    /// Constant color, consumed only by the `Constant*` factors
    pub constant_color: [f32; 4],
}

impl Default for MaterialBlend {
    fn default() -> Self {
        Self {
            func: BlendFunc::alpha(),
            equation: BlendMode::Add,
            constant_color: [0.0; 4],
        }
    }
}

impl MaterialBlend {
    /// Device blend state; the constant is only carried when a factor reads it
    pub fn blend_state(&self) -> BlendState {
        BlendState {
            func: self.func,
            equation: self.equation,
            constant_color: self.func.uses_constant().then_some(self.constant_color),
        }
    }
}

/// Material instance
#[derive(Debug, Clone, PartialEq)]
pub struct Material {
    /// Optional name for debugging
    pub name: Option<String>,
    /// Definition selecting the shader functions
    pub definition: MaterialDefinitionId,
    /// RGBA diffuse color; alpha is used by blended materials
    pub diffuse_color: Vec4,
    /// RGB emission
    pub emissive_color: Vec3,
    /// RGB specular color
    pub specular_color: Vec3,
    /// Specular exponent
    pub shininess: f32,
    /// Strength of the refraction offset
    pub refraction_strength: f32,
    /// Textures
    pub textures: MaterialTextures,
    /// Blending, `None` for opaque materials
    pub blend: Option<MaterialBlend>,
    /// Draw in the refractive pass with a background copy
    pub refractive: bool,
}

impl Material {
    /// Opaque white material of the given definition
    pub fn new(definition: MaterialDefinitionId) -> Self {
        Self {
            name: None,
            definition,
            diffuse_color: Vec4::new(1.0, 1.0, 1.0, 1.0),
            emissive_color: Vec3::zeros(),
            specular_color: Vec3::new(1.0, 1.0, 1.0),
            shininess: 32.0,
            refraction_strength: 0.0,
            textures: MaterialTextures::default(),
            blend: None,
            refractive: false,
        }
    }

    /// Set the material name for debugging
    #[must_use]
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Set the diffuse color
    #[must_use]
    pub fn with_diffuse_color(mut self, color: Vec4) -> Self {
        self.diffuse_color = color;
        self
    }

    /// Set the emissive color
    #[must_use]
    pub fn with_emissive_color(mut self, color: Vec3) -> Self {
        self.emissive_color = color;
        self
    }

    /// Set specular color and exponent
    #[must_use]
    pub fn with_specular(mut self, color: Vec3, shininess: f32) -> Self {
        self.specular_color = color;
        self.shininess = shininess;
        self
    }

    /// Make the material blended
    #[must_use]
    pub fn with_blend(mut self, blend: MaterialBlend) -> Self {
        self.blend = Some(blend);
        self
    }

    /// Make the material refractive
    #[must_use]
    pub fn with_refraction(mut self, strength: f32) -> Self {
        self.refractive = true;
        self.refraction_strength = strength;
        self
    }

    /// Set the textures
    #[must_use]
    pub fn with_textures(mut self, textures: MaterialTextures) -> Self {
        self.textures = textures;
        self
    }

    /// Check if the material goes to the blended pass
    pub fn is_blended(&self) -> bool {
        self.blend.is_some()
    }

    /// Check if the material goes to the refractive pass (wins over blending)
    pub fn is_refractive(&self) -> bool {
        self.refractive
    }

    /// Check if the material is drawn by the opaque passes
    pub fn is_opaque(&self) -> bool {
        !self.is_blended() && !self.is_refractive()
    }

    /// Upload the material values to the bound program
    pub fn apply(&self, device: &mut dyn GraphicsDevice) -> GpuResult<()> {
        device.set_parameter("u_diffuse_color", ParameterValue::Vec4(self.diffuse_color))?;
        device.set_parameter("u_emissive_color", ParameterValue::Vec3(self.emissive_color))?;
        device.set_parameter("u_specular_color", ParameterValue::Vec3(self.specular_color))?;
        device.set_parameter("u_shininess", ParameterValue::Float(self.shininess))?;
        device.set_parameter("u_refraction_strength", ParameterValue::Float(self.refraction_strength))?;

        let slots = [
            ("u_diffuse_texture", self.textures.diffuse, DIFFUSE_TEXTURE_UNIT),
            ("u_emissive_texture", self.textures.emissive, EMISSIVE_TEXTURE_UNIT),
            ("u_normal_texture", self.textures.normal, NORMAL_TEXTURE_UNIT),
            ("u_shininess_texture", self.textures.shininess, SHININESS_TEXTURE_UNIT),
        ];
        for (name, texture, unit) in slots {
            if let Some(texture) = texture {
                device.set_parameter(name, ParameterValue::Texture { texture, unit })?;
            }
        }
        Ok(())
    }
}
