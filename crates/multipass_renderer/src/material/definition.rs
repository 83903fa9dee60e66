//! Material definitions
//!
//! A definition names the shader functions a family of materials shares. Every
//! material instance points at exactly one definition, and the renderer builds one
//! program set per definition, never per instance.

use serde::{Deserialize, Serialize};

/// How the base diffuse color is produced
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum DiffuseShader {
    /// Constant `diffuse_color`
    #[default]
    Flat,
    /// `diffuse_color` modulated by the diffuse texture
    Textured,
}

/// How self-illumination is produced
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum EmissiveShader {
    /// No emission
    #[default]
    None,
    /// Constant `emissive_color`
    Flat,
    /// `emissive_color` modulated by the emissive texture
    Textured,
}

/// How the specular exponent is produced
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum ShininessShader {
    /// Constant `shininess`
    #[default]
    Constant,
    /// `shininess` scaled by the red channel of the shininess texture
    Textured,
}

/// How refraction offsets the background sample
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum RefractionShader {
    /// Not refractive
    #[default]
    None,
    /// Screen-space offset along the view-space normal
    ScreenSpace,
}

/// How the shading normal is produced
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum NormalMapShader {
    /// Interpolated vertex normal
    #[default]
    None,
    /// Tangent-space normal texture
    Textured,
}

/// Shader-function selection shared by every material of one kind
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct MaterialDefinition {
    /// Name used in logs and program names
    pub name: String,
    /// Diffuse function
    pub diffuse: DiffuseShader,
    /// Emissive function
    pub emissive: EmissiveShader,
    /// Shininess function
    pub shininess: ShininessShader,
    /// Refraction function
    pub refraction: RefractionShader,
    /// Normal function
    pub normal_map: NormalMapShader,
    /// Bumped by the library on every reload
    #[serde(skip)]
    pub revision: u32,
}

impl MaterialDefinition {
    /// Definition with every function at its default
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }

    /// Set the diffuse function
    #[must_use]
    pub fn with_diffuse(mut self, diffuse: DiffuseShader) -> Self {
        self.diffuse = diffuse;
        self
    }

    /// Set the emissive function
    #[must_use]
    pub fn with_emissive(mut self, emissive: EmissiveShader) -> Self {
        self.emissive = emissive;
        self
    }

    /// Set the shininess function
    #[must_use]
    pub fn with_shininess(mut self, shininess: ShininessShader) -> Self {
        self.shininess = shininess;
        self
    }

    /// Set the refraction function
    #[must_use]
    pub fn with_refraction(mut self, refraction: RefractionShader) -> Self {
        self.refraction = refraction;
        self
    }

    /// Set the normal function
    #[must_use]
    pub fn with_normal_map(mut self, normal_map: NormalMapShader) -> Self {
        self.normal_map = normal_map;
        self
    }

    /// Check if the definition samples the refraction background
    pub fn is_refractive(&self) -> bool {
        self.refraction != RefractionShader::None
    }
}
