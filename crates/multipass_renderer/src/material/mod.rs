//! Materials
//!
//! Definitions select shader functions, instances carry values, and the library owns
//! definitions and broadcasts their lifecycle events.

pub mod definition;
pub mod instance;
pub mod library;

pub use definition::{
    DiffuseShader, EmissiveShader, MaterialDefinition, NormalMapShader, RefractionShader,
    ShininessShader,
};
pub use instance::{Material, MaterialBlend, MaterialTextures};
pub use library::{MaterialEventHandler, MaterialHandlerId, MaterialLibrary};
