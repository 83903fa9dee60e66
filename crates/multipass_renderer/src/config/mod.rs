//! Renderer configuration
//!
//! Settings implement [`Config`] and are read or written as TOML or RON; the file
//! extension picks the format.

use std::path::Path;

use serde::{de::DeserializeOwned, Serialize};

mod settings;

pub use settings::RendererSettings;

/// Text formats a settings file can use
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigFormat {
    /// `.toml`
    Toml,
    /// `.ron`
    Ron,
}

impl ConfigFormat {
    /// Format matching a path's extension
    pub fn from_path(path: &Path) -> Result<Self, ConfigError> {
        match path.extension().and_then(|ext| ext.to_str()) {
            Some("toml") => Ok(Self::Toml),
            Some("ron") => Ok(Self::Ron),
            _ => Err(ConfigError::UnsupportedFormat(path.display().to_string())),
        }
    }
}

/// Serializable settings with file loading and saving
pub trait Config: Serialize + DeserializeOwned + Default {
    /// Read settings from a file
    fn load_from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path)?;
        let settings = Self::from_str_with_format(&contents, path)?;
        log::info!("Loaded settings from {}", path.display());
        Ok(settings)
    }

    /// Parse settings text; `path` only selects the format
    fn from_str_with_format(contents: &str, path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        match ConfigFormat::from_path(path.as_ref())? {
            ConfigFormat::Toml => toml::from_str(contents).map_err(|err| ConfigError::Parse(err.to_string())),
            ConfigFormat::Ron => ron::from_str(contents).map_err(|err| ConfigError::Parse(err.to_string())),
        }
    }

    /// Serialize settings text; `path` only selects the format
    fn to_string_with_format(&self, path: impl AsRef<Path>) -> Result<String, ConfigError> {
        match ConfigFormat::from_path(path.as_ref())? {
            ConfigFormat::Toml => toml::to_string_pretty(self).map_err(|err| ConfigError::Serialize(err.to_string())),
            ConfigFormat::Ron => ron::ser::to_string_pretty(self, ron::ser::PrettyConfig::default())
                .map_err(|err| ConfigError::Serialize(err.to_string())),
        }
    }

    /// Write settings to a file
    fn save_to_file(&self, path: impl AsRef<Path>) -> Result<(), ConfigError> {
        let path = path.as_ref();
        std::fs::write(path, self.to_string_with_format(path)?)?;
        Ok(())
    }
}

/// Settings file errors
#[derive(thiserror::Error, Debug)]
pub enum ConfigError {
    /// Reading or writing the file failed
    #[error("Settings file I/O failed: {0}")]
    Io(#[from] std::io::Error),

    /// The text is not valid for the format
    #[error("Invalid settings: {0}")]
    Parse(String),

    /// Settings could not be written in the format
    #[error("Settings serialization failed: {0}")]
    Serialize(String),

    /// Neither `.toml` nor `.ron`
    #[error("Unsupported settings format: {0}")]
    UnsupportedFormat(String),
}
