//! Renderer settings
//!
//! Everything the compositor, shadow generator and culling code can be tuned with.
//! The four HDR/bloom values are also exposed as runtime setters on the renderer.

use serde::{Deserialize, Serialize};

use super::Config;

/// Tunable renderer parameters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RendererSettings {
    /// Render into a floating-point target and tone map at the end of the frame
    pub hdr_enabled: bool,
    /// Add a bright-pass bloom buffer during tone mapping (requires HDR)
    pub bloom_enabled: bool,
    /// Exposure key used by the tone mapper
    pub hdr_exposure: f32,
    /// Weight of the bloom buffer in the tone-mapped result
    pub bloom_factor: f32,
    /// Luminance above which a pixel contributes to bloom
    pub bloom_threshold: f32,
    /// Source mip level the bloom bright-pass samples from
    pub bloom_source_lod: f32,

    /// Use the software occlusion rasterizer during visibility queries
    pub occlusion_culling: bool,
    /// Occlusion depth buffer width in pixels
    pub occlusion_buffer_width: u32,
    /// Occlusion depth buffer height in pixels
    pub occlusion_buffer_height: u32,
    /// Margin added around leaf bounds in the culling tree
    pub culling_tree_margin: f32,

    /// Side length of every shadow map (and cube face)
    pub shadow_map_size: u32,
    /// Gaussian blur radius in texels applied to variance shadow maps
    pub shadow_blur_radius: f32,
    /// Half extent of the orthographic volume used by directional shadows
    pub directional_shadow_extent: f32,
    /// Depth range of the orthographic volume used by directional shadows
    pub directional_shadow_depth: f32,
    /// Near plane of point and spot shadow projections
    pub shadow_near_plane: f32,
    /// Brightness factor applied to fully shadowed pixels
    pub shadow_intensity: f32,

    /// Attenuation value considered "no more light" when sizing light volumes
    pub light_cutoff: f32,
    /// Frames an unused shadow map or skinning buffer survives before it is freed
    pub resource_time_to_live: u32,
    /// Overlay color for highlighted (selected) meshes
    pub highlight_color: [f32; 4],
}

impl Default for RendererSettings {
    fn default() -> Self {
        Self {
            hdr_enabled: true,
            bloom_enabled: false,
            hdr_exposure: 0.18,
            bloom_factor: 0.25,
            bloom_threshold: 1.0,
            bloom_source_lod: 2.0,
            occlusion_culling: true,
            occlusion_buffer_width: 128,
            occlusion_buffer_height: 128,
            culling_tree_margin: 0.1,
            shadow_map_size: 512,
            shadow_blur_radius: 2.0,
            directional_shadow_extent: 50.0,
            directional_shadow_depth: 200.0,
            shadow_near_plane: 0.1,
            shadow_intensity: 0.35,
            light_cutoff: 1.0 / 256.0,
            resource_time_to_live: 120,
            highlight_color: [1.0, 0.6, 0.1, 0.35],
        }
    }
}

impl Config for RendererSettings {}

impl RendererSettings {
    /// Bloom is only meaningful on top of HDR
    pub fn bloom_active(&self) -> bool {
        self.hdr_enabled && self.bloom_enabled
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bloom_requires_hdr() {
        let mut settings = RendererSettings {
            bloom_enabled: true,
            ..Default::default()
        };
        assert!(settings.bloom_active());

        settings.hdr_enabled = false;
        assert!(!settings.bloom_active());
    }

    #[test]
    fn test_toml_round_trip_keeps_values() {
        let settings = RendererSettings {
            hdr_exposure: 0.5,
            shadow_map_size: 1024,
            ..Default::default()
        };
        let text = settings.to_string_with_format("renderer.toml").unwrap();
        let parsed = RendererSettings::from_str_with_format(&text, "renderer.toml").unwrap();
        assert_eq!(parsed, settings);
    }

    #[test]
    fn test_partial_ron_uses_defaults() {
        let parsed =
            RendererSettings::from_str_with_format("(hdr_enabled: false)", "renderer.ron").unwrap();
        assert!(!parsed.hdr_enabled);
        assert_eq!(parsed.shadow_map_size, RendererSettings::default().shadow_map_size);
    }

    #[test]
    fn test_unknown_extension_rejected() {
        let result = RendererSettings::from_str_with_format("", "renderer.json");
        assert!(matches!(result, Err(crate::config::ConfigError::UnsupportedFormat(_))));
    }
}
