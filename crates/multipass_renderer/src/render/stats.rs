//! Per-frame render statistics

use crate::culling::CullingStats;

/// Counters of one `render_viewport` call
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RenderStatistics {
    /// Camera visibility query counters
    pub culling: CullingStats,
    /// Models the camera query reported
    pub visible_models: usize,
    /// Lights the camera query reported
    pub lights: usize,
    /// Shadow maps rendered
    pub shadow_maps: usize,
    /// Draws into shadow maps, blur passes included
    pub shadow_draws: usize,
    /// Depth pre-pass draws
    pub depth_draws: usize,
    /// Additive lighting draws
    pub lighting_draws: usize,
    /// Material pass draws
    pub material_draws: usize,
    /// Highlight overlay draws
    pub highlight_draws: usize,
    /// Alpha-blended draws, their lighting included
    pub blended_draws: usize,
    /// Refractive draws, background copies included
    pub refractive_draws: usize,
    /// Fullscreen composition draws
    pub composition_draws: usize,
    /// Draws skipped for a missing program
    pub skipped_draws: usize,
    /// Primitives submitted
    pub primitives: usize,
}

impl RenderStatistics {
    /// Sum of all draw counters
    pub fn total_draws(&self) -> usize {
        self.shadow_draws
            + self.depth_draws
            + self.lighting_draws
            + self.material_draws
            + self.highlight_draws
            + self.blended_draws
            + self.refractive_draws
            + self.composition_draws
    }
}
