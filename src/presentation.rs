//! Applies download outcomes to the visual surface.

use log::{debug, trace};

use crate::config::ActiveSettings;
use crate::model::{DownloadFailure, ImageDimensions, MaterialId, PanelScale, TextureId};

/// The visual side of the host: panel transform, material, error text and
/// play/stop affordances.
pub trait Surface {
    fn panel_scale(&self) -> PanelScale;
    fn set_panel_scale(&mut self, scale: PanelScale);
    fn set_error_visible(&mut self, visible: bool);
    fn set_error_text(&mut self, text: &str);
    fn set_material_texture(&mut self, material: &MaterialId, texture: &TextureId);
    fn set_controls(&mut self, play_visible: bool, stop_visible: bool);
}

#[derive(Clone, Debug)]
pub struct PresentationAdapter {
    rescale: bool,
    /// Panel scale captured at activation; ratios apply to its `x`.
    base_scale: PanelScale,
    error_output: bool,
    error_texture: Option<TextureId>,
    controls: bool,
}

impl PresentationAdapter {
    pub fn activate<S: Surface + ?Sized>(settings: &ActiveSettings, surface: &S) -> Self {
        let base_scale = if settings.rescale_panel { surface.panel_scale() } else { PanelScale::ONE };
        Self {
            rescale: settings.rescale_panel,
            base_scale,
            error_output: settings.error_output.is_some(),
            error_texture: settings.error_texture.clone(),
            controls: settings.has_controls,
        }
    }

    pub fn apply_success<S: Surface + ?Sized>(&self, surface: &mut S, dimensions: ImageDimensions) {
        trace!("Applying {}x{} image", dimensions.width, dimensions.height);
        self.rescale_width(surface, dimensions.aspect_ratio());
        if self.error_output {
            surface.set_error_visible(false);
        }
    }

    pub fn apply_error<S: Surface + ?Sized>(&self, surface: &mut S, failure: &DownloadFailure) {
        if !self.error_output {
            return;
        }
        surface.set_error_visible(true);
        surface.set_error_text(&failure.display_text());
        match (failure.material.as_ref(), self.error_texture.as_ref()) {
            (Some(material), Some(texture)) => surface.set_material_texture(material, texture),
            _ => debug!("No material attached to the failure for {}; keeping the current texture", failure.url),
        }
        self.rescale_width(surface, 1.0);
    }

    /// Restores the panel to the scale it had at activation and hides the
    /// error output.
    pub fn reset<S: Surface + ?Sized>(&self, surface: &mut S) {
        self.rescale_width(surface, 1.0);
        if self.error_output {
            surface.set_error_visible(false);
        }
    }

    pub fn show_controls<S: Surface + ?Sized>(&self, surface: &mut S, running: bool) {
        if self.controls {
            surface.set_controls(!running, running);
        }
    }

    fn rescale_width<S: Surface + ?Sized>(&self, surface: &mut S, ratio: f32) {
        if !self.rescale {
            return;
        }
        let mut scale = self.base_scale;
        scale.x = self.base_scale.x * ratio;
        surface.set_panel_scale(scale);
    }
}
