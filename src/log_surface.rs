//! A `Surface` that keeps the visual state in memory and reports changes
//! through the log. Used by the binary in place of a rendered scene.

use log::{debug, info, warn};

use crate::media_pipeline::{AppliedTexture, TextureStore};
use crate::model::{MaterialId, PanelScale, TextureId};
use crate::presentation::Surface;

#[derive(Debug)]
pub struct LogSurface {
    name: String,
    scale: PanelScale,
    error_visible: bool,
    error_text: String,
    controls: Option<(bool, bool)>,
    textures: TextureStore,
}

impl LogSurface {
    pub fn new(name: impl Into<String>, scale: PanelScale, textures: TextureStore) -> Self {
        Self {
            name: name.into(),
            scale,
            error_visible: false,
            error_text: String::new(),
            controls: None,
            textures,
        }
    }

    pub fn error_visible(&self) -> bool {
        self.error_visible
    }

    pub fn error_text(&self) -> &str {
        &self.error_text
    }

    /// `(play, stop)` visibility, once set.
    pub fn controls(&self) -> Option<(bool, bool)> {
        self.controls
    }
}

impl Surface for LogSurface {
    fn panel_scale(&self) -> PanelScale {
        self.scale
    }

    fn set_panel_scale(&mut self, scale: PanelScale) {
        if scale != self.scale {
            debug!("[{}] Panel scale {:.3} x {:.3} x {:.3}", self.name, scale.x, scale.y, scale.z);
        }
        self.scale = scale;
    }

    fn set_error_visible(&mut self, visible: bool) {
        if visible != self.error_visible {
            info!("[{}] Error output {}", self.name, if visible { "shown" } else { "hidden" });
        }
        self.error_visible = visible;
    }

    fn set_error_text(&mut self, text: &str) {
        if text != self.error_text {
            warn!("[{}] {}", self.name, text.replace('\n', ": "));
            self.error_text = text.to_string();
        }
    }

    fn set_material_texture(&mut self, material: &MaterialId, texture: &TextureId) {
        info!("[{}] Material {} falls back to {}", self.name, material, texture);
        self.textures.apply(material.clone(), AppliedTexture::Fallback(texture.clone()));
    }

    fn set_controls(&mut self, play_visible: bool, stop_visible: bool) {
        if self.controls != Some((play_visible, stop_visible)) {
            debug!("[{}] Controls: play {}, stop {}", self.name, play_visible, stop_visible);
        }
        self.controls = Some((play_visible, stop_visible));
    }
}
