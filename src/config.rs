//! Handles slideshow configuration loading and activation-time validation.
//!
//! `load_config` reads an INI file into an `AppConfig`. The `[slideshow]`
//! section becomes a `SlideshowConfig`, which is only checked when a component
//! is enabled: `SlideshowConfig::validate` turns it into `ActiveSettings` or a
//! fatal `ActivationError`.

use std::time::Duration;

use configparser::ini::Ini;
use log::{debug, error, info, warn};

use super::errors::{ActivationError, ConfigError};
use super::model::{MaterialId, SlideUrl, TextureId, WrapMode};

pub const DEFAULT_REFRESH_SECONDS: f32 = 6.0;
pub const DEFAULT_MINIMUM_REFRESH_SECONDS: f32 = 5.0;

const SLIDESHOW_SECTION: &str = "slideshow";
const SESSION_SECTION: &str = "session";

/// Everything a slideshow component can be configured with.
#[derive(Clone, Debug)]
pub struct SlideshowConfig {
    pub urls: Vec<SlideUrl>,
    pub material: Option<MaterialId>,
    pub panel: Option<String>,
    pub rescale_panel: bool,
    pub error_output: Option<String>,
    pub error_texture: Option<TextureId>,
    pub refresh_seconds: f32,
    pub minimum_refresh_seconds: f32,
    /// When false every peer drives its own playback and nothing is replicated.
    pub synchronise: bool,
    pub auto_start: bool,
    pub play_button: Option<String>,
    pub stop_button: Option<String>,
    pub wrap_mode: WrapMode,
}

impl Default for SlideshowConfig {
    fn default() -> Self {
        Self {
            urls: Vec::new(),
            material: None,
            panel: None,
            rescale_panel: true,
            error_output: None,
            error_texture: None,
            refresh_seconds: DEFAULT_REFRESH_SECONDS,
            minimum_refresh_seconds: DEFAULT_MINIMUM_REFRESH_SECONDS,
            synchronise: true,
            auto_start: false,
            play_button: None,
            stop_button: None,
            wrap_mode: WrapMode::Clamp,
        }
    }
}

/// Validated settings for one activation of a slideshow.
#[derive(Clone, Debug)]
pub struct ActiveSettings {
    pub urls: Vec<SlideUrl>,
    pub material: MaterialId,
    pub rescale_panel: bool,
    pub error_output: Option<String>,
    pub error_texture: Option<TextureId>,
    pub refresh: Duration,
    pub synchronise: bool,
    pub auto_start: bool,
    pub has_controls: bool,
    pub wrap_mode: WrapMode,
}

impl SlideshowConfig {
    /// Checks the configuration the way an activation does.
    ///
    /// Missing references are fatal. A refresh interval below the floor is
    /// clamped to the floor and only logged as a warning.
    pub fn validate(&self, name: &str) -> Result<ActiveSettings, ActivationError> {
        if self.urls.is_empty() {
            return Err(ActivationError::NoUrls);
        }
        let material = self.material.clone().ok_or(ActivationError::MissingMaterial)?;
        if self.error_output.is_some() && self.error_texture.is_none() {
            return Err(ActivationError::MissingErrorTexture);
        }
        if self.rescale_panel && self.panel.is_none() {
            return Err(ActivationError::MissingPanel);
        }

        let floor = if self.minimum_refresh_seconds.is_finite() && self.minimum_refresh_seconds > 0.0 {
            self.minimum_refresh_seconds
        } else {
            DEFAULT_MINIMUM_REFRESH_SECONDS
        };
        let mut refresh_seconds = self.refresh_seconds;
        // Also catches NaN.
        if !(refresh_seconds >= floor) {
            warn!("[{}] Wait time too low ({}s). Reset to {}s", name, refresh_seconds, floor);
            refresh_seconds = floor;
        }
        let refresh = Duration::try_from_secs_f32(refresh_seconds).unwrap_or(Duration::MAX);

        Ok(ActiveSettings {
            urls: self.urls.clone(),
            material,
            rescale_panel: self.rescale_panel,
            error_output: self.error_output.clone(),
            error_texture: self.error_texture.clone(),
            refresh,
            synchronise: self.synchronise,
            auto_start: self.auto_start,
            has_controls: self.play_button.is_some() || self.stop_button.is_some(),
            wrap_mode: self.wrap_mode,
        })
    }
}

/// Settings of the in-process session the binary runs.
#[derive(Clone, Debug)]
pub struct SessionConfig {
    pub peers: u32,
    /// Makes the first peer leave after this long, handing the slideshow over.
    pub owner_leaves_after: Option<Duration>,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self { peers: 1, owner_leaves_after: None }
    }
}

/// Holds the application's configuration parameters.
#[derive(Clone, Debug)]
pub struct AppConfig {
    pub slideshow: SlideshowConfig,
    pub session: SessionConfig,
}

/// Loads application configuration from the specified INI file path.
///
/// # Errors
/// Returns `ConfigError` if the file cannot be read, is malformed,
/// or holds values that cannot be interpreted.
#[must_use = "loading configuration can fail, the Result must be handled"]
pub fn load_config(path: &str) -> Result<AppConfig, ConfigError> {
    info!("Attempting to load config from: {}", path);
    let mut ini = Ini::new();
    ini.load(path).map_err(|e| {
        error!("Error loading config file '{}': {}", path, e);
        let lowered = e.to_lowercase();
        if lowered.contains("os error 2") || lowered.contains("failed to read file") {
            ConfigError::Io(std::io::Error::new(std::io::ErrorKind::NotFound, e))
        } else {
            ConfigError::Parse(e)
        }
    })?;
    let app_config = from_ini(&ini)?;
    info!("Configuration loaded successfully from {}: {} URL(s), {} peer(s)",
        path, app_config.slideshow.urls.len(), app_config.session.peers);
    Ok(app_config)
}

/// Parses application configuration from INI text.
#[must_use = "parsing configuration can fail, the Result must be handled"]
pub fn parse_config(text: &str) -> Result<AppConfig, ConfigError> {
    let mut ini = Ini::new();
    ini.read(text.to_string()).map_err(ConfigError::Parse)?;
    from_ini(&ini)
}

fn from_ini(ini: &Ini) -> Result<AppConfig, ConfigError> {
    let defaults = SlideshowConfig::default();
    let text = |key: &str| {
        ini.get(SLIDESHOW_SECTION, key)
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty())
    };

    let urls = match text("urls") {
        Some(raw) => parse_urls(&raw)?,
        None => {
            warn!("No 'urls' key in section '[{}]'; the slideshow will refuse to start", SLIDESHOW_SECTION);
            Vec::new()
        }
    };
    debug!("Loaded {} URL(s)", urls.len());

    let wrap_mode = match text("wrap_mode").map(|v| v.to_lowercase()).as_deref() {
        None | Some("clamp") => WrapMode::Clamp,
        Some("repeat") => WrapMode::Repeat,
        Some(other) => {
            return Err(invalid("wrap_mode", format!("expected 'clamp' or 'repeat', got '{}'", other)));
        }
    };

    let slideshow = SlideshowConfig {
        urls,
        material: text("material").map(MaterialId),
        panel: text("panel"),
        rescale_panel: get_bool(ini, SLIDESHOW_SECTION, "rescale_panel")?.unwrap_or(defaults.rescale_panel),
        error_output: text("error_output"),
        error_texture: text("error_texture").map(TextureId),
        refresh_seconds: get_float(ini, SLIDESHOW_SECTION, "refresh_seconds")?
            .unwrap_or(defaults.refresh_seconds),
        minimum_refresh_seconds: get_float(ini, SLIDESHOW_SECTION, "minimum_refresh_seconds")?
            .unwrap_or(defaults.minimum_refresh_seconds),
        synchronise: get_bool(ini, SLIDESHOW_SECTION, "synchronise")?.unwrap_or(defaults.synchronise),
        auto_start: get_bool(ini, SLIDESHOW_SECTION, "auto_start")?.unwrap_or(defaults.auto_start),
        play_button: text("play_button"),
        stop_button: text("stop_button"),
        wrap_mode,
    };
    if slideshow.minimum_refresh_seconds <= 0.0 {
        return Err(invalid("minimum_refresh_seconds", "must be greater than zero".to_string()));
    }

    let peers = ini.getuint(SESSION_SECTION, "peers")
        .map_err(|e| invalid("peers", e))?
        .unwrap_or(1);
    let peers = u32::try_from(peers).map_err(|_| invalid("peers", format!("{} is too many peers", peers)))?;
    let owner_leaves_after = get_float(ini, SESSION_SECTION, "owner_leaves_after_seconds")?
        .map(|secs| Duration::try_from_secs_f32(secs)
            .map_err(|e| invalid("owner_leaves_after_seconds", e.to_string())))
        .transpose()?;
    let session = SessionConfig { peers: peers.max(1), owner_leaves_after };

    Ok(AppConfig { slideshow, session })
}

fn parse_urls(raw: &str) -> Result<Vec<SlideUrl>, ConfigError> {
    raw.split(|c: char| c == ',' || c.is_whitespace())
        .filter(|part| !part.is_empty())
        .map(|part| SlideUrl::parse(part).map_err(|e| invalid("urls", format!("'{}': {}", part, e))))
        .collect()
}

fn get_bool(ini: &Ini, section: &str, key: &str) -> Result<Option<bool>, ConfigError> {
    ini.getboolcoerce(section, key).map_err(|e| invalid(key, e))
}

fn get_float(ini: &Ini, section: &str, key: &str) -> Result<Option<f32>, ConfigError> {
    let value = ini.getfloat(section, key).map_err(|e| invalid(key, e))?;
    match value {
        Some(v) if !v.is_finite() => Err(invalid(key, format!("{} is not a finite number", v))),
        Some(v) => Ok(Some(v as f32)),
        None => Ok(None),
    }
}

fn invalid(key: &str, message: String) -> ConfigError {
    error!("Invalid configuration value for '{}': {}", key, message);
    ConfigError::InvalidValue { key: key.to_string(), message }
}
