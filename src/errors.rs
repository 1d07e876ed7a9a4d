//! Defines the custom error types used throughout `synced_slideshow`.
//!
//! Errors are grouped by where they surface: configuration loading, activation
//! of a slideshow component, and media downloads. `AppError` wraps the ones the
//! binary can hit. Each type implements `Debug`, `Display` and
//! `std::error::Error`, with `From` conversions for the underlying errors.

use std::error::Error as StdError;
use std::fmt;

// --- ConfigError ---
/// Errors related to loading and parsing the configuration file.
#[must_use = "a configuration error should be handled or propagated"]
#[derive(Debug)]
pub enum ConfigError {
    /// An I/O error occurred while trying to read the configuration file.
    Io(std::io::Error),
    /// An error occurred while parsing the configuration file content.
    Parse(String),
    /// A key was present but its value could not be interpreted.
    InvalidValue { key: String, message: String },
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::Io(e) => write!(f, "Configuration I/O error: {}", e),
            ConfigError::Parse(e) => write!(f, "Configuration parse error: {}", e),
            ConfigError::InvalidValue { key, message } => {
                write!(f, "Invalid value for configuration key '{}': {}", key, message)
            }
        }
    }
}

impl StdError for ConfigError {
    fn source(&self) -> Option<&(dyn StdError + 'static)> {
        match self {
            ConfigError::Io(e) => Some(e),
            _ => None,
        }
    }
}

impl From<std::io::Error> for ConfigError {
    fn from(err: std::io::Error) -> Self {
        ConfigError::Io(err)
    }
}

// --- ActivationError ---
/// Fatal problems detected when a slideshow component is enabled.
///
/// Any of these leaves the component disabled. A refresh interval below the
/// floor is not an error; it is clamped during validation.
#[must_use = "an activation error leaves the slideshow disabled"]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ActivationError {
    /// The URL list is empty.
    NoUrls,
    /// No target material was configured.
    MissingMaterial,
    /// An error output is configured but no fallback error texture is.
    MissingErrorTexture,
    /// Rescaling was requested without a display panel to rescale.
    MissingPanel,
}

impl fmt::Display for ActivationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ActivationError::NoUrls => write!(f, "No URLs set"),
            ActivationError::MissingMaterial => write!(f, "Material not set"),
            ActivationError::MissingErrorTexture => {
                write!(f, "An error output is set but the error texture is not")
            }
            ActivationError::MissingPanel => {
                write!(f, "Rescaling the display panel was requested, but no panel is set")
            }
        }
    }
}

impl StdError for ActivationError {}

// --- DownloadErrorCode ---
/// Failure category reported for a single image download.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DownloadErrorCode {
    Unknown,
    InvalidUrl,
    AccessDenied,
    InvalidImage,
    DownloadError,
    TooManyRequests,
}

impl fmt::Display for DownloadErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            DownloadErrorCode::Unknown => "Unknown",
            DownloadErrorCode::InvalidUrl => "InvalidURL",
            DownloadErrorCode::AccessDenied => "AccessDenied",
            DownloadErrorCode::InvalidImage => "InvalidImage",
            DownloadErrorCode::DownloadError => "DownloadError",
            DownloadErrorCode::TooManyRequests => "TooManyRequests",
        };
        f.write_str(label)
    }
}

// --- MediaError ---
/// Errors raised while fetching and decoding a remote image.
#[must_use = "a media error should be handled or propagated"]
#[derive(Debug)]
pub enum MediaError {
    /// The HTTP request itself failed (connection, TLS, body read...).
    Download(reqwest::Error),
    /// The server answered with a non-success status.
    HttpStatus(reqwest::StatusCode),
    /// The body could not be decoded as an image.
    Image(image::ImageError),
    /// The blocking decode task panicked or was cancelled.
    Task(String),
}

impl MediaError {
    /// Maps this error to the code shown on the error output.
    pub fn code(&self) -> DownloadErrorCode {
        match self {
            MediaError::Download(e) if e.is_builder() => DownloadErrorCode::InvalidUrl,
            MediaError::Download(_) => DownloadErrorCode::DownloadError,
            MediaError::HttpStatus(status) => match status.as_u16() {
                401 | 403 => DownloadErrorCode::AccessDenied,
                429 => DownloadErrorCode::TooManyRequests,
                _ => DownloadErrorCode::DownloadError,
            },
            MediaError::Image(_) => DownloadErrorCode::InvalidImage,
            MediaError::Task(_) => DownloadErrorCode::Unknown,
        }
    }
}

impl fmt::Display for MediaError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MediaError::Download(e) => write!(f, "Image download error: {}", e),
            MediaError::HttpStatus(status) => write!(f, "Image server answered {}", status),
            MediaError::Image(e) => write!(f, "Image decoding error: {}", e),
            MediaError::Task(s) => write!(f, "Image decoding task failed: {}", s),
        }
    }
}

impl StdError for MediaError {
    fn source(&self) -> Option<&(dyn StdError + 'static)> {
        match self {
            MediaError::Download(e) => Some(e),
            MediaError::Image(e) => Some(e),
            _ => None,
        }
    }
}

impl From<reqwest::Error> for MediaError {
    fn from(err: reqwest::Error) -> Self { MediaError::Download(err) }
}
impl From<image::ImageError> for MediaError {
    fn from(err: image::ImageError) -> Self { MediaError::Image(err) }
}

// --- AppError (Top-level error enum) ---
/// A top-level error type for the `synced_slideshow` binary.
#[must_use = "an application error should be handled or propagated"]
#[derive(Debug)]
pub enum AppError {
    Config(ConfigError),
    Activation(ActivationError),
    Generic(String),
}

impl fmt::Display for AppError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AppError::Config(e) => write!(f, "Application Configuration Error: {}", e),
            AppError::Activation(e) => write!(f, "Slideshow Activation Error: {}", e),
            AppError::Generic(s) => write!(f, "Application Error: {}", s),
        }
    }
}

impl StdError for AppError {
    fn source(&self) -> Option<&(dyn StdError + 'static)> {
        match self {
            AppError::Config(e) => Some(e),
            AppError::Activation(e) => Some(e),
            _ => None,
        }
    }
}

impl From<ConfigError> for AppError {
    fn from(err: ConfigError) -> Self { AppError::Config(err) }
}
impl From<ActivationError> for AppError {
    fn from(err: ActivationError) -> Self { AppError::Activation(err) }
}
