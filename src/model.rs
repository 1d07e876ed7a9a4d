//! Defines the core value types shared by the slideshow components.
//!
//! This includes peer identities, opaque references to host resources
//! (materials, textures), download bookkeeping, and the replicated state
//! payload exchanged between peers.

use std::fmt;

use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};
use url::Url;

use crate::errors::DownloadErrorCode;

/// Identity of a peer in a shared session.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct PeerId(pub u32);

impl fmt::Display for PeerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// An image URL from the slideshow list.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct SlideUrl(Url);

impl SlideUrl {
    pub fn parse(input: &str) -> Result<Self, url::ParseError> {
        Url::parse(input.trim()).map(SlideUrl)
    }

    pub fn as_str(&self) -> &str {
        self.0.as_str()
    }
}

impl fmt::Display for SlideUrl {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Opaque reference to the material that receives downloaded images.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct MaterialId(pub String);

/// Opaque reference to a texture owned by the host (e.g. the error fallback).
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct TextureId(pub String);

impl fmt::Display for MaterialId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl fmt::Display for TextureId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Local scale of the display panel.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct PanelScale {
    pub x: f32,
    pub y: f32,
    pub z: f32,
}

impl PanelScale {
    pub const ONE: PanelScale = PanelScale { x: 1.0, y: 1.0, z: 1.0 };
}

/// Pixel size of a successfully decoded image.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ImageDimensions {
    pub width: u32,
    pub height: u32,
}

impl ImageDimensions {
    /// Width over height. Degenerate images are treated as square.
    pub fn aspect_ratio(&self) -> f32 {
        if self.height == 0 || self.width == 0 {
            return 1.0;
        }
        self.width as f32 / self.height as f32
    }
}

/// Lifecycle of a single download handle.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DownloadState {
    Pending,
    Complete,
    Error,
}

/// How the receiving texture samples outside of `[0, 1]`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum WrapMode {
    /// Don't repeat the bottom on the top, the left on the right...
    #[default]
    Clamp,
    Repeat,
}

/// A failed download, as buffered in the last-error mailbox.
#[derive(Clone, Debug)]
pub struct DownloadFailure {
    pub url: SlideUrl,
    pub code: DownloadErrorCode,
    pub message: String,
    /// Material the download was targeting, if the downloader still knows it.
    pub material: Option<MaterialId>,
    pub at: DateTime<Local>,
}

impl DownloadFailure {
    pub fn new(
        url: SlideUrl,
        code: DownloadErrorCode,
        message: impl Into<String>,
        material: Option<MaterialId>,
    ) -> Self {
        Self { url, code, message: message.into(), material, at: Local::now() }
    }

    /// Text for the error output.
    pub fn display_text(&self) -> String {
        format!("Error {}\n{}", self.code, self.message)
    }
}

/// Reserved index meaning "no update pending".
pub const NO_PENDING_INDEX: i32 = -1;

/// State replicated from the driver to every other peer.
///
/// `index` doubles as an edge-triggered signal: it holds [`NO_PENDING_INDEX`]
/// except between a publish and its acknowledgement.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncedState {
    pub index: i32,
    pub playing: bool,
}

impl SyncedState {
    pub const fn idle() -> Self {
        Self { index: NO_PENDING_INDEX, playing: false }
    }

    /// The index to apply, or `None` for the sentinel.
    pub fn pending_index(&self) -> Option<i32> {
        (self.index != NO_PENDING_INDEX).then_some(self.index)
    }
}
