//! Position of the slideshow in its URL list.

use log::trace;

use crate::errors::ActivationError;
use crate::model::SlideUrl;

/// Current index into an immutable, non-empty URL list.
///
/// `advance` and `jump_to` keep the raw index in `[0, len)`. Any other value
/// is still wrapped back into range whenever it is read.
#[derive(Clone, Debug)]
pub struct PlaybackCursor {
    urls: Vec<SlideUrl>,
    raw: i32,
}

impl PlaybackCursor {
    pub fn new(urls: Vec<SlideUrl>) -> Result<Self, ActivationError> {
        if urls.is_empty() {
            return Err(ActivationError::NoUrls);
        }
        Ok(Self { urls, raw: 0 })
    }

    pub fn url_count(&self) -> usize {
        self.urls.len()
    }

    pub fn resolved_index(&self) -> usize {
        // `new` guarantees a non-empty list.
        let len = self.urls.len() as i64;
        i64::from(self.raw).rem_euclid(len) as usize
    }

    pub fn current(&self) -> &SlideUrl {
        &self.urls[self.resolved_index()]
    }

    pub fn advance(&mut self) {
        self.raw = ((self.resolved_index() + 1) % self.urls.len()) as i32;
        trace!("Cursor advanced to raw index {}", self.raw);
    }

    /// Moves to a replicated index, normalizing it into range.
    pub fn jump_to(&mut self, index: i32) {
        self.raw = index;
        self.raw = self.resolved_index() as i32;
        trace!("Cursor jumped to {} (requested {})", self.raw, index);
    }
}
