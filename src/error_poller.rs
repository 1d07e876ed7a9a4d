//! Buffers download failures until they can be shown.
//!
//! Failure notifications arrive from the downloader's background context,
//! which must not touch presentation state. They land in a single-slot
//! mailbox instead, and the slideshow drains it periodically from its own
//! context.

use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use log::{debug, trace};

use crate::model::DownloadFailure;

/// Delay between two polls of the mailbox.
pub const POLL_INTERVAL: Duration = Duration::from_secs(2);

/// Single-slot buffer holding the most recent download failure.
///
/// Cheap to clone; all clones share the same slot. Posting overwrites any
/// failure that was not shown yet.
#[derive(Clone, Debug, Default)]
pub struct ErrorMailbox {
    slot: Arc<Mutex<Option<DownloadFailure>>>,
}

impl ErrorMailbox {
    pub fn post(&self, failure: DownloadFailure) {
        let mut slot = self.slot.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(previous) = slot.replace(failure) {
            trace!("Overwriting unshown failure for {}", previous.url);
        }
    }

    /// Takes the buffered failure, leaving the slot empty.
    pub fn take(&self) -> Option<DownloadFailure> {
        self.slot.lock().unwrap_or_else(PoisonError::into_inner).take()
    }

    pub fn is_empty(&self) -> bool {
        self.slot.lock().unwrap_or_else(PoisonError::into_inner).is_none()
    }
}

/// Drains the mailbox on behalf of a slideshow that has an error output.
#[derive(Clone, Debug)]
pub struct ErrorPoller {
    mailbox: ErrorMailbox,
}

impl ErrorPoller {
    pub fn new(mailbox: ErrorMailbox) -> Self {
        Self { mailbox }
    }

    pub fn interval(&self) -> Duration {
        POLL_INTERVAL
    }

    pub fn drain(&self) -> Option<DownloadFailure> {
        let failure = self.mailbox.take()?;
        debug!("Showing download failure for {} from {}", failure.url, failure.at.format("%H:%M:%S"));
        Some(failure)
    }
}
