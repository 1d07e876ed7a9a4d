//! Owns the download handles of a slideshow.
//!
//! Two slots are used in alternation. A new download always goes into the
//! slot that was *not* used last, after releasing whatever that slot held, so
//! the handle backing the most recent request is never destroyed underneath
//! it. The slideshow additionally refuses to start a download while the last
//! one is still pending, which keeps completions in display order.

use log::{debug, trace, warn};
use tokio::sync::mpsc;

use crate::error_poller::ErrorMailbox;
use crate::model::{DownloadFailure, DownloadState, ImageDimensions, MaterialId, SlideUrl, WrapMode};

/// A single in-flight or finished download.
pub trait DownloadHandle {
    fn state(&self) -> DownloadState;

    /// Frees the handle, cancelling the download if it is still running.
    fn release(self);
}

/// Fetches and decodes images onto a material, off the interactive context.
///
/// Implementations report the outcome through `receiver` exactly once, after
/// the handle's state has left `Pending`.
pub trait ImageDownloader {
    type Handle: DownloadHandle;

    fn download(
        &mut self,
        url: &SlideUrl,
        material: &MaterialId,
        receiver: CompletionSender,
        wrap: WrapMode,
    ) -> Self::Handle;
}

/// Completion notice delivered to the slideshow's interactive context.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DownloadEvent {
    Loaded(ImageDimensions),
    /// Details are in the error mailbox.
    Failed,
}

/// Callback receiver handed to the downloader with every request.
///
/// Successes travel as messages. Failures are written to the error mailbox
/// first so the failure details never cross into presentation code directly.
#[derive(Clone, Debug)]
pub struct CompletionSender {
    events: mpsc::UnboundedSender<DownloadEvent>,
    mailbox: ErrorMailbox,
}

impl CompletionSender {
    pub fn new(events: mpsc::UnboundedSender<DownloadEvent>, mailbox: ErrorMailbox) -> Self {
        Self { events, mailbox }
    }

    pub fn loaded(&self, dimensions: ImageDimensions) {
        if self.events.send(DownloadEvent::Loaded(dimensions)).is_err() {
            trace!("Slideshow gone; dropping completion");
        }
    }

    pub fn failed(&self, failure: DownloadFailure) {
        warn!("Download of {} failed: {} {}", failure.url, failure.code, failure.message);
        self.mailbox.post(failure);
        if self.events.send(DownloadEvent::Failed).is_err() {
            trace!("Slideshow gone; dropping failure notice");
        }
    }
}

/// The two alternating handle slots.
#[derive(Debug)]
pub struct DownloadSlots<H> {
    slots: [Option<H>; 2],
    last_used: Option<usize>,
}

impl<H: DownloadHandle> Default for DownloadSlots<H> {
    fn default() -> Self {
        Self::new()
    }
}

impl<H: DownloadHandle> DownloadSlots<H> {
    pub fn new() -> Self {
        Self { slots: [None, None], last_used: None }
    }

    /// Whether the most recently started download has not finished yet.
    pub fn is_pending(&self) -> bool {
        self.last_used
            .and_then(|slot| self.slots[slot].as_ref())
            .is_some_and(|handle| handle.state() == DownloadState::Pending)
    }

    pub fn live_handles(&self) -> usize {
        self.slots.iter().filter(|slot| slot.is_some()).count()
    }

    /// Starts downloading `url` in the slot not used last. Returns that slot.
    pub fn start<D>(
        &mut self,
        downloader: &mut D,
        url: &SlideUrl,
        material: &MaterialId,
        receiver: CompletionSender,
        wrap: WrapMode,
    ) -> usize
    where
        D: ImageDownloader<Handle = H>,
    {
        let slot = match self.last_used {
            Some(last) => 1 - last,
            None => 0,
        };
        if let Some(previous) = self.slots[slot].take() {
            trace!("Releasing previous handle in slot {} ({:?})", slot, previous.state());
            previous.release();
        }
        debug!("Starting download of {} in slot {}", url, slot);
        self.slots[slot] = Some(downloader.download(url, material, receiver, wrap));
        self.last_used = Some(slot);
        slot
    }

    /// Releases both slots, whatever their state.
    pub fn release_all(&mut self) {
        for (slot, handle) in self.slots.iter_mut().enumerate() {
            if let Some(handle) = handle.take() {
                trace!("Releasing slot {} on teardown ({:?})", slot, handle.state());
                handle.release();
            }
        }
        self.last_used = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::DownloadErrorCode;
    use crate::test_support::{urls, DownloadLog, FakeDownloader};

    struct Rig {
        slots: DownloadSlots<crate::test_support::FakeHandle>,
        downloader: FakeDownloader,
        sender: CompletionSender,
        events: mpsc::UnboundedReceiver<DownloadEvent>,
        mailbox: ErrorMailbox,
        material: MaterialId,
    }

    impl Rig {
        fn new() -> Self {
            let (tx, events) = mpsc::unbounded_channel();
            let mailbox = ErrorMailbox::default();
            Self {
                slots: DownloadSlots::new(),
                downloader: FakeDownloader::default(),
                sender: CompletionSender::new(tx, mailbox.clone()),
                events,
                mailbox,
                material: MaterialId("panel".into()),
            }
        }

        fn start(&mut self, url: &SlideUrl) -> usize {
            self.slots.start(&mut self.downloader, url, &self.material, self.sender.clone(), WrapMode::Clamp)
        }
    }

    #[test]
    fn slots_alternate() {
        let list = urls(3);
        let mut rig = Rig::new();
        assert_eq!(rig.start(&list[0]), 0);
        rig.downloader.finish(0, DownloadState::Complete);
        assert_eq!(rig.start(&list[1]), 1);
        rig.downloader.finish(1, DownloadState::Complete);
        assert_eq!(rig.start(&list[2]), 0);
    }

    #[test]
    fn previous_handle_released_before_reassignment() {
        let list = urls(3);
        let mut rig = Rig::new();
        for (i, url) in list.iter().enumerate() {
            rig.start(url);
            rig.downloader.finish(i, DownloadState::Complete);
            assert!(rig.slots.live_handles() <= 2);
        }
        assert_eq!(
            rig.downloader.log(),
            vec![
                DownloadLog::Issued { id: 0, url: list[0].to_string() },
                DownloadLog::Issued { id: 1, url: list[1].to_string() },
                DownloadLog::Released(0),
                DownloadLog::Issued { id: 2, url: list[2].to_string() },
            ]
        );
    }

    #[test]
    fn pending_tracks_the_latest_download() {
        let list = urls(2);
        let mut rig = Rig::new();
        assert!(!rig.slots.is_pending());
        rig.start(&list[0]);
        assert!(rig.slots.is_pending());
        rig.downloader.finish(0, DownloadState::Error);
        assert!(!rig.slots.is_pending());
    }

    #[test]
    fn teardown_releases_everything() {
        let list = urls(2);
        let mut rig = Rig::new();
        rig.start(&list[0]);
        rig.downloader.finish(0, DownloadState::Complete);
        rig.start(&list[1]);
        rig.slots.release_all();
        assert_eq!(rig.slots.live_handles(), 0);
        assert!(!rig.slots.is_pending());
        assert_eq!(rig.downloader.released(), vec![0, 1]);
    }

    #[test]
    fn failures_go_through_the_mailbox() {
        let list = urls(1);
        let mut rig = Rig::new();
        rig.sender.failed(DownloadFailure::new(list[0].clone(), DownloadErrorCode::InvalidImage, "bad", None));
        assert_eq!(rig.events.try_recv().unwrap(), DownloadEvent::Failed);
        assert_eq!(rig.mailbox.take().unwrap().code, DownloadErrorCode::InvalidImage);

        rig.sender.loaded(ImageDimensions { width: 4, height: 3 });
        assert_eq!(
            rig.events.try_recv().unwrap(),
            DownloadEvent::Loaded(ImageDimensions { width: 4, height: 3 })
        );
    }
}
