//! The slideshow controller.
//!
//! `Slideshow` is a passive, event-driven component. The host calls its
//! entrypoints from one interactive context: enable/disable, the play/stop
//! affordances, fired deferrals, download completions, replication and
//! ownership notifications. Nothing blocks; every delay is a deferral handed to
//! the host and re-checked against the current activation when it fires.

use std::time::Duration;

use log::{debug, error, info, trace, warn};
use tokio::sync::mpsc;

use crate::authority::AuthorityResolver;
use crate::config::{ActiveSettings, SlideshowConfig};
use crate::cursor::PlaybackCursor;
use crate::download_slots::{CompletionSender, DownloadEvent, DownloadSlots, ImageDownloader};
use crate::error_poller::{ErrorMailbox, ErrorPoller};
use crate::errors::ActivationError;
use crate::host::{EventTiming, Host, ScheduledTask, TaskKind};
use crate::model::{PeerId, SyncedState};
use crate::presentation::{PresentationAdapter, Surface};
use crate::replication::ReplicationBridge;

/// Delay before re-checking a download that was still pending.
pub const RETRY_DELAY: Duration = Duration::from_secs(1);

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PlaybackState {
    Stopped,
    Running,
}

/// Everything that only exists while the component is enabled.
struct Activation<Hd> {
    settings: ActiveSettings,
    authority: AuthorityResolver,
    bridge: ReplicationBridge,
    slots: DownloadSlots<Hd>,
    presentation: PresentationAdapter,
    poller: Option<ErrorPoller>,
    state: PlaybackState,
    /// An AdvanceAndContinue deferral is outstanding.
    advance_scheduled: bool,
    /// A DownloadCurrent deferral is outstanding.
    retry_scheduled: bool,
}

pub struct Slideshow<H, D: ImageDownloader, S> {
    name: String,
    config: SlideshowConfig,
    host: H,
    downloader: D,
    surface: S,
    /// Survives disable/enable; the list itself never changes.
    cursor: Option<PlaybackCursor>,
    active: Option<Activation<D::Handle>>,
    /// Bumped on every enable and disable to invalidate older deferrals.
    epoch: u64,
    completions: CompletionSender,
    mailbox: ErrorMailbox,
}

impl<H, D, S> Slideshow<H, D, S>
where
    H: Host,
    D: ImageDownloader,
    S: Surface,
{
    /// Creates a disabled slideshow. Download completions are sent to
    /// `completions` and must be fed back through `on_download_event`.
    pub fn new(
        name: impl Into<String>,
        config: SlideshowConfig,
        host: H,
        downloader: D,
        surface: S,
        completions: mpsc::UnboundedSender<DownloadEvent>,
    ) -> Self {
        let mailbox = ErrorMailbox::default();
        Self {
            name: name.into(),
            config,
            host,
            downloader,
            surface,
            cursor: None,
            active: None,
            epoch: 0,
            completions: CompletionSender::new(completions, mailbox.clone()),
            mailbox,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn is_enabled(&self) -> bool {
        self.active.is_some()
    }

    pub fn playback_state(&self) -> PlaybackState {
        self.active.as_ref().map_or(PlaybackState::Stopped, |active| active.state)
    }

    pub fn is_driver(&self) -> bool {
        self.active.as_ref().is_some_and(|active| active.authority.is_driver(&self.host))
    }

    pub fn cursor(&self) -> Option<&PlaybackCursor> {
        self.cursor.as_ref()
    }

    /// Refresh interval of the current activation, after clamping.
    pub fn effective_refresh(&self) -> Option<Duration> {
        self.active.as_ref().map(|active| active.settings.refresh)
    }

    /// The synced field, as the host should serialize it.
    pub fn serialized_state(&self) -> SyncedState {
        self.active.as_ref().map_or(SyncedState::idle(), |active| active.bridge.outbound())
    }

    pub fn live_downloads(&self) -> usize {
        self.active.as_ref().map_or(0, |active| active.slots.live_handles())
    }

    pub fn mailbox(&self) -> &ErrorMailbox {
        &self.mailbox
    }

    pub fn host(&self) -> &H {
        &self.host
    }

    pub fn host_mut(&mut self) -> &mut H {
        &mut self.host
    }

    pub fn downloader(&self) -> &D {
        &self.downloader
    }

    pub fn surface(&self) -> &S {
        &self.surface
    }

    // --- Lifecycle ---

    /// Activates the component.
    ///
    /// # Errors
    /// Any `ActivationError` leaves the component disabled.
    pub fn enable(&mut self) -> Result<(), ActivationError> {
        if self.active.is_some() {
            debug!("[{}] Already enabled", self.name);
            return Ok(());
        }
        let settings = self.config.validate(&self.name).map_err(|e| {
            error!("[{}] {}. Disabling.", self.name, e);
            e
        })?;
        if self.cursor.is_none() {
            self.cursor = Some(PlaybackCursor::new(settings.urls.clone())?);
        }
        // A download cancelled by the last disable may still have reported.
        if self.mailbox.take().is_some() {
            debug!("[{}] Discarding failure from a previous activation", self.name);
        }
        self.epoch += 1;

        let presentation = PresentationAdapter::activate(&settings, &self.surface);
        presentation.show_controls(&mut self.surface, false);
        let poller = settings.error_output.as_ref().map(|_| ErrorPoller::new(self.mailbox.clone()));
        let polling = poller.is_some();
        let auto_start = settings.auto_start;
        info!("[{}] Enabled with {} URL(s), refresh every {:?}, replication {}",
            self.name, settings.urls.len(), settings.refresh,
            if settings.synchronise { "on" } else { "off" });

        self.active = Some(Activation {
            authority: AuthorityResolver::new(settings.synchronise),
            bridge: ReplicationBridge::new(settings.synchronise),
            slots: DownloadSlots::new(),
            presentation,
            poller,
            state: PlaybackState::Stopped,
            advance_scheduled: false,
            retry_scheduled: false,
            settings,
        });

        if polling {
            self.poll_errors();
        }
        if auto_start {
            if self.is_driver() {
                self.start();
            } else {
                debug!("[{}] Auto-start skipped; waiting for the driver's state", self.name);
            }
        }
        Ok(())
    }

    /// Deactivates the component: playback stops, both download slots are
    /// released, any buffered failure is dropped and the panel goes back to
    /// its original scale with the error output hidden. The cursor is kept
    /// for the next activation.
    pub fn disable(&mut self) {
        let Some(mut active) = self.active.take() else {
            return;
        };
        self.epoch += 1;
        active.slots.release_all();
        if self.mailbox.take().is_some() {
            debug!("[{}] Discarding buffered download failure", self.name);
        }
        active.presentation.reset(&mut self.surface);
        active.presentation.show_controls(&mut self.surface, false);
        info!("[{}] Disabled", self.name);
    }

    // --- Affordances ---

    pub fn start(&mut self) {
        let Some(active) = self.active.as_mut() else {
            warn!("[{}] Start ignored while disabled", self.name);
            return;
        };
        if active.state == PlaybackState::Running {
            debug!("[{}] Already running", self.name);
            return;
        }
        if !active.authority.take_ownership(&mut self.host) {
            warn!("[{}] Could not become the driver; not starting", self.name);
            return;
        }
        active.state = PlaybackState::Running;
        active.presentation.show_controls(&mut self.surface, true);
        info!("[{}] Slideshow started", self.name);
        self.publish();
        self.request_download();
    }

    pub fn stop(&mut self) {
        let Some(active) = self.active.as_mut() else {
            return;
        };
        if active.state != PlaybackState::Running {
            debug!("[{}] Already stopped", self.name);
            return;
        }
        if !active.authority.take_ownership(&mut self.host) {
            debug!("[{}] Stopping locally without ownership", self.name);
        }
        active.state = PlaybackState::Stopped;
        active.presentation.show_controls(&mut self.surface, false);
        info!("[{}] Slideshow stopped", self.name);
        self.publish();
    }

    // --- Host notifications ---

    pub fn on_scheduled(&mut self, task: ScheduledTask) {
        if task.epoch != self.epoch || self.active.is_none() {
            trace!("[{}] Dropping stale {:?}", self.name, task.kind);
            return;
        }
        match task.kind {
            TaskKind::AdvanceAndContinue => self.advance_and_continue(),
            TaskKind::DownloadCurrent => {
                if let Some(active) = self.active.as_mut() {
                    active.retry_scheduled = false;
                }
                self.request_download();
            }
            TaskKind::PollErrors => self.poll_errors(),
        }
    }

    /// A download finished. Failure details are already in the mailbox.
    pub fn on_download_event(&mut self, event: DownloadEvent) {
        let Some(active) = self.active.as_ref() else {
            debug!("[{}] Ignoring {:?} while disabled", self.name, event);
            return;
        };
        match event {
            DownloadEvent::Loaded(dimensions) => {
                debug!("[{}] Image loaded ({}x{})", self.name, dimensions.width, dimensions.height);
                active.presentation.apply_success(&mut self.surface, dimensions);
            }
            DownloadEvent::Failed => debug!("[{}] Download failed; moving on", self.name),
        }
        self.schedule_next();
    }

    pub fn on_ownership_transferred(&mut self, new_owner: PeerId) {
        let Some(active) = self.active.as_ref() else {
            return;
        };
        if !active.authority.is_driver(&self.host) {
            debug!("[{}] Peer {} now drives the slideshow", self.name, new_owner);
            return;
        }
        info!("[{}] This peer is now the driver", self.name);
        self.became_driver();
    }

    pub fn on_player_left(&mut self, peer: PeerId) {
        let Some(active) = self.active.as_ref() else {
            return;
        };
        if active.authority.on_peer_left(&mut self.host, peer) {
            self.became_driver();
        }
    }

    /// Remote state arrived.
    pub fn on_deserialization(&mut self, state: SyncedState) {
        let Some(active) = self.active.as_mut() else {
            return;
        };
        if !active.authority.replicates() {
            return;
        }
        if active.authority.is_driver(&self.host) {
            debug!("[{}] Ignoring inbound state; this peer drives", self.name);
            return;
        }
        let remote = if state.playing { PlaybackState::Running } else { PlaybackState::Stopped };
        if active.state != remote {
            info!("[{}] Driver {} the slideshow", self.name, if state.playing { "started" } else { "stopped" });
            active.state = remote;
            active.presentation.show_controls(&mut self.surface, state.playing);
        }
        let Some(cursor) = self.cursor.as_mut() else {
            return;
        };
        if active.bridge.on_inbound_index(state, cursor) {
            self.request_download();
        }
    }

    /// The host finished broadcasting the synced field.
    pub fn on_post_serialization(&mut self) {
        if let Some(active) = self.active.as_mut() {
            active.bridge.on_publish_acknowledged();
        }
    }

    // --- Internals ---

    fn task(&self, kind: TaskKind) -> ScheduledTask {
        ScheduledTask::new(kind, self.epoch)
    }

    fn publish(&mut self) {
        let (Some(active), Some(cursor)) = (self.active.as_mut(), self.cursor.as_ref()) else {
            return;
        };
        let playing = active.state == PlaybackState::Running;
        active.bridge.publish(&active.authority, &mut self.host, cursor, playing);
    }

    /// Downloads the current slide, or defers if the last download is pending.
    fn request_download(&mut self) {
        let task = self.task(TaskKind::DownloadCurrent);
        let (Some(active), Some(cursor)) = (self.active.as_mut(), self.cursor.as_ref()) else {
            return;
        };
        if active.slots.is_pending() {
            debug!("[{}] Previous download still pending; retrying in {:?}", self.name, RETRY_DELAY);
            if !active.retry_scheduled {
                active.retry_scheduled = true;
                self.host.schedule(task, RETRY_DELAY, EventTiming::Update);
            }
            return;
        }
        let url = cursor.current();
        info!("[{}] Loading slide {}/{}: {}", self.name, cursor.resolved_index() + 1, cursor.url_count(), url);
        active.slots.start(
            &mut self.downloader,
            url,
            &active.settings.material,
            self.completions.clone(),
            active.settings.wrap_mode,
        );
    }

    fn advance_and_continue(&mut self) {
        let task = self.task(TaskKind::AdvanceAndContinue);
        let Some(active) = self.active.as_mut() else {
            return;
        };
        active.advance_scheduled = false;
        if active.state != PlaybackState::Running {
            trace!("[{}] Not running; not advancing", self.name);
            return;
        }
        if !active.authority.is_driver(&self.host) {
            debug!("[{}] No longer the driver; not advancing", self.name);
            return;
        }
        if active.slots.is_pending() {
            debug!("[{}] Previous download still pending; advancing in {:?}", self.name, RETRY_DELAY);
            active.advance_scheduled = true;
            self.host.schedule(task, RETRY_DELAY, EventTiming::Update);
            return;
        }
        if let Some(cursor) = self.cursor.as_mut() {
            cursor.advance();
        }
        self.publish();
        self.request_download();
    }

    /// Arms the next advance after a completion, if this peer drives a
    /// running slideshow and no advance is outstanding yet.
    fn schedule_next(&mut self) {
        let task = self.task(TaskKind::AdvanceAndContinue);
        let Some(active) = self.active.as_mut() else {
            return;
        };
        if active.state != PlaybackState::Running
            || active.advance_scheduled
            || !active.authority.is_driver(&self.host)
        {
            return;
        }
        active.advance_scheduled = true;
        self.host.schedule(task, active.settings.refresh, EventTiming::Update);
    }

    /// Resumes a running slideshow on a peer that just became the driver,
    /// without moving the cursor.
    fn became_driver(&mut self) {
        let Some(active) = self.active.as_ref() else {
            return;
        };
        if active.state != PlaybackState::Running {
            debug!("[{}] Driver of a stopped slideshow; nothing to resume", self.name);
            return;
        }
        if active.advance_scheduled {
            debug!("[{}] Already driving", self.name);
            return;
        }
        if active.slots.is_pending() {
            debug!("[{}] Download in flight; its completion resumes playback", self.name);
            return;
        }
        info!("[{}] Resuming playback as the new driver", self.name);
        self.request_download();
    }

    fn poll_errors(&mut self) {
        let task = self.task(TaskKind::PollErrors);
        let Some(active) = self.active.as_ref() else {
            return;
        };
        let Some(poller) = active.poller.as_ref() else {
            return;
        };
        if let Some(failure) = poller.drain() {
            active.presentation.apply_error(&mut self.surface, &failure);
        }
        self.host.schedule(task, poller.interval(), EventTiming::Immediate);
    }
}
