//! In-process networking substrate.
//!
//! `LocalSession` stands in for the multiplayer host: it tracks the peer
//! roster, the owner of the shared slideshow object and the session
//! authority, and carries serialized state between peers over a broadcast bus.
//! Each peer runs its own `Slideshow` inside `run_peer`, which turns bus
//! messages, fired deferrals and download completions into calls on the
//! controller from a single task.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use log::{debug, error, info, trace, warn};
use reqwest::Client as ReqwestClient;
use tokio::sync::broadcast::error::RecvError;
use tokio::sync::{broadcast, mpsc, watch};

use crate::config::SlideshowConfig;
use crate::download_slots::ImageDownloader;
use crate::errors::ActivationError;
use crate::host::{EventTiming, Host, ScheduledTask};
use crate::log_surface::LogSurface;
use crate::media_pipeline::{HttpImageDownloader, TextureStore};
use crate::model::{PanelScale, PeerId, SyncedState};
use crate::presentation::Surface;
use crate::slideshow::Slideshow;

/// Period of the host's update loop.
pub const UPDATE_INTERVAL: Duration = Duration::from_millis(16);

const SESSION_BUFFER: usize = 64;

/// Messages on the session bus, seen by every peer.
#[derive(Clone, Debug)]
pub enum SessionEvent {
    /// JSON-encoded `SyncedState` published by the owner.
    StateSynced { from: PeerId, payload: String },
    OwnershipTransferred(PeerId),
    PeerLeft(PeerId),
}

#[derive(Debug, Default)]
struct Roster {
    owner: Option<PeerId>,
    /// Join order; the first entry is the session authority.
    peers: Vec<PeerId>,
    next_id: u32,
}

#[derive(Clone, Debug)]
pub struct LocalSession {
    roster: Arc<Mutex<Roster>>,
    events: broadcast::Sender<SessionEvent>,
}

impl Default for LocalSession {
    fn default() -> Self {
        Self::new()
    }
}

impl LocalSession {
    pub fn new() -> Self {
        let (events, _) = broadcast::channel(SESSION_BUFFER);
        Self { roster: Arc::new(Mutex::new(Roster::default())), events }
    }

    fn roster(&self) -> MutexGuard<'_, Roster> {
        self.roster.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn send(&self, event: SessionEvent) {
        if self.events.send(event).is_err() {
            trace!("No peer is listening on the session bus");
        }
    }

    /// Adds a peer. The first peer to join owns the slideshow object.
    pub fn join(&self) -> (PeerId, broadcast::Receiver<SessionEvent>) {
        let receiver = self.events.subscribe();
        let mut roster = self.roster();
        roster.next_id += 1;
        let peer = PeerId(roster.next_id);
        roster.peers.push(peer);
        if roster.owner.is_none() {
            roster.owner = Some(peer);
        }
        info!("Peer {} joined ({} in session)", peer, roster.peers.len());
        (peer, receiver)
    }

    /// Removes a peer. Ownership stays where it is; authority passes to the
    /// next peer in join order.
    pub fn leave(&self, peer: PeerId) {
        let remaining = {
            let mut roster = self.roster();
            roster.peers.retain(|p| *p != peer);
            roster.peers.len()
        };
        info!("Peer {} left ({} remaining)", peer, remaining);
        self.send(SessionEvent::PeerLeft(peer));
    }

    pub fn owner(&self) -> Option<PeerId> {
        self.roster().owner
    }

    pub fn set_owner(&self, peer: PeerId) {
        let previous = self.roster().owner.replace(peer);
        if previous != Some(peer) {
            debug!("Ownership moves to {}", peer);
            self.send(SessionEvent::OwnershipTransferred(peer));
        }
    }

    pub fn authority(&self) -> Option<PeerId> {
        self.roster().peers.first().copied()
    }

    pub fn peers(&self) -> Vec<PeerId> {
        self.roster().peers.clone()
    }

    pub fn broadcast_state(&self, from: PeerId, state: SyncedState) -> Result<(), serde_json::Error> {
        let payload = serde_json::to_string(&state)?;
        self.send(SessionEvent::StateSynced { from, payload });
        Ok(())
    }
}

/// Work a peer's host hands back to its own event loop.
#[derive(Debug, PartialEq, Eq)]
pub enum PeerEvent {
    Scheduled(ScheduledTask),
    PostSerialization,
}

/// Rounds `delay` up to the next update boundary.
pub fn align_to_update(delay: Duration) -> Duration {
    let step = UPDATE_INTERVAL.as_nanos();
    let aligned = delay.as_nanos().div_ceil(step) * step;
    Duration::from_nanos(u64::try_from(aligned).unwrap_or(u64::MAX))
}

/// `Host` implementation for one peer of a `LocalSession`.
#[derive(Debug)]
pub struct PeerHost {
    session: LocalSession,
    local: PeerId,
    loopback: mpsc::UnboundedSender<PeerEvent>,
}

impl PeerHost {
    pub fn new(session: LocalSession, local: PeerId, loopback: mpsc::UnboundedSender<PeerEvent>) -> Self {
        Self { session, local, loopback }
    }
}

impl Host for PeerHost {
    fn local_peer(&self) -> PeerId {
        self.local
    }

    fn owner(&self) -> PeerId {
        self.session.owner().unwrap_or(self.local)
    }

    fn request_ownership(&mut self, peer: PeerId) {
        self.session.set_owner(peer);
    }

    fn is_session_authority(&self) -> bool {
        self.session.authority() == Some(self.local)
    }

    fn request_serialization(&mut self, state: SyncedState) {
        if let Err(e) = self.session.broadcast_state(self.local, state) {
            error!("Failed to encode state {:?}: {}", state, e);
        }
        if self.loopback.send(PeerEvent::PostSerialization).is_err() {
            trace!("Peer {} loop is gone", self.local);
        }
    }

    fn schedule(&mut self, task: ScheduledTask, delay: Duration, timing: EventTiming) {
        let delay = match timing {
            EventTiming::Immediate => delay,
            EventTiming::Update => align_to_update(delay),
        };
        let loopback = self.loopback.clone();
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            let _ = loopback.send(PeerEvent::Scheduled(task));
        });
    }
}

/// Routes one bus message to the slideshow of peer `local`.
pub fn handle_session_event<H, D, S>(show: &mut Slideshow<H, D, S>, local: PeerId, event: SessionEvent)
where
    H: Host,
    D: ImageDownloader,
    S: Surface,
{
    match event {
        SessionEvent::StateSynced { from, .. } if from == local => {}
        SessionEvent::StateSynced { from, payload } => match serde_json::from_str::<SyncedState>(&payload) {
            Ok(state) => {
                trace!("[{}] State from {}: {:?}", show.name(), from, state);
                show.on_deserialization(state);
            }
            Err(e) => warn!("[{}] Dropping undecodable state from {}: {}", show.name(), from, e),
        },
        SessionEvent::OwnershipTransferred(owner) => show.on_ownership_transferred(owner),
        SessionEvent::PeerLeft(peer) if peer == local => {}
        SessionEvent::PeerLeft(peer) => show.on_player_left(peer),
    }
}

/// Runs one peer's slideshow until shutdown, its departure timer, or the
/// session bus closing. The peer leaves the session on the way out.
///
/// # Errors
/// Returns the activation error if the slideshow could not be enabled.
pub async fn run_peer(
    session: LocalSession,
    peer: PeerId,
    mut net: broadcast::Receiver<SessionEvent>,
    config: SlideshowConfig,
    client: ReqwestClient,
    mut shutdown: watch::Receiver<bool>,
    leave_after: Option<Duration>,
) -> Result<PeerId, ActivationError> {
    let name = format!("peer {}", peer);
    let (loopback_tx, mut loopback) = mpsc::unbounded_channel();
    let (download_tx, mut downloads) = mpsc::unbounded_channel();
    let textures = TextureStore::default();
    let host = PeerHost::new(session.clone(), peer, loopback_tx);
    let downloader = HttpImageDownloader::new(client, textures.clone());
    let surface = LogSurface::new(name.clone(), PanelScale::ONE, textures);
    let mut show = Slideshow::new(name, config, host, downloader, surface, download_tx);

    if let Err(e) = show.enable() {
        session.leave(peer);
        return Err(e);
    }

    let leave_timer = async {
        match leave_after {
            Some(delay) => tokio::time::sleep(delay).await,
            None => std::future::pending().await,
        }
    };
    tokio::pin!(leave_timer);

    loop {
        tokio::select! {
            Some(event) = loopback.recv() => match event {
                PeerEvent::Scheduled(task) => show.on_scheduled(task),
                PeerEvent::PostSerialization => show.on_post_serialization(),
            },
            Some(event) = downloads.recv() => show.on_download_event(event),
            received = net.recv() => match received {
                Ok(event) => handle_session_event(&mut show, peer, event),
                Err(RecvError::Lagged(missed)) => warn!("[{}] Missed {} session message(s)", show.name(), missed),
                Err(RecvError::Closed) => break,
            },
            () = &mut leave_timer => {
                info!("[{}] Leaving the session", show.name());
                break;
            }
            changed = shutdown.changed() => {
                let stop = changed.is_err() || *shutdown.borrow();
                if stop {
                    break;
                }
            }
        }
    }

    show.disable();
    session.leave(peer);
    Ok(peer)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::host::TaskKind;
    use crate::model::{MaterialId, NO_PENDING_INDEX};
    use crate::test_support::{urls, FakeDownloader, FakeHost, FakeSurface};

    #[test]
    fn first_joiner_owns_and_authority_passes_on_leave() {
        let session = LocalSession::new();
        let (a, _a_rx) = session.join();
        let (b, mut b_rx) = session.join();
        assert_eq!(session.owner(), Some(a));
        assert_eq!(session.authority(), Some(a));

        session.leave(a);
        assert_eq!(session.owner(), Some(a));
        assert_eq!(session.authority(), Some(b));
        assert_eq!(session.peers(), vec![b]);
        assert!(matches!(b_rx.try_recv(), Ok(SessionEvent::PeerLeft(p)) if p == a));
    }

    #[test]
    fn ownership_changes_are_broadcast_once() {
        let session = LocalSession::new();
        let (a, mut rx) = session.join();
        let (b, _) = session.join();
        session.set_owner(a);
        assert!(rx.try_recv().is_err());
        session.set_owner(b);
        assert!(matches!(rx.try_recv(), Ok(SessionEvent::OwnershipTransferred(p)) if p == b));
    }

    #[test]
    fn state_travels_as_json() {
        let session = LocalSession::new();
        let (a, mut rx) = session.join();
        session.broadcast_state(a, SyncedState { index: 2, playing: true }).unwrap();
        match rx.try_recv() {
            Ok(SessionEvent::StateSynced { from, payload }) => {
                assert_eq!(from, a);
                assert_eq!(payload, r#"{"index":2,"playing":true}"#);
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn update_timing_rounds_up_to_frames() {
        assert_eq!(align_to_update(Duration::ZERO), Duration::ZERO);
        assert_eq!(align_to_update(Duration::from_millis(1)), Duration::from_millis(16));
        assert_eq!(align_to_update(Duration::from_millis(16)), Duration::from_millis(16));
        assert_eq!(align_to_update(Duration::from_secs(1)), Duration::from_millis(1008));
    }

    #[tokio::test]
    async fn peer_host_loops_back_deferrals_and_acknowledgements() {
        let session = LocalSession::new();
        let (peer, mut net) = session.join();
        let (tx, mut loopback) = mpsc::unbounded_channel();
        let mut host = PeerHost::new(session.clone(), peer, tx);
        assert_eq!(host.owner(), peer);
        assert!(host.is_session_authority());

        let task = ScheduledTask::new(TaskKind::PollErrors, 1);
        host.schedule(task, Duration::from_millis(1), EventTiming::Immediate);
        assert_eq!(loopback.recv().await, Some(PeerEvent::Scheduled(task)));

        host.request_serialization(SyncedState { index: 0, playing: true });
        assert_eq!(loopback.recv().await, Some(PeerEvent::PostSerialization));
        assert!(matches!(net.recv().await, Ok(SessionEvent::StateSynced { from, .. }) if from == peer));
    }

    #[test]
    fn bus_messages_reach_the_slideshow() {
        let config = SlideshowConfig {
            urls: urls(3),
            material: Some(MaterialId("screen".into())),
            rescale_panel: false,
            ..SlideshowConfig::default()
        };
        let (tx, _events) = mpsc::unbounded_channel();
        let mut show = Slideshow::new(
            "test",
            config,
            FakeHost::new(2, 1),
            FakeDownloader::default(),
            FakeSurface::with_scale(1.0, 1.0),
            tx,
        );
        show.enable().unwrap();

        let own = SessionEvent::StateSynced { from: PeerId(2), payload: r#"{"index":1,"playing":true}"#.into() };
        handle_session_event(&mut show, PeerId(2), own);
        assert!(show.downloader().issued().is_empty());

        let garbage = SessionEvent::StateSynced { from: PeerId(1), payload: "not json".into() };
        handle_session_event(&mut show, PeerId(2), garbage);
        assert!(show.downloader().issued().is_empty());

        let remote = SessionEvent::StateSynced { from: PeerId(1), payload: r#"{"index":1,"playing":true}"#.into() };
        handle_session_event(&mut show, PeerId(2), remote);
        assert_eq!(show.downloader().issued(), vec![urls(3)[1].to_string()]);
        assert_eq!(show.serialized_state().index, NO_PENDING_INDEX);
    }

    #[tokio::test]
    async fn peer_without_urls_fails_and_leaves() {
        let session = LocalSession::new();
        let (peer, net) = session.join();
        let (_shutdown_tx, shutdown) = watch::channel(false);
        let result = run_peer(
            session.clone(),
            peer,
            net,
            SlideshowConfig::default(),
            ReqwestClient::new(),
            shutdown,
            None,
        )
        .await;
        assert_eq!(result, Err(ActivationError::NoUrls));
        assert!(session.peers().is_empty());
    }

    #[tokio::test]
    async fn peer_stops_on_shutdown() {
        let session = LocalSession::new();
        let (peer, net) = session.join();
        let (shutdown_tx, shutdown) = watch::channel(false);
        let config = SlideshowConfig {
            urls: urls(2),
            material: Some(MaterialId("screen".into())),
            rescale_panel: false,
            ..SlideshowConfig::default()
        };
        let running = tokio::spawn(run_peer(session.clone(), peer, net, config, ReqwestClient::new(), shutdown, None));
        shutdown_tx.send(true).unwrap();
        assert_eq!(running.await.unwrap(), Ok(peer));
        assert!(session.peers().is_empty());
    }
}
