//! The host networking substrate, as seen by a slideshow component.

use std::time::Duration;

use crate::model::{PeerId, SyncedState};

/// Deferred work a slideshow asks its host to hand back later.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TaskKind {
    /// Move to the next slide and download it.
    AdvanceAndContinue,
    /// Retry downloading the current slide once the pending download is done.
    DownloadCurrent,
    /// Drain the last-error mailbox.
    PollErrors,
}

/// A deferral tagged with the activation it was issued from.
///
/// Hosts cannot cancel deferrals, so a task whose epoch no longer matches the
/// component's is dropped when it fires.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ScheduledTask {
    pub kind: TaskKind,
    pub epoch: u64,
}

impl ScheduledTask {
    pub fn new(kind: TaskKind, epoch: u64) -> Self {
        Self { kind, epoch }
    }
}

/// When a deferral fires relative to the host's update loop.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum EventTiming {
    /// As soon as the delay elapses.
    Immediate,
    /// On the first update boundary after the delay.
    Update,
}

/// Everything the slideshow needs from the networking host.
///
/// Implementations deliver the results back by calling the matching
/// `Slideshow::on_*` methods from the interactive context: `on_scheduled` for
/// deferrals, `on_post_serialization` after a broadcast attempt,
/// `on_deserialization` for remote state, and the ownership/peer notifications.
pub trait Host {
    fn local_peer(&self) -> PeerId;

    /// Current owner of the shared slideshow object.
    fn owner(&self) -> PeerId;

    /// Asks for `peer` to become the owner. May take effect immediately.
    fn request_ownership(&mut self, peer: PeerId);

    /// Whether the local peer is the session's designated authority.
    fn is_session_authority(&self) -> bool;

    /// Serializes `state` and broadcasts it to the other peers.
    fn request_serialization(&mut self, state: SyncedState);

    fn schedule(&mut self, task: ScheduledTask, delay: Duration, timing: EventTiming);
}
