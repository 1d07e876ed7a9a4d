//! Mirrors the driver's cursor to the other peers.
//!
//! Replication is fire-and-forget. The receiving side is idempotent: applying
//! the same or a stale index again only re-downloads an image, so dropped,
//! duplicated or reordered messages are tolerated rather than detected.

use log::{debug, trace, warn};

use crate::authority::AuthorityResolver;
use crate::cursor::PlaybackCursor;
use crate::host::Host;
use crate::model::{SyncedState, NO_PENDING_INDEX};

#[derive(Debug)]
pub struct ReplicationBridge {
    enabled: bool,
    outbound: SyncedState,
}

impl ReplicationBridge {
    pub fn new(enabled: bool) -> Self {
        Self { enabled, outbound: SyncedState::idle() }
    }

    /// The synced field as the host would serialize it right now.
    pub fn outbound(&self) -> SyncedState {
        self.outbound
    }

    /// Writes the cursor into the synced field and asks the host to broadcast
    /// it. Does nothing unless replication is on and the local peer drives.
    pub fn publish<H: Host + ?Sized>(
        &mut self,
        authority: &AuthorityResolver,
        host: &mut H,
        cursor: &PlaybackCursor,
        playing: bool,
    ) -> bool {
        if !self.enabled {
            return false;
        }
        if !authority.is_driver(host) {
            trace!("Not the driver; not publishing");
            return false;
        }
        let Ok(index) = i32::try_from(cursor.resolved_index()) else {
            warn!("Cursor index {} cannot be replicated", cursor.resolved_index());
            return false;
        };
        self.outbound = SyncedState { index, playing };
        debug!("Publishing slide {} (playing: {})", index, playing);
        host.request_serialization(self.outbound);
        true
    }

    /// Called once the host finished a broadcast attempt, successful or not.
    pub fn on_publish_acknowledged(&mut self) {
        self.outbound.index = NO_PENDING_INDEX;
    }

    /// Applies a remote index to the cursor. Returns true when the current
    /// slide must be (re)downloaded.
    pub fn on_inbound_index(&self, state: SyncedState, cursor: &mut PlaybackCursor) -> bool {
        if !self.enabled {
            return false;
        }
        match state.pending_index() {
            Some(index) => {
                cursor.jump_to(index);
                true
            }
            None => {
                trace!("Inbound state carries no index");
                false
            }
        }
    }
}
