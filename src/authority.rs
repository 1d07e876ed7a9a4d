//! Decides which peer drives playback.

use log::{debug, info};

use crate::host::Host;
use crate::model::PeerId;

/// Derives driver status from the host's ownership state.
///
/// Nothing is cached: ownership can change between any two actions, so every
/// caller asks again right before doing something visible.
#[derive(Clone, Copy, Debug)]
pub struct AuthorityResolver {
    synchronise: bool,
}

impl AuthorityResolver {
    pub fn new(synchronise: bool) -> Self {
        Self { synchronise }
    }

    pub fn replicates(&self) -> bool {
        self.synchronise
    }

    /// True if the local peer owns the object, or if nothing is replicated and
    /// every peer plays on its own.
    pub fn is_driver<H: Host + ?Sized>(&self, host: &H) -> bool {
        !self.synchronise || host.owner() == host.local_peer()
    }

    /// Requests ownership unless already the driver. Returns the resulting
    /// driver status.
    pub fn take_ownership<H: Host + ?Sized>(&self, host: &mut H) -> bool {
        if self.is_driver(host) {
            return true;
        }
        let local = host.local_peer();
        debug!("Peer {} requesting ownership from {}", local, host.owner());
        host.request_ownership(local);
        self.is_driver(host)
    }

    /// Reacts to `departed` leaving the session.
    ///
    /// Returns true when the local peer must run its "became driver" logic:
    /// either it already owns the object, or it is the session authority and
    /// just claimed the object the departed peer owned.
    pub fn on_peer_left<H: Host + ?Sized>(&self, host: &mut H, departed: PeerId) -> bool {
        if !self.synchronise {
            return false;
        }
        let local = host.local_peer();
        let owner = host.owner();
        if owner == local {
            return true;
        }
        if owner == departed && host.is_session_authority() {
            info!("Owner {} left; peer {} claims the slideshow as session authority", departed, local);
            host.request_ownership(local);
            return self.is_driver(host);
        }
        debug!("Peer {} left; owner is still {}", departed, owner);
        false
    }
}
