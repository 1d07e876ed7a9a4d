use log::{debug, error, info, warn};
use reqwest::Client as ReqwestClient;
use tokio::sync::watch;
use tokio::task::JoinSet;

use synced_slideshow::config;
use synced_slideshow::errors::AppError;
use synced_slideshow::session::{run_peer, LocalSession};

// --- Constants ---
const DEFAULT_CONFIG_PATH: &str = "/etc/synced_slideshow.conf";

#[tokio::main]
async fn main() -> Result<(), AppError> {
    env_logger::init();
    info!("Starting synced_slideshow...");

    let path = std::env::args().nth(1).unwrap_or_else(|| DEFAULT_CONFIG_PATH.to_string());
    let app_config = config::load_config(&path).map_err(|e| {
        error!("Failed to load configuration from {}: {}", path, e);
        e
    })?;
    info!(
        "Configuration loaded: {} URL(s), {} peer(s)",
        app_config.slideshow.urls.len(),
        app_config.session.peers
    );

    let session = LocalSession::new();
    let http_client = ReqwestClient::new();
    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    // Everyone joins before anyone starts, so the first publish reaches all peers.
    let joined: Vec<_> = (0..app_config.session.peers.max(1)).map(|_| session.join()).collect();
    let mut peers = JoinSet::new();
    for (n, (peer, bus)) in joined.into_iter().enumerate() {
        let leave_after = if n == 0 { app_config.session.owner_leaves_after } else { None };
        debug!("Spawning peer {}", peer);
        peers.spawn(run_peer(
            session.clone(),
            peer,
            bus,
            app_config.slideshow.clone(),
            http_client.clone(),
            shutdown_rx.clone(),
            leave_after,
        ));
    }

    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);
    let mut interrupted = false;
    let mut result = Ok(());
    loop {
        tokio::select! {
            joined = peers.join_next() => match joined {
                None => break,
                Some(Ok(Ok(peer))) => info!("Peer {} finished", peer),
                Some(Ok(Err(e))) => result = Err(AppError::Activation(e)),
                Some(Err(e)) => {
                    error!("Peer task failed: {}", e);
                    result = Err(AppError::Generic(format!("peer task failed: {}", e)));
                }
            },
            signal = &mut ctrl_c, if !interrupted => {
                interrupted = true;
                if let Err(e) = signal {
                    error!("Unable to listen for Ctrl-C: {}", e);
                }
                info!("Shutting down...");
                if shutdown_tx.send(true).is_err() {
                    warn!("No peer left to stop");
                }
            }
        }
    }
    result
}
