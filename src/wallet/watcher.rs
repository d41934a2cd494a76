//! Provider event watcher
//!
//! Providers reached over plain JSON-RPC cannot push events, so the watcher
//! polls the active chain and authorized accounts and emits
//! `chainChanged` / `accountsChanged` whenever either differs from the last
//! observation.

use std::sync::Arc;
use std::time::Duration;

use ethers_core::types::Address;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use super::{WalletEvent, WalletProvider};

/// Owns the polling task; dropping it stops polling
pub struct WatcherHandle {
    task: JoinHandle<()>,
}

impl WatcherHandle {
    /// Stop polling
    pub fn abort(&self) {
        self.task.abort();
    }
}

impl Drop for WatcherHandle {
    fn drop(&mut self) {
        self.task.abort();
    }
}

/// Spawn a polling task. The first observation is taken as the baseline
/// and produces no events. Events arrive on the returned receiver in the
/// order they were observed.
pub fn spawn_watcher(
    provider: Arc<dyn WalletProvider>,
    interval: Duration,
) -> (WatcherHandle, mpsc::Receiver<WalletEvent>) {
    let (tx, rx) = mpsc::channel::<WalletEvent>(32);

    let task = tokio::spawn(async move {
        let mut last_chain: Option<u64> = provider.get_network().await.ok();
        let mut last_accounts: Option<Vec<Address>> = provider.accounts().await.ok();
        info!("Watching wallet events every {:?}", interval);

        let mut ticker = tokio::time::interval(interval);
        ticker.tick().await;

        loop {
            ticker.tick().await;

            match provider.get_network().await {
                Ok(chain_id) if last_chain != Some(chain_id) => {
                    debug!("Chain changed: {:?} -> {}", last_chain, chain_id);
                    last_chain = Some(chain_id);
                    let event = WalletEvent::ChainChanged(format!("0x{:x}", chain_id));
                    if tx.send(event).await.is_err() {
                        return;
                    }
                }
                Ok(_) => {}
                Err(e) => warn!("Failed to poll network: {}", e),
            }

            match provider.accounts().await {
                Ok(accounts) if last_accounts.as_ref() != Some(&accounts) => {
                    debug!("Accounts changed: {} authorized", accounts.len());
                    last_accounts = Some(accounts.clone());
                    if tx.send(WalletEvent::AccountsChanged(accounts)).await.is_err() {
                        return;
                    }
                }
                Ok(_) => {}
                Err(e) => warn!("Failed to poll accounts: {}", e),
            }
        }
    });

    (WatcherHandle { task }, rx)
}
