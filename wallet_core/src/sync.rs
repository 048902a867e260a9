//! Keeps the ledger store in step with the node.
//!
//! Two independent producers trigger the same reconciliation: confirmations
//! pushed over the subscription and a periodic poll of every account. Neither
//! carries state itself; both just cause an authoritative re-fetch, so
//! duplicates and reordering between them are harmless.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, watch};
use tokio::task::JoinSet;

use troll_node_client::{NodeRpc, PushEvent};
use troll_types::AccountAddress;
use troll_work::WorkCache;

use crate::store::{LedgerStore, PendingTransaction, ReconcileOutcome};
use crate::WalletError;

/// Pending blocks fetched per account and refresh.
pub const PENDING_BATCH: u32 = 64;

/// Fetch `address` from the node and reconcile the store with it. Moves the
/// work cache along if the account's work root changed.
pub async fn refresh_account<N: NodeRpc>(
    node: &N,
    store: &LedgerStore,
    cache: &WorkCache,
    address: &AccountAddress,
) -> Result<ReconcileOutcome, WalletError> {
    let revision = store.revision(address)?;
    let before = store.get(address)?.work_root();

    let info = node.account_info(address).await?;
    let receivable: Vec<PendingTransaction> = node
        .pending(address, PENDING_BATCH)
        .await?
        .iter()
        .map(|p| PendingTransaction::from_node(address, p))
        .collect();

    let outcome = store.reconcile(address, revision, info.as_ref(), receivable)?;
    let after = store.get(address)?.work_root();
    if after != before {
        cache.frontier_changed(Some(before), after);
    } else {
        cache.ensure(after);
    }
    tracing::debug!(account = %address, ?outcome, "account refreshed");
    Ok(outcome)
}

/// Drives reconciliation from push events and a periodic poll.
pub struct Synchronizer<N> {
    node: Arc<N>,
    store: Arc<LedgerStore>,
    cache: WorkCache,
}

impl<N> Clone for Synchronizer<N> {
    fn clone(&self) -> Self {
        Self {
            node: self.node.clone(),
            store: self.store.clone(),
            cache: self.cache.clone(),
        }
    }
}

impl<N: NodeRpc> Synchronizer<N> {
    pub fn new(node: Arc<N>, store: Arc<LedgerStore>, cache: WorkCache) -> Self {
        Self { node, store, cache }
    }

    pub async fn refresh(&self, address: &AccountAddress) -> Result<ReconcileOutcome, WalletError> {
        refresh_account(&*self.node, &self.store, &self.cache, address).await
    }

    /// Refresh every account concurrently. Failures are logged and reported
    /// per account.
    pub async fn refresh_all(&self) -> Vec<(AccountAddress, Result<ReconcileOutcome, WalletError>)> {
        let mut tasks = JoinSet::new();
        for address in self.store.addresses() {
            let this = self.clone();
            tasks.spawn(async move {
                let result = this.refresh(&address).await;
                (address, result)
            });
        }

        let mut results = Vec::new();
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok((address, result)) => {
                    if let Err(e) = &result {
                        tracing::warn!(account = %address, error = %e, "refresh failed");
                    }
                    results.push((address, result));
                }
                Err(e) => tracing::error!(error = %e, "refresh task panicked"),
            }
        }
        results
    }

    /// Handle push events until the channel closes or `shutdown` turns true.
    /// Each event is handled on its own task so a slow re-fetch never holds
    /// up the next event.
    pub async fn run_events(self, mut events: mpsc::Receiver<PushEvent>, mut shutdown: watch::Receiver<bool>) {
        loop {
            let event = tokio::select! {
                event = events.recv() => match event {
                    Some(event) => event,
                    None => break,
                },
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                    continue;
                }
            };

            for address in event.affected_accounts() {
                if !self.store.contains(&address) {
                    continue;
                }
                let this = self.clone();
                tokio::spawn(async move {
                    if let Err(e) = this.refresh(&address).await {
                        tracing::warn!(account = %address, error = %e, "refresh after push event failed");
                    }
                });
            }
        }
        tracing::info!("push event handler stopped");
    }

    /// Refresh every account each `interval` until `shutdown` turns true.
    pub async fn run_poller(self, interval: Duration, mut shutdown: watch::Receiver<bool>) {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    self.refresh_all().await;
                }
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
            }
        }
        tracing::info!("poller stopped");
    }
}
