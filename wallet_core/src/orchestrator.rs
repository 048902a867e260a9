//! Transaction orchestration: send, receive and change-representative.
//!
//! Every transaction walks the same states:
//!
//! ```text
//! Idle -> Validating -> Building -> AwaitingWork -> Signing -> Broadcasting -> Reconciling -> Idle
//! ```
//!
//! and drops into `Failed` from any of them. Only one transaction per account
//! runs at a time; a second one is refused rather than queued. A node
//! rejection for a stale previous hash rebuilds against the fresh frontier
//! once; a second stale rejection is final.

use std::future::pending;
use std::sync::{Arc, Mutex};

use serde::{Deserialize, Serialize};
use tokio::sync::{broadcast, watch};

use troll_crypto::{decode_address, parse_address};
use troll_ledger::{Block, BlockBuilder, ChainHead};
use troll_node_client::NodeRpc;
use troll_signer::{BlockSigner, DerivedAccount};
use troll_types::{AccountAddress, BlockHash, PublicKey, RawAmount, DUST_THRESHOLD};
use troll_work::{validate_work, WorkBlockKind, WorkCache, WorkNonce, WorkOrigin, WorkThresholds};

use crate::representatives::{RecommendedRepresentative, RepresentativeBook};
use crate::store::{AccountView, LedgerStore, PendingTransaction, TransactionGuard};
use crate::sync::refresh_account;
use crate::WalletError;

const TRANSITION_CAPACITY: usize = 256;

/// Where a transaction currently is.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TxState {
    Idle,
    Validating,
    Building,
    AwaitingWork,
    Signing,
    Broadcasting,
    Reconciling,
    Failed,
}

/// One state change of one account's transaction.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TxTransition {
    pub account: AccountAddress,
    pub state: TxState,
}

/// Lets the user abandon a transaction, e.g. while the signing device waits
/// for confirmation.
pub struct AbortHandle(watch::Sender<bool>);

impl AbortHandle {
    pub fn abort(&self) {
        self.0.send_replace(true);
    }
}

#[derive(Clone, Debug, Default)]
pub struct AbortSignal(Option<watch::Receiver<bool>>);

impl AbortSignal {
    pub fn pair() -> (AbortHandle, AbortSignal) {
        let (tx, rx) = watch::channel(false);
        (AbortHandle(tx), AbortSignal(Some(rx)))
    }

    /// A signal that never fires.
    pub fn never() -> Self {
        Self(None)
    }

    pub fn is_aborted(&self) -> bool {
        self.0.as_ref().is_some_and(|rx| *rx.borrow())
    }

    /// Resolves once the transaction is aborted; never if the handle is
    /// dropped without aborting.
    async fn aborted(&self) {
        if let Some(rx) = &self.0 {
            let mut rx = rx.clone();
            if rx.wait_for(|aborted| *aborted).await.is_ok() {
                return;
            }
        }
        pending::<()>().await
    }
}

/// Whether an address can receive funds.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DestinationStatus {
    Invalid,
    /// Valid, but no block has been published for it yet.
    Unopened,
    Open,
}

/// A send that passed validation and whose work is being precomputed.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PreparedSend {
    pub from: AccountAddress,
    pub to: AccountAddress,
    pub amount: RawAmount,
    pub balance_after: RawAmount,
    pub destination: DestinationStatus,
}

/// Result of a batch representative change.
#[derive(Debug, Default)]
pub struct RepresentativeChange {
    pub changed: Vec<(AccountAddress, BlockHash)>,
    /// Accounts already delegating to the new representative.
    pub skipped: Vec<AccountAddress>,
    pub failed: Vec<(AccountAddress, WalletError)>,
    /// The selected recommended representative was added to the book.
    pub saved_recommended: bool,
}

/// Settings the orchestrator takes from the wallet configuration.
#[derive(Clone, Debug)]
pub struct OrchestratorSettings {
    pub thresholds: WorkThresholds,
    /// Ask the node for work when none is cached.
    pub remote_work_fallback: bool,
    /// Representative for accounts opened by a receive. The account itself
    /// when unset.
    pub default_representative: Option<AccountAddress>,
}

impl Default for OrchestratorSettings {
    fn default() -> Self {
        Self {
            thresholds: WorkThresholds::default(),
            remote_work_fallback: true,
            default_representative: None,
        }
    }
}

#[derive(Clone, Debug)]
enum Intent {
    Send { destination: PublicKey, amount: RawAmount },
    Receive(PendingTransaction),
    Change { representative: PublicKey },
}

/// Runs wallet transactions against the store, work cache, signer and node.
pub struct Orchestrator<N, S> {
    node: Arc<N>,
    signer: Arc<S>,
    store: Arc<LedgerStore>,
    cache: WorkCache,
    book: Arc<Mutex<RepresentativeBook>>,
    settings: OrchestratorSettings,
    transitions: broadcast::Sender<TxTransition>,
}

impl<N: NodeRpc, S: BlockSigner> Orchestrator<N, S> {
    pub fn new(
        node: Arc<N>,
        signer: Arc<S>,
        store: Arc<LedgerStore>,
        cache: WorkCache,
        book: Arc<Mutex<RepresentativeBook>>,
        settings: OrchestratorSettings,
    ) -> Self {
        Self {
            node,
            signer,
            store,
            cache,
            book,
            settings,
            transitions: broadcast::channel(TRANSITION_CAPACITY).0,
        }
    }

    /// State changes of every transaction this orchestrator runs.
    pub fn subscribe(&self) -> broadcast::Receiver<TxTransition> {
        self.transitions.subscribe()
    }

    fn transition(&self, account: &AccountAddress, state: TxState) {
        tracing::debug!(account = %account, ?state, "transaction state");
        let _ = self.transitions.send(TxTransition {
            account: account.clone(),
            state,
        });
    }

    /// Everything the account holds; sending it all leaves a zero balance.
    pub fn max_sendable(&self, from: &AccountAddress) -> Result<RawAmount, WalletError> {
        Ok(self.store.get(from)?.state.balance)
    }

    /// Check `address` locally and with the node.
    pub async fn destination_status(&self, address: &str) -> Result<DestinationStatus, WalletError> {
        let Ok(address) = parse_address(address) else {
            return Ok(DestinationStatus::Invalid);
        };
        if !self.node.validate_account_number(address.as_str()).await? {
            return Ok(DestinationStatus::Invalid);
        }
        match self.node.account_info(&address).await? {
            Some(_) => Ok(DestinationStatus::Open),
            None => Ok(DestinationStatus::Unopened),
        }
    }

    /// Validate a send before the user confirms it and start precomputing
    /// its work.
    pub async fn prepare_send(
        &self,
        from: &AccountAddress,
        to: &str,
        amount: RawAmount,
    ) -> Result<PreparedSend, WalletError> {
        let view = self.store.get(from)?;
        self.signing_account(&view).await?;
        let (to, _) = Self::check_send(&view, to, amount)?;
        self.cache.ensure(view.work_root());

        let destination = self.destination_status(to.as_str()).await?;
        if destination == DestinationStatus::Invalid {
            return Err(WalletError::InvalidAddress(to.to_string()));
        }
        Ok(PreparedSend {
            from: view.address,
            to,
            amount,
            balance_after: view.state.balance.saturating_sub(amount),
            destination,
        })
    }

    /// Send `amount` raw from `from` to `to`. Returns the new block's hash.
    pub async fn send(
        &self,
        from: &AccountAddress,
        to: &str,
        amount: RawAmount,
        abort: &AbortSignal,
    ) -> Result<BlockHash, WalletError> {
        let guard = self.store.begin(from)?;
        self.transition(from, TxState::Validating);
        let result = self.validate_send(from, to, amount).await;
        let (account, destination) = match result {
            Ok(ok) => ok,
            Err(e) => return Err(self.fail(from, e)),
        };
        self.run(&guard, &account, Intent::Send { destination, amount }, abort)
            .await
    }

    async fn validate_send(
        &self,
        from: &AccountAddress,
        to: &str,
        amount: RawAmount,
    ) -> Result<(DerivedAccount, PublicKey), WalletError> {
        let view = self.store.get(from)?;
        // Readiness first: a locked wallet must fail before any node traffic.
        let account = self.signing_account(&view).await?;
        let (to, destination) = Self::check_send(&view, to, amount)?;
        if !self.node.validate_account_number(to.as_str()).await? {
            return Err(WalletError::InvalidAddress(to.to_string()));
        }
        Ok((account, destination))
    }

    fn check_send(
        view: &AccountView,
        to: &str,
        amount: RawAmount,
    ) -> Result<(AccountAddress, PublicKey), WalletError> {
        let to = parse_address(to)?;
        let destination =
            decode_address(to.as_str()).ok_or_else(|| WalletError::InvalidAddress(to.to_string()))?;
        if amount < DUST_THRESHOLD {
            tracing::warn!(amount = %amount, "send below dust threshold rejected");
            return Err(WalletError::DustAmountRejected {
                amount,
                minimum: DUST_THRESHOLD,
            });
        }
        if view.state.frontier.is_none() {
            return Err(WalletError::AccountNotOpened(view.address.clone()));
        }
        if amount > view.state.balance {
            return Err(WalletError::InsufficientBalance {
                balance: view.state.balance,
                amount,
            });
        }
        Ok((to, destination))
    }

    /// Receive every pending send to `account`, largest first. Opens the
    /// account with the first one if needed.
    pub async fn receive_all(
        &self,
        account: &AccountAddress,
        abort: &AbortSignal,
    ) -> Result<Vec<BlockHash>, WalletError> {
        let view = self.store.get(account)?;
        self.signing_account(&view).await?;
        refresh_account(&*self.node, &self.store, &self.cache, account).await?;

        let mut receivable = self.store.get(account)?.receivable;
        receivable.sort_by(|a, b| b.amount.cmp(&a.amount));
        let mut hashes = Vec::with_capacity(receivable.len());
        for pending in receivable {
            hashes.push(self.receive(account, pending, abort).await?);
        }
        Ok(hashes)
    }

    /// Receive one pending send.
    pub async fn receive(
        &self,
        account: &AccountAddress,
        pending: PendingTransaction,
        abort: &AbortSignal,
    ) -> Result<BlockHash, WalletError> {
        let guard = self.store.begin(account)?;
        self.transition(account, TxState::Validating);
        let view = match self.store.get(account) {
            Ok(view) => view,
            Err(e) => return Err(self.fail(account, e)),
        };
        let signing = match self.signing_account(&view).await {
            Ok(signing) => signing,
            Err(e) => return Err(self.fail(account, e)),
        };
        self.run(&guard, &signing, Intent::Receive(pending), abort).await
    }

    /// Point `accounts` (every account when `None`) at `representative`.
    ///
    /// Accounts already delegating to it are skipped. Failures are reported
    /// per account and do not stop the batch. If `recommended` was picked
    /// from the node's list and matches, it is saved to the representative
    /// book once at least one account actually changed.
    pub async fn change_representatives(
        &self,
        accounts: Option<&[AccountAddress]>,
        representative: &str,
        recommended: Option<&RecommendedRepresentative>,
        abort: &AbortSignal,
    ) -> Result<RepresentativeChange, WalletError> {
        let new_rep = parse_address(representative)?;
        let rep_key = decode_address(new_rep.as_str())
            .ok_or_else(|| WalletError::InvalidAddress(new_rep.to_string()))?;

        let targets = match accounts {
            Some(list) => list.to_vec(),
            None => self.store.addresses(),
        };

        let mut report = RepresentativeChange::default();
        let mut ready = Vec::new();
        for address in targets {
            let view = match self.store.get(&address) {
                Ok(view) => view,
                Err(e) => {
                    report.failed.push((address, e));
                    continue;
                }
            };
            if view
                .state
                .representative
                .as_ref()
                .is_some_and(|current| current.same_account(&new_rep))
            {
                tracing::info!(account = %address, "already delegating to representative, skipping");
                report.skipped.push(address);
                continue;
            }
            if view.state.frontier.is_none() {
                report.failed.push((address.clone(), WalletError::AccountNotOpened(address)));
                continue;
            }
            match self.signing_account(&view).await {
                Ok(signing) => ready.push((address, signing)),
                Err(e) => report.failed.push((address, e)),
            }
        }
        if ready.is_empty() {
            return Ok(report);
        }

        if !self.node.validate_account_number(new_rep.as_str()).await? {
            return Err(WalletError::InvalidAddress(new_rep.to_string()));
        }

        for (address, signing) in ready {
            let result = match self.store.begin(&address) {
                Ok(guard) => {
                    self.transition(&address, TxState::Validating);
                    self.run(
                        &guard,
                        &signing,
                        Intent::Change {
                            representative: rep_key,
                        },
                        abort,
                    )
                    .await
                }
                Err(e) => Err(e),
            };
            match result {
                Ok(hash) => report.changed.push((address, hash)),
                Err(e) => {
                    tracing::warn!(account = %address, error = %e, "representative change failed");
                    report.failed.push((address, e));
                }
            }
        }

        if let Some(rec) = recommended.filter(|rec| rec.address.same_account(&new_rep)) {
            if !report.changed.is_empty() {
                let alias = rec.alias.clone().unwrap_or_else(|| rec.address.abbreviated());
                report.saved_recommended = self
                    .book
                    .lock()
                    .unwrap_or_else(|poisoned| poisoned.into_inner())
                    .remember(&rec.address, alias);
            }
        }
        Ok(report)
    }

    /// The account's signing capability, asking the signer for one if the
    /// store has none. Fails without touching the node.
    async fn signing_account(&self, view: &AccountView) -> Result<DerivedAccount, WalletError> {
        let account = match &view.signer {
            Some(account) => account.clone(),
            None => {
                let account = self.signer.account(view.index).await?;
                if account.public_key != view.public_key {
                    return Err(WalletError::Signing(format!(
                        "signer key for index {} does not match {}",
                        view.index, view.address
                    )));
                }
                self.store.set_signer(account.clone())?;
                account
            }
        };
        self.signer.check_ready(&account)?;
        Ok(account)
    }

    fn fail(&self, account: &AccountAddress, error: WalletError) -> WalletError {
        tracing::warn!(account = %account, error = %error, "transaction failed");
        self.transition(account, TxState::Failed);
        error
    }

    /// Building through Reconciling, with one rebuild on a stale frontier.
    async fn run(
        &self,
        guard: &TransactionGuard,
        account: &DerivedAccount,
        intent: Intent,
        abort: &AbortSignal,
    ) -> Result<BlockHash, WalletError> {
        let address = guard.address().clone();
        let mut retried = false;
        loop {
            match self.attempt(guard, account, &intent, abort).await {
                Ok(hash) => {
                    self.transition(&address, TxState::Idle);
                    return Ok(hash);
                }
                Err(WalletError::StaleFrontierConflict) => {
                    let refreshed = refresh_account(&*self.node, &self.store, &self.cache, &address).await;
                    if retried {
                        return Err(self.fail(&address, WalletError::StaleFrontierConflict));
                    }
                    if let Err(e) = refreshed {
                        return Err(self.fail(&address, e));
                    }
                    retried = true;
                    tracing::info!(account = %address, "stale frontier, rebuilding once");
                }
                Err(e) => return Err(self.fail(&address, e)),
            }
        }
    }

    async fn attempt(
        &self,
        guard: &TransactionGuard,
        account: &DerivedAccount,
        intent: &Intent,
        abort: &AbortSignal,
    ) -> Result<BlockHash, WalletError> {
        let address = guard.address();

        self.transition(address, TxState::Building);
        let view = self.store.get(address)?;
        let block = self.build(&view, intent)?;
        let root = block.work_root();

        self.transition(address, TxState::AwaitingWork);
        let work = tokio::select! {
            // The root's computation is only cancelled when its frontier moved.
            work = self.obtain_work(root, block.work_kind()) => work.map_err(|e| match e {
                WalletError::WorkComputationCancelled => WalletError::StaleFrontierConflict,
                e => e,
            })?,
            _ = abort.aborted() => return Err(WalletError::Aborted),
        };
        let block = block.with_work(work);

        self.transition(address, TxState::Signing);
        let signature = tokio::select! {
            signature = self.signer.sign(account, &block) => signature?,
            _ = abort.aborted() => {
                tracing::info!(account = %address, "transaction aborted while signing");
                return Err(WalletError::Aborted);
            }
        };
        let block = block.with_signature(signature);

        self.transition(address, TxState::Broadcasting);
        if let Err(e) = self.node.process(&block).await {
            let e = WalletError::from(e);
            if !matches!(e, WalletError::StaleFrontierConflict) {
                // The block may have landed even though we saw an error.
                if let Err(refresh) = refresh_account(&*self.node, &self.store, &self.cache, address).await {
                    tracing::debug!(account = %address, error = %refresh, "refresh after failed broadcast failed");
                }
            }
            return Err(e);
        }

        self.transition(address, TxState::Reconciling);
        let hash = self.store.apply_optimistic(guard, &block);
        tracing::info!(account = %address, hash = %hash, kind = block.subtype(), "block broadcast");
        self.cache.remove(&root);
        self.cache.frontier_changed(Some(root), hash);
        if let Err(e) = refresh_account(&*self.node, &self.store, &self.cache, address).await {
            tracing::warn!(account = %address, error = %e, "re-fetch after broadcast failed, will reconcile later");
        }
        Ok(hash)
    }

    fn build(&self, view: &AccountView, intent: &Intent) -> Result<Block, WalletError> {
        let representative = match &view.state.representative {
            Some(rep) => {
                decode_address(rep.as_str()).ok_or_else(|| WalletError::InvalidAddress(rep.to_string()))?
            }
            None => self.opening_representative(view)?,
        };
        let head = ChainHead {
            account: view.public_key,
            frontier: view.state.frontier,
            balance: view.state.balance,
            representative,
        };
        let builder = BlockBuilder::new(&head);
        let block = match intent {
            Intent::Send {
                destination,
                amount,
            } => {
                if head.frontier.is_none() {
                    return Err(WalletError::AccountNotOpened(view.address.clone()));
                }
                builder.send(*destination, *amount)?
            }
            Intent::Receive(pending) => builder.receive(pending.source, pending.amount)?,
            Intent::Change { representative } => {
                if head.frontier.is_none() {
                    return Err(WalletError::AccountNotOpened(view.address.clone()));
                }
                builder.change(*representative)?
            }
        };
        Ok(block)
    }

    fn opening_representative(&self, view: &AccountView) -> Result<PublicKey, WalletError> {
        match &self.settings.default_representative {
            Some(rep) => decode_address(rep.as_str())
                .ok_or_else(|| WalletError::InvalidAddress(rep.to_string())),
            None => Ok(view.public_key),
        }
    }

    /// Work for `root`: cached, or computed locally, or from the node if it
    /// answers first with work that verifies.
    async fn obtain_work(&self, root: BlockHash, kind: WorkBlockKind) -> Result<WorkNonce, WalletError> {
        if let Some(work) = self.cache.get(&root) {
            tracing::debug!(root = %root, "using cached work");
            return Ok(work);
        }
        let local = self.cache.wait_for(root);
        if !self.settings.remote_work_fallback {
            return Ok(local.await?);
        }
        tokio::pin!(local);

        let difficulty = self.settings.thresholds.threshold_for(kind);
        tokio::select! {
            work = &mut local => Ok(work?),
            remote = self.node.work_generate(&root, difficulty) => match remote {
                Ok(work) if validate_work(&root, work.0, difficulty) => {
                    // Receive-level work may be too weak for the cache; it is
                    // still good for this block.
                    if let Err(e) = self.cache.insert(root, work, WorkOrigin::Remote) {
                        tracing::debug!(root = %root, error = %e, "node work not cached");
                    }
                    Ok(work)
                }
                Ok(work) => {
                    tracing::warn!(root = %root, work = %work, "node returned work below threshold, waiting for local work");
                    Ok(local.await?)
                }
                Err(e) => {
                    tracing::debug!(root = %root, error = %e, "node work request failed, waiting for local work");
                    Ok(local.await?)
                }
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn abort_signal_reports_abort() {
        let (handle, signal) = AbortSignal::pair();
        assert!(!signal.is_aborted());
        handle.abort();
        assert!(signal.is_aborted());
        assert!(!AbortSignal::never().is_aborted());
    }

    #[tokio::test]
    async fn dropped_handle_never_aborts() {
        let (handle, signal) = AbortSignal::pair();
        drop(handle);
        let fired = tokio::time::timeout(std::time::Duration::from_millis(20), signal.aborted()).await;
        assert!(fired.is_err());
    }

    #[test]
    fn tx_state_serializes_snake_case() {
        assert_eq!(
            serde_json::to_string(&TxState::AwaitingWork).unwrap(),
            "\"awaiting_work\""
        );
    }
}
