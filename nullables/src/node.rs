//! Nullable node: an in-memory ledger behind the RPC surface.

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::{Mutex, MutexGuard};

use tokio::sync::watch;

use troll_crypto::{derive_address, validate_address};
use troll_ledger::{Block, Link};
use troll_node_client::{AccountInfo, NodeError, NodeRpc, PendingBlock, RepresentativeWeight};
use troll_types::{AccountAddress, BlockHash, RawAmount};
use troll_work::{WorkGenerator, WorkNonce};

#[derive(Default)]
struct NodeState {
    accounts: HashMap<AccountAddress, AccountInfo>,
    pending: HashMap<AccountAddress, Vec<PendingBlock>>,
    invalid: HashSet<AccountAddress>,
    representatives: Vec<RepresentativeWeight>,
    process_failures: VecDeque<NodeError>,
    remote_work: Option<WorkNonce>,
    unreachable: bool,
    processed: Vec<Block>,
    calls: Vec<&'static str>,
}

/// A test node that keeps account chains in memory.
///
/// `process` applies blocks the way a real node would for the checks the
/// wallet relies on: the previous hash must be the current frontier and the
/// signature must verify. Failures can be queued ahead of time.
pub struct NullNode {
    state: Mutex<NodeState>,
    paused: watch::Sender<bool>,
}

fn key(address: &AccountAddress) -> AccountAddress {
    AccountAddress::from_encoded(address.with_current_prefix().as_str().to_ascii_lowercase())
}

impl NullNode {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(NodeState::default()),
            paused: watch::channel(false).0,
        }
    }

    fn state(&self) -> MutexGuard<'_, NodeState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn record(&self, call: &'static str) -> Result<(), NodeError> {
        let mut state = self.state();
        state.calls.push(call);
        if state.unreachable {
            return Err(NodeError::Unreachable("null node offline".into()));
        }
        Ok(())
    }

    /// Make `address` an opened account.
    pub fn open_account(
        &self,
        address: &AccountAddress,
        frontier: BlockHash,
        balance: RawAmount,
        representative: &AccountAddress,
    ) {
        self.state().accounts.insert(
            key(address),
            AccountInfo {
                frontier,
                balance,
                representative: representative.clone(),
                pending: RawAmount::ZERO,
            },
        );
    }

    /// Queue an unreceived send to `address`.
    pub fn add_pending(&self, address: &AccountAddress, hash: BlockHash, amount: RawAmount) {
        let mut state = self.state();
        let account = key(address);
        state.pending.entry(account.clone()).or_default().push(PendingBlock {
            hash,
            amount,
            source: None,
        });
        if let Some(info) = state.accounts.get_mut(&account) {
            info.pending = info.pending.saturating_add(amount);
        }
    }

    /// Move an account's frontier as if another wallet instance published a block.
    pub fn advance_frontier(&self, address: &AccountAddress, frontier: BlockHash) {
        if let Some(info) = self.state().accounts.get_mut(&key(address)) {
            info.frontier = frontier;
        }
    }

    /// Make `validate_account_number` refuse `address` even if it decodes.
    pub fn mark_invalid(&self, address: &AccountAddress) {
        self.state().invalid.insert(key(address));
    }

    pub fn set_representatives(&self, representatives: Vec<RepresentativeWeight>) {
        self.state().representatives = representatives;
    }

    /// The next `process` call fails with `error` instead of applying.
    pub fn fail_next_process(&self, error: NodeError) {
        self.state().process_failures.push_back(error);
    }

    /// Answer `work_generate` with `work` instead of computing it.
    pub fn set_remote_work(&self, work: Option<WorkNonce>) {
        self.state().remote_work = work;
    }

    pub fn set_unreachable(&self, unreachable: bool) {
        self.state().unreachable = unreachable;
    }

    /// Hold every `process` call until [`resume_process`](Self::resume_process).
    pub fn pause_process(&self) {
        self.paused.send_replace(true);
    }

    pub fn resume_process(&self) {
        self.paused.send_replace(false);
    }

    pub fn account(&self, address: &AccountAddress) -> Option<AccountInfo> {
        self.state().accounts.get(&key(address)).cloned()
    }

    /// Blocks accepted by `process`, in order.
    pub fn processed(&self) -> Vec<Block> {
        self.state().processed.clone()
    }

    /// Every RPC call made, in order.
    pub fn calls(&self) -> Vec<&'static str> {
        self.state().calls.clone()
    }

    pub fn call_count(&self, call: &str) -> usize {
        self.state().calls.iter().filter(|c| **c == call).count()
    }

    fn apply(&self, block: &Block) -> Result<BlockHash, NodeError> {
        let mut state = self.state();
        if let Some(err) = state.process_failures.pop_front() {
            return Err(err);
        }
        if !block.has_valid_signature() {
            return Err(NodeError::rejected("Bad signature"));
        }

        let account = key(&derive_address(&block.account));
        let current = state.accounts.get(&account).map(|info| info.frontier);
        match (current, block.previous) {
            (Some(frontier), Some(previous)) if frontier == previous => {}
            (None, None) => {}
            (Some(_), _) => return Err(NodeError::rejected("Fork")),
            (None, Some(_)) => return Err(NodeError::rejected("Gap previous block")),
        }

        let hash = block.hash();
        match block.link {
            Link::Destination(dest) => {
                let previous_balance = state
                    .accounts
                    .get(&account)
                    .map(|info| info.balance)
                    .unwrap_or_default();
                let amount = previous_balance
                    .checked_sub(block.balance)
                    .ok_or_else(|| NodeError::rejected("Negative spend"))?;
                let dest = key(&derive_address(&dest));
                state.pending.entry(dest.clone()).or_default().push(PendingBlock {
                    hash,
                    amount,
                    source: Some(account.clone()),
                });
                if let Some(info) = state.accounts.get_mut(&dest) {
                    info.pending = info.pending.saturating_add(amount);
                }
            }
            Link::Source(source) => {
                let list = state.pending.entry(account.clone()).or_default();
                let Some(pos) = list.iter().position(|p| p.hash == source) else {
                    return Err(NodeError::rejected("Unreceivable"));
                };
                let received = list.remove(pos).amount;
                if let Some(info) = state.accounts.get_mut(&account) {
                    info.pending = info.pending.saturating_sub(received);
                }
            }
            Link::Zero => {}
        }

        let pending = state
            .pending
            .get(&account)
            .map(|list| {
                list.iter()
                    .fold(RawAmount::ZERO, |sum, p| sum.saturating_add(p.amount))
            })
            .unwrap_or_default();
        state.accounts.insert(
            account,
            AccountInfo {
                frontier: hash,
                balance: block.balance,
                representative: derive_address(&block.representative),
                pending,
            },
        );
        state.processed.push(block.clone());
        Ok(hash)
    }
}

impl Default for NullNode {
    fn default() -> Self {
        Self::new()
    }
}

impl NodeRpc for NullNode {
    async fn account_info(&self, account: &AccountAddress) -> Result<Option<AccountInfo>, NodeError> {
        self.record("account_info")?;
        Ok(self.state().accounts.get(&key(account)).cloned())
    }

    async fn validate_account_number(&self, address: &str) -> Result<bool, NodeError> {
        self.record("validate_account_number")?;
        let invalid = self
            .state()
            .invalid
            .contains(&key(&AccountAddress::from_encoded(address)));
        Ok(!invalid && validate_address(address))
    }

    async fn process(&self, block: &Block) -> Result<BlockHash, NodeError> {
        self.record("process")?;
        let mut paused = self.paused.subscribe();
        // Sender lives in self, so this cannot fail.
        let _ = paused.wait_for(|paused| !*paused).await;
        self.apply(block)
    }

    async fn work_generate(&self, root: &BlockHash, difficulty: u64) -> Result<WorkNonce, NodeError> {
        self.record("work_generate")?;
        let scripted = self.state().remote_work;
        match scripted {
            Some(work) => Ok(work),
            None => WorkGenerator
                .generate(root, difficulty)
                .map_err(|e| NodeError::rejected(e.to_string())),
        }
    }

    async fn representatives_with_weight(&self) -> Result<Vec<RepresentativeWeight>, NodeError> {
        self.record("representatives")?;
        Ok(self.state().representatives.clone())
    }

    async fn pending(&self, account: &AccountAddress, count: u32) -> Result<Vec<PendingBlock>, NodeError> {
        self.record("pending")?;
        Ok(self
            .state()
            .pending
            .get(&key(account))
            .map(|list| list.iter().take(count as usize).cloned().collect())
            .unwrap_or_default())
    }
}
