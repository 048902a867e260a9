//! Ledger state store: the wallet's own view of its accounts.
//!
//! Each account lives in its own slot with its own lock, so work on one
//! account never waits on another. A slot also carries the in-flight flag
//! that keeps a second transaction from chaining off the same frontier.
//!
//! Broadcast blocks are applied optimistically. The next authoritative
//! fetch from the node either confirms them or rolls the account back to
//! its last confirmed state and reports a [`StoreEvent::Discrepancy`].

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, RwLock};

use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

use troll_crypto::derive_address;
use troll_ledger::{Block, Link};
use troll_node_client::{AccountInfo, PendingBlock};
use troll_signer::DerivedAccount;
use troll_types::{AccountAddress, BlockHash, PublicKey, RawAmount};

use crate::WalletError;

const EVENT_CAPACITY: usize = 256;

/// Balance and chain position of one account.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccountState {
    pub balance: RawAmount,
    /// Sum of unreceived sends.
    pub pending: RawAmount,
    /// `None` until the account's first block.
    pub frontier: Option<BlockHash>,
    pub representative: Option<AccountAddress>,
}

impl AccountState {
    fn from_node(info: Option<&AccountInfo>, receivable: &[PendingTransaction]) -> Self {
        let listed = receivable
            .iter()
            .fold(RawAmount::ZERO, |sum, p| sum.saturating_add(p.amount));
        match info {
            Some(info) => Self {
                balance: info.balance,
                pending: info.pending.max(listed),
                frontier: Some(info.frontier),
                representative: Some(info.representative.with_current_prefix()),
            },
            None => Self {
                pending: listed,
                ..Self::default()
            },
        }
    }
}

/// Funds sent to one of our accounts that no receive block has claimed yet.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PendingTransaction {
    /// Hash of the send block.
    pub source: BlockHash,
    pub account: AccountAddress,
    pub amount: RawAmount,
}

impl PendingTransaction {
    pub fn from_node(account: &AccountAddress, block: &PendingBlock) -> Self {
        Self {
            source: block.hash,
            account: account.clone(),
            amount: block.amount,
        }
    }
}

/// A read-only copy of one account.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AccountView {
    pub index: u32,
    pub address: AccountAddress,
    pub public_key: PublicKey,
    pub state: AccountState,
    pub receivable: Vec<PendingTransaction>,
    /// Hash of a broadcast block the node has not confirmed yet.
    pub unconfirmed: Option<BlockHash>,
    /// Signing capability, absent while locked or before the signer was asked.
    pub signer: Option<DerivedAccount>,
}

impl AccountView {
    /// Hash the next block's work must be valid against.
    pub fn work_root(&self) -> BlockHash {
        work_root(&self.public_key, self.state.frontier)
    }
}

fn work_root(public_key: &PublicKey, frontier: Option<BlockHash>) -> BlockHash {
    frontier.unwrap_or_else(|| BlockHash::new(public_key.0))
}

/// What an authoritative fetch did to an account.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ReconcileOutcome {
    Unchanged,
    Updated,
    /// The optimistic block is not on the node; local state was reset.
    RolledBack { expected: BlockHash },
    /// A local block was applied after the fetch started; the fetch is stale.
    Superseded,
}

/// Notifications for the presentation layer.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum StoreEvent {
    Updated {
        account: AccountAddress,
    },
    Discrepancy {
        account: AccountAddress,
        expected: BlockHash,
        actual: Option<BlockHash>,
    },
}

/// Account record as persisted between runs. Only confirmed state is kept.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PersistedAccount {
    pub index: u32,
    pub address: AccountAddress,
    pub public_key: PublicKey,
    #[serde(flatten)]
    pub state: AccountState,
}

struct AccountRecord {
    index: u32,
    address: AccountAddress,
    public_key: PublicKey,
    signer: Option<DerivedAccount>,
    state: AccountState,
    confirmed: AccountState,
    receivable: Vec<PendingTransaction>,
    unconfirmed: Option<BlockHash>,
    /// Bumped by every local write.
    revision: u64,
}

impl AccountRecord {
    fn view(&self) -> AccountView {
        AccountView {
            index: self.index,
            address: self.address.clone(),
            public_key: self.public_key,
            state: self.state.clone(),
            receivable: self.receivable.clone(),
            unconfirmed: self.unconfirmed,
            signer: self.signer.clone(),
        }
    }
}

struct AccountSlot {
    in_flight: AtomicBool,
    record: Mutex<AccountRecord>,
}

impl AccountSlot {
    fn record(&self) -> MutexGuard<'_, AccountRecord> {
        self.record.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

/// Exclusive right to mutate one account's chain. Released on drop.
pub struct TransactionGuard {
    slot: Arc<AccountSlot>,
    address: AccountAddress,
}

impl TransactionGuard {
    pub fn address(&self) -> &AccountAddress {
        &self.address
    }
}

impl Drop for TransactionGuard {
    fn drop(&mut self) {
        self.slot.in_flight.store(false, Ordering::Release);
    }
}

fn key(address: &AccountAddress) -> AccountAddress {
    AccountAddress::from_encoded(address.with_current_prefix().as_str().to_ascii_lowercase())
}

/// Single source of truth for the wallet's accounts.
pub struct LedgerStore {
    slots: RwLock<HashMap<AccountAddress, Arc<AccountSlot>>>,
    events: broadcast::Sender<StoreEvent>,
}

impl Default for LedgerStore {
    fn default() -> Self {
        Self::new()
    }
}

impl LedgerStore {
    pub fn new() -> Self {
        Self {
            slots: RwLock::new(HashMap::new()),
            events: broadcast::channel(EVENT_CAPACITY).0,
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<StoreEvent> {
        self.events.subscribe()
    }

    fn emit(&self, event: StoreEvent) {
        // No subscribers is fine.
        let _ = self.events.send(event);
    }

    fn slot(&self, address: &AccountAddress) -> Result<Arc<AccountSlot>, WalletError> {
        self.slots
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .get(&key(address))
            .cloned()
            .ok_or_else(|| WalletError::UnknownAccount(address.clone()))
    }

    fn all_slots(&self) -> Vec<Arc<AccountSlot>> {
        self.slots
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .values()
            .cloned()
            .collect()
    }

    /// Add an account, or refresh the signing capability of a known one.
    /// Returns `true` if the account is new.
    pub fn insert(&self, account: DerivedAccount) -> bool {
        let mut slots = self.slots.write().unwrap_or_else(|poisoned| poisoned.into_inner());
        let k = key(&account.address);
        if let Some(slot) = slots.get(&k) {
            slot.record().signer = Some(account);
            return false;
        }
        tracing::debug!(account = %account.address, index = account.index, "account added");
        let record = AccountRecord {
            index: account.index,
            address: account.address.clone(),
            public_key: account.public_key,
            signer: Some(account),
            state: AccountState::default(),
            confirmed: AccountState::default(),
            receivable: Vec::new(),
            unconfirmed: None,
            revision: 0,
        };
        slots.insert(
            k,
            Arc::new(AccountSlot {
                in_flight: AtomicBool::new(false),
                record: Mutex::new(record),
            }),
        );
        true
    }

    /// Forget every signing capability, e.g. when the wallet locks.
    pub fn clear_signers(&self) {
        for slot in self.all_slots() {
            slot.record().signer = None;
        }
    }

    pub fn contains(&self, address: &AccountAddress) -> bool {
        self.slot(address).is_ok()
    }

    pub fn get(&self, address: &AccountAddress) -> Result<AccountView, WalletError> {
        Ok(self.slot(address)?.record().view())
    }

    /// All accounts ordered by derivation index.
    pub fn accounts(&self) -> Vec<AccountView> {
        let mut views: Vec<_> = self.all_slots().iter().map(|s| s.record().view()).collect();
        views.sort_by_key(|v| v.index);
        views
    }

    pub fn addresses(&self) -> Vec<AccountAddress> {
        self.accounts().into_iter().map(|v| v.address).collect()
    }

    /// Next unused derivation index.
    pub fn next_index(&self) -> u32 {
        self.accounts().last().map(|v| v.index + 1).unwrap_or(0)
    }

    /// Current work root of every account.
    pub fn frontiers(&self) -> HashSet<BlockHash> {
        self.all_slots()
            .iter()
            .map(|s| {
                let record = s.record();
                work_root(&record.public_key, record.state.frontier)
            })
            .collect()
    }

    /// Claim the account for one transaction.
    pub fn begin(&self, address: &AccountAddress) -> Result<TransactionGuard, WalletError> {
        let slot = self.slot(address)?;
        if slot
            .in_flight
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return Err(WalletError::TransactionInProgress(address.clone()));
        }
        Ok(TransactionGuard {
            slot,
            address: address.clone(),
        })
    }

    pub fn is_busy(&self, address: &AccountAddress) -> bool {
        self.slot(address)
            .map(|s| s.in_flight.load(Ordering::Acquire))
            .unwrap_or(false)
    }

    /// Local write revision; pass it back to [`reconcile`](Self::reconcile).
    pub fn revision(&self, address: &AccountAddress) -> Result<u64, WalletError> {
        Ok(self.slot(address)?.record().revision)
    }

    /// Record the account's signing capability, e.g. after asking the signer.
    pub fn set_signer(&self, account: DerivedAccount) -> Result<(), WalletError> {
        let slot = self.slot(&account.address)?;
        slot.record().signer = Some(account);
        Ok(())
    }

    /// Apply a block the node accepted, before it is confirmed.
    pub fn apply_optimistic(&self, guard: &TransactionGuard, block: &Block) -> BlockHash {
        let hash = block.hash();
        let mut record = guard.slot.record();
        record.state.balance = block.balance;
        record.state.frontier = Some(hash);
        record.state.representative = Some(derive_address(&block.representative));
        if let Link::Source(source) = block.link {
            if let Some(pos) = record.receivable.iter().position(|p| p.source == source) {
                let claimed = record.receivable.remove(pos);
                record.state.pending = record.state.pending.saturating_sub(claimed.amount);
            }
        }
        record.unconfirmed = Some(hash);
        record.revision += 1;
        tracing::debug!(account = %record.address, hash = %hash, balance = %block.balance, "optimistic update");
        drop(record);
        self.emit(StoreEvent::Updated {
            account: guard.address.clone(),
        });
        hash
    }

    /// Replace local state with what the node reports.
    ///
    /// `revision` is the value read before the fetch started; if a block was
    /// applied locally since then the fetch predates it and is ignored.
    /// Calling this again with the same data changes nothing.
    pub fn reconcile(
        &self,
        address: &AccountAddress,
        revision: u64,
        info: Option<&AccountInfo>,
        receivable: Vec<PendingTransaction>,
    ) -> Result<ReconcileOutcome, WalletError> {
        let slot = self.slot(address)?;
        let mut record = slot.record();
        if record.revision != revision {
            return Ok(ReconcileOutcome::Superseded);
        }

        let node_state = AccountState::from_node(info, &receivable);
        let rolled_back = match record.unconfirmed.take() {
            Some(expected) if node_state.frontier != Some(expected) => Some(expected),
            _ => None,
        };
        let changed = record.state != node_state || record.receivable != receivable;
        record.state = node_state.clone();
        record.confirmed = node_state;
        record.receivable = receivable;
        let account = record.address.clone();
        let actual = record.state.frontier;
        drop(record);

        if let Some(expected) = rolled_back {
            tracing::warn!(account = %account, expected = %expected, "broadcast block missing on node, rolled back");
            self.emit(StoreEvent::Discrepancy {
                account,
                expected,
                actual,
            });
            return Ok(ReconcileOutcome::RolledBack { expected });
        }
        if changed {
            self.emit(StoreEvent::Updated { account });
            return Ok(ReconcileOutcome::Updated);
        }
        Ok(ReconcileOutcome::Unchanged)
    }

    /// Confirmed state of every account, for persistence.
    pub fn snapshot(&self) -> Vec<PersistedAccount> {
        let mut accounts: Vec<_> = self
            .all_slots()
            .iter()
            .map(|s| {
                let record = s.record();
                PersistedAccount {
                    index: record.index,
                    address: record.address.clone(),
                    public_key: record.public_key,
                    state: record.confirmed.clone(),
                }
            })
            .collect();
        accounts.sort_by_key(|a| a.index);
        accounts
    }

    /// Load persisted accounts. Signing capabilities are attached later.
    pub fn restore(&self, accounts: Vec<PersistedAccount>) {
        let mut slots = self.slots.write().unwrap_or_else(|poisoned| poisoned.into_inner());
        for account in accounts {
            let record = AccountRecord {
                index: account.index,
                address: account.address.with_current_prefix(),
                public_key: account.public_key,
                signer: None,
                state: account.state.clone(),
                confirmed: account.state,
                receivable: Vec::new(),
                unconfirmed: None,
                revision: 0,
            };
            slots.insert(
                key(&account.address),
                Arc::new(AccountSlot {
                    in_flight: AtomicBool::new(false),
                    record: Mutex::new(record),
                }),
            );
        }
    }
}
