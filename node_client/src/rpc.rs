//! The request/response surface the wallet consumes.

use std::future::Future;

use serde::{Deserialize, Serialize};

use troll_ledger::Block;
use troll_types::{AccountAddress, BlockHash, RawAmount};
use troll_work::WorkNonce;

use crate::NodeError;

/// Authoritative state of an opened account.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccountInfo {
    pub frontier: BlockHash,
    pub balance: RawAmount,
    pub representative: AccountAddress,
    /// Sum of unreceived sends to this account.
    #[serde(default, alias = "receivable")]
    pub pending: RawAmount,
}

/// An unreceived send to one of our accounts.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PendingBlock {
    pub hash: BlockHash,
    pub amount: RawAmount,
    pub source: Option<AccountAddress>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RepresentativeWeight {
    pub address: AccountAddress,
    pub weight: RawAmount,
}

/// Node calls the wallet makes.
///
/// Every method fails with [`NodeError::Unreachable`] when the node cannot be
/// reached in time and with [`NodeError::Rejected`] when it refuses.
pub trait NodeRpc: Send + Sync + 'static {
    /// State of `account`, or `None` if the node has never seen it (valid
    /// but unopened).
    fn account_info(
        &self,
        account: &AccountAddress,
    ) -> impl Future<Output = Result<Option<AccountInfo>, NodeError>> + Send;

    fn validate_account_number(
        &self,
        address: &str,
    ) -> impl Future<Output = Result<bool, NodeError>> + Send;

    /// Submit a signed block. Returns the hash the node computed.
    fn process(&self, block: &Block) -> impl Future<Output = Result<BlockHash, NodeError>> + Send;

    /// Ask the node to compute work for `root` at `difficulty`.
    fn work_generate(
        &self,
        root: &BlockHash,
        difficulty: u64,
    ) -> impl Future<Output = Result<WorkNonce, NodeError>> + Send;

    /// Representatives and their delegated weight, heaviest first.
    fn representatives_with_weight(
        &self,
    ) -> impl Future<Output = Result<Vec<RepresentativeWeight>, NodeError>> + Send;

    /// Up to `count` unreceived sends to `account`.
    fn pending(
        &self,
        account: &AccountAddress,
        count: u32,
    ) -> impl Future<Output = Result<Vec<PendingBlock>, NodeError>> + Send;
}

impl<T: NodeRpc> NodeRpc for std::sync::Arc<T> {
    fn account_info(
        &self,
        account: &AccountAddress,
    ) -> impl Future<Output = Result<Option<AccountInfo>, NodeError>> + Send {
        (**self).account_info(account)
    }

    fn validate_account_number(&self, address: &str) -> impl Future<Output = Result<bool, NodeError>> + Send {
        (**self).validate_account_number(address)
    }

    fn process(&self, block: &Block) -> impl Future<Output = Result<BlockHash, NodeError>> + Send {
        (**self).process(block)
    }

    fn work_generate(
        &self,
        root: &BlockHash,
        difficulty: u64,
    ) -> impl Future<Output = Result<WorkNonce, NodeError>> + Send {
        (**self).work_generate(root, difficulty)
    }

    fn representatives_with_weight(
        &self,
    ) -> impl Future<Output = Result<Vec<RepresentativeWeight>, NodeError>> + Send {
        (**self).representatives_with_weight()
    }

    fn pending(
        &self,
        account: &AccountAddress,
        count: u32,
    ) -> impl Future<Output = Result<Vec<PendingBlock>, NodeError>> + Send {
        (**self).pending(account, count)
    }
}
