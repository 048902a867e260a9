//! Construct the next block of an account chain from its current head.

use troll_types::{BlockHash, PublicKey, RawAmount};

use crate::{Block, BlockKind, BuildError, Link};

/// What the builder needs to know about an account to extend its chain.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ChainHead {
    pub account: PublicKey,
    /// Hash of the latest block, `None` while the account is unopened.
    pub frontier: Option<BlockHash>,
    pub balance: RawAmount,
    /// Current representative, or the one to open with if unopened.
    pub representative: PublicKey,
}

/// Builds unsigned, workless blocks on top of a [`ChainHead`].
pub struct BlockBuilder<'a> {
    head: &'a ChainHead,
}

impl<'a> BlockBuilder<'a> {
    pub fn new(head: &'a ChainHead) -> Self {
        Self { head }
    }

    fn block(&self, kind: BlockKind, representative: PublicKey, balance: RawAmount, link: Link) -> Block {
        Block {
            kind,
            account: self.head.account,
            previous: self.head.frontier,
            representative,
            balance,
            link,
            work: None,
            signature: None,
        }
    }

    /// Send `amount` raw to `destination`. The new balance is the old one
    /// minus `amount`.
    pub fn send(&self, destination: PublicKey, amount: RawAmount) -> Result<Block, BuildError> {
        if self.head.frontier.is_none() {
            return Err(BuildError::Unopened);
        }
        if amount.is_zero() {
            return Err(BuildError::ZeroAmount);
        }
        let balance = self
            .head
            .balance
            .checked_sub(amount)
            .ok_or(BuildError::InsufficientBalance {
                balance: self.head.balance,
                amount,
            })?;
        Ok(self.block(
            BlockKind::Send,
            self.head.representative,
            balance,
            Link::Destination(destination),
        ))
    }

    /// Receive the pending send `source` worth `amount` raw. Opens the
    /// account when it has no frontier yet.
    pub fn receive(&self, source: BlockHash, amount: RawAmount) -> Result<Block, BuildError> {
        let balance = self
            .head
            .balance
            .checked_add(amount)
            .ok_or(BuildError::BalanceOverflow)?;
        Ok(self.block(
            BlockKind::Receive,
            self.head.representative,
            balance,
            Link::Source(source),
        ))
    }

    /// Re-point the account's voting weight to `representative`.
    pub fn change(&self, representative: PublicKey) -> Result<Block, BuildError> {
        if self.head.frontier.is_none() {
            return Err(BuildError::Unopened);
        }
        Ok(self.block(BlockKind::Change, representative, self.head.balance, Link::Zero))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn opened(balance: u128) -> ChainHead {
        ChainHead {
            account: PublicKey([1; 32]),
            frontier: Some(BlockHash::new([2; 32])),
            balance: RawAmount::new(balance),
            representative: PublicKey([3; 32]),
        }
    }

    #[test]
    fn send_deducts_amount() {
        let head = opened(5_000_000);
        let block = BlockBuilder::new(&head)
            .send(PublicKey([4; 32]), RawAmount::new(1_000_000))
            .unwrap();
        assert_eq!(block.kind, BlockKind::Send);
        assert_eq!(block.balance, RawAmount::new(4_000_000));
        assert_eq!(block.previous, head.frontier);
        assert_eq!(block.representative, head.representative);
        assert_eq!(block.link, Link::Destination(PublicKey([4; 32])));
    }

    #[test]
    fn send_rejects_overdraw() {
        let head = opened(10);
        let err = BlockBuilder::new(&head)
            .send(PublicKey([4; 32]), RawAmount::new(11))
            .unwrap_err();
        assert_eq!(
            err,
            BuildError::InsufficientBalance {
                balance: RawAmount::new(10),
                amount: RawAmount::new(11)
            }
        );
    }

    #[test]
    fn send_entire_balance_leaves_zero() {
        let head = opened(10);
        let block = BlockBuilder::new(&head)
            .send(PublicKey([4; 32]), RawAmount::new(10))
            .unwrap();
        assert!(block.balance.is_zero());
    }

    #[test]
    fn receive_adds_pending_and_links_source() {
        let head = opened(10);
        let source = BlockHash::new([8; 32]);
        let block = BlockBuilder::new(&head)
            .receive(source, RawAmount::new(5))
            .unwrap();
        assert_eq!(block.balance, RawAmount::new(15));
        assert_eq!(block.link, Link::Source(source));
    }

    #[test]
    fn receive_on_unopened_account_opens_it() {
        let head = ChainHead {
            frontier: None,
            balance: RawAmount::ZERO,
            ..opened(0)
        };
        let block = BlockBuilder::new(&head)
            .receive(BlockHash::new([8; 32]), RawAmount::new(5))
            .unwrap();
        assert!(block.is_open());
        assert_eq!(block.subtype(), "open");
        assert_eq!(block.work_root(), BlockHash::new([1; 32]));
    }

    #[test]
    fn change_keeps_balance_and_zeroes_link() {
        let head = opened(77);
        let block = BlockBuilder::new(&head).change(PublicKey([9; 32])).unwrap();
        assert_eq!(block.balance, RawAmount::new(77));
        assert_eq!(block.representative, PublicKey([9; 32]));
        assert_eq!(block.link.to_bytes(), [0u8; 32]);
    }

    #[test]
    fn unopened_account_cannot_send_or_change() {
        let head = ChainHead {
            frontier: None,
            ..opened(0)
        };
        let builder = BlockBuilder::new(&head);
        assert_eq!(
            builder.send(PublicKey([4; 32]), RawAmount::new(1)),
            Err(BuildError::Unopened)
        );
        assert_eq!(builder.change(PublicKey([4; 32])), Err(BuildError::Unopened));
    }
}
