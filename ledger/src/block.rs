//! The state block and its canonical hash.

use blake2::digest::consts::U32;
use blake2::{Blake2b, Digest};
use serde::{Deserialize, Serialize};

use troll_types::{BlockHash, PublicKey, RawAmount, Signature};
use troll_work::{validate_work, WorkBlockKind, WorkNonce, WorkThresholds};

/// State blocks are hashed behind a fixed 32-byte preamble whose last byte
/// is the block type tag (6 = state).
const STATE_BLOCK_PREAMBLE: [u8; 32] = {
    let mut preamble = [0u8; 32];
    preamble[31] = 6;
    preamble
};

/// What a block does to its account.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BlockKind {
    Send,
    Receive,
    Change,
}

/// The 32-byte link field. Its meaning depends on the block kind.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum Link {
    /// Send: the destination account.
    Destination(PublicKey),
    /// Receive: the send block being received.
    Source(BlockHash),
    /// Change: unused, all zeroes.
    Zero,
}

impl Link {
    pub fn to_bytes(&self) -> [u8; 32] {
        match self {
            Link::Destination(key) => key.0,
            Link::Source(hash) => *hash.as_bytes(),
            Link::Zero => [0u8; 32],
        }
    }
}

/// A state block in an account chain.
///
/// `balance` is the account's total raw balance after this block applies.
/// Work and signature are attached after construction and are not part of
/// the hash.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Block {
    pub kind: BlockKind,
    pub account: PublicKey,
    /// `None` for the first block of an account.
    pub previous: Option<BlockHash>,
    pub representative: PublicKey,
    pub balance: RawAmount,
    pub link: Link,
    pub work: Option<WorkNonce>,
    pub signature: Option<Signature>,
}

impl Block {
    /// Canonical hash: Blake2b-256 over the preamble, account, previous (zero
    /// for a first block), representative, balance as 16 big-endian bytes and
    /// link. This is what gets signed.
    /// An account's first block hashes with its public key in place of
    /// `previous`, the same substitution [`work_root`](Self::work_root) makes.
    pub fn hash(&self) -> BlockHash {
        let previous = self.work_root();
        let mut hasher = Blake2b::<U32>::new();
        hasher.update(STATE_BLOCK_PREAMBLE);
        hasher.update(self.account.as_bytes());
        hasher.update(previous.as_bytes());
        hasher.update(self.representative.as_bytes());
        hasher.update(self.balance.to_be_bytes());
        hasher.update(self.link.to_bytes());
        let mut out = [0u8; 32];
        out.copy_from_slice(&hasher.finalize());
        BlockHash::new(out)
    }

    /// The hash proof-of-work must be valid against: the previous block, or
    /// the account's public key for an account's first block.
    pub fn work_root(&self) -> BlockHash {
        self.previous
            .unwrap_or_else(|| BlockHash::new(*self.account.as_bytes()))
    }

    /// The threshold class this block's work must meet.
    pub fn work_kind(&self) -> WorkBlockKind {
        match self.kind {
            BlockKind::Send | BlockKind::Change => WorkBlockKind::SendOrChange,
            BlockKind::Receive => WorkBlockKind::Receive,
        }
    }

    /// Whether this is the first block in the account's chain.
    pub fn is_open(&self) -> bool {
        self.previous.is_none()
    }

    /// The node's name for this block's operation.
    pub fn subtype(&self) -> &'static str {
        match (self.kind, self.is_open()) {
            (BlockKind::Receive, true) => "open",
            (BlockKind::Receive, false) => "receive",
            (BlockKind::Send, _) => "send",
            (BlockKind::Change, _) => "change",
        }
    }

    pub fn with_work(mut self, work: WorkNonce) -> Self {
        self.work = Some(work);
        self
    }

    pub fn with_signature(mut self, signature: Signature) -> Self {
        self.signature = Some(signature);
        self
    }

    /// Attached work meets the threshold for this block's kind.
    pub fn has_valid_work(&self, thresholds: &WorkThresholds) -> bool {
        self.work.is_some_and(|work| {
            validate_work(
                &self.work_root(),
                work.0,
                thresholds.threshold_for(self.work_kind()),
            )
        })
    }

    /// Attached signature was made by the account over this block's hash.
    pub fn has_valid_signature(&self) -> bool {
        self.signature
            .as_ref()
            .is_some_and(|sig| troll_crypto::verify_hash(&self.hash(), sig, &self.account))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use troll_crypto::{derive_keypair, sign_hash};
    use troll_work::WorkGenerator;

    fn sample_block() -> Block {
        Block {
            kind: BlockKind::Send,
            account: PublicKey([1; 32]),
            previous: Some(BlockHash::new([2; 32])),
            representative: PublicKey([3; 32]),
            balance: RawAmount::new(5_000_000),
            link: Link::Destination(PublicKey([4; 32])),
            work: None,
            signature: None,
        }
    }

    #[test]
    fn hash_is_deterministic() {
        assert_eq!(sample_block().hash(), sample_block().hash());
    }

    #[test]
    fn first_block_hashes_with_account_key_as_previous() {
        let mut open = sample_block();
        open.previous = None;
        let mut substituted = open.clone();
        substituted.previous = Some(BlockHash::new([1; 32]));
        assert_eq!(open.hash(), substituted.hash());
        assert_eq!(open.work_root(), BlockHash::new([1; 32]));
    }

    #[test]
    fn every_field_affects_hash() {
        let base = sample_block().hash();

        let mut b = sample_block();
        b.account = PublicKey([9; 32]);
        assert_ne!(b.hash(), base);

        let mut b = sample_block();
        b.previous = None;
        assert_ne!(b.hash(), base);

        let mut b = sample_block();
        b.representative = PublicKey([9; 32]);
        assert_ne!(b.hash(), base);

        let mut b = sample_block();
        b.balance = RawAmount::new(4_999_999);
        assert_ne!(b.hash(), base);

        let mut b = sample_block();
        let mut link = [4u8; 32];
        link[31] ^= 1;
        b.link = Link::Destination(PublicKey(link));
        assert_ne!(b.hash(), base);
    }

    #[test]
    fn work_and_signature_do_not_affect_hash() {
        let base = sample_block().hash();
        let b = sample_block()
            .with_work(WorkNonce(7))
            .with_signature(Signature([5; 64]));
        assert_eq!(b.hash(), base);
    }

    #[test]
    fn first_block_works_against_account_key() {
        let mut b = sample_block();
        assert_eq!(b.work_root(), BlockHash::new([2; 32]));
        b.previous = None;
        assert_eq!(b.work_root(), BlockHash::new([1; 32]));
    }

    #[test]
    fn subtype_names() {
        let mut b = sample_block();
        assert_eq!(b.subtype(), "send");
        b.kind = BlockKind::Receive;
        assert_eq!(b.subtype(), "receive");
        b.previous = None;
        assert_eq!(b.subtype(), "open");
        b.kind = BlockKind::Change;
        assert_eq!(b.subtype(), "change");
    }

    #[test]
    fn signature_checks_against_account() {
        let kp = derive_keypair(&[7; 32], 0);
        let mut b = sample_block();
        b.account = kp.public;
        assert!(!b.has_valid_signature());
        let signed = b.clone().with_signature(sign_hash(&b.hash(), &kp.private));
        assert!(signed.has_valid_signature());

        let mut tampered = signed;
        tampered.balance = RawAmount::new(1);
        assert!(!tampered.has_valid_signature());
    }

    #[test]
    fn work_checked_against_kind_threshold() {
        let thresholds = WorkThresholds::with_base(0xF000_0000_0000_0000);
        let b = sample_block();
        assert!(!b.has_valid_work(&thresholds));
        let work = WorkGenerator
            .generate(&b.work_root(), thresholds.threshold_for(WorkBlockKind::SendOrChange))
            .unwrap();
        assert!(b.with_work(work).has_valid_work(&thresholds));
    }
}
