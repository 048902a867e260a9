//! The node's JSON form of a state block, as sent with `process`.

use serde::{Deserialize, Serialize};

use troll_crypto::derive_address;
use troll_types::{AccountAddress, BlockHash, PublicKey, RawAmount};
use troll_work::WorkNonce;

use crate::Block;

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockJson {
    #[serde(rename = "type")]
    pub block_type: String,
    pub account: AccountAddress,
    pub previous: BlockHash,
    pub representative: AccountAddress,
    pub balance: RawAmount,
    pub link: String,
    pub link_as_account: AccountAddress,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub signature: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub work: Option<WorkNonce>,
}

impl From<&Block> for BlockJson {
    fn from(block: &Block) -> Self {
        let link = block.link.to_bytes();
        Self {
            block_type: "state".to_string(),
            account: derive_address(&block.account),
            previous: block.previous.unwrap_or(BlockHash::ZERO),
            representative: derive_address(&block.representative),
            balance: block.balance,
            link: BlockHash::new(link).to_string(),
            link_as_account: derive_address(&PublicKey(link)),
            signature: block.signature.as_ref().map(|sig| sig.to_hex()),
            work: block.work,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{BlockKind, Link};
    use troll_types::Signature;

    #[test]
    fn state_block_json_shape() {
        let block = Block {
            kind: BlockKind::Receive,
            account: PublicKey([1; 32]),
            previous: None,
            representative: PublicKey([3; 32]),
            balance: RawAmount::new(1_000_000_000_000_000_000_000_000),
            link: Link::Source(BlockHash::new([0xab; 32])),
            work: Some(WorkNonce(0x2bf29ef00786a6bc)),
            signature: Some(Signature([0xcd; 64])),
        };
        let json = serde_json::to_value(BlockJson::from(&block)).unwrap();
        assert_eq!(json["type"], "state");
        assert_eq!(json["previous"], "0".repeat(64));
        assert_eq!(json["balance"], "1000000000000000000000000");
        assert_eq!(json["link"], "AB".repeat(32));
        assert_eq!(json["work"], "2bf29ef00786a6bc");
        assert_eq!(json["signature"], "CD".repeat(64));
        assert!(json["account"].as_str().unwrap().starts_with("troll_"));
        assert!(json["link_as_account"].as_str().unwrap().starts_with("troll_"));
    }

    #[test]
    fn unsigned_block_omits_signature_and_work() {
        let block = Block {
            kind: BlockKind::Change,
            account: PublicKey([1; 32]),
            previous: Some(BlockHash::new([2; 32])),
            representative: PublicKey([3; 32]),
            balance: RawAmount::ZERO,
            link: Link::Zero,
            work: None,
            signature: None,
        };
        let json = serde_json::to_value(BlockJson::from(&block)).unwrap();
        assert!(json.get("signature").is_none());
        assert!(json.get("work").is_none());
    }
}
