//! Anti-spam proof-of-work for account blocks.
//!
//! Every block must carry a nonce that, hashed together with the block's
//! *root* (its previous hash, or the account key for an account's first
//! block), clears a difficulty threshold. Finding one takes seconds, so the
//! [`WorkCache`] computes it ahead of time for each account's current frontier.

pub mod cache;
pub mod error;
pub mod generator;
pub mod persist;
pub mod thresholds;
pub mod validator;

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

pub use cache::{WorkCache, WorkOrigin};
pub use error::WorkError;
pub use generator::{WorkGenerator, WorkSolver};
pub use persist::PersistedWork;
pub use thresholds::{WorkBlockKind, WorkThresholds};
pub use validator::{validate_work, work_value};

/// The result of PoW generation.
///
/// Printed and parsed as 16 hex digits, the form the node uses.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct WorkNonce(pub u64);

impl fmt::Display for WorkNonce {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:016x}", self.0)
    }
}

impl FromStr for WorkNonce {
    type Err = WorkError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.is_empty() || s.len() > 16 {
            return Err(WorkError::InvalidNonce(s.to_string()));
        }
        u64::from_str_radix(s, 16)
            .map(WorkNonce)
            .map_err(|_| WorkError::InvalidNonce(s.to_string()))
    }
}

impl Serialize for WorkNonce {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for WorkNonce {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn nonce_hex_roundtrip() {
        let nonce = WorkNonce(0x2bf29ef00786a6bc);
        assert_eq!(nonce.to_string(), "2bf29ef00786a6bc");
        assert_eq!("2BF29EF00786A6BC".parse::<WorkNonce>().unwrap(), nonce);
    }

    #[test]
    fn nonce_rejects_garbage() {
        assert!("".parse::<WorkNonce>().is_err());
        assert!("xyz".parse::<WorkNonce>().is_err());
        assert!("11112222333344445".parse::<WorkNonce>().is_err());
    }
}
