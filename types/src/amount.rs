//! Raw ledger amounts.
//!
//! Amounts are represented as fixed-point integers (u128) to avoid floating-point errors.
//! The smallest unit is 1 raw; the whole supply (~1.33 × 10^38 raw) fits in a u128.

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;

use crate::TypesError;

/// An amount in raw, the ledger's indivisible unit.
///
/// Serialized as a decimal string, matching the node's RPC representation.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct RawAmount(u128);

impl RawAmount {
    pub const ZERO: Self = Self(0);

    pub const fn new(raw: u128) -> Self {
        Self(raw)
    }

    pub fn raw(&self) -> u128 {
        self.0
    }

    pub fn is_zero(&self) -> bool {
        self.0 == 0
    }

    pub fn checked_add(self, other: Self) -> Option<Self> {
        self.0.checked_add(other.0).map(Self)
    }

    pub fn checked_sub(self, other: Self) -> Option<Self> {
        self.0.checked_sub(other.0).map(Self)
    }

    pub fn saturating_add(self, other: Self) -> Self {
        Self(self.0.saturating_add(other.0))
    }

    pub fn saturating_sub(self, other: Self) -> Self {
        Self(self.0.saturating_sub(other.0))
    }

    /// Big-endian 16-byte encoding used when hashing blocks.
    pub fn to_be_bytes(&self) -> [u8; 16] {
        self.0.to_be_bytes()
    }
}

impl fmt::Display for RawAmount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for RawAmount {
    type Err = TypesError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.is_empty() || !s.bytes().all(|b| b.is_ascii_digit()) {
            return Err(TypesError::InvalidAmount(s.to_string()));
        }
        s.parse::<u128>()
            .map(Self)
            .map_err(|_| TypesError::Overflow)
    }
}

impl From<u128> for RawAmount {
    fn from(raw: u128) -> Self {
        Self(raw)
    }
}

impl Serialize for RawAmount {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for RawAmount {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_decimal_strings() {
        assert_eq!("0".parse::<RawAmount>().unwrap(), RawAmount::ZERO);
        assert_eq!(
            "340282366920938463463374607431768211455".parse::<RawAmount>().unwrap(),
            RawAmount::new(u128::MAX)
        );
    }

    #[test]
    fn rejects_signs_and_overflow() {
        assert!("-1".parse::<RawAmount>().is_err());
        assert!("+1".parse::<RawAmount>().is_err());
        assert!("1.5".parse::<RawAmount>().is_err());
        assert_eq!(
            "340282366920938463463374607431768211456".parse::<RawAmount>(),
            Err(TypesError::Overflow)
        );
    }

    #[test]
    fn checked_arithmetic() {
        let a = RawAmount::new(5);
        let b = RawAmount::new(7);
        assert_eq!(a.checked_sub(b), None);
        assert_eq!(b.checked_sub(a), Some(RawAmount::new(2)));
        assert_eq!(RawAmount::new(u128::MAX).checked_add(a), None);
    }

    #[test]
    fn serde_as_string() {
        let json = serde_json::to_string(&RawAmount::new(1_000_000)).unwrap();
        assert_eq!(json, "\"1000000\"");
    }
}
