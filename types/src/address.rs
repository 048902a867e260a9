//! Account address type with `troll_` prefix.

use serde::{Deserialize, Serialize};
use std::fmt;

/// A Trollar account address, prefixed with `troll_`.
///
/// Encoding and checksum verification live in `troll_crypto::address`; this
/// type only carries an already-encoded string. Construct it through
/// `troll_crypto::derive_address` or `troll_crypto::parse_address`.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AccountAddress(String);

impl AccountAddress {
    /// The standard prefix for all account addresses.
    pub const PREFIX: &'static str = "troll_";

    /// The prefix written by wallets before schema version 2.
    pub const LEGACY_PREFIX: &'static str = "ttk_";

    /// Wrap an encoded address string without re-validating it.
    pub fn from_encoded(encoded: impl Into<String>) -> Self {
        Self(encoded.into())
    }

    /// Return the raw address string.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Whether the string still carries the legacy prefix.
    pub fn is_legacy(&self) -> bool {
        self.0.starts_with(Self::LEGACY_PREFIX)
    }

    /// Rewrite a legacy `ttk_` address to `troll_`. The encoded key and
    /// checksum are identical between the two forms.
    pub fn with_current_prefix(&self) -> Self {
        match self.0.strip_prefix(Self::LEGACY_PREFIX) {
            Some(rest) => Self(format!("{}{}", Self::PREFIX, rest)),
            None => self.clone(),
        }
    }

    /// Compare two addresses ignoring ASCII case and legacy prefixes.
    pub fn same_account(&self, other: &AccountAddress) -> bool {
        self.with_current_prefix()
            .0
            .eq_ignore_ascii_case(&other.with_current_prefix().0)
    }

    /// The short form shown in lists: first nine and last five characters.
    pub fn abbreviated(&self) -> String {
        let chars: Vec<char> = self.0.chars().collect();
        if chars.len() <= 14 {
            return self.0.clone();
        }
        let head: String = chars[..9].iter().collect();
        let tail: String = chars[chars.len() - 5..].iter().collect();
        format!("{head}\u{2026}{tail}")
    }
}

impl fmt::Display for AccountAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn legacy_prefix_is_rewritten() {
        let legacy = AccountAddress::from_encoded("ttk_3abc");
        assert!(legacy.is_legacy());
        assert_eq!(legacy.with_current_prefix().as_str(), "troll_3abc");
        let current = AccountAddress::from_encoded("troll_3abc");
        assert_eq!(current.with_current_prefix(), current);
    }

    #[test]
    fn same_account_ignores_case_and_prefix() {
        let a = AccountAddress::from_encoded("ttk_3ABC");
        let b = AccountAddress::from_encoded("troll_3abc");
        assert!(a.same_account(&b));
        assert!(!a.same_account(&AccountAddress::from_encoded("troll_3abd")));
    }

    #[test]
    fn abbreviation_keeps_both_ends() {
        let addr = AccountAddress::from_encoded("troll_1234567890abcdefghijk");
        assert_eq!(addr.abbreviated(), "troll_123\u{2026}ghijk");
    }
}
