//! Persisted wallet state and its schema migrations.
//!
//! State is one JSON document carrying a schema version. Older documents are
//! brought up to date once, when they are loaded, by running each migration
//! step in order; the migrated document is written back on the next save.

use std::path::Path;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use troll_types::AccountAddress;
use troll_work::PersistedWork;

use crate::keystore::EncryptedSeed;
use crate::representatives::RepresentativeBook;
use crate::store::PersistedAccount;
use crate::WalletError;

/// The schema version that the current code writes.
pub const CURRENT_SCHEMA_VERSION: u32 = 2;

/// Everything the wallet keeps between runs.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct PersistedState {
    pub version: u32,
    /// Absent for wallets whose keys live on a signing device.
    #[serde(default)]
    pub keystore: Option<EncryptedSeed>,
    #[serde(default)]
    pub accounts: Vec<PersistedAccount>,
    #[serde(default)]
    pub work: Vec<PersistedWork>,
    #[serde(default)]
    pub representatives: RepresentativeBook,
}

impl PersistedState {
    pub fn new() -> Self {
        Self {
            version: CURRENT_SCHEMA_VERSION,
            ..Self::default()
        }
    }

    /// Parse a state document, migrating it if it is older than
    /// [`CURRENT_SCHEMA_VERSION`].
    pub fn from_json(json: &str) -> Result<Self, WalletError> {
        let mut value: Value = serde_json::from_str(json)?;
        Migrator::run(&mut value)?;
        Ok(serde_json::from_value(value)?)
    }

    pub fn to_json(&self) -> Result<String, WalletError> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Load state from `path`, or `None` if no wallet was saved there yet.
    pub fn load(path: &Path) -> Result<Option<Self>, WalletError> {
        let json = match std::fs::read_to_string(path) {
            Ok(json) => json,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        Self::from_json(&json).map(Some)
    }

    /// Write state to `path`, replacing any previous file in one step.
    pub fn save(&self, path: &Path) -> Result<(), WalletError> {
        let json = self.to_json()?;
        let tmp = path.with_extension("tmp");
        std::fs::write(&tmp, json)?;
        std::fs::rename(&tmp, path)?;
        tracing::debug!(path = %path.display(), accounts = self.accounts.len(), "wallet state saved");
        Ok(())
    }
}

/// Runs migrations to bring a state document up to date.
pub struct Migrator;

impl Migrator {
    /// Check the document's version and run any needed migrations.
    ///
    /// - A missing version means version 1, the first format that was
    ///   written to disk.
    /// - If the version matches [`CURRENT_SCHEMA_VERSION`], this is a no-op.
    /// - A version newer than this code supports is refused.
    ///
    /// Returns the version the document had before migrating.
    pub fn run(state: &mut Value) -> Result<u32, WalletError> {
        let found = match state.get("version") {
            None => 1,
            Some(v) => v
                .as_u64()
                .and_then(|v| u32::try_from(v).ok())
                .ok_or_else(|| WalletError::Migration(format!("invalid schema version: {v}")))?,
        };

        if found == CURRENT_SCHEMA_VERSION {
            return Ok(found);
        }

        if found > CURRENT_SCHEMA_VERSION {
            return Err(WalletError::Migration(format!(
                "wallet schema version {} is newer than supported version {}",
                found, CURRENT_SCHEMA_VERSION
            )));
        }

        for version in found..CURRENT_SCHEMA_VERSION {
            tracing::info!(from = version, to = version + 1, "running wallet state migration");
            run_migration(state, version, version + 1)?;
        }

        if let Value::Object(map) = state {
            map.insert("version".into(), CURRENT_SCHEMA_VERSION.into());
        }
        tracing::info!(version = CURRENT_SCHEMA_VERSION, "wallet state migration complete");
        Ok(found)
    }
}

fn run_migration(state: &mut Value, from: u32, to: u32) -> Result<(), WalletError> {
    match (from, to) {
        (0, 1) => Ok(()),
        (1, 2) => {
            // v2: addresses use the `troll_` prefix.
            let rewritten = rewrite_legacy_addresses(state);
            tracing::info!(rewritten, "legacy address prefixes rewritten");
            Ok(())
        }
        _ => Err(WalletError::Migration(format!(
            "unknown migration: {} -> {}",
            from, to
        ))),
    }
}

fn rewrite_legacy_addresses(value: &mut Value) -> usize {
    match value {
        Value::String(s) if s.starts_with(AccountAddress::LEGACY_PREFIX) => {
            *s = AccountAddress::from_encoded(s.as_str()).with_current_prefix().to_string();
            1
        }
        Value::Array(items) => items.iter_mut().map(rewrite_legacy_addresses).sum(),
        Value::Object(map) => map.values_mut().map(rewrite_legacy_addresses).sum(),
        _ => 0,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use troll_types::{BlockHash, PublicKey, RawAmount};

    use crate::store::AccountState;

    #[test]
    fn unknown_migration_is_error() {
        let mut state = json!({});
        assert!(run_migration(&mut state, 99, 100).is_err());
    }

    #[test]
    fn v1_addresses_are_rewritten() {
        let mut state = json!({
            "version": 1,
            "accounts": [{
                "index": 0,
                "address": "ttk_1abc",
                "public_key": vec![0u8; 32],
                "balance": "10",
                "pending": "0",
                "frontier": null,
                "representative": "ttk_1rep"
            }],
            "representatives": [{ "address": "ttk_1rep", "alias": "Rep" }]
        });
        assert_eq!(Migrator::run(&mut state).unwrap(), 1);
        assert_eq!(state["version"], 2);
        assert_eq!(state["accounts"][0]["address"], "troll_1abc");
        assert_eq!(state["accounts"][0]["representative"], "troll_1rep");
        assert_eq!(state["representatives"][0]["address"], "troll_1rep");
    }

    #[test]
    fn missing_version_is_treated_as_v1() {
        let state = PersistedState::from_json(r#"{"representatives":[{"address":"ttk_1x","alias":"x"}]}"#)
            .unwrap();
        assert_eq!(state.version, CURRENT_SCHEMA_VERSION);
        assert_eq!(state.representatives.entries()[0].address.as_str(), "troll_1x");
    }

    #[test]
    fn current_version_is_untouched() {
        let mut state = json!({ "version": 2, "note": "ttk_1keep" });
        assert_eq!(Migrator::run(&mut state).unwrap(), 2);
        assert_eq!(state["note"], "ttk_1keep");
    }

    #[test]
    fn newer_version_is_refused() {
        let mut state = json!({ "version": 9 });
        assert!(matches!(
            Migrator::run(&mut state),
            Err(WalletError::Migration(_))
        ));
    }

    #[test]
    fn save_and_load_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("wallet.json");
        assert_eq!(PersistedState::load(&path).unwrap(), None);

        let mut state = PersistedState::new();
        state.accounts.push(PersistedAccount {
            index: 0,
            address: AccountAddress::from_encoded("troll_1abc"),
            public_key: PublicKey([4; 32]),
            state: AccountState {
                balance: RawAmount::new(5),
                pending: RawAmount::ZERO,
                frontier: Some(BlockHash::new([1; 32])),
                representative: None,
            },
        });
        state.save(&path).unwrap();
        assert_eq!(PersistedState::load(&path).unwrap(), Some(state));
    }
}
