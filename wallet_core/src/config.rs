//! Wallet configuration with TOML file support.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use troll_crypto::validate_address;
use troll_node_client::HttpNodeClient;
use troll_types::AccountAddress;
use troll_utils::{init_logging, LogFormat};
use troll_work::WorkThresholds;

use crate::WalletError;

/// Which signing backend the wallet uses.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SignerKind {
    /// Keys derived from the seed held in the encrypted keystore.
    #[default]
    Local,
    /// Keys held by an external signing device.
    Hardware,
}

/// Configuration for a wallet engine.
///
/// Can be loaded from a TOML file via [`WalletConfig::from_toml_file`] or
/// built programmatically (e.g. for tests).
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct WalletConfig {
    /// Node JSON-RPC endpoint.
    #[serde(default = "default_rpc_url")]
    pub rpc_url: String,

    /// Node WebSocket endpoint for confirmations.
    #[serde(default = "default_websocket_url")]
    pub websocket_url: String,

    /// Bound on every RPC call; expiry counts as the node being unreachable.
    #[serde(default = "default_rpc_timeout_secs")]
    pub rpc_timeout_secs: u64,

    #[serde(default)]
    pub signer: SignerKind,

    /// Maximum number of precomputed work entries kept.
    #[serde(default = "default_work_cache_capacity")]
    pub work_cache_capacity: usize,

    /// Ask the node for work when none is cached. Node work is always
    /// checked locally before use.
    #[serde(default = "default_true")]
    pub remote_work_fallback: bool,

    /// Representative for accounts opened by a receive. Each account
    /// represents itself when unset.
    #[serde(default)]
    pub default_representative: Option<AccountAddress>,

    /// Difficulty for send and change blocks, as 16 hex digits.
    #[serde(default = "default_work_base_threshold")]
    pub work_base_threshold: String,

    /// Seconds between full re-fetches of every account.
    #[serde(default = "default_refresh_interval_secs")]
    pub refresh_interval_secs: u64,

    /// Seconds to wait before reconnecting a dropped subscription.
    #[serde(default = "default_reconnect_interval_secs")]
    pub reconnect_interval_secs: u64,

    /// Where wallet state (keystore, accounts, work cache) is persisted.
    #[serde(default = "default_state_path")]
    pub state_path: PathBuf,

    #[serde(default)]
    pub log_format: LogFormat,

    /// Log level filter, e.g. "info" or "debug,troll_work=trace".
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

// ── Serde default helpers ──────────────────────────────────────────────

fn default_rpc_url() -> String {
    "http://127.0.0.1:7076".to_string()
}

fn default_websocket_url() -> String {
    "ws://127.0.0.1:7078".to_string()
}

fn default_rpc_timeout_secs() -> u64 {
    15
}

fn default_work_cache_capacity() -> usize {
    64
}

fn default_true() -> bool {
    true
}

fn default_work_base_threshold() -> String {
    format!("{:016x}", WorkThresholds::default().base)
}

fn default_refresh_interval_secs() -> u64 {
    60
}

fn default_reconnect_interval_secs() -> u64 {
    5
}

fn default_state_path() -> PathBuf {
    PathBuf::from("./trollar_wallet.json")
}

fn default_log_level() -> String {
    "info".to_string()
}

// ── Impl ───────────────────────────────────────────────────────────────

impl WalletConfig {
    /// Load configuration from a TOML file.
    pub fn from_toml_file(path: impl AsRef<Path>) -> Result<Self, WalletError> {
        let content =
            std::fs::read_to_string(path).map_err(|e| WalletError::Config(e.to_string()))?;
        Self::from_toml_str(&content)
    }

    /// Parse configuration from a TOML string and validate it.
    pub fn from_toml_str(s: &str) -> Result<Self, WalletError> {
        let config: Self = toml::from_str(s).map_err(|e| WalletError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn to_toml_string(&self) -> Result<String, WalletError> {
        toml::to_string_pretty(self).map_err(|e| WalletError::Config(e.to_string()))
    }

    pub fn validate(&self) -> Result<(), WalletError> {
        if self.rpc_timeout_secs == 0 {
            return Err(WalletError::Config("rpc_timeout_secs must be positive".into()));
        }
        if self.work_cache_capacity == 0 {
            return Err(WalletError::Config("work_cache_capacity must be positive".into()));
        }
        if self.refresh_interval_secs == 0 {
            return Err(WalletError::Config("refresh_interval_secs must be positive".into()));
        }
        if let Some(rep) = &self.default_representative {
            if !validate_address(rep.as_str()) {
                return Err(WalletError::Config(format!(
                    "default_representative is not a valid address: {rep}"
                )));
            }
        }
        self.work_thresholds()?;
        Ok(())
    }

    pub fn rpc_timeout(&self) -> Duration {
        Duration::from_secs(self.rpc_timeout_secs)
    }

    /// HTTP client for the configured node.
    pub fn node_client(&self) -> Result<HttpNodeClient, WalletError> {
        Ok(HttpNodeClient::new(self.rpc_url.clone(), self.rpc_timeout())?)
    }

    pub fn refresh_interval(&self) -> Duration {
        Duration::from_secs(self.refresh_interval_secs)
    }

    pub fn reconnect_interval(&self) -> Duration {
        Duration::from_secs(self.reconnect_interval_secs)
    }

    /// Install the process-wide subscriber described by `log_format` and
    /// `log_level`. For applications; returns `false` if one was already set.
    pub fn init_logging(&self) -> bool {
        init_logging(self.log_format, &self.log_level)
    }

    pub fn work_thresholds(&self) -> Result<WorkThresholds, WalletError> {
        let hex = self.work_base_threshold.trim_start_matches("0x");
        u64::from_str_radix(hex, 16)
            .map(WorkThresholds::with_base)
            .map_err(|_| {
                WalletError::Config(format!(
                    "work_base_threshold is not a hex number: {}",
                    self.work_base_threshold
                ))
            })
    }
}

impl Default for WalletConfig {
    fn default() -> Self {
        Self {
            rpc_url: default_rpc_url(),
            websocket_url: default_websocket_url(),
            rpc_timeout_secs: default_rpc_timeout_secs(),
            signer: SignerKind::default(),
            work_cache_capacity: default_work_cache_capacity(),
            remote_work_fallback: default_true(),
            default_representative: None,
            work_base_threshold: default_work_base_threshold(),
            refresh_interval_secs: default_refresh_interval_secs(),
            reconnect_interval_secs: default_reconnect_interval_secs(),
            state_path: default_state_path(),
            log_format: LogFormat::default(),
            log_level: default_log_level(),
        }
    }
}
