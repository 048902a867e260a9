//! Wallet engine for Trollar accounts.
//!
//! Holds the state of every account the wallet controls and drives
//! transactions against a node:
//! - Ledger state store with optimistic updates and reconciliation
//! - Transaction orchestration (send, receive, representative change)
//! - Push and poll synchronisation with the node
//! - Encrypted keystore and versioned persisted state
//! - Representative recommendations and overview
//!
//! [`Wallet`] ties the pieces together; each of them can also be used on
//! its own.

pub mod config;
pub mod error;
pub mod keystore;
pub mod migration;
pub mod orchestrator;
pub mod representatives;
pub mod store;
pub mod sync;
pub mod wallet;

pub use config::{SignerKind, WalletConfig};
pub use error::WalletError;
pub use keystore::{decrypt_seed, encrypt_seed, EncryptedSeed, KdfParams};
pub use migration::{Migrator, PersistedState, CURRENT_SCHEMA_VERSION};
pub use orchestrator::{
    AbortHandle, AbortSignal, DestinationStatus, Orchestrator, OrchestratorSettings, PreparedSend,
    RepresentativeChange, TxState, TxTransition,
};
pub use representatives::{
    KnownRepresentative, RecommendedRepresentative, RepresentativeBook, RepresentativeOverview,
};
pub use store::{
    AccountState, AccountView, LedgerStore, PendingTransaction, ReconcileOutcome, StoreEvent,
};
pub use sync::Synchronizer;
pub use wallet::{StartupNotice, SyncHandle, Wallet};
