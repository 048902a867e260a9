//! Fundamental types for the Trollar wallet engine.
//!
//! This crate defines the core types shared across every other crate in the workspace:
//! account addresses, block hashes, raw amounts and their human denominations,
//! and key material wrappers.

pub mod address;
pub mod amount;
pub mod block;
pub mod error;
pub mod keys;
pub mod units;

pub use address::AccountAddress;
pub use amount::RawAmount;
pub use block::BlockHash;
pub use error::TypesError;
pub use keys::{KeyPair, PrivateKey, PublicKey, Signature};
pub use units::{split_raw, DecimalAmount, Denomination, DUST_THRESHOLD};
