//! Account-chain state blocks.
//!
//! Each account has its own chain (Nano's block-lattice). Every block carries
//! the full account state after it applies, so a block's balance is absolute,
//! never a delta. This crate builds those blocks from an account's current
//! head, computes their canonical hash and renders them in the node's JSON form.
//! Validation and consensus are the node's job.

pub mod block;
pub mod builder;
pub mod error;
pub mod json;

pub use block::{Block, BlockKind, Link};
pub use builder::{BlockBuilder, ChainHead};
pub use error::BuildError;
pub use json::BlockJson;
