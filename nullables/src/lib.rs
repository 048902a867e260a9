//! Nullable infrastructure for deterministic testing.
//!
//! The wallet talks to the outside world through two traits: `NodeRpc` and
//! `DeviceTransport`. This crate provides in-memory implementations that:
//! - Behave like the real thing for the calls the wallet makes
//! - Can be scripted to fail, stall or answer unusually
//! - Record every call for assertions
//! - Never touch the network
//!
//! Usage: construct the wallet with these instead of the HTTP client or a
//! real device.

pub mod node;
pub mod signing_device;

pub use node::NullNode;
pub use signing_device::NullSigningDevice;
