//! Talking to the node.
//!
//! Two channels:
//! - [`NodeRpc`], request/response calls. [`HttpNodeClient`] is the JSON-RPC
//!   over HTTP implementation.
//! - [`SubscriptionClient`], a WebSocket feed of confirmations for watched
//!   accounts. Its events are hints to re-fetch state, never state itself.

pub mod error;
pub mod http;
pub mod rpc;
pub mod subscription;

pub use error::{NodeError, RejectReason};
pub use http::HttpNodeClient;
pub use rpc::{AccountInfo, NodeRpc, PendingBlock, RepresentativeWeight};
pub use subscription::{PushEvent, SubscriptionClient};
