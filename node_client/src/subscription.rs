//! Push channel: confirmations for watched accounts over the node WebSocket.
//!
//! Messages may arrive duplicated or out of order, and the connection may
//! drop. Consumers re-fetch authoritative state when an event arrives, so
//! losing or repeating one is harmless.

use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tokio::sync::{mpsc, watch};
use tokio_tungstenite::tungstenite::Message;

use troll_types::{AccountAddress, BlockHash, RawAmount};

use crate::NodeError;

/// A confirmation pushed by the node.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PushEvent {
    pub account: AccountAddress,
    pub hash: BlockHash,
    #[serde(default)]
    pub amount: RawAmount,
    #[serde(default)]
    pub block: Value,
}

impl PushEvent {
    /// Accounts whose state this confirmation may have changed: the block's
    /// own account, plus the destination of a send.
    pub fn affected_accounts(&self) -> Vec<AccountAddress> {
        let mut accounts = vec![self.account.clone()];
        let is_send = self.block.get("subtype").and_then(Value::as_str) == Some("send");
        if let Some(dest) = self
            .block
            .get("link_as_account")
            .and_then(Value::as_str)
            .filter(|_| is_send)
        {
            let dest = AccountAddress::from_encoded(dest);
            if !dest.same_account(&self.account) {
                accounts.push(dest);
            }
        }
        accounts
    }

    /// Parse a raw WebSocket text frame. Frames that are not confirmations
    /// (acks, keepalives) yield `None`.
    pub fn from_frame(text: &str) -> Option<Self> {
        #[derive(Deserialize)]
        struct Frame {
            topic: Option<String>,
            message: Option<Value>,
        }

        let frame: Frame = serde_json::from_str(text).ok()?;
        if frame.topic.as_deref() != Some("confirmation") {
            return None;
        }
        match serde_json::from_value(frame.message?) {
            Ok(event) => Some(event),
            Err(e) => {
                tracing::debug!(error = %e, "ignoring malformed confirmation frame");
                None
            }
        }
    }
}

fn subscribe_frame(accounts: &[AccountAddress]) -> String {
    json!({
        "action": "subscribe",
        "topic": "confirmation",
        "ack": true,
        "options": { "accounts": accounts },
    })
    .to_string()
}

/// Maintains the WebSocket subscription, reconnecting after failures.
pub struct SubscriptionClient {
    url: String,
    reconnect_interval: Duration,
}

impl SubscriptionClient {
    pub fn new(url: impl Into<String>, reconnect_interval: Duration) -> Self {
        Self {
            url: url.into(),
            reconnect_interval,
        }
    }

    /// Forward confirmations for `accounts` to `events` until `shutdown`
    /// turns true or the receiver is dropped. Changes to `accounts` are sent
    /// to the node as a fresh subscription.
    pub async fn run(
        self,
        mut accounts: watch::Receiver<Vec<AccountAddress>>,
        events: mpsc::Sender<PushEvent>,
        mut shutdown: watch::Receiver<bool>,
    ) {
        loop {
            if *shutdown.borrow() || events.is_closed() {
                break;
            }
            match self.session(&mut accounts, &events, &mut shutdown).await {
                Ok(()) => break,
                Err(e) => {
                    tracing::warn!(url = %self.url, error = %e, "subscription dropped, reconnecting");
                }
            }
            let stop = tokio::select! {
                _ = tokio::time::sleep(self.reconnect_interval) => false,
                changed = shutdown.changed() => changed.is_err() || *shutdown.borrow(),
            };
            if stop {
                break;
            }
        }
        tracing::info!("subscription client stopped");
    }

    /// One connection. `Ok` means a clean stop, `Err` means reconnect.
    async fn session(
        &self,
        accounts: &mut watch::Receiver<Vec<AccountAddress>>,
        events: &mpsc::Sender<PushEvent>,
        shutdown: &mut watch::Receiver<bool>,
    ) -> Result<(), NodeError> {
        let (stream, _) = tokio_tungstenite::connect_async(self.url.as_str())
            .await
            .map_err(|e| NodeError::Unreachable(e.to_string()))?;
        let (mut sink, mut source) = stream.split();
        tracing::info!(url = %self.url, "subscription connected");

        let initial = subscribe_frame(&accounts.borrow_and_update());
        sink.send(Message::text(initial))
            .await
            .map_err(|e| NodeError::Unreachable(e.to_string()))?;

        loop {
            tokio::select! {
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        let _ = sink.close().await;
                        return Ok(());
                    }
                }
                changed = accounts.changed() => {
                    if changed.is_err() {
                        return Ok(());
                    }
                    let frame = subscribe_frame(&accounts.borrow_and_update());
                    sink.send(Message::text(frame))
                        .await
                        .map_err(|e| NodeError::Unreachable(e.to_string()))?;
                }
                message = source.next() => {
                    match message {
                        Some(Ok(Message::Text(text))) => {
                            if let Some(event) = PushEvent::from_frame(text.as_str()) {
                                tracing::debug!(account = %event.account, hash = %event.hash, "confirmation pushed");
                                if events.send(event).await.is_err() {
                                    return Ok(());
                                }
                            }
                        }
                        Some(Ok(Message::Close(_))) | None => {
                            return Err(NodeError::Unreachable("connection closed".into()));
                        }
                        Some(Ok(_)) => {}
                        Some(Err(e)) => return Err(NodeError::Unreachable(e.to_string())),
                    }
                }
            }
        }
    }
}
