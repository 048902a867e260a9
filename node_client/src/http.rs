//! JSON-RPC over HTTP.

use std::collections::HashMap;
use std::time::Duration;

use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::{json, Value};

use troll_ledger::{Block, BlockJson};
use troll_types::{AccountAddress, BlockHash, RawAmount};
use troll_work::WorkNonce;

use crate::rpc::{AccountInfo, NodeRpc, PendingBlock, RepresentativeWeight};
use crate::{NodeError, RejectReason};

/// HTTP client for the node's JSON-RPC endpoint.
///
/// Wraps `reqwest::Client` with the node URL and a bounded timeout; a request
/// that times out or cannot connect fails with [`NodeError::Unreachable`].
#[derive(Clone)]
pub struct HttpNodeClient {
    http: reqwest::Client,
    node_url: String,
}

impl HttpNodeClient {
    /// Create a client for `node_url` (e.g. `http://127.0.0.1:7076`).
    pub fn new(node_url: impl Into<String>, timeout: Duration) -> Result<Self, NodeError> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .connect_timeout(timeout.min(Duration::from_secs(10)))
            .build()
            .map_err(|e| NodeError::Unreachable(format!("failed to create HTTP client: {e}")))?;
        Ok(Self {
            http,
            node_url: node_url.into(),
        })
    }

    pub fn node_url(&self) -> &str {
        &self.node_url
    }

    /// Post `{action, ..params}` and return the response object. A response
    /// carrying an `error` field becomes [`NodeError::Rejected`].
    async fn rpc_call(&self, action: &str, params: Value) -> Result<Value, NodeError> {
        let mut body = params;
        body.as_object_mut()
            .ok_or_else(|| NodeError::InvalidResponse("params must be a JSON object".into()))?
            .insert("action".to_string(), json!(action));

        let response = self
            .http
            .post(&self.node_url)
            .json(&body)
            .send()
            .await
            .map_err(|e| {
                tracing::warn!(action, error = %e, "node request failed");
                NodeError::Unreachable(e.to_string())
            })?;

        if !response.status().is_success() {
            return Err(NodeError::Unreachable(format!(
                "node returned HTTP {}",
                response.status()
            )));
        }

        let json: Value = response.json().await.map_err(|e| {
            if e.is_timeout() {
                NodeError::Unreachable(e.to_string())
            } else {
                NodeError::InvalidResponse(e.to_string())
            }
        })?;

        if let Some(err) = json.get("error").and_then(Value::as_str) {
            tracing::debug!(action, error = err, "node rejected request");
            return Err(NodeError::rejected(err));
        }
        Ok(json)
    }
}

fn decode<T: DeserializeOwned>(action: &str, value: Value) -> Result<T, NodeError> {
    serde_json::from_value(value)
        .map_err(|e| NodeError::InvalidResponse(format!("{action}: {e}")))
}

pub(crate) fn parse_account_info(value: Value) -> Result<AccountInfo, NodeError> {
    decode("account_info", value)
}

/// `pending` answers `{"blocks": {hash: {amount, source}}}`, or
/// `{"blocks": ""}` when there is nothing pending.
pub(crate) fn parse_pending(value: Value) -> Result<Vec<PendingBlock>, NodeError> {
    #[derive(Deserialize)]
    struct Entry {
        amount: RawAmount,
        #[serde(default)]
        source: Option<AccountAddress>,
    }

    let blocks = match value.get("blocks") {
        Some(Value::Object(map)) => map.clone(),
        Some(Value::String(s)) if s.is_empty() => return Ok(Vec::new()),
        None | Some(Value::Null) => return Ok(Vec::new()),
        Some(other) => {
            return Err(NodeError::InvalidResponse(format!(
                "pending: unexpected blocks value {other}"
            )))
        }
    };

    let mut pending = Vec::with_capacity(blocks.len());
    for (hash, entry) in blocks {
        let hash = BlockHash::from_hex(&hash)
            .map_err(|e| NodeError::InvalidResponse(format!("pending: {e}")))?;
        let entry: Entry = decode("pending", entry)?;
        pending.push(PendingBlock {
            hash,
            amount: entry.amount,
            source: entry.source,
        });
    }
    pending.sort_by(|a, b| b.amount.cmp(&a.amount).then(a.hash.cmp(&b.hash)));
    Ok(pending)
}

pub(crate) fn parse_representatives(value: Value) -> Result<Vec<RepresentativeWeight>, NodeError> {
    #[derive(Deserialize)]
    struct Response {
        representatives: HashMap<AccountAddress, RawAmount>,
    }

    let response: Response = decode("representatives", value)?;
    let mut reps: Vec<RepresentativeWeight> = response
        .representatives
        .into_iter()
        .map(|(address, weight)| RepresentativeWeight { address, weight })
        .collect();
    reps.sort_by(|a, b| b.weight.cmp(&a.weight).then(a.address.cmp(&b.address)));
    Ok(reps)
}

impl NodeRpc for HttpNodeClient {
    async fn account_info(&self, account: &AccountAddress) -> Result<Option<AccountInfo>, NodeError> {
        let result = self
            .rpc_call(
                "account_info",
                json!({ "account": account, "representative": "true", "pending": "true" }),
            )
            .await;
        match result {
            Ok(value) => parse_account_info(value).map(Some),
            Err(NodeError::Rejected {
                reason: RejectReason::AccountNotFound,
                ..
            }) => Ok(None),
            Err(e) => Err(e),
        }
    }

    async fn validate_account_number(&self, address: &str) -> Result<bool, NodeError> {
        let value = self
            .rpc_call("validate_account_number", json!({ "account": address }))
            .await?;
        Ok(matches!(
            value.get("valid").and_then(Value::as_str),
            Some("1") | Some("true")
        ))
    }

    async fn process(&self, block: &Block) -> Result<BlockHash, NodeError> {
        let value = self
            .rpc_call(
                "process",
                json!({
                    "json_block": "true",
                    "subtype": block.subtype(),
                    "block": BlockJson::from(block),
                }),
            )
            .await?;

        #[derive(Deserialize)]
        struct Response {
            hash: BlockHash,
        }
        Ok(decode::<Response>("process", value)?.hash)
    }

    async fn work_generate(&self, root: &BlockHash, difficulty: u64) -> Result<WorkNonce, NodeError> {
        let value = self
            .rpc_call(
                "work_generate",
                json!({ "hash": root, "difficulty": format!("{difficulty:016x}") }),
            )
            .await?;

        #[derive(Deserialize)]
        struct Response {
            work: WorkNonce,
        }
        Ok(decode::<Response>("work_generate", value)?.work)
    }

    async fn representatives_with_weight(&self) -> Result<Vec<RepresentativeWeight>, NodeError> {
        let value = self.rpc_call("representatives", json!({})).await?;
        parse_representatives(value)
    }

    async fn pending(&self, account: &AccountAddress, count: u32) -> Result<Vec<PendingBlock>, NodeError> {
        let value = self
            .rpc_call(
                "pending",
                json!({ "account": account, "count": count.to_string(), "source": "true" }),
            )
            .await?;
        parse_pending(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn account_info_accepts_receivable_alias() {
        let info = parse_account_info(json!({
            "frontier": "AB".repeat(32),
            "balance": "5000000",
            "representative": "troll_1rep",
            "receivable": "12",
            "block_count": "4"
        }))
        .unwrap();
        assert_eq!(info.balance, RawAmount::new(5_000_000));
        assert_eq!(info.pending, RawAmount::new(12));
        assert_eq!(info.frontier, BlockHash::new([0xab; 32]));
    }

    #[test]
    fn pending_parses_map_and_empty_string() {
        let raw = format!(
            r#"{{"blocks": {{
                "{}": {{ "amount": "10", "source": "troll_1src" }},
                "{}": {{ "amount": "20", "source": "troll_1src" }}
            }}}}"#,
            "01".repeat(32),
            "02".repeat(32)
        );
        let pending = parse_pending(serde_json::from_str(&raw).unwrap()).unwrap();
        assert_eq!(pending.len(), 2);
        assert_eq!(pending[0].amount, RawAmount::new(20));
        assert_eq!(pending[0].hash, BlockHash::new([2; 32]));

        assert!(parse_pending(json!({ "blocks": "" })).unwrap().is_empty());
        assert!(parse_pending(json!({ "blocks": 5 })).is_err());
    }

    #[test]
    fn representatives_sorted_by_weight() {
        let reps = parse_representatives(json!({
            "representatives": { "troll_1a": "5", "troll_1b": "50" }
        }))
        .unwrap();
        assert_eq!(reps[0].address.as_str(), "troll_1b");
        assert_eq!(reps[1].weight, RawAmount::new(5));
    }

    #[tokio::test]
    async fn unreachable_node_is_classified() {
        // Port 9 (discard) on localhost is essentially never an RPC server.
        let client = HttpNodeClient::new("http://127.0.0.1:9", Duration::from_millis(200)).unwrap();
        let err = client
            .account_info(&AccountAddress::from_encoded("troll_1abc"))
            .await
            .unwrap_err();
        assert!(matches!(err, NodeError::Unreachable(_)), "got {err:?}");
    }
}
