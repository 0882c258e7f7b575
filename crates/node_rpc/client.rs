//! The consumer's `outboxClient` collaborator (spec.md §4.G), a thin
//! `reqwest`-based JSON-RPC client grounded on `ethrex-rpc`'s
//! `EngineClient` (same request/response envelope, same "serialize a
//! method+params, POST, deserialize success-or-error" shape).

use reqwest::Client;
use serde::Deserialize;
use serde_json::{json, Value};
use ubt_common::Envelope;

#[derive(Debug, thiserror::Error)]
pub enum OutboxClientError {
    #[error("transport error: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("rpc error {code}: {message}")]
    Rpc { code: i32, message: String },
    #[error("failed to deserialize response: {0}")]
    Deserialize(#[from] serde_json::Error),
}

#[derive(Deserialize, Debug)]
struct RpcErrorMetadata {
    code: i32,
    message: String,
}

#[derive(Deserialize, Debug)]
#[serde(untagged)]
enum RpcResponse {
    Success { result: Value },
    Error { error: RpcErrorMetadata },
}

pub struct OutboxRpcClient {
    client: Client,
    endpoint: String,
}

impl OutboxRpcClient {
    pub fn new(endpoint: &str) -> Self {
        OutboxRpcClient {
            client: Client::new(),
            endpoint: endpoint.to_string(),
        }
    }

    async fn call(&self, method: &str, params: Vec<Value>) -> Result<Value, OutboxClientError> {
        let request = json!({
            "id": 1,
            "jsonrpc": "2.0",
            "method": method,
            "params": params,
        });
        let response = self
            .client
            .post(&self.endpoint)
            .header("content-type", "application/json")
            .json(&request)
            .send()
            .await?
            .json::<RpcResponse>()
            .await?;
        match response {
            RpcResponse::Success { result } => Ok(result),
            RpcResponse::Error { error } => Err(OutboxClientError::Rpc {
                code: error.code,
                message: error.message,
            }),
        }
    }

    pub async fn latest_seq(&self) -> Result<u64, OutboxClientError> {
        let result = self.call("ubt_latestSeq", vec![]).await?;
        Ok(serde_json::from_value(result)?)
    }

    pub async fn get_event(&self, seq: u64) -> Result<Option<Envelope>, OutboxClientError> {
        let result = self.call("ubt_getEvent", vec![json!(seq)]).await?;
        Ok(serde_json::from_value(result)?)
    }

    pub async fn get_events(&self, from_seq: u64, to_seq: u64) -> Result<Vec<Envelope>, OutboxClientError> {
        let result = self
            .call("ubt_getEvents", vec![json!(from_seq), json!(to_seq)])
            .await?;
        Ok(serde_json::from_value(result)?)
    }

    pub async fn compact_outbox_below(&self, safe_seq: u64) -> Result<(), OutboxClientError> {
        self.call("ubt_compactOutboxBelow", vec![json!(safe_seq)]).await?;
        Ok(())
    }
}
