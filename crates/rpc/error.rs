use serde::{Deserialize, Serialize};

/// Mirrors the teacher's flat `RpcErr` enum: one variant per failure shape,
/// converted into a JSON-RPC error code/message pair at the response edge
/// rather than at the point the error is raised.
#[derive(Debug, thiserror::Error)]
pub enum RpcErr {
    #[error("method not found: {0}")]
    MethodNotFound(String),
    #[error("invalid params: {0}")]
    BadParams(String),
    #[error("missing parameter: {0}")]
    MissingParam(String),
    #[error("invalid key length: expected 32 bytes, got {0}")]
    InvalidKeyLength(usize),
    #[error("internal error: {0}")]
    Internal(String),
}

impl From<ubt_applier::ApplierError> for RpcErr {
    fn from(e: ubt_applier::ApplierError) -> Self {
        RpcErr::Internal(e.to_string())
    }
}

impl From<ubt_trie::TrieError> for RpcErr {
    fn from(e: ubt_trie::TrieError) -> Self {
        RpcErr::Internal(e.to_string())
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct RpcErrorMetadata {
    pub code: i32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<String>,
    pub message: String,
}

impl From<RpcErr> for RpcErrorMetadata {
    fn from(value: RpcErr) -> Self {
        match value {
            RpcErr::MethodNotFound(method) => RpcErrorMetadata {
                code: -32601,
                data: None,
                message: format!("Method not found: {method}"),
            },
            RpcErr::BadParams(context) => RpcErrorMetadata {
                code: -32602,
                data: None,
                message: format!("Invalid params: {context}"),
            },
            RpcErr::MissingParam(name) => RpcErrorMetadata {
                code: -32602,
                data: None,
                message: format!("Expected parameter: {name} is missing"),
            },
            RpcErr::InvalidKeyLength(got) => RpcErrorMetadata {
                code: -32602,
                data: None,
                message: format!("Invalid key length: expected 32 bytes, got {got}"),
            },
            RpcErr::Internal(context) => RpcErrorMetadata {
                code: -32603,
                data: None,
                message: format!("Internal error: {context}"),
            },
        }
    }
}
