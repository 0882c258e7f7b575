use serde::{Deserialize, Serialize};

#[derive(Debug, thiserror::Error)]
pub enum RpcErr {
    #[error("method not found: {0}")]
    MethodNotFound(String),
    #[error("invalid params: {0}")]
    BadParams(String),
    #[error("missing parameter: {0}")]
    MissingParam(String),
    #[error("fromSeq ({from_seq}) > toSeq ({to_seq})")]
    InvalidRange { from_seq: u64, to_seq: u64 },
    #[error("internal error: {0}")]
    Internal(String),
}

impl From<ubt_outbox::OutboxError> for RpcErr {
    fn from(e: ubt_outbox::OutboxError) -> Self {
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
            RpcErr::InvalidRange { from_seq, to_seq } => RpcErrorMetadata {
                code: -32602,
                data: None,
                message: format!("fromSeq ({from_seq}) > toSeq ({to_seq})"),
            },
            RpcErr::Internal(context) => RpcErrorMetadata {
                code: -32603,
                data: None,
                message: format!("Internal error: {context}"),
            },
        }
    }
}
