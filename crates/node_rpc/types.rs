use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::RpcErr;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RpcRequestId {
    Number(u64),
    String(String),
}

#[derive(Debug, Deserialize)]
pub struct RpcRequest {
    pub id: RpcRequestId,
    pub jsonrpc: String,
    pub method: String,
    pub params: Option<Vec<Value>>,
}

impl RpcRequest {
    pub fn require_ubt_namespace(&self) -> Result<(), RpcErr> {
        if self.method.starts_with("ubt_") {
            Ok(())
        } else {
            Err(RpcErr::MethodNotFound(self.method.clone()))
        }
    }
}

#[derive(Debug, Serialize)]
pub struct RpcSuccessResponse {
    pub id: RpcRequestId,
    pub jsonrpc: String,
    pub result: Value,
}

#[derive(Debug, Serialize)]
pub struct RpcErrorResponse {
    pub id: RpcRequestId,
    pub jsonrpc: String,
    pub error: crate::error::RpcErrorMetadata,
}
