use serde_json::{json, Value};

use ubt_common::{Address, H256};

use crate::context::RpcApiContext;
use crate::error::RpcErr;
use crate::types::RpcRequest;

/// Mirrors the teacher's `RpcHandler`: a request type parses itself out of
/// the raw JSON params, then handles itself against the shared context.
pub trait RpcHandler: Sized {
    fn parse(params: &Option<Vec<Value>>) -> Result<Self, RpcErr>;

    fn call(req: &RpcRequest, context: RpcApiContext) -> Result<Value, RpcErr> {
        let request = Self::parse(&req.params)?;
        request.handle(context)
    }

    fn handle(&self, context: RpcApiContext) -> Result<Value, RpcErr>;
}

/// `addr, blockRef` is a block number, block hash, or the tag
/// `latest`/`finalized` (spec.md §4.H). `finalized` has no distinct notion
/// in this repo — both tags resolve to the applier's current in-memory
/// root, since nothing downstream tracks a separate finality boundary.
#[derive(Debug, Clone, Copy)]
pub enum BlockRef {
    Number(u64),
    Hash(H256),
    Latest,
    Finalized,
}

impl BlockRef {
    fn parse(value: &Value) -> Result<Self, RpcErr> {
        match value {
            Value::String(s) if s == "latest" => Ok(BlockRef::Latest),
            Value::String(s) if s == "finalized" => Ok(BlockRef::Finalized),
            Value::String(s) => {
                let bytes = hex::decode(s.trim_start_matches("0x"))
                    .map_err(|e| RpcErr::BadParams(format!("blockRef: {e}")))?;
                if bytes.len() == 32 {
                    let mut buf = [0u8; 32];
                    buf.copy_from_slice(&bytes);
                    Ok(BlockRef::Hash(H256(buf)))
                } else {
                    let n = s
                        .trim_start_matches("0x")
                        .parse::<u64>()
                        .map_err(|e| RpcErr::BadParams(format!("blockRef: {e}")))?;
                    Ok(BlockRef::Number(n))
                }
            }
            Value::Number(n) => n
                .as_u64()
                .map(BlockRef::Number)
                .ok_or_else(|| RpcErr::BadParams("blockRef must be a non-negative integer".into())),
            other => Err(RpcErr::BadParams(format!("invalid blockRef: {other}"))),
        }
    }
}

fn param(params: &Option<Vec<Value>>, index: usize, name: &str) -> Result<Value, RpcErr> {
    params
        .as_ref()
        .and_then(|p| p.get(index))
        .cloned()
        .ok_or_else(|| RpcErr::MissingParam(name.into()))
}

fn parse_address(value: &Value) -> Result<Address, RpcErr> {
    let s = value
        .as_str()
        .ok_or_else(|| RpcErr::BadParams("address must be a hex string".into()))?;
    let bytes = hex::decode(s.trim_start_matches("0x"))
        .map_err(|e| RpcErr::BadParams(format!("address: {e}")))?;
    if bytes.len() != 20 {
        return Err(RpcErr::BadParams(format!(
            "address must be 20 bytes, got {}",
            bytes.len()
        )));
    }
    Ok(Address::from_slice(&bytes))
}

fn parse_h256(value: &Value) -> Result<H256, RpcErr> {
    let s = value
        .as_str()
        .ok_or_else(|| RpcErr::BadParams("expected a 32-byte hex string".into()))?;
    let bytes = hex::decode(s.trim_start_matches("0x"))
        .map_err(|e| RpcErr::BadParams(format!("key: {e}")))?;
    if bytes.len() != 32 {
        return Err(RpcErr::InvalidKeyLength(bytes.len()));
    }
    let mut buf = [0u8; 32];
    buf.copy_from_slice(&bytes);
    Ok(H256(buf))
}

fn resolve_trie(context: &RpcApiContext, block_ref: BlockRef) -> Result<ubt_trie::Trie, RpcErr> {
    let applier = context
        .applier
        .read()
        .map_err(|_| RpcErr::Internal("applier lock poisoned".into()))?;
    match block_ref {
        BlockRef::Latest | BlockRef::Finalized => Ok(applier.trie_at(applier.root())),
        BlockRef::Number(n) => applier
            .root_for_block_number(n)
            .map(|root| applier.trie_at(root))
            .ok_or_else(|| RpcErr::BadParams(format!("unknown block number {n}"))),
        BlockRef::Hash(h) => applier
            .root_for_block_hash(h)
            .map(|root| applier.trie_at(root))
            .ok_or_else(|| RpcErr::BadParams(format!("unknown block hash {h:?}"))),
    }
}

pub struct GetBalanceRequest {
    address: Address,
    block_ref: BlockRef,
}

impl RpcHandler for GetBalanceRequest {
    fn parse(params: &Option<Vec<Value>>) -> Result<Self, RpcErr> {
        Ok(GetBalanceRequest {
            address: parse_address(&param(params, 0, "address")?)?,
            block_ref: BlockRef::parse(&param(params, 1, "blockRef")?)?,
        })
    }

    fn handle(&self, context: RpcApiContext) -> Result<Value, RpcErr> {
        let trie = resolve_trie(&context, self.block_ref)?;
        let balance = trie
            .get_account(self.address)?
            .map(|(_, balance, _)| balance)
            .unwrap_or(0);
        Ok(json!(balance.to_string()))
    }
}

pub struct GetNonceRequest {
    address: Address,
    block_ref: BlockRef,
}

impl RpcHandler for GetNonceRequest {
    fn parse(params: &Option<Vec<Value>>) -> Result<Self, RpcErr> {
        Ok(GetNonceRequest {
            address: parse_address(&param(params, 0, "address")?)?,
            block_ref: BlockRef::parse(&param(params, 1, "blockRef")?)?,
        })
    }

    fn handle(&self, context: RpcApiContext) -> Result<Value, RpcErr> {
        let trie = resolve_trie(&context, self.block_ref)?;
        let nonce = trie.get_account(self.address)?.map(|(nonce, _, _)| nonce).unwrap_or(0);
        Ok(json!(nonce))
    }
}

pub struct GetCodeRequest {
    address: Address,
    block_ref: BlockRef,
}

impl RpcHandler for GetCodeRequest {
    fn parse(params: &Option<Vec<Value>>) -> Result<Self, RpcErr> {
        Ok(GetCodeRequest {
            address: parse_address(&param(params, 0, "address")?)?,
            block_ref: BlockRef::parse(&param(params, 1, "blockRef")?)?,
        })
    }

    fn handle(&self, context: RpcApiContext) -> Result<Value, RpcErr> {
        let trie = resolve_trie(&context, self.block_ref)?;
        let (_, _, code_size) = trie.get_account(self.address)?.unwrap_or((0, 0, 0));
        let code = trie.get_code(self.address, code_size)?.unwrap_or_default();
        Ok(json!(format!("0x{}", hex::encode(code))))
    }
}

pub struct GetStorageAtRequest {
    address: Address,
    raw_slot: H256,
    block_ref: BlockRef,
}

impl RpcHandler for GetStorageAtRequest {
    fn parse(params: &Option<Vec<Value>>) -> Result<Self, RpcErr> {
        Ok(GetStorageAtRequest {
            address: parse_address(&param(params, 0, "address")?)?,
            raw_slot: parse_h256(&param(params, 1, "rawSlot")?)?,
            block_ref: BlockRef::parse(&param(params, 2, "blockRef")?)?,
        })
    }

    fn handle(&self, context: RpcApiContext) -> Result<Value, RpcErr> {
        let trie = resolve_trie(&context, self.block_ref)?;
        let value = trie
            .get_storage(self.address, self.raw_slot)?
            .unwrap_or_else(H256::zero);
        Ok(json!(format!("0x{}", hex::encode(value.0))))
    }
}

pub struct GetAccountProofRequest {
    address: Address,
    block_ref: BlockRef,
}

impl RpcHandler for GetAccountProofRequest {
    fn parse(params: &Option<Vec<Value>>) -> Result<Self, RpcErr> {
        Ok(GetAccountProofRequest {
            address: parse_address(&param(params, 0, "address")?)?,
            block_ref: BlockRef::parse(&param(params, 1, "blockRef")?)?,
        })
    }

    fn handle(&self, context: RpcApiContext) -> Result<Value, RpcErr> {
        let applier = context
            .applier
            .read()
            .map_err(|_| RpcErr::Internal("applier lock poisoned".into()))?;
        match self.block_ref {
            BlockRef::Latest | BlockRef::Finalized => {
                let (proof, witness) = applier.generate_account_proof(self.address)?;
                Ok(proof_to_json(&proof, &witness))
            }
            _ => Err(RpcErr::BadParams(
                "account proofs are only served against the current root".into(),
            )),
        }
    }
}

/// Raw-key proof (`ubt_getProof`, spec.md §4.H/§6). Validates `len(key)==32`.
pub struct GetProofRequest {
    key: Vec<u8>,
}

impl RpcHandler for GetProofRequest {
    fn parse(params: &Option<Vec<Value>>) -> Result<Self, RpcErr> {
        let value = param(params, 0, "key")?;
        let s = value
            .as_str()
            .ok_or_else(|| RpcErr::BadParams("key must be a hex string".into()))?;
        let key = hex::decode(s.trim_start_matches("0x")).map_err(|e| RpcErr::BadParams(format!("key: {e}")))?;
        if key.len() != 32 {
            return Err(RpcErr::InvalidKeyLength(key.len()));
        }
        Ok(GetProofRequest { key })
    }

    fn handle(&self, context: RpcApiContext) -> Result<Value, RpcErr> {
        let mut address_bytes = [0u8; 20];
        address_bytes.copy_from_slice(&self.key[0..20]);
        let address = Address::from_slice(&address_bytes);
        let applier = context
            .applier
            .read()
            .map_err(|_| RpcErr::Internal("applier lock poisoned".into()))?;
        let (proof, witness) = applier.generate_account_proof(address)?;
        Ok(proof_to_json(&proof, &witness))
    }
}

fn proof_to_json(
    proof: &ubt_trie::Proof,
    witness: &std::collections::HashMap<ubt_trie::NodeHash, Vec<u8>>,
) -> Value {
    let steps: Vec<Value> = proof
        .steps
        .iter()
        .map(|s| {
            json!({
                "depth": s.depth,
                "sibling": format!("0x{}", hex::encode(s.sibling.as_bytes())),
                "wentLeft": s.went_left,
            })
        })
        .collect();
    let stem_encoding = proof
        .stem_encoding
        .as_ref()
        .map(|blob| format!("0x{}", hex::encode(blob)));
    let witness_json: serde_json::Map<String, Value> = witness
        .iter()
        .map(|(h, blob)| {
            (
                format!("0x{}", hex::encode(h.as_bytes())),
                json!(format!("0x{}", hex::encode(blob))),
            )
        })
        .collect();
    json!({ "steps": steps, "stemEncoding": stem_encoding, "witness": witness_json })
}

pub struct StatusRequest;

impl RpcHandler for StatusRequest {
    fn parse(_params: &Option<Vec<Value>>) -> Result<Self, RpcErr> {
        Ok(StatusRequest)
    }

    fn handle(&self, context: RpcApiContext) -> Result<Value, RpcErr> {
        let applier = context
            .applier
            .read()
            .map_err(|_| RpcErr::Internal("applier lock poisoned".into()))?;
        Ok(json!({ "ubtRoot": format!("0x{}", hex::encode(applier.root().as_bytes())) }))
    }
}

pub fn dispatch(req: &RpcRequest, context: RpcApiContext) -> Result<Value, RpcErr> {
    req.require_ubt_namespace()?;
    match req.method.as_str() {
        "ubt_getBalance" => GetBalanceRequest::call(req, context),
        "ubt_getNonce" => GetNonceRequest::call(req, context),
        "ubt_getCode" => GetCodeRequest::call(req, context),
        "ubt_getStorageAt" => GetStorageAtRequest::call(req, context),
        "ubt_getAccountProof" => GetAccountProofRequest::call(req, context),
        "ubt_getProof" => GetProofRequest::call(req, context),
        "ubt_status" => StatusRequest::call(req, context),
        other => Err(RpcErr::MethodNotFound(other.to_string())),
    }
}
