use thiserror::Error;

use crate::node_hash::NodeHash;

#[derive(Debug, Error)]
pub enum TrieError {
    #[error("Inconsistent internal tree structure: node with hash {0:?} not found")]
    InconsistentTree(NodeHash),
    #[error("Database error: {0}")]
    DbError(String),
    #[error("Invalid encoded node")]
    InvalidEncoding,
    #[error("Balance {0} exceeds 128 bits")]
    BalanceOverflow(String),
    #[error("Invalid key length: expected 32 bytes, got {0}")]
    InvalidKeyLength(usize),
}

#[derive(Debug, Error, PartialEq, Eq, Clone)]
pub enum ProofError {
    #[error("Proof is missing node with hash {0:?}")]
    MissingNode(NodeHash),
    #[error("Proof node with hash {0:?} is malformed")]
    MalformedNode(NodeHash),
    #[error("Recomputed hash does not match expected hash {0:?}")]
    HashMismatch(NodeHash),
    #[error("Invalid key length: expected 32 bytes, got {0}")]
    InvalidKeyLength(usize),
}
