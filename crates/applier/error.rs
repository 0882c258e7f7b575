use thiserror::Error;

#[derive(Debug, Error)]
pub enum ApplierError {
    #[error("trie error: {0}")]
    Trie(#[from] ubt_trie::TrieError),
    #[error("proof error: {0}")]
    Proof(#[from] ubt_trie::ProofError),
    #[error("invalid key length: expected 32 bytes, got {0}")]
    InvalidKeyLength(usize),
}
