use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConsumerError {
    #[error("outbox error: {0}")]
    Outbox(#[from] ubt_outbox::OutboxError),
    #[error("applier error: {0}")]
    Applier(#[from] ubt_applier::ApplierError),
    #[error("ancestor unresolvable: block {0}")]
    AncestorUnresolvable(u64),
    #[error("checkpoint corruption: {0}")]
    CheckpointCorruption(String),
    #[error("validation mismatch at block {block_number}: expected {expected}, got {actual}")]
    ValidationMismatch {
        block_number: u64,
        expected: ubt_common::H256,
        actual: ubt_common::H256,
    },
}
