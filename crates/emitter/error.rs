use thiserror::Error;

#[derive(Debug, Error)]
pub enum EmitterError {
    #[error("outbox error: {0}")]
    Outbox(#[from] ubt_outbox::OutboxError),
    #[error("raw key unavailable for address {address:?} slot hash {slot_hash:?}")]
    RawKeyUnavailable {
        address: ubt_common::Address,
        slot_hash: ubt_common::H256,
    },
}
