use thiserror::Error;

#[derive(Debug, Error)]
pub enum OutboxError {
    #[error("event {0} not found")]
    NotFound(u64),
    #[error("corrupted outbox entry: {0}")]
    Corruption(String),
    #[error("seq bound exceeded: {0}")]
    BoundsExceeded(String),
    #[error("invalid key: {0}")]
    InvalidKey(String),
    #[error("seq counter overflow at {0}")]
    OverflowCounter(u64),
    #[error("backend I/O error: {0}")]
    Backend(String),
}

impl From<ubt_envelope::EnvelopeCodecError> for OutboxError {
    fn from(e: ubt_envelope::EnvelopeCodecError) -> Self {
        OutboxError::Corruption(e.to_string())
    }
}
