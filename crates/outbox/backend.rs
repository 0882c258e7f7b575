//! The storage seam the outbox's append/read/compact logic runs against
//! (spec.md §4.D), kept separate from that logic so the in-memory and
//! `libmdbx` implementations stay swappable, the way `StoreEngine` decouples
//! `ethrex-storage` from its backends.

use crate::error::OutboxError;

pub trait OutboxBackend: Send + Sync {
    fn get_event(&self, seq: u64) -> Result<Option<Vec<u8>>, OutboxError>;

    /// Writes one event and the advanced seq counter atomically.
    fn put_event_and_advance(&self, seq: u64, blob: Vec<u8>, next_seq: u64) -> Result<(), OutboxError>;

    /// Deletes `[from, to_exclusive)`.
    fn delete_range(&self, from: u64, to_exclusive: u64) -> Result<(), OutboxError>;

    fn get_meta(&self, key: &str) -> Result<Option<Vec<u8>>, OutboxError>;
    fn put_meta(&self, key: &str, value: Vec<u8>) -> Result<(), OutboxError>;
}

pub mod memory;
pub mod mdbx;
