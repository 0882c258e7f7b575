//! Append-only, crash-safe event log sitting between the emitter and the
//! consumer (see spec.md §4.D). One writer appends monotonically
//! sequenced envelopes; any number of readers replay from an arbitrary
//! seq. Retention is enforced by periodic compaction, never by refusing
//! a write.

pub mod backend;
pub mod error;

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;

use ubt_envelope::{decode_envelope, encode_envelope, Envelope};

pub use backend::memory::InMemoryOutboxBackend;
pub use backend::mdbx::MdbxOutboxBackend;
pub use backend::OutboxBackend;
pub use error::OutboxError;

const META_SEQ: &str = "ubt-seq";
const META_LOWEST: &str = "ubt-lowest";

/// Number of appends between automatic compaction sweeps (spec.md §4.D).
const AUTO_COMPACT_INTERVAL: u64 = 1000;

pub struct Outbox {
    backend: Box<dyn OutboxBackend>,
    next_seq: AtomicU64,
    lowest_seq: AtomicU64,
    retention_window: u64,
    /// Serializes appends; `next_seq`/`lowest_seq` are still atomics so
    /// readers never need to take this lock.
    append_lock: Mutex<()>,
    appends_since_compaction: AtomicU64,
}

impl Outbox {
    pub fn open(backend: Box<dyn OutboxBackend>, retention_window: u64) -> Result<Self, OutboxError> {
        let next_seq = match backend.get_meta(META_SEQ)? {
            Some(bytes) => u64::from_be_bytes(
                bytes
                    .try_into()
                    .map_err(|_| OutboxError::Corruption("malformed ubt-seq meta key".into()))?,
            ),
            None => 0,
        };
        let lowest_seq = match backend.get_meta(META_LOWEST)? {
            Some(bytes) => u64::from_be_bytes(
                bytes
                    .try_into()
                    .map_err(|_| OutboxError::Corruption("malformed ubt-lowest meta key".into()))?,
            ),
            None => 0,
        };
        Ok(Outbox {
            backend,
            next_seq: AtomicU64::new(next_seq),
            lowest_seq: AtomicU64::new(lowest_seq),
            retention_window,
            append_lock: Mutex::new(()),
            appends_since_compaction: AtomicU64::new(0),
        })
    }

    pub fn latest_seq(&self) -> u64 {
        self.next_seq.load(Ordering::SeqCst)
    }

    pub fn lowest_seq(&self) -> u64 {
        self.lowest_seq.load(Ordering::SeqCst)
    }

    /// Appends one envelope, returning its assigned seq. The envelope's
    /// own `seq` field is overwritten to match the slot it's actually
    /// given, so callers never race each other for a seq value.
    pub fn append(&self, mut envelope: Envelope) -> Result<u64, OutboxError> {
        let _guard = self.append_lock.lock().expect("append lock poisoned");
        let seq = self.next_seq.load(Ordering::SeqCst);
        envelope.seq = seq;
        let blob = encode_envelope(&envelope);
        let next = seq.checked_add(1).ok_or(OutboxError::OverflowCounter(seq))?;
        self.backend.put_event_and_advance(seq, blob, next)?;
        self.next_seq.store(next, Ordering::SeqCst);

        if self.appends_since_compaction.fetch_add(1, Ordering::SeqCst) + 1 >= AUTO_COMPACT_INTERVAL {
            self.appends_since_compaction.store(0, Ordering::SeqCst);
            let floor = next.saturating_sub(self.retention_window);
            if floor > self.lowest_seq.load(Ordering::SeqCst) {
                self.compact_below(floor)?;
            }
        }
        Ok(seq)
    }

    pub fn read(&self, seq: u64) -> Result<Option<Envelope>, OutboxError> {
        match self.backend.get_event(seq)? {
            Some(blob) => Ok(Some(decode_envelope(&blob)?)),
            None => Ok(None),
        }
    }

    /// Reads up to `limit` consecutive envelopes starting at `from_seq`,
    /// stopping early at the first gap (a seq already compacted away or
    /// not yet written).
    pub fn read_range(&self, from_seq: u64, limit: usize) -> Result<Vec<Envelope>, OutboxError> {
        let mut out = Vec::with_capacity(limit.min(64));
        let mut seq = from_seq;
        while out.len() < limit {
            match self.backend.get_event(seq)? {
                Some(blob) => out.push(decode_envelope(&blob)?),
                None => break,
            }
            seq = match seq.checked_add(1) {
                Some(s) => s,
                None => break,
            };
        }
        Ok(out)
    }

    /// Deletes every event below `floor`, advancing the retention
    /// boundary. `floor` (spec's `safeSeq`) must be at most `latest+1`
    /// ("drop everything currently persisted"); `latest_seq()` already
    /// holds that value, so the bound check is a direct comparison.
    pub fn compact_below(&self, floor: u64) -> Result<(), OutboxError> {
        let current_lowest = self.lowest_seq.load(Ordering::SeqCst);
        let latest = self.latest_seq();
        if floor > latest {
            return Err(OutboxError::BoundsExceeded(format!(
                "compact floor {floor} exceeds latest+1 ({latest})"
            )));
        }
        if floor <= current_lowest {
            return Ok(());
        }
        self.backend.delete_range(current_lowest, floor)?;
        self.backend.put_meta(META_LOWEST, floor.to_be_bytes().to_vec())?;
        self.lowest_seq.store(floor, Ordering::SeqCst);
        tracing::info!(from = current_lowest, to = floor, "outbox compacted");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ubt_common::H256;
    use ubt_envelope::{Envelope, EnvelopePayload, ReorgMarkerV1};

    fn sample_envelope(seq: u64, block_number: u64) -> Envelope {
        Envelope {
            seq,
            version: ubt_common::ENVELOPE_VERSION,
            block_number,
            block_hash: H256::zero(),
            parent_hash: H256::zero(),
            timestamp: 0,
            payload: EnvelopePayload::Reorg(ReorgMarkerV1 {
                from_block_number: block_number,
                from_block_hash: H256::zero(),
                to_block_number: block_number,
                to_block_hash: H256::zero(),
                common_ancestor_number: block_number.saturating_sub(1),
                common_ancestor_hash: H256::zero(),
            }),
        }
    }

    #[test]
    fn append_assigns_monotonic_seqs() {
        let outbox = Outbox::open(Box::new(InMemoryOutboxBackend::new()), 1_000).unwrap();
        let a = outbox.append(sample_envelope(999, 1)).unwrap();
        let b = outbox.append(sample_envelope(999, 2)).unwrap();
        assert_eq!(a, 0);
        assert_eq!(b, 1);
        assert_eq!(outbox.latest_seq(), 2);
    }

    #[test]
    fn read_round_trips_appended_envelope() {
        let outbox = Outbox::open(Box::new(InMemoryOutboxBackend::new()), 1_000).unwrap();
        let seq = outbox.append(sample_envelope(0, 7)).unwrap();
        let back = outbox.read(seq).unwrap().expect("present");
        assert_eq!(back.block_number, 7);
    }

    #[test]
    fn read_range_stops_at_gap() {
        let outbox = Outbox::open(Box::new(InMemoryOutboxBackend::new()), 1_000).unwrap();
        for i in 0..3 {
            outbox.append(sample_envelope(0, i)).unwrap();
        }
        let events = outbox.read_range(0, 10).unwrap();
        assert_eq!(events.len(), 3);
    }

    #[test]
    fn compact_below_deletes_and_advances_lowest() {
        let outbox = Outbox::open(Box::new(InMemoryOutboxBackend::new()), 1_000).unwrap();
        for i in 0..5 {
            outbox.append(sample_envelope(0, i)).unwrap();
        }
        outbox.compact_below(3).unwrap();
        assert_eq!(outbox.lowest_seq(), 3);
        assert!(outbox.read(0).unwrap().is_none());
        assert!(outbox.read(2).unwrap().is_none());
        assert!(outbox.read(3).unwrap().is_some());
    }

    #[test]
    fn compact_below_never_exceeds_latest_seq() {
        let outbox = Outbox::open(Box::new(InMemoryOutboxBackend::new()), 1_000).unwrap();
        outbox.append(sample_envelope(0, 1)).unwrap();
        let latest = outbox.latest_seq();
        match outbox.compact_below(9_999) {
            Err(OutboxError::BoundsExceeded(_)) => {}
            other => panic!("expected BoundsExceeded, got {other:?}"),
        }
        assert_eq!(outbox.lowest_seq(), 0);

        outbox.compact_below(latest).unwrap();
        assert_eq!(outbox.lowest_seq(), latest);
    }

    #[test]
    fn open_on_fresh_backend_starts_at_zero() {
        let outbox = Outbox::open(Box::new(InMemoryOutboxBackend::new()), 1_000).unwrap();
        assert_eq!(outbox.latest_seq(), 0);
        assert_eq!(outbox.lowest_seq(), 0);
    }
}
