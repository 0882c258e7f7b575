//! Node-side producer of outbox envelopes (spec.md §4.E). Every public
//! operation is non-blocking to the caller: failures are recorded and flip
//! the emitter into a *degraded* state rather than propagating, because
//! canonical block import must never stall on this subsystem.

pub mod error;

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Mutex;

use ubt_common::{AccountEntry, Address, CodeEntry, Envelope, EnvelopePayload, QueuedDiffV1, ReorgMarkerV1, StorageEntry, H256, ENVELOPE_VERSION};
use ubt_outbox::Outbox;

pub use error::EmitterError;

/// Resolves a hashed storage slot back to its raw key (spec.md §9
/// "Preimage resolution"). The persistent half of the lookup chain; the
/// in-batch half is a plain map supplied per call.
pub trait PreimageResolver: Send + Sync {
    fn resolve_raw_slot(&self, address: Address, slot_hash: H256) -> Option<H256>;
}

/// An account touched by block execution, before diff construction decides
/// its `alive` bit.
pub struct TouchedAccount {
    pub address: Address,
    pub nonce: u64,
    pub balance: u128,
    pub code_hash: H256,
    /// Whether the account exists in the post-state.
    pub exists: bool,
}

/// A storage slot touched by block execution, keyed by its hashed slot
/// (the raw key must still be resolved before it can be emitted).
pub struct TouchedSlot {
    pub address: Address,
    pub slot_hash: H256,
    pub value: H256,
}

/// Builds a [`QueuedDiffV1`] from touched accounts/slots, resolving each
/// slot's raw key via the in-batch map first, then `persistent` (spec.md
/// §4.E, §9). Returns the first unresolvable slot as an error; callers
/// should then call [`Emitter::mark_raw_key_failure`] and skip the block.
pub fn build_diff(
    origin_root: H256,
    root: H256,
    accounts: &[TouchedAccount],
    slots: &[TouchedSlot],
    codes: Vec<CodeEntry>,
    in_batch_preimages: &HashMap<(Address, H256), H256>,
    persistent: &dyn PreimageResolver,
) -> Result<QueuedDiffV1, EmitterError> {
    let account_entries = accounts
        .iter()
        .map(|a| AccountEntry {
            address: a.address,
            nonce: a.nonce,
            balance: a.balance,
            code_hash: a.code_hash,
            alive: a.exists,
        })
        .collect();

    let mut storage_entries = Vec::with_capacity(slots.len());
    for slot in slots {
        let raw_slot = in_batch_preimages
            .get(&(slot.address, slot.slot_hash))
            .copied()
            .or_else(|| persistent.resolve_raw_slot(slot.address, slot.slot_hash))
            .ok_or(EmitterError::RawKeyUnavailable {
                address: slot.address,
                slot_hash: slot.slot_hash,
            })?;
        storage_entries.push(StorageEntry {
            address: slot.address,
            raw_slot,
            value: slot.value,
        });
    }

    let mut diff = QueuedDiffV1 {
        origin_root,
        root,
        accounts: account_entries,
        storage: storage_entries,
        codes,
    };
    diff.sort();
    Ok(diff)
}

#[derive(Debug, Default)]
struct Degraded {
    flag: AtomicBool,
    failure_count: AtomicU64,
    last_reason: Mutex<Option<String>>,
}

/// Node-side emitter (spec.md §4.E).
pub struct Emitter {
    outbox: std::sync::Arc<Outbox>,
    degraded: Degraded,
}

impl Emitter {
    pub fn new(outbox: std::sync::Arc<Outbox>) -> Self {
        Emitter {
            outbox,
            degraded: Degraded::default(),
        }
    }

    pub fn is_degraded(&self) -> bool {
        self.degraded.flag.load(Ordering::SeqCst)
    }

    pub fn failure_count(&self) -> u64 {
        self.degraded.failure_count.load(Ordering::SeqCst)
    }

    /// The reason the emitter last went degraded, if it ever has (spec.md
    /// §6 `ubt_status`'s `degradedReasonCode`).
    pub fn degraded_reason(&self) -> Option<String> {
        self.degraded.last_reason.lock().expect("lock").clone()
    }

    /// Records a raw-slot resolution failure and enters degraded mode
    /// without emitting anything for the block (spec.md §4.E).
    pub fn mark_raw_key_failure(&self, block_number: u64, err: &EmitterError) {
        tracing::error!(block_number, %err, "raw key unavailable, skipping block diff");
        self.degraded.flag.store(true, Ordering::SeqCst);
        self.degraded.failure_count.fetch_add(1, Ordering::SeqCst);
        *self.degraded.last_reason.lock().expect("lock") = Some(err.to_string());
    }

    /// Appends a diff envelope. Never returns an error to the caller: any
    /// append failure is swallowed and flips the emitter degraded.
    pub fn emit_diff(&self, block_number: u64, block_hash: H256, parent_hash: H256, diff: QueuedDiffV1) {
        let envelope = Envelope {
            seq: 0,
            version: ENVELOPE_VERSION,
            block_number,
            block_hash,
            parent_hash,
            timestamp: 0,
            payload: EnvelopePayload::Diff(diff),
        };
        self.append_non_blocking(envelope);
    }

    /// Appends a reorg marker. Callers MUST call this before emitting any
    /// diff for the new branch (spec.md §4.E, §5 ordering guarantee 1).
    pub fn emit_reorg(&self, marker: ReorgMarkerV1) {
        let envelope = Envelope {
            seq: 0,
            version: ENVELOPE_VERSION,
            block_number: marker.to_block_number,
            block_hash: marker.to_block_hash,
            parent_hash: H256::zero(),
            timestamp: 0,
            payload: EnvelopePayload::Reorg(marker),
        };
        self.append_non_blocking(envelope);
    }

    fn append_non_blocking(&self, envelope: Envelope) {
        match self.outbox.append(envelope) {
            Ok(_seq) => {
                self.degraded.flag.store(false, Ordering::SeqCst);
            }
            Err(e) => {
                tracing::error!(%e, "outbox append failed, entering degraded mode");
                self.degraded.flag.store(true, Ordering::SeqCst);
                self.degraded.failure_count.fetch_add(1, Ordering::SeqCst);
                *self.degraded.last_reason.lock().expect("lock") = Some(e.to_string());
            }
        }
    }

    pub fn close(self) {
        tracing::info!("emitter closed");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ubt_outbox::InMemoryOutboxBackend;

    struct NeverResolves;
    impl PreimageResolver for NeverResolves {
        fn resolve_raw_slot(&self, _address: Address, _slot_hash: H256) -> Option<H256> {
            None
        }
    }

    struct AlwaysResolves(H256);
    impl PreimageResolver for AlwaysResolves {
        fn resolve_raw_slot(&self, _address: Address, _slot_hash: H256) -> Option<H256> {
            Some(self.0)
        }
    }

    fn addr(n: u64) -> Address {
        Address::from_low_u64_be(n)
    }

    #[test]
    fn build_diff_resolves_from_in_batch_map_first() {
        let mut preimages = HashMap::new();
        let raw = H256::from_low_u64_be(42);
        preimages.insert((addr(1), H256::from_low_u64_be(99)), raw);
        let slots = vec![TouchedSlot {
            address: addr(1),
            slot_hash: H256::from_low_u64_be(99),
            value: H256::from_low_u64_be(7),
        }];
        let diff = build_diff(
            H256::zero(),
            H256::zero(),
            &[],
            &slots,
            vec![],
            &preimages,
            &NeverResolves,
        )
        .expect("resolves from in-batch map");
        assert_eq!(diff.storage[0].raw_slot, raw);
    }

    #[test]
    fn build_diff_fails_when_unresolvable() {
        let slots = vec![TouchedSlot {
            address: addr(1),
            slot_hash: H256::from_low_u64_be(99),
            value: H256::from_low_u64_be(7),
        }];
        let result = build_diff(
            H256::zero(),
            H256::zero(),
            &[],
            &slots,
            vec![],
            &HashMap::new(),
            &NeverResolves,
        );
        assert!(matches!(result, Err(EmitterError::RawKeyUnavailable { .. })));
    }

    #[test]
    fn build_diff_falls_back_to_persistent_resolver() {
        let raw = H256::from_low_u64_be(5);
        let slots = vec![TouchedSlot {
            address: addr(1),
            slot_hash: H256::from_low_u64_be(99),
            value: H256::from_low_u64_be(7),
        }];
        let diff = build_diff(
            H256::zero(),
            H256::zero(),
            &[],
            &slots,
            vec![],
            &HashMap::new(),
            &AlwaysResolves(raw),
        )
        .expect("resolves via persistent lookup");
        assert_eq!(diff.storage[0].raw_slot, raw);
    }

    #[test]
    fn emit_diff_clears_degraded_after_prior_failure() {
        let outbox = std::sync::Arc::new(Outbox::open(Box::new(InMemoryOutboxBackend::new()), 1_000).unwrap());
        let emitter = Emitter::new(outbox);
        emitter.mark_raw_key_failure(
            1,
            &EmitterError::RawKeyUnavailable {
                address: addr(1),
                slot_hash: H256::zero(),
            },
        );
        assert!(emitter.is_degraded());

        emitter.emit_diff(2, H256::zero(), H256::zero(), QueuedDiffV1::default());
        assert!(!emitter.is_degraded());
    }

    #[test]
    fn mark_raw_key_failure_does_not_touch_outbox() {
        let outbox = std::sync::Arc::new(Outbox::open(Box::new(InMemoryOutboxBackend::new()), 1_000).unwrap());
        let emitter = Emitter::new(outbox);
        emitter.mark_raw_key_failure(
            1,
            &EmitterError::RawKeyUnavailable {
                address: addr(1),
                slot_hash: H256::zero(),
            },
        );
        assert_eq!(emitter.failure_count(), 1);
    }
}
