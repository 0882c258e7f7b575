//! The consumer: fetches outbox events in order, applies them through the
//! applier, checkpoints, and recovers on restart (spec.md §4.G, "the
//! heart" of the pipeline).

pub mod error;

use std::sync::{Arc, Mutex, RwLock};

use ubt_applier::Applier;
use ubt_common::{ConsumerState, Envelope, EnvelopePayload, PendingStatus, ReorgMarkerV1, H256};
use ubt_outbox::Outbox;

pub use error::ConsumerError;

/// The consumer's view of the outbox (spec.md §4.G `outboxClient`). A
/// same-process `Outbox` implements this directly; a `ubt-daemon` running
/// against a remote `ubt-node-plugin` wraps an `OutboxRpcClient` instead —
/// the consumer's apply loop never needs to know which.
pub trait OutboxSource: Send + Sync {
    fn latest_seq(&self) -> u64;
    fn read(&self, seq: u64) -> Result<Option<Envelope>, ConsumerError>;
}

impl OutboxSource for Outbox {
    fn latest_seq(&self) -> u64 {
        Outbox::latest_seq(self)
    }

    fn read(&self, seq: u64) -> Result<Option<Envelope>, ConsumerError> {
        Ok(Outbox::read(self, seq)?)
    }
}

/// Where an appliedSeq of `None` should start consuming from (spec.md
/// §4.G "Bootstrap modes").
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BootstrapMode {
    /// Skip the historical backlog; start at `latestSeq - 1`.
    Tail,
    /// Start from seq 0.
    Backfill,
}

/// Persists the consumer's durable checkpoint (spec.md §3 `ConsumerState`).
/// A separate seam from the outbox/trie backends since nothing else in
/// the pipeline needs to read it except the query RPC's `status` call.
pub trait CheckpointStore: Send + Sync {
    fn load(&self) -> Result<ConsumerState, ConsumerError>;
    fn save(&self, state: &ConsumerState) -> Result<(), ConsumerError>;
}

impl<T: CheckpointStore + ?Sized> CheckpointStore for Arc<T> {
    fn load(&self) -> Result<ConsumerState, ConsumerError> {
        (**self).load()
    }

    fn save(&self, state: &ConsumerState) -> Result<(), ConsumerError> {
        (**self).save(state)
    }
}

#[derive(Default)]
pub struct InMemoryCheckpointStore {
    state: Mutex<ConsumerState>,
}

impl CheckpointStore for InMemoryCheckpointStore {
    fn load(&self) -> Result<ConsumerState, ConsumerError> {
        Ok(*self.state.lock().expect("lock"))
    }

    fn save(&self, state: &ConsumerState) -> Result<(), ConsumerError> {
        *self.state.lock().expect("lock") = *state;
        Ok(())
    }
}

/// Persists `ConsumerState` as JSON under the daemon's datadir, writing to
/// a sibling temp file and renaming over the target so a crash mid-write
/// never leaves a truncated checkpoint.
pub struct FileCheckpointStore {
    path: std::path::PathBuf,
}

impl FileCheckpointStore {
    pub fn new(path: impl Into<std::path::PathBuf>) -> Self {
        FileCheckpointStore { path: path.into() }
    }
}

impl CheckpointStore for FileCheckpointStore {
    fn load(&self) -> Result<ConsumerState, ConsumerError> {
        match std::fs::read(&self.path) {
            Ok(bytes) => serde_json::from_slice(&bytes)
                .map_err(|e| ConsumerError::CheckpointCorruption(e.to_string())),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(ConsumerState::default()),
            Err(e) => Err(ConsumerError::CheckpointCorruption(e.to_string())),
        }
    }

    fn save(&self, state: &ConsumerState) -> Result<(), ConsumerError> {
        let bytes = serde_json::to_vec(state)
            .map_err(|e| ConsumerError::CheckpointCorruption(e.to_string()))?;
        let tmp_path = self.path.with_extension("tmp");
        std::fs::write(&tmp_path, bytes)
            .map_err(|e| ConsumerError::CheckpointCorruption(e.to_string()))?;
        std::fs::rename(&tmp_path, &self.path)
            .map_err(|e| ConsumerError::CheckpointCorruption(e.to_string()))?;
        Ok(())
    }
}

pub struct ConsumerConfig {
    pub max_recoverable_reorg_depth: u64,
    pub backpressure_lag_threshold: u64,
    pub validation_strict_mode: bool,
    pub validation_halt_on_mismatch: bool,
}

impl Default for ConsumerConfig {
    fn default() -> Self {
        ConsumerConfig {
            max_recoverable_reorg_depth: 128,
            backpressure_lag_threshold: 5_000,
            validation_strict_mode: false,
            validation_halt_on_mismatch: false,
        }
    }
}

/// Fetches upstream `stateRoot` for a block, for optional strict
/// validation mode (spec.md §4.G). An external collaborator, specified
/// only through this interface.
pub trait UpstreamValidator: Send + Sync {
    fn state_root_at(&self, block_number: u64) -> Option<H256>;
}

pub struct NoopValidator;
impl UpstreamValidator for NoopValidator {
    fn state_root_at(&self, _block_number: u64) -> Option<H256> {
        None
    }
}

/// Per-event processing phase (spec.md §4.G state machine). Exposed for
/// observability; `consume_next` never leaves the consumer parked
/// mid-phase — a return means `Ready` or `Degraded`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Ready,
    Decoding,
    Applying,
    CommitWindow,
    Degraded,
}

/// The applier is shared via `Arc<RwLock<_>>` rather than owned outright,
/// so a query RPC server running in the same process can take read locks
/// for snapshot reads (spec.md §5 "UBT trie | Applier (single writer) |
/// Query RPC"). The consumer is still the only writer in practice — it
/// just doesn't need to be the only *holder*.
pub struct Consumer<C: CheckpointStore = InMemoryCheckpointStore, V: UpstreamValidator = NoopValidator> {
    outbox: Arc<dyn OutboxSource>,
    applier: Arc<RwLock<Applier>>,
    checkpoint: C,
    validator: V,
    cfg: ConsumerConfig,
    state: ConsumerState,
    phase: Phase,
    validation_mismatch_count: u64,
}

impl<C: CheckpointStore, V: UpstreamValidator> Consumer<C, V> {
    pub fn new(
        cfg: ConsumerConfig,
        applier: Arc<RwLock<Applier>>,
        outbox: Arc<dyn OutboxSource>,
        checkpoint: C,
        validator: V,
    ) -> Result<Self, ConsumerError> {
        let state = checkpoint.load()?;
        Ok(Consumer {
            outbox,
            applier,
            checkpoint,
            validator,
            cfg,
            state,
            phase: Phase::Ready,
            validation_mismatch_count: 0,
        })
    }

    pub fn state(&self) -> ConsumerState {
        self.state
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn lag(&self) -> u64 {
        let applied = self.state.applied_seq.map(|s| s + 1).unwrap_or(0);
        self.outbox.latest_seq().saturating_sub(applied)
    }

    pub fn is_backpressured(&self) -> bool {
        self.lag() >= self.cfg.backpressure_lag_threshold
    }

    /// Startup recovery (spec.md §4.G "Startup recovery algorithm").
    /// Simplified: steps 2-3 (resolving `appliedRoot`/rewinding to the
    /// newest resolvable anchor) are driven off the applier's in-memory
    /// anchor ring; a slow-path replay client (step 4) is an external
    /// collaborator this repo does not implement (see DESIGN.md).
    pub fn recover(&mut self, mode: BootstrapMode) -> Result<(), ConsumerError> {
        if self.state.applied_seq.is_none() {
            self.state.applied_seq = match mode {
                BootstrapMode::Tail => self.outbox.latest_seq().checked_sub(1),
                BootstrapMode::Backfill => None,
            };
            self.checkpoint.save(&self.state)?;
            return Ok(());
        }

        if self.state.pending_status == PendingStatus::Inflight {
            if let Some(pending_seq) = self.state.pending_seq {
                let current_root = self.applier.read().expect("applier lock poisoned").root();
                if current_root == self.state.applied_root {
                    tracing::warn!(pending_seq, "replaying inflight event after restart");
                    self.state.pending_status = PendingStatus::None;
                    self.apply_one(pending_seq)?;
                    return Ok(());
                }
            }
            let anchor = self
                .applier
                .read()
                .expect("applier lock poisoned")
                .anchor_at_or_below(self.state.applied_block);
            match anchor {
                Some(anchor) => {
                    self.applier
                        .write()
                        .expect("applier lock poisoned")
                        .rewind_to(anchor.block_root);
                    self.state.applied_block = anchor.block_number;
                    self.state.applied_seq = Some(anchor.seq);
                    self.state.applied_root = H256(*anchor.block_root.as_bytes());
                    self.state.pending_status = PendingStatus::None;
                    self.state.pending_seq = None;
                    self.checkpoint.save(&self.state)?;
                }
                None => return Err(ConsumerError::AncestorUnresolvable(self.state.applied_block)),
            }
        }
        Ok(())
    }

    /// Drives one outbox event through the state machine. Returns `Ok(false)`
    /// when there is nothing new to consume.
    pub fn consume_next(&mut self) -> Result<bool, ConsumerError> {
        let next_seq = self.state.applied_seq.map(|s| s + 1).unwrap_or(0);
        if next_seq > self.outbox.latest_seq() {
            self.phase = Phase::Ready;
            return Ok(false);
        }
        self.apply_one(next_seq)
    }

    fn apply_one(&mut self, seq: u64) -> Result<bool, ConsumerError> {
        self.phase = Phase::Decoding;
        let envelope = match self.outbox.read(seq)? {
            Some(e) => e,
            None => {
                self.phase = Phase::Ready;
                return Ok(false);
            }
        };

        if let Some(applied) = self.state.applied_seq {
            if applied >= envelope.seq {
                // Already applied; fetch-time idempotence (spec.md §4.G).
                return Ok(false);
            }
        }

        self.state.pending_seq = Some(envelope.seq);
        self.state.pending_status = PendingStatus::Inflight;
        self.state.pending_updated_at = envelope.timestamp;
        self.checkpoint.save(&self.state)?;

        self.phase = Phase::Applying;
        if let Err(e) = self.apply_envelope(&envelope) {
            self.phase = Phase::Degraded;
            return Err(e);
        }

        self.phase = Phase::CommitWindow;
        {
            let mut applier = self.applier.write().expect("applier lock poisoned");
            if applier.should_commit(envelope.timestamp) {
                applier.commit_at(envelope.block_number, envelope.block_hash, envelope.seq, envelope.timestamp)?;
            }
        }

        if self.cfg.validation_strict_mode {
            self.validate(&envelope)?;
        }

        let current_root = self.applier.read().expect("applier lock poisoned").root();
        self.state.applied_seq = Some(envelope.seq);
        self.state.applied_root = H256(*current_root.as_bytes());
        self.state.applied_block = envelope.block_number;
        self.state.pending_status = PendingStatus::None;
        self.state.pending_seq = None;
        self.checkpoint.save(&self.state)?;

        self.phase = Phase::Ready;
        Ok(true)
    }

    fn apply_envelope(&mut self, envelope: &Envelope) -> Result<(), ConsumerError> {
        match &envelope.payload {
            EnvelopePayload::Diff(diff) => {
                self.applier
                    .write()
                    .expect("applier lock poisoned")
                    .apply_diff(diff)?;
                Ok(())
            }
            EnvelopePayload::Reorg(marker) => self.handle_reorg(*marker),
        }
    }

    fn validate(&mut self, envelope: &Envelope) -> Result<(), ConsumerError> {
        if let Some(expected) = self.validator.state_root_at(envelope.block_number) {
            let current_root = self.applier.read().expect("applier lock poisoned").root();
            let actual = H256(*current_root.as_bytes());
            if expected != actual {
                self.validation_mismatch_count += 1;
                if self.cfg.validation_halt_on_mismatch {
                    return Err(ConsumerError::ValidationMismatch {
                        block_number: envelope.block_number,
                        expected,
                        actual,
                    });
                }
                tracing::error!(block_number = envelope.block_number, "validation mismatch, continuing");
            }
        }
        Ok(())
    }

    pub fn validation_mismatch_count(&self) -> u64 {
        self.validation_mismatch_count
    }

    /// Handles a reorg marker (spec.md §4.G `HandleReorg`). Tries the
    /// bounded-depth fast path first; falls back to the newest anchor at
    /// or below the common ancestor.
    pub fn handle_reorg(&mut self, marker: ReorgMarkerV1) -> Result<(), ConsumerError> {
        let within_depth = marker.common_ancestor_number
            >= self
                .state
                .applied_block
                .saturating_sub(self.cfg.max_recoverable_reorg_depth);

        if within_depth {
            let root = self
                .applier
                .read()
                .expect("applier lock poisoned")
                .root_for_block_number(marker.common_ancestor_number);
            if let Some(root) = root {
                let mut applier = self.applier.write().expect("applier lock poisoned");
                applier.rewind_to(root);
                if let Some(anchor) = applier.anchor_at_or_below(marker.common_ancestor_number) {
                    self.state.applied_seq = Some(anchor.seq);
                }
                drop(applier);
                self.state.applied_block = marker.common_ancestor_number;
                self.state.applied_root = H256(*root.as_bytes());
                self.state.pending_status = PendingStatus::None;
                self.state.pending_seq = None;
                return Ok(());
            }
        }

        let anchor = self
            .applier
            .read()
            .expect("applier lock poisoned")
            .anchor_at_or_below(marker.common_ancestor_number);
        match anchor {
            Some(anchor) => {
                self.applier
                    .write()
                    .expect("applier lock poisoned")
                    .rewind_to(anchor.block_root);
                self.state.applied_block = anchor.block_number;
                self.state.applied_seq = Some(anchor.seq);
                self.state.applied_root = H256(*anchor.block_root.as_bytes());
                self.state.pending_status = PendingStatus::None;
                self.state.pending_seq = None;
                Ok(())
            }
            None => Err(ConsumerError::AncestorUnresolvable(marker.common_ancestor_number)),
        }
    }

    pub fn close(self) {
        tracing::info!("consumer closed");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use ubt_applier::ApplierConfig;
    use ubt_common::{AccountEntry, QueuedDiffV1};
    use ubt_outbox::InMemoryOutboxBackend;
    use ubt_trie::InMemoryTrieDB;

    fn addr(n: u64) -> ubt_common::Address {
        ubt_common::Address::from_low_u64_be(n)
    }

    fn diff_envelope(seq: u64, block_number: u64, addr_n: u64, balance: u128) -> Envelope {
        let diff = QueuedDiffV1 {
            accounts: vec![AccountEntry {
                address: addr(addr_n),
                nonce: 0,
                balance,
                code_hash: H256::zero(),
                alive: true,
            }],
            ..Default::default()
        };
        Envelope {
            seq,
            version: ubt_common::ENVELOPE_VERSION,
            block_number,
            block_hash: H256::from_low_u64_be(block_number),
            parent_hash: H256::zero(),
            timestamp: block_number,
            payload: EnvelopePayload::Diff(diff),
        }
    }

    fn new_consumer() -> (Consumer, Arc<Outbox>) {
        let outbox = Arc::new(Outbox::open(Box::new(InMemoryOutboxBackend::new()), 10_000).unwrap());
        let db: Arc<dyn ubt_trie::TrieDB> = Arc::new(InMemoryTrieDB::new());
        let applier = Applier::new(db, None, ApplierConfig::default());
        let consumer = Consumer::new(
            ConsumerConfig::default(),
            Arc::new(RwLock::new(applier)),
            Arc::clone(&outbox) as Arc<dyn OutboxSource>,
            InMemoryCheckpointStore::default(),
            NoopValidator,
        )
        .unwrap();
        (consumer, outbox)
    }

    #[test]
    fn backfill_starts_from_seq_zero() {
        let (mut consumer, outbox) = new_consumer();
        outbox.append(diff_envelope(0, 1, 1, 100)).unwrap();
        consumer.recover(BootstrapMode::Backfill).unwrap();
        assert_eq!(consumer.state().applied_seq, None);
        let advanced = consumer.consume_next().unwrap();
        assert!(advanced);
        assert_eq!(consumer.state().applied_seq, Some(0));
    }

    #[test]
    fn tail_bootstrap_skips_historical_backlog() {
        let (mut consumer, outbox) = new_consumer();
        for i in 0..500 {
            outbox.append(diff_envelope(0, i + 1, 1, 1)).unwrap();
        }
        consumer.recover(BootstrapMode::Tail).unwrap();
        assert_eq!(consumer.state().applied_seq, Some(498));

        outbox.append(diff_envelope(0, 501, 1, 1)).unwrap();
        let advanced = consumer.consume_next().unwrap();
        assert!(advanced);
        assert_eq!(consumer.state().applied_seq, Some(499));
    }

    #[test]
    fn consume_next_is_idempotent_on_already_applied_seq() {
        let (mut consumer, outbox) = new_consumer();
        outbox.append(diff_envelope(0, 1, 1, 1)).unwrap();
        consumer.recover(BootstrapMode::Backfill).unwrap();
        consumer.consume_next().unwrap();
        let state_before = consumer.state();

        consumer.state.applied_seq = Some(0); // already applied
        let advanced = consumer.consume_next().unwrap();
        assert!(!advanced || consumer.state() == state_before);
    }

    #[test]
    fn reorg_within_depth_rewinds_without_slow_path() {
        let (mut consumer, outbox) = new_consumer();
        outbox.append(diff_envelope(0, 1, 1, 10)).unwrap();
        consumer.recover(BootstrapMode::Backfill).unwrap();
        consumer.consume_next().unwrap();
        consumer
            .applier
            .write()
            .expect("applier lock poisoned")
            .commit_at(1, H256::from_low_u64_be(1), 0, 1)
            .unwrap();
        let ancestor_root = consumer
            .applier
            .read()
            .expect("applier lock poisoned")
            .root_for_block_number(1)
            .unwrap();

        let marker = ReorgMarkerV1 {
            from_block_number: 2,
            from_block_hash: H256::from_low_u64_be(2),
            to_block_number: 1,
            to_block_hash: H256::from_low_u64_be(1),
            common_ancestor_number: 1,
            common_ancestor_hash: H256::from_low_u64_be(1),
        };
        consumer.handle_reorg(marker).unwrap();
        assert_eq!(consumer.state().applied_block, 1);
        assert_eq!(consumer.state().applied_root, H256(*ancestor_root.as_bytes()));
    }
}
