//! End-to-end scenarios spanning outbox, applier and consumer together
//! (spec.md §8 "Concrete end-to-end scenarios").

use std::sync::{Arc, RwLock};

use ubt_applier::{Applier, ApplierConfig};
use ubt_common::{
    AccountEntry, Address, ConsumerState, Envelope, EnvelopePayload, PendingStatus, QueuedDiffV1,
    StorageEntry, H256,
};
use ubt_consumer::{
    BootstrapMode, CheckpointStore, Consumer, ConsumerConfig, ConsumerError, InMemoryCheckpointStore,
    NoopValidator, OutboxSource,
};
use ubt_outbox::{InMemoryOutboxBackend, Outbox};
use ubt_trie::InMemoryTrieDB;

fn addr(n: u64) -> Address {
    Address::from_low_u64_be(n)
}

fn new_applier() -> Arc<RwLock<Applier>> {
    let db: Arc<dyn ubt_trie::TrieDB> = Arc::new(InMemoryTrieDB::new());
    Arc::new(RwLock::new(Applier::new(db, None, ApplierConfig::default())))
}

fn new_outbox() -> Arc<Outbox> {
    Arc::new(Outbox::open(Box::new(InMemoryOutboxBackend::new()), 10_000).unwrap())
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

#[test]
fn fresh_backfill_from_seq_zero() {
    let outbox = new_outbox();
    let applier = new_applier();

    // Block 1: account A @ addr 0x01, balance 1000.
    outbox
        .append(diff_envelope(0, 1, 1, 1000))
        .expect("append 0");

    // Block 2: a slot update for A.
    let slot_diff = QueuedDiffV1 {
        storage: vec![StorageEntry {
            address: addr(1),
            raw_slot: H256::from_low_u64_be(7),
            value: H256::from_low_u64_be(42),
        }],
        ..Default::default()
    };
    outbox
        .append(Envelope {
            seq: 0,
            version: ubt_common::ENVELOPE_VERSION,
            block_number: 2,
            block_hash: H256::from_low_u64_be(2),
            parent_hash: H256::from_low_u64_be(1),
            timestamp: 2,
            payload: EnvelopePayload::Diff(slot_diff),
        })
        .expect("append 1");

    // Block 3: account B.
    outbox
        .append(diff_envelope(0, 3, 2, 500))
        .expect("append 2");

    let mut consumer = Consumer::new(
        ConsumerConfig::default(),
        Arc::clone(&applier),
        Arc::clone(&outbox) as Arc<dyn OutboxSource>,
        InMemoryCheckpointStore::default(),
        NoopValidator,
    )
    .unwrap();

    consumer.recover(BootstrapMode::Backfill).unwrap();
    while consumer.consume_next().unwrap() {}

    assert_eq!(consumer.state().applied_seq, Some(2));
    assert_eq!(consumer.state().applied_block, 3);

    let (_, balance, _) = applier
        .read()
        .unwrap()
        .trie()
        .get_account(addr(1))
        .unwrap()
        .expect("account present");
    assert_eq!(balance, 1000);
}

#[test]
fn restart_with_inflight_replays_exactly_once() {
    // Two envelopes: seq 0 gets applied and checkpointed cleanly before the
    // "crash". Seq 1 is the one in flight when the process dies: `apply_one`
    // always saves the pending marker before touching the applier, so a
    // crash in that window leaves `pending_seq = Some(1)` on disk with the
    // applier's root still sitting at the post-seq-0 value. A fresh
    // `Consumer` built against the same live applier and the same
    // checkpoint must replay seq 1 exactly once during `recover`, not
    // re-apply seq 0 and not skip seq 1.
    let outbox = new_outbox();
    let applier = new_applier();
    outbox.append(diff_envelope(0, 1, 9, 7)).unwrap();
    outbox.append(diff_envelope(0, 2, 9, 11)).unwrap();

    let checkpoint = Arc::new(InMemoryCheckpointStore::default());

    let mut consumer = Consumer::new(
        ConsumerConfig::default(),
        Arc::clone(&applier),
        Arc::clone(&outbox) as Arc<dyn OutboxSource>,
        Arc::clone(&checkpoint),
        NoopValidator,
    )
    .unwrap();
    consumer.recover(BootstrapMode::Backfill).unwrap();
    assert!(consumer.consume_next().unwrap());
    assert_eq!(consumer.state().applied_seq, Some(0));

    // Simulate the crash: the pending marker for seq 1 made it to disk, but
    // the apply that would follow it, and the checkpoint that would clear
    // it, never happened. The applier's root is untouched.
    let mut crashed_state = consumer.state();
    crashed_state.pending_seq = Some(1);
    crashed_state.pending_status = PendingStatus::Inflight;
    checkpoint.save(&crashed_state).unwrap();
    drop(consumer);

    let mut restarted = Consumer::new(
        ConsumerConfig::default(),
        Arc::clone(&applier),
        Arc::clone(&outbox) as Arc<dyn OutboxSource>,
        Arc::clone(&checkpoint),
        NoopValidator,
    )
    .unwrap();
    restarted.recover(BootstrapMode::Backfill).unwrap();

    assert_eq!(restarted.state().applied_seq, Some(1));
    assert_eq!(restarted.state().pending_status, PendingStatus::None);
    let (_, balance, _) = applier
        .read()
        .unwrap()
        .trie()
        .get_account(addr(9))
        .unwrap()
        .expect("account present");
    assert_eq!(balance, 11);
}

#[test]
fn tail_bootstrap_skips_backlog_then_applies_new_event() {
    let outbox = new_outbox();
    let applier = new_applier();
    for i in 0..500 {
        outbox.append(diff_envelope(0, i + 1, 1, 1)).unwrap();
    }

    let mut consumer = Consumer::new(
        ConsumerConfig::default(),
        Arc::clone(&applier),
        Arc::clone(&outbox) as Arc<dyn OutboxSource>,
        InMemoryCheckpointStore::default(),
        NoopValidator,
    )
    .unwrap();
    consumer.recover(BootstrapMode::Tail).unwrap();
    assert_eq!(consumer.state().applied_seq, Some(498));

    outbox.append(diff_envelope(0, 501, 1, 1)).unwrap();
    assert!(consumer.consume_next().unwrap());
    assert_eq!(consumer.state().applied_seq, Some(499));
}

#[test]
fn storage_clearing_zeroes_slot_at_new_root() {
    let outbox = new_outbox();
    let applier = new_applier();

    let set_diff = QueuedDiffV1 {
        storage: vec![StorageEntry {
            address: addr(5),
            raw_slot: H256::from_low_u64_be(1),
            value: H256::from_low_u64_be(99),
        }],
        ..Default::default()
    };
    outbox
        .append(Envelope {
            seq: 0,
            version: ubt_common::ENVELOPE_VERSION,
            block_number: 1,
            block_hash: H256::from_low_u64_be(1),
            parent_hash: H256::zero(),
            timestamp: 1,
            payload: EnvelopePayload::Diff(set_diff),
        })
        .unwrap();

    let clear_diff = QueuedDiffV1 {
        storage: vec![StorageEntry {
            address: addr(5),
            raw_slot: H256::from_low_u64_be(1),
            value: H256::zero(),
        }],
        ..Default::default()
    };
    outbox
        .append(Envelope {
            seq: 0,
            version: ubt_common::ENVELOPE_VERSION,
            block_number: 2,
            block_hash: H256::from_low_u64_be(2),
            parent_hash: H256::from_low_u64_be(1),
            timestamp: 2,
            payload: EnvelopePayload::Diff(clear_diff),
        })
        .unwrap();

    let mut consumer = Consumer::new(
        ConsumerConfig::default(),
        Arc::clone(&applier),
        Arc::clone(&outbox) as Arc<dyn OutboxSource>,
        InMemoryCheckpointStore::default(),
        NoopValidator,
    )
    .unwrap();
    consumer.recover(BootstrapMode::Backfill).unwrap();
    while consumer.consume_next().unwrap() {}

    let value = applier
        .read()
        .unwrap()
        .trie()
        .get_storage(addr(5), H256::from_low_u64_be(1))
        .unwrap();
    assert!(value.is_none() || value == Some(H256::zero()));
}
