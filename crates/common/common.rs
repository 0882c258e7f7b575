//! Shared data model for the UBT shadow state-tree pipeline (spec.md §3).
//!
//! This crate holds only plain data — the outbox envelope payloads, the
//! consumer's durable checkpoint record, and anchor snapshots — shared across
//! the envelope codec, outbox, emitter, applier, and consumer crates. Each of
//! those crates keeps its own `error.rs`, matching how `ethrex-common` stays
//! a pure types crate while `ethrex-blockchain`/`ethrex-storage` carry their
//! own error enums.

pub use ethereum_types::{H256, U256};

pub mod constants;

/// 20-byte account address.
pub type Address = ethereum_types::H160;

/// A 32-byte UBT tree key (stem ∥ suffix).
pub type TreeKey = [u8; 32];

/// Canonical empty-code hash (`keccak256("")`), used to zero a deleted
/// account's `CodeHash` slot per spec.md §4.F.
pub const EMPTY_CODE_HASH: H256 = H256(hex_literal::hex!(
    "c5d2460186f7233c927e7db2dcc703c0e500b653ca82273b7bfad8045d85a47"
));

/// An account touched by a block, as carried in a [`QueuedDiffV1`].
///
/// `alive = false` marks the account deleted in the post-state; the applier
/// zeroes its `BasicData`/`CodeHash` slots rather than removing storage
/// (spec.md §4.F).
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct AccountEntry {
    pub address: Address,
    pub nonce: u64,
    /// Non-negative, at most 128 bits (spec.md §3); the envelope codec is
    /// responsible for rejecting negative or overflowing wire values before
    /// one of these is ever constructed (spec.md §4.C).
    pub balance: u128,
    pub code_hash: H256,
    pub alive: bool,
}

/// A storage slot touched by a block. `raw_slot` is the *unhashed* key — a
/// hard invariant, since the UBT is keyed on raw slots (spec.md §3).
/// `value == H256::zero()` means the slot was deleted.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct StorageEntry {
    pub address: Address,
    pub raw_slot: H256,
    pub value: H256,
}

/// A contract's bytecode, touched by a block.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct CodeEntry {
    pub address: Address,
    pub code_hash: H256,
    pub code: bytes::Bytes,
}

/// `QueuedDiffV1`: the post-state change for one block (spec.md §3).
///
/// The encoded form is deterministic: `accounts` sorted by address,
/// `storage` sorted by `(address, raw_slot)`, `codes` sorted by address.
/// [`QueuedDiffV1::sort`] establishes that order; the envelope codec calls it
/// before encoding so two diffs built in any order encode identically.
#[derive(Debug, Clone, PartialEq, Eq, Default, serde::Serialize, serde::Deserialize)]
pub struct QueuedDiffV1 {
    pub origin_root: H256,
    pub root: H256,
    pub accounts: Vec<AccountEntry>,
    pub storage: Vec<StorageEntry>,
    pub codes: Vec<CodeEntry>,
}

impl QueuedDiffV1 {
    /// Sorts `accounts`/`storage`/`codes` into the canonical encoding order.
    pub fn sort(&mut self) {
        self.accounts.sort_by_key(|a| a.address);
        self.storage
            .sort_by_key(|s| (s.address, s.raw_slot));
        self.codes.sort_by_key(|c| c.address);
    }

    /// True if `self` is already in canonical encoding order.
    pub fn is_sorted(&self) -> bool {
        self.accounts.windows(2).all(|w| w[0].address <= w[1].address)
            && self
                .storage
                .windows(2)
                .all(|w| (w[0].address, w[0].raw_slot) <= (w[1].address, w[1].raw_slot))
            && self.codes.windows(2).all(|w| w[0].address <= w[1].address)
    }
}

/// `ReorgMarkerV1`: an explicit control record declaring a chain rewind to a
/// common ancestor (spec.md §3).
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct ReorgMarkerV1 {
    pub from_block_number: u64,
    pub from_block_hash: H256,
    pub to_block_number: u64,
    pub to_block_hash: H256,
    pub common_ancestor_number: u64,
    pub common_ancestor_hash: H256,
}

/// The kind of payload an outbox envelope carries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum EnvelopeKind {
    Diff,
    Reorg,
}

/// The decoded payload of an outbox envelope.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum EnvelopePayload {
    Diff(QueuedDiffV1),
    Reorg(ReorgMarkerV1),
}

impl EnvelopePayload {
    pub fn kind(&self) -> EnvelopeKind {
        match self {
            EnvelopePayload::Diff(_) => EnvelopeKind::Diff,
            EnvelopePayload::Reorg(_) => EnvelopeKind::Reorg,
        }
    }
}

/// The outbox envelope (spec.md §3): `seq` is strictly monotonic, gap-free,
/// starting at 0.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct Envelope {
    pub seq: u64,
    pub version: u16,
    pub block_number: u64,
    pub block_hash: H256,
    pub parent_hash: H256,
    pub timestamp: u64,
    pub payload: EnvelopePayload,
}

/// Current envelope wire version. Decoding any other value is rejected.
pub const ENVELOPE_VERSION: u16 = 1;

/// Whether the consumer's pending apply is in flight (spec.md §3, §4.G).
///
/// Open Question (a) in spec.md §9: the original system keeps a legacy
/// `pendingSeqActive` boolean alongside `pendingStatus`. This repo picks
/// `PendingStatus` as the single source of truth and does not carry the
/// legacy boolean — see DESIGN.md.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, serde::Serialize, serde::Deserialize)]
pub enum PendingStatus {
    #[default]
    None,
    Inflight,
}

/// The consumer's durable checkpoint record (spec.md §3).
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct ConsumerState {
    pub pending_seq: Option<u64>,
    pub pending_status: PendingStatus,
    pub pending_updated_at: u64,
    pub applied_seq: Option<u64>,
    pub applied_root: H256,
    pub applied_block: u64,
}

impl Default for ConsumerState {
    fn default() -> Self {
        ConsumerState {
            pending_seq: None,
            pending_status: PendingStatus::None,
            pending_updated_at: 0,
            applied_seq: None,
            applied_root: H256::zero(),
            applied_block: 0,
        }
    }
}

/// A persisted point-in-time checkpoint used for bounded recovery
/// (spec.md §3, "Anchor").
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct AnchorSnapshot {
    pub block_number: u64,
    pub block_root: H256,
    pub seq: u64,
    pub timestamp: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn diff_sort_is_idempotent_and_canonical() {
        let addr_a = Address::from_low_u64_be(1);
        let addr_b = Address::from_low_u64_be(2);
        let mut diff = QueuedDiffV1 {
            accounts: vec![
                AccountEntry {
                    address: addr_b,
                    nonce: 0,
                    balance: 0,
                    code_hash: H256::zero(),
                    alive: true,
                },
                AccountEntry {
                    address: addr_a,
                    nonce: 0,
                    balance: 0,
                    code_hash: H256::zero(),
                    alive: true,
                },
            ],
            ..Default::default()
        };
        assert!(!diff.is_sorted());
        diff.sort();
        assert!(diff.is_sorted());
        assert_eq!(diff.accounts[0].address, addr_a);
    }
}
