//! Applies decoded diffs to the shadow binary trie and commits on a
//! cadence (spec.md §4.F). The applier owns the trie exclusively; nothing
//! else in the pipeline mutates it.

pub mod error;

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;

use ubt_common::{AccountEntry, Address, CodeEntry, QueuedDiffV1, StorageEntry, H256, EMPTY_CODE_HASH};
use ubt_trie::codec::{decode_node_raw, DecodedNode};
use ubt_trie::node_hash::hash_internal;
use ubt_trie::{NodeHash, Proof, Trie, TrieDB, WitnessTracer};

pub use error::ApplierError;

/// Commits when `blocks_since_commit >= interval` OR `now - last_commit >=
/// max_latency_ms` (spec.md §4.F).
#[derive(Debug, Clone, Copy)]
pub struct CommitCadence {
    pub interval: u64,
    pub max_latency_ms: u64,
}

impl Default for CommitCadence {
    fn default() -> Self {
        CommitCadence {
            interval: 1024,
            max_latency_ms: 10_000,
        }
    }
}

pub struct ApplierConfig {
    pub cadence: CommitCadence,
    pub max_anchors: usize,
}

impl Default for ApplierConfig {
    fn default() -> Self {
        ApplierConfig {
            cadence: CommitCadence::default(),
            max_anchors: 256,
        }
    }
}

/// Per-diff apply counters, returned to the consumer for logging (spec.md
/// §4.F `ApplyDiff`).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AppliedStats {
    pub accounts_applied: usize,
    pub storage_applied: usize,
    pub codes_applied: usize,
}

/// A persisted point-in-time checkpoint used for bounded recovery
/// (spec.md §3 "Anchor").
#[derive(Debug, Clone, Copy)]
pub struct Anchor {
    pub block_number: u64,
    pub block_root: NodeHash,
    pub seq: u64,
    pub timestamp: u64,
}

/// Mutates and commits the shadow binary trie (spec.md §4.F).
///
/// `block_roots`/`hash_roots` are the applier's own `blockNumber→root` and
/// `blockHash→root` side indexes; they live in memory here and are rebuilt
/// from anchors + the outbox on restart rather than persisted separately
/// (see DESIGN.md).
pub struct Applier {
    trie: Trie,
    db: Arc<dyn TrieDB>,
    cfg: ApplierConfig,
    blocks_since_commit: u64,
    last_commit_ms: u64,
    block_roots: HashMap<u64, NodeHash>,
    hash_roots: HashMap<H256, NodeHash>,
    anchors: VecDeque<Anchor>,
    /// `BasicData.codeSize` isn't part of the wire `AccountEntry`; it's
    /// derived from the code chunks this applier has itself written, so it
    /// has to be tracked alongside the trie rather than read off the diff.
    code_sizes: HashMap<Address, u32>,
}

impl Applier {
    pub fn new(db: Arc<dyn TrieDB>, initial_root: Option<NodeHash>, cfg: ApplierConfig) -> Self {
        Applier {
            trie: Trie::open(Arc::clone(&db), initial_root),
            db,
            cfg,
            blocks_since_commit: 0,
            last_commit_ms: 0,
            block_roots: HashMap::new(),
            hash_roots: HashMap::new(),
            anchors: VecDeque::new(),
            code_sizes: HashMap::new(),
        }
    }

    pub fn root(&self) -> NodeHash {
        self.trie.hash()
    }

    /// Read-only access to the underlying trie, for query RPC lookups.
    pub fn trie(&self) -> &Trie {
        &self.trie
    }

    /// Opens a historical, read-only view of the trie at `root`, for query
    /// RPC lookups against a block other than the applier's current one.
    pub fn trie_at(&self, root: NodeHash) -> Trie {
        Trie::open(Arc::clone(&self.db), Some(root))
    }

    /// Applies one diff's accounts, codes, then storage, in that order
    /// (spec.md §4.F apply order). Deleted accounts (`alive == false`) get
    /// their `BasicData`/`CodeHash` slots zeroed to the canonical values;
    /// their existing storage is left untouched.
    pub fn apply_diff(&mut self, diff: &QueuedDiffV1) -> Result<AppliedStats, ApplierError> {
        let mut stats = AppliedStats::default();

        // Codes first: a contract's own creation diff carries both its
        // account entry and its code in the same envelope, and the account
        // entry needs `code_sizes` already populated to pack the right
        // `codeSize` into `BasicData`.
        for code in &diff.codes {
            self.apply_code(code)?;
            stats.codes_applied += 1;
        }
        for account in &diff.accounts {
            self.apply_account(account)?;
            stats.accounts_applied += 1;
        }
        for storage in &diff.storage {
            self.apply_storage(storage)?;
            stats.storage_applied += 1;
        }

        self.blocks_since_commit += 1;
        Ok(stats)
    }

    fn apply_account(&mut self, entry: &AccountEntry) -> Result<(), ApplierError> {
        if entry.alive {
            // Prefer a size staged by this diff's own code entries; fall
            // back to what's already packed into the trie (a balance-only
            // diff for an existing contract carries no code entry at all).
            let code_size = match self.code_sizes.get(&entry.address) {
                Some(size) => *size,
                None => self
                    .trie
                    .get_account(entry.address)?
                    .map(|(_, _, code_size)| code_size)
                    .unwrap_or(0),
            };
            self.trie
                .update_account(entry.address, entry.nonce, entry.balance, code_size)?;
            self.trie.update_code_hash(entry.address, entry.code_hash)?;
        } else {
            self.code_sizes.remove(&entry.address);
            self.trie.update_account(entry.address, 0, 0, 0)?;
            self.trie.update_code_hash(entry.address, EMPTY_CODE_HASH)?;
        }
        Ok(())
    }

    fn apply_code(&mut self, entry: &CodeEntry) -> Result<(), ApplierError> {
        self.code_sizes.insert(entry.address, entry.code.len() as u32);
        self.trie.update_contract_code(entry.address, &entry.code)?;
        Ok(())
    }

    fn apply_storage(&mut self, entry: &StorageEntry) -> Result<(), ApplierError> {
        self.trie
            .update_storage(entry.address, entry.raw_slot, entry.value)?;
        Ok(())
    }

    /// Whether a commit is due under the configured cadence (spec.md §4.F).
    pub fn should_commit(&self, now_ms: u64) -> bool {
        self.blocks_since_commit >= self.cfg.cadence.interval
            || now_ms.saturating_sub(self.last_commit_ms) >= self.cfg.cadence.max_latency_ms
    }

    /// Commits the accumulated changes, records the new root under
    /// `block_number`/`block_hash`, and rotates the anchor ring (spec.md
    /// §4.F). Returns the new root.
    pub fn commit_at(
        &mut self,
        block_number: u64,
        block_hash: H256,
        seq: u64,
        now_ms: u64,
    ) -> Result<NodeHash, ApplierError> {
        let (root, _entries) = self.trie.commit()?;
        self.block_roots.insert(block_number, root);
        self.hash_roots.insert(block_hash, root);
        self.blocks_since_commit = 0;
        self.last_commit_ms = now_ms;

        if self.anchors.len() >= self.cfg.max_anchors {
            self.anchors.pop_front();
        }
        self.anchors.push_back(Anchor {
            block_number,
            block_root: root,
            seq,
            timestamp: now_ms,
        });
        tracing::info!(block_number, %root, "applier committed");
        Ok(root)
    }

    pub fn root_for_block_number(&self, block_number: u64) -> Option<NodeHash> {
        self.block_roots.get(&block_number).copied()
    }

    pub fn root_for_block_hash(&self, block_hash: H256) -> Option<NodeHash> {
        self.hash_roots.get(&block_hash).copied()
    }

    /// The newest anchor at or below `block_number`.
    pub fn anchor_at_or_below(&self, block_number: u64) -> Option<Anchor> {
        self.anchors
            .iter()
            .rev()
            .find(|a| a.block_number <= block_number)
            .copied()
    }

    /// Rewinds the trie to `root` (used by the consumer's reorg/recovery
    /// paths). Does not touch `blocks_since_commit` bookkeeping beyond
    /// resetting it, since a rewind implies no pending uncommitted work.
    pub fn rewind_to(&mut self, root: NodeHash) {
        self.trie = Trie::open(Arc::clone(&self.db), Some(root));
        self.blocks_since_commit = 0;
    }

    /// Validates a raw 32-byte key before a proof request (spec.md §4.H).
    pub fn validate_proof_request(key: &[u8]) -> Result<(), ApplierError> {
        if key.len() != 32 {
            return Err(ApplierError::InvalidKeyLength(key.len()));
        }
        Ok(())
    }

    /// Produces a proof for `address`'s account leaf plus a witness map of
    /// every node blob touched while walking to it, keyed by hash (spec.md
    /// §4.F `GenerateProof`).
    pub fn generate_account_proof(
        &self,
        address: Address,
    ) -> Result<(Proof, HashMap<NodeHash, Vec<u8>>), ApplierError> {
        let tracer = WitnessTracer::new(self.db.as_ref());
        let proof = self.trie.prove_account_via(address, &tracer)?;
        Ok((proof, witness_by_hash(tracer.into_witness())?))
    }

    pub fn generate_storage_proof(
        &self,
        address: Address,
        raw_slot: H256,
    ) -> Result<(Proof, HashMap<NodeHash, Vec<u8>>), ApplierError> {
        let tracer = WitnessTracer::new(self.db.as_ref());
        let proof = self.trie.prove_storage_via(address, raw_slot, &tracer)?;
        Ok((proof, witness_by_hash(tracer.into_witness())?))
    }

    pub fn close(self) {
        tracing::info!("applier closed");
    }
}

fn witness_by_hash(
    touched: HashMap<Vec<u8>, Vec<u8>>,
) -> Result<HashMap<NodeHash, Vec<u8>>, ApplierError> {
    let mut out = HashMap::with_capacity(touched.len());
    for (_path_key, blob) in touched {
        let hash = match decode_node_raw(&blob)? {
            DecodedNode::Internal { left, right } => hash_internal(left, right),
            DecodedNode::Stem(stem) => stem.hash(),
        };
        out.insert(hash, blob);
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use ubt_trie::InMemoryTrieDB;

    fn addr(n: u64) -> Address {
        Address::from_low_u64_be(n)
    }

    fn sample_diff() -> QueuedDiffV1 {
        QueuedDiffV1 {
            origin_root: H256::zero(),
            root: H256::zero(),
            accounts: vec![AccountEntry {
                address: addr(1),
                nonce: 3,
                balance: 1000,
                code_hash: H256::zero(),
                alive: true,
            }],
            storage: vec![StorageEntry {
                address: addr(1),
                raw_slot: H256::from_low_u64_be(9),
                value: H256::from_low_u64_be(77),
            }],
            codes: vec![],
        }
    }

    fn new_applier() -> Applier {
        let db: Arc<dyn TrieDB> = Arc::new(InMemoryTrieDB::new());
        Applier::new(db, None, ApplierConfig::default())
    }

    #[test]
    fn apply_diff_applies_accounts_then_storage() {
        let mut applier = new_applier();
        let stats = applier.apply_diff(&sample_diff()).expect("apply");
        assert_eq!(stats.accounts_applied, 1);
        assert_eq!(stats.storage_applied, 1);
    }

    #[test]
    fn should_commit_fires_on_interval() {
        let mut applier = new_applier();
        applier.cfg.cadence.interval = 1;
        applier.apply_diff(&sample_diff()).expect("apply");
        assert!(applier.should_commit(0));
    }

    #[test]
    fn commit_at_records_block_indices_and_anchor() {
        let mut applier = new_applier();
        applier.apply_diff(&sample_diff()).expect("apply");
        let root = applier
            .commit_at(1, H256::from_low_u64_be(1), 0, 1_000)
            .expect("commit");
        assert_eq!(applier.root_for_block_number(1), Some(root));
        assert_eq!(applier.root_for_block_hash(H256::from_low_u64_be(1)), Some(root));
        assert_eq!(applier.anchor_at_or_below(1).map(|a| a.block_root), Some(root));
    }

    #[test]
    fn deleted_account_zeroes_basic_data_and_code_hash() {
        let mut applier = new_applier();
        applier.apply_diff(&sample_diff()).expect("apply");
        applier
            .commit_at(1, H256::from_low_u64_be(1), 0, 0)
            .expect("commit");

        let diff = QueuedDiffV1 {
            accounts: vec![AccountEntry {
                address: addr(1),
                nonce: 0,
                balance: 0,
                code_hash: H256::zero(),
                alive: false,
            }],
            ..Default::default()
        };
        applier.apply_diff(&diff).expect("apply delete");
        applier
            .commit_at(2, H256::from_low_u64_be(2), 1, 0)
            .expect("commit");
        let account = applier.trie.get_account(addr(1)).expect("get");
        assert_eq!(account, Some((0, 0, 0)));
        assert_eq!(
            applier.trie.get_code_hash(addr(1)).expect("get"),
            Some(EMPTY_CODE_HASH)
        );
    }

    #[test]
    fn apply_determinism_independent_of_commit_cadence() {
        let mut a = new_applier();
        let mut b = new_applier();
        let diffs = vec![sample_diff(), sample_diff()];

        for d in &diffs {
            a.apply_diff(d).expect("apply");
        }
        a.commit_at(1, H256::zero(), 0, 0).expect("commit");

        for d in &diffs {
            b.apply_diff(d).expect("apply");
            b.commit_at(1, H256::zero(), 0, 0).expect("commit");
        }

        assert_eq!(a.root(), b.root());
    }

    #[test]
    fn contract_creation_packs_real_code_size() {
        let mut applier = new_applier();
        let code = bytes::Bytes::from(vec![0xfe; 40]);
        let diff = QueuedDiffV1 {
            accounts: vec![AccountEntry {
                address: addr(1),
                nonce: 1,
                balance: 0,
                code_hash: H256::from_low_u64_be(42),
                alive: true,
            }],
            codes: vec![CodeEntry {
                address: addr(1),
                code_hash: H256::from_low_u64_be(42),
                code: code.clone(),
            }],
            ..Default::default()
        };
        applier.apply_diff(&diff).expect("apply");

        let (_, _, code_size) = applier.trie.get_account(addr(1)).expect("get").expect("present");
        assert_eq!(code_size, code.len() as u32);
        let read_back = applier
            .trie
            .get_code(addr(1), code_size)
            .expect("get code")
            .expect("present");
        assert_eq!(read_back, code);
    }

    #[test]
    fn balance_only_diff_preserves_existing_code_size() {
        let mut applier = new_applier();
        let code = bytes::Bytes::from(vec![0xab; 10]);
        let create = QueuedDiffV1 {
            accounts: vec![AccountEntry {
                address: addr(1),
                nonce: 1,
                balance: 0,
                code_hash: H256::from_low_u64_be(7),
                alive: true,
            }],
            codes: vec![CodeEntry {
                address: addr(1),
                code_hash: H256::from_low_u64_be(7),
                code: code.clone(),
            }],
            ..Default::default()
        };
        applier.apply_diff(&create).expect("apply create");

        let balance_only = QueuedDiffV1 {
            accounts: vec![AccountEntry {
                address: addr(1),
                nonce: 1,
                balance: 500,
                code_hash: H256::from_low_u64_be(7),
                alive: true,
            }],
            ..Default::default()
        };
        applier.apply_diff(&balance_only).expect("apply balance update");

        let (_, balance, code_size) = applier.trie.get_account(addr(1)).expect("get").expect("present");
        assert_eq!(balance, 500);
        assert_eq!(code_size, code.len() as u32);
    }
}
