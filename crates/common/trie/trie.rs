//! The binary trie (spec.md §4.B). `Trie` is the public surface; `node`,
//! `codec`, `db`, `path` and `proof` hold its internals.

pub mod codec;
pub mod db;
pub mod error;
pub mod mdbx;
pub mod node;
pub mod node_hash;
pub mod path;
pub mod proof;

use std::sync::Arc;

use ubt_common::constants::CODE_CHUNK_SIZE;
use ubt_common::{Address, TreeKey, H256};
use ubt_keycodec::{basic_data_key, code_chunk_key, code_hash_key, storage_slot_key};

pub use db::{InMemoryTrieDB, TrieDB, WitnessTracer};
pub use error::{ProofError, TrieError};
pub use mdbx::MdbxTrieDB;
pub use node::Node;
pub use node_hash::NodeHash;
pub use path::NodePath;
pub use proof::Proof;

/// What `Commit` did at one path (spec.md §4.B `Commit`).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CommitEntry {
    Updated,
    /// Emitted when a subtree collapses to `Empty` and its prior on-disk
    /// entry is removed. In practice this fires only on a full account/stem
    /// removal; partially-collapsed internal nodes above it are left as
    /// harmless orphans (see DESIGN.md).
    Deleted,
}

fn split_key(key: TreeKey) -> ([u8; 31], u8) {
    let mut stem = [0u8; 31];
    stem.copy_from_slice(&key[..31]);
    (stem, key[31])
}

/// Packs `(nonce, balance, code_size)` into the 32-byte `BasicData` leaf
/// value: 8 bytes of nonce, 16 bytes of balance, 4 bytes of code size, and 4
/// zero bytes of padding (spec.md §4.A).
pub fn pack_basic_data(nonce: u64, balance: u128, code_size: u32) -> [u8; 32] {
    let mut out = [0u8; 32];
    out[0..8].copy_from_slice(&nonce.to_be_bytes());
    out[8..24].copy_from_slice(&balance.to_be_bytes());
    out[24..28].copy_from_slice(&code_size.to_be_bytes());
    out
}

pub fn unpack_basic_data(value: &[u8; 32]) -> (u64, u128, u32) {
    let nonce = u64::from_be_bytes(value[0..8].try_into().expect("8 bytes"));
    let balance = u128::from_be_bytes(value[8..24].try_into().expect("16 bytes"));
    let code_size = u32::from_be_bytes(value[24..28].try_into().expect("4 bytes"));
    (nonce, balance, code_size)
}

/// The shadow binary trie (spec.md §4.B). Cheap to [`Trie::copy`]: internal
/// and stem nodes are `Arc`-shared, so a copy shares memory until either
/// side mutates.
pub struct Trie {
    root: Node,
    db: Arc<dyn TrieDB>,
}

impl Trie {
    /// Opens a trie rooted at `root_hash`. `None` or the zero hash both mean
    /// an empty trie.
    pub fn open(db: Arc<dyn TrieDB>, root_hash: Option<NodeHash>) -> Self {
        let root = match root_hash {
            None => Node::Empty,
            Some(h) if h.is_zero() => Node::Empty,
            Some(h) => Node::Hashed(h),
        };
        Trie { root, db }
    }

    pub fn hash(&self) -> NodeHash {
        self.root.hash()
    }

    /// The backend this trie resolves nodes against, for callers that need
    /// to wrap it (e.g. a [`WitnessTracer`] for proof/witness collection).
    pub fn db(&self) -> &dyn TrieDB {
        self.db.as_ref()
    }

    /// A cheap snapshot sharing structure with `self` until one side writes.
    pub fn copy(&self) -> Trie {
        Trie {
            root: self.root.clone(),
            db: Arc::clone(&self.db),
        }
    }

    pub fn update_account(
        &mut self,
        address: Address,
        nonce: u64,
        balance: u128,
        code_size: u32,
    ) -> Result<(), TrieError> {
        let (stem, suffix) = split_key(basic_data_key(address));
        let value = pack_basic_data(nonce, balance, code_size);
        self.root = node::insert(
            std::mem::replace(&mut self.root, Node::Empty),
            &NodePath::root(),
            &stem,
            suffix,
            value,
            self.db.as_ref(),
        )?;
        Ok(())
    }

    pub fn get_account(&self, address: Address) -> Result<Option<(u64, u128, u32)>, TrieError> {
        let (stem, suffix) = split_key(basic_data_key(address));
        let value = node::get(&self.root, &NodePath::root(), &stem, suffix, self.db.as_ref())?;
        Ok(value.map(|v| unpack_basic_data(&v)))
    }

    pub fn update_code_hash(&mut self, address: Address, code_hash: H256) -> Result<(), TrieError> {
        let (stem, suffix) = split_key(code_hash_key(address));
        self.root = node::insert(
            std::mem::replace(&mut self.root, Node::Empty),
            &NodePath::root(),
            &stem,
            suffix,
            code_hash.0,
            self.db.as_ref(),
        )?;
        Ok(())
    }

    pub fn get_code_hash(&self, address: Address) -> Result<Option<H256>, TrieError> {
        let (stem, suffix) = split_key(code_hash_key(address));
        let value = node::get(&self.root, &NodePath::root(), &stem, suffix, self.db.as_ref())?;
        Ok(value.map(H256))
    }

    pub fn update_storage(
        &mut self,
        address: Address,
        raw_slot: H256,
        value: H256,
    ) -> Result<(), TrieError> {
        let (stem, suffix) = split_key(storage_slot_key(address, raw_slot));
        let taken = std::mem::replace(&mut self.root, Node::Empty);
        self.root = if value.is_zero() {
            node::remove(taken, &NodePath::root(), &stem, suffix, self.db.as_ref())?
        } else {
            node::insert(
                taken,
                &NodePath::root(),
                &stem,
                suffix,
                value.0,
                self.db.as_ref(),
            )?
        };
        Ok(())
    }

    pub fn get_storage(&self, address: Address, raw_slot: H256) -> Result<Option<H256>, TrieError> {
        let (stem, suffix) = split_key(storage_slot_key(address, raw_slot));
        let value = node::get(&self.root, &NodePath::root(), &stem, suffix, self.db.as_ref())?;
        Ok(value.map(H256))
    }

    /// Writes contract code as 31-byte chunks under consecutive
    /// `code_chunk_key` stems. Each chunk occupies the low 31 bytes of its
    /// value slot, zero-padded; unlike a real Verkle tree's PUSHDATA
    /// continuation byte, no cross-chunk metadata is tracked (spec.md §9
    /// Open Questions).
    pub fn update_contract_code(&mut self, address: Address, code: &[u8]) -> Result<(), TrieError> {
        for (i, chunk) in code.chunks(CODE_CHUNK_SIZE).enumerate() {
            let (stem, suffix) = split_key(code_chunk_key(address, i as u64));
            let mut value = [0u8; 32];
            value[1..1 + chunk.len()].copy_from_slice(chunk);
            let taken = std::mem::replace(&mut self.root, Node::Empty);
            self.root = node::insert(taken, &NodePath::root(), &stem, suffix, value, self.db.as_ref())?;
        }
        Ok(())
    }

    pub fn get_code(&self, address: Address, code_size: u32) -> Result<Option<bytes::Bytes>, TrieError> {
        if code_size == 0 {
            return Ok(None);
        }
        let chunk_count = (code_size as usize).div_ceil(CODE_CHUNK_SIZE);
        let mut out = Vec::with_capacity(chunk_count * CODE_CHUNK_SIZE);
        for i in 0..chunk_count {
            let (stem, suffix) = split_key(code_chunk_key(address, i as u64));
            let value = node::get(&self.root, &NodePath::root(), &stem, suffix, self.db.as_ref())?
                .ok_or(TrieError::InconsistentTree(NodeHash::ZERO))?;
            out.extend_from_slice(&value[1..32]);
        }
        out.truncate(code_size as usize);
        Ok(Some(bytes::Bytes::from(out)))
    }

    /// Produces an inclusion/exclusion proof for `address`'s `BasicData`
    /// leaf and `code_hash`'s leaf, since they share a stem (spec.md §4.A).
    pub fn prove_account(&self, address: Address) -> Result<Proof, TrieError> {
        let (stem, _suffix) = split_key(basic_data_key(address));
        proof::prove(&self.root, &stem, self.db.as_ref())
    }

    pub fn prove_storage(&self, address: Address, raw_slot: H256) -> Result<Proof, TrieError> {
        let (stem, _suffix) = split_key(storage_slot_key(address, raw_slot));
        proof::prove(&self.root, &stem, self.db.as_ref())
    }

    /// Same as [`Trie::prove_account`], but walks through `db` instead of
    /// this trie's own backend — used to wrap the walk in a
    /// [`WitnessTracer`] without exposing the root node itself.
    pub fn prove_account_via(&self, address: Address, db: &dyn TrieDB) -> Result<Proof, TrieError> {
        let (stem, _suffix) = split_key(basic_data_key(address));
        proof::prove(&self.root, &stem, db)
    }

    pub fn prove_storage_via(
        &self,
        address: Address,
        raw_slot: H256,
        db: &dyn TrieDB,
    ) -> Result<Proof, TrieError> {
        let (stem, _suffix) = split_key(storage_slot_key(address, raw_slot));
        proof::prove(&self.root, &stem, db)
    }

    /// Walks every resolved (non-`Hashed`) node, persists it, and collapses
    /// it back to a `Hashed` placeholder. Returns the new root hash and the
    /// list of paths touched, for the applier's commit-window bookkeeping
    /// (spec.md §4.F).
    pub fn commit(&mut self) -> Result<(NodeHash, Vec<(NodePath, CommitEntry)>), TrieError> {
        let mut entries = Vec::new();
        let taken = std::mem::replace(&mut self.root, Node::Empty);
        self.root = commit_node(taken, &NodePath::root(), self.db.as_ref(), &mut entries)?;
        Ok((self.root.hash(), entries))
    }
}

fn commit_node(
    node: Node,
    path: &NodePath,
    db: &dyn TrieDB,
    entries: &mut Vec<(NodePath, CommitEntry)>,
) -> Result<Node, TrieError> {
    match node {
        Node::Empty | Node::Hashed(_) => Ok(node),
        Node::Stem(s) => {
            let hash = s.hash();
            let encoded = codec::encode_stem(&s.stem, &s.values);
            db.put_node(path, encoded)?;
            entries.push((path.clone(), CommitEntry::Updated));
            Ok(Node::Hashed(hash))
        }
        Node::Internal(n) => {
            let mut n = (*n).clone();
            n.left = commit_node(n.left, &path.child_with_bit(0), db, entries)?;
            n.right = commit_node(n.right, &path.child_with_bit(1), db, entries)?;
            let hash = node_hash::hash_internal(n.left.hash(), n.right.hash());
            let encoded = codec::encode_internal(n.left.hash(), n.right.hash());
            db.put_node(path, encoded)?;
            entries.push((path.clone(), CommitEntry::Updated));
            Ok(Node::Hashed(hash))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ubt_common::Address;

    fn addr(byte: u8) -> Address {
        Address::from_low_u64_be(byte as u64)
    }

    #[test]
    fn basic_data_packs_and_unpacks() {
        let packed = pack_basic_data(7, 1_000_000, 42);
        assert_eq!(unpack_basic_data(&packed), (7, 1_000_000, 42));
    }

    #[test]
    fn account_round_trips_through_commit() {
        let db: Arc<dyn TrieDB> = Arc::new(InMemoryTrieDB::new());
        let mut trie = Trie::open(Arc::clone(&db), None);
        trie.update_account(addr(1), 3, 500, 0).expect("update");
        let (root_hash, entries) = trie.commit().expect("commit");
        assert!(!entries.is_empty());
        assert_ne!(root_hash, NodeHash::ZERO);

        let reopened = Trie::open(db, Some(root_hash));
        assert_eq!(
            reopened.get_account(addr(1)).expect("get"),
            Some((3, 500, 0))
        );
    }

    #[test]
    fn storage_delete_restores_empty_root() {
        let db: Arc<dyn TrieDB> = Arc::new(InMemoryTrieDB::new());
        let mut trie = Trie::open(Arc::clone(&db), None);
        let slot = H256::from_low_u64_be(9);
        trie.update_storage(addr(1), slot, H256::from_low_u64_be(77))
            .expect("set");
        trie.update_storage(addr(1), slot, H256::zero()).expect("clear");
        assert_eq!(trie.hash(), NodeHash::ZERO);
    }

    #[test]
    fn code_round_trips_in_chunks() {
        let db: Arc<dyn TrieDB> = Arc::new(InMemoryTrieDB::new());
        let mut trie = Trie::open(db, None);
        let code = vec![0xabu8; 70];
        trie.update_contract_code(addr(1), &code).expect("write code");
        let got = trie.get_code(addr(1), code.len() as u32).expect("read code");
        assert_eq!(got, Some(bytes::Bytes::from(code)));
    }

    #[test]
    fn copy_is_independent_of_further_writes() {
        let db: Arc<dyn TrieDB> = Arc::new(InMemoryTrieDB::new());
        let mut trie = Trie::open(db, None);
        trie.update_account(addr(1), 1, 1, 0).expect("update");
        let snapshot = trie.copy();
        trie.update_account(addr(2), 2, 2, 0).expect("update");
        assert_eq!(snapshot.get_account(addr(2)).expect("get"), None);
        assert_eq!(trie.get_account(addr(2)).expect("get"), Some((2, 2, 0)));
    }
}
