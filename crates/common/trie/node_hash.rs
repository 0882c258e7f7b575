//! Node hashing (spec.md §4.B). `H` is SHA-256, fixed per EIP-7864.

use sha2::{Digest, Sha256};

/// A 32-byte node hash. The zero value means "absent" (the hash of an
/// `Empty` node, and of an absent stem value slot).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeHash(pub [u8; 32]);

impl NodeHash {
    pub const ZERO: NodeHash = NodeHash([0u8; 32]);

    pub fn is_zero(&self) -> bool {
        self.0 == [0u8; 32]
    }

    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }
}

impl From<[u8; 32]> for NodeHash {
    fn from(value: [u8; 32]) -> Self {
        NodeHash(value)
    }
}

impl std::fmt::Display for NodeHash {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "0x{}", hex::encode(self.0))
    }
}

fn sha256(parts: &[&[u8]]) -> [u8; 32] {
    let mut hasher = Sha256::new();
    for part in parts {
        hasher.update(part);
    }
    let digest = hasher.finalize();
    let mut out = [0u8; 32];
    out.copy_from_slice(&digest);
    out
}

/// `H(left.hash ∥ right.hash)` for an `InternalNode`.
pub fn hash_internal(left: NodeHash, right: NodeHash) -> NodeHash {
    NodeHash(sha256(&[&left.0, &right.0]))
}

/// `H(value)` for one stem value slot; absent slots use [`NodeHash::ZERO`]
/// directly rather than hashing, per spec.md §3.
pub fn hash_value(value: &[u8; 32]) -> NodeHash {
    NodeHash(sha256(&[value]))
}

/// 8-level Merkle root `M` over the 256 per-suffix value hashes, with pairs
/// of zero children collapsing to zero (spec.md §3).
pub fn values_merkle_root(leaves: &[NodeHash; 256]) -> NodeHash {
    let mut level: Vec<NodeHash> = leaves.to_vec();
    while level.len() > 1 {
        let mut next = Vec::with_capacity(level.len() / 2);
        for pair in level.chunks(2) {
            let (l, r) = (pair[0], pair[1]);
            next.push(if l.is_zero() && r.is_zero() {
                NodeHash::ZERO
            } else {
                hash_internal(l, r)
            });
        }
        level = next;
    }
    level[0]
}

/// `H(stem ∥ 0x00 ∥ M)` for a `StemNode`.
pub fn hash_stem(stem: &[u8; 31], merkle_root: NodeHash) -> NodeHash {
    NodeHash(sha256(&[stem, &[0x00], &merkle_root.0]))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn all_absent_merkle_root_is_zero() {
        let leaves = [NodeHash::ZERO; 256];
        assert_eq!(values_merkle_root(&leaves), NodeHash::ZERO);
    }

    #[test]
    fn single_present_value_changes_root() {
        let mut leaves = [NodeHash::ZERO; 256];
        leaves[10] = hash_value(&[7u8; 32]);
        assert_ne!(values_merkle_root(&leaves), NodeHash::ZERO);
    }
}
