//! Inclusion / exclusion proofs over the binary trie (spec.md §4.B `Prove`,
//! `Verify`). A proof is the sibling hash at every internal node on the path
//! from the root to the target stem, plus the target stem's own encoding
//! (or nothing, if the path bottoms out at an `Empty` node).

use crate::codec::{decode_node_raw, DecodedNode};
use crate::db::TrieDB;
use crate::error::ProofError;
use crate::node::{get as node_get, Node};
use crate::node_hash::{hash_internal, NodeHash};
use crate::path::NodePath;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProofStep {
    pub depth: u8,
    pub sibling: NodeHash,
    pub went_left: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Proof {
    pub steps: Vec<ProofStep>,
    /// The encoded stem node at the end of the path, or `None` if the path
    /// bottomed out at an `Empty` node before reaching full stem depth.
    pub stem_encoding: Option<Vec<u8>>,
}

/// Walks from `root` down to the stem for `stem`, recording sibling hashes.
pub fn prove(
    root: &Node,
    stem: &[u8; 31],
    db: &dyn TrieDB,
) -> Result<Proof, crate::error::TrieError> {
    let mut steps = Vec::new();
    let mut node = root.clone();
    let mut path = NodePath::root();

    loop {
        match node {
            Node::Empty => {
                return Ok(Proof {
                    steps,
                    stem_encoding: None,
                })
            }
            Node::Hashed(h) => {
                node = crate::node::resolve(h, &path, db)?;
            }
            Node::Stem(s) => {
                return Ok(Proof {
                    steps,
                    stem_encoding: Some(crate::codec::encode_stem(&s.stem, &s.values)),
                })
            }
            Node::Internal(n) => {
                let bit = NodePath::bit_at(stem, n.depth);
                let (chosen, sibling_hash, went_left) = if bit == 0 {
                    (n.left.clone(), n.right.hash(), true)
                } else {
                    (n.right.clone(), n.left.hash(), false)
                };
                steps.push(ProofStep {
                    depth: n.depth,
                    sibling: sibling_hash,
                    went_left,
                });
                path = path.child(pad(stem).as_slice());
                node = chosen;
            }
        }
    }
}

fn pad(stem: &[u8; 31]) -> [u8; 32] {
    let mut key = [0u8; 32];
    key[..31].copy_from_slice(stem);
    key
}

/// Recomputes the root hash implied by `proof` and, if it matches
/// `expected_root`, returns the value at `suffix` (or `None` if the proof
/// demonstrates absence).
pub fn verify(
    expected_root: NodeHash,
    stem: &[u8; 31],
    suffix: u8,
    proof: &Proof,
) -> Result<Option<[u8; 32]>, ProofError> {
    let (mut current, value) = match &proof.stem_encoding {
        None => (NodeHash::ZERO, None),
        Some(encoded) => {
            let decoded = decode_node_raw(encoded)
                .map_err(|_| ProofError::MalformedNode(expected_root))?;
            let s = match decoded {
                DecodedNode::Stem(s) => s,
                DecodedNode::Internal { .. } => {
                    return Err(ProofError::MalformedNode(expected_root))
                }
            };
            let hash = s.hash();
            let value = if s.stem == *stem {
                s.values[suffix as usize]
            } else {
                None
            };
            (hash, value)
        }
    };

    for step in proof.steps.iter().rev() {
        current = if step.went_left {
            hash_internal(current, step.sibling)
        } else {
            hash_internal(step.sibling, current)
        };
    }

    if current == expected_root {
        Ok(value)
    } else {
        Err(ProofError::HashMismatch(expected_root))
    }
}

/// Convenience wrapper returning the value directly, for callers that
/// already trust the backend (used by `Trie::get` internally, not by
/// externally-verified proof consumers).
pub fn get_via_tree(
    root: &Node,
    path: &NodePath,
    stem: &[u8; 31],
    suffix: u8,
    db: &dyn TrieDB,
) -> Result<Option<[u8; 32]>, crate::error::TrieError> {
    node_get(root, path, stem, suffix, db)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::InMemoryTrieDB;
    use crate::node::insert;

    #[test]
    fn proof_round_trips_for_present_value() {
        let db = InMemoryTrieDB::new();
        let stem_a = [1u8; 31];
        let stem_b = [200u8; 31];
        let root = insert(Node::Empty, &NodePath::root(), &stem_a, 3, [5u8; 32], &db)
            .expect("insert a");
        let root = insert(root, &NodePath::root(), &stem_b, 1, [6u8; 32], &db).expect("insert b");
        let root_hash = root.hash();

        let proof = prove(&root, &stem_a, &db).expect("prove");
        let value = verify(root_hash, &stem_a, 3, &proof).expect("verify");
        assert_eq!(value, Some([5u8; 32]));
    }

    #[test]
    fn proof_detects_forged_value() {
        let db = InMemoryTrieDB::new();
        let stem_a = [1u8; 31];
        let root = insert(Node::Empty, &NodePath::root(), &stem_a, 3, [5u8; 32], &db)
            .expect("insert");
        let root_hash = root.hash();
        let mut proof = prove(&root, &stem_a, &db).expect("prove");

        let mut forged = crate::node::empty_values();
        forged[3] = Some([0xffu8; 32]);
        proof.stem_encoding = Some(crate::codec::encode_stem(&stem_a, &forged));

        let result = verify(root_hash, &stem_a, 3, &proof);
        assert_eq!(result, Err(ProofError::HashMismatch(root_hash)));
    }

    #[test]
    fn absence_proof_for_empty_tree() {
        let root = Node::Empty;
        let db = InMemoryTrieDB::new();
        let stem = [9u8; 31];
        let proof = prove(&root, &stem, &db).expect("prove");
        let value = verify(root.hash(), &stem, 0, &proof).expect("verify");
        assert_eq!(value, None);
    }
}
