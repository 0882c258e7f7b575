//! On-disk and witness-blob encoding for trie nodes (spec.md §4.B, §4.F).
//!
//! Encoded bytes are exactly what gets hashed to reproduce a node's
//! [`NodeHash`] during proof verification, so the format carries child
//! hashes rather than child subtrees.

use std::sync::Arc;

use crate::error::TrieError;
use crate::node::{empty_values, InternalNode, Node, StemNode, Values};
use crate::node_hash::NodeHash;

const TAG_INTERNAL: u8 = 0x01;
const TAG_STEM: u8 = 0x02;

/// A decoded node, still missing the depth an [`InternalNode`] needs (the
/// caller supplies it from the path being resolved).
pub enum DecodedNode {
    Internal { left: NodeHash, right: NodeHash },
    Stem(StemNode),
}

pub fn encode_internal(left: NodeHash, right: NodeHash) -> Vec<u8> {
    let mut out = Vec::with_capacity(1 + 32 + 32);
    out.push(TAG_INTERNAL);
    out.extend_from_slice(left.as_bytes());
    out.extend_from_slice(right.as_bytes());
    out
}

pub fn encode_stem(stem: &[u8; 31], values: &Values) -> Vec<u8> {
    let mut bitmap = [0u8; 32];
    let mut payload = Vec::new();
    for (i, slot) in values.iter().enumerate() {
        if let Some(v) = slot {
            bitmap[i / 8] |= 1 << (7 - (i % 8));
            payload.extend_from_slice(v);
        }
    }
    let mut out = Vec::with_capacity(1 + 31 + 32 + payload.len());
    out.push(TAG_STEM);
    out.extend_from_slice(stem);
    out.extend_from_slice(&bitmap);
    out.extend_from_slice(&payload);
    out
}

/// Encodes a resolved node for storage. `Empty` and `Hashed` never reach the
/// backend: they carry nothing new to persist.
pub fn encode_node(node: &Node) -> Result<Vec<u8>, TrieError> {
    match node {
        Node::Internal(n) => Ok(encode_internal(n.left.hash(), n.right.hash())),
        Node::Stem(s) => Ok(encode_stem(&s.stem, &s.values)),
        Node::Empty | Node::Hashed(_) => Err(TrieError::InvalidEncoding),
    }
}

pub fn decode_node_raw(bytes: &[u8]) -> Result<DecodedNode, TrieError> {
    match bytes.first() {
        Some(&TAG_INTERNAL) => {
            if bytes.len() != 1 + 32 + 32 {
                return Err(TrieError::InvalidEncoding);
            }
            let mut left = [0u8; 32];
            let mut right = [0u8; 32];
            left.copy_from_slice(&bytes[1..33]);
            right.copy_from_slice(&bytes[33..65]);
            Ok(DecodedNode::Internal {
                left: NodeHash(left),
                right: NodeHash(right),
            })
        }
        Some(&TAG_STEM) => {
            if bytes.len() < 1 + 31 + 32 {
                return Err(TrieError::InvalidEncoding);
            }
            let mut stem = [0u8; 31];
            stem.copy_from_slice(&bytes[1..32]);
            let bitmap = &bytes[32..64];
            let mut values: Values = empty_values();
            let mut cursor = 64;
            for i in 0..256 {
                if bitmap[i / 8] & (1 << (7 - (i % 8))) != 0 {
                    if cursor + 32 > bytes.len() {
                        return Err(TrieError::InvalidEncoding);
                    }
                    let mut v = [0u8; 32];
                    v.copy_from_slice(&bytes[cursor..cursor + 32]);
                    values[i] = Some(v);
                    cursor += 32;
                }
            }
            if cursor != bytes.len() {
                return Err(TrieError::InvalidEncoding);
            }
            Ok(DecodedNode::Stem(StemNode { stem, values }))
        }
        _ => Err(TrieError::InvalidEncoding),
    }
}

/// Decodes a node at a known depth, producing a fully-formed [`Node`] whose
/// children are left as `Hashed` placeholders.
pub fn decode_node_at(bytes: &[u8], depth: u8) -> Result<Node, TrieError> {
    match decode_node_raw(bytes)? {
        DecodedNode::Internal { left, right } => Ok(Node::Internal(Arc::new(InternalNode {
            left: Node::Hashed(left),
            right: Node::Hashed(right),
            depth,
        }))),
        DecodedNode::Stem(s) => Ok(Node::Stem(Arc::new(s))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::node_hash::hash_value;

    #[test]
    fn internal_round_trips() {
        let left = NodeHash([1u8; 32]);
        let right = NodeHash([2u8; 32]);
        let encoded = encode_internal(left, right);
        match decode_node_raw(&encoded).expect("decode") {
            DecodedNode::Internal { left: l, right: r } => {
                assert_eq!(l, left);
                assert_eq!(r, right);
            }
            _ => panic!("expected internal"),
        }
    }

    #[test]
    fn stem_round_trips_sparse_values() {
        let stem = [7u8; 31];
        let mut values = empty_values();
        values[3] = Some([9u8; 32]);
        values[255] = Some([8u8; 32]);
        let encoded = encode_stem(&stem, &values);
        match decode_node_raw(&encoded).expect("decode") {
            DecodedNode::Stem(s) => {
                assert_eq!(s.stem, stem);
                assert_eq!(s.values[3], Some([9u8; 32]));
                assert_eq!(s.values[255], Some([8u8; 32]));
                assert_eq!(s.values[0], None);
                assert_eq!(s.hash(), {
                    let mut leaves = [NodeHash::ZERO; 256];
                    leaves[3] = hash_value(&[9u8; 32]);
                    leaves[255] = hash_value(&[8u8; 32]);
                    crate::node_hash::hash_stem(&stem, crate::node_hash::values_merkle_root(&leaves))
                });
            }
            _ => panic!("expected stem"),
        }
    }
}
