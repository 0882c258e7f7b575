//! UBT tree-key derivation (spec.md §4.A).
//!
//! `H` is fixed to SHA-256 per EIP-7864. A 32-byte tree key is a 31-byte
//! stem followed by a 1-byte suffix; the stem is `H(0x00×12 ∥ address ∥
//! keyInput[:31])`, truncated to its first 31 bytes.

use sha2::{Digest, Sha256};
use ubt_common::{
    constants::{BASIC_DATA_SUFFIX, CODE_HASH_SUFFIX},
    Address, TreeKey, H256,
};

/// `stemFor(address, keyInput31) → 31B` (spec.md §4.A).
pub fn stem_for(address: Address, key_input_31: &[u8; 31]) -> [u8; 31] {
    let mut hasher = Sha256::new();
    hasher.update([0u8; 12]);
    hasher.update(address.as_bytes());
    hasher.update(key_input_31);
    let digest = hasher.finalize();
    let mut stem = [0u8; 31];
    stem.copy_from_slice(&digest[..31]);
    stem
}

/// `fullKey(address, keyInput32) → 32B` (stem ∥ keyInput[31]).
pub fn full_key(address: Address, key_input_32: &[u8; 32]) -> TreeKey {
    let mut key_input_31 = [0u8; 31];
    key_input_31.copy_from_slice(&key_input_32[..31]);
    let stem = stem_for(address, &key_input_31);
    let mut key = [0u8; 32];
    key[..31].copy_from_slice(&stem);
    key[31] = key_input_32[31];
    key
}

/// Tree key for an account's packed `BasicData` word (suffix `0x00`).
pub fn basic_data_key(address: Address) -> TreeKey {
    full_key(address, &[0u8; 32])
}

/// Tree key for an account's `CodeHash` word (suffix `0x01`).
///
/// Shares a stem with [`basic_data_key`]: both derive from an all-zero
/// 31-byte prefix, differing only in the final suffix byte.
pub fn code_hash_key(address: Address) -> TreeKey {
    let mut key_input = [0u8; 32];
    key_input[31] = CODE_HASH_SUFFIX;
    full_key(address, &key_input)
}

/// Tree key for a raw (unhashed) storage slot.
///
/// `rawSlot` is the full 32-byte key input: stem derives from
/// `rawSlot[:31]`, suffix is `rawSlot[31]`. Storage slots whose numeric
/// value is below 256 therefore land in the same stem as
/// [`basic_data_key`]/[`code_hash_key`] (first 31 bytes zero) — this is the
/// literal derivation given in spec.md §4.A and is not further offset; slot
/// numbers `0` and `1` alias the `BasicData`/`CodeHash` suffixes in that
/// stem. See DESIGN.md ("key codec: header/storage suffix aliasing").
pub fn storage_slot_key(address: Address, raw_slot: H256) -> TreeKey {
    full_key(address, raw_slot.as_fixed_bytes())
}

/// Tree key for one 31-byte code chunk, indexed from `0`.
///
/// `keyInput` packs the chunk index into the low bytes of the 32-byte input
/// with the high (suffix) byte carrying the same index modulo 256, and the
/// stem absorbing the index's high bits — giving each group of 256 chunks
/// its own stem, mirroring how storage slots group by 256 above.
pub fn code_chunk_key(address: Address, chunk_index: u64) -> TreeKey {
    let mut key_input = [0u8; 32];
    key_input[24..32].copy_from_slice(&chunk_index.to_be_bytes());
    full_key(address, &key_input)
}

/// Whether `suffix` falls in the BasicData/CodeHash header range.
pub fn is_header_suffix(suffix: u8) -> bool {
    suffix == BASIC_DATA_SUFFIX || suffix == CODE_HASH_SUFFIX
}
