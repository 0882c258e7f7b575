//! Tree-key layout constants from EIP-7864.

/// Suffix byte selecting the packed `BasicData` word (nonce, balance, code size).
pub const BASIC_DATA_SUFFIX: u8 = 0x00;
/// Suffix byte selecting the `CodeHash` word.
pub const CODE_HASH_SUFFIX: u8 = 0x01;
/// First suffix byte used for in-header storage slots.
pub const HEADER_STORAGE_OFFSET: u8 = 0x40;
/// One past the last suffix byte used for in-header storage slots.
pub const HEADER_STORAGE_END: u16 = 0x80;
/// First suffix byte used for code chunks.
pub const CODE_OFFSET: u16 = 0x80;
/// Number of values addressable by a single stem (one per suffix byte).
pub const STEM_WIDTH: usize = 256;
/// Bytes of code packed into a single code chunk.
pub const CODE_CHUNK_SIZE: usize = 31;
/// Maximum depth of an `InternalNode` (a stem occupies the first 248 bits).
pub const MAX_INTERNAL_DEPTH: u8 = 247;
/// Number of bits in a stem.
pub const STEM_BITS: usize = 248;
/// Balances wider than this many bits are rejected (`BasicData` packs 16 bytes).
pub const MAX_BALANCE_BITS: u32 = 128;

pub const UBT_PKG_NAME: &str = env!("CARGO_PKG_NAME");
pub const UBT_PKG_VERSION: &str = env!("CARGO_PKG_VERSION");
