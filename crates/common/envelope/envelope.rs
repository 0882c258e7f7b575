//! Deterministic binary wire codec for outbox entries (spec.md §4.C).
//!
//! Fields are fixed-order and length-prefixed; there is no RLP or serde
//! involved; the exact byte layout is the wire contract between the
//! emitter and every consumer.

use thiserror::Error;

use ubt_common::{
    Address, CodeEntry, Envelope, EnvelopeKind, EnvelopePayload, QueuedDiffV1, ReorgMarkerV1,
    StorageEntry, AccountEntry, H256, ENVELOPE_VERSION,
};

#[derive(Debug, Error, PartialEq, Eq)]
pub enum EnvelopeCodecError {
    #[error("truncated envelope: expected at least {0} more bytes")]
    Truncated(usize),
    #[error("unknown envelope version {0}")]
    UnknownVersion(u16),
    #[error("unknown envelope payload kind tag {0}")]
    UnknownKind(u8),
    #[error("balance sign byte {0} is not a valid non-negative marker")]
    NegativeBalance(u8),
    #[error("balance magnitude of {0} bytes exceeds 128 bits")]
    BalanceOverflow(usize),
    #[error("trailing bytes after a fully decoded envelope")]
    TrailingBytes,
}

use EnvelopeCodecError as CodecErr;

struct Writer {
    buf: Vec<u8>,
}

impl Writer {
    fn new() -> Self {
        Writer { buf: Vec::new() }
    }
    fn u8(&mut self, v: u8) {
        self.buf.push(v);
    }
    fn u16(&mut self, v: u16) {
        self.buf.extend_from_slice(&v.to_be_bytes());
    }
    fn u32(&mut self, v: u32) {
        self.buf.extend_from_slice(&v.to_be_bytes());
    }
    fn u64(&mut self, v: u64) {
        self.buf.extend_from_slice(&v.to_be_bytes());
    }
    fn bytes(&mut self, v: &[u8]) {
        self.buf.extend_from_slice(v);
    }
    fn address(&mut self, v: Address) {
        self.buf.extend_from_slice(v.as_bytes());
    }
    fn h256(&mut self, v: H256) {
        self.buf.extend_from_slice(v.as_bytes());
    }
    /// Sign byte (always `0x00`, non-negative) followed by a 1-byte
    /// magnitude length and the big-endian magnitude itself.
    fn balance(&mut self, v: u128) {
        let be = v.to_be_bytes();
        let first_nonzero = be.iter().position(|b| *b != 0).unwrap_or(be.len());
        let magnitude = &be[first_nonzero..];
        self.u8(0x00);
        self.u8(magnitude.len() as u8);
        self.bytes(magnitude);
    }
    fn finish(self) -> Vec<u8> {
        self.buf
    }
}

struct Reader<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> Reader<'a> {
    fn new(buf: &'a [u8]) -> Self {
        Reader { buf, pos: 0 }
    }
    fn need(&self, n: usize) -> Result<(), EnvelopeCodecError> {
        if self.pos + n > self.buf.len() {
            Err(CodecErr::Truncated(self.pos + n - self.buf.len()))
        } else {
            Ok(())
        }
    }
    fn u8(&mut self) -> Result<u8, EnvelopeCodecError> {
        self.need(1)?;
        let v = self.buf[self.pos];
        self.pos += 1;
        Ok(v)
    }
    fn u16(&mut self) -> Result<u16, EnvelopeCodecError> {
        self.need(2)?;
        let v = u16::from_be_bytes(self.buf[self.pos..self.pos + 2].try_into().expect("2"));
        self.pos += 2;
        Ok(v)
    }
    fn u32(&mut self) -> Result<u32, EnvelopeCodecError> {
        self.need(4)?;
        let v = u32::from_be_bytes(self.buf[self.pos..self.pos + 4].try_into().expect("4"));
        self.pos += 4;
        Ok(v)
    }
    fn u64(&mut self) -> Result<u64, EnvelopeCodecError> {
        self.need(8)?;
        let v = u64::from_be_bytes(self.buf[self.pos..self.pos + 8].try_into().expect("8"));
        self.pos += 8;
        Ok(v)
    }
    fn take(&mut self, n: usize) -> Result<&'a [u8], EnvelopeCodecError> {
        self.need(n)?;
        let v = &self.buf[self.pos..self.pos + n];
        self.pos += n;
        Ok(v)
    }
    fn address(&mut self) -> Result<Address, EnvelopeCodecError> {
        Ok(Address::from_slice(self.take(20)?))
    }
    fn h256(&mut self) -> Result<H256, EnvelopeCodecError> {
        Ok(H256::from_slice(self.take(32)?))
    }
    fn balance(&mut self) -> Result<u128, EnvelopeCodecError> {
        let sign = self.u8()?;
        if sign != 0x00 {
            return Err(CodecErr::NegativeBalance(sign));
        }
        let len = self.u8()? as usize;
        if len > 16 {
            return Err(CodecErr::BalanceOverflow(len));
        }
        let magnitude = self.take(len)?;
        let mut be = [0u8; 16];
        be[16 - len..].copy_from_slice(magnitude);
        Ok(u128::from_be_bytes(be))
    }
    fn remaining(&self) -> usize {
        self.buf.len() - self.pos
    }
}

pub fn encode_account_entry(w: &mut Writer, a: &AccountEntry) {
    w.address(a.address);
    w.u64(a.nonce);
    w.balance(a.balance);
    w.h256(a.code_hash);
    w.u8(if a.alive { 1 } else { 0 });
}

fn decode_account_entry(r: &mut Reader) -> Result<AccountEntry, EnvelopeCodecError> {
    let address = r.address()?;
    let nonce = r.u64()?;
    let balance = r.balance()?;
    let code_hash = r.h256()?;
    let alive = r.u8()? != 0;
    Ok(AccountEntry {
        address,
        nonce,
        balance,
        code_hash,
        alive,
    })
}

fn encode_storage_entry(w: &mut Writer, s: &StorageEntry) {
    w.address(s.address);
    w.h256(s.raw_slot);
    w.h256(s.value);
}

fn decode_storage_entry(r: &mut Reader) -> Result<StorageEntry, EnvelopeCodecError> {
    Ok(StorageEntry {
        address: r.address()?,
        raw_slot: r.h256()?,
        value: r.h256()?,
    })
}

fn encode_code_entry(w: &mut Writer, c: &CodeEntry) {
    w.address(c.address);
    w.h256(c.code_hash);
    w.u32(c.code.len() as u32);
    w.bytes(&c.code);
}

fn decode_code_entry(r: &mut Reader) -> Result<CodeEntry, EnvelopeCodecError> {
    let address = r.address()?;
    let code_hash = r.h256()?;
    let len = r.u32()? as usize;
    let code = bytes::Bytes::copy_from_slice(r.take(len)?);
    Ok(CodeEntry {
        address,
        code_hash,
        code,
    })
}

pub fn encode_diff(diff: &QueuedDiffV1) -> Vec<u8> {
    let mut w = Writer::new();
    w.h256(diff.origin_root);
    w.h256(diff.root);
    w.u32(diff.accounts.len() as u32);
    for a in &diff.accounts {
        encode_account_entry(&mut w, a);
    }
    w.u32(diff.storage.len() as u32);
    for s in &diff.storage {
        encode_storage_entry(&mut w, s);
    }
    w.u32(diff.codes.len() as u32);
    for c in &diff.codes {
        encode_code_entry(&mut w, c);
    }
    w.finish()
}

pub fn decode_diff(bytes: &[u8]) -> Result<QueuedDiffV1, EnvelopeCodecError> {
    let mut r = Reader::new(bytes);
    let origin_root = r.h256()?;
    let root = r.h256()?;
    let accounts_len = r.u32()? as usize;
    let mut accounts = Vec::with_capacity(accounts_len);
    for _ in 0..accounts_len {
        accounts.push(decode_account_entry(&mut r)?);
    }
    let storage_len = r.u32()? as usize;
    let mut storage = Vec::with_capacity(storage_len);
    for _ in 0..storage_len {
        storage.push(decode_storage_entry(&mut r)?);
    }
    let codes_len = r.u32()? as usize;
    let mut codes = Vec::with_capacity(codes_len);
    for _ in 0..codes_len {
        codes.push(decode_code_entry(&mut r)?);
    }
    if r.remaining() != 0 {
        return Err(CodecErr::TrailingBytes);
    }
    Ok(QueuedDiffV1 {
        origin_root,
        root,
        accounts,
        storage,
        codes,
    })
}

pub fn encode_reorg(marker: &ReorgMarkerV1) -> Vec<u8> {
    let mut w = Writer::new();
    w.u64(marker.from_block_number);
    w.h256(marker.from_block_hash);
    w.u64(marker.to_block_number);
    w.h256(marker.to_block_hash);
    w.u64(marker.common_ancestor_number);
    w.h256(marker.common_ancestor_hash);
    w.finish()
}

pub fn decode_reorg(bytes: &[u8]) -> Result<ReorgMarkerV1, EnvelopeCodecError> {
    let mut r = Reader::new(bytes);
    let marker = ReorgMarkerV1 {
        from_block_number: r.u64()?,
        from_block_hash: r.h256()?,
        to_block_number: r.u64()?,
        to_block_hash: r.h256()?,
        common_ancestor_number: r.u64()?,
        common_ancestor_hash: r.h256()?,
    };
    if r.remaining() != 0 {
        return Err(CodecErr::TrailingBytes);
    }
    Ok(marker)
}

const KIND_DIFF: u8 = 0;
const KIND_REORG: u8 = 1;

/// Encodes a full [`Envelope`]: header fields, a one-byte kind tag, then the
/// length-prefixed payload.
pub fn encode_envelope(envelope: &Envelope) -> Vec<u8> {
    let mut w = Writer::new();
    w.u64(envelope.seq);
    w.u16(envelope.version);
    w.u64(envelope.block_number);
    w.h256(envelope.block_hash);
    w.h256(envelope.parent_hash);
    w.u64(envelope.timestamp);
    let (kind, payload) = match &envelope.payload {
        EnvelopePayload::Diff(d) => (KIND_DIFF, encode_diff(d)),
        EnvelopePayload::Reorg(m) => (KIND_REORG, encode_reorg(m)),
    };
    w.u8(kind);
    w.u32(payload.len() as u32);
    w.bytes(&payload);
    w.finish()
}

pub fn decode_envelope(bytes: &[u8]) -> Result<Envelope, EnvelopeCodecError> {
    let mut r = Reader::new(bytes);
    let seq = r.u64()?;
    let version = r.u16()?;
    if version != ENVELOPE_VERSION {
        return Err(CodecErr::UnknownVersion(version));
    }
    let block_number = r.u64()?;
    let block_hash = r.h256()?;
    let parent_hash = r.h256()?;
    let timestamp = r.u64()?;
    let kind = r.u8()?;
    let payload_len = r.u32()? as usize;
    let payload_bytes = r.take(payload_len)?;
    if r.remaining() != 0 {
        return Err(CodecErr::TrailingBytes);
    }
    let payload = match kind {
        KIND_DIFF => EnvelopePayload::Diff(decode_diff(payload_bytes)?),
        KIND_REORG => EnvelopePayload::Reorg(decode_reorg(payload_bytes)?),
        other => return Err(CodecErr::UnknownKind(other)),
    };
    debug_assert_eq!(payload.kind(), if kind == KIND_DIFF { EnvelopeKind::Diff } else { EnvelopeKind::Reorg });
    Ok(Envelope {
        seq,
        version,
        block_number,
        block_hash,
        parent_hash,
        timestamp,
        payload,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_diff() -> QueuedDiffV1 {
        QueuedDiffV1 {
            origin_root: H256::from_low_u64_be(1),
            root: H256::from_low_u64_be(2),
            accounts: vec![AccountEntry {
                address: Address::from_low_u64_be(7),
                nonce: 4,
                balance: 123_456_789_012_345,
                code_hash: H256::from_low_u64_be(9),
                alive: true,
            }],
            storage: vec![StorageEntry {
                address: Address::from_low_u64_be(7),
                raw_slot: H256::from_low_u64_be(3),
                value: H256::from_low_u64_be(42),
            }],
            codes: vec![CodeEntry {
                address: Address::from_low_u64_be(7),
                code_hash: H256::from_low_u64_be(9),
                code: bytes::Bytes::from_static(b"\x60\x00\x60\x00"),
            }],
        }
    }

    #[test]
    fn diff_round_trips() {
        let diff = sample_diff();
        let encoded = encode_diff(&diff);
        let decoded = decode_diff(&encoded).expect("decode");
        assert_eq!(decoded, diff);
    }

    #[test]
    fn envelope_round_trips_a_diff_payload() {
        let envelope = Envelope {
            seq: 99,
            version: ENVELOPE_VERSION,
            block_number: 10,
            block_hash: H256::from_low_u64_be(11),
            parent_hash: H256::from_low_u64_be(12),
            timestamp: 1_700_000_000,
            payload: EnvelopePayload::Diff(sample_diff()),
        };
        let encoded = encode_envelope(&envelope);
        let decoded = decode_envelope(&encoded).expect("decode");
        assert_eq!(decoded, envelope);
    }

    #[test]
    fn envelope_round_trips_a_reorg_payload() {
        let marker = ReorgMarkerV1 {
            from_block_number: 10,
            from_block_hash: H256::from_low_u64_be(1),
            to_block_number: 7,
            to_block_hash: H256::from_low_u64_be(2),
            common_ancestor_number: 6,
            common_ancestor_hash: H256::from_low_u64_be(3),
        };
        let envelope = Envelope {
            seq: 5,
            version: ENVELOPE_VERSION,
            block_number: 7,
            block_hash: H256::from_low_u64_be(2),
            parent_hash: H256::from_low_u64_be(4),
            timestamp: 1_700_000_001,
            payload: EnvelopePayload::Reorg(marker),
        };
        let encoded = encode_envelope(&envelope);
        let decoded = decode_envelope(&encoded).expect("decode");
        assert_eq!(decoded, envelope);
    }

    #[test]
    fn rejects_unknown_version() {
        let mut w = Writer::new();
        w.u64(1);
        w.u16(ENVELOPE_VERSION + 1);
        let encoded = w.finish();
        assert_eq!(
            decode_envelope(&encoded),
            Err(EnvelopeCodecError::UnknownVersion(ENVELOPE_VERSION + 1))
        );
    }

    #[test]
    fn rejects_negative_balance_sign_byte() {
        let mut w = Writer::new();
        w.address(Address::from_low_u64_be(1));
        w.u64(0);
        w.u8(0x01);
        w.u8(0);
        w.h256(H256::zero());
        w.u8(1);
        let encoded = w.finish();
        let mut r = Reader::new(&encoded);
        let _ = r.address();
        let _ = r.u64();
        assert_eq!(r.balance(), Err(EnvelopeCodecError::NegativeBalance(0x01)));
    }

    #[test]
    fn rejects_truncated_input() {
        let encoded = vec![0u8; 3];
        assert!(matches!(
            decode_envelope(&encoded),
            Err(EnvelopeCodecError::Truncated(_))
        ));
    }

    #[test]
    fn balance_encoding_strips_leading_zero_bytes() {
        let mut w = Writer::new();
        w.balance(0);
        let encoded = w.finish();
        assert_eq!(encoded, vec![0x00, 0x00]);
    }
}
