//! # Event Decoding
//!
//! Turns a raw ring-buffer record into typed fields. Decoding never fails:
//! short records are zero-extended, out-of-range lengths are clamped to the
//! slot capacity, and invalid UTF-8 is replaced with U+FFFD.

use reqscope_common::{capture::guarded_len, FieldSlot, FIELD_SLOTS, RAW_EVENT_SIZE};

/// One captured string field
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecodedField {
    /// The first `min(claimed_len, capacity)` bytes as text
    pub text: String,
    /// Length reported by the target
    pub claimed_len: u64,
    /// Whether `claimed_len` exceeded what the record could hold
    pub truncated: bool,
}

/// Typed reconstruction of one [`reqscope_common::RequestEvent`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecodedRequest {
    pub method: DecodedField,
    pub path: DecodedField,
    /// The record was shorter than the wire size and was zero-extended
    pub short_record: bool,
}

impl DecodedRequest {
    #[must_use]
    pub fn truncated_fields(&self) -> u64 {
        u64::from(self.method.truncated) + u64::from(self.path.truncated)
    }
}

/// Decode a raw record; native byte order, as written by the probe
#[must_use]
pub fn decode_event(bytes: &[u8]) -> DecodedRequest {
    let mut record = [0u8; RAW_EVENT_SIZE];
    let available = bytes.len().min(RAW_EVENT_SIZE);
    record[..available].copy_from_slice(&bytes[..available]);

    let [method, path] = FIELD_SLOTS.map(|slot| decode_field(&record, &slot));
    DecodedRequest { method, path, short_record: bytes.len() < RAW_EVENT_SIZE }
}

fn decode_field(record: &[u8; RAW_EVENT_SIZE], slot: &FieldSlot) -> DecodedField {
    let mut len_bytes = [0u8; 8];
    len_bytes.copy_from_slice(&record[slot.len_offset..slot.len_offset + 8]);
    let claimed_len = u64::from_ne_bytes(len_bytes);

    let effective = guarded_len(claimed_len, slot.capacity);
    let data = &record[slot.data_offset..slot.data_offset + effective];

    DecodedField {
        text: String::from_utf8_lossy(data).into_owned(),
        claimed_len,
        truncated: claimed_len > effective as u64,
    }
}
