// ganglion-codec/src/decoder.rs

use crate::header::{parse_header, read_length, BODY_FIXED_HEADER_SIZE};
use crate::registry::{self, TupleSchema};
use ganglion_core::DecodeError;

pub const DEFAULT_MAX_SIZE: usize = 4096;

pub struct DecodedTuple {
    pub schema: TupleSchema,
    pub tuple_version: u8,
    field_offsets: Vec<u64>,
    payload: Vec<u8>,
}

impl DecodedTuple {
    pub fn field_count(&self) -> usize {
        self.field_offsets.len()
    }

    /// Slice of the payload belonging to field `idx`, derived from its
    /// start offset and the next field's start offset (or payload end).
    pub fn field_bytes(&self, idx: usize) -> &[u8] {
        let start = self.field_offsets[idx] as usize;
        let end = self
            .field_offsets
            .get(idx + 1)
            .map(|&o| o as usize)
            .unwrap_or(self.payload.len());
        &self.payload[start..end]
    }
}

/// Decodes one framed record. Rejects (per spec.md §4.1 / §8 Property 1):
/// unknown protocol version, length exceeding `max_size`, a body shorter
/// than the minimum fixed header, or an unregistered (namespace, type)
/// hash pair.
pub fn decode_record(bytes: &[u8], max_size: usize) -> Result<DecodedTuple, DecodeError> {
    if bytes.is_empty() {
        return Err(DecodeError::Truncated);
    }
    let (_version, width) = parse_header(bytes[0])?;
    if bytes.len() < 1 + width {
        return Err(DecodeError::Truncated);
    }
    let length = read_length(&bytes[1..], width);
    if length > max_size {
        return Err(DecodeError::ExceedsMax);
    }
    if bytes.len() < 1 + width + length {
        return Err(DecodeError::Truncated);
    }
    let body = &bytes[1 + width..1 + width + length];
    if body.len() < BODY_FIXED_HEADER_SIZE {
        return Err(DecodeError::Truncated);
    }

    let tuple_version = body[0];
    let namespace_hash = u32::from_le_bytes(body[1..5].try_into().unwrap());
    let type_hash = u32::from_le_bytes(body[5..9].try_into().unwrap());
    let field_count = u32::from_le_bytes(body[9..13].try_into().unwrap()) as usize;

    let schema = registry::lookup(namespace_hash, type_hash).ok_or(DecodeError::UnknownType)?;

    let offsets_len = field_count * width;
    if body.len() < BODY_FIXED_HEADER_SIZE + offsets_len {
        return Err(DecodeError::Truncated);
    }
    let offsets_bytes = &body[BODY_FIXED_HEADER_SIZE..BODY_FIXED_HEADER_SIZE + offsets_len];
    let mut field_offsets = Vec::with_capacity(field_count);
    for chunk in offsets_bytes.chunks_exact(width) {
        field_offsets.push(read_length(chunk, width) as u64);
    }

    let payload = body[BODY_FIXED_HEADER_SIZE + offsets_len..].to_vec();

    Ok(DecodedTuple {
        schema,
        tuple_version,
        field_offsets,
        payload,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builder::TupleBuilder;

    #[test]
    fn rejects_oversized_length() {
        let schema = registry::register("ganglion-test", "Big", 1);
        let mut b = TupleBuilder::new(schema);
        b.push_field(vec![0u8; 100]);
        let record = b.build();
        assert_eq!(decode_record(&record, 10), Err(DecodeError::ExceedsMax));
    }

    #[test]
    fn rejects_truncated_body() {
        let schema = registry::register("ganglion-test", "Small", 1);
        let mut b = TupleBuilder::new(schema);
        b.push_field(vec![1, 2, 3]);
        let mut record = b.build();
        record.truncate(record.len() - 2);
        assert_eq!(decode_record(&record, DEFAULT_MAX_SIZE), Err(DecodeError::Truncated));
    }

    #[test]
    fn rejects_unknown_type() {
        let schema = TupleSchema {
            namespace: "nope",
            type_name: "nope",
            namespace_hash: 0x1111_1111,
            type_hash: 0x2222_2222,
            field_count: 1,
        };
        let mut b = TupleBuilder::new(schema);
        b.push_field(vec![9]);
        let record = b.build();
        assert_eq!(decode_record(&record, DEFAULT_MAX_SIZE), Err(DecodeError::UnknownType));
    }
}
