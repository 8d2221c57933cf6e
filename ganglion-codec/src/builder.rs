// ganglion-codec/src/builder.rs
//
// The source's builder resets its cursor on `Build()` via a deferred
// reset whose receiver type is inconsistent between the value-receiver
// definition and a pointer-receiver call site, leaving the safety of
// reusing one builder across concurrent callers unclear. This port
// avoids the ambiguity: a `TupleBuilder` is a plain owned value,
// `build()` consumes it, and there is no reset method to reuse. Callers
// that want to build many tuples construct a fresh builder each time;
// a builder is never shared across tasks.

use crate::header::{encode_header, max_for_size_enum, width_for_enum, write_length, BODY_FIXED_HEADER_SIZE};
use crate::registry::TupleSchema;

pub const TUPLE_FORMAT_VERSION: u8 = 1;

pub struct TupleBuilder {
    schema: TupleSchema,
    fields: Vec<Vec<u8>>,
}

impl TupleBuilder {
    pub fn new(schema: TupleSchema) -> Self {
        Self {
            schema,
            fields: Vec::with_capacity(schema.field_count as usize),
        }
    }

    /// Appends one field's encoded bytes. Must be called exactly
    /// `schema.field_count` times before `build()`.
    pub fn push_field(&mut self, bytes: impl Into<Vec<u8>>) -> &mut Self {
        self.fields.push(bytes.into());
        self
    }

    /// Serialises the full on-wire record: protocol header, length
    /// field, and body (tuple_version, namespace_hash, type_hash,
    /// field_count, field-offset table, payload).
    pub fn build(self) -> Vec<u8> {
        debug_assert_eq!(
            self.fields.len(),
            self.schema.field_count as usize,
            "builder for {} expected {} fields, got {}",
            self.schema.type_name,
            self.schema.field_count,
            self.fields.len()
        );

        let payload_len: usize = self.fields.iter().map(Vec::len).sum();
        let offset_table_len_for = |width: usize| self.fields.len() * width;

        // The length field written on the wire encodes body_len, not
        // payload_len -- and body_len itself grows with the width chosen
        // for the offset table, so the width has to be picked against its
        // own resulting body_len rather than against payload_len alone.
        // Four candidate widths, increasing: body_len at width=8 always
        // fits a u64 length field, so this always terminates.
        let (size_enum, width, body_len) = (0u8..=3)
            .map(|size_enum| {
                let width = width_for_enum(size_enum);
                let body_len = BODY_FIXED_HEADER_SIZE + offset_table_len_for(width) + payload_len;
                (size_enum, width, body_len)
            })
            .find(|&(size_enum, _, body_len)| body_len <= max_for_size_enum(size_enum))
            .expect("body_len must fit within an 8-byte length field");

        let mut body = Vec::with_capacity(body_len);
        body.push(TUPLE_FORMAT_VERSION);
        body.extend_from_slice(&self.schema.namespace_hash.to_le_bytes());
        body.extend_from_slice(&self.schema.type_hash.to_le_bytes());
        body.extend_from_slice(&(self.fields.len() as u32).to_le_bytes());

        let mut offset = 0u64;
        for field in &self.fields {
            let mut raw = [0u8; 8];
            raw[..8].copy_from_slice(&offset.to_le_bytes());
            body.extend_from_slice(&raw[..width]);
            offset += field.len() as u64;
        }
        for field in &self.fields {
            body.extend_from_slice(field);
        }

        let mut record = Vec::with_capacity(1 + width + body.len());
        record.push(encode_header(size_enum));
        write_length(&mut record, body.len(), width);
        record.extend_from_slice(&body);
        record
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry;

    #[test]
    fn builds_expected_layout() {
        let schema = registry::register("ganglion-test", "Pair", 2);
        let mut b = TupleBuilder::new(schema);
        b.push_field(b"ab".to_vec());
        b.push_field(b"cde".to_vec());
        let record = b.build();

        // header byte + 1-byte length field for a tiny payload
        assert_eq!(record[0] & 0b0011_1111, crate::header::PROTOCOL_VERSION);
        let body_len = record[1] as usize;
        assert_eq!(record.len(), 2 + body_len);
    }

    #[test]
    fn widens_length_field_when_offset_table_pushes_body_over_the_boundary() {
        // payload_len = 250 alone fits a u8, but BODY_FIXED_HEADER_SIZE
        // (13) + a 1-byte offset table pushes body_len to 264, which
        // does not -- the length field must widen to 2 bytes.
        let schema = registry::register("ganglion-test", "Wide", 1);
        let mut b = TupleBuilder::new(schema);
        b.push_field(vec![0u8; 250]);
        let record = b.build();

        let size_enum = record[0] >> 6;
        assert_eq!(size_enum, 1, "expected a 2-byte length field");
        let width = crate::header::width_for_enum(size_enum as u8);
        let body_len = crate::header::read_length(&record[1..1 + width], width);
        assert_eq!(record.len(), 1 + width + body_len);
    }
}
