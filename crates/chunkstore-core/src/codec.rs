//! Binary primitives shared by the commit-buffer and snapshot wire formats.
//!
//! All integers are little-endian; unsigned lengths are varints, matching
//! spec.md §6 exactly.

use crate::error::{Error, Result};
use crate::value::Value;
use bytes::{Buf, BufMut, Bytes, BytesMut};

/// Writes `v` as a ULEB128 varint.
pub fn put_uvarint(buf: &mut BytesMut, mut v: u64) {
    loop {
        let byte = (v & 0x7f) as u8;
        v >>= 7;
        if v == 0 {
            buf.put_u8(byte);
            break;
        }
        buf.put_u8(byte | 0x80);
    }
}

/// Reads a ULEB128 varint, advancing `buf`.
///
/// # Errors
/// Returns [`Error::SerializationError`] if the buffer ends mid-varint.
pub fn get_uvarint(buf: &mut Bytes) -> Result<u64> {
    let mut result: u64 = 0;
    let mut shift = 0u32;
    loop {
        if !buf.has_remaining() {
            return Err(Error::SerializationError("truncated varint".into()));
        }
        let byte = buf.get_u8();
        result |= u64::from(byte & 0x7f) << shift;
        if byte & 0x80 == 0 {
            return Ok(result);
        }
        shift += 7;
        if shift >= 64 {
            return Err(Error::SerializationError("varint too long".into()));
        }
    }
}

/// Value type tags used inside a Put/Merge/Insert payload.
mod value_tag {
    pub const I64: u8 = 0;
    pub const U64: u8 = 1;
    pub const F64: u8 = 2;
    pub const STR: u8 = 3;
    pub const ENUM: u8 = 4;
    pub const BYTES: u8 = 5;
    pub const NULL: u8 = 6;
    pub const BOOL: u8 = 7;
}

/// Encodes a value (used for non-bool Put/Merge/Insert payloads).
pub fn put_value(buf: &mut BytesMut, value: &Value) {
    match value {
        Value::I64(v) => {
            buf.put_u8(value_tag::I64);
            buf.put_i64_le(*v);
        }
        Value::U64(v) => {
            buf.put_u8(value_tag::U64);
            buf.put_u64_le(*v);
        }
        Value::F64(v) => {
            buf.put_u8(value_tag::F64);
            buf.put_f64_le(*v);
        }
        Value::Str(s) => {
            buf.put_u8(value_tag::STR);
            put_uvarint(buf, s.len() as u64);
            buf.put_slice(s.as_bytes());
        }
        Value::Enum(s) => {
            buf.put_u8(value_tag::ENUM);
            put_uvarint(buf, s.len() as u64);
            buf.put_slice(s.as_bytes());
        }
        Value::Bytes(b) => {
            buf.put_u8(value_tag::BYTES);
            put_uvarint(buf, b.len() as u64);
            buf.put_slice(b);
        }
        Value::Bool(b) => {
            buf.put_u8(value_tag::BOOL);
            buf.put_u8(u8::from(*b));
        }
        Value::Null => {
            buf.put_u8(value_tag::NULL);
        }
    }
}

/// Decodes a value written by [`put_value`].
///
/// # Errors
/// Returns [`Error::SerializationError`] on a truncated or unknown payload.
pub fn get_value(buf: &mut Bytes) -> Result<Value> {
    if !buf.has_remaining() {
        return Err(Error::SerializationError("truncated value".into()));
    }
    let tag = buf.get_u8();
    match tag {
        value_tag::I64 => {
            require(buf, 8)?;
            Ok(Value::I64(buf.get_i64_le()))
        }
        value_tag::U64 => {
            require(buf, 8)?;
            Ok(Value::U64(buf.get_u64_le()))
        }
        value_tag::F64 => {
            require(buf, 8)?;
            Ok(Value::F64(buf.get_f64_le()))
        }
        value_tag::STR => Ok(Value::Str(get_string(buf)?)),
        value_tag::ENUM => Ok(Value::Enum(get_string(buf)?)),
        value_tag::BYTES => {
            let len = get_uvarint(buf)? as usize;
            require(buf, len)?;
            Ok(Value::Bytes(buf.copy_to_bytes(len).to_vec()))
        }
        value_tag::NULL => Ok(Value::Null),
        value_tag::BOOL => {
            require(buf, 1)?;
            Ok(Value::Bool(buf.get_u8() != 0))
        }
        other => Err(Error::SerializationError(format!(
            "unknown value tag {other}"
        ))),
    }
}

fn get_string(buf: &mut Bytes) -> Result<String> {
    let len = get_uvarint(buf)? as usize;
    require(buf, len)?;
    let bytes = buf.copy_to_bytes(len);
    String::from_utf8(bytes.to_vec())
        .map_err(|e| Error::SerializationError(format!("invalid utf8: {e}")))
}

fn require(buf: &Bytes, n: usize) -> Result<()> {
    if buf.remaining() < n {
        Err(Error::SerializationError("truncated payload".into()))
    } else {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn varint_round_trips_small_and_large() {
        for v in [0u64, 1, 127, 128, 300, u64::MAX] {
            let mut buf = BytesMut::new();
            put_uvarint(&mut buf, v);
            let mut bytes = buf.freeze();
            assert_eq!(get_uvarint(&mut bytes).unwrap(), v);
        }
    }

    #[test]
    fn value_round_trips_each_variant() {
        let values = vec![
            Value::I64(-7),
            Value::U64(42),
            Value::F64(3.5),
            Value::Str("hello".into()),
            Value::Enum("human".into()),
            Value::Bytes(vec![1, 2, 3]),
            Value::Bool(true),
            Value::Null,
        ];
        for v in values {
            let mut buf = BytesMut::new();
            put_value(&mut buf, &v);
            let mut bytes = buf.freeze();
            assert_eq!(get_value(&mut bytes).unwrap(), v);
        }
    }

    #[test]
    fn truncated_varint_errors() {
        let mut bytes = Bytes::from_static(&[0x80]);
        assert!(get_uvarint(&mut bytes).is_err());
    }
}
