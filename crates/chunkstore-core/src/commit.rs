//! Commit buffer: the append-only, chunk-tagged operation log that is both
//! the transaction write path and the wire form of a change (spec.md §4,
//! §6).

use std::collections::BTreeMap;

use bytes::{Buf, BufMut, Bytes, BytesMut};
use roaring::RoaringBitmap;

use crate::codec::{get_uvarint, get_value, put_uvarint, put_value};
use crate::error::{Error, Result};
use crate::handle::{chunk_of, offset_of, RowHandle};
use crate::value::Value;

/// A single append to a [`CommitBuffer`].
#[derive(Debug, Clone, PartialEq)]
pub enum Op {
    /// Insert a new row, allocating presence.
    Insert(Value),
    /// Clear presence (and payload, for numeric/string columns).
    Delete,
    /// Overwrite the value, last-writer-wins.
    Put(Value),
    /// Commutatively combine with the existing value via the column's merge function.
    Merge(Value),
    /// Whole-chunk bitmap payload; used only for the synthetic fill-list buffer
    /// emitted by the snapshot writer.
    PutBitmap(RoaringBitmap),
}

/// Column name of the synthetic commit buffer a snapshot writer emits to
/// carry a chunk's fill-list slice (spec.md §4.5, §6). Never a real column.
pub(crate) const FILL_BUFFER_NAME: &str = "__fill__";

const OP_INSERT: u8 = 1;
const OP_DELETE: u8 = 2;
const OP_PUT: u8 = 3;
const OP_MERGE: u8 = 4;
const OP_PUT_BITMAP: u8 = 5;
const OP_PUT_TRUE: u8 = 6;
const OP_PUT_FALSE: u8 = 7;

/// An append-only, chunk-tagged log of operations for one column.
#[derive(Debug, Clone, Default)]
pub struct CommitBuffer {
    /// Name of the column this buffer targets.
    pub column: String,
    by_chunk: BTreeMap<u32, Vec<(RowHandle, Op)>>,
}

impl CommitBuffer {
    /// Creates an empty buffer targeting `column`.
    #[must_use]
    pub fn new(column: impl Into<String>) -> Self {
        Self {
            column: column.into(),
            by_chunk: BTreeMap::new(),
        }
    }

    /// Appends an operation for `handle`.
    pub fn push(&mut self, handle: RowHandle, op: Op) {
        self.by_chunk
            .entry(chunk_of(handle.0))
            .or_default()
            .push((handle, op));
    }

    /// True if no operations have been recorded.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.by_chunk.values().all(Vec::is_empty)
    }

    /// Total number of operations across all chunks.
    #[must_use]
    pub fn len(&self) -> usize {
        self.by_chunk.values().map(Vec::len).sum()
    }

    /// Iterates chunk indices that have at least one operation, ascending.
    pub fn touched_chunks(&self) -> impl Iterator<Item = u32> + '_ {
        self.by_chunk
            .iter()
            .filter(|(_, ops)| !ops.is_empty())
            .map(|(c, _)| *c)
    }

    /// Operations recorded for `chunk`, in append order.
    #[must_use]
    pub fn chunk_ops(&self, chunk: u32) -> &[(RowHandle, Op)] {
        self.by_chunk
            .get(&chunk)
            .map_or(&[], |ops| ops.as_slice())
    }

    /// Clears all recorded operations without changing `column`.
    pub fn reset(&mut self) {
        self.by_chunk.clear();
    }

    /// Encodes this buffer per spec.md §6's `buffer` grammar.
    pub fn write_to(&self, out: &mut BytesMut) {
        let name_bytes = self.column.as_bytes();
        out.put_u16_le(name_bytes.len() as u16);
        out.put_slice(name_bytes);
        put_uvarint(out, self.len() as u64);
        for (_, ops) in &self.by_chunk {
            for (handle, op) in ops {
                write_op(out, *handle, op);
            }
        }
    }

    /// Decodes a buffer written by [`Self::write_to`].
    ///
    /// # Errors
    /// Returns [`Error::SerializationError`] on truncated or malformed input.
    pub fn read_from(buf: &mut Bytes) -> Result<Self> {
        if buf.remaining() < 2 {
            return Err(Error::SerializationError("truncated buffer header".into()));
        }
        let name_len = buf.get_u16_le() as usize;
        if buf.remaining() < name_len {
            return Err(Error::SerializationError("truncated buffer name".into()));
        }
        let name = String::from_utf8(buf.copy_to_bytes(name_len).to_vec())
            .map_err(|e| Error::SerializationError(format!("invalid utf8 column name: {e}")))?;
        let op_count = get_uvarint(buf)?;

        let mut result = Self::new(name);
        for _ in 0..op_count {
            let (handle, op) = read_op(buf)?;
            result.push(handle, op);
        }
        Ok(result)
    }
}

fn write_op(out: &mut BytesMut, handle: RowHandle, op: &Op) {
    let chunk = chunk_of(handle.0);
    let offset = offset_of(handle.0) as u16;
    match op {
        Op::Insert(v) => {
            out.put_u8(OP_INSERT);
            out.put_u32_le(chunk);
            out.put_u16_le(offset);
            put_value(out, v);
        }
        Op::Delete => {
            out.put_u8(OP_DELETE);
            out.put_u32_le(chunk);
            out.put_u16_le(offset);
        }
        Op::Put(Value::Bool(true)) => {
            out.put_u8(OP_PUT_TRUE);
            out.put_u32_le(chunk);
            out.put_u16_le(offset);
        }
        Op::Put(Value::Bool(false)) => {
            out.put_u8(OP_PUT_FALSE);
            out.put_u32_le(chunk);
            out.put_u16_le(offset);
        }
        Op::Put(v) => {
            out.put_u8(OP_PUT);
            out.put_u32_le(chunk);
            out.put_u16_le(offset);
            put_value(out, v);
        }
        Op::Merge(v) => {
            out.put_u8(OP_MERGE);
            out.put_u32_le(chunk);
            out.put_u16_le(offset);
            put_value(out, v);
        }
        Op::PutBitmap(bitmap) => {
            out.put_u8(OP_PUT_BITMAP);
            out.put_u32_le(chunk);
            out.put_u16_le(0);
            let mut bytes = Vec::new();
            bitmap
                .serialize_into(&mut bytes)
                .expect("serializing to a Vec cannot fail");
            put_uvarint(out, bytes.len() as u64);
            out.put_slice(&bytes);
        }
    }
}

fn read_op(buf: &mut Bytes) -> Result<(RowHandle, Op)> {
    if buf.remaining() < 1 + 4 + 2 {
        return Err(Error::SerializationError("truncated op header".into()));
    }
    let ty = buf.get_u8();
    let chunk = buf.get_u32_le();
    let offset = buf.get_u16_le();
    let handle = RowHandle(crate::handle::RowHandle::chunk_start(chunk) + u32::from(offset));

    let op = match ty {
        OP_INSERT => Op::Insert(get_value(buf)?),
        OP_DELETE => Op::Delete,
        OP_PUT => Op::Put(get_value(buf)?),
        OP_MERGE => Op::Merge(get_value(buf)?),
        OP_PUT_TRUE => Op::Put(Value::Bool(true)),
        OP_PUT_FALSE => Op::Put(Value::Bool(false)),
        OP_PUT_BITMAP => {
            let len = get_uvarint(buf)? as usize;
            if buf.remaining() < len {
                return Err(Error::SerializationError("truncated bitmap payload".into()));
            }
            let bytes = buf.copy_to_bytes(len);
            let bitmap = RoaringBitmap::deserialize_from(&bytes[..])
                .map_err(|e| Error::SerializationError(format!("bad bitmap payload: {e}")))?;
            Op::PutBitmap(bitmap)
        }
        other => return Err(Error::SerializationError(format!("unknown op type {other}"))),
    };
    Ok((handle, op))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn push_groups_by_chunk() {
        let mut buf = CommitBuffer::new("age");
        buf.push(RowHandle(0), Op::Put(Value::F64(1.0)));
        buf.push(RowHandle(crate::handle::CHUNK_SIZE), Op::Put(Value::F64(2.0)));
        buf.push(RowHandle(1), Op::Put(Value::F64(3.0)));

        let chunks: Vec<u32> = buf.touched_chunks().collect();
        assert_eq!(chunks, vec![0, 1]);
        assert_eq!(buf.chunk_ops(0).len(), 2);
        assert_eq!(buf.chunk_ops(1).len(), 1);
    }

    #[test]
    fn round_trips_mixed_ops_through_wire_format() {
        let mut buf = CommitBuffer::new("balance");
        buf.push(RowHandle(0), Op::Insert(Value::F64(10.0)));
        buf.push(RowHandle(1), Op::Merge(Value::F64(-2.5)));
        buf.push(RowHandle(2), Op::Delete);

        let mut bytes_out = BytesMut::new();
        buf.write_to(&mut bytes_out);

        let mut input = bytes_out.freeze();
        let decoded = CommitBuffer::read_from(&mut input).unwrap();

        assert_eq!(decoded.column, "balance");
        assert_eq!(decoded.len(), 3);
        assert_eq!(decoded.chunk_ops(0).len(), 3);
    }

    #[test]
    fn bool_put_round_trips_without_payload() {
        let mut buf = CommitBuffer::new("active");
        buf.push(RowHandle(0), Op::Put(Value::Bool(true)));
        buf.push(RowHandle(1), Op::Put(Value::Bool(false)));

        let mut out = BytesMut::new();
        buf.write_to(&mut out);
        let mut input = out.freeze();
        let decoded = CommitBuffer::read_from(&mut input).unwrap();

        let ops = decoded.chunk_ops(0);
        assert_eq!(ops[0].1, Op::Put(Value::Bool(true)));
        assert_eq!(ops[1].1, Op::Put(Value::Bool(false)));
    }

    #[test]
    fn offset_round_trips_across_chunk_boundaries() {
        // Chunk 3's low two bits are nonzero; a mis-masked offset would leak
        // (chunk & 3) << 14 into the decoded handle.
        let mut buf = CommitBuffer::new("balance");
        let handles = [
            RowHandle(crate::handle::CHUNK_SIZE * 3 + 5),
            RowHandle(crate::handle::CHUNK_SIZE * 5 + crate::handle::CHUNK_SIZE - 1),
        ];
        for h in handles {
            buf.push(h, Op::Put(Value::F64(1.0)));
        }

        let mut out = BytesMut::new();
        buf.write_to(&mut out);
        let mut input = out.freeze();
        let decoded = CommitBuffer::read_from(&mut input).unwrap();

        let decoded_handles: Vec<RowHandle> =
            decoded.touched_chunks().flat_map(|c| decoded.chunk_ops(c).iter().map(|(h, _)| *h)).collect();
        assert_eq!(decoded_handles, handles);
    }

    #[test]
    fn put_bitmap_round_trips() {
        let mut bitmap = RoaringBitmap::new();
        bitmap.insert(3);
        bitmap.insert(9);

        let mut buf = CommitBuffer::new("__fill__");
        buf.push(RowHandle(0), Op::PutBitmap(bitmap.clone()));

        let mut out = BytesMut::new();
        buf.write_to(&mut out);
        let mut input = out.freeze();
        let decoded = CommitBuffer::read_from(&mut input).unwrap();

        match &decoded.chunk_ops(0)[0].1 {
            Op::PutBitmap(b) => assert_eq!(*b, bitmap),
            other => panic!("expected PutBitmap, got {other:?}"),
        }
    }
}
