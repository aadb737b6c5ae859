//! Tagged binary primitives shared by the snapshot codec and entity serializers.
//!
//! Every item starts with one tag byte. Multi-byte numbers are big-endian.
//!
//! | Tag | Item | Body |
//! |-----|------|------|
//! | `0x00` | nil | - |
//! | `0x01` | false | - |
//! | `0x02` | true | - |
//! | `0x03` | integer | `i64` |
//! | `0x04` | float | `f64` |
//! | `0x05` | string | `u32` length + bytes |
//! | `0x06` | sequence | `u32` count + items |
//! | `0x07` | mapping | `u32` count + key/value item pairs |
//! | `0x08` | entity blob | `u8` type tag + `u32` length + bytes |
//!
//! Entity serializers are free to write any well-formed item stream with
//! [`Writer`] and read it back with [`Reader`].

use std::io::{self, Cursor};

use byteorder::{BigEndian, ReadBytesExt};

use crate::error::{SnapshotError, SnapshotResult};
use crate::types::TypeTag;

pub const TAG_NIL: u8 = 0x00;
pub const TAG_FALSE: u8 = 0x01;
pub const TAG_TRUE: u8 = 0x02;
pub const TAG_INT: u8 = 0x03;
pub const TAG_FLOAT: u8 = 0x04;
pub const TAG_STR: u8 = 0x05;
pub const TAG_SEQ: u8 = 0x06;
pub const TAG_MAP: u8 = 0x07;
pub const TAG_BLOB: u8 = 0x08;

/// A scalar item as read off the wire.
#[derive(Debug, Clone, PartialEq)]
pub enum Scalar {
    Nil,
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(Vec<u8>),
}

/// Append-only item writer.
#[derive(Debug, Default)]
pub struct Writer {
    buf: Vec<u8>,
}

impl Writer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_capacity(capacity: usize) -> SnapshotResult<Self> {
        let mut buf = Vec::new();
        buf.try_reserve(capacity)?;
        Ok(Self { buf })
    }

    pub fn len(&self) -> usize {
        self.buf.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.buf
    }

    fn put(&mut self, bytes: &[u8]) -> SnapshotResult<()> {
        self.buf.try_reserve(bytes.len())?;
        self.buf.extend_from_slice(bytes);
        Ok(())
    }

    fn put_len(&mut self, len: usize) -> SnapshotResult<()> {
        let len = u32::try_from(len)
            .map_err(|_| SnapshotError::non_serializable(format!("length {len} exceeds u32")))?;
        self.put(&len.to_be_bytes())
    }

    pub fn nil(&mut self) -> SnapshotResult<()> {
        self.put(&[TAG_NIL])
    }

    pub fn bool(&mut self, b: bool) -> SnapshotResult<()> {
        self.put(&[if b { TAG_TRUE } else { TAG_FALSE }])
    }

    pub fn int(&mut self, i: i64) -> SnapshotResult<()> {
        self.put(&[TAG_INT])?;
        self.put(&i.to_be_bytes())
    }

    pub fn float(&mut self, f: f64) -> SnapshotResult<()> {
        self.put(&[TAG_FLOAT])?;
        self.put(&f.to_be_bytes())
    }

    pub fn str(&mut self, bytes: &[u8]) -> SnapshotResult<()> {
        self.put(&[TAG_STR])?;
        self.put_len(bytes.len())?;
        self.put(bytes)
    }

    /// Start a sequence of `count` items. The caller writes the items next.
    pub fn seq(&mut self, count: usize) -> SnapshotResult<()> {
        self.put(&[TAG_SEQ])?;
        self.put_len(count)
    }

    /// Start a mapping of `count` pairs. The caller writes key, value, key, ...
    pub fn map(&mut self, count: usize) -> SnapshotResult<()> {
        self.put(&[TAG_MAP])?;
        self.put_len(count)
    }

    pub fn blob(&mut self, tag: TypeTag, bytes: &[u8]) -> SnapshotResult<()> {
        self.put(&[TAG_BLOB, tag.0])?;
        self.put_len(bytes.len())?;
        self.put(bytes)
    }

    pub fn scalar(&mut self, scalar: &Scalar) -> SnapshotResult<()> {
        match scalar {
            Scalar::Nil => self.nil(),
            Scalar::Bool(b) => self.bool(*b),
            Scalar::Int(i) => self.int(*i),
            Scalar::Float(f) => self.float(*f),
            Scalar::Str(s) => self.str(s),
        }
    }
}

fn truncated(err: io::Error) -> SnapshotError {
    SnapshotError::corrupt(format!("truncated buffer: {err}"))
}

/// Item reader over a byte slice.
#[derive(Debug)]
pub struct Reader<'a> {
    cursor: Cursor<&'a [u8]>,
}

impl<'a> Reader<'a> {
    pub fn new(bytes: &'a [u8]) -> Self {
        Self {
            cursor: Cursor::new(bytes),
        }
    }

    pub fn position(&self) -> usize {
        self.cursor.position() as usize
    }

    pub fn remaining(&self) -> usize {
        self.cursor.get_ref().len().saturating_sub(self.position())
    }

    pub fn is_at_end(&self) -> bool {
        self.remaining() == 0
    }

    /// Fail unless every byte has been consumed.
    pub fn finish(&self) -> SnapshotResult<()> {
        if self.is_at_end() {
            Ok(())
        } else {
            Err(SnapshotError::corrupt(format!(
                "{} trailing bytes at offset {}",
                self.remaining(),
                self.position()
            )))
        }
    }

    pub fn peek_tag(&self) -> SnapshotResult<u8> {
        self.cursor
            .get_ref()
            .get(self.position())
            .copied()
            .ok_or_else(|| SnapshotError::corrupt("truncated buffer: expected a tag"))
    }

    pub fn read_tag(&mut self) -> SnapshotResult<u8> {
        self.cursor.read_u8().map_err(truncated)
    }

    fn expect_tag(&mut self, expected: u8, what: &str) -> SnapshotResult<()> {
        let at = self.position();
        let tag = self.read_tag()?;
        if tag == expected {
            Ok(())
        } else {
            Err(SnapshotError::corrupt(format!(
                "expected {what} at offset {at}, found tag 0x{tag:02x}"
            )))
        }
    }

    /// Read a `u32` length and check it against what is left in the buffer,
    /// assuming each counted unit takes at least `min_unit` bytes.
    fn read_len(&mut self, min_unit: usize) -> SnapshotResult<usize> {
        let len = self.cursor.read_u32::<BigEndian>().map_err(truncated)? as usize;
        if len.saturating_mul(min_unit) > self.remaining() {
            return Err(SnapshotError::corrupt(format!(
                "length {len} overruns buffer ({} bytes left)",
                self.remaining()
            )));
        }
        Ok(len)
    }

    fn read_bytes(&mut self, len: usize) -> SnapshotResult<Vec<u8>> {
        let start = self.position();
        let data: &'a [u8] = *self.cursor.get_ref();
        let src = &data[start..start + len];
        let mut out = Vec::new();
        out.try_reserve_exact(len)?;
        out.extend_from_slice(src);
        self.cursor.set_position((start + len) as u64);
        Ok(out)
    }

    pub fn int(&mut self) -> SnapshotResult<i64> {
        self.expect_tag(TAG_INT, "integer")?;
        self.cursor.read_i64::<BigEndian>().map_err(truncated)
    }

    pub fn float(&mut self) -> SnapshotResult<f64> {
        self.expect_tag(TAG_FLOAT, "float")?;
        self.cursor.read_f64::<BigEndian>().map_err(truncated)
    }

    pub fn bool(&mut self) -> SnapshotResult<bool> {
        match self.read_tag()? {
            TAG_TRUE => Ok(true),
            TAG_FALSE => Ok(false),
            tag => Err(SnapshotError::corrupt(format!(
                "expected boolean, found tag 0x{tag:02x}"
            ))),
        }
    }

    pub fn str(&mut self) -> SnapshotResult<Vec<u8>> {
        self.expect_tag(TAG_STR, "string")?;
        let len = self.read_len(1)?;
        self.read_bytes(len)
    }

    /// Read a sequence header, returning its item count.
    pub fn seq(&mut self) -> SnapshotResult<usize> {
        self.expect_tag(TAG_SEQ, "sequence")?;
        self.read_len(1)
    }

    /// Read a mapping header, returning its pair count.
    pub fn map(&mut self) -> SnapshotResult<usize> {
        self.expect_tag(TAG_MAP, "mapping")?;
        self.read_len(2)
    }

    pub fn blob(&mut self) -> SnapshotResult<(TypeTag, Vec<u8>)> {
        self.expect_tag(TAG_BLOB, "entity blob")?;
        let tag = TypeTag(self.cursor.read_u8().map_err(truncated)?);
        let len = self.read_len(1)?;
        Ok((tag, self.read_bytes(len)?))
    }

    /// Read an integer and narrow it into `T`.
    pub fn int_as<T: TryFrom<i64>>(&mut self, what: &str) -> SnapshotResult<T> {
        let raw = self.int()?;
        T::try_from(raw).map_err(|_| SnapshotError::corrupt(format!("{what} out of range: {raw}")))
    }

    /// Read a sequence header and require an exact item count.
    pub fn seq_of(&mut self, expected: usize, what: &str) -> SnapshotResult<()> {
        let count = self.seq()?;
        if count != expected {
            return Err(SnapshotError::corrupt(format!(
                "{what}: expected {expected} fields, found {count}"
            )));
        }
        Ok(())
    }

    /// Read any scalar item. Composite tags are reported as corrupt.
    pub fn scalar(&mut self) -> SnapshotResult<Scalar> {
        match self.peek_tag()? {
            TAG_NIL => {
                self.read_tag()?;
                Ok(Scalar::Nil)
            }
            TAG_TRUE | TAG_FALSE => self.bool().map(Scalar::Bool),
            TAG_INT => self.int().map(Scalar::Int),
            TAG_FLOAT => self.float().map(Scalar::Float),
            TAG_STR => self.str().map(Scalar::Str),
            tag => Err(SnapshotError::corrupt(format!(
                "expected scalar at offset {}, found tag 0x{tag:02x}",
                self.position()
            ))),
        }
    }
}
