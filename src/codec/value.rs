//! Tagged field values, tables, and arrays.
//!
//! Field tables decorate several methods (server capabilities, queue
//! arguments, message headers). A table is a four-byte length prefix over a
//! run of (short-string key, tag byte, value) entries; an array is the same
//! with the keys omitted. The tag set is closed: an unrecognised tag is a
//! hard decode error, never skipped.
//!
//! Both containers keep entries in insertion order so that encoding a decoded
//! table reproduces the original bytes.

use bytes::{Bytes, BytesMut};

use super::{
    CodecError,
    Cursor,
    write_f32,
    write_f64,
    write_i8,
    write_i16,
    write_i32,
    write_i64,
    write_long_str,
    write_short_str,
    write_timestamp,
    write_u8,
    write_u32,
};

/// One value inside a field table or field array.
#[derive(Clone, Debug, PartialEq)]
pub enum FieldValue {
    /// Boolean, tag `t`.
    Bool(bool),
    /// Signed 8-bit integer, tag `b`.
    I8(i8),
    /// Signed 16-bit integer, tag `U`.
    I16(i16),
    /// Signed 32-bit integer, tag `I`.
    I32(i32),
    /// Signed 64-bit integer, tag `L`.
    I64(i64),
    /// Single-precision float, tag `f`.
    F32(f32),
    /// Double-precision float, tag `d`.
    F64(f64),
    /// Short UTF-8 string, tag `s`.
    ShortStr(String),
    /// Long string or opaque binary, tag `S`.
    LongStr(Bytes),
    /// Nested table, tag `F`.
    Table(FieldTable),
    /// Nested array, tag `A`.
    Array(FieldArray),
    /// POSIX timestamp in seconds, tag `T`.
    Timestamp(u64),
    /// Scaled decimal, tag `D`: a scale byte then an unsigned mantissa.
    Decimal {
        /// Number of decimal digits after the point.
        scale: u8,
        /// Unscaled value.
        value: u32,
    },
    /// Absent value, tag `V`.
    Void,
}

impl FieldValue {
    /// The wire tag identifying this value kind.
    #[must_use]
    pub const fn tag(&self) -> u8 {
        match self {
            Self::Bool(_) => b't',
            Self::I8(_) => b'b',
            Self::I16(_) => b'U',
            Self::I32(_) => b'I',
            Self::I64(_) => b'L',
            Self::F32(_) => b'f',
            Self::F64(_) => b'd',
            Self::ShortStr(_) => b's',
            Self::LongStr(_) => b'S',
            Self::Table(_) => b'F',
            Self::Array(_) => b'A',
            Self::Timestamp(_) => b'T',
            Self::Decimal { .. } => b'D',
            Self::Void => b'V',
        }
    }

    /// Decode one tagged value (tag byte included) from the cursor.
    ///
    /// # Errors
    /// Returns [`CodecError::UnknownTag`] for a tag outside the closed set,
    /// or any error from decoding the tagged content.
    pub fn decode(cur: &mut Cursor<'_>) -> Result<Self, CodecError> {
        let tag = cur.read_u8()?;
        Self::decode_tagged(tag, cur)
    }

    fn decode_tagged(tag: u8, cur: &mut Cursor<'_>) -> Result<Self, CodecError> {
        match tag {
            b't' => Ok(Self::Bool(cur.read_u8()? != 0)),
            b'b' => Ok(Self::I8(cur.read_i8()?)),
            b'U' => Ok(Self::I16(cur.read_i16()?)),
            b'I' => Ok(Self::I32(cur.read_i32()?)),
            b'L' => Ok(Self::I64(cur.read_i64()?)),
            b'f' => Ok(Self::F32(cur.read_f32()?)),
            b'd' => Ok(Self::F64(cur.read_f64()?)),
            b's' => Ok(Self::ShortStr(cur.read_short_str()?.to_owned())),
            b'S' => Ok(Self::LongStr(Bytes::copy_from_slice(cur.read_long_str()?))),
            b'F' => Ok(Self::Table(FieldTable::decode(cur)?)),
            b'A' => Ok(Self::Array(FieldArray::decode(cur)?)),
            b'T' => Ok(Self::Timestamp(cur.read_timestamp()?)),
            b'D' => {
                let scale = cur.read_u8()?;
                let value = cur.read_u32()?;
                Ok(Self::Decimal { scale, value })
            }
            b'V' => Ok(Self::Void),
            tag => Err(CodecError::UnknownTag { tag }),
        }
    }

    /// Encode this value, tag byte first.
    ///
    /// # Errors
    /// Returns [`CodecError::ValueTooLong`] when a contained string exceeds
    /// its length prefix.
    pub fn encode(&self, dst: &mut BytesMut) -> Result<(), CodecError> {
        write_u8(dst, self.tag());
        match self {
            Self::Bool(v) => write_u8(dst, u8::from(*v)),
            Self::I8(v) => write_i8(dst, *v),
            Self::I16(v) => write_i16(dst, *v),
            Self::I32(v) => write_i32(dst, *v),
            Self::I64(v) => write_i64(dst, *v),
            Self::F32(v) => write_f32(dst, *v),
            Self::F64(v) => write_f64(dst, *v),
            Self::ShortStr(v) => write_short_str(dst, v)?,
            Self::LongStr(v) => write_long_str(dst, v)?,
            Self::Table(v) => v.encode(dst)?,
            Self::Array(v) => v.encode(dst)?,
            Self::Timestamp(v) => write_timestamp(dst, *v),
            Self::Decimal { scale, value } => {
                write_u8(dst, *scale);
                write_u32(dst, *value);
            }
            Self::Void => {}
        }
        Ok(())
    }
}

impl From<&str> for FieldValue {
    fn from(value: &str) -> Self { Self::LongStr(Bytes::copy_from_slice(value.as_bytes())) }
}

impl From<bool> for FieldValue {
    fn from(value: bool) -> Self { Self::Bool(value) }
}

impl From<i32> for FieldValue {
    fn from(value: i32) -> Self { Self::I32(value) }
}

/// Ordered key/value table of tagged fields.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct FieldTable {
    entries: Vec<(String, FieldValue)>,
}

impl FieldTable {
    /// Create an empty table.
    #[must_use]
    pub const fn new() -> Self { Self { entries: Vec::new() } }

    /// Append or replace the entry for `key`, preserving first-insertion order.
    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<FieldValue>) {
        let key = key.into();
        let value = value.into();
        if let Some(slot) = self.entries.iter_mut().find(|(k, _)| *k == key) {
            slot.1 = value;
        } else {
            self.entries.push((key, value));
        }
    }

    /// Look up the value stored under `key`.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&FieldValue> {
        self.entries.iter().find(|(k, _)| k == key).map(|(_, v)| v)
    }

    /// Number of entries.
    #[must_use]
    pub fn len(&self) -> usize { self.entries.len() }

    /// Whether the table holds no entries.
    #[must_use]
    pub fn is_empty(&self) -> bool { self.entries.is_empty() }

    /// Iterate entries in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &FieldValue)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// Decode a table from its four-byte length prefix onward.
    ///
    /// # Errors
    /// Returns [`CodecError::TruncatedInput`] when the declared region is not
    /// fully present, or [`CodecError::LengthOverrun`] when an entry runs past
    /// the declared end of the table.
    pub fn decode(cur: &mut Cursor<'_>) -> Result<Self, CodecError> {
        let region = read_prefixed_region(cur)?;
        let mut inner = Cursor::new(region);
        let mut entries = Vec::new();
        while !inner.is_exhausted() {
            let key = inner
                .read_short_str()
                .map_err(|e| seal_region(e, region.len()))?
                .to_owned();
            let value = FieldValue::decode(&mut inner).map_err(|e| seal_region(e, region.len()))?;
            entries.push((key, value));
        }
        Ok(Self { entries })
    }

    /// Encode the table, length prefix first, entries in insertion order.
    ///
    /// # Errors
    /// Returns [`CodecError::ValueTooLong`] when a key or contained value
    /// exceeds its length prefix.
    pub fn encode(&self, dst: &mut BytesMut) -> Result<(), CodecError> {
        let mut body = BytesMut::new();
        for (key, value) in &self.entries {
            write_short_str(&mut body, key)?;
            value.encode(&mut body)?;
        }
        write_long_str(dst, &body)
    }
}

/// Ordered sequence of tagged values.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct FieldArray {
    items: Vec<FieldValue>,
}

impl FieldArray {
    /// Create an empty array.
    #[must_use]
    pub const fn new() -> Self { Self { items: Vec::new() } }

    /// Append a value.
    pub fn push(&mut self, value: impl Into<FieldValue>) { self.items.push(value.into()); }

    /// Number of items.
    #[must_use]
    pub fn len(&self) -> usize { self.items.len() }

    /// Whether the array holds no items.
    #[must_use]
    pub fn is_empty(&self) -> bool { self.items.is_empty() }

    /// Iterate items in order.
    pub fn iter(&self) -> impl Iterator<Item = &FieldValue> { self.items.iter() }

    /// Decode an array from its four-byte length prefix onward.
    ///
    /// # Errors
    /// Same failure modes as [`FieldTable::decode`].
    pub fn decode(cur: &mut Cursor<'_>) -> Result<Self, CodecError> {
        let region = read_prefixed_region(cur)?;
        let mut inner = Cursor::new(region);
        let mut items = Vec::new();
        while !inner.is_exhausted() {
            items.push(FieldValue::decode(&mut inner).map_err(|e| seal_region(e, region.len()))?);
        }
        Ok(Self { items })
    }

    /// Encode the array, length prefix first.
    ///
    /// # Errors
    /// Returns [`CodecError::ValueTooLong`] when a contained value exceeds
    /// its length prefix.
    pub fn encode(&self, dst: &mut BytesMut) -> Result<(), CodecError> {
        let mut body = BytesMut::new();
        for item in &self.items {
            item.encode(&mut body)?;
        }
        write_long_str(dst, &body)
    }
}

impl FromIterator<FieldValue> for FieldArray {
    fn from_iter<T: IntoIterator<Item = FieldValue>>(iter: T) -> Self {
        Self {
            items: iter.into_iter().collect(),
        }
    }
}

/// Take a length-prefixed sub-region off the cursor.
fn read_prefixed_region<'a>(cur: &mut Cursor<'a>) -> Result<&'a [u8], CodecError> {
    let start = cur.position();
    let len = cur.read_u32()? as usize;
    match cur.take(len) {
        Ok(region) => Ok(region),
        Err(e) => {
            // Rewind past the length prefix so the caller retries whole.
            cur.pos = start;
            Err(e)
        }
    }
}

/// Truncation inside a fully-present region is a structural inconsistency,
/// not a retry signal.
fn seal_region(err: CodecError, declared: usize) -> CodecError {
    if err.is_truncated() {
        CodecError::LengthOverrun { declared }
    } else {
        err
    }
}
