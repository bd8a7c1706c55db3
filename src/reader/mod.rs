//! In-place buffer inspection with lazy indexing.
//!
//! A [`Reader`] wraps a borrowed byte region and exposes its root
//! [`ObjectReader`]. The first validity-requiring call on an object scans its
//! payload once, building a map from identifier to a fixed-size cache entry:
//! fixed-width scalars are decoded inline, everything else is recorded as an
//! offset into the payload. The scan is guarded by a one-shot lock, so a
//! fully-indexed reader can be shared across threads. The buffer itself is
//! never modified; fixed-width elements are decoded from the canonical
//! little-endian layout on access.
//!
//! A reader handed arbitrary bytes marks the object invalid on the first
//! inconsistency; every accessor on an invalid object answers "missing".

mod array;

pub use array::{
    BinaryArrayIter, BinaryArrayReader, ObjectArrayIter, ObjectArrayReader, StringArrayIter,
    StringArrayReader,
};

use std::collections::HashMap;
use std::sync::OnceLock;

use uuid::Uuid;

use crate::endian::Scalar;
use crate::error::FormatError;
use crate::types::{DataType, Mode, Tag};

/// Width of a payload size prefix.
const SIZE_PREFIX: usize = 4;
/// Capacity hint for a fresh object index.
const INITIAL_INDEX_CAPACITY: usize = 100;

/// Inspects a finished TagBuf buffer in place.
pub struct Reader<'a> {
    root: ObjectReader<'a>,
}

impl<'a> Reader<'a> {
    /// Wraps `buffer`, which must start with the root object's `u32` payload
    /// size. The mode must match the one the buffer was written with.
    pub fn new(buffer: &'a [u8], mode: Mode) -> Reader<'a> {
        Reader {
            root: ObjectReader::from_prefixed(buffer, mode),
        }
    }

    pub fn root_object(&self) -> &ObjectReader<'a> {
        &self.root
    }

    /// Whether the root object parses cleanly. Triggers indexing.
    pub fn is_valid(&self) -> bool {
        self.root.is_valid()
    }
}

/// One field's index record: its type plus either the decoded scalar value
/// or the payload offset where its data begins.
#[derive(Clone, Copy)]
struct CacheEntry {
    ty: DataType,
    value: CacheValue,
}

#[derive(Clone, Copy)]
enum CacheValue {
    I8(i8),
    I16(i16),
    I32(i32),
    I64(i64),
    U8(u8),
    U16(u16),
    U32(u32),
    U64(u64),
    Bool(bool),
    F16(u16),
    F32(f32),
    F64(f64),
    /// Offset into the object payload: at the length prefix for
    /// variable-length payloads and arrays, at the first byte for UUIDs and
    /// vectors.
    Offset(usize),
}

enum TagIndex<'a> {
    Names(HashMap<&'a str, CacheEntry>),
    Ids(HashMap<u16, CacheEntry>),
}

/// Reads fields of one object.
///
/// Cheap to construct; the payload is scanned lazily on the first
/// validity-requiring call. Typed getters match strictly: asking for an
/// `i32` where an `i16` is stored answers `None`.
pub struct ObjectReader<'a> {
    payload: &'a [u8],
    mode: Mode,
    index: OnceLock<Result<TagIndex<'a>, FormatError>>,
}

impl<'a> ObjectReader<'a> {
    /// Wraps a region that starts with a `u32` payload size prefix.
    pub(crate) fn from_prefixed(region: &'a [u8], mode: Mode) -> ObjectReader<'a> {
        let Some(prefix) = region.get(..SIZE_PREFIX) else {
            return ObjectReader::poisoned(mode, FormatError::Truncated);
        };
        let size = u32::from_le_bytes([prefix[0], prefix[1], prefix[2], prefix[3]]) as usize;
        match region.get(SIZE_PREFIX..SIZE_PREFIX + size) {
            Some(payload) => ObjectReader::from_payload(payload, mode),
            None => ObjectReader::poisoned(mode, FormatError::LengthMismatch),
        }
    }

    /// Wraps an exact payload span (no size prefix).
    pub(crate) fn from_payload(payload: &'a [u8], mode: Mode) -> ObjectReader<'a> {
        ObjectReader {
            payload,
            mode,
            index: OnceLock::new(),
        }
    }

    fn poisoned(mode: Mode, err: FormatError) -> ObjectReader<'a> {
        let index = OnceLock::new();
        let _ = index.set(Err(err));
        ObjectReader {
            payload: &[],
            mode,
            index,
        }
    }

    fn index(&self) -> &Result<TagIndex<'a>, FormatError> {
        self.index.get_or_init(|| {
            let built = build_index(self.payload, self.mode);
            if let Err(e) = &built {
                tracing::trace!(error = %e, payload_len = self.payload.len(), "object failed indexing");
            }
            built
        })
    }

    /// Whether the payload parses cleanly. Triggers indexing.
    pub fn is_valid(&self) -> bool {
        self.index().is_ok()
    }

    /// Why the payload was rejected, if it was.
    pub fn validation_error(&self) -> Option<FormatError> {
        self.index().as_ref().err().copied()
    }

    pub fn mode(&self) -> Mode {
        self.mode
    }

    fn entry(&self, tag: &Tag) -> Option<CacheEntry> {
        match self.index().as_ref().ok()? {
            TagIndex::Names(map) => map.get(tag.name()?).copied(),
            TagIndex::Ids(map) => {
                if !tag.has_id() {
                    return None;
                }
                map.get(&tag.id()).copied()
            }
        }
    }

    /// Whether a field with this identifier exists.
    pub fn contains(&self, tag: &Tag) -> bool {
        self.entry(tag).is_some()
    }

    /// The stored type of the field, if present.
    pub fn type_of(&self, tag: &Tag) -> Option<DataType> {
        Some(self.entry(tag)?.ty)
    }

    /// All identifiers in this object, in no guaranteed order.
    pub fn all_tags(&self) -> Vec<Tag<'a>> {
        match self.index() {
            Ok(TagIndex::Names(map)) => map.keys().map(|&name| Tag::observed(name)).collect(),
            Ok(TagIndex::Ids(map)) => map.keys().map(|&id| Tag::observed_id(id)).collect(),
            Err(_) => Vec::new(),
        }
    }

    // -- Scalar getters --

    pub fn read_i8(&self, tag: &Tag) -> Option<i8> {
        match self.entry(tag)? {
            CacheEntry {
                ty: DataType::INT8,
                value: CacheValue::I8(v),
            } => Some(v),
            _ => None,
        }
    }

    pub fn read_i16(&self, tag: &Tag) -> Option<i16> {
        match self.entry(tag)? {
            CacheEntry {
                ty: DataType::INT16,
                value: CacheValue::I16(v),
            } => Some(v),
            _ => None,
        }
    }

    pub fn read_i32(&self, tag: &Tag) -> Option<i32> {
        match self.entry(tag)? {
            CacheEntry {
                ty: DataType::INT32,
                value: CacheValue::I32(v),
            } => Some(v),
            _ => None,
        }
    }

    pub fn read_i64(&self, tag: &Tag) -> Option<i64> {
        match self.entry(tag)? {
            CacheEntry {
                ty: DataType::INT64,
                value: CacheValue::I64(v),
            } => Some(v),
            _ => None,
        }
    }

    pub fn read_u8(&self, tag: &Tag) -> Option<u8> {
        match self.entry(tag)? {
            CacheEntry {
                ty: DataType::UINT8,
                value: CacheValue::U8(v),
            } => Some(v),
            _ => None,
        }
    }

    pub fn read_u16(&self, tag: &Tag) -> Option<u16> {
        match self.entry(tag)? {
            CacheEntry {
                ty: DataType::UINT16,
                value: CacheValue::U16(v),
            } => Some(v),
            _ => None,
        }
    }

    pub fn read_u32(&self, tag: &Tag) -> Option<u32> {
        match self.entry(tag)? {
            CacheEntry {
                ty: DataType::UINT32,
                value: CacheValue::U32(v),
            } => Some(v),
            _ => None,
        }
    }

    pub fn read_u64(&self, tag: &Tag) -> Option<u64> {
        match self.entry(tag)? {
            CacheEntry {
                ty: DataType::UINT64,
                value: CacheValue::U64(v),
            } => Some(v),
            _ => None,
        }
    }

    pub fn read_bool(&self, tag: &Tag) -> Option<bool> {
        match self.entry(tag)? {
            CacheEntry {
                ty: DataType::BOOL,
                value: CacheValue::Bool(v),
            } => Some(v),
            _ => None,
        }
    }

    /// Reads a half-precision float's raw bit pattern.
    pub fn read_f16(&self, tag: &Tag) -> Option<u16> {
        match self.entry(tag)? {
            CacheEntry {
                ty: DataType::FLOAT16,
                value: CacheValue::F16(v),
            } => Some(v),
            _ => None,
        }
    }

    pub fn read_f32(&self, tag: &Tag) -> Option<f32> {
        match self.entry(tag)? {
            CacheEntry {
                ty: DataType::FLOAT32,
                value: CacheValue::F32(v),
            } => Some(v),
            _ => None,
        }
    }

    pub fn read_f64(&self, tag: &Tag) -> Option<f64> {
        match self.entry(tag)? {
            CacheEntry {
                ty: DataType::FLOAT64,
                value: CacheValue::F64(v),
            } => Some(v),
            _ => None,
        }
    }

    // -- Variable-length getters --

    fn offset_of(&self, tag: &Tag, ty: DataType) -> Option<usize> {
        let entry = self.entry(tag)?;
        if entry.ty != ty {
            return None;
        }
        match entry.value {
            CacheValue::Offset(offset) => Some(offset),
            _ => None,
        }
    }

    pub fn read_uuid(&self, tag: &Tag) -> Option<Uuid> {
        let offset = self.offset_of(tag, DataType::UUID)?;
        let bytes = self.payload.get(offset..offset + 16)?;
        Some(Uuid::decode_le(bytes))
    }

    /// Reads a string payload as a borrowed `&str`. Answers `None` for
    /// payload bytes that are not valid UTF-8.
    pub fn read_string(&self, tag: &Tag) -> Option<&'a str> {
        let offset = self.offset_of(tag, DataType::STRING)?;
        let len = self.prefixed_len_u16(offset)?;
        let bytes = self.payload.get(offset + 2..offset + 2 + len)?;
        std::str::from_utf8(bytes).ok()
    }

    /// Reads a binary payload as a borrowed slice.
    pub fn read_binary(&self, tag: &Tag) -> Option<&'a [u8]> {
        let offset = self.offset_of(tag, DataType::BINARY)?;
        let len = self.prefixed_len_u32(offset)?;
        self.payload.get(offset + SIZE_PREFIX..offset + SIZE_PREFIX + len)
    }

    /// Opens a nested object. The child indexes lazily on first use.
    pub fn read_object(&self, tag: &Tag) -> Option<ObjectReader<'a>> {
        let offset = self.offset_of(tag, DataType::OBJECT)?;
        let region = self.payload.get(offset..)?;
        Some(ObjectReader::from_prefixed(region, self.mode))
    }

    fn prefixed_len_u16(&self, offset: usize) -> Option<usize> {
        let bytes = self.payload.get(offset..offset + 2)?;
        Some(u16::from_le_bytes([bytes[0], bytes[1]]) as usize)
    }

    fn prefixed_len_u32(&self, offset: usize) -> Option<usize> {
        let bytes = self.payload.get(offset..offset + SIZE_PREFIX)?;
        Some(u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]) as usize)
    }

    // -- Fixed-base array getters --

    fn scalar_array<T: Scalar>(&self, tag: &Tag, ty: DataType) -> FixedArray<'a, T> {
        let Some(offset) = self.offset_of(tag, ty) else {
            return FixedArray::empty();
        };
        let Some(total) = self.prefixed_len_u32(offset) else {
            return FixedArray::empty();
        };
        let Some(bytes) = self
            .payload
            .get(offset + SIZE_PREFIX..offset + SIZE_PREFIX + total)
        else {
            return FixedArray::empty();
        };
        if total % T::WIDTH != 0 {
            tracing::trace!(total, width = T::WIDTH, "array byte length not divisible");
            return FixedArray::empty();
        }
        FixedArray::new(bytes)
    }

    pub fn read_i8_array(&self, tag: &Tag) -> FixedArray<'a, i8> {
        self.scalar_array(tag, DataType::INT8_ARRAY)
    }

    pub fn read_i16_array(&self, tag: &Tag) -> FixedArray<'a, i16> {
        self.scalar_array(tag, DataType::INT16_ARRAY)
    }

    pub fn read_i32_array(&self, tag: &Tag) -> FixedArray<'a, i32> {
        self.scalar_array(tag, DataType::INT32_ARRAY)
    }

    pub fn read_i64_array(&self, tag: &Tag) -> FixedArray<'a, i64> {
        self.scalar_array(tag, DataType::INT64_ARRAY)
    }

    pub fn read_u8_array(&self, tag: &Tag) -> FixedArray<'a, u8> {
        self.scalar_array(tag, DataType::UINT8_ARRAY)
    }

    pub fn read_u16_array(&self, tag: &Tag) -> FixedArray<'a, u16> {
        self.scalar_array(tag, DataType::UINT16_ARRAY)
    }

    pub fn read_u32_array(&self, tag: &Tag) -> FixedArray<'a, u32> {
        self.scalar_array(tag, DataType::UINT32_ARRAY)
    }

    pub fn read_u64_array(&self, tag: &Tag) -> FixedArray<'a, u64> {
        self.scalar_array(tag, DataType::UINT64_ARRAY)
    }

    pub fn read_bool_array(&self, tag: &Tag) -> FixedArray<'a, bool> {
        self.scalar_array(tag, DataType::BOOL_ARRAY)
    }

    /// Reads an array of half-precision floats as raw bit patterns.
    pub fn read_f16_array(&self, tag: &Tag) -> FixedArray<'a, u16> {
        self.scalar_array(tag, DataType::FLOAT16_ARRAY)
    }

    pub fn read_f32_array(&self, tag: &Tag) -> FixedArray<'a, f32> {
        self.scalar_array(tag, DataType::FLOAT32_ARRAY)
    }

    pub fn read_f64_array(&self, tag: &Tag) -> FixedArray<'a, f64> {
        self.scalar_array(tag, DataType::FLOAT64_ARRAY)
    }

    pub fn read_uuid_array(&self, tag: &Tag) -> FixedArray<'a, Uuid> {
        self.scalar_array(tag, DataType::UUID_ARRAY)
    }

    // -- Vector getters --

    fn vector<T: Scalar, const N: usize>(&self, tag: &Tag, base: DataType) -> Option<[T; N]> {
        let offset = self.offset_of(tag, base.into_vector(N as u32))?;
        let bytes = self.payload.get(offset..offset + N * T::WIDTH)?;
        Some(std::array::from_fn(|i| T::decode_le(&bytes[i * T::WIDTH..])))
    }

    pub fn read_vector2_i8(&self, tag: &Tag) -> Option<[i8; 2]> {
        self.vector(tag, DataType::INT8)
    }

    pub fn read_vector2_i16(&self, tag: &Tag) -> Option<[i16; 2]> {
        self.vector(tag, DataType::INT16)
    }

    pub fn read_vector2_i32(&self, tag: &Tag) -> Option<[i32; 2]> {
        self.vector(tag, DataType::INT32)
    }

    pub fn read_vector2_i64(&self, tag: &Tag) -> Option<[i64; 2]> {
        self.vector(tag, DataType::INT64)
    }

    pub fn read_vector2_bool(&self, tag: &Tag) -> Option<[bool; 2]> {
        self.vector(tag, DataType::BOOL)
    }

    pub fn read_vector2_f16(&self, tag: &Tag) -> Option<[u16; 2]> {
        self.vector(tag, DataType::FLOAT16)
    }

    pub fn read_vector2_f32(&self, tag: &Tag) -> Option<[f32; 2]> {
        self.vector(tag, DataType::FLOAT32)
    }

    pub fn read_vector2_f64(&self, tag: &Tag) -> Option<[f64; 2]> {
        self.vector(tag, DataType::FLOAT64)
    }

    pub fn read_vector3_i8(&self, tag: &Tag) -> Option<[i8; 3]> {
        self.vector(tag, DataType::INT8)
    }

    pub fn read_vector3_i16(&self, tag: &Tag) -> Option<[i16; 3]> {
        self.vector(tag, DataType::INT16)
    }

    pub fn read_vector3_i32(&self, tag: &Tag) -> Option<[i32; 3]> {
        self.vector(tag, DataType::INT32)
    }

    pub fn read_vector3_i64(&self, tag: &Tag) -> Option<[i64; 3]> {
        self.vector(tag, DataType::INT64)
    }

    pub fn read_vector3_bool(&self, tag: &Tag) -> Option<[bool; 3]> {
        self.vector(tag, DataType::BOOL)
    }

    pub fn read_vector3_f16(&self, tag: &Tag) -> Option<[u16; 3]> {
        self.vector(tag, DataType::FLOAT16)
    }

    pub fn read_vector3_f32(&self, tag: &Tag) -> Option<[f32; 3]> {
        self.vector(tag, DataType::FLOAT32)
    }

    pub fn read_vector3_f64(&self, tag: &Tag) -> Option<[f64; 3]> {
        self.vector(tag, DataType::FLOAT64)
    }

    pub fn read_vector4_i8(&self, tag: &Tag) -> Option<[i8; 4]> {
        self.vector(tag, DataType::INT8)
    }

    pub fn read_vector4_i16(&self, tag: &Tag) -> Option<[i16; 4]> {
        self.vector(tag, DataType::INT16)
    }

    pub fn read_vector4_i32(&self, tag: &Tag) -> Option<[i32; 4]> {
        self.vector(tag, DataType::INT32)
    }

    pub fn read_vector4_i64(&self, tag: &Tag) -> Option<[i64; 4]> {
        self.vector(tag, DataType::INT64)
    }

    pub fn read_vector4_bool(&self, tag: &Tag) -> Option<[bool; 4]> {
        self.vector(tag, DataType::BOOL)
    }

    pub fn read_vector4_f16(&self, tag: &Tag) -> Option<[u16; 4]> {
        self.vector(tag, DataType::FLOAT16)
    }

    pub fn read_vector4_f32(&self, tag: &Tag) -> Option<[f32; 4]> {
        self.vector(tag, DataType::FLOAT32)
    }

    pub fn read_vector4_f64(&self, tag: &Tag) -> Option<[f64; 4]> {
        self.vector(tag, DataType::FLOAT64)
    }

    // -- Dynamic array getters --

    pub fn read_string_array(&self, tag: &Tag) -> Option<StringArrayReader<'a>> {
        let offset = self.offset_of(tag, DataType::STRING_ARRAY)?;
        Some(StringArrayReader::new(self.payload.get(offset..)?))
    }

    pub fn read_binary_array(&self, tag: &Tag) -> Option<BinaryArrayReader<'a>> {
        let offset = self.offset_of(tag, DataType::BINARY_ARRAY)?;
        Some(BinaryArrayReader::new(self.payload.get(offset..)?))
    }

    pub fn read_object_array(&self, tag: &Tag) -> Option<ObjectArrayReader<'a>> {
        let offset = self.offset_of(tag, DataType::OBJECT_ARRAY)?;
        Some(ObjectArrayReader::new(self.payload.get(offset..)?, self.mode))
    }
}

/// A zero-copy view over a fixed-base array payload.
///
/// Elements are decoded from the canonical little-endian layout on access.
/// Missing fields, type mismatches and malformed payloads all present as an
/// empty view.
#[derive(Clone, Copy)]
pub struct FixedArray<'a, T: Scalar> {
    bytes: &'a [u8],
    _elem: std::marker::PhantomData<T>,
}

impl<'a, T: Scalar> FixedArray<'a, T> {
    /// `bytes` must be a whole number of elements.
    pub(crate) fn new(bytes: &'a [u8]) -> FixedArray<'a, T> {
        debug_assert!(bytes.len() % T::WIDTH == 0);
        FixedArray {
            bytes,
            _elem: std::marker::PhantomData,
        }
    }

    pub(crate) fn empty() -> FixedArray<'a, T> {
        FixedArray::new(&[])
    }

    pub fn len(&self) -> usize {
        self.bytes.len() / T::WIDTH
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<T> {
        let start = index.checked_mul(T::WIDTH)?;
        let end = start.checked_add(T::WIDTH)?;
        let bytes = self.bytes.get(start..end)?;
        Some(T::decode_le(bytes))
    }

    pub fn iter(&self) -> FixedArrayIter<'a, T> {
        FixedArrayIter {
            bytes: self.bytes,
            _elem: std::marker::PhantomData,
        }
    }

    /// The raw little-endian element bytes.
    pub fn as_bytes(&self) -> &'a [u8] {
        self.bytes
    }

    pub fn to_vec(&self) -> Vec<T> {
        self.iter().collect()
    }
}

impl<'a, T: Scalar> IntoIterator for &FixedArray<'a, T> {
    type Item = T;
    type IntoIter = FixedArrayIter<'a, T>;

    fn into_iter(self) -> FixedArrayIter<'a, T> {
        self.iter()
    }
}

/// Forward iterator over a [`FixedArray`].
pub struct FixedArrayIter<'a, T: Scalar> {
    bytes: &'a [u8],
    _elem: std::marker::PhantomData<T>,
}

impl<T: Scalar> Iterator for FixedArrayIter<'_, T> {
    type Item = T;

    fn next(&mut self) -> Option<T> {
        if self.bytes.len() < T::WIDTH {
            return None;
        }
        let value = T::decode_le(self.bytes);
        self.bytes = &self.bytes[T::WIDTH..];
        Some(value)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let remaining = self.bytes.len() / T::WIDTH;
        (remaining, Some(remaining))
    }
}

impl<T: Scalar> ExactSizeIterator for FixedArrayIter<'_, T> {}

// -- Index construction --

struct Cursor<'a> {
    bytes: &'a [u8],
    pos: usize,
}

impl<'a> Cursor<'a> {
    fn at_end(&self) -> bool {
        self.pos >= self.bytes.len()
    }

    fn take_slice(&mut self, len: usize) -> Result<&'a [u8], FormatError> {
        let end = self.pos.checked_add(len).ok_or(FormatError::Truncated)?;
        let slice = self
            .bytes
            .get(self.pos..end)
            .ok_or(FormatError::Truncated)?;
        self.pos = end;
        Ok(slice)
    }

    fn take_u8(&mut self) -> Result<u8, FormatError> {
        Ok(self.take_slice(1)?[0])
    }

    fn take_u16_le(&mut self) -> Result<u16, FormatError> {
        let bytes = self.take_slice(2)?;
        Ok(u16::from_le_bytes([bytes[0], bytes[1]]))
    }

    fn take_u32_le(&mut self) -> Result<u32, FormatError> {
        let bytes = self.take_slice(4)?;
        Ok(u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]))
    }

    fn take_scalar<T: Scalar>(&mut self) -> Result<T, FormatError> {
        Ok(T::decode_le(self.take_slice(T::WIDTH)?))
    }
}

fn build_index(payload: &[u8], mode: Mode) -> Result<TagIndex<'_>, FormatError> {
    // An empty payload is not a parseable object.
    if payload.is_empty() {
        return Err(FormatError::LengthMismatch);
    }

    let mut index = match mode {
        Mode::Names => TagIndex::Names(HashMap::with_capacity(INITIAL_INDEX_CAPACITY)),
        Mode::Ids => TagIndex::Ids(HashMap::with_capacity(INITIAL_INDEX_CAPACITY)),
    };
    let mut cursor = Cursor {
        bytes: payload,
        pos: 0,
    };

    while !cursor.at_end() {
        let marker = cursor.take_u8()?;
        let ty = DataType::from_byte(marker);
        if !ty.is_valid() {
            return Err(FormatError::InvalidTypeMarker(marker));
        }

        // First identifier wins on duplicates.
        match &mut index {
            TagIndex::Names(map) => {
                let len = cursor
                    .take_u8()
                    .map_err(|_| FormatError::IdentifierOverrun)?;
                let bytes = cursor
                    .take_slice(len as usize)
                    .map_err(|_| FormatError::IdentifierOverrun)?;
                let name = std::str::from_utf8(bytes).map_err(|_| FormatError::InvalidName)?;
                let value = parse_field_payload(&mut cursor, ty)?;
                map.entry(name).or_insert(CacheEntry { ty, value });
            }
            TagIndex::Ids(map) => {
                let id = cursor
                    .take_u16_le()
                    .map_err(|_| FormatError::IdentifierOverrun)?;
                let value = parse_field_payload(&mut cursor, ty)?;
                map.entry(id).or_insert(CacheEntry { ty, value });
            }
        }
    }

    Ok(index)
}

fn parse_field_payload(cursor: &mut Cursor<'_>, ty: DataType) -> Result<CacheValue, FormatError> {
    if ty.is_array() {
        let offset = cursor.pos;
        let total = cursor.take_u32_le()?;
        cursor.take_slice(total as usize)?;
        return Ok(CacheValue::Offset(offset));
    }
    if ty.is_vector() {
        let offset = cursor.pos;
        let span = (ty.vector_dim() * ty.base_width()) as usize;
        cursor.take_slice(span)?;
        return Ok(CacheValue::Offset(offset));
    }

    match ty {
        DataType::INT8 => Ok(CacheValue::I8(cursor.take_scalar()?)),
        DataType::INT16 => Ok(CacheValue::I16(cursor.take_scalar()?)),
        DataType::INT32 => Ok(CacheValue::I32(cursor.take_scalar()?)),
        DataType::INT64 => Ok(CacheValue::I64(cursor.take_scalar()?)),
        DataType::UINT8 => Ok(CacheValue::U8(cursor.take_scalar()?)),
        DataType::UINT16 => Ok(CacheValue::U16(cursor.take_scalar()?)),
        DataType::UINT32 => Ok(CacheValue::U32(cursor.take_scalar()?)),
        DataType::UINT64 => Ok(CacheValue::U64(cursor.take_scalar()?)),
        DataType::BOOL => Ok(CacheValue::Bool(cursor.take_scalar()?)),
        DataType::FLOAT16 => Ok(CacheValue::F16(cursor.take_scalar()?)),
        DataType::FLOAT32 => Ok(CacheValue::F32(cursor.take_scalar()?)),
        DataType::FLOAT64 => Ok(CacheValue::F64(cursor.take_scalar()?)),
        DataType::UUID => {
            let offset = cursor.pos;
            cursor.take_slice(16)?;
            Ok(CacheValue::Offset(offset))
        }
        DataType::STRING => {
            let offset = cursor.pos;
            let len = cursor.take_u16_le()?;
            cursor.take_slice(len as usize)?;
            Ok(CacheValue::Offset(offset))
        }
        DataType::BINARY | DataType::OBJECT => {
            let offset = cursor.pos;
            let len = cursor.take_u32_le()?;
            cursor.take_slice(len as usize)?;
            Ok(CacheValue::Offset(offset))
        }
        _ => Err(FormatError::InvalidTypeMarker(ty.byte())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::writer::Writer;

    const N: Tag = Tag::named("n");
    const S: Tag = Tag::named("s");
    const A: Tag = Tag::named("a");

    fn finished(writer: &mut Writer) -> &[u8] {
        writer.finish();
        writer.as_bytes()
    }

    #[test]
    fn scalar_round_trip() {
        let mut writer = Writer::new(Mode::Names);
        let mut root = writer.root();
        root.field_i8(&Tag::named("a_i8"), -5);
        root.field_i16(&Tag::named("a_i16"), -30_000);
        root.field_i32(&Tag::named("a_i32"), -2_000_000_000);
        root.field_i64(&Tag::named("a_i64"), i64::MIN);
        root.field_u8(&Tag::named("a_u8"), 250);
        root.field_u16(&Tag::named("a_u16"), 65_000);
        root.field_u32(&Tag::named("a_u32"), 4_000_000_000);
        root.field_u64(&Tag::named("a_u64"), u64::MAX);
        root.field_bool(&Tag::named("a_bool"), true);
        root.field_f16(&Tag::named("a_f16"), 0x3C00);
        root.field_f32(&Tag::named("a_f32"), -0.25);
        root.field_f64(&Tag::named("a_f64"), 6.02214076e23);
        drop(root);

        let reader = Reader::new(finished(&mut writer), Mode::Names);
        assert!(reader.is_valid());
        let root = reader.root_object();
        assert_eq!(root.read_i8(&Tag::named("a_i8")), Some(-5));
        assert_eq!(root.read_i16(&Tag::named("a_i16")), Some(-30_000));
        assert_eq!(root.read_i32(&Tag::named("a_i32")), Some(-2_000_000_000));
        assert_eq!(root.read_i64(&Tag::named("a_i64")), Some(i64::MIN));
        assert_eq!(root.read_u8(&Tag::named("a_u8")), Some(250));
        assert_eq!(root.read_u16(&Tag::named("a_u16")), Some(65_000));
        assert_eq!(root.read_u32(&Tag::named("a_u32")), Some(4_000_000_000));
        assert_eq!(root.read_u64(&Tag::named("a_u64")), Some(u64::MAX));
        assert_eq!(root.read_bool(&Tag::named("a_bool")), Some(true));
        assert_eq!(root.read_f16(&Tag::named("a_f16")), Some(0x3C00));
        assert_eq!(root.read_f32(&Tag::named("a_f32")), Some(-0.25));
        assert_eq!(root.read_f64(&Tag::named("a_f64")), Some(6.02214076e23));
    }

    #[test]
    fn reads_the_documented_i32_layout() {
        // The exact bytes of a single `i32 "n" = -123456789` buffer.
        let buffer: &[u8] = &[
            0x07, 0x00, 0x00, 0x00, 0x02, 0x01, b'n', 0xEB, 0x32, 0xA4, 0xF8,
        ];
        let reader = Reader::new(buffer, Mode::Names);
        assert!(reader.is_valid());
        assert_eq!(reader.root_object().read_i32(&N), Some(-123_456_789));
    }

    #[test]
    fn string_round_trip() {
        let mut writer = Writer::new(Mode::Names);
        let mut root = writer.root();
        root.field_string(&S, "hello");
        root.field_string(&Tag::named("empty"), "");
        drop(root);

        let reader = Reader::new(finished(&mut writer), Mode::Names);
        let root = reader.root_object();
        assert_eq!(root.read_string(&S), Some("hello"));
        assert_eq!(root.read_string(&Tag::named("empty")), Some(""));
        assert_eq!(root.read_string(&Tag::named("missing")), None);
    }

    #[test]
    fn binary_round_trip() {
        let payload = [0u8, 1, 2, 253, 254, 255];
        let mut writer = Writer::new(Mode::Names);
        let mut root = writer.root();
        root.field_binary(&Tag::named("blob"), &payload);
        drop(root);

        let reader = Reader::new(finished(&mut writer), Mode::Names);
        assert_eq!(
            reader.root_object().read_binary(&Tag::named("blob")),
            Some(&payload[..])
        );
    }

    #[test]
    fn uuid_round_trip() {
        let uuid = Uuid::from_bytes([
            0xA0, 0xA1, 0xA2, 0xA3, 0xB0, 0xB1, 0xC0, 0xC1, //
            0xD0, 0xD1, 0xD2, 0xD3, 0xD4, 0xD5, 0xD6, 0xD7,
        ]);
        let mut writer = Writer::new(Mode::Names);
        let mut root = writer.root();
        root.field_uuid(&Tag::named("u"), &uuid);
        drop(root);

        let reader = Reader::new(finished(&mut writer), Mode::Names);
        assert_eq!(reader.root_object().read_uuid(&Tag::named("u")), Some(uuid));
    }

    #[test]
    fn type_matching_is_strict() {
        let mut writer = Writer::new(Mode::Names);
        let mut root = writer.root();
        root.field_i16(&N, 7);
        root.field_i32_array(&A, &[10, 20, 30, 40, 50]);
        drop(root);

        let reader = Reader::new(finished(&mut writer), Mode::Names);
        let root = reader.root_object();
        // An i16 is not an i32, u16, or anything else.
        assert_eq!(root.read_i16(&N), Some(7));
        assert_eq!(root.read_i32(&N), None);
        assert_eq!(root.read_u16(&N), None);
        assert_eq!(root.read_string(&N), None);
        // A fixed array is not a string array, and vice versa.
        assert_eq!(root.read_i32_array(&A).to_vec(), vec![10, 20, 30, 40, 50]);
        assert!(root.read_string_array(&A).is_none());
        assert!(root.read_i16_array(&A).is_empty());
    }

    #[test]
    fn vector_round_trip_and_dimension_strictness() {
        let mut writer = Writer::new(Mode::Names);
        let mut root = writer.root();
        root.field_vector3_f32(&Tag::named("pos"), [1.5, -2.5, 0.0]);
        root.field_vector2_i32(&Tag::named("grid"), [640, 480]);
        root.field_vector4_bool(&Tag::named("mask"), [true, false, true, true]);
        drop(root);

        let reader = Reader::new(finished(&mut writer), Mode::Names);
        let root = reader.root_object();
        assert_eq!(root.read_vector3_f32(&Tag::named("pos")), Some([1.5, -2.5, 0.0]));
        assert_eq!(root.read_vector2_i32(&Tag::named("grid")), Some([640, 480]));
        assert_eq!(
            root.read_vector4_bool(&Tag::named("mask")),
            Some([true, false, true, true])
        );
        // Same base, wrong dimension.
        assert_eq!(root.read_vector2_f32(&Tag::named("pos")), None);
        assert_eq!(root.read_vector4_f32(&Tag::named("pos")), None);
        // Same dimension, wrong base.
        assert_eq!(root.read_vector3_i32(&Tag::named("pos")), None);
    }

    #[test]
    fn fixed_arrays_round_trip() {
        let mut writer = Writer::new(Mode::Names);
        let mut root = writer.root();
        root.field_u8_array(&Tag::named("bytes"), &[1, 2, 3]);
        root.field_f64_array(&Tag::named("floats"), &[0.5, -0.5]);
        root.field_bool_array(&Tag::named("flags"), &[true, false]);
        root.field_i64_array(&Tag::named("none"), &[]);
        drop(root);

        let reader = Reader::new(finished(&mut writer), Mode::Names);
        let root = reader.root_object();
        assert_eq!(root.read_u8_array(&Tag::named("bytes")).to_vec(), vec![1, 2, 3]);
        assert_eq!(
            root.read_f64_array(&Tag::named("floats")).to_vec(),
            vec![0.5, -0.5]
        );
        assert_eq!(
            root.read_bool_array(&Tag::named("flags")).to_vec(),
            vec![true, false]
        );
        let empty = root.read_i64_array(&Tag::named("none"));
        assert!(empty.is_empty());
        assert_eq!(empty.len(), 0);
    }

    #[test]
    fn uuid_array_round_trip() {
        let uuids = [Uuid::from_u128(1), Uuid::from_u128(0xFFEE_DDCC)];
        let mut writer = Writer::new(Mode::Names);
        let mut root = writer.root();
        root.field_uuid_array(&Tag::named("ids"), &uuids);
        drop(root);

        let reader = Reader::new(finished(&mut writer), Mode::Names);
        let arr = reader.root_object().read_uuid_array(&Tag::named("ids"));
        assert_eq!(arr.len(), 2);
        assert_eq!(arr.get(0), Some(uuids[0]));
        assert_eq!(arr.get(1), Some(uuids[1]));
        assert_eq!(arr.get(2), None);
    }

    #[test]
    fn fixed_array_iteration_matches_random_access() {
        let data = [10i32, 20, 30, 40, 50];
        let mut writer = Writer::new(Mode::Names);
        let mut root = writer.root();
        root.field_i32_array(&A, &data);
        drop(root);

        let reader = Reader::new(finished(&mut writer), Mode::Names);
        let arr = reader.root_object().read_i32_array(&A);
        assert_eq!(arr.len(), data.len());
        for (i, value) in arr.iter().enumerate() {
            assert_eq!(arr.get(i), Some(value));
            assert_eq!(value, data[i]);
        }
        assert_eq!(arr.iter().count(), data.len());
    }

    #[test]
    fn nested_objects() {
        let mut writer = Writer::new(Mode::Names);
        let mut root = writer.root();
        {
            let mut user = root.field_object(&Tag::named("user"));
            user.field_i32(&Tag::named("id"), 7);
            user.field_string(&Tag::named("name"), "ada");
        }
        root.field_bool(&Tag::named("active"), true);
        drop(root);

        let reader = Reader::new(finished(&mut writer), Mode::Names);
        let root = reader.root_object();
        let user = root.read_object(&Tag::named("user")).unwrap();
        assert!(user.is_valid());
        assert_eq!(user.read_i32(&Tag::named("id")), Some(7));
        assert_eq!(user.read_string(&Tag::named("name")), Some("ada"));
        assert_eq!(root.read_bool(&Tag::named("active")), Some(true));
        // The nested payload is opaque to the wrong accessor.
        assert_eq!(root.read_binary(&Tag::named("user")), None);
    }

    #[test]
    fn id_mode_round_trip() {
        const X: Tag = Tag::named("x");
        const Y: Tag = Tag::with_id(900);

        let mut writer = Writer::new(Mode::Ids);
        let mut root = writer.root();
        root.field_i32(&X, 1);
        root.field_string(&Y, "by-id");
        drop(root);

        let reader = Reader::new(finished(&mut writer), Mode::Ids);
        let root = reader.root_object();
        assert!(reader.is_valid());
        assert_eq!(root.read_i32(&X), Some(1));
        assert_eq!(root.read_i32(&Tag::with_id(X.id())), Some(1));
        assert_eq!(root.read_string(&Y), Some("by-id"));
        // A name-only tag cannot address an id-based buffer.
        assert_eq!(root.read_string(&Tag::observed("y")), None);
    }

    #[test]
    fn contains_and_type_of() {
        let mut writer = Writer::new(Mode::Names);
        let mut root = writer.root();
        root.field_f32(&N, 1.0);
        drop(root);

        let reader = Reader::new(finished(&mut writer), Mode::Names);
        let root = reader.root_object();
        assert!(root.contains(&N));
        assert!(!root.contains(&S));
        assert_eq!(root.type_of(&N), Some(DataType::FLOAT32));
        assert_eq!(root.type_of(&S), None);
    }

    #[test]
    fn all_tags_reports_every_field() {
        let mut writer = Writer::new(Mode::Names);
        let mut root = writer.root();
        root.field_i8(&Tag::named("one"), 1);
        root.field_i8(&Tag::named("two"), 2);
        root.field_i8(&Tag::named("three"), 3);
        drop(root);

        let reader = Reader::new(finished(&mut writer), Mode::Names);
        let mut names: Vec<&str> = reader
            .root_object()
            .all_tags()
            .iter()
            .filter_map(|t| t.name())
            .collect();
        names.sort_unstable();
        assert_eq!(names, vec!["one", "three", "two"]);
    }

    #[test]
    fn duplicate_identifiers_first_wins() {
        let mut writer = Writer::new(Mode::Names);
        let mut root = writer.root();
        root.field_i32(&N, 1);
        root.field_i32(&N, 2);
        drop(root);

        let reader = Reader::new(finished(&mut writer), Mode::Names);
        assert!(reader.is_valid());
        assert_eq!(reader.root_object().read_i32(&N), Some(1));
    }

    #[test]
    fn oversized_root_size_is_invalid() {
        let mut writer = Writer::new(Mode::Names);
        let mut root = writer.root();
        root.field_i32(&N, -123_456_789);
        drop(root);
        writer.finish();

        let mut corrupted = writer.as_bytes().to_vec();
        corrupted[0..4].copy_from_slice(&u32::MAX.to_le_bytes());

        let reader = Reader::new(&corrupted, Mode::Names);
        assert!(!reader.is_valid());
        assert_eq!(reader.root_object().read_i32(&N), None);
        assert_eq!(
            reader.root_object().validation_error(),
            Some(FormatError::LengthMismatch)
        );
    }

    #[test]
    fn truncated_buffers_are_invalid() {
        let mut writer = Writer::new(Mode::Names);
        let mut root = writer.root();
        root.field_string(&S, "hello world");
        drop(root);
        writer.finish();
        let bytes = writer.as_bytes();

        // Anything shorter than the declared extent is invalid, down to an
        // empty buffer.
        for cut in 0..bytes.len() {
            let reader = Reader::new(&bytes[..cut], Mode::Names);
            assert!(!reader.is_valid(), "cut at {cut} should not parse");
            assert_eq!(reader.root_object().read_string(&S), None);
        }
    }

    #[test]
    fn invalid_type_marker_is_rejected() {
        // Root of 3 bytes: marker 0x4C would be a vector4 of UUIDs, which
        // is not a representable type.
        let buffer: &[u8] = &[0x03, 0x00, 0x00, 0x00, 0x4C, 0x01, b'x'];
        let reader = Reader::new(buffer, Mode::Names);
        assert!(!reader.is_valid());
        assert_eq!(
            reader.root_object().validation_error(),
            Some(FormatError::InvalidTypeMarker(0x4C))
        );
    }

    #[test]
    fn field_overrunning_its_object_is_rejected() {
        // Declared string length runs past the object payload end.
        let buffer: &[u8] = &[
            0x06, 0x00, 0x00, 0x00, // payload: 6 bytes
            0x0D, 0x01, b's', // string "s"
            0xFF, 0x00, // claims 255 bytes
            b'h', // only one present
        ];
        let reader = Reader::new(buffer, Mode::Names);
        assert!(!reader.is_valid());
    }

    #[test]
    fn name_length_overrun_is_rejected() {
        let buffer: &[u8] = &[
            0x03, 0x00, 0x00, 0x00, // payload: 3 bytes
            0x02, 0x09, b'n', // name claims 9 bytes, payload has 1
        ];
        let reader = Reader::new(buffer, Mode::Names);
        assert!(!reader.is_valid());
        assert_eq!(
            reader.root_object().validation_error(),
            Some(FormatError::IdentifierOverrun)
        );
    }

    #[test]
    fn empty_object_payload_is_invalid() {
        let mut writer = Writer::new(Mode::Names);
        writer.finish();
        let reader = Reader::new(writer.as_bytes(), Mode::Names);
        assert!(!reader.is_valid());
    }

    #[test]
    fn arbitrary_bytes_never_panic() {
        // A deterministic spread of junk buffers; every accessor must stay
        // memory-safe and simply answer "missing" when parsing fails.
        for len in 0..64usize {
            let bytes: Vec<u8> = (0..len).map(|i| (i as u8).wrapping_mul(37).wrapping_add(11)).collect();
            let reader = Reader::new(&bytes, Mode::Names);
            let root = reader.root_object();
            let _ = root.is_valid();
            let _ = root.read_i32(&N);
            let _ = root.read_string(&S);
            let _ = root.read_i32_array(&A).to_vec();
            let _ = root.read_object(&N);
            let _ = root.all_tags();

            let reader = Reader::new(&bytes, Mode::Ids);
            let _ = reader.is_valid();
            let _ = reader.root_object().read_u64(&Tag::with_id(1));
        }
    }

    #[test]
    fn non_divisible_array_length_reads_empty() {
        // A 5-byte payload under an i32 array marker: indexes fine, but the
        // typed view rejects it.
        let buffer: &[u8] = &[
            0x0C, 0x00, 0x00, 0x00, // root payload: 12 bytes
            0xA2, 0x01, b'a', // i32 array "a"
            0x05, 0x00, 0x00, 0x00, // 5 bytes of elements
            0x01, 0x02, 0x03, 0x04, 0x05,
        ];
        let reader = Reader::new(buffer, Mode::Names);
        assert!(reader.is_valid());
        let root = reader.root_object();
        assert!(root.contains(&A));
        assert!(root.read_i32_array(&A).is_empty());
    }

    #[test]
    fn trailing_garbage_after_root_is_ignored() {
        let mut writer = Writer::new(Mode::Names);
        let mut root = writer.root();
        root.field_i32(&N, 9);
        drop(root);
        writer.finish();

        let mut bytes = writer.as_bytes().to_vec();
        bytes.extend_from_slice(&[0xAA, 0xBB, 0xCC]);
        let reader = Reader::new(&bytes, Mode::Names);
        assert!(reader.is_valid());
        assert_eq!(reader.root_object().read_i32(&N), Some(9));
    }

    #[test]
    fn readers_share_across_threads_after_indexing() {
        let mut writer = Writer::new(Mode::Names);
        let mut root = writer.root();
        root.field_i32(&N, 77);
        drop(root);
        writer.finish();
        let bytes = writer.as_bytes().to_vec();

        let reader = Reader::new(&bytes, Mode::Names);
        assert!(reader.is_valid());
        std::thread::scope(|scope| {
            for _ in 0..4 {
                scope.spawn(|| {
                    assert_eq!(reader.root_object().read_i32(&N), Some(77));
                });
            }
        });
    }
}
