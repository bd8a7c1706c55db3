//! Buffer assembly with deferred size back-patching.
//!
//! A [`Writer`] owns a growable byte buffer holding exactly one root object.
//! Nested payloads (objects and dynamic arrays) reserve a four-byte size slot
//! when they begin and patch it with "bytes appended since" when they finish.
//! Cursors ([`ObjectWriter`] and the array writers) mutably borrow their
//! parent, so only the innermost open cursor can append; finishing happens
//! automatically when a cursor is dropped and is idempotent.

mod array;

pub use array::{BinaryArrayWriter, ObjectArrayWriter, StringArrayWriter};

use bytes::{BufMut, Bytes, BytesMut};
use uuid::Uuid;

use crate::endian::{normalize_in_place, Scalar};
use crate::types::{DataType, Mode, Tag};

/// Smallest permitted capacity growth step.
const MIN_GROW_CHUNK: usize = 1024;
/// Default capacity growth step.
const DEFAULT_GROW_CHUNK: usize = 1024 * 1024;
/// Width of a reserved size slot.
const SIZE_SLOT: usize = 4;

/// Produces a TagBuf buffer.
///
/// The root object's size slot is reserved at construction; fields are
/// appended through the cursor returned by [`Writer::root`], and
/// [`Writer::finish`] patches the root size. After that the buffer can be
/// inspected with [`Writer::as_bytes`] or handed off with
/// [`Writer::into_bytes`].
pub struct Writer {
    buf: BytesMut,
    grow_chunk: usize,
    mode: Mode,
}

impl Writer {
    /// Creates a writer with the default 1 MiB grow chunk.
    pub fn new(mode: Mode) -> Writer {
        Writer::with_grow_chunk(mode, DEFAULT_GROW_CHUNK)
    }

    /// Creates a writer with a custom grow chunk, clamped to a 1 KiB floor.
    pub fn with_grow_chunk(mode: Mode, grow_chunk: usize) -> Writer {
        let grow_chunk = grow_chunk.max(MIN_GROW_CHUNK);
        let mut buf = BytesMut::with_capacity(grow_chunk);
        buf.put_bytes(0, SIZE_SLOT);
        Writer {
            buf,
            grow_chunk,
            mode,
        }
    }

    pub fn mode(&self) -> Mode {
        self.mode
    }

    /// Adjusts the capacity growth step, clamped to the 1 KiB floor.
    pub fn set_grow_chunk(&mut self, grow_chunk: usize) {
        self.grow_chunk = grow_chunk.max(MIN_GROW_CHUNK);
    }

    /// A cursor over the root object.
    pub fn root(&mut self) -> ObjectWriter<'_> {
        ObjectWriter {
            writer: self,
            size_slot: 0,
            finished: false,
        }
    }

    /// Patches the root size slot. Calling this twice is equivalent to
    /// calling it once; appending after it produces a corrupt buffer.
    pub fn finish(&mut self) {
        self.patch_size(0);
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.buf
    }

    pub fn len(&self) -> usize {
        self.buf.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    /// Consumes the writer, handing ownership of the buffer to the caller.
    pub fn into_bytes(self) -> Bytes {
        self.buf.freeze()
    }

    // -- Appending primitives --

    fn ensure_capacity(&mut self, additional: usize) {
        let free = self.buf.capacity() - self.buf.len();
        if free < additional {
            let mut step = self.grow_chunk;
            if additional > step {
                step = additional + self.grow_chunk;
            }
            self.buf.reserve(step);
        }
    }

    fn reserve_size_slot(&mut self) -> usize {
        let offset = self.buf.len();
        self.ensure_capacity(SIZE_SLOT);
        self.buf.put_bytes(0, SIZE_SLOT);
        offset
    }

    fn patch_size(&mut self, slot: usize) {
        let size = (self.buf.len() - slot - SIZE_SLOT) as u32;
        self.buf[slot..slot + SIZE_SLOT].copy_from_slice(&size.to_le_bytes());
    }

    fn write_field_header(&mut self, tag: &Tag, ty: DataType) {
        match self.mode {
            Mode::Names => {
                let name = tag
                    .name()
                    .expect("name-based writer requires a tag with a name");
                debug_assert!(!name.is_empty() && name.len() <= 255);
                self.ensure_capacity(2 + name.len());
                self.buf.put_u8(ty.byte());
                self.buf.put_u8(name.len() as u8);
                self.buf.put_slice(name.as_bytes());
            }
            Mode::Ids => {
                let id = tag.id();
                assert!(id != 0, "id-based writer requires a tag with a non-zero id");
                self.ensure_capacity(3);
                self.buf.put_u8(ty.byte());
                self.buf.put_u16_le(id);
            }
        }
    }

    fn write_string(&mut self, value: &str) {
        assert!(
            value.len() <= u16::MAX as usize,
            "string payload exceeds 65535 bytes"
        );
        self.ensure_capacity(2 + value.len());
        self.buf.put_u16_le(value.len() as u16);
        self.buf.put_slice(value.as_bytes());
    }

    fn write_binary(&mut self, data: &[u8]) {
        assert!(
            data.len() <= u32::MAX as usize,
            "binary payload exceeds u32::MAX bytes"
        );
        self.ensure_capacity(4 + data.len());
        self.buf.put_u32_le(data.len() as u32);
        self.buf.put_slice(data);
    }
}

/// A scoped cursor appending fields to one object.
///
/// Obtained from [`Writer::root`], [`ObjectWriter::field_object`] or
/// [`ObjectArrayWriter::create_element`]. Dropping the cursor finishes it;
/// the borrow checker keeps the parent frozen until then.
pub struct ObjectWriter<'w> {
    writer: &'w mut Writer,
    size_slot: usize,
    finished: bool,
}

impl<'w> ObjectWriter<'w> {
    pub(crate) fn begin(writer: &mut Writer) -> ObjectWriter<'_> {
        let size_slot = writer.reserve_size_slot();
        ObjectWriter {
            writer,
            size_slot,
            finished: false,
        }
    }

    /// Patches this object's size slot. Idempotent; also runs on drop.
    pub fn finish(&mut self) {
        if !self.finished {
            self.writer.patch_size(self.size_slot);
            self.finished = true;
        }
    }

    pub fn is_finished(&self) -> bool {
        self.finished
    }

    // -- Scalar fields --

    pub fn field_i8(&mut self, tag: &Tag, value: i8) {
        self.writer.write_field_header(tag, DataType::INT8);
        self.writer.buf.put_i8(value);
    }

    pub fn field_i16(&mut self, tag: &Tag, value: i16) {
        self.writer.write_field_header(tag, DataType::INT16);
        self.writer.buf.put_i16_le(value);
    }

    pub fn field_i32(&mut self, tag: &Tag, value: i32) {
        self.writer.write_field_header(tag, DataType::INT32);
        self.writer.buf.put_i32_le(value);
    }

    pub fn field_i64(&mut self, tag: &Tag, value: i64) {
        self.writer.write_field_header(tag, DataType::INT64);
        self.writer.buf.put_i64_le(value);
    }

    pub fn field_u8(&mut self, tag: &Tag, value: u8) {
        self.writer.write_field_header(tag, DataType::UINT8);
        self.writer.buf.put_u8(value);
    }

    pub fn field_u16(&mut self, tag: &Tag, value: u16) {
        self.writer.write_field_header(tag, DataType::UINT16);
        self.writer.buf.put_u16_le(value);
    }

    pub fn field_u32(&mut self, tag: &Tag, value: u32) {
        self.writer.write_field_header(tag, DataType::UINT32);
        self.writer.buf.put_u32_le(value);
    }

    pub fn field_u64(&mut self, tag: &Tag, value: u64) {
        self.writer.write_field_header(tag, DataType::UINT64);
        self.writer.buf.put_u64_le(value);
    }

    pub fn field_bool(&mut self, tag: &Tag, value: bool) {
        self.writer.write_field_header(tag, DataType::BOOL);
        self.writer.buf.put_u8(value as u8);
    }

    /// Writes a half-precision float as its raw bit pattern.
    pub fn field_f16(&mut self, tag: &Tag, bits: u16) {
        self.writer.write_field_header(tag, DataType::FLOAT16);
        self.writer.buf.put_u16_le(bits);
    }

    pub fn field_f32(&mut self, tag: &Tag, value: f32) {
        self.writer.write_field_header(tag, DataType::FLOAT32);
        self.writer.buf.put_u32_le(value.to_bits());
    }

    pub fn field_f64(&mut self, tag: &Tag, value: f64) {
        self.writer.write_field_header(tag, DataType::FLOAT64);
        self.writer.buf.put_u64_le(value.to_bits());
    }

    pub fn field_uuid(&mut self, tag: &Tag, value: &Uuid) {
        self.writer.write_field_header(tag, DataType::UUID);
        self.writer.buf.put_slice(value.as_bytes());
    }

    /// Writes a length-prefixed string payload (at most 65 535 bytes).
    pub fn field_string(&mut self, tag: &Tag, value: &str) {
        self.writer.write_field_header(tag, DataType::STRING);
        self.writer.write_string(value);
    }

    pub fn field_binary(&mut self, tag: &Tag, data: &[u8]) {
        self.writer.write_field_header(tag, DataType::BINARY);
        self.writer.write_binary(data);
    }

    /// Opens a nested object. The child cursor must finish (or drop) before
    /// this cursor can append again.
    pub fn field_object(&mut self, tag: &Tag) -> ObjectWriter<'_> {
        self.writer.write_field_header(tag, DataType::OBJECT);
        ObjectWriter::begin(self.writer)
    }

    // -- Fixed-base array fields --

    fn scalar_array<T: Scalar>(&mut self, tag: &Tag, ty: DataType, data: &[T]) {
        self.writer.write_field_header(tag, ty);
        let total = data.len() * T::WIDTH;
        assert!(
            total <= u32::MAX as usize,
            "array payload exceeds u32::MAX bytes"
        );
        self.writer.ensure_capacity(4 + total);
        self.writer.buf.put_u32_le(total as u32);
        let start = self.writer.buf.len();
        for &value in data {
            value.append_native(&mut self.writer.buf);
        }
        normalize_in_place(T::WIDTH as u32, &mut self.writer.buf[start..]);
    }

    pub fn field_i8_array(&mut self, tag: &Tag, data: &[i8]) {
        self.scalar_array(tag, DataType::INT8_ARRAY, data);
    }

    pub fn field_i16_array(&mut self, tag: &Tag, data: &[i16]) {
        self.scalar_array(tag, DataType::INT16_ARRAY, data);
    }

    pub fn field_i32_array(&mut self, tag: &Tag, data: &[i32]) {
        self.scalar_array(tag, DataType::INT32_ARRAY, data);
    }

    pub fn field_i64_array(&mut self, tag: &Tag, data: &[i64]) {
        self.scalar_array(tag, DataType::INT64_ARRAY, data);
    }

    pub fn field_u8_array(&mut self, tag: &Tag, data: &[u8]) {
        self.scalar_array(tag, DataType::UINT8_ARRAY, data);
    }

    pub fn field_u16_array(&mut self, tag: &Tag, data: &[u16]) {
        self.scalar_array(tag, DataType::UINT16_ARRAY, data);
    }

    pub fn field_u32_array(&mut self, tag: &Tag, data: &[u32]) {
        self.scalar_array(tag, DataType::UINT32_ARRAY, data);
    }

    pub fn field_u64_array(&mut self, tag: &Tag, data: &[u64]) {
        self.scalar_array(tag, DataType::UINT64_ARRAY, data);
    }

    pub fn field_bool_array(&mut self, tag: &Tag, data: &[bool]) {
        self.scalar_array(tag, DataType::BOOL_ARRAY, data);
    }

    /// Writes an array of half-precision floats as raw bit patterns.
    pub fn field_f16_array(&mut self, tag: &Tag, bits: &[u16]) {
        self.scalar_array(tag, DataType::FLOAT16_ARRAY, bits);
    }

    pub fn field_f32_array(&mut self, tag: &Tag, data: &[f32]) {
        self.scalar_array(tag, DataType::FLOAT32_ARRAY, data);
    }

    pub fn field_f64_array(&mut self, tag: &Tag, data: &[f64]) {
        self.scalar_array(tag, DataType::FLOAT64_ARRAY, data);
    }

    pub fn field_uuid_array(&mut self, tag: &Tag, data: &[Uuid]) {
        self.scalar_array(tag, DataType::UUID_ARRAY, data);
    }

    // -- Vector fields --

    fn vector<T: Scalar, const N: usize>(&mut self, tag: &Tag, base: DataType, data: [T; N]) {
        self.writer
            .write_field_header(tag, base.into_vector(N as u32));
        self.writer.ensure_capacity(N * T::WIDTH);
        let start = self.writer.buf.len();
        for value in data {
            value.append_native(&mut self.writer.buf);
        }
        normalize_in_place(T::WIDTH as u32, &mut self.writer.buf[start..]);
    }

    pub fn field_vector2_i8(&mut self, tag: &Tag, data: [i8; 2]) {
        self.vector(tag, DataType::INT8, data);
    }

    pub fn field_vector2_i16(&mut self, tag: &Tag, data: [i16; 2]) {
        self.vector(tag, DataType::INT16, data);
    }

    pub fn field_vector2_i32(&mut self, tag: &Tag, data: [i32; 2]) {
        self.vector(tag, DataType::INT32, data);
    }

    pub fn field_vector2_i64(&mut self, tag: &Tag, data: [i64; 2]) {
        self.vector(tag, DataType::INT64, data);
    }

    pub fn field_vector2_bool(&mut self, tag: &Tag, data: [bool; 2]) {
        self.vector(tag, DataType::BOOL, data);
    }

    pub fn field_vector2_f16(&mut self, tag: &Tag, bits: [u16; 2]) {
        self.vector(tag, DataType::FLOAT16, bits);
    }

    pub fn field_vector2_f32(&mut self, tag: &Tag, data: [f32; 2]) {
        self.vector(tag, DataType::FLOAT32, data);
    }

    pub fn field_vector2_f64(&mut self, tag: &Tag, data: [f64; 2]) {
        self.vector(tag, DataType::FLOAT64, data);
    }

    pub fn field_vector3_i8(&mut self, tag: &Tag, data: [i8; 3]) {
        self.vector(tag, DataType::INT8, data);
    }

    pub fn field_vector3_i16(&mut self, tag: &Tag, data: [i16; 3]) {
        self.vector(tag, DataType::INT16, data);
    }

    pub fn field_vector3_i32(&mut self, tag: &Tag, data: [i32; 3]) {
        self.vector(tag, DataType::INT32, data);
    }

    pub fn field_vector3_i64(&mut self, tag: &Tag, data: [i64; 3]) {
        self.vector(tag, DataType::INT64, data);
    }

    pub fn field_vector3_bool(&mut self, tag: &Tag, data: [bool; 3]) {
        self.vector(tag, DataType::BOOL, data);
    }

    pub fn field_vector3_f16(&mut self, tag: &Tag, bits: [u16; 3]) {
        self.vector(tag, DataType::FLOAT16, bits);
    }

    pub fn field_vector3_f32(&mut self, tag: &Tag, data: [f32; 3]) {
        self.vector(tag, DataType::FLOAT32, data);
    }

    pub fn field_vector3_f64(&mut self, tag: &Tag, data: [f64; 3]) {
        self.vector(tag, DataType::FLOAT64, data);
    }

    pub fn field_vector4_i8(&mut self, tag: &Tag, data: [i8; 4]) {
        self.vector(tag, DataType::INT8, data);
    }

    pub fn field_vector4_i16(&mut self, tag: &Tag, data: [i16; 4]) {
        self.vector(tag, DataType::INT16, data);
    }

    pub fn field_vector4_i32(&mut self, tag: &Tag, data: [i32; 4]) {
        self.vector(tag, DataType::INT32, data);
    }

    pub fn field_vector4_i64(&mut self, tag: &Tag, data: [i64; 4]) {
        self.vector(tag, DataType::INT64, data);
    }

    pub fn field_vector4_bool(&mut self, tag: &Tag, data: [bool; 4]) {
        self.vector(tag, DataType::BOOL, data);
    }

    pub fn field_vector4_f16(&mut self, tag: &Tag, bits: [u16; 4]) {
        self.vector(tag, DataType::FLOAT16, bits);
    }

    pub fn field_vector4_f32(&mut self, tag: &Tag, data: [f32; 4]) {
        self.vector(tag, DataType::FLOAT32, data);
    }

    pub fn field_vector4_f64(&mut self, tag: &Tag, data: [f64; 4]) {
        self.vector(tag, DataType::FLOAT64, data);
    }

    // -- Dynamic array fields --

    /// Opens a string array; elements are added through the returned cursor.
    pub fn field_string_array(&mut self, tag: &Tag) -> StringArrayWriter<'_> {
        self.writer.write_field_header(tag, DataType::STRING_ARRAY);
        StringArrayWriter::begin(self.writer)
    }

    /// Writes a whole string array in one call.
    pub fn field_strings<S: AsRef<str>>(&mut self, tag: &Tag, items: &[S]) {
        self.writer.write_field_header(tag, DataType::STRING_ARRAY);
        let slot = self.writer.reserve_size_slot();
        for item in items {
            self.writer.write_string(item.as_ref());
        }
        self.writer.patch_size(slot);
    }

    /// Opens a binary array; elements are added through the returned cursor.
    pub fn field_binary_array(&mut self, tag: &Tag) -> BinaryArrayWriter<'_> {
        self.writer.write_field_header(tag, DataType::BINARY_ARRAY);
        BinaryArrayWriter::begin(self.writer)
    }

    /// Writes a whole binary array in one call.
    pub fn field_binaries<B: AsRef<[u8]>>(&mut self, tag: &Tag, items: &[B]) {
        self.writer.write_field_header(tag, DataType::BINARY_ARRAY);
        let slot = self.writer.reserve_size_slot();
        for item in items {
            self.writer.write_binary(item.as_ref());
        }
        self.writer.patch_size(slot);
    }

    /// Opens an object array; elements are created through the returned
    /// cursor.
    pub fn field_object_array(&mut self, tag: &Tag) -> ObjectArrayWriter<'_> {
        self.writer.write_field_header(tag, DataType::OBJECT_ARRAY);
        ObjectArrayWriter::begin(self.writer)
    }
}

impl Drop for ObjectWriter<'_> {
    fn drop(&mut self) {
        self.finish();
    }
}
