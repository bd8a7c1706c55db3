//! Cursors for dynamic (string, binary, object) array fields.
//!
//! Each cursor reserves a four-byte size slot when the array field is
//! opened and patches it with the total element bytes on finish. Elements
//! are appended strictly in order; the borrow checker keeps the owning
//! object cursor frozen while an array cursor is alive.

use super::{ObjectWriter, Writer};

/// Appends length-prefixed string elements to an open string array field.
pub struct StringArrayWriter<'w> {
    writer: &'w mut Writer,
    size_slot: usize,
    finished: bool,
}

impl<'w> StringArrayWriter<'w> {
    pub(super) fn begin(writer: &mut Writer) -> StringArrayWriter<'_> {
        let size_slot = writer.reserve_size_slot();
        StringArrayWriter {
            writer,
            size_slot,
            finished: false,
        }
    }

    /// Appends one element (at most 65 535 bytes).
    pub fn add_element(&mut self, value: &str) {
        self.writer.write_string(value);
    }

    /// Patches the array's size slot. Idempotent; also runs on drop.
    pub fn finish(&mut self) {
        if !self.finished {
            self.writer.patch_size(self.size_slot);
            self.finished = true;
        }
    }

    pub fn is_finished(&self) -> bool {
        self.finished
    }
}

impl Drop for StringArrayWriter<'_> {
    fn drop(&mut self) {
        self.finish();
    }
}

/// Appends length-prefixed binary elements to an open binary array field.
pub struct BinaryArrayWriter<'w> {
    writer: &'w mut Writer,
    size_slot: usize,
    finished: bool,
}

impl<'w> BinaryArrayWriter<'w> {
    pub(super) fn begin(writer: &mut Writer) -> BinaryArrayWriter<'_> {
        let size_slot = writer.reserve_size_slot();
        BinaryArrayWriter {
            writer,
            size_slot,
            finished: false,
        }
    }

    /// Appends one element.
    pub fn add_element(&mut self, data: &[u8]) {
        self.writer.write_binary(data);
    }

    /// Patches the array's size slot. Idempotent; also runs on drop.
    pub fn finish(&mut self) {
        if !self.finished {
            self.writer.patch_size(self.size_slot);
            self.finished = true;
        }
    }

    pub fn is_finished(&self) -> bool {
        self.finished
    }
}

impl Drop for BinaryArrayWriter<'_> {
    fn drop(&mut self) {
        self.finish();
    }
}

/// Appends object elements to an open object array field.
pub struct ObjectArrayWriter<'w> {
    writer: &'w mut Writer,
    size_slot: usize,
    finished: bool,
}

impl<'w> ObjectArrayWriter<'w> {
    pub(super) fn begin(writer: &mut Writer) -> ObjectArrayWriter<'_> {
        let size_slot = writer.reserve_size_slot();
        ObjectArrayWriter {
            writer,
            size_slot,
            finished: false,
        }
    }

    /// Opens the next object element. The element cursor must finish (or
    /// drop) before another element can be created.
    pub fn create_element(&mut self) -> ObjectWriter<'_> {
        ObjectWriter::begin(self.writer)
    }

    /// Patches the array's size slot. Idempotent; also runs on drop.
    pub fn finish(&mut self) {
        if !self.finished {
            self.writer.patch_size(self.size_slot);
            self.finished = true;
        }
    }

    pub fn is_finished(&self) -> bool {
        self.finished
    }
}

impl Drop for ObjectArrayWriter<'_> {
    fn drop(&mut self) {
        self.finish();
    }
}
