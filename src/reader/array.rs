//! Readers for dynamic (string, binary, object) array payloads.
//!
//! Each reader is built over the region beginning at the array's `u32`
//! byte-length prefix. Construction walks the element stream once, counting
//! elements and requiring the last one to end exactly at the declared
//! length; a malformed stream yields an empty, invalid reader. Random access
//! walks from the start each time (there is no element offset table), so
//! iteration is the cheap way to visit every element.

use crate::types::Mode;

use super::ObjectReader;

/// Element length-prefix widths for the three dynamic array shapes.
#[derive(Clone, Copy, PartialEq, Eq)]
enum Prefix {
    U16,
    U32,
}

impl Prefix {
    fn width(self) -> usize {
        match self {
            Prefix::U16 => 2,
            Prefix::U32 => 4,
        }
    }
}

/// Splits the next `[len][bytes]` element off the front of `rest`.
fn take_element<'a>(rest: &mut &'a [u8], prefix: Prefix) -> Option<&'a [u8]> {
    let header = rest.get(..prefix.width())?;
    let len = match prefix {
        Prefix::U16 => u16::from_le_bytes([header[0], header[1]]) as usize,
        Prefix::U32 => u32::from_le_bytes([header[0], header[1], header[2], header[3]]) as usize,
    };
    let start = prefix.width();
    let end = start.checked_add(len)?;
    let body = rest.get(start..end)?;
    *rest = &rest[end..];
    Some(body)
}

/// Resolves the element region behind the `u32` byte-length prefix.
fn element_region(region: &[u8]) -> Option<&[u8]> {
    let header = region.get(..4)?;
    let total = u32::from_le_bytes([header[0], header[1], header[2], header[3]]) as usize;
    region.get(4..4usize.checked_add(total)?)
}

/// Walks the whole stream, returning the element count if it is consistent.
fn count_elements(mut body: &[u8], prefix: Prefix) -> Option<usize> {
    let mut count = 0;
    while !body.is_empty() {
        take_element(&mut body, prefix)?;
        count += 1;
    }
    Some(count)
}

/// Reads the elements of a string array field.
pub struct StringArrayReader<'a> {
    body: &'a [u8],
    count: usize,
    valid: bool,
}

impl<'a> StringArrayReader<'a> {
    /// `region` starts at the array's `u32` byte-length prefix.
    pub(super) fn new(region: &'a [u8]) -> StringArrayReader<'a> {
        let Some(body) = element_region(region) else {
            return StringArrayReader::invalid();
        };
        // Validate the walk and every element's UTF-8 up front so that
        // iteration is infallible.
        let mut probe = body;
        let mut count = 0;
        while !probe.is_empty() {
            let Some(element) = take_element(&mut probe, Prefix::U16) else {
                tracing::trace!("string array element stream is inconsistent");
                return StringArrayReader::invalid();
            };
            if std::str::from_utf8(element).is_err() {
                tracing::trace!("string array element is not UTF-8");
                return StringArrayReader::invalid();
            }
            count += 1;
        }
        StringArrayReader {
            body,
            count,
            valid: true,
        }
    }

    fn invalid() -> StringArrayReader<'a> {
        StringArrayReader {
            body: &[],
            count: 0,
            valid: false,
        }
    }

    pub fn is_valid(&self) -> bool {
        self.valid
    }

    pub fn len(&self) -> usize {
        self.count
    }

    pub fn is_empty(&self) -> bool {
        self.count == 0
    }

    /// The element at `index`, walking from the start of the stream.
    pub fn get(&self, index: usize) -> Option<&'a str> {
        self.iter().nth(index)
    }

    pub fn iter(&self) -> StringArrayIter<'a> {
        StringArrayIter {
            rest: self.body,
            remaining: self.count,
        }
    }
}

impl<'a> IntoIterator for &StringArrayReader<'a> {
    type Item = &'a str;
    type IntoIter = StringArrayIter<'a>;

    fn into_iter(self) -> StringArrayIter<'a> {
        self.iter()
    }
}

/// Forward iterator over a [`StringArrayReader`].
pub struct StringArrayIter<'a> {
    rest: &'a [u8],
    remaining: usize,
}

impl<'a> Iterator for StringArrayIter<'a> {
    type Item = &'a str;

    fn next(&mut self) -> Option<&'a str> {
        if self.remaining == 0 {
            return None;
        }
        self.remaining -= 1;
        let element = take_element(&mut self.rest, Prefix::U16)?;
        std::str::from_utf8(element).ok()
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        (self.remaining, Some(self.remaining))
    }
}

impl ExactSizeIterator for StringArrayIter<'_> {}

/// Reads the elements of a binary array field.
pub struct BinaryArrayReader<'a> {
    body: &'a [u8],
    count: usize,
    valid: bool,
}

impl<'a> BinaryArrayReader<'a> {
    /// `region` starts at the array's `u32` byte-length prefix.
    pub(super) fn new(region: &'a [u8]) -> BinaryArrayReader<'a> {
        let counted = element_region(region).and_then(|body| {
            count_elements(body, Prefix::U32).map(|count| (body, count))
        });
        match counted {
            Some((body, count)) => BinaryArrayReader {
                body,
                count,
                valid: true,
            },
            None => {
                tracing::trace!("binary array element stream is inconsistent");
                BinaryArrayReader {
                    body: &[],
                    count: 0,
                    valid: false,
                }
            }
        }
    }

    pub fn is_valid(&self) -> bool {
        self.valid
    }

    pub fn len(&self) -> usize {
        self.count
    }

    pub fn is_empty(&self) -> bool {
        self.count == 0
    }

    /// The element at `index`, walking from the start of the stream.
    pub fn get(&self, index: usize) -> Option<&'a [u8]> {
        self.iter().nth(index)
    }

    pub fn iter(&self) -> BinaryArrayIter<'a> {
        BinaryArrayIter {
            rest: self.body,
            remaining: self.count,
        }
    }
}

impl<'a> IntoIterator for &BinaryArrayReader<'a> {
    type Item = &'a [u8];
    type IntoIter = BinaryArrayIter<'a>;

    fn into_iter(self) -> BinaryArrayIter<'a> {
        self.iter()
    }
}

/// Forward iterator over a [`BinaryArrayReader`].
pub struct BinaryArrayIter<'a> {
    rest: &'a [u8],
    remaining: usize,
}

impl<'a> Iterator for BinaryArrayIter<'a> {
    type Item = &'a [u8];

    fn next(&mut self) -> Option<&'a [u8]> {
        if self.remaining == 0 {
            return None;
        }
        self.remaining -= 1;
        take_element(&mut self.rest, Prefix::U32)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        (self.remaining, Some(self.remaining))
    }
}

impl ExactSizeIterator for BinaryArrayIter<'_> {}

/// Reads the elements of an object array field.
///
/// Children inherit the parent's identifier [`Mode`] and index their own
/// payloads lazily.
pub struct ObjectArrayReader<'a> {
    body: &'a [u8],
    count: usize,
    valid: bool,
    mode: Mode,
}

impl<'a> ObjectArrayReader<'a> {
    /// `region` starts at the array's `u32` byte-length prefix.
    pub(super) fn new(region: &'a [u8], mode: Mode) -> ObjectArrayReader<'a> {
        let counted = element_region(region).and_then(|body| {
            count_elements(body, Prefix::U32).map(|count| (body, count))
        });
        match counted {
            Some((body, count)) => ObjectArrayReader {
                body,
                count,
                valid: true,
                mode,
            },
            None => {
                tracing::trace!("object array element stream is inconsistent");
                ObjectArrayReader {
                    body: &[],
                    count: 0,
                    valid: false,
                    mode,
                }
            }
        }
    }

    pub fn is_valid(&self) -> bool {
        self.valid
    }

    pub fn len(&self) -> usize {
        self.count
    }

    pub fn is_empty(&self) -> bool {
        self.count == 0
    }

    /// The element at `index`, walking from the start of the stream.
    pub fn get(&self, index: usize) -> Option<ObjectReader<'a>> {
        self.iter().nth(index)
    }

    pub fn iter(&self) -> ObjectArrayIter<'a> {
        ObjectArrayIter {
            rest: self.body,
            remaining: self.count,
            mode: self.mode,
        }
    }
}

impl<'a> IntoIterator for &ObjectArrayReader<'a> {
    type Item = ObjectReader<'a>;
    type IntoIter = ObjectArrayIter<'a>;

    fn into_iter(self) -> ObjectArrayIter<'a> {
        self.iter()
    }
}

/// Forward iterator over an [`ObjectArrayReader`].
pub struct ObjectArrayIter<'a> {
    rest: &'a [u8],
    remaining: usize,
    mode: Mode,
}

impl<'a> Iterator for ObjectArrayIter<'a> {
    type Item = ObjectReader<'a>;

    fn next(&mut self) -> Option<ObjectReader<'a>> {
        if self.remaining == 0 {
            return None;
        }
        self.remaining -= 1;
        let payload = take_element(&mut self.rest, Prefix::U32)?;
        Some(ObjectReader::from_payload(payload, self.mode))
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        (self.remaining, Some(self.remaining))
    }
}

impl ExactSizeIterator for ObjectArrayIter<'_> {}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reader::Reader;
    use crate::types::Tag;
    use crate::writer::Writer;

    const ITEMS: Tag = Tag::named("items");

    #[test]
    fn string_array_round_trip() {
        let mut writer = Writer::new(Mode::Names);
        let mut root = writer.root();
        root.field_strings(&ITEMS, &["alpha", "", "gamma"]);
        drop(root);
        writer.finish();

        let reader = Reader::new(writer.as_bytes(), Mode::Names);
        let arr = reader.root_object().read_string_array(&ITEMS).unwrap();
        assert!(arr.is_valid());
        assert_eq!(arr.len(), 3);
        assert_eq!(arr.get(0), Some("alpha"));
        assert_eq!(arr.get(1), Some(""));
        assert_eq!(arr.get(2), Some("gamma"));
        assert_eq!(arr.get(3), None);

        let collected: Vec<&str> = arr.iter().collect();
        assert_eq!(collected, vec!["alpha", "", "gamma"]);
    }

    #[test]
    fn iterator_matches_random_access() {
        let elements = ["one", "two", "three", "four"];
        let mut writer = Writer::new(Mode::Names);
        let mut root = writer.root();
        root.field_strings(&ITEMS, &elements);
        drop(root);
        writer.finish();

        let reader = Reader::new(writer.as_bytes(), Mode::Names);
        let arr = reader.root_object().read_string_array(&ITEMS).unwrap();
        let mut steps = 0;
        for (i, element) in arr.iter().enumerate() {
            assert_eq!(arr.get(i), Some(element));
            steps += 1;
        }
        assert_eq!(steps, arr.len());

        // Stepping past the end stays at the sentinel.
        let mut iter = arr.iter();
        for _ in 0..arr.len() {
            assert!(iter.next().is_some());
        }
        assert!(iter.next().is_none());
        assert!(iter.next().is_none());
    }

    #[test]
    fn binary_array_round_trip() {
        let blobs: Vec<&[u8]> = vec![&[0xDE, 0xAD], &[], &[0x00, 0x11, 0x22]];
        let mut writer = Writer::new(Mode::Names);
        let mut root = writer.root();
        {
            let mut arr = root.field_binary_array(&ITEMS);
            for blob in &blobs {
                arr.add_element(blob);
            }
        }
        drop(root);
        writer.finish();

        let reader = Reader::new(writer.as_bytes(), Mode::Names);
        let arr = reader.root_object().read_binary_array(&ITEMS).unwrap();
        assert!(arr.is_valid());
        assert_eq!(arr.len(), 3);
        for (i, blob) in blobs.iter().enumerate() {
            assert_eq!(arr.get(i), Some(*blob));
        }
        let collected: Vec<&[u8]> = arr.iter().collect();
        assert_eq!(collected, blobs);
    }

    #[test]
    fn object_array_preserves_insertion_order() {
        const ID: Tag = Tag::named("id");
        const NAME: Tag = Tag::named("name");
        let people = [(1, "Alice"), (2, "Bob"), (3, "Charlie")];

        let mut writer = Writer::new(Mode::Names);
        let mut root = writer.root();
        {
            let mut arr = root.field_object_array(&Tag::named("users"));
            for (id, name) in people {
                let mut elem = arr.create_element();
                elem.field_i32(&ID, id);
                elem.field_string(&NAME, name);
            }
        }
        drop(root);
        writer.finish();

        let reader = Reader::new(writer.as_bytes(), Mode::Names);
        let arr = reader
            .root_object()
            .read_object_array(&Tag::named("users"))
            .unwrap();
        assert_eq!(arr.len(), 3);

        for (element, (id, name)) in arr.iter().zip(people) {
            assert!(element.is_valid());
            assert_eq!(element.read_i32(&ID), Some(id));
            assert_eq!(element.read_string(&NAME), Some(name));
        }

        let second = arr.get(1).unwrap();
        assert_eq!(second.read_string(&NAME), Some("Bob"));
    }

    #[test]
    fn empty_dynamic_arrays_are_valid() {
        let mut writer = Writer::new(Mode::Names);
        let mut root = writer.root();
        root.field_strings::<&str>(&ITEMS, &[]);
        {
            let arr = root.field_object_array(&Tag::named("objs"));
            drop(arr);
        }
        drop(root);
        writer.finish();

        let reader = Reader::new(writer.as_bytes(), Mode::Names);
        let strings = reader.root_object().read_string_array(&ITEMS).unwrap();
        assert!(strings.is_valid());
        assert!(strings.is_empty());
        assert!(strings.iter().next().is_none());

        let objects = reader
            .root_object()
            .read_object_array(&Tag::named("objs"))
            .unwrap();
        assert!(objects.is_valid());
        assert_eq!(objects.len(), 0);
    }

    #[test]
    fn inconsistent_element_stream_is_invalid() {
        // A string array whose single element claims more bytes than the
        // array holds.
        let buffer: &[u8] = &[
            0x0C, 0x00, 0x00, 0x00, // root payload: 12 bytes
            0xAD, 0x01, b'a', // string array "a"
            0x05, 0x00, 0x00, 0x00, // 5 element bytes
            0x09, 0x00, b'x', b'y', b'z', // element claims 9, has 3
        ];
        let reader = Reader::new(buffer, Mode::Names);
        assert!(reader.is_valid());
        let arr = reader
            .root_object()
            .read_string_array(&Tag::named("a"))
            .unwrap();
        assert!(!arr.is_valid());
        assert_eq!(arr.len(), 0);
        assert!(arr.iter().next().is_none());
        assert_eq!(arr.get(0), None);
    }

    #[test]
    fn non_utf8_string_element_invalidates_the_array() {
        let buffer: &[u8] = &[
            0x0B, 0x00, 0x00, 0x00, // root payload: 11 bytes
            0xAD, 0x01, b'a', // string array "a"
            0x04, 0x00, 0x00, 0x00, // 4 element bytes
            0x02, 0x00, 0xFF, 0xFE, // invalid UTF-8 element
        ];
        let reader = Reader::new(buffer, Mode::Names);
        assert!(reader.is_valid());
        let arr = reader
            .root_object()
            .read_string_array(&Tag::named("a"))
            .unwrap();
        assert!(!arr.is_valid());
    }

    #[test]
    fn nested_object_arrays() {
        const INNER: Tag = Tag::named("inner");
        const V: Tag = Tag::named("v");

        let mut writer = Writer::new(Mode::Names);
        let mut root = writer.root();
        {
            let mut outer = root.field_object_array(&ITEMS);
            for i in 0..2i32 {
                let mut elem = outer.create_element();
                let mut inner = elem.field_object_array(&INNER);
                for j in 0..2i32 {
                    let mut leaf = inner.create_element();
                    leaf.field_i32(&V, i * 10 + j);
                }
            }
        }
        drop(root);
        writer.finish();

        let reader = Reader::new(writer.as_bytes(), Mode::Names);
        let outer = reader.root_object().read_object_array(&ITEMS).unwrap();
        assert_eq!(outer.len(), 2);
        for (i, element) in outer.iter().enumerate() {
            let inner = element.read_object_array(&INNER).unwrap();
            assert_eq!(inner.len(), 2);
            for (j, leaf) in inner.iter().enumerate() {
                assert_eq!(leaf.read_i32(&V), Some((i * 10 + j) as i32));
            }
        }
    }
}
