//! TagBuf — a self-describing tagged binary serialization format.
//!
//! A TagBuf buffer is a single root object: a `u32` payload size followed by
//! a stream of fields. Every field carries a one-byte type marker, an
//! identifier (a short name or a 16-bit id, depending on the buffer's
//! [`Mode`]), and a payload whose shape the marker determines. Fields nest:
//! objects contain fields, object arrays contain objects, string and binary
//! arrays contain length-prefixed elements.
//!
//! # Architecture
//!
//! - **`types`** — Type markers ([`DataType`]) and field identifiers ([`Tag`])
//! - **`writer`** — Buffer assembly with deferred size back-patching
//! - **`reader`** — In-place buffer inspection with lazy indexing
//!
//! # Writing
//!
//! ```
//! use tagbuf::{Mode, Tag, Writer};
//!
//! const NAME: Tag = Tag::named("name");
//! const SCORE: Tag = Tag::named("score");
//!
//! let mut writer = Writer::new(Mode::Names);
//! let mut root = writer.root();
//! root.field_string(&NAME, "ada");
//! root.field_i32(&SCORE, 42);
//! drop(root);
//! writer.finish();
//! ```
//!
//! # Reading
//!
//! ```
//! # use tagbuf::{Mode, Tag, Writer};
//! # const NAME: Tag = Tag::named("name");
//! # const SCORE: Tag = Tag::named("score");
//! # let mut writer = Writer::new(Mode::Names);
//! # let mut root = writer.root();
//! # root.field_string(&NAME, "ada");
//! # root.field_i32(&SCORE, 42);
//! # drop(root);
//! # writer.finish();
//! use tagbuf::Reader;
//!
//! let reader = Reader::new(writer.as_bytes(), Mode::Names);
//! assert!(reader.is_valid());
//! assert_eq!(reader.root_object().read_string(&NAME), Some("ada"));
//! assert_eq!(reader.root_object().read_i32(&SCORE), Some(42));
//! ```
//!
//! Readers never allocate copies of payload data: strings, binaries, UUIDs
//! and array elements are served as borrowed views into the buffer. A reader
//! handed arbitrary bytes reports the object invalid rather than panicking
//! or reading out of bounds.

mod endian;

pub use endian::Scalar;

pub mod error;
pub mod reader;
pub mod types;
pub mod writer;

pub use error::{FormatError, TagError};
pub use reader::{
    BinaryArrayReader, FixedArray, ObjectArrayReader, ObjectReader, Reader, StringArrayReader,
};
pub use types::{DataType, Mode, Tag};
pub use writer::{BinaryArrayWriter, ObjectArrayWriter, ObjectWriter, StringArrayWriter, Writer};
