//! Type markers and field identifiers.

mod data_type;
mod tag;

pub use data_type::DataType;
pub use tag::{name_hash, Mode, Tag, MAX_NAME_LEN};
