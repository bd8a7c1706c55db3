//! Field type markers.
//!
//! A marker is a single byte. The high nibble is the classification
//! (primitive, array, or vector of dimension 2–4); the low nibble is the
//! base type. The low nibble packs a 2-bit family and a 2-bit width:
//! `0x0..=0x3` signed integers, `0x4..=0x7` unsigned integers, `0x8..=0xB`
//! boolean and floats, `0xC..=0xF` UUID/String/Binary/Object.

use std::fmt;

/// Classification nibble for primitives.
const CLASS_PRIMITIVE: u8 = 0x00;
/// Classification nibbles for fixed-dimension vectors.
const CLASS_VECTOR2: u8 = 0x20;
const CLASS_VECTOR3: u8 = 0x30;
const CLASS_VECTOR4: u8 = 0x40;
/// Classification nibble for homogeneous arrays.
const CLASS_ARRAY: u8 = 0xA0;

/// A field type marker byte.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct DataType(u8);

impl DataType {
    pub const INT8: DataType = DataType(0x00);
    pub const INT16: DataType = DataType(0x01);
    pub const INT32: DataType = DataType(0x02);
    pub const INT64: DataType = DataType(0x03);

    pub const UINT8: DataType = DataType(0x04);
    pub const UINT16: DataType = DataType(0x05);
    pub const UINT32: DataType = DataType(0x06);
    pub const UINT64: DataType = DataType(0x07);

    pub const BOOL: DataType = DataType(0x08);
    pub const FLOAT16: DataType = DataType(0x09);
    pub const FLOAT32: DataType = DataType(0x0A);
    pub const FLOAT64: DataType = DataType(0x0B);

    pub const UUID: DataType = DataType(0x0C);
    pub const STRING: DataType = DataType(0x0D);
    pub const BINARY: DataType = DataType(0x0E);
    pub const OBJECT: DataType = DataType(0x0F);

    pub const INT8_ARRAY: DataType = Self::INT8.into_array();
    pub const INT16_ARRAY: DataType = Self::INT16.into_array();
    pub const INT32_ARRAY: DataType = Self::INT32.into_array();
    pub const INT64_ARRAY: DataType = Self::INT64.into_array();

    pub const UINT8_ARRAY: DataType = Self::UINT8.into_array();
    pub const UINT16_ARRAY: DataType = Self::UINT16.into_array();
    pub const UINT32_ARRAY: DataType = Self::UINT32.into_array();
    pub const UINT64_ARRAY: DataType = Self::UINT64.into_array();

    pub const BOOL_ARRAY: DataType = Self::BOOL.into_array();
    pub const FLOAT16_ARRAY: DataType = Self::FLOAT16.into_array();
    pub const FLOAT32_ARRAY: DataType = Self::FLOAT32.into_array();
    pub const FLOAT64_ARRAY: DataType = Self::FLOAT64.into_array();

    pub const UUID_ARRAY: DataType = Self::UUID.into_array();
    pub const STRING_ARRAY: DataType = Self::STRING.into_array();
    pub const BINARY_ARRAY: DataType = Self::BINARY.into_array();
    pub const OBJECT_ARRAY: DataType = Self::OBJECT.into_array();

    /// Reserved marker for invalid fields.
    pub const INVALID: DataType = DataType(0xFF);

    /// Wraps a raw marker byte. The result may be invalid; check with
    /// [`DataType::is_valid`].
    pub const fn from_byte(byte: u8) -> DataType {
        DataType(byte)
    }

    /// The raw marker byte.
    pub const fn byte(self) -> u8 {
        self.0
    }

    /// The array marker over this base type.
    pub const fn into_array(self) -> DataType {
        DataType(self.0 | CLASS_ARRAY)
    }

    /// The vector marker of dimension `dim` (2–4) over this base type.
    pub const fn into_vector(self, dim: u32) -> DataType {
        debug_assert!(dim >= 2 && dim <= 4);
        DataType((self.0 & 0x0F) | ((dim as u8) << 4))
    }

    /// The classification high nibble.
    pub const fn classification(self) -> u8 {
        self.0 & 0xF0
    }

    /// The base type (low nibble) as a primitive marker.
    pub const fn base(self) -> DataType {
        DataType(self.0 & 0x0F)
    }

    /// True for plain (non-array, non-vector) markers.
    pub const fn is_primitive(self) -> bool {
        self.classification() == CLASS_PRIMITIVE
    }

    /// True when the base type is in one of the three scalar families
    /// (integers, unsigned integers, boolean/floats).
    pub const fn has_scalar_base(self) -> bool {
        (self.0 & 0x0C) != 0x0C
    }

    /// True for fixed-dimension vector markers.
    pub const fn is_vector(self) -> bool {
        let class = self.classification();
        class >= CLASS_VECTOR2 && class <= CLASS_VECTOR4
    }

    /// True for homogeneous array markers.
    pub const fn is_array(self) -> bool {
        self.classification() == CLASS_ARRAY
    }

    /// True for arrays whose elements are individually length-prefixed
    /// (string, binary and object arrays).
    pub const fn is_dynamic_array(self) -> bool {
        matches!(
            self,
            DataType::STRING_ARRAY | DataType::BINARY_ARRAY | DataType::OBJECT_ARRAY
        )
    }

    /// True for arrays whose elements all occupy the same number of bytes.
    pub const fn is_fixed_array(self) -> bool {
        self.is_array() && !self.is_dynamic_array()
    }

    /// Byte width of the base type: 1/2/4/8 for scalars, 16 for UUID,
    /// 0 for variable-length bases.
    pub const fn base_width(self) -> u32 {
        match self.base() {
            DataType::INT8 | DataType::UINT8 | DataType::BOOL => 1,
            DataType::INT16 | DataType::UINT16 | DataType::FLOAT16 => 2,
            DataType::INT32 | DataType::UINT32 | DataType::FLOAT32 => 4,
            DataType::INT64 | DataType::UINT64 | DataType::FLOAT64 => 8,
            DataType::UUID => 16,
            _ => 0,
        }
    }

    /// Vector dimension: 2/3/4 for vector markers, 0 otherwise.
    pub const fn vector_dim(self) -> u32 {
        match self.classification() {
            CLASS_VECTOR2 => 2,
            CLASS_VECTOR3 => 3,
            CLASS_VECTOR4 => 4,
            _ => 0,
        }
    }

    /// Whether the marker denotes a representable field type. Vectors are
    /// only valid over scalar bases; all primitive and array markers are
    /// valid.
    pub const fn is_valid(self) -> bool {
        match self.classification() {
            CLASS_PRIMITIVE | CLASS_ARRAY => true,
            CLASS_VECTOR2 | CLASS_VECTOR3 | CLASS_VECTOR4 => self.has_scalar_base(),
            _ => false,
        }
    }
}

impl fmt::Display for DataType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let base = match self.base() {
            DataType::INT8 => "i8",
            DataType::INT16 => "i16",
            DataType::INT32 => "i32",
            DataType::INT64 => "i64",
            DataType::UINT8 => "u8",
            DataType::UINT16 => "u16",
            DataType::UINT32 => "u32",
            DataType::UINT64 => "u64",
            DataType::BOOL => "bool",
            DataType::FLOAT16 => "f16",
            DataType::FLOAT32 => "f32",
            DataType::FLOAT64 => "f64",
            DataType::UUID => "uuid",
            DataType::STRING => "string",
            DataType::BINARY => "binary",
            DataType::OBJECT => "object",
            _ => "?",
        };
        match self.classification() {
            CLASS_PRIMITIVE => write!(f, "{base}"),
            CLASS_ARRAY => write!(f, "{base}[]"),
            CLASS_VECTOR2 | CLASS_VECTOR3 | CLASS_VECTOR4 => {
                write!(f, "{base}x{}", self.vector_dim())
            }
            _ => write!(f, "invalid(0x{:02X})", self.0),
        }
    }
}
