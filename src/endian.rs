//! Canonical byte order.
//!
//! Every fixed-width value on the wire is little-endian. The writer appends
//! element streams in native order and then normalizes the appended range in
//! place; readers decode from the canonical layout on access and never touch
//! the buffer. UUID bytes, booleans and string/binary payload bodies are
//! outside the scheme and are stored verbatim.

use bytes::{BufMut, BytesMut};
use uuid::Uuid;

/// Byte-swaps every `width`-sized chunk of `bytes`.
fn swap_chunks(width: usize, bytes: &mut [u8]) {
    for chunk in bytes.chunks_exact_mut(width) {
        chunk.reverse();
    }
}

/// Rewrites a native-order element stream into canonical little-endian.
///
/// A no-op on little-endian hosts and for element widths other than 2, 4
/// or 8 (single bytes and UUIDs have no byte order).
pub(crate) fn normalize_in_place(width: u32, bytes: &mut [u8]) {
    if cfg!(target_endian = "big") && matches!(width, 2 | 4 | 8) {
        swap_chunks(width as usize, bytes);
    }
}

fn head<const N: usize>(bytes: &[u8]) -> [u8; N] {
    let mut out = [0u8; N];
    out.copy_from_slice(&bytes[..N]);
    out
}

mod sealed {
    pub trait Sealed {}

    impl Sealed for i8 {}
    impl Sealed for i16 {}
    impl Sealed for i32 {}
    impl Sealed for i64 {}
    impl Sealed for u8 {}
    impl Sealed for u16 {}
    impl Sealed for u32 {}
    impl Sealed for u64 {}
    impl Sealed for f32 {}
    impl Sealed for f64 {}
    impl Sealed for bool {}
    impl Sealed for uuid::Uuid {}
}

/// A fixed-width base type as it travels on the wire.
///
/// Implemented by the twelve scalar bases (integers, floats, `bool`) and
/// [`Uuid`]; sealed, since the set of wire types is closed. `append_native`
/// writes the value's native byte representation (the caller normalizes the
/// range afterwards); `decode_le` reads the canonical little-endian
/// representation from the front of `bytes`, which must hold at least
/// `WIDTH` bytes.
pub trait Scalar: Copy + sealed::Sealed {
    /// Element width in bytes.
    const WIDTH: usize;

    #[doc(hidden)]
    fn append_native(self, buf: &mut BytesMut);

    #[doc(hidden)]
    fn decode_le(bytes: &[u8]) -> Self;
}

macro_rules! impl_scalar {
    ($($ty:ty => $width:expr),* $(,)?) => {
        $(
            impl Scalar for $ty {
                const WIDTH: usize = $width;

                fn append_native(self, buf: &mut BytesMut) {
                    buf.put_slice(&self.to_ne_bytes());
                }

                fn decode_le(bytes: &[u8]) -> Self {
                    <$ty>::from_le_bytes(head(bytes))
                }
            }
        )*
    };
}

impl_scalar! {
    i8 => 1,
    i16 => 2,
    i32 => 4,
    i64 => 8,
    u8 => 1,
    u16 => 2,
    u32 => 4,
    u64 => 8,
    f32 => 4,
    f64 => 8,
}

impl Scalar for bool {
    const WIDTH: usize = 1;

    fn append_native(self, buf: &mut BytesMut) {
        buf.put_u8(self as u8);
    }

    fn decode_le(bytes: &[u8]) -> Self {
        bytes[0] != 0
    }
}

impl Scalar for Uuid {
    const WIDTH: usize = 16;

    fn append_native(self, buf: &mut BytesMut) {
        buf.put_slice(self.as_bytes());
    }

    fn decode_le(bytes: &[u8]) -> Self {
        Uuid::from_bytes(head(bytes))
    }
}
