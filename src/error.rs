//! Error types for buffer validation and tag construction.
//!
//! None of these cross the read API: a decoding error marks the enclosing
//! object invalid and every subsequent lookup answers "missing".

/// Reasons an object payload or element stream fails validation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum FormatError {
    #[error("payload truncated before the end of a field")]
    Truncated,

    #[error("invalid type marker 0x{0:02X}")]
    InvalidTypeMarker(u8),

    #[error("field identifier overruns the payload")]
    IdentifierOverrun,

    #[error("field name is not valid UTF-8")]
    InvalidName,

    #[error("payload length does not match its declared size")]
    LengthMismatch,
}

/// Errors from runtime tag construction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum TagError {
    #[error("tag name must be 1..=255 bytes of [A-Za-z0-9_]")]
    InvalidName,
}
