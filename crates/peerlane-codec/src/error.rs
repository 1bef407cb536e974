use peerlane_compress::CompressionError;

/// Errors that can occur during envelope encoding/decoding.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CodecError {
    /// The frame was written with a newer protocol than this node speaks.
    #[error("unsupported protocol version {version} (highest supported {highest})")]
    UnsupportedVersion { version: u8, highest: u8 },

    /// The frame ends before the fixed header does.
    #[error("frame too short ({len} bytes, need at least {needed})")]
    FrameTooShort { len: usize, needed: usize },

    /// A literal offset or length points outside the frame.
    #[error("malformed {field} literal at offset {offset}")]
    MalformedLiteral { field: &'static str, offset: usize },

    /// A literal is not valid UTF-8.
    #[error("{field} literal at offset {offset} is not valid UTF-8")]
    InvalidUtf8 { field: &'static str, offset: usize },

    /// A literal does not fit its 2-byte length prefix.
    #[error("{field} literal too long ({len} bytes, max 65535)")]
    LiteralTooLong { field: &'static str, len: usize },

    /// The encoded frame exceeds the configured maximum frame size.
    #[error("frame too large ({size} bytes, max {max})")]
    FrameTooLarge { size: usize, max: usize },

    /// The metadata block is truncated or its entries do not fill it.
    #[error("malformed metadata block: {reason}")]
    MalformedMetadata { reason: &'static str },

    /// A user frame from an origin incarnation that is quarantined.
    #[error("frame from quarantined origin uid {origin_uid} dropped")]
    QuarantinedOrigin { origin_uid: u64 },

    /// Compression tables for the origin are internally inconsistent.
    #[error(transparent)]
    Compression(#[from] CompressionError),
}

pub type Result<T> = std::result::Result<T, CodecError>;
