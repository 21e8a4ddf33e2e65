use crate::types::DataType;

/// Errors that can occur while encoding, decoding or reassembling frames.
#[derive(Debug, thiserror::Error)]
pub enum FrameError {
    /// A chunk declares a length that is too short or exceeds the bytes available.
    #[error("malformed frame: {0}")]
    MalformedFrame(String),

    /// A section carries a tag that is not part of the protocol.
    #[error("unknown section type 0x{0:02x}")]
    UnknownSectionType(u8),

    /// A section decoder was handed a tag outside the set it accepts.
    #[error("invalid section tag 0x{found:02x} (expected {expected})")]
    InvalidSectionTag { expected: &'static str, found: u8 },

    /// Value bytes do not match the width implied by the data type.
    #[error("{len} bytes do not fit data type {data_type}")]
    TypeMismatch { data_type: DataType, len: usize },

    /// A value's shape does not match its declared data type.
    #[error("unsupported value encoding: {0}")]
    UnsupportedValueEncoding(String),

    /// An element description carries an unknown disposition byte.
    #[error("invalid disposition 0x{0:02x}")]
    InvalidDisposition(u8),

    /// An element description carries an unknown data type byte.
    #[error("invalid data type 0x{0:02x}")]
    InvalidDataType(u8),

    /// Text is not valid UTF-8.
    #[error("invalid utf-8: {0}")]
    InvalidUtf8(#[from] std::str::Utf8Error),

    /// An encoded chunk does not fit the 16-bit length prefix.
    #[error("chunk too large ({size} bytes, max {max})")]
    ChunkTooLarge { size: usize, max: usize },

    /// An I/O error occurred while reading or writing frames.
    #[error("frame I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The connection was closed before a complete frame was received.
    #[error("connection closed (incomplete frame)")]
    ConnectionClosed,
}

impl FrameError {
    pub(crate) fn malformed(reason: impl Into<String>) -> Self {
        Self::MalformedFrame(reason.into())
    }
}

pub type Result<T> = std::result::Result<T, FrameError>;
