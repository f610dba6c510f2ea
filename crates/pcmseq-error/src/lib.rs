use std::path::PathBuf;

use thiserror::Error;

/// Primary error type for PCM_SEQ2 operations.
///
/// The four families callers care about are format validation, directory
/// construction, argument ranges and the underlying stream. The remaining
/// variants refine those families with enough structure for diagnostics.
#[derive(Error, Debug)]
pub enum PcmError {
    // === Format Errors ===
    /// An entry header or segment header failed validation.
    #[error("malformed pcm_seq2 data at offset {offset}: {detail}")]
    Format { offset: u64, detail: String },

    /// The leading discriminator byte names no known sub-format.
    #[error("unrecognized pcm_seq2 sub-format byte {byte:#04x}")]
    UnknownSubFormat { byte: u8 },

    // === Index Errors ===
    /// The backward scan could not establish an entry directory.
    #[error("unable to index pcm_seq2 file: {detail}")]
    Index { detail: String },

    // === Range Errors ===
    /// Entry number or sample range outside the valid bounds.
    #[error("{what} out of range: {value} (valid {min}..={max})")]
    Range {
        what: &'static str,
        value: i64,
        min: i64,
        max: i64,
    },

    // === I/O Errors ===
    /// Underlying read, write or seek failure.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Fewer bytes were available than a record requires.
    #[error("short read at offset {offset}: expected {expected} bytes, got {actual}")]
    ShortRead {
        offset: u64,
        expected: usize,
        actual: usize,
    },

    // === Dispatch Errors ===
    /// No recognizer claims this path.
    #[error("unsupported file format: '{path}'")]
    UnsupportedFormat { path: PathBuf },

    /// Operation or control option is not available in the handle's mode.
    #[error("unsupported operation: {op}")]
    Unsupported { op: &'static str },

    // === Internal Errors ===
    /// Internal logic error (should never happen).
    #[error("internal error: {0}")]
    Internal(String),
}

/// Stable numeric codes for the error families.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(i32)]
pub enum ErrorCode {
    /// Successful result.
    Ok = 0,
    /// Generic error.
    Error = 1,
    /// Internal logic error.
    Internal = 2,
    /// Header or segment validation failure.
    Format = 3,
    /// Directory could not be built.
    Index = 4,
    /// Argument out of bounds.
    Range = 5,
    /// Underlying stream failure.
    IoErr = 10,
    /// Operation not available.
    Unsupported = 11,
}

impl PcmError {
    /// Map this error to its family code.
    #[allow(clippy::match_same_arms)]
    pub const fn error_code(&self) -> ErrorCode {
        match self {
            Self::Format { .. } | Self::UnknownSubFormat { .. } => ErrorCode::Format,
            Self::Index { .. } => ErrorCode::Index,
            Self::Range { .. } => ErrorCode::Range,
            Self::Io(_) | Self::ShortRead { .. } => ErrorCode::IoErr,
            Self::UnsupportedFormat { .. } | Self::Unsupported { .. } => ErrorCode::Unsupported,
            Self::Internal(_) => ErrorCode::Internal,
        }
    }

    /// Whether the caller can likely fix this by changing arguments.
    pub const fn is_user_recoverable(&self) -> bool {
        matches!(
            self,
            Self::Range { .. } | Self::UnsupportedFormat { .. } | Self::Unsupported { .. }
        )
    }

    /// Human-friendly suggestion for fixing this error.
    pub const fn suggestion(&self) -> Option<&'static str> {
        match self {
            Self::Range { .. } => Some("Check the entry count with stat() before seeking"),
            Self::UnsupportedFormat { .. } => {
                Some("Use a .pcm_seq2, .pcm_seq, .pcmseq2 or .pcmseq file name")
            }
            Self::Index { .. } => Some("The file may be truncated or not a pcm_seq2 file"),
            _ => None,
        }
    }

    /// Get the process exit code for this error (for CLI use).
    pub const fn exit_code(&self) -> i32 {
        self.error_code() as i32
    }

    /// Create a format error.
    pub fn format(offset: u64, detail: impl Into<String>) -> Self {
        Self::Format {
            offset,
            detail: detail.into(),
        }
    }

    /// Create an index error.
    pub fn index(detail: impl Into<String>) -> Self {
        Self::Index {
            detail: detail.into(),
        }
    }

    /// Create a range error.
    pub fn range(what: &'static str, value: i64, min: i64, max: i64) -> Self {
        Self::Range {
            what,
            value,
            min,
            max,
        }
    }

    /// Create an internal error.
    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }

    /// Wrap a validation failure as an `InvalidData` I/O error.
    pub fn invalid_data(detail: impl Into<String>) -> Self {
        Self::Io(std::io::Error::new(
            std::io::ErrorKind::InvalidData,
            detail.into(),
        ))
    }
}

/// Result type alias using `PcmError`.
pub type Result<T> = std::result::Result<T, PcmError>;
