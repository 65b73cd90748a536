//! Error type for encode/decode operations

/// Errors raised while converting between archives and record streams
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// The input is not a readable archive, or the archive writer failed
    #[error("archive error: {0}")]
    Zip(#[from] zip::result::ZipError),

    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),

    /// Fewer bytes remained than the record header declared
    #[error("truncated stream in record '{name}': expected {expected} bytes, got {actual}")]
    Truncated {
        name: String,
        expected: usize,
        actual: usize,
    },

    #[error("malformed record header {line:?}: {reason}")]
    InvalidHeader { line: String, reason: String },

    #[error("unknown record mode '{mode}' for '{name}'")]
    UnknownMode { mode: String, name: String },

    #[error("invalid base64 data in record '{name}': {source}")]
    Base64 {
        name: String,
        #[source]
        source: base64::DecodeError,
    },

    #[error("length mismatch in record '{name}': header declares {declared} bytes, payload has {actual}")]
    LengthMismatch {
        name: String,
        declared: usize,
        actual: usize,
    },

    /// Entry name cannot be stored in a record header without loss
    #[error("entry name {0:?} cannot be encoded (contains '|' or a newline, ends in whitespace, or is empty)")]
    UnrepresentableName(String),

    #[error("duplicate entry name: {0}")]
    DuplicateEntry(String),
}

pub type Result<T> = std::result::Result<T, Error>;
