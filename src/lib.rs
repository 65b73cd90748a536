//! # emx-zippey
//!
//! Reversible conversion between ZIP-based files (`.docx`, `.odt`, `.jar`, ...)
//! and a line-oriented text stream that version control can diff.
//!
//! Compression smears every change across the whole file, so two archives that
//! differ in a single entry look like unrelated binary blobs. Used as a git
//! `clean`/`smudge` filter, this crate stores the unpacked form instead.
//!
//! ## Stream Format
//!
//! The stream is a sequence of records, one per archive entry:
//!
//! ```text
//! <data length>|<raw length>|<A|B>|<name>\n
//! <data bytes>\n
//! ```
//!
//! - `A` records hold the payload verbatim, so text changes show up in diffs
//! - `B` records hold the payload base64 encoded (standard alphabet, no wrapping)
//!
//! The data length is authoritative; the newline after the data is a
//! separator only and is skipped without inspection.
//!
//! ```text
//! 11|11|A|a.txt
//! hello
//! world
//! 4|3|B|b.bin
//! AAEC
//! ```
//!
//! ## Text Detection
//!
//! Rules, in order:
//! 1. Extension is `txt`, `html` or `xml` (configurable via [`ClassifierConfig`]) → Text
//! 2. Payload is not valid UTF-8 → Binary
//! 3. Payload is printable ASCII plus whitespace → Text, otherwise Binary
//!
//! ## Limits
//!
//! Entry names containing `|` or a newline, or ending in whitespace, cannot be
//! represented in a header line and are rejected at encode time. Duplicate
//! entry names are rejected in both directions.

pub mod archive;
pub mod encoder;
pub mod decoder;
pub mod error;
#[cfg(feature = "cli")]
pub mod install;

pub use archive::{
    central_directory_names, classify, is_archive, validate_name,
    Entry, Mode, Record, RecordHeader,
    ClassifierConfig, Classification, TextReason, BinaryReason,
};
pub use encoder::{read_entries, Encoder};
pub use decoder::{write_archive, Decoder, RecordReader};
pub use error::{Error, Result};
