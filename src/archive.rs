//! Archive entry and record data structures

use std::path::Path;

use crate::error::{Error, Result};

// Record header constants
pub const FIELD_SEPARATOR: char = '|';
pub const HEADER_FIELDS: usize = 4;
pub const RECORD_TERMINATOR: u8 = b'\n';
pub const TEXT_TAG: char = 'A';
pub const BINARY_TAG: char = 'B';

// ZIP signatures used to sniff input that is already an archive
pub const LOCAL_FILE_HEADER_SIGNATURE: [u8; 4] = *b"PK\x03\x04";
pub const END_OF_CENTRAL_DIR_SIGNATURE: [u8; 4] = *b"PK\x05\x06";
pub const SIGNATURE_LEN: usize = 4;
pub const CENTRAL_DIR_HEADER_SIGNATURE: [u8; 4] = *b"PK\x01\x02";
pub const ZIP64_END_OF_CENTRAL_DIR_SIGNATURE: [u8; 4] = *b"PK\x06\x06";
pub const ZIP64_LOCATOR_SIGNATURE: [u8; 4] = *b"PK\x06\x07";

// Fixed record sizes from the ZIP application note
const END_OF_CENTRAL_DIR_LEN: usize = 22;
const ZIP64_END_OF_CENTRAL_DIR_LEN: usize = 56;
const ZIP64_LOCATOR_LEN: usize = 20;
const CENTRAL_DIR_HEADER_LEN: usize = 46;

/// Extensions stored verbatim without looking at the content
pub const DEFAULT_TEXT_EXTENSIONS: &[&str] = &["txt", "html", "xml"];

/// Configuration for text/binary classification
#[derive(Debug, Clone)]
pub struct ClassifierConfig {
    /// Lower-cased extensions (without the dot) that are always treated as text
    pub text_extensions: Vec<String>,
}

impl Default for ClassifierConfig {
    fn default() -> Self {
        Self {
            text_extensions: DEFAULT_TEXT_EXTENSIONS.iter().map(|ext| ext.to_string()).collect(),
        }
    }
}

impl ClassifierConfig {
    /// Extend the allow-list with extra extensions (a leading dot is accepted)
    pub fn with_text_extensions<I, S>(mut self, extensions: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        for ext in extensions {
            let ext = ext.as_ref().trim().trim_start_matches('.').to_ascii_lowercase();
            if !ext.is_empty() && !self.text_extensions.contains(&ext) {
                self.text_extensions.push(ext);
            }
        }
        self
    }

    /// Whether the extension of `name` is on the allow-list
    pub fn is_text_extension(&self, name: &str) -> bool {
        match extension_of(name) {
            Some(ext) => self.text_extensions.iter().any(|allowed| allowed.eq_ignore_ascii_case(&ext)),
            None => false,
        }
    }
}

/// Extension of the last path component, trimmed and lower-cased
fn extension_of(name: &str) -> Option<String> {
    Path::new(name)
        .extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| ext.trim().to_ascii_lowercase())
        .filter(|ext| !ext.is_empty())
}

/// How a record's data section is laid out in the stream
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    /// Payload copied verbatim
    Text,
    /// Payload base64 encoded
    Binary,
}

impl Mode {
    /// Single-character tag written in the record header
    pub fn tag(self) -> char {
        match self {
            Mode::Text => TEXT_TAG,
            Mode::Binary => BINARY_TAG,
        }
    }

    pub fn from_tag(tag: &str) -> Option<Self> {
        match tag {
            "A" => Some(Mode::Text),
            "B" => Some(Mode::Binary),
            _ => None,
        }
    }
}

impl std::fmt::Display for Mode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Mode::Text => write!(f, "text"),
            Mode::Binary => write!(f, "binary"),
        }
    }
}

/// Result of classification
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Classification {
    Text { reason: TextReason },
    Binary { reason: BinaryReason },
}

impl Classification {
    pub fn mode(&self) -> Mode {
        match self {
            Classification::Text { .. } => Mode::Text,
            Classification::Binary { .. } => Mode::Binary,
        }
    }
}

/// Reason why data is stored verbatim
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TextReason {
    /// Extension is on the allow-list; content was not inspected
    AllowListedExtension,
    /// Valid UTF-8 made only of printable ASCII and whitespace
    PrintableAscii,
}

/// Reason why data is base64 encoded
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryReason {
    /// Invalid UTF-8 encoding (actual binary data)
    InvalidUtf8,
    /// Valid UTF-8 but contains control or non-ASCII characters
    NonPrintable,
}

/// Printable ASCII plus the whitespace controls `\t \n \r \x0b \x0c`
fn is_printable_ascii(byte: u8) -> bool {
    matches!(byte, 0x20..=0x7E | b'\t' | b'\n' | b'\r' | 0x0B | 0x0C)
}

/// Decide whether an entry is stored as text or binary.
///
/// Rules, in order:
/// 1. Extension on the allow-list → Text
/// 2. Not valid UTF-8 → Binary
/// 3. Only printable ASCII → Text, otherwise Binary
pub fn classify(name: &str, data: &[u8], config: &ClassifierConfig) -> Classification {
    if config.is_text_extension(name) {
        return Classification::Text {
            reason: TextReason::AllowListedExtension,
        };
    }

    let text = match std::str::from_utf8(data) {
        Ok(text) => text,
        Err(_) => {
            return Classification::Binary {
                reason: BinaryReason::InvalidUtf8,
            }
        }
    };

    if text.bytes().all(is_printable_ascii) {
        Classification::Text {
            reason: TextReason::PrintableAscii,
        }
    } else {
        Classification::Binary {
            reason: BinaryReason::NonPrintable,
        }
    }
}

/// Check that a name survives the header line unchanged
pub fn validate_name(name: &str) -> Result<()> {
    if name.is_empty()
        || name.contains(FIELD_SEPARATOR)
        || name.contains('\n')
        || name.trim_end() != name
    {
        return Err(Error::UnrepresentableName(name.to_string()));
    }
    Ok(())
}

/// Whether `prefix` starts with a ZIP signature.
///
/// The end-of-central-directory signature is accepted too: an archive
/// without entries consists of nothing else.
pub fn is_archive(prefix: &[u8]) -> bool {
    prefix.starts_with(&LOCAL_FILE_HEADER_SIGNATURE) || prefix.starts_with(&END_OF_CENTRAL_DIR_SIGNATURE)
}

fn read_u16(data: &[u8], at: usize) -> Option<usize> {
    let bytes = data.get(at..at + 2)?;
    Some(u16::from_le_bytes([bytes[0], bytes[1]]) as usize)
}

fn read_u32(data: &[u8], at: usize) -> Option<u64> {
    let bytes = data.get(at..at + 4)?;
    Some(u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]) as u64)
}

fn read_u64(data: &[u8], at: usize) -> Option<u64> {
    let bytes: [u8; 8] = data.get(at..at + 8)?.try_into().ok()?;
    Some(u64::from_le_bytes(bytes))
}

/// Raw entry names as listed in the central directory, in order.
///
/// Unlike the archive reader, which indexes entries by name, this keeps
/// every record, so repeated names stay visible. The directory is located
/// relative to the end-of-central-directory record, which tolerates data
/// prepended to the archive. Returns `None` when no well-formed directory
/// can be found.
pub fn central_directory_names(data: &[u8]) -> Option<Vec<&[u8]>> {
    let last = data.len().checked_sub(END_OF_CENTRAL_DIR_LEN)?;
    let first = last.saturating_sub(u16::MAX as usize);
    let eocd = (first..=last)
        .rev()
        .find(|&pos| data[pos..].starts_with(&END_OF_CENTRAL_DIR_SIGNATURE))?;

    let entries = read_u16(data, eocd + 10)?;
    let mut size = read_u32(data, eocd + 12)?;
    let offset = read_u32(data, eocd + 16)?;
    let mut end = eocd;

    if entries == u16::MAX as usize || size == u32::MAX as u64 || offset == u32::MAX as u64 {
        let locator = eocd.checked_sub(ZIP64_LOCATOR_LEN)?;
        let record = locator.checked_sub(ZIP64_END_OF_CENTRAL_DIR_LEN)?;
        if !data[locator..].starts_with(&ZIP64_LOCATOR_SIGNATURE)
            || !data[record..].starts_with(&ZIP64_END_OF_CENTRAL_DIR_SIGNATURE)
        {
            return None;
        }
        size = read_u64(data, record + 40)?;
        end = record;
    }

    let mut pos = end.checked_sub(usize::try_from(size).ok()?)?;
    let mut names = Vec::new();
    while pos < end {
        if !data[pos..].starts_with(&CENTRAL_DIR_HEADER_SIGNATURE) {
            return None;
        }
        let name_len = read_u16(data, pos + 28)?;
        let extra_len = read_u16(data, pos + 30)?;
        let comment_len = read_u16(data, pos + 32)?;

        let name_start = pos + CENTRAL_DIR_HEADER_LEN;
        names.push(data.get(name_start..name_start + name_len)?);
        pos = name_start + name_len + extra_len + comment_len;
    }

    Some(names)
}

/// A named payload read from or written to an archive
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Entry {
    /// Path inside the archive (directories end with `/`)
    pub name: String,
    pub data: Vec<u8>,
}

impl Entry {
    pub fn new(name: impl Into<String>, data: impl Into<Vec<u8>>) -> Self {
        Self {
            name: name.into(),
            data: data.into(),
        }
    }

    /// Directory entries carry no payload
    pub fn is_dir(&self) -> bool {
        self.name.ends_with('/') && self.data.is_empty()
    }

    pub fn classify(&self, config: &ClassifierConfig) -> Classification {
        classify(&self.name, &self.data, config)
    }
}

/// Header line preceding each data section: `<encoded>|<raw>|<A|B>|<name>\n`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordHeader {
    /// Length of the data section as stored in the stream
    pub encoded_length: usize,
    /// Length of the payload before base64
    pub raw_length: usize,
    pub mode: Mode,
    pub name: String,
}

impl RecordHeader {
    pub fn new(name: impl Into<String>, encoded_length: usize, raw_length: usize, mode: Mode) -> Self {
        Self {
            encoded_length,
            raw_length,
            mode,
            name: name.into(),
        }
    }

    /// Format the header line, including the trailing newline
    pub fn to_line(&self) -> String {
        format!(
            "{}{sep}{}{sep}{}{sep}{}\n",
            self.encoded_length,
            self.raw_length,
            self.mode.tag(),
            self.name,
            sep = FIELD_SEPARATOR,
        )
    }

    /// Parse a header line. The trailing newline is optional and trailing
    /// whitespace in the name is dropped.
    pub fn parse(line: &[u8]) -> Result<Self> {
        let line = line.strip_suffix(&[RECORD_TERMINATOR]).unwrap_or(line);
        let text = std::str::from_utf8(line).map_err(|_| Error::InvalidHeader {
            line: String::from_utf8_lossy(line).into_owned(),
            reason: "header is not valid UTF-8".to_string(),
        })?;

        let invalid = |reason: String| Error::InvalidHeader {
            line: text.to_string(),
            reason,
        };

        let fields: Vec<&str> = text.split(FIELD_SEPARATOR).collect();
        if fields.len() != HEADER_FIELDS {
            return Err(invalid(format!("expected {} fields, found {}", HEADER_FIELDS, fields.len())));
        }

        let encoded_length = fields[0]
            .parse::<usize>()
            .map_err(|_| invalid(format!("invalid data length '{}'", fields[0])))?;
        let raw_length = fields[1]
            .parse::<usize>()
            .map_err(|_| invalid(format!("invalid raw length '{}'", fields[1])))?;
        let name = fields[3].trim_end().to_string();
        let mode = Mode::from_tag(fields[2]).ok_or_else(|| Error::UnknownMode {
            mode: fields[2].to_string(),
            name: name.clone(),
        })?;

        Ok(Self {
            encoded_length,
            raw_length,
            mode,
            name,
        })
    }
}

/// One framed entry of the stream
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Record {
    pub header: RecordHeader,
    /// Decoded payload
    pub entry: Entry,
}
