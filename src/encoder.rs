//! ZIP archive to record stream encoder

use std::collections::HashSet;
use std::io::{Cursor, Read, Write};

use base64::Engine;

use crate::archive::{central_directory_names, validate_name, ClassifierConfig, Entry, Mode, RecordHeader, RECORD_TERMINATOR};
use crate::error::{Error, Result};

/// Encodes a ZIP archive into the text-safe record stream
pub struct Encoder {
    config: ClassifierConfig,
    /// Verbosity level for per-record log events
    verbose: u8,
}

impl Encoder {
    /// Create a new encoder with the default text allow-list
    pub fn new() -> Self {
        Self::with_config(ClassifierConfig::default())
    }

    pub fn with_config(config: ClassifierConfig) -> Self {
        Self { config, verbose: 0 }
    }

    /// Set verbosity level (0-3)
    pub fn with_verbose(mut self, level: u8) -> Self {
        self.verbose = level;
        self
    }

    pub fn config(&self) -> &ClassifierConfig {
        &self.config
    }

    /// Encode archive bytes to a record stream
    pub fn encode(&self, archive: &[u8]) -> Result<Vec<u8>> {
        let mut output = Vec::new();
        self.encode_to_writer(archive, &mut output)?;
        Ok(output)
    }

    /// Encode an archive read from `reader` into `writer`.
    ///
    /// The whole input is staged in memory first because the archive
    /// directory sits at the end of the file.
    pub fn encode_to_writer<R: Read, W: Write>(&self, mut reader: R, writer: W) -> Result<()> {
        let mut staging = Vec::new();
        reader.read_to_end(&mut staging)?;

        let entries = read_entries(&staging)?;
        if self.verbose > 0 {
            tracing::info!(entries = entries.len(), "read archive");
        }

        self.encode_entries(&entries, writer)
    }

    /// Encode already extracted entries.
    ///
    /// Every name is checked before the first byte is written, so a
    /// rejected archive produces no output.
    pub fn encode_entries<W: Write>(&self, entries: &[Entry], mut writer: W) -> Result<()> {
        let mut seen = HashSet::with_capacity(entries.len());
        for entry in entries {
            validate_name(&entry.name)?;
            if !seen.insert(entry.name.as_str()) {
                return Err(Error::DuplicateEntry(entry.name.clone()));
            }
        }

        for entry in entries {
            self.encode_entry(&mut writer, entry)?;
        }

        writer.flush()?;
        Ok(())
    }

    /// Encode a single entry as header, data section and separator
    fn encode_entry<W: Write>(&self, writer: &mut W, entry: &Entry) -> Result<RecordHeader> {
        let classification = entry.classify(&self.config);
        let raw_length = entry.data.len();

        let header = match classification.mode() {
            Mode::Text => {
                let header = RecordHeader::new(entry.name.as_str(), raw_length, raw_length, Mode::Text);
                writer.write_all(header.to_line().as_bytes())?;
                writer.write_all(&entry.data)?;
                header
            }
            Mode::Binary => {
                let encoded = base64::engine::general_purpose::STANDARD.encode(&entry.data);
                let header = RecordHeader::new(entry.name.as_str(), encoded.len(), raw_length, Mode::Binary);
                writer.write_all(header.to_line().as_bytes())?;
                writer.write_all(encoded.as_bytes())?;
                header
            }
        };
        writer.write_all(&[RECORD_TERMINATOR])?;

        if self.verbose > 1 {
            tracing::debug!(
                entry = %header.name,
                mode = %header.mode,
                raw_length = header.raw_length,
                encoded_length = header.encoded_length,
                classification = ?classification,
                "encoded record"
            );
        }

        Ok(header)
    }
}

impl Default for Encoder {
    fn default() -> Self {
        Self::new()
    }
}

/// Read every entry of a ZIP archive in central directory order.
///
/// The zip reader keeps only one entry per name, so the raw central
/// directory is checked first and a repeated name is an error.
pub fn read_entries(archive: &[u8]) -> Result<Vec<Entry>> {
    if let Some(names) = central_directory_names(archive) {
        let mut seen = HashSet::with_capacity(names.len());
        for name in names {
            if !seen.insert(name) {
                return Err(Error::DuplicateEntry(String::from_utf8_lossy(name).into_owned()));
            }
        }
    }

    let mut archive = zip::ZipArchive::new(Cursor::new(archive))?;
    let mut entries = Vec::with_capacity(archive.len());

    for index in 0..archive.len() {
        let mut file = archive.by_index(index)?;
        let mut data = Vec::new();
        file.read_to_end(&mut data)?;
        entries.push(Entry::new(file.name(), data));
    }

    Ok(entries)
}
