//! Record stream to ZIP archive decoder

use std::collections::HashSet;
use std::io::{self, BufRead, BufReader, Cursor, Read, Seek, Write};

use base64::Engine;
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, DateTime, ZipWriter};

use crate::archive::{is_archive, Entry, Mode, Record, RecordHeader, RECORD_TERMINATOR, SIGNATURE_LEN};
use crate::error::{Error, Result};

// Data sections larger than this need ZIP64 headers
const ZIP64_THRESHOLD: u64 = u32::MAX as u64;

/// Pulls records one at a time out of a stream
pub struct RecordReader<R> {
    reader: R,
}

impl<R: BufRead> RecordReader<R> {
    pub fn new(reader: R) -> Self {
        Self { reader }
    }

    /// Read the next record, or `None` once the input is exhausted at a
    /// header boundary
    pub fn next_record(&mut self) -> Result<Option<Record>> {
        let mut line = Vec::new();
        if self.reader.read_until(RECORD_TERMINATOR, &mut line)? == 0 {
            return Ok(None);
        }

        let header = RecordHeader::parse(&line)?;
        let section = self.read_section(&header.name, header.encoded_length)?;

        let data = match header.mode {
            Mode::Text => section,
            Mode::Binary => base64::engine::general_purpose::STANDARD
                .decode(&section)
                .map_err(|source| Error::Base64 {
                    name: header.name.clone(),
                    source,
                })?,
        };

        if data.len() != header.raw_length {
            return Err(Error::LengthMismatch {
                name: header.name.clone(),
                declared: header.raw_length,
                actual: data.len(),
            });
        }

        // Separator byte; its value carries no meaning
        self.read_section(&header.name, 1)?;

        let entry = Entry::new(header.name.as_str(), data);
        Ok(Some(Record { header, entry }))
    }

    /// Read exactly `len` bytes, failing on a short read
    fn read_section(&mut self, name: &str, len: usize) -> Result<Vec<u8>> {
        let mut buf = Vec::new();
        let actual = (&mut self.reader).take(len as u64).read_to_end(&mut buf)?;
        if actual < len {
            return Err(Error::Truncated {
                name: name.to_string(),
                expected: len,
                actual,
            });
        }
        Ok(buf)
    }

    pub fn into_inner(self) -> R {
        self.reader
    }
}

impl<R: BufRead> Iterator for RecordReader<R> {
    type Item = Result<Record>;

    fn next(&mut self) -> Option<Self::Item> {
        self.next_record().transpose()
    }
}

/// Decodes a record stream back into a ZIP archive
pub struct Decoder {
    /// Verbosity level for per-record log events
    verbose: u8,
}

impl Decoder {
    /// Create a new decoder
    pub fn new() -> Self {
        Self { verbose: 0 }
    }

    /// Set verbosity level (0-3)
    pub fn with_verbose(mut self, level: u8) -> Self {
        self.verbose = level;
        self
    }

    /// Decode a record stream to archive bytes
    pub fn decode(&self, input: &[u8]) -> Result<Vec<u8>> {
        let mut output = Vec::new();
        self.decode_to_writer(input, &mut output)?;
        Ok(output)
    }

    /// Decode a stream read from `reader` into `writer`.
    ///
    /// Input that already starts with a ZIP signature is copied through
    /// unchanged. Otherwise nothing reaches `writer` unless every record
    /// parsed.
    pub fn decode_to_writer<R: Read, W: Write>(&self, mut reader: R, mut writer: W) -> Result<()> {
        let mut prefix = Vec::with_capacity(SIGNATURE_LEN);
        (&mut reader).take(SIGNATURE_LEN as u64).read_to_end(&mut prefix)?;
        let passthrough = is_archive(&prefix);

        let mut input = BufReader::new(Cursor::new(prefix).chain(reader));

        if passthrough {
            let copied = io::copy(&mut input, &mut writer)?;
            if self.verbose > 0 {
                tracing::info!(bytes = copied, "input is already a ZIP archive, copied unchanged");
            }
            writer.flush()?;
            return Ok(());
        }

        let archive = self.build_archive(RecordReader::new(input))?;
        writer.write_all(&archive)?;
        writer.flush()?;
        Ok(())
    }

    fn build_archive<R: BufRead>(&self, mut records: RecordReader<R>) -> Result<Vec<u8>> {
        let mut zip = ZipWriter::new(Cursor::new(Vec::new()));
        let mut seen = HashSet::new();

        while let Some(Record { header, entry }) = records.next_record()? {
            if !seen.insert(entry.name.clone()) {
                return Err(Error::DuplicateEntry(entry.name));
            }

            if self.verbose > 1 {
                tracing::debug!(
                    entry = %header.name,
                    mode = %header.mode,
                    raw_length = header.raw_length,
                    encoded_length = header.encoded_length,
                    "decoded record"
                );
            }

            write_entry(&mut zip, &entry)?;
        }

        if self.verbose > 0 {
            tracing::info!(entries = seen.len(), "built archive");
        }

        Ok(zip.finish()?.into_inner())
    }
}

impl Default for Decoder {
    fn default() -> Self {
        Self::new()
    }
}

/// Add one entry to an archive under construction (Deflate).
///
/// Timestamps are pinned to the DOS epoch so the same stream always
/// rebuilds the same bytes.
pub fn write_entry<W: Write + Seek>(zip: &mut ZipWriter<W>, entry: &Entry) -> Result<()> {
    let options = SimpleFileOptions::default()
        .compression_method(CompressionMethod::Deflated)
        .last_modified_time(DateTime::default())
        .large_file(entry.data.len() as u64 >= ZIP64_THRESHOLD);

    if entry.is_dir() {
        zip.add_directory(entry.name.as_str(), options)?;
    } else {
        zip.start_file(entry.name.as_str(), options)?;
        zip.write_all(&entry.data)?;
    }
    Ok(())
}

/// Build a complete archive from entries, in order
pub fn write_archive(entries: &[Entry]) -> Result<Vec<u8>> {
    let mut zip = ZipWriter::new(Cursor::new(Vec::new()));
    for entry in entries {
        write_entry(&mut zip, entry)?;
    }
    Ok(zip.finish()?.into_inner())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::encoder::read_entries;

    fn entries_of(archive: Vec<u8>) -> Vec<Entry> {
        read_entries(&archive).unwrap()
    }

    #[test]
    fn test_decode_text_and_binary() {
        let input = b"11|11|A|a.txt\nhello\nworld\n4|3|B|b.bin\nAAEC\n";

        let decoder = Decoder::new();
        let archive = decoder.decode(input).unwrap();

        assert!(archive.starts_with(b"PK\x03\x04"));
        assert_eq!(
            entries_of(archive),
            vec![
                Entry::new("a.txt", "hello\nworld"),
                Entry::new("b.bin", vec![0x00, 0x01, 0x02]),
            ]
        );
    }

    #[test]
    fn test_decode_empty_stream() {
        let archive = Decoder::new().decode(b"").unwrap();
        assert!(!archive.is_empty());
        assert!(entries_of(archive).is_empty());
    }

    #[test]
    fn test_decode_strips_trailing_whitespace_in_name() {
        let archive = Decoder::new().decode(b"1|1|A|a.txt \t\r\nx\n").unwrap();
        assert_eq!(entries_of(archive), vec![Entry::new("a.txt", "x")]);
    }

    #[test]
    fn test_decode_payload_with_embedded_separators() {
        let input = b"9|9|A|p.txt\n1|2|A|x\n\n\n0|0|B|empty\n\n";
        let archive = Decoder::new().decode(input).unwrap();
        assert_eq!(
            entries_of(archive),
            vec![Entry::new("p.txt", "1|2|A|x\n\n"), Entry::new("empty", Vec::new())]
        );
    }

    #[test]
    fn test_decode_skips_any_separator_byte() {
        let archive = Decoder::new().decode(b"1|1|A|a\nxY2|2|A|b\nzz\n").unwrap();
        assert_eq!(entries_of(archive), vec![Entry::new("a", "x"), Entry::new("b", "zz")]);
    }

    #[test]
    fn test_decode_directory_entry() {
        let archive = Decoder::new().decode(b"0|0|A|docProps/\n\n").unwrap();
        let mut zip = zip::ZipArchive::new(Cursor::new(archive)).unwrap();
        let dir = zip.by_index(0).unwrap();
        assert!(dir.is_dir());
        assert_eq!(dir.name(), "docProps/");
    }

    #[test]
    fn test_decode_is_deterministic() {
        let input = b"5|5|A|a.txt\nhello\n4|3|B|b.bin\nAAEC\n";
        assert_eq!(Decoder::new().decode(input).unwrap(), Decoder::new().decode(input).unwrap());
    }

    #[test]
    fn test_decode_passthrough_archive() {
        let archive = write_archive(&[Entry::new("a.txt", "hello")]).unwrap();

        let once = Decoder::new().decode(&archive).unwrap();
        assert_eq!(once, archive);
        let twice = Decoder::new().decode(&once).unwrap();
        assert_eq!(twice, archive);
    }

    #[test]
    fn test_decode_passthrough_verbose_output_unchanged() {
        let archive = write_archive(&[Entry::new("a.txt", "hello")]).unwrap();
        for level in 0..=3 {
            let mut output = Vec::new();
            Decoder::new().with_verbose(level).decode_to_writer(&archive[..], &mut output).unwrap();
            assert_eq!(output, archive);
        }
    }

    #[test]
    fn test_decode_passthrough_empty_archive() {
        let empty = Decoder::new().decode(b"").unwrap();
        assert_eq!(Decoder::new().decode(&empty).unwrap(), empty);
    }

    #[test]
    fn test_decode_passthrough_short_reads() {
        // A reader that hands out one byte at a time must not lose the prefix
        struct Trickle<'a>(&'a [u8]);
        impl Read for Trickle<'_> {
            fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
                if self.0.is_empty() || buf.is_empty() {
                    return Ok(0);
                }
                buf[0] = self.0[0];
                self.0 = &self.0[1..];
                Ok(1)
            }
        }

        let archive = write_archive(&[Entry::new("a.bin", vec![0xFF; 64])]).unwrap();
        let mut output = Vec::new();
        Decoder::new().decode_to_writer(Trickle(&archive), &mut output).unwrap();
        assert_eq!(output, archive);

        let mut output = Vec::new();
        Decoder::new().decode_to_writer(Trickle(b"2|2|A|t\nok\n"), &mut output).unwrap();
        assert_eq!(entries_of(output), vec![Entry::new("t", "ok")]);
    }

    #[test]
    fn test_decode_unknown_mode_writes_nothing() {
        let input = b"1|1|A|a.txt\nx\n1|1|C|c.txt\ny\n";
        let mut output = Vec::new();
        let err = Decoder::new().decode_to_writer(&input[..], &mut output).unwrap_err();

        assert!(matches!(err, Error::UnknownMode { ref mode, ref name } if mode == "C" && name == "c.txt"));
        assert!(output.is_empty());
    }

    #[test]
    fn test_decode_malformed_header() {
        let err = Decoder::new().decode(b"hello world\n").unwrap_err();
        assert!(matches!(err, Error::InvalidHeader { .. }));

        let err = Decoder::new().decode(b"\n").unwrap_err();
        assert!(matches!(err, Error::InvalidHeader { .. }));
    }

    #[test]
    fn test_decode_truncated_data() {
        let err = Decoder::new().decode(b"10|10|A|a.txt\nshort").unwrap_err();
        match err {
            Error::Truncated { name, expected, actual } => {
                assert_eq!(name, "a.txt");
                assert_eq!(expected, 10);
                assert_eq!(actual, 5);
            }
            other => panic!("expected Truncated, got {:?}", other),
        }
    }

    #[test]
    fn test_decode_missing_separator() {
        let err = Decoder::new().decode(b"5|5|A|a.txt\nhello").unwrap_err();
        assert!(matches!(err, Error::Truncated { expected: 1, actual: 0, .. }));
    }

    #[test]
    fn test_decode_invalid_base64() {
        let err = Decoder::new().decode(b"4|3|B|b.bin\n!!!!\n").unwrap_err();
        assert!(matches!(err, Error::Base64 { ref name, .. } if name == "b.bin"));
    }

    #[test]
    fn test_decode_length_mismatch() {
        let err = Decoder::new().decode(b"4|2|B|b.bin\nAAEC\n").unwrap_err();
        assert!(matches!(err, Error::LengthMismatch { declared: 2, actual: 3, .. }));

        let err = Decoder::new().decode(b"2|3|A|a.txt\nab\n").unwrap_err();
        assert!(matches!(err, Error::LengthMismatch { declared: 3, actual: 2, .. }));
    }

    #[test]
    fn test_decode_duplicate_names_rejected() {
        let err = Decoder::new().decode(b"1|1|A|a.txt\nx\n1|1|A|a.txt\ny\n").unwrap_err();
        assert!(matches!(err, Error::DuplicateEntry(ref name) if name == "a.txt"));
    }

    #[test]
    fn test_record_reader_iterates() {
        let input: &[u8] = b"3|3|A|one\nabc\n4|1|B|two\nAA==\n";
        let records: Vec<Record> = RecordReader::new(input).collect::<Result<_>>().unwrap();

        assert_eq!(records.len(), 2);
        assert_eq!(records[0].header, RecordHeader::new("one", 3, 3, Mode::Text));
        assert_eq!(records[1].header, RecordHeader::new("two", 4, 1, Mode::Binary));
        assert_eq!(records[1].entry.data, vec![0x00]);
    }
}
