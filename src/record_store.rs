//! The flat record file the index points into.
//!
//! Each record is one line of the form `<key> <data>`. The index stores the
//! byte offset where a record's line starts, so offsets are the only link
//! between the tree and this file.

use std::fmt;
use std::fs::{self, File, OpenOptions};
use std::io::{BufRead, BufReader, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use tracing::debug;

use crate::error::{IndexError, Result};

/// Most decimal digits a record key may have. Appended keys are zero-padded
/// to this width.
pub const KEY_DIGITS: usize = 14;

/// One line of the record file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Record {
    /// Byte offset of the first character of the line.
    pub offset: u64,
    pub key: u64,
    /// The line as stored, without its terminator.
    pub line: String,
}

impl Record {
    /// Everything after the first space.
    #[must_use]
    pub fn data(&self) -> &str {
        self.line.split_once(' ').map_or("", |(_, data)| data)
    }
}

impl fmt::Display for Record {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.line)
    }
}

/// Parses a record key: at most [`KEY_DIGITS`] ASCII digits.
///
/// # Errors
///
/// Returns [`IndexError::InvalidKey`] for anything else.
///
/// # Examples
///
/// ```
/// use bplus_index::record_store::parse_key;
///
/// assert_eq!(parse_key("00000000000042").unwrap(), 42);
/// assert!(parse_key("-1").is_err());
/// assert!(parse_key("123456789012345").is_err());
/// ```
pub fn parse_key(text: &str) -> Result<u64> {
    let invalid = || IndexError::InvalidKey {
        key: text.to_owned(),
        max_digits: KEY_DIGITS,
    };
    if text.is_empty() || text.len() > KEY_DIGITS || !text.bytes().all(|b| b.is_ascii_digit()) {
        return Err(invalid());
    }
    text.parse().map_err(|_| invalid())
}

/// Splits a line at its first space. Returns `None` if there is no space or
/// nothing after it.
#[must_use]
pub fn split_record(line: &str) -> Option<(&str, &str)> {
    line.split_once(' ').filter(|(_, data)| !data.is_empty())
}

fn trim_line_end(line: &str) -> &str {
    let line = line.strip_suffix('\n').unwrap_or(line);
    line.strip_suffix('\r').unwrap_or(line)
}

/// Handle to a record file on disk. Every operation opens the file afresh.
#[derive(Debug, Clone)]
pub struct RecordStore {
    path: PathBuf,
}

impl RecordStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    #[must_use]
    pub fn exists(&self) -> bool {
        self.path.is_file()
    }

    /// Reads every record with the offset of its line. Blank lines are
    /// skipped, `\r\n` endings are accepted.
    ///
    /// # Errors
    ///
    /// Returns [`IndexError::MalformedRecord`] naming the first bad line, or
    /// [`IndexError::Io`] if the file cannot be read.
    pub fn scan(&self) -> Result<Vec<Record>> {
        let contents = fs::read_to_string(&self.path)?;
        let mut records = Vec::new();
        let mut offset = 0u64;

        for (index, raw) in contents.split_inclusive('\n').enumerate() {
            let line_offset = offset;
            offset += raw.len() as u64;

            let line = trim_line_end(raw);
            if line.trim().is_empty() {
                continue;
            }

            let line_number = index + 1;
            let Some((key_text, _)) = split_record(line) else {
                return Err(IndexError::MalformedRecord {
                    line: line_number,
                    reason: "expected '<key> <data>'".to_owned(),
                });
            };
            let key = parse_key(key_text).map_err(|err| IndexError::MalformedRecord {
                line: line_number,
                reason: err.to_string(),
            })?;

            records.push(Record {
                offset: line_offset,
                key,
                line: line.to_owned(),
            });
        }

        debug!(path = %self.path.display(), records = records.len(), "scanned record file");
        Ok(records)
    }

    /// Reads the record whose line starts at `offset`.
    ///
    /// # Errors
    ///
    /// Returns [`IndexError::NoRecordAt`] if `offset` is not the start of a
    /// line holding a well-formed record.
    pub fn read_at(&self, offset: u64) -> Result<Record> {
        let mut reader = BufReader::new(File::open(&self.path)?);
        if !Self::starts_line(&mut reader, offset)? {
            return Err(IndexError::NoRecordAt { offset });
        }

        let mut raw = String::new();
        reader.read_line(&mut raw)?;
        Self::record_from_line(offset, trim_line_end(&raw))
    }

    /// Appends `<key zero-padded> <data>\n` and returns the offset of the new
    /// line. A missing final newline is written first.
    ///
    /// # Errors
    ///
    /// Returns [`IndexError::InvalidInsert`] if `data` is empty or spans lines,
    /// or [`IndexError::Io`] on write failure.
    pub fn append(&self, key: u64, data: &str) -> Result<u64> {
        if data.is_empty() || data.contains(['\n', '\r']) {
            return Err(IndexError::InvalidInsert { input: data.to_owned() });
        }

        let mut file = OpenOptions::new().read(true).append(true).create(true).open(&self.path)?;
        let mut offset = file.metadata()?.len();
        if offset > 0 {
            let mut last = [0u8; 1];
            file.seek(SeekFrom::Start(offset - 1))?;
            file.read_exact(&mut last)?;
            if last[0] != b'\n' {
                file.write_all(b"\n")?;
                offset += 1;
            }
        }

        let line = format!("{key:0width$} {data}\n", width = KEY_DIGITS);
        file.write_all(line.as_bytes())?;
        file.flush()?;

        debug!(path = %self.path.display(), key, offset, "appended record");
        Ok(offset)
    }

    /// Deletes the line starting at `offset` and returns it with the number of
    /// bytes removed. Every later line moves down by that many bytes.
    ///
    /// # Errors
    ///
    /// Returns [`IndexError::NoRecordAt`] if `offset` is not the start of a
    /// record line.
    pub fn remove_at(&self, offset: u64) -> Result<(Record, u64)> {
        let contents = fs::read(&self.path)?;
        let start = usize::try_from(offset).map_err(|_| IndexError::NoRecordAt { offset })?;
        if start >= contents.len() || (start > 0 && contents[start - 1] != b'\n') {
            return Err(IndexError::NoRecordAt { offset });
        }

        let end = contents[start..]
            .iter()
            .position(|&b| b == b'\n')
            .map_or(contents.len(), |newline| start + newline + 1);
        let raw = String::from_utf8_lossy(&contents[start..end]);
        let record = Self::record_from_line(offset, trim_line_end(&raw))?;

        let mut rewritten = Vec::with_capacity(contents.len() - (end - start));
        rewritten.extend_from_slice(&contents[..start]);
        rewritten.extend_from_slice(&contents[end..]);
        fs::write(&self.path, rewritten)?;

        let removed = (end - start) as u64;
        debug!(path = %self.path.display(), offset, removed, "removed record");
        Ok((record, removed))
    }

    /// Positions `reader` at `offset` and reports whether a line starts there.
    fn starts_line(reader: &mut BufReader<File>, offset: u64) -> Result<bool> {
        let len = reader.get_ref().metadata()?.len();
        if offset >= len {
            return Ok(false);
        }
        if offset > 0 {
            let mut previous = [0u8; 1];
            reader.seek(SeekFrom::Start(offset - 1))?;
            reader.read_exact(&mut previous)?;
            return Ok(previous[0] == b'\n');
        }
        reader.seek(SeekFrom::Start(0))?;
        Ok(true)
    }

    fn record_from_line(offset: u64, line: &str) -> Result<Record> {
        let key = split_record(line)
            .and_then(|(key_text, _)| parse_key(key_text).ok())
            .ok_or(IndexError::NoRecordAt { offset })?;
        Ok(Record {
            offset,
            key,
            line: line.to_owned(),
        })
    }
}
