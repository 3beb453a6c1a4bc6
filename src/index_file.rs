//! Binary index file codec.
//!
//! Layout:
//!
//! ```text
//! [0..256)   record file base name, ASCII, right-padded with spaces
//! [256..)    repeated 16-byte entries: key (u64 BE) | offset (u64 BE)
//! ```
//!
//! Entries are written in leaf-chain order, so reading them back in file order
//! replays the inserts that produced every bucket.

use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::Path;

use tracing::debug;

use crate::error::{IndexError, Result};

/// Size of the file-name header.
pub const HEADER_LEN: usize = 256;
/// Size of one `(key, offset)` entry.
pub const ENTRY_LEN: usize = 16;

/// Decoded index file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexContents {
    /// Base name of the record file, relative to the index file's directory.
    pub source_name: String,
    pub entries: Vec<(u64, u64)>,
}

/// Checks that `name` can be stored in the header.
///
/// # Errors
///
/// Returns [`IndexError::SourceNameNotAscii`] or
/// [`IndexError::SourceNameTooLong`].
pub fn check_source_name(name: &str) -> Result<()> {
    if !name.is_ascii() {
        return Err(IndexError::SourceNameNotAscii { name: name.to_owned() });
    }
    if name.len() > HEADER_LEN {
        return Err(IndexError::SourceNameTooLong {
            name: name.to_owned(),
            max: HEADER_LEN,
        });
    }
    Ok(())
}

/// Writes the header and every entry, replacing `path`. Returns the number
/// of entries written.
///
/// # Errors
///
/// Returns a header validation error or [`IndexError::Io`].
pub fn write<I>(path: &Path, source_name: &str, entries: I) -> Result<usize>
where
    I: IntoIterator<Item = (u64, u64)>,
{
    check_source_name(source_name)?;

    let mut writer = BufWriter::new(File::create(path)?);
    let mut header = [b' '; HEADER_LEN];
    header[..source_name.len()].copy_from_slice(source_name.as_bytes());
    writer.write_all(&header)?;

    let mut written = 0;
    for (key, offset) in entries {
        writer.write_all(&key.to_be_bytes())?;
        writer.write_all(&offset.to_be_bytes())?;
        written += 1;
    }
    writer.flush()?;

    debug!(path = %path.display(), entries = written, "wrote index file");
    Ok(written)
}

/// Reads an index file to EOF.
///
/// # Errors
///
/// Returns [`IndexError::CorruptIndex`] if the header is short or not ASCII,
/// or if the payload is not a whole number of entries.
pub fn read(path: &Path) -> Result<IndexContents> {
    let bytes = fs::read(path)?;
    decode(&bytes)
}

fn decode(bytes: &[u8]) -> Result<IndexContents> {
    if bytes.len() < HEADER_LEN {
        return Err(IndexError::CorruptIndex {
            detail: format!("header is {} bytes, expected {HEADER_LEN}", bytes.len()),
        });
    }

    let (header, payload) = bytes.split_at(HEADER_LEN);
    if !header.is_ascii() {
        return Err(IndexError::CorruptIndex {
            detail: "header is not ASCII".to_owned(),
        });
    }
    let source_name = String::from_utf8_lossy(header).trim_end_matches(' ').to_owned();
    if source_name.is_empty() {
        return Err(IndexError::CorruptIndex {
            detail: "header names no record file".to_owned(),
        });
    }

    if payload.len() % ENTRY_LEN != 0 {
        return Err(IndexError::CorruptIndex {
            detail: format!("payload of {} bytes is not a multiple of {ENTRY_LEN}", payload.len()),
        });
    }

    let entries = payload
        .chunks_exact(ENTRY_LEN)
        .map(|entry| {
            let mut key = [0u8; 8];
            let mut offset = [0u8; 8];
            key.copy_from_slice(&entry[..8]);
            offset.copy_from_slice(&entry[8..]);
            (u64::from_be_bytes(key), u64::from_be_bytes(offset))
        })
        .collect();

    Ok(IndexContents { source_name, entries })
}
