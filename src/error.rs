use std::path::PathBuf;

use thiserror::Error;

/// Primary error type for index operations.
///
/// The tree itself never fails: a missing key is reported through `Option` or
/// `bool`. These variants cover configuration, record parsing and the files
/// around the tree.
#[derive(Error, Debug)]
pub enum IndexError {
    // === Configuration ===
    /// The branching factor is too small to split.
    #[error("order must be at least 3, got {order}")]
    InvalidOrder { order: usize },

    // === Record validation ===
    /// A record line could not be split into `<key> <data>`.
    #[error("malformed record on line {line}: {reason}")]
    MalformedRecord { line: usize, reason: String },

    /// A key is not a decimal integer of at most `KEY_DIGITS` digits.
    #[error("invalid key '{key}': must be an integer of at most {max_digits} digits")]
    InvalidKey { key: String, max_digits: usize },

    /// Data passed to `insert` is not of the form `<id> <data>`.
    #[error("data must look like \"<id> <data>\", got '{input}'")]
    InvalidInsert { input: String },

    /// `list` was asked for zero records.
    #[error("count must be greater than 0")]
    ZeroCount,

    // === Files ===
    /// File I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The record file and the index file live in different directories.
    #[error("record file '{record}' and index file '{index}' must be in the same directory")]
    PathMismatch { record: PathBuf, index: PathBuf },

    /// The record file name does not fit in the index header.
    #[error("record file name '{name}' is longer than {max} bytes")]
    SourceNameTooLong { name: String, max: usize },

    /// The record file name cannot be stored in the ASCII header.
    #[error("record file name '{name}' is not ASCII")]
    SourceNameNotAscii { name: String },

    /// A record offset does not point at the start of a line.
    #[error("no record starts at offset {offset}")]
    NoRecordAt { offset: u64 },

    /// The index file is truncated or otherwise malformed.
    #[error("index file is malformed: {detail}")]
    CorruptIndex { detail: String },
}

/// Result type alias using [`IndexError`].
pub type Result<T> = std::result::Result<T, IndexError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn messages_name_the_offending_input() {
        let err = IndexError::InvalidKey {
            key: "12a".to_owned(),
            max_digits: 14,
        };
        assert_eq!(err.to_string(), "invalid key '12a': must be an integer of at most 14 digits");

        let err = IndexError::MalformedRecord {
            line: 3,
            reason: "missing data".to_owned(),
        };
        assert_eq!(err.to_string(), "malformed record on line 3: missing data");
    }

    #[test]
    fn io_errors_convert() {
        let io = std::io::Error::new(std::io::ErrorKind::NotFound, "gone");
        let err: IndexError = io.into();
        assert!(matches!(err, IndexError::Io(_)));
    }
}
