//! [`RecordIndex`]: a [`BPlusTree`] of record offsets kept in sync with a
//! record file and its on-disk index.

use std::path::{Path, PathBuf};

use tracing::{debug, info, warn};

use crate::bplus_tree::BPlusTree;
use crate::error::{IndexError, Result};
use crate::graph::{Dot, LevelDump};
use crate::index_file;
use crate::order::Order;
use crate::record_store::{self, Record, RecordStore};

/// Totals from [`RecordIndex::create`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CreateReport {
    pub records_read: usize,
    pub pairs_written: usize,
}

/// Result of [`RecordIndex::insert`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InsertOutcome {
    /// The record was appended at `offset`.
    Inserted { offset: u64 },
    /// The key is already indexed; nothing was written.
    AlreadyExists,
}

/// Text renderings returned by [`RecordIndex::graph`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GraphText {
    /// One line per node, breadth first.
    pub levels: String,
    /// Graphviz source.
    pub dot: String,
}

/// A secondary index from record keys to byte offsets in a record file.
///
/// The tree is rebuilt from the index file on [`open`](Self::open) and the
/// index file is rewritten in full after every change.
#[derive(Debug)]
pub struct RecordIndex {
    tree: BPlusTree<u64, u64>,
    index_path: PathBuf,
    source_name: String,
    store: RecordStore,
}

impl RecordIndex {
    /// Builds an index over every record in `input` and writes it to `index`.
    ///
    /// # Errors
    ///
    /// Returns [`IndexError::PathMismatch`] if the two files are in different
    /// directories, a header error if the input file name cannot be stored, a
    /// record error for a malformed line, or [`IndexError::Io`].
    pub fn create(input: &Path, index: &Path, order: Order) -> Result<(Self, CreateReport)> {
        if input.parent() != index.parent() {
            return Err(IndexError::PathMismatch {
                record: input.to_path_buf(),
                index: index.to_path_buf(),
            });
        }
        let source_name = Self::source_name(input)?;
        index_file::check_source_name(&source_name)?;

        let store = RecordStore::new(input);
        let records = store.scan()?;
        let mut tree = BPlusTree::new(order);
        for record in &records {
            tree.insert(record.key, record.offset);
        }

        let this = Self {
            tree,
            index_path: index.to_path_buf(),
            source_name,
            store,
        };
        let pairs_written = this.save()?;
        let report = CreateReport {
            records_read: records.len(),
            pairs_written,
        };

        info!(
            input = %input.display(),
            index = %index.display(),
            records_read = report.records_read,
            pairs_written = report.pairs_written,
            "index created"
        );
        Ok((this, report))
    }

    /// Loads an index file and rebuilds its tree.
    ///
    /// A missing record file is logged, not returned: the index itself is
    /// still readable.
    ///
    /// # Errors
    ///
    /// Returns [`IndexError::CorruptIndex`] or [`IndexError::Io`].
    pub fn open(index: &Path, order: Order) -> Result<Self> {
        let contents = index_file::read(index)?;
        let record_path = index.parent().unwrap_or_else(|| Path::new("")).join(&contents.source_name);
        let store = RecordStore::new(record_path);
        if !store.exists() {
            warn!(record_file = %store.path().display(), "index refers to a missing record file");
        }

        let mut tree = BPlusTree::new(order);
        for &(key, offset) in &contents.entries {
            tree.insert(key, offset);
        }
        debug!(
            index = %index.display(),
            keys = tree.key_count(),
            values = tree.len(),
            height = tree.height(),
            "rebuilt tree"
        );

        Ok(Self {
            tree,
            index_path: index.to_path_buf(),
            source_name: contents.source_name,
            store,
        })
    }

    #[must_use]
    pub fn tree(&self) -> &BPlusTree<u64, u64> {
        &self.tree
    }

    #[must_use]
    pub fn index_path(&self) -> &Path {
        &self.index_path
    }

    #[must_use]
    pub fn record_path(&self) -> &Path {
        self.store.path()
    }

    /// Every record stored under `key`, oldest first.
    ///
    /// # Errors
    ///
    /// Returns [`IndexError::NoRecordAt`] if an indexed offset no longer
    /// points at a record, or [`IndexError::Io`].
    pub fn find(&self, key: u64) -> Result<Option<Vec<Record>>> {
        let Some(offsets) = self.tree.retrieve(&key) else {
            return Ok(None);
        };
        let records = offsets.iter().map(|&offset| self.store.read_at(offset)).collect::<Result<Vec<_>>>()?;
        Ok(Some(records))
    }

    /// Appends `"<id> <data>"` to the record file and indexes it, unless the
    /// key is already present.
    ///
    /// # Errors
    ///
    /// Returns [`IndexError::InvalidInsert`] or [`IndexError::InvalidKey`] for
    /// bad input, or [`IndexError::Io`].
    pub fn insert(&mut self, input: &str) -> Result<InsertOutcome> {
        let Some((key_text, data)) = record_store::split_record(input) else {
            return Err(IndexError::InvalidInsert { input: input.to_owned() });
        };
        let key = record_store::parse_key(key_text)?;

        if self.tree.contains_key(&key) {
            debug!(key, "insert refused, key exists");
            return Ok(InsertOutcome::AlreadyExists);
        }

        let offset = self.store.append(key, data)?;
        self.tree.insert(key, offset);
        self.save()?;

        info!(key, offset, "record inserted");
        Ok(InsertOutcome::Inserted { offset })
    }

    /// The first `count` records with key `>= key`, in key order and then
    /// insertion order. Fewer are returned when the index runs out.
    ///
    /// # Errors
    ///
    /// Returns [`IndexError::ZeroCount`] if `count` is zero, or a read error.
    pub fn list(&self, key: u64, count: usize) -> Result<Vec<Record>> {
        if count == 0 {
            return Err(IndexError::ZeroCount);
        }
        self.tree
            .iter_from(&key)
            .flat_map(|(_, offsets)| offsets.iter())
            .take(count)
            .map(|&offset| self.store.read_at(offset))
            .collect()
    }

    /// Removes the newest record under `key` from the record file and the
    /// index, and returns it.
    ///
    /// Offsets past the removed line are shifted down in place; the tree is
    /// not rebuilt.
    ///
    /// # Errors
    ///
    /// Returns [`IndexError::NoRecordAt`] if the indexed offset is stale, or
    /// [`IndexError::Io`].
    pub fn delete(&mut self, key: u64) -> Result<Option<Record>> {
        let Some(&offset) = self.tree.retrieve(&key).and_then(<[u64]>::last) else {
            return Ok(None);
        };

        // The tree only changes once the record file has.
        let (record, removed) = self.store.remove_at(offset)?;
        self.tree.remove_latest(&key);
        self.tree.for_each_value_mut(|_, stored| {
            if *stored > offset {
                *stored -= removed;
            }
        });
        self.save()?;

        info!(key, offset, removed, "record deleted");
        Ok(Some(record))
    }

    /// The level dump and Graphviz source of the current tree. The graph is
    /// named after the index file.
    #[must_use]
    pub fn graph(&self) -> GraphText {
        let name = self.index_path.file_stem().and_then(|stem| stem.to_str()).unwrap_or("bplustree");
        GraphText {
            levels: LevelDump::new(&self.tree).to_string(),
            dot: Dot::new(&self.tree, name).to_string(),
        }
    }

    /// Rewrites the index file from the tree.
    fn save(&self) -> Result<usize> {
        let pairs = self.tree.pairs().map(|(&key, &offset)| (key, offset));
        index_file::write(&self.index_path, &self.source_name, pairs)
    }

    fn source_name(input: &Path) -> Result<String> {
        let name = input.file_name().unwrap_or_default();
        name.to_str().map(str::to_owned).ok_or_else(|| IndexError::SourceNameNotAscii {
            name: name.to_string_lossy().into_owned(),
        })
    }
}

#[cfg(test)]
mod tests {
    use std::fs;

    use super::*;
    use pretty_assertions::assert_eq;
    use test_log::test;

    fn setup(records: &str) -> (tempfile::TempDir, PathBuf, PathBuf) {
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("records.txt");
        let index = dir.path().join("records.indx");
        fs::write(&input, records).unwrap();
        (dir, input, index)
    }

    #[test]
    fn create_then_open_round_trips() {
        let (_dir, input, index) = setup("13 November\n0 _\n2 Bravo\n2 Bravo2\n");
        let (created, report) = RecordIndex::create(&input, &index, Order::DEFAULT).unwrap();
        assert_eq!(report, CreateReport { records_read: 4, pairs_written: 4 });

        let opened = RecordIndex::open(&index, Order::DEFAULT).unwrap();
        assert_eq!(opened.record_path(), input);
        let created_pairs: Vec<_> = created.tree().pairs().collect();
        let opened_pairs: Vec<_> = opened.tree().pairs().collect();
        assert_eq!(created_pairs, opened_pairs);

        let bravo: Vec<_> = opened.find(2).unwrap().unwrap().into_iter().map(|r| r.line).collect();
        assert_eq!(bravo, ["2 Bravo", "2 Bravo2"]);
        assert_eq!(opened.find(0).unwrap().unwrap()[0].data(), "_");
        assert!(opened.find(99).unwrap().is_none());
    }

    #[test]
    fn create_requires_shared_directory() {
        let (dir, input, _) = setup("1 a\n");
        let elsewhere = dir.path().join("sub").join("records.indx");
        let err = RecordIndex::create(&input, &elsewhere, Order::DEFAULT).unwrap_err();
        assert!(matches!(err, IndexError::PathMismatch { .. }));
    }

    #[test]
    fn insert_refuses_existing_keys() {
        let (_dir, input, index) = setup("1 Alpha\n");
        let (mut idx, _) = RecordIndex::create(&input, &index, Order::DEFAULT).unwrap();

        assert_eq!(idx.insert("1 Again").unwrap(), InsertOutcome::AlreadyExists);
        let outcome = idx.insert("5 Echo").unwrap();
        assert_eq!(outcome, InsertOutcome::Inserted { offset: 8 });
        assert!(matches!(idx.insert("nope"), Err(IndexError::InvalidInsert { .. })));
        assert!(matches!(idx.insert("x5 Echo"), Err(IndexError::InvalidKey { .. })));

        let reopened = RecordIndex::open(&index, Order::DEFAULT).unwrap();
        assert_eq!(reopened.find(5).unwrap().unwrap()[0].line, "00000000000005 Echo");
    }

    #[test]
    fn list_walks_forward_from_key() {
        let (_dir, input, index) = setup("10 a\n20 b\n30 c\n30 c2\n40 d\n");
        let (idx, _) = RecordIndex::create(&input, &index, Order::new(3).unwrap()).unwrap();

        let keys: Vec<_> = idx.list(25, 3).unwrap().into_iter().map(|r| r.line).collect();
        assert_eq!(keys, ["30 c", "30 c2", "40 d"]);
        assert!(idx.list(41, 5).unwrap().is_empty());
        assert_eq!(idx.list(0, 100).unwrap().len(), 5);
        assert!(matches!(idx.list(0, 0), Err(IndexError::ZeroCount)));
    }

    #[test]
    fn delete_shifts_later_offsets() {
        let (_dir, input, index) = setup("1 Alpha\n2 Bravo\n3 Charlie\n2 Bravo2\n");
        let (mut idx, _) = RecordIndex::create(&input, &index, Order::DEFAULT).unwrap();

        let removed = idx.delete(2).unwrap().unwrap();
        assert_eq!(removed.line, "2 Bravo2");
        let removed = idx.delete(1).unwrap().unwrap();
        assert_eq!(removed.line, "1 Alpha");
        assert!(idx.delete(1).unwrap().is_none());

        assert_eq!(fs::read_to_string(&input).unwrap(), "2 Bravo\n3 Charlie\n");
        let reopened = RecordIndex::open(&index, Order::DEFAULT).unwrap();
        assert_eq!(reopened.find(3).unwrap().unwrap()[0].offset, 8);
        assert_eq!(reopened.find(2).unwrap().unwrap()[0].line, "2 Bravo");
        reopened.tree().validate();
    }

    #[test]
    fn failed_delete_keeps_tree_and_files() {
        let (_dir, input, index) = setup("1 Alpha\n2 Bravo\n");
        let (mut idx, _) = RecordIndex::create(&input, &index, Order::DEFAULT).unwrap();
        let saved = fs::read(&index).unwrap();

        // Offset 8 no longer starts a line.
        fs::write(&input, "1 Alphabet\n2 Bravo\n").unwrap();
        assert!(matches!(idx.delete(2), Err(IndexError::NoRecordAt { offset: 8 })));

        assert_eq!(idx.tree().retrieve(&2), Some(&[8][..]));
        assert_eq!(idx.tree().len(), 2);
        idx.tree().validate();
        assert_eq!(fs::read(&index).unwrap(), saved);
        assert_eq!(fs::read_to_string(&input).unwrap(), "1 Alphabet\n2 Bravo\n");
    }

    #[test]
    fn open_tolerates_missing_record_file() {
        let (_dir, input, index) = setup("1 Alpha\n");
        RecordIndex::create(&input, &index, Order::DEFAULT).unwrap();
        fs::remove_file(&input).unwrap();

        let idx = RecordIndex::open(&index, Order::DEFAULT).unwrap();
        assert_eq!(idx.tree().len(), 1);
        assert!(matches!(idx.find(1), Err(IndexError::Io(_))));
    }

    #[test]
    fn graph_names_dot_after_index() {
        let (_dir, input, index) = setup("1 a\n2 b\n");
        let (idx, _) = RecordIndex::create(&input, &index, Order::DEFAULT).unwrap();
        let graph = idx.graph();
        assert!(graph.dot.starts_with("digraph \"records\" {"));
        assert_eq!(graph.levels.lines().count(), 1);
    }
}
