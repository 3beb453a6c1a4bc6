use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;

use bplus_index::{IndexError, InsertOutcome, Order, RecordIndex};
use pretty_assertions::assert_eq;
use tempfile::TempDir;

const RECORDS: &str = "\
13 November
0 _
7 Hotel
8 India
5 Echo
6 Golf
4 Delta
1 Alpha
2 Bravo
3 Charlie
9 Juliet
2 Bravo2
10 Kilo
11 Lima
12 Mike
17 Romeo
14 Oscar
15 Papa
16 Quebec
";

struct Fixture {
    _dir: TempDir,
    input: PathBuf,
    index: PathBuf,
}

fn fixture() -> Fixture {
    let dir = tempfile::tempdir().unwrap();
    let input = dir.path().join("phonetic.txt");
    let index = dir.path().join("phonetic.indx");
    fs::write(&input, RECORDS).unwrap();
    Fixture { _dir: dir, input, index }
}

fn created(fx: &Fixture) -> RecordIndex {
    RecordIndex::create(&fx.input, &fx.index, Order::DEFAULT).unwrap().0
}

fn reopen(fx: &Fixture) -> RecordIndex {
    let idx = RecordIndex::open(&fx.index, Order::DEFAULT).unwrap();
    idx.tree().validate();
    idx
}

fn data_of(records: &[bplus_index::Record]) -> Vec<&str> {
    records.iter().map(bplus_index::Record::data).collect()
}

#[test]
fn list_walks_keys_then_duplicates() {
    let fx = fixture();
    let idx = created(&fx);

    let records = idx.list(1, 4).unwrap();
    assert_eq!(data_of(&records), ["Alpha", "Bravo", "Bravo2", "Charlie"]);

    let tail = idx.list(16, 10).unwrap();
    assert_eq!(data_of(&tail), ["Quebec", "Romeo"]);

    assert!(idx.list(18, 3).unwrap().is_empty());
    assert!(matches!(idx.list(0, 0), Err(IndexError::ZeroCount)));
}

#[test]
fn insert_persists_across_reopen() {
    let fx = fixture();
    let mut idx = created(&fx);

    let before = fs::metadata(&fx.input).unwrap().len();
    assert_eq!(idx.insert("42 Answer").unwrap(), InsertOutcome::Inserted { offset: before });
    assert_eq!(idx.insert("13 Duplicate").unwrap(), InsertOutcome::AlreadyExists);
    assert!(matches!(idx.insert("no-space"), Err(IndexError::InvalidInsert { .. })));
    assert!(matches!(idx.insert("4x2 data"), Err(IndexError::InvalidKey { .. })));

    let idx = reopen(&fx);
    let found = idx.find(42).unwrap().unwrap();
    assert_eq!(found[0].key, 42);
    assert_eq!(found[0].line, "00000000000042 Answer");
    assert_eq!(idx.tree().key_count(), 19);
}

#[test]
fn delete_shifts_later_offsets() {
    let fx = fixture();
    let mut idx = created(&fx);

    let removed = idx.delete(2).unwrap().unwrap();
    assert_eq!(removed.line, "2 Bravo2");
    assert!(idx.delete(99).unwrap().is_none());

    // Every surviving record is still reachable at its shifted offset.
    for key in 0..=17 {
        let records = idx.find(key).unwrap().unwrap();
        assert!(records.iter().all(|r| r.key == key));
    }

    let idx = reopen(&fx);
    assert_eq!(data_of(&idx.find(2).unwrap().unwrap()), ["Bravo"]);
    assert!(!fs::read_to_string(&fx.input).unwrap().contains("Bravo2"));
}

#[test]
fn delete_everything_leaves_header_only() {
    let fx = fixture();
    let mut idx = created(&fx);

    for key in [6, 2, 2, 1, 4, 8, 10, 2, 3, 0, 14, 11, 9, 7, 12, 5, 13, 15, 17, 16] {
        idx.delete(key).unwrap();
        idx.tree().validate();
    }

    assert!(idx.tree().is_empty());
    assert_eq!(fs::metadata(&fx.index).unwrap().len(), bplus_index::index_file::HEADER_LEN as u64);
    assert_eq!(fs::read_to_string(&fx.input).unwrap(), "");
    assert!(reopen(&fx).tree().is_empty());
}

#[test]
fn graph_names_every_node() {
    let fx = fixture();
    let idx = created(&fx);
    let graph = idx.graph();

    assert_eq!(graph.levels.lines().count(), idx.tree().node_count());
    assert!(graph.levels.starts_with("0 "));
    assert!(graph.dot.starts_with("digraph \"phonetic\" {"));
    assert!(graph.dot.trim_end().ends_with('}'));
}

// ─── Command line ────────────────────────────────────────────────────────────

fn bpindex(args: &[&Path]) -> std::process::Output {
    Command::new(env!("CARGO_BIN_EXE_bpindex"))
        .args(args)
        .env_remove("BPINDEX_ORDER")
        .env("BPINDEX_LOG", "off")
        .output()
        .unwrap()
}

#[test]
fn cli_create_find_and_graph() {
    let fx = fixture();

    let out = bpindex(&[Path::new("-create"), &fx.input, &fx.index]);
    assert!(out.status.success());
    let stdout = String::from_utf8(out.stdout).unwrap();
    assert!(stdout.contains("Records read: 19"));
    assert!(stdout.contains("Pairs written: 19"));

    let out = bpindex(&[Path::new("-find"), &fx.index, Path::new("2")]);
    assert!(out.status.success());
    let stdout = String::from_utf8(out.stdout).unwrap();
    assert!(stdout.contains("2 Bravo\n"));
    assert!(stdout.contains("2 Bravo2\n"));

    let out = bpindex(&[Path::new("graph"), &fx.index]);
    assert!(out.status.success());
    let mut dot = fx.index.clone().into_os_string();
    dot.push(".gv");
    assert!(fs::read_to_string(dot).unwrap().starts_with("digraph \"phonetic\" {"));
}

#[test]
fn cli_usage_errors_exit_cleanly() {
    let fx = fixture();

    // A missing index file is a real failure.
    let out = bpindex(&[Path::new("-find"), &fx.index, Path::new("1")]);
    assert!(!out.status.success());

    assert!(bpindex(&[Path::new("-create"), &fx.input, &fx.index]).status.success());

    let out = bpindex(&[Path::new("-find"), &fx.index]);
    assert!(out.status.success());
    assert!(out.stdout.is_empty());

    let out = bpindex(&[Path::new("-list"), &fx.index, Path::new("1"), Path::new("0")]);
    assert!(out.status.success());
    assert!(out.stdout.is_empty());
}
