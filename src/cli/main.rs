//! # bpindex
//!
//! Command-line front end for a B+ tree index over a flat record file.
//!
//! ```text
//! bpindex -create <input> <index>
//! bpindex -find <index> <id>
//! bpindex -insert <index> "<id> <data>"
//! bpindex -list <index> <id> <count>
//! bpindex -delete <index> <id>
//! bpindex -graph <index>
//! ```
//!
//! Actions may be spelled with or without the leading dash. Usage mistakes
//! print help and exit with status 0; failures while working on the files
//! are logged and exit with status 1.

use std::ffi::{OsStr, OsString};
use std::fs;
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use anyhow::{Context, Result};
use bplus_index::config::DEFAULT_LOG_FILTER;
use bplus_index::{Config, IndexError, InsertOutcome, Record, RecordIndex};
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

const ACTIONS: [&str; 6] = ["create", "find", "insert", "list", "delete", "graph"];

#[derive(Parser, Debug)]
#[command(
    name = "bpindex",
    about = "B+ tree index over a flat file of `<id> <data>` records",
    version,
    override_usage = "bpindex -create <input> <index> | -find <index> <id> | -insert <index> \"<id> <data>\" | \
                      -list <index> <id> <count> | -delete <index> <id> | -graph <index>"
)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Build an index file over every record of an input file
    Create {
        /// Record file, one `<id> <data>` per line
        input: PathBuf,
        /// Index file to write; must be in the same directory as the input
        index: PathBuf,
    },
    /// Print every record stored under an id
    Find { index: PathBuf, id: u64 },
    /// Append a record and index it, unless its id already exists
    Insert {
        index: PathBuf,
        /// The record, quoted: "<id> <data>"
        data: String,
    },
    /// Print `count` records starting at the first id >= `id`
    List { index: PathBuf, id: u64, count: usize },
    /// Remove the newest record under an id
    Delete { index: PathBuf, id: u64 },
    /// Print the tree level by level and write Graphviz source to `<index>.gv`
    Graph { index: PathBuf },
}

fn main() -> ExitCode {
    let config = Config::from_env();
    init_logging(config.as_ref().map_or(DEFAULT_LOG_FILTER, |config| config.log_filter.as_str()));

    let config = match config {
        Ok(config) => config,
        Err(e) => {
            tracing::error!("Failed to load configuration: {e}");
            return ExitCode::FAILURE;
        }
    };

    let cli = match Cli::try_parse_from(normalize_args(std::env::args_os())) {
        Ok(cli) => cli,
        Err(e) => {
            // Help, version and usage mistakes all land here.
            let _ = e.print();
            return ExitCode::SUCCESS;
        }
    };

    match run(&cli.command, &config) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) if is_input_error(&err) => {
            eprintln!("{err}");
            ExitCode::SUCCESS
        }
        Err(err) => {
            tracing::error!("{err:#}");
            ExitCode::FAILURE
        }
    }
}

fn init_logging(filter: &str) {
    let filter = EnvFilter::try_new(filter).unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER));
    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}

/// Rewrites a leading `-create`-style action to its subcommand name.
fn normalize_args<I>(args: I) -> Vec<OsString>
where
    I: IntoIterator<Item = OsString>,
{
    let mut args: Vec<OsString> = args.into_iter().collect();
    if let Some(action) = args.get_mut(1) {
        if let Some(name) = action.to_str().and_then(|arg| arg.strip_prefix('-')) {
            let name = name.to_ascii_lowercase();
            if ACTIONS.contains(&name.as_str()) {
                *action = OsString::from(name);
            }
        }
    }
    args
}

/// Bad user input. Reported with a message and a zero exit status.
fn is_input_error(err: &anyhow::Error) -> bool {
    matches!(
        err.downcast_ref::<IndexError>(),
        Some(
            IndexError::InvalidInsert { .. }
                | IndexError::InvalidKey { .. }
                | IndexError::ZeroCount
                | IndexError::PathMismatch { .. }
                | IndexError::SourceNameTooLong { .. }
                | IndexError::SourceNameNotAscii { .. }
        )
    )
}

fn run(command: &Command, config: &Config) -> Result<()> {
    match command {
        Command::Create { input, index } => {
            let (_, report) = RecordIndex::create(input, index, config.order)?;
            println!("Records read: {}", report.records_read);
            println!("Pairs written: {}", report.pairs_written);
            println!("Index file created: {}", index.display());
        }
        Command::Find { index, id } => {
            let idx = open(index, config)?;
            match idx.find(*id)? {
                Some(records) => print_records(&records),
                None => println!("Key {id} not found."),
            }
        }
        Command::Insert { index, data } => {
            let mut idx = open(index, config)?;
            match idx.insert(data)? {
                InsertOutcome::Inserted { offset } => println!("Inserted at offset {offset}."),
                InsertOutcome::AlreadyExists => println!("Insert failed: key already exists."),
            }
        }
        Command::List { index, id, count } => {
            let idx = open(index, config)?;
            let records = idx.list(*id, *count)?;
            print_records(&records);
            if records.len() < *count {
                println!("Reached the end of the index after {} records.", records.len());
            }
        }
        Command::Delete { index, id } => {
            let mut idx = open(index, config)?;
            match idx.delete(*id)? {
                Some(record) => println!("Deleted: {record}"),
                None => println!("Key {id} does not exist."),
            }
        }
        Command::Graph { index } => {
            let idx = open(index, config)?;
            if idx.tree().is_empty() {
                println!("The index is empty.");
                return Ok(());
            }
            let graph = idx.graph();
            print!("{}", graph.levels);

            let dot_path = dot_path(index);
            fs::write(&dot_path, graph.dot).with_context(|| format!("writing {}", dot_path.display()))?;
            println!("Graphviz source written to {}", dot_path.display());
        }
    }
    Ok(())
}

fn open(index: &Path, config: &Config) -> Result<RecordIndex> {
    RecordIndex::open(index, config.order).with_context(|| format!("opening index {}", index.display()))
}

fn print_records(records: &[Record]) {
    for record in records {
        println!("({}) | {record}", record.offset);
    }
}

/// `<index>.gv`, keeping the index file's own extension.
fn dot_path(index: &Path) -> PathBuf {
    let mut path = index.as_os_str().to_owned();
    path.push(OsStr::new(".gv"));
    PathBuf::from(path)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(raw: &[&str]) -> Vec<OsString> {
        raw.iter().map(OsString::from).collect()
    }

    #[test]
    fn dashed_actions_become_subcommands() {
        let cli = Cli::try_parse_from(normalize_args(args(&["bpindex", "-LIST", "idx", "5", "3"]))).unwrap();
        assert!(matches!(cli.command, Command::List { id: 5, count: 3, .. }));

        let cli = Cli::try_parse_from(normalize_args(args(&["bpindex", "find", "idx", "7"]))).unwrap();
        assert!(matches!(cli.command, Command::Find { id: 7, .. }));
    }

    #[test]
    fn help_flags_are_left_alone() {
        assert_eq!(normalize_args(args(&["bpindex", "-h"])), args(&["bpindex", "-h"]));
    }

    #[test]
    fn wrong_arity_is_a_usage_error() {
        assert!(Cli::try_parse_from(normalize_args(args(&["bpindex", "-find", "idx"]))).is_err());
        assert!(Cli::try_parse_from(normalize_args(args(&["bpindex", "-graph", "idx", "extra"]))).is_err());
        assert!(Cli::try_parse_from(normalize_args(args(&["bpindex", "-bogus"]))).is_err());
    }

    #[test]
    fn dot_file_sits_next_to_index() {
        assert_eq!(dot_path(Path::new("dir/data.indx")), PathBuf::from("dir/data.indx.gv"));
    }

    #[test]
    fn validation_errors_are_not_failures() {
        assert!(is_input_error(&IndexError::ZeroCount.into()));
        let io = std::io::Error::other("disk on fire");
        assert!(!is_input_error(&IndexError::Io(io).into()));
    }
}
