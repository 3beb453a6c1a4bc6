//! An arena-backed B+ tree and the flat-file secondary index built on it.
//!
//! [`BPlusTree`] is an ordered multimap: every key holds a bucket of values in
//! insertion order. Nodes split when they reach the branching factor and
//! borrow from or merge with a sibling when they fall below half full. Leaves
//! are linked in both directions for ordered scans.
//!
//! [`RecordIndex`] keeps a `BPlusTree<u64, u64>` from record keys to byte
//! offsets in a text file of `<key> <data>` lines, and persists it as a
//! compact binary index file.
//!
//! # Example
//!
//! ```
//! use bplus_index::{BPlusTree, Order};
//!
//! let mut tree = BPlusTree::new(Order::new(3).unwrap());
//! for (key, label) in [(13, "November"), (0, "_"), (7, "Hotel"), (2, "Bravo"), (2, "Bravo2")] {
//!     tree.insert(key, label);
//! }
//!
//! assert_eq!(tree.retrieve(&2), Some(&["Bravo", "Bravo2"][..]));
//!
//! let ascending: Vec<_> = tree.iter().map(|(k, _)| *k).collect();
//! assert_eq!(ascending, [0, 2, 7, 13]);
//!
//! let from_five: Vec<_> = tree.iter_from(&5).map(|(k, _)| *k).collect();
//! assert_eq!(from_five, [7, 13]);
//!
//! tree.validate();
//! ```
//!
//! # Implementation
//!
//! Nodes are stored in an arena and addressed by 32-bit handles. Parent and
//! sibling links are plain handles, so the structure needs no reference
//! counting and no unsafe code.

#![forbid(unsafe_code)]
#![forbid(keyword_idents)]
#![forbid(non_ascii_idents)]
#![forbid(unreachable_pub)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
// Enable coverage attributes for nightly builds.
#![cfg_attr(coverage_nightly, feature(coverage_attribute))]

mod error;
mod index;
mod order;
mod raw;

pub mod bplus_tree;
pub mod config;
pub mod graph;
pub mod index_file;
pub mod record_store;

pub use bplus_tree::{BPlusTree, LeafRef};
pub use config::{Config, ConfigError};
pub use error::{IndexError, Result};
pub use index::{CreateReport, GraphText, InsertOutcome, RecordIndex};
pub use order::Order;
pub use record_store::Record;
