//! Storage engine: pager, row codec, and the B+tree that holds the table.
//!
//! This crate provides:
//! - File header management (magic, page size, page count, root page)
//! - Page cache / buffer pool with LRU eviction over a file or memory backend
//! - Fixed-width row encoding
//! - A B+tree keyed by row id, with cursors for ordered scans
//!
//! Nothing here knows about the command language; see the `leafdb` crate.

pub mod backend;
pub mod btree;
pub mod config;
pub mod cursor;
pub mod error;
pub mod header;
pub mod node;
pub mod pager;
pub mod row;

pub use btree::BTree;
pub use config::{PagerConfig, TreeConfig};
pub use cursor::Cursor;
pub use error::{Result, StorageError};
pub use header::FileHeader;
pub use pager::{PageNum, Pager};
pub use row::Row;
