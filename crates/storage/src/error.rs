use thiserror::Error;

use crate::pager::PageNum;

/// Errors raised by the pager, the row codec and the B+tree.
///
/// The `Display` strings double as the user-facing messages printed by the
/// command loop, so they stay short and stable.
#[derive(Error, Debug)]
pub enum StorageError {
    /// Insert of an id that is already stored. The tree is left untouched.
    #[error("Error: Duplicate key.")]
    DuplicateKey { key: u32 },

    /// A text field is longer than its fixed capacity.
    #[error("String is too long.")]
    ValueTooLong {
        field: &'static str,
        len: usize,
        max: usize,
    },

    /// The configured page ceiling was reached.
    #[error("Error: Table full.")]
    StorageFull { max_pages: u32 },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// On-disk bytes do not describe a valid database.
    #[error("database file is malformed: {detail}")]
    Corrupt { detail: String },

    /// A page number outside the allocated range was requested.
    #[error("page {page} out of range (page_count={page_count})")]
    PageOutOfRange { page: PageNum, page_count: u32 },

    /// A cursor was dereferenced past the end of the table.
    #[error("cursor is past the end of the table")]
    OutOfRange,

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
}

impl StorageError {
    pub(crate) fn corrupt(detail: impl Into<String>) -> Self {
        Self::Corrupt {
            detail: detail.into(),
        }
    }
}

pub type Result<T> = std::result::Result<T, StorageError>;
