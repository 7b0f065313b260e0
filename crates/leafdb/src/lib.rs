/// Top-level integration crate for leafdb.
///
/// This crate provides a small embedded database API over a single table of
/// `(id, username, email)` rows stored in a pager-backed B+tree, plus the
/// line-oriented command loop in [`repl`].
use std::path::{Path, PathBuf};

use thiserror::Error;
use tracing::{debug, info, warn};

use leafdb_parser::ast::{InsertStatement, Statement};
use leafdb_parser::ParseError;
use leafdb_storage::pager::PageNum;
use leafdb_storage::{BTree, Cursor, Pager, PagerConfig, Row, StorageError, TreeConfig};

pub mod repl;

pub use leafdb_parser::{ast, parse};
pub use leafdb_storage as storage;

/// Any failure surfaced by the database API. The `Display` form is the
/// one-line message the command loop prints.
#[derive(Error, Debug)]
pub enum DbError {
    #[error(transparent)]
    Parse(#[from] ParseError),

    #[error(transparent)]
    Storage(#[from] StorageError),

    /// `.exit`, `.btree` and `.constants` act on the session, not the table,
    /// so [`Database::execute_line`] refuses them. [`repl::run`] handles them.
    #[error("'{0}' is a meta-command and cannot be executed as a statement.")]
    MetaCommand(String),
}

/// What a successfully executed statement produced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExecuteResult {
    Insert,
    Select(Vec<Row>),
}

/// Everything needed to open a database.
#[derive(Debug, Clone, Default)]
pub struct Config {
    /// Database file; `None` keeps everything in memory.
    pub path: Option<PathBuf>,
    pub pager: PagerConfig,
    pub tree: TreeConfig,
}

impl Config {
    pub fn file<P: AsRef<Path>>(path: P) -> Self {
        Self {
            path: Some(path.as_ref().to_path_buf()),
            ..Self::default()
        }
    }
}

pub struct Database {
    pager: Pager,
    tree_config: TreeConfig,
}

impl Database {
    /// Open or create a database file with default settings.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, DbError> {
        Self::open_with_config(Config::file(path))
    }

    /// Create an empty database that is discarded on exit.
    pub fn in_memory() -> Result<Self, DbError> {
        Self::open_with_config(Config::default())
    }

    pub fn open_with_config(config: Config) -> Result<Self, DbError> {
        let mut pager = match &config.path {
            Some(path) => Pager::open_with_config(path, config.pager)?,
            None => Pager::in_memory(config.pager)?,
        };

        if pager.root_page() == 0 {
            let root = BTree::create(&mut pager)?;
            pager.set_root_page(root);
            pager.flush_all()?;
        }

        info!(
            path = ?config.path,
            root_page = pager.root_page(),
            page_count = pager.page_count(),
            "database opened"
        );
        Ok(Self {
            pager,
            tree_config: config.tree,
        })
    }

    /// The single table every statement operates on.
    pub fn table(&mut self) -> Table<'_> {
        Table {
            pager: &mut self.pager,
            tree_config: self.tree_config,
        }
    }

    /// Run a parsed statement against the table.
    pub fn execute(&mut self, stmt: &Statement) -> Result<ExecuteResult, DbError> {
        match stmt {
            Statement::Insert(insert) => self.execute_insert(insert),
            Statement::Select => Ok(ExecuteResult::Select(self.table().select()?)),
        }
    }

    /// Parse and run one statement line. Meta-commands are rejected with
    /// [`DbError::MetaCommand`].
    pub fn execute_line(&mut self, line: &str) -> Result<ExecuteResult, DbError> {
        match parse(line)? {
            ast::Command::Statement(stmt) => self.execute(&stmt),
            ast::Command::Meta(_) => Err(DbError::MetaCommand(line.trim().to_string())),
        }
    }

    fn execute_insert(&mut self, stmt: &InsertStatement) -> Result<ExecuteResult, DbError> {
        let row = Row::new(stmt.id, stmt.username.as_str(), stmt.email.as_str())?;
        self.table().insert(&row)?;
        Ok(ExecuteResult::Insert)
    }

    /// Write every dirty page and the header back to the backing medium.
    pub fn close(&mut self) -> Result<(), DbError> {
        self.pager.flush_all()?;
        info!(page_count = self.pager.page_count(), "database closed");
        Ok(())
    }

    pub fn page_count(&self) -> u32 {
        self.pager.page_count()
    }

    pub fn root_page(&self) -> PageNum {
        self.pager.root_page()
    }

    pub fn page_size(&self) -> usize {
        self.pager.page_size()
    }
}

/// Handle on the table, borrowing the database's pager.
pub struct Table<'a> {
    pager: &'a mut Pager,
    tree_config: TreeConfig,
}

impl Table<'_> {
    fn tree(&mut self) -> BTree<'_> {
        let root = self.pager.root_page();
        BTree::with_config(self.pager, root, self.tree_config)
    }

    /// Store a row under its id. Rejected rows leave the table unchanged.
    pub fn insert(&mut self, row: &Row) -> Result<(), StorageError> {
        let bytes = row.to_bytes()?;
        let root = self.pager.root_page();
        let mut tree = BTree::with_config(self.pager, root, self.tree_config);

        if let Err(err) = tree.insert(row.id, &bytes) {
            match err {
                StorageError::DuplicateKey { .. } | StorageError::ValueTooLong { .. } => {
                    debug!(id = row.id, error = %err, "insert rejected");
                }
                _ => warn!(id = row.id, error = %err, "insert failed"),
            }
            return Err(err);
        }
        let new_root = tree.root_page();
        if new_root != root {
            self.pager.set_root_page(new_root);
        }
        Ok(())
    }

    /// Every row in ascending id order.
    pub fn select(&mut self) -> Result<Vec<Row>, StorageError> {
        self.tree().scan_all()
    }

    /// Cursor at the first row, for incremental scans.
    pub fn scan(&mut self) -> Result<Cursor<'_>, StorageError> {
        let root = self.pager.root_page();
        BTree::with_config(self.pager, root, self.tree_config).into_cursor()
    }

    pub fn get(&mut self, id: u32) -> Result<Option<Row>, StorageError> {
        self.tree().get(id)
    }

    /// Indented dump of the tree shape.
    pub fn render(&mut self) -> Result<String, StorageError> {
        self.tree().render()
    }

    pub fn depth(&mut self) -> Result<usize, StorageError> {
        self.tree().depth()
    }
}
