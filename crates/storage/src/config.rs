//! Layout constants and runtime knobs for the storage engine.
//!
//! Constants that depend on each other live together here so a change to one
//! is checked against the others at compile time.
//!
//! ```text
//! DEFAULT_PAGE_SIZE (4096)
//!       │
//!       ├─> LEAF_NODE_MAX_CELLS      (page_size - LEAF_NODE_HEADER_SIZE) / LEAF_NODE_CELL_SIZE
//!       │       LEAF_NODE_CELL_SIZE = 4 (key) + ROW_SIZE
//!       │
//!       └─> INTERNAL_NODE_MAX_KEYS   (page_size - INTERNAL_NODE_HEADER_SIZE) / INTERNAL_NODE_CELL_SIZE
//!
//! USERNAME_MAX_LEN (32), EMAIL_MAX_LEN (255)
//!       │
//!       └─> ROW_SIZE = 4 (id) + (1 + 32) + (1 + 255) = 293
//! ```
//!
//! Invariants enforced below:
//!
//! 1. A leaf on the smallest supported page holds at least two cells, so a
//!    leaf split always leaves both halves non-empty.
//! 2. Every text length fits in the single length byte that precedes it.

use crate::error::{Result, StorageError};

/// Default page size in bytes.
pub const DEFAULT_PAGE_SIZE: u32 = 4096;
/// Smallest page size accepted by [`PagerConfig::validate`].
pub const MIN_PAGE_SIZE: u32 = 1024;
/// Largest page size accepted by [`PagerConfig::validate`].
pub const MAX_PAGE_SIZE: u32 = 65536;

/// Default number of frames in the buffer pool.
pub const DEFAULT_POOL_SIZE: usize = 256;
/// Default ceiling on the number of pages in one database.
pub const DEFAULT_MAX_PAGES: u32 = 1 << 20;

// ─── Row layout ──────────────────────────────────────────────────────────────

/// Maximum username length in bytes.
pub const USERNAME_MAX_LEN: usize = 32;
/// Maximum email length in bytes.
pub const EMAIL_MAX_LEN: usize = 255;

pub const ID_SIZE: usize = 4;
/// Length byte plus the fixed-capacity text area.
pub const USERNAME_SIZE: usize = 1 + USERNAME_MAX_LEN;
pub const EMAIL_SIZE: usize = 1 + EMAIL_MAX_LEN;
pub const ID_OFFSET: usize = 0;
pub const USERNAME_OFFSET: usize = ID_OFFSET + ID_SIZE;
pub const EMAIL_OFFSET: usize = USERNAME_OFFSET + USERNAME_SIZE;
/// Size of one encoded row.
pub const ROW_SIZE: usize = ID_SIZE + USERNAME_SIZE + EMAIL_SIZE;

// ─── Node layout ─────────────────────────────────────────────────────────────

pub const NODE_TYPE_OFFSET: usize = 0;
pub const IS_ROOT_OFFSET: usize = 1;
pub const PARENT_POINTER_OFFSET: usize = 2;
pub const COMMON_NODE_HEADER_SIZE: usize = 6;

pub const LEAF_NODE_NUM_CELLS_OFFSET: usize = COMMON_NODE_HEADER_SIZE;
pub const LEAF_NODE_NEXT_LEAF_OFFSET: usize = LEAF_NODE_NUM_CELLS_OFFSET + 4;
pub const LEAF_NODE_HEADER_SIZE: usize = LEAF_NODE_NEXT_LEAF_OFFSET + 4;
pub const LEAF_NODE_KEY_SIZE: usize = 4;
pub const LEAF_NODE_CELL_SIZE: usize = LEAF_NODE_KEY_SIZE + ROW_SIZE;

pub const INTERNAL_NODE_NUM_KEYS_OFFSET: usize = COMMON_NODE_HEADER_SIZE;
pub const INTERNAL_NODE_RIGHT_CHILD_OFFSET: usize = INTERNAL_NODE_NUM_KEYS_OFFSET + 4;
pub const INTERNAL_NODE_HEADER_SIZE: usize = INTERNAL_NODE_RIGHT_CHILD_OFFSET + 4;
/// Child pointer followed by separator key.
pub const INTERNAL_NODE_CELL_SIZE: usize = 8;
/// Lowest internal fan-out that still splits into two non-empty halves.
pub const MIN_INTERNAL_MAX_KEYS: usize = 2;

/// Number of leaf cells that fit in a page of `page_size` bytes.
pub const fn leaf_node_max_cells(page_size: usize) -> usize {
    (page_size - LEAF_NODE_HEADER_SIZE) / LEAF_NODE_CELL_SIZE
}

/// Number of separator keys that fit in an internal page of `page_size` bytes.
pub const fn internal_node_max_keys(page_size: usize) -> usize {
    (page_size - INTERNAL_NODE_HEADER_SIZE) / INTERNAL_NODE_CELL_SIZE
}

const _: () = assert!(leaf_node_max_cells(MIN_PAGE_SIZE as usize) >= 2);
const _: () = assert!(USERNAME_MAX_LEN <= u8::MAX as usize);
const _: () = assert!(EMAIL_MAX_LEN <= u8::MAX as usize);
const _: () = assert!(ROW_SIZE == 293);

/// Runtime settings for the pager.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PagerConfig {
    /// Page size for new databases. Existing files keep the size in their header.
    pub page_size: u32,
    /// Maximum number of cached frames.
    pub pool_size: usize,
    /// Allocation past this many pages fails with `StorageFull`.
    pub max_pages: u32,
}

impl Default for PagerConfig {
    fn default() -> Self {
        Self {
            page_size: DEFAULT_PAGE_SIZE,
            pool_size: DEFAULT_POOL_SIZE,
            max_pages: DEFAULT_MAX_PAGES,
        }
    }
}

impl PagerConfig {
    pub fn validate(&self) -> Result<()> {
        validate_page_size(self.page_size)?;
        if self.pool_size < 2 {
            return Err(StorageError::InvalidConfig(format!(
                "pool_size must be at least 2 (got {})",
                self.pool_size
            )));
        }
        if self.max_pages < 2 {
            return Err(StorageError::InvalidConfig(format!(
                "max_pages must be at least 2 (got {})",
                self.max_pages
            )));
        }
        Ok(())
    }
}

pub(crate) fn validate_page_size(page_size: u32) -> Result<()> {
    if !page_size.is_power_of_two() || !(MIN_PAGE_SIZE..=MAX_PAGE_SIZE).contains(&page_size) {
        return Err(StorageError::InvalidConfig(format!(
            "page_size must be a power of two in {MIN_PAGE_SIZE}..={MAX_PAGE_SIZE} (got {page_size})"
        )));
    }
    Ok(())
}

/// Runtime settings for the B+tree.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TreeConfig {
    /// Caps the separator keys per internal node below what the page can hold.
    /// Small values force internal splits on small tables.
    pub internal_max_keys: Option<usize>,
}

impl TreeConfig {
    /// Effective internal fan-out for a given page size.
    pub fn internal_capacity(&self, page_size: usize) -> usize {
        let physical = internal_node_max_keys(page_size);
        match self.internal_max_keys {
            Some(limit) => limit.clamp(MIN_INTERNAL_MAX_KEYS, physical),
            None => physical,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_page_capacities() {
        assert_eq!(leaf_node_max_cells(4096), 13);
        assert_eq!(internal_node_max_keys(4096), 510);
    }

    #[test]
    fn default_pager_config_is_valid() {
        PagerConfig::default().validate().unwrap();
    }

    #[test]
    fn rejects_odd_page_sizes() {
        for page_size in [0, 512, 1000, 131072] {
            let config = PagerConfig {
                page_size,
                ..PagerConfig::default()
            };
            assert!(matches!(
                config.validate(),
                Err(StorageError::InvalidConfig(_))
            ));
        }
    }

    #[test]
    fn internal_capacity_is_clamped() {
        let tree = TreeConfig {
            internal_max_keys: Some(0),
        };
        assert_eq!(tree.internal_capacity(4096), MIN_INTERNAL_MAX_KEYS);

        let tree = TreeConfig {
            internal_max_keys: Some(100_000),
        };
        assert_eq!(tree.internal_capacity(4096), 510);

        assert_eq!(TreeConfig::default().internal_capacity(1024), 126);
    }
}
