//! B+tree keyed by u32 row id.
//!
//! Each tree is rooted at a specific page and uses the pager for all page
//! I/O. Nodes refer to each other by page number only: internal nodes hold
//! child pointers, every node holds a parent pointer, and leaves are chained
//! left to right through `next_leaf` for ordered scans. See [`crate::node`]
//! for the page layout.
//!
//! Inserts descend to the target leaf, then split bottom-up through parent
//! pointers. A root split allocates a new root page, so callers must read
//! [`BTree::root_page`] after inserting.

use std::fmt::Write as _;

use tracing::debug;

use crate::config::{TreeConfig, LEAF_NODE_CELL_SIZE, ROW_SIZE};
use crate::cursor::Cursor;
use crate::error::{Result, StorageError};
use crate::node::{self, leaf_cell, InternalNode, InternalNodeData, LeafNode, Node};
use crate::pager::{PageNum, Pager};
use crate::row::Row;

/// Deeper trees than this can only come from a corrupt (cyclic) page graph.
const MAX_TREE_DEPTH: usize = 64;

/// A B+tree handle, rooted at a given page.
pub struct BTree<'a> {
    pager: &'a mut Pager,
    root_page: PageNum,
    internal_capacity: usize,
}

impl<'a> BTree<'a> {
    /// Create a new B+tree handle. The `root_page` must already be allocated
    /// and initialized (see `create`).
    pub fn new(pager: &'a mut Pager, root_page: PageNum) -> Self {
        Self::with_config(pager, root_page, TreeConfig::default())
    }

    pub fn with_config(pager: &'a mut Pager, root_page: PageNum, config: TreeConfig) -> Self {
        let internal_capacity = config.internal_capacity(pager.page_size());
        Self {
            pager,
            root_page,
            internal_capacity,
        }
    }

    /// Allocate a new root page and initialize it as an empty leaf.
    pub fn create(pager: &mut Pager) -> Result<PageNum> {
        let page_num = pager.allocate_page()?;
        let mut root = LeafNode::init(pager.write_page(page_num)?);
        root.set_root(true);
        debug!(root = page_num, "created empty tree");
        Ok(page_num)
    }

    /// Returns the current root page number. This changes when the root splits.
    pub fn root_page(&self) -> PageNum {
        self.root_page
    }

    /// Descend to the leaf that holds (or would hold) `key` and return a
    /// cursor at the matching cell or at its insertion point.
    pub fn find(&mut self, key: u32) -> Result<Cursor<'_>> {
        let (leaf_page, cell_num) = self.locate(key)?;
        Cursor::at(self.pager, leaf_page, cell_num)
    }

    /// Cursor at the smallest key in the tree.
    pub fn start(&mut self) -> Result<Cursor<'_>> {
        let leaf_page = self.leftmost_leaf()?;
        Cursor::start(self.pager, leaf_page)
    }

    /// Like [`BTree::start`], but the cursor takes over this handle's borrow
    /// of the pager.
    pub fn into_cursor(mut self) -> Result<Cursor<'a>> {
        let leaf_page = self.leftmost_leaf()?;
        Cursor::start(self.pager, leaf_page)
    }

    /// Point lookup.
    pub fn get(&mut self, key: u32) -> Result<Option<Row>> {
        let (leaf_page, cell_num) = self.locate(key)?;
        let leaf = LeafNode::from_page(self.pager.read_page(leaf_page)?)?;
        if cell_num < leaf.num_cells() && leaf.key(cell_num) == key {
            return Row::decode(leaf.value(cell_num)).map(Some);
        }
        Ok(None)
    }

    /// Return all rows in key order.
    pub fn scan_all(&mut self) -> Result<Vec<Row>> {
        self.start()?.collect()
    }

    /// Insert an encoded row under `key`. Fails with `DuplicateKey` if the
    /// key is present and with `StorageFull` if the split would need more
    /// pages than the pager may allocate; in both cases nothing is written.
    pub fn insert(&mut self, key: u32, row: &[u8; ROW_SIZE]) -> Result<()> {
        let (leaf_page, cell_num) = self.locate(key)?;

        let is_full = {
            let leaf = LeafNode::from_page(self.pager.read_page(leaf_page)?)?;
            if cell_num < leaf.num_cells() && leaf.key(cell_num) == key {
                return Err(StorageError::DuplicateKey { key });
            }
            leaf.is_full()
        };

        if !is_full {
            let mut leaf = LeafNode::from_page(self.pager.write_page(leaf_page)?)?;
            leaf.insert_cell(cell_num, key, row);
            return Ok(());
        }

        let needed = self.pages_needed_for_split(leaf_page)?;
        if u64::from(self.pager.page_count()) + u64::from(needed) > u64::from(self.pager.max_pages())
        {
            return Err(StorageError::StorageFull {
                max_pages: self.pager.max_pages(),
            });
        }
        self.split_leaf_and_insert(leaf_page, cell_num, key, row)
    }

    /// Number of levels from the root to the leaves (1 for a lone leaf root).
    pub fn depth(&mut self) -> Result<usize> {
        let mut depth = 1;
        let mut page_num = self.root_page;
        loop {
            let child = match Node::parse(self.pager.read_page(page_num)?)? {
                Node::Leaf(_) => return Ok(depth),
                Node::Internal(internal) => internal.child(0),
            };
            depth += 1;
            if depth > MAX_TREE_DEPTH {
                return Err(StorageError::corrupt("tree deeper than any valid tree"));
            }
            page_num = child;
        }
    }

    /// Depth of every leaf, left to right. A balanced tree reports one value.
    pub fn leaf_depths(&mut self) -> Result<Vec<usize>> {
        let mut depths = Vec::new();
        let mut stack = vec![(self.root_page, 1usize)];
        while let Some((page_num, depth)) = stack.pop() {
            if depth > MAX_TREE_DEPTH {
                return Err(StorageError::corrupt("tree deeper than any valid tree"));
            }
            let children = match Node::parse(self.pager.read_page(page_num)?)? {
                Node::Leaf(_) => {
                    depths.push(depth);
                    continue;
                }
                Node::Internal(internal) => internal.to_data().children,
            };
            stack.extend(children.into_iter().rev().map(|child| (child, depth + 1)));
        }
        Ok(depths)
    }

    /// Human-readable dump of the whole tree, one node or key per line.
    pub fn render(&mut self) -> Result<String> {
        let mut out = String::new();
        self.render_node(self.root_page, 0, &mut out)?;
        Ok(out)
    }

    // ─── Internal helpers ────────────────────────────────────────────────

    /// Leaf page and cell index for `key`.
    fn locate(&mut self, key: u32) -> Result<(PageNum, usize)> {
        let mut page_num = self.root_page;
        for _ in 0..MAX_TREE_DEPTH {
            match Node::parse(self.pager.read_page(page_num)?)? {
                Node::Leaf(leaf) => {
                    let cell_num = leaf.search(key).unwrap_or_else(|idx| idx);
                    return Ok((page_num, cell_num));
                }
                Node::Internal(internal) => {
                    page_num = internal.child(internal.child_index(key));
                }
            }
        }
        Err(StorageError::corrupt("tree deeper than any valid tree"))
    }

    fn leftmost_leaf(&mut self) -> Result<PageNum> {
        let mut page_num = self.root_page;
        for _ in 0..MAX_TREE_DEPTH {
            match Node::parse(self.pager.read_page(page_num)?)? {
                Node::Leaf(_) => return Ok(page_num),
                Node::Internal(internal) => page_num = internal.child(0),
            }
        }
        Err(StorageError::corrupt("tree deeper than any valid tree"))
    }

    /// Pages a split starting at the full leaf `leaf_page` will allocate:
    /// one per full node on the path up, plus one for a new root.
    fn pages_needed_for_split(&mut self, leaf_page: PageNum) -> Result<u32> {
        let mut needed = 1;
        let mut current = leaf_page;
        for _ in 0..MAX_TREE_DEPTH {
            let (is_root, parent) = {
                let node = Node::parse(self.pager.read_page(current)?)?;
                (node.is_root(), node.parent())
            };
            if is_root {
                return Ok(needed + 1);
            }
            let parent_full = {
                let internal = InternalNode::from_page(self.pager.read_page(parent)?)?;
                internal.num_keys() >= self.internal_capacity
            };
            if !parent_full {
                return Ok(needed);
            }
            needed += 1;
            current = parent;
        }
        Err(StorageError::corrupt("parent chain longer than any valid tree"))
    }

    /// Split a full leaf around the new cell and hand the split key upward.
    fn split_leaf_and_insert(
        &mut self,
        page_num: PageNum,
        cell_num: usize,
        key: u32,
        row: &[u8; ROW_SIZE],
    ) -> Result<()> {
        let (mut cells, old_next_leaf, parent, was_root) = {
            let leaf = LeafNode::from_page(self.pager.read_page(page_num)?)?;
            (
                leaf.cells().to_vec(),
                leaf.next_leaf(),
                leaf.parent(),
                leaf.is_root(),
            )
        };
        let at = cell_num * LEAF_NODE_CELL_SIZE;
        cells.splice(at..at, leaf_cell(key, row));

        // Left keeps the larger half when the count is odd.
        let total = cells.len() / LEAF_NODE_CELL_SIZE;
        let left_count = total - total / 2;
        let (left_cells, right_cells) = cells.split_at(left_count * LEAF_NODE_CELL_SIZE);
        let split_key = {
            let last = (left_count - 1) * LEAF_NODE_CELL_SIZE;
            u32::from_be_bytes([
                left_cells[last],
                left_cells[last + 1],
                left_cells[last + 2],
                left_cells[last + 3],
            ])
        };

        let new_page = self.pager.allocate_page()?;
        {
            let mut right = LeafNode::init(self.pager.write_page(new_page)?);
            right.set_parent(parent);
            right.set_next_leaf(old_next_leaf);
            right.write_cells(right_cells);
        }
        {
            let mut left = LeafNode::from_page(self.pager.write_page(page_num)?)?;
            left.write_cells(left_cells);
            left.set_next_leaf(new_page);
        }

        debug!(
            left = page_num,
            right = new_page,
            split_key,
            left_cells = left_count,
            right_cells = total - left_count,
            "split leaf"
        );

        if was_root {
            self.create_new_root(page_num, split_key, new_page)
        } else {
            self.insert_into_parent(parent, page_num, split_key, new_page)
        }
    }

    /// Record `(split_key, right)` in `parent` next to `left`, splitting the
    /// parent if it overflows.
    fn insert_into_parent(
        &mut self,
        parent: PageNum,
        left: PageNum,
        split_key: u32,
        right: PageNum,
    ) -> Result<()> {
        let (mut data, grandparent, parent_is_root) = {
            let internal = InternalNode::from_page(self.pager.read_page(parent)?)?;
            (internal.to_data(), internal.parent(), internal.is_root())
        };
        let pos = data.children.iter().position(|&c| c == left).ok_or_else(|| {
            StorageError::corrupt(format!("page {left} is not a child of its parent {parent}"))
        })?;

        // `left` now ends at split_key; `right` takes over left's old bound.
        data.keys.insert(pos, split_key);
        data.children.insert(pos + 1, right);

        if data.keys.len() <= self.internal_capacity {
            InternalNode::from_page(self.pager.write_page(parent)?)?.write_data(&data);
            return Ok(());
        }

        let mid = data.keys.len() / 2;
        let promoted = data.keys[mid];
        let right_data = InternalNodeData {
            keys: data.keys[mid + 1..].to_vec(),
            children: data.children[mid + 1..].to_vec(),
        };
        let left_data = InternalNodeData {
            keys: data.keys[..mid].to_vec(),
            children: data.children[..=mid].to_vec(),
        };

        let new_page = self.pager.allocate_page()?;
        {
            let mut sibling = InternalNode::init(self.pager.write_page(new_page)?);
            sibling.set_parent(grandparent);
            sibling.write_data(&right_data);
        }
        InternalNode::from_page(self.pager.write_page(parent)?)?.write_data(&left_data);
        for &child in &right_data.children {
            node::set_parent(self.pager.write_page(child)?, new_page);
        }

        debug!(
            left = parent,
            right = new_page,
            promoted,
            left_keys = left_data.keys.len(),
            right_keys = right_data.keys.len(),
            "split internal node"
        );

        if parent_is_root {
            self.create_new_root(parent, promoted, new_page)
        } else {
            self.insert_into_parent(grandparent, parent, promoted, new_page)
        }
    }

    /// Put a fresh internal root above the two halves of the old root.
    fn create_new_root(&mut self, left: PageNum, split_key: u32, right: PageNum) -> Result<()> {
        let new_root = self.pager.allocate_page()?;
        {
            let mut root = InternalNode::init(self.pager.write_page(new_root)?);
            root.set_root(true);
            root.write_data(&InternalNodeData {
                keys: vec![split_key],
                children: vec![left, right],
            });
        }
        for child in [left, right] {
            let page = self.pager.write_page(child)?;
            node::set_root(page, false);
            node::set_parent(page, new_root);
        }

        debug!(old_root = left, new_root, split_key, "promoted new root");
        self.root_page = new_root;
        Ok(())
    }

    fn render_node(&mut self, page_num: PageNum, depth: usize, out: &mut String) -> Result<()> {
        let indent = "  ".repeat(depth);
        let data = match Node::parse(self.pager.read_page(page_num)?)? {
            Node::Leaf(leaf) => {
                let _ = writeln!(out, "{indent}- leaf (size {})", leaf.num_cells());
                for idx in 0..leaf.num_cells() {
                    let _ = writeln!(out, "{indent}  - {}", leaf.key(idx));
                }
                return Ok(());
            }
            Node::Internal(internal) => internal.to_data(),
        };

        if depth > MAX_TREE_DEPTH {
            return Err(StorageError::corrupt("tree deeper than any valid tree"));
        }
        let _ = writeln!(out, "{indent}- internal (size {})", data.keys.len());
        for (idx, &child) in data.children.iter().enumerate() {
            self.render_node(child, depth + 1, out)?;
            if let Some(key) = data.keys.get(idx) {
                let _ = writeln!(out, "{indent}  - key {key}");
            }
        }
        Ok(())
    }
}

// ─── Tests ──────────────────────────────────────────────────────────────────
