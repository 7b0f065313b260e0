//! B+tree node layout.
//!
//! Every tree page holds one node. The byte at offset 0 selects how the rest
//! of the page is read.
//!
//! ### Common header (6 bytes)
//! ```text
//! [0]     node_type: u8 (1 = internal, 2 = leaf)
//! [1]     is_root: u8
//! [2..6]  parent: u32 (page number, 0 for the root)
//! ```
//!
//! ### Leaf
//! ```text
//! [6..10]   num_cells: u32
//! [10..14]  next_leaf: u32 (0 = rightmost leaf)
//! [14..]    cells: key u32 + row (ROW_SIZE bytes), sorted by key
//! ```
//!
//! ### Internal
//! ```text
//! [6..10]   num_keys: u32
//! [10..14]  right_child: u32
//! [14..]    cells: child u32 + key u32
//! ```
//! Every key under `child(i)` is `<= key(i)` and `> key(i - 1)`; the right
//! child holds everything above the last key.
//!
//! All integers are big-endian.

use crate::config::{
    internal_node_max_keys, leaf_node_max_cells, INTERNAL_NODE_CELL_SIZE,
    INTERNAL_NODE_HEADER_SIZE, INTERNAL_NODE_NUM_KEYS_OFFSET, INTERNAL_NODE_RIGHT_CHILD_OFFSET,
    IS_ROOT_OFFSET, LEAF_NODE_CELL_SIZE, LEAF_NODE_HEADER_SIZE, LEAF_NODE_KEY_SIZE,
    LEAF_NODE_NEXT_LEAF_OFFSET, LEAF_NODE_NUM_CELLS_OFFSET, NODE_TYPE_OFFSET,
    PARENT_POINTER_OFFSET,
};
use crate::error::{Result, StorageError};
use crate::pager::PageNum;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum NodeType {
    Internal = 1,
    Leaf = 2,
}

impl TryFrom<u8> for NodeType {
    type Error = StorageError;

    fn try_from(tag: u8) -> Result<Self> {
        match tag {
            1 => Ok(Self::Internal),
            2 => Ok(Self::Leaf),
            other => Err(StorageError::corrupt(format!("unknown node type: {other}"))),
        }
    }
}

/// A page interpreted as a tree node.
pub enum Node<'a> {
    Leaf(LeafNode<&'a [u8]>),
    Internal(InternalNode<&'a [u8]>),
}

impl<'a> Node<'a> {
    pub fn parse(page: &'a [u8]) -> Result<Self> {
        match NodeType::try_from(page[NODE_TYPE_OFFSET])? {
            NodeType::Leaf => LeafNode::from_page(page).map(Node::Leaf),
            NodeType::Internal => InternalNode::from_page(page).map(Node::Internal),
        }
    }

    pub fn node_type(&self) -> NodeType {
        match self {
            Node::Leaf(_) => NodeType::Leaf,
            Node::Internal(_) => NodeType::Internal,
        }
    }

    pub fn parent(&self) -> PageNum {
        match self {
            Node::Leaf(leaf) => leaf.parent(),
            Node::Internal(internal) => internal.parent(),
        }
    }

    pub fn is_root(&self) -> bool {
        match self {
            Node::Leaf(leaf) => leaf.is_root(),
            Node::Internal(internal) => internal.is_root(),
        }
    }

    /// Largest key stored anywhere in this node's own cells.
    pub fn max_key(&self) -> Option<u32> {
        match self {
            Node::Leaf(leaf) => leaf.max_key(),
            Node::Internal(internal) => internal.max_key(),
        }
    }
}

/// Rewrite the parent pointer of whatever node lives in `page`.
pub fn set_parent(page: &mut [u8], parent: PageNum) {
    set_u32(page, PARENT_POINTER_OFFSET, parent);
}

/// Set or clear the root flag of whatever node lives in `page`.
pub fn set_root(page: &mut [u8], is_root: bool) {
    page[IS_ROOT_OFFSET] = u8::from(is_root);
}

// ─── Leaf ────────────────────────────────────────────────────────────────────

pub struct LeafNode<B> {
    buf: B,
}

impl<B: AsRef<[u8]>> LeafNode<B> {
    /// View an existing leaf page, checking its tag and cell count.
    pub fn from_page(buf: B) -> Result<Self> {
        let node = Self { buf };
        let page = node.buf.as_ref();
        if page[NODE_TYPE_OFFSET] != NodeType::Leaf as u8 {
            return Err(StorageError::corrupt("expected a leaf node"));
        }
        if node.num_cells() > node.max_cells() {
            return Err(StorageError::corrupt(format!(
                "leaf holds {} cells but fits {}",
                node.num_cells(),
                node.max_cells()
            )));
        }
        Ok(node)
    }

    fn page(&self) -> &[u8] {
        self.buf.as_ref()
    }

    pub fn is_root(&self) -> bool {
        self.page()[IS_ROOT_OFFSET] != 0
    }

    pub fn parent(&self) -> PageNum {
        get_u32(self.page(), PARENT_POINTER_OFFSET)
    }

    pub fn num_cells(&self) -> usize {
        get_u32(self.page(), LEAF_NODE_NUM_CELLS_OFFSET) as usize
    }

    pub fn max_cells(&self) -> usize {
        leaf_node_max_cells(self.page().len())
    }

    pub fn is_full(&self) -> bool {
        self.num_cells() >= self.max_cells()
    }

    pub fn next_leaf(&self) -> PageNum {
        get_u32(self.page(), LEAF_NODE_NEXT_LEAF_OFFSET)
    }

    pub fn key(&self, idx: usize) -> u32 {
        get_u32(self.page(), cell_offset(idx))
    }

    /// Encoded row stored in cell `idx`.
    pub fn value(&self, idx: usize) -> &[u8] {
        let start = cell_offset(idx) + LEAF_NODE_KEY_SIZE;
        &self.page()[start..cell_offset(idx + 1)]
    }

    /// Raw bytes of cells `0..num_cells`.
    pub fn cells(&self) -> &[u8] {
        &self.page()[LEAF_NODE_HEADER_SIZE..cell_offset(self.num_cells())]
    }

    pub fn max_key(&self) -> Option<u32> {
        self.num_cells().checked_sub(1).map(|last| self.key(last))
    }

    /// Binary search: `Ok(idx)` when the key is present, otherwise `Err(idx)`
    /// with the position where it would be inserted.
    pub fn search(&self, key: u32) -> std::result::Result<usize, usize> {
        let (mut lo, mut hi) = (0, self.num_cells());
        while lo < hi {
            let mid = lo + (hi - lo) / 2;
            match self.key(mid).cmp(&key) {
                std::cmp::Ordering::Equal => return Ok(mid),
                std::cmp::Ordering::Less => lo = mid + 1,
                std::cmp::Ordering::Greater => hi = mid,
            }
        }
        Err(lo)
    }
}

impl<B: AsRef<[u8]> + AsMut<[u8]>> LeafNode<B> {
    /// Format `buf` as an empty, non-root leaf.
    pub fn init(mut buf: B) -> Self {
        let page = buf.as_mut();
        page.fill(0);
        page[NODE_TYPE_OFFSET] = NodeType::Leaf as u8;
        Self { buf }
    }

    fn page_mut(&mut self) -> &mut [u8] {
        self.buf.as_mut()
    }

    pub fn set_root(&mut self, is_root: bool) {
        set_root(self.page_mut(), is_root);
    }

    pub fn set_parent(&mut self, parent: PageNum) {
        set_parent(self.page_mut(), parent);
    }

    pub fn set_next_leaf(&mut self, next: PageNum) {
        set_u32(self.page_mut(), LEAF_NODE_NEXT_LEAF_OFFSET, next);
    }

    fn set_num_cells(&mut self, count: usize) {
        set_u32(self.page_mut(), LEAF_NODE_NUM_CELLS_OFFSET, count as u32);
    }

    /// Insert a cell at `idx`, shifting later cells one slot right.
    /// The caller checks `is_full` first.
    pub fn insert_cell(&mut self, idx: usize, key: u32, row: &[u8]) {
        let count = self.num_cells();
        debug_assert!(count < self.max_cells() && idx <= count);

        let start = cell_offset(idx);
        let end = cell_offset(count);
        self.page_mut()
            .copy_within(start..end, start + LEAF_NODE_CELL_SIZE);

        let page = self.page_mut();
        set_u32(page, start, key);
        page[start + LEAF_NODE_KEY_SIZE..start + LEAF_NODE_CELL_SIZE]
            .copy_from_slice(&row[..LEAF_NODE_CELL_SIZE - LEAF_NODE_KEY_SIZE]);
        self.set_num_cells(count + 1);
    }

    /// Replace all cells with `cells`, a whole number of encoded cells.
    pub fn write_cells(&mut self, cells: &[u8]) {
        debug_assert_eq!(cells.len() % LEAF_NODE_CELL_SIZE, 0);
        let count = cells.len() / LEAF_NODE_CELL_SIZE;
        debug_assert!(count <= self.max_cells());

        let page = self.page_mut();
        page[LEAF_NODE_HEADER_SIZE..].fill(0);
        page[LEAF_NODE_HEADER_SIZE..LEAF_NODE_HEADER_SIZE + cells.len()].copy_from_slice(cells);
        self.set_num_cells(count);
    }
}

fn cell_offset(idx: usize) -> usize {
    LEAF_NODE_HEADER_SIZE + idx * LEAF_NODE_CELL_SIZE
}

/// Encode one leaf cell (key followed by row bytes).
pub fn leaf_cell(key: u32, row: &[u8]) -> Vec<u8> {
    let mut cell = Vec::with_capacity(LEAF_NODE_CELL_SIZE);
    cell.extend_from_slice(&key.to_be_bytes());
    cell.extend_from_slice(&row[..LEAF_NODE_CELL_SIZE - LEAF_NODE_KEY_SIZE]);
    cell
}

// ─── Internal ────────────────────────────────────────────────────────────────

pub struct InternalNode<B> {
    buf: B,
}

/// Decoded routing information of an internal node.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InternalNodeData {
    pub keys: Vec<u32>,
    /// One more entry than `keys`; the last is the right child.
    pub children: Vec<PageNum>,
}

impl<B: AsRef<[u8]>> InternalNode<B> {
    pub fn from_page(buf: B) -> Result<Self> {
        let node = Self { buf };
        let page = node.buf.as_ref();
        if page[NODE_TYPE_OFFSET] != NodeType::Internal as u8 {
            return Err(StorageError::corrupt("expected an internal node"));
        }
        let physical = internal_node_max_keys(page.len());
        if node.num_keys() > physical {
            return Err(StorageError::corrupt(format!(
                "internal node holds {} keys but fits {physical}",
                node.num_keys()
            )));
        }
        Ok(node)
    }

    fn page(&self) -> &[u8] {
        self.buf.as_ref()
    }

    pub fn is_root(&self) -> bool {
        self.page()[IS_ROOT_OFFSET] != 0
    }

    pub fn parent(&self) -> PageNum {
        get_u32(self.page(), PARENT_POINTER_OFFSET)
    }

    pub fn num_keys(&self) -> usize {
        get_u32(self.page(), INTERNAL_NODE_NUM_KEYS_OFFSET) as usize
    }

    pub fn right_child(&self) -> PageNum {
        get_u32(self.page(), INTERNAL_NODE_RIGHT_CHILD_OFFSET)
    }

    pub fn key(&self, idx: usize) -> u32 {
        get_u32(self.page(), internal_cell_offset(idx) + 4)
    }

    /// Child at `idx`; `idx == num_keys` is the right child.
    pub fn child(&self, idx: usize) -> PageNum {
        if idx == self.num_keys() {
            self.right_child()
        } else {
            get_u32(self.page(), internal_cell_offset(idx))
        }
    }

    pub fn max_key(&self) -> Option<u32> {
        self.num_keys().checked_sub(1).map(|last| self.key(last))
    }

    /// Index of the child to descend into for `key`: the smallest separator
    /// that is `>= key`, or the right child when every separator is smaller.
    pub fn child_index(&self, key: u32) -> usize {
        let (mut lo, mut hi) = (0, self.num_keys());
        while lo < hi {
            let mid = lo + (hi - lo) / 2;
            if self.key(mid) >= key {
                hi = mid;
            } else {
                lo = mid + 1;
            }
        }
        lo
    }

    /// Position of `child` among this node's children.
    pub fn index_of_child(&self, child: PageNum) -> Option<usize> {
        (0..=self.num_keys()).find(|&idx| self.child(idx) == child)
    }

    pub fn to_data(&self) -> InternalNodeData {
        let n = self.num_keys();
        InternalNodeData {
            keys: (0..n).map(|i| self.key(i)).collect(),
            children: (0..=n).map(|i| self.child(i)).collect(),
        }
    }
}

impl<B: AsRef<[u8]> + AsMut<[u8]>> InternalNode<B> {
    /// Format `buf` as an empty, non-root internal node.
    pub fn init(mut buf: B) -> Self {
        let page = buf.as_mut();
        page.fill(0);
        page[NODE_TYPE_OFFSET] = NodeType::Internal as u8;
        Self { buf }
    }

    fn page_mut(&mut self) -> &mut [u8] {
        self.buf.as_mut()
    }

    pub fn set_root(&mut self, is_root: bool) {
        set_root(self.page_mut(), is_root);
    }

    pub fn set_parent(&mut self, parent: PageNum) {
        set_parent(self.page_mut(), parent);
    }

    pub fn set_right_child(&mut self, child: PageNum) {
        set_u32(self.page_mut(), INTERNAL_NODE_RIGHT_CHILD_OFFSET, child);
    }

    /// Overwrite keys and children while keeping the root flag and parent.
    pub fn write_data(&mut self, node: &InternalNodeData) {
        debug_assert_eq!(node.keys.len() + 1, node.children.len());

        let page = self.page_mut();
        page[INTERNAL_NODE_HEADER_SIZE..].fill(0);
        for (idx, (&child, &key)) in node.children.iter().zip(&node.keys).enumerate() {
            let off = internal_cell_offset(idx);
            set_u32(page, off, child);
            set_u32(page, off + 4, key);
        }
        set_u32(page, INTERNAL_NODE_NUM_KEYS_OFFSET, node.keys.len() as u32);
        let right = node.children.last().copied().unwrap_or(0);
        self.set_right_child(right);
    }
}

fn internal_cell_offset(idx: usize) -> usize {
    INTERNAL_NODE_HEADER_SIZE + idx * INTERNAL_NODE_CELL_SIZE
}

// ─── Byte helpers ────────────────────────────────────────────────────────────

fn get_u32(page: &[u8], offset: usize) -> u32 {
    let mut bytes = [0u8; 4];
    bytes.copy_from_slice(&page[offset..offset + 4]);
    u32::from_be_bytes(bytes)
}

fn set_u32(page: &mut [u8], offset: usize, val: u32) {
    page[offset..offset + 4].copy_from_slice(&val.to_be_bytes());
}
