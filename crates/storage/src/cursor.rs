//! Ordered traversal over the leaves of a B+tree.
//!
//! A cursor is a `(page, cell)` position plus an end-of-table flag. Moving
//! past the last cell of a leaf follows the leaf's `next_leaf` link, so a
//! full scan never revisits internal nodes. The cursor only reads pages.

use tracing::trace;

use crate::error::{Result, StorageError};
use crate::node::LeafNode;
use crate::pager::{PageNum, Pager};
use crate::row::Row;

pub struct Cursor<'a> {
    pager: &'a mut Pager,
    page_num: PageNum,
    cell_num: usize,
    end_of_table: bool,
}

impl<'a> Cursor<'a> {
    /// Position at `(page_num, cell_num)` without moving, as an insertion
    /// point. The cursor is at the end of the table only when nothing at or
    /// after this position exists.
    pub(crate) fn at(pager: &'a mut Pager, page_num: PageNum, cell_num: usize) -> Result<Self> {
        let end_of_table = {
            let leaf = LeafNode::from_page(pager.read_page(page_num)?)?;
            cell_num >= leaf.num_cells() && leaf.next_leaf() == 0
        };
        Ok(Self {
            pager,
            page_num,
            cell_num,
            end_of_table,
        })
    }

    /// Position at the first row stored in or after leaf `page_num`.
    pub(crate) fn start(pager: &'a mut Pager, page_num: PageNum) -> Result<Self> {
        let mut cursor = Self {
            pager,
            page_num,
            cell_num: 0,
            end_of_table: false,
        };
        cursor.settle()?;
        Ok(cursor)
    }

    pub fn page_num(&self) -> PageNum {
        self.page_num
    }

    pub fn cell_num(&self) -> usize {
        self.cell_num
    }

    pub fn is_end(&self) -> bool {
        self.end_of_table
    }

    /// Key of the row under the cursor.
    pub fn key(&mut self) -> Result<u32> {
        self.settle()?;
        if self.end_of_table {
            return Err(StorageError::OutOfRange);
        }
        let leaf = LeafNode::from_page(self.pager.read_page(self.page_num)?)?;
        Ok(leaf.key(self.cell_num))
    }

    /// Decoded row under the cursor.
    pub fn value(&mut self) -> Result<Row> {
        self.settle()?;
        if self.end_of_table {
            return Err(StorageError::OutOfRange);
        }
        let leaf = LeafNode::from_page(self.pager.read_page(self.page_num)?)?;
        Row::decode(leaf.value(self.cell_num))
    }

    /// Step to the next row in key order.
    pub fn advance(&mut self) -> Result<()> {
        if self.end_of_table {
            return Ok(());
        }
        self.cell_num += 1;
        self.settle()
    }

    /// Move forward across leaf boundaries until the position names a real
    /// cell, or mark the end of the table.
    fn settle(&mut self) -> Result<()> {
        loop {
            let (num_cells, next_leaf) = {
                let leaf = LeafNode::from_page(self.pager.read_page(self.page_num)?)?;
                (leaf.num_cells(), leaf.next_leaf())
            };
            if self.cell_num < num_cells {
                self.end_of_table = false;
                return Ok(());
            }
            if next_leaf == 0 {
                self.end_of_table = true;
                return Ok(());
            }
            trace!(from = self.page_num, to = next_leaf, "cursor crossed leaf boundary");
            self.page_num = next_leaf;
            self.cell_num = 0;
        }
    }
}

/// Yields every remaining row once, in ascending key order. A read error is
/// yielded once and ends the iteration.
impl Iterator for Cursor<'_> {
    type Item = Result<Row>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.end_of_table {
            return None;
        }
        let row = match self.value() {
            Ok(row) => row,
            Err(StorageError::OutOfRange) => return None,
            Err(err) => {
                self.end_of_table = true;
                return Some(Err(err));
            }
        };
        if let Err(err) = self.advance() {
            self.end_of_table = true;
            return Some(Err(err));
        }
        Some(Ok(row))
    }
}

#[cfg(test)]
mod tests {
    use crate::btree::BTree;
    use crate::config::PagerConfig;
    use crate::error::StorageError;
    use crate::pager::Pager;
    use crate::row::Row;

    fn row(id: u32) -> [u8; crate::config::ROW_SIZE] {
        Row::new(id, format!("user{id}"), format!("person{id}@example.com"))
            .unwrap()
            .to_bytes()
            .unwrap()
    }

    #[test]
    fn empty_table_starts_at_end() {
        let mut pager = Pager::in_memory(PagerConfig::default()).unwrap();
        let root = BTree::create(&mut pager).unwrap();
        let mut tree = BTree::new(&mut pager, root);

        let mut cursor = tree.start().unwrap();
        assert!(cursor.is_end());
        assert!(matches!(cursor.value(), Err(StorageError::OutOfRange)));
        assert!(cursor.next().is_none());
    }

    #[test]
    fn advance_crosses_leaves() {
        let mut pager = Pager::in_memory(PagerConfig::default()).unwrap();
        let root = BTree::create(&mut pager).unwrap();
        let mut tree = BTree::new(&mut pager, root);
        for id in 1..=40 {
            tree.insert(id, &row(id)).unwrap();
        }

        let mut cursor = tree.start().unwrap();
        let first_leaf = cursor.page_num();
        let mut seen = Vec::new();
        while !cursor.is_end() {
            seen.push(cursor.key().unwrap());
            cursor.advance().unwrap();
        }
        assert_eq!(seen, (1..=40).collect::<Vec<_>>());
        assert_ne!(cursor.page_num(), first_leaf);

        // Advancing at the end is a no-op.
        cursor.advance().unwrap();
        assert!(cursor.is_end());
    }

    #[test]
    fn find_cursor_iterates_from_key() {
        let mut pager = Pager::in_memory(PagerConfig::default()).unwrap();
        let root = BTree::create(&mut pager).unwrap();
        let mut tree = BTree::new(&mut pager, root);
        for id in (2..=60).step_by(2) {
            tree.insert(id, &row(id)).unwrap();
        }

        let ids: Vec<u32> = tree
            .find(31)
            .unwrap()
            .map(|r| r.unwrap().id)
            .collect();
        assert_eq!(ids, (32..=60).step_by(2).collect::<Vec<_>>());

        assert!(tree.find(61).unwrap().is_end());
        assert!(!tree.find(60).unwrap().is_end());
    }

    #[test]
    fn fresh_cursor_rescans() {
        let mut pager = Pager::in_memory(PagerConfig::default()).unwrap();
        let root = BTree::create(&mut pager).unwrap();
        let mut tree = BTree::new(&mut pager, root);
        for id in [3, 1, 2] {
            tree.insert(id, &row(id)).unwrap();
        }

        let first: Vec<u32> = tree.start().unwrap().map(|r| r.unwrap().id).collect();
        let second: Vec<u32> = tree.start().unwrap().map(|r| r.unwrap().id).collect();
        assert_eq!(first, vec![1, 2, 3]);
        assert_eq!(first, second);
    }
}
