//! BT Reader (C6): a read-only walker over an existing B-tree file.
//! Opens the meta page, descends to the left-most leaf via the
//! fast-root, and iterates leaves in order, skipping dead and
//! half-dead pages.

use log::debug;

use crate::error::DlResult;

use super::btree_format::{BTreeFile, PageCategory, NONE_BLOCK};
use super::spool::SpooledEntry;

/// `{smgr-handle, block-number, offset-in-page, cached-leaf-page}`.
/// `block = None` means the iterator has yielded everything (or the
/// index was empty on open).
pub struct BTReader {
    file: BTreeFile,
    block: Option<u32>,
    offset: usize,
    cached: Vec<super::btree_format::LeafEntry>,
}

impl BTReader {
    /// Opens the index's storage directly, bypassing the buffer cache
    /// (the new file node being built will replace this one). Fatal on
    /// bad magic or version mismatch.
    pub fn open(path: &std::path::Path) -> DlResult<Self> {
        let mut file = BTreeFile::open_read_only(path)?;
        let meta = file.read_meta()?;

        let mut reader = Self {
            file,
            block: None,
            offset: 0,
            cached: Vec::new(),
        };

        let Some(fast_root) = meta.fast_root else {
            debug!("bt reader: empty index, no fast root");
            return Ok(reader);
        };

        reader.descend_to_leftmost_leaf(fast_root)?;
        Ok(reader)
    }

    fn descend_to_leftmost_leaf(&mut self, start: u32) -> DlResult<()> {
        let mut block = start;
        loop {
            match self.file.page_category(block)? {
                PageCategory::Leaf => {
                    let leaf = self.file.read_leaf(block)?;
                    if leaf.half_dead {
                        match leaf.next {
                            Some(next) => {
                                block = next;
                                continue;
                            }
                            None => {
                                self.block = None;
                                return Ok(());
                            }
                        }
                    }
                    self.cached = leaf.entries;
                    self.offset = 0;
                    self.block = Some(block);
                    return Ok(());
                }
                PageCategory::Internal => {
                    let page = self.file.read_internal(block)?;
                    if page.half_dead {
                        match page.next {
                            Some(next) => {
                                block = next;
                                continue;
                            }
                            None => {
                                self.block = None;
                                return Ok(());
                            }
                        }
                    }
                    // P_FIRSTDATAKEY: take the left-most (no-key) child.
                    match page.entries.first() {
                        Some(e) => block = e.child,
                        None => {
                            self.block = None;
                            return Ok(());
                        }
                    }
                }
            }
        }
    }

    /// Advances `offset`, skipping dead line pointers; follows
    /// `btpo_next` when the leaf ends. Returns `None` once the
    /// right-most leaf is exhausted.
    pub fn next(&mut self) -> DlResult<Option<SpooledEntry>> {
        loop {
            let Some(block) = self.block else {
                return Ok(None);
            };
            if self.offset >= self.cached.len() {
                let leaf = self.file.read_leaf(block)?;
                let next_block = leaf.next;
                match next_block {
                    Some(next) if next != NONE_BLOCK => {
                        self.block = Some(next);
                        self.cached = self.file.read_leaf(next)?.entries;
                        self.offset = 0;
                        continue;
                    }
                    _ => {
                        self.block = None;
                        return Ok(None);
                    }
                }
            }
            let item = &self.cached[self.offset];
            self.offset += 1;
            if item.dead {
                continue;
            }
            return Ok(Some(item.entry.clone()));
        }
    }

    pub fn is_exhausted(&self) -> bool {
        self.block.is_none() && self.offset >= self.cached.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::index::btree_format::{InternalEntry, InternalPage, LeafEntry, LeafPage, MetaPage};
    use crate::relation::ItemPointer;

    fn build_two_leaf_index(path: &std::path::Path) {
        let mut f = BTreeFile::create(path).unwrap();
        // block 0: meta, block 1: leaf a, block 2: leaf b
        f.write_leaf(
            1,
            &LeafPage {
                half_dead: false,
                next: Some(2),
                entries: vec![
                    LeafEntry {
                        dead: false,
                        entry: SpooledEntry {
                            key: vec![Some(1)],
                            heap_tid: ItemPointer::new(0, 1),
                        },
                    },
                    LeafEntry {
                        dead: true,
                        entry: SpooledEntry {
                            key: vec![Some(2)],
                            heap_tid: ItemPointer::new(0, 2),
                        },
                    },
                ],
            },
        )
        .unwrap();
        f.write_leaf(
            2,
            &LeafPage {
                half_dead: false,
                next: None,
                entries: vec![LeafEntry {
                    dead: false,
                    entry: SpooledEntry {
                        key: vec![Some(3)],
                        heap_tid: ItemPointer::new(0, 3),
                    },
                }],
            },
        )
        .unwrap();
        f.write_meta(&MetaPage {
            root: Some(1),
            fast_root: Some(1),
            level: 0,
        })
        .unwrap();
    }

    #[test]
    fn iterates_leaves_in_order_skipping_dead() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("idx");
        build_two_leaf_index(&path);

        let mut reader = BTReader::open(&path).unwrap();
        let mut seen = Vec::new();
        while let Some(e) = reader.next().unwrap() {
            seen.push(e.heap_tid);
        }
        assert_eq!(seen, vec![ItemPointer::new(0, 1), ItemPointer::new(0, 3)]);
    }

    #[test]
    fn empty_index_is_exhausted_immediately() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("idx");
        let mut f = BTreeFile::create(&path).unwrap();
        f.write_meta(&MetaPage {
            root: None,
            fast_root: None,
            level: 0,
        })
        .unwrap();

        let mut reader = BTReader::open(&path).unwrap();
        assert_eq!(reader.next().unwrap(), None);
    }

    #[test]
    fn descends_through_one_internal_level() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("idx");
        let mut f = BTreeFile::create(&path).unwrap();
        f.write_leaf(
            2,
            &LeafPage {
                half_dead: false,
                next: None,
                entries: vec![LeafEntry {
                    dead: false,
                    entry: SpooledEntry {
                        key: vec![Some(9)],
                        heap_tid: ItemPointer::new(1, 1),
                    },
                }],
            },
        )
        .unwrap();
        f.write_internal(
            1,
            &InternalPage {
                half_dead: false,
                next: None,
                entries: vec![InternalEntry { key: None, child: 2 }],
            },
        )
        .unwrap();
        f.write_meta(&MetaPage {
            root: Some(1),
            fast_root: Some(1),
            level: 1,
        })
        .unwrap();

        let mut reader = BTReader::open(&path).unwrap();
        let e = reader.next().unwrap().unwrap();
        assert_eq!(e.heap_tid, ItemPointer::new(1, 1));
        assert_eq!(reader.next().unwrap(), None);
    }
}
