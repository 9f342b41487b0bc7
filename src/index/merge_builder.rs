//! Merge Builder (C7): consumes the sorted spool and the BT Reader
//! simultaneously, writes a new B-tree file by the standard bulk-build
//! algorithm, and enforces the unique-key policy.

use std::cmp::Ordering;
use std::path::Path;

use log::warn;

use crate::config::{DuplicateErrorBudget, OnDuplicateKeep};
use crate::error::{DlError, DlResult};
use crate::visibility::VisibilityOracle;

use super::badfile::BadFile;
use super::bt_reader::BTReader;
use super::btree_format::{BTreeFile, InternalEntry, InternalPage, LeafEntry, LeafPage, MetaPage};
use super::scan_key::{compare_keys, ScanKey};
use super::spool::{IndexSpool, SpooledEntry};

/// Entries per leaf page in this crate's bulk-build; a real
/// implementation sizes this from `BT_PAGE_SIZE` and the key width.
const ENTRIES_PER_LEAF: usize = 64;
/// Entries per internal page, bounding the single internal level this
/// crate builds (see `btree_format` module docs).
const ENTRIES_PER_INTERNAL: usize = 4096;

#[derive(Debug, Default, Clone, Copy)]
pub struct MergeOutcome {
    pub dup_old: u64,
    pub dup_new: u64,
    pub entries_written: u64,
}

pub struct MergeBuilder<'a> {
    pub on_duplicate_keep: OnDuplicateKeep,
    pub duplicate_errors: DuplicateErrorBudget,
    pub duplicate_badfile: Option<&'a Path>,
    pub visibility: &'a dyn VisibilityOracle,
}

impl<'a> MergeBuilder<'a> {
    /// Builds `new_index_path` from `spool` (already sorted) merged
    /// with whatever `old_index_path` contains (`None`/nonexistent is
    /// treated as an empty old index).
    pub fn build(
        &self,
        mut spool: IndexSpool,
        old_index_path: Option<&Path>,
        new_index_path: &Path,
    ) -> DlResult<MergeOutcome> {
        spool.performsort();
        let scan_keys = spool.scan_keys.clone();
        let unique_enforced = spool.unique_enforced;

        let mut reader = match old_index_path {
            Some(p) if p.exists() => Some(BTReader::open(p)?),
            _ => None,
        };

        let reader_is_empty = match reader.as_mut() {
            Some(r) => r.is_exhausted(),
            None => true,
        };

        let mut builder = BulkBuilder::new(new_index_path)?;
        let mut outcome = MergeOutcome::default();

        if reader_is_empty && !unique_enforced {
            // Fast path: no old contents to merge, and no uniqueness to
            // police across inputs.
            for entry in spool.into_sorted_iter() {
                builder.push(entry)?;
                outcome.entries_written += 1;
            }
            builder.finish()?;
            return Ok(outcome);
        }

        let mut spool_iter = spool.into_sorted_iter().peekable();

        // need_both / have_a_need_b / have_b_need_a / tied_same_key,
        // held as two `Option` slots rather than a named enum: each
        // side is only ever committed after being compared against
        // whatever currently sits in the other slot, so a duplicate
        // key can never slip past the collision check by being
        // written out before its match on the other side is read.
        let mut a = spool_iter.next();
        let mut b = match reader.as_mut() {
            Some(r) => r.next()?,
            None => None,
        };

        loop {
            match (a.take(), b.take()) {
                (None, None) => break,
                (Some(av), None) => {
                    self.write_spool_side(
                        &mut builder,
                        &mut outcome,
                        av,
                        &mut spool_iter,
                        &scan_keys,
                        unique_enforced,
                    )?;
                    a = spool_iter.next();
                }
                (None, Some(bv)) => {
                    builder.push(bv)?;
                    outcome.entries_written += 1;
                    b = match reader.as_mut() {
                        Some(r) => r.next()?,
                        None => None,
                    };
                }
                (Some(av), Some(bv)) => {
                    let (cmp, hasnull) = compare_keys(&av.key, &bv.key, &scan_keys);
                    match cmp {
                        Ordering::Less => {
                            self.write_spool_side(
                                &mut builder,
                                &mut outcome,
                                av,
                                &mut spool_iter,
                                &scan_keys,
                                unique_enforced,
                            )?;
                            a = spool_iter.next();
                            b = Some(bv);
                        }
                        Ordering::Greater => {
                            builder.push(bv)?;
                            outcome.entries_written += 1;
                            a = Some(av);
                            b = match reader.as_mut() {
                                Some(r) => r.next()?,
                                None => None,
                            };
                        }
                        Ordering::Equal if !unique_enforced || hasnull => {
                            // Non-unique, or distinct-nulls: ties stay in
                            // input order.
                            self.write_spool_side(
                                &mut builder,
                                &mut outcome,
                                av,
                                &mut spool_iter,
                                &scan_keys,
                                unique_enforced,
                            )?;
                            a = spool_iter.next();
                            b = Some(bv);
                        }
                        Ordering::Equal => {
                            let survivor = self.resolve_collision(&mut outcome, av, bv)?;
                            builder.push(survivor)?;
                            outcome.entries_written += 1;
                            a = spool_iter.next();
                            b = match reader.as_mut() {
                                Some(r) => r.next()?,
                                None => None,
                            };
                        }
                    }
                }
            }
        }

        builder.finish()?;
        Ok(outcome)
    }

    /// Writes `a`, first resolving any run of spool entries with an
    /// identical key immediately following it ("unique-dedup inside the
    /// spool").
    fn write_spool_side(
        &self,
        builder: &mut BulkBuilder,
        outcome: &mut MergeOutcome,
        mut a: SpooledEntry,
        spool_iter: &mut std::iter::Peekable<std::vec::IntoIter<SpooledEntry>>,
        scan_keys: &[ScanKey],
        unique_enforced: bool,
    ) -> DlResult<()> {
        if unique_enforced {
            while let Some(next) = spool_iter.peek() {
                let (cmp, hasnull) = compare_keys(&a.key, &next.key, scan_keys);
                if cmp != Ordering::Equal || hasnull {
                    break;
                }
                let a_prime = spool_iter.next().unwrap();
                a = self.resolve_collision(outcome, a, a_prime)?;
            }
        }
        builder.push(a)?;
        outcome.entries_written += 1;
        Ok(())
    }

    /// Resolves a genuine unique-key collision between `a` and `b`,
    /// returning whichever survives so the caller can keep comparing it
    /// against further entries. Visibility is checked first: an
    /// invisible side is simply dropped, not counted as a duplicate.
    fn resolve_collision(
        &self,
        outcome: &mut MergeOutcome,
        a: SpooledEntry,
        b: SpooledEntry,
    ) -> DlResult<SpooledEntry> {
        if !self.visibility.is_visible_dirty(a.heap_tid)? {
            return Ok(b);
        }
        if !self.visibility.is_visible_dirty(b.heap_tid)? {
            return Ok(a);
        }

        let (survivor, rejected, count_field) = match self.on_duplicate_keep {
            OnDuplicateKeep::New => (a, b, &mut outcome.dup_old),
            OnDuplicateKeep::Old => (b, a, &mut outcome.dup_new),
        };
        *count_field += 1;
        let total = outcome.dup_old + outcome.dup_new;

        if let Some(path) = self.duplicate_badfile {
            let fields = vec![
                rejected.heap_tid.block.to_string(),
                rejected.heap_tid.offset.to_string(),
            ];
            BadFile::append(path, &fields)?;
        }
        warn!(
            "duplicate key rejected tid=({}, {}); dup_old={} dup_new={}",
            rejected.heap_tid.block, rejected.heap_tid.offset, outcome.dup_old, outcome.dup_new
        );

        if self.duplicate_errors.exhausted_by(total) {
            return Err(DlError::PerTuple {
                reason: format!("duplicate key budget exceeded ({} duplicates)", total),
                budget_exhausted: true,
            });
        }

        Ok(survivor)
    }
}

/// Accumulates entries into leaf pages, chains them, and writes a
/// single internal level plus the meta page on `finish`.
struct BulkBuilder {
    file: BTreeFile,
    next_block: u32,
    current_leaf: Vec<LeafEntry>,
    /// `(first_key, block)` of every completed leaf, in order.
    leaves: Vec<(Vec<super::scan_key::KeyValue>, u32)>,
}

impl BulkBuilder {
    fn new(path: &Path) -> DlResult<Self> {
        Ok(Self {
            file: BTreeFile::create(path)?,
            next_block: 1, // block 0 reserved for the meta page
            current_leaf: Vec::new(),
            leaves: Vec::new(),
        })
    }

    fn push(&mut self, entry: SpooledEntry) -> DlResult<()> {
        if self.current_leaf.is_empty() {
            self.leaves.push((entry.key.clone(), self.next_block));
        }
        self.current_leaf.push(LeafEntry {
            dead: false,
            entry,
        });
        if self.current_leaf.len() >= ENTRIES_PER_LEAF {
            self.flush_leaf()?;
        }
        Ok(())
    }

    fn flush_leaf(&mut self) -> DlResult<()> {
        if self.current_leaf.is_empty() {
            return Ok(());
        }
        let block = *self.leaves.last().map(|(_, b)| b).unwrap();
        let next_block = self.next_block + 1;
        self.file.write_leaf(
            block,
            &LeafPage {
                half_dead: false,
                next: None, // patched once the following leaf is known
                entries: std::mem::take(&mut self.current_leaf),
            },
        )?;
        if self.leaves.len() > 1 {
            let prev_block = self.leaves[self.leaves.len() - 2].1;
            let mut prev = self.file.read_leaf(prev_block)?;
            prev.next = Some(block);
            self.file.write_leaf(prev_block, &prev)?;
        }
        self.next_block = next_block;
        Ok(())
    }

    fn finish(mut self) -> DlResult<()> {
        self.flush_leaf()?;

        if self.leaves.is_empty() {
            self.file.write_meta(&MetaPage {
                root: None,
                fast_root: None,
                level: 0,
            })?;
            self.file.sync()?;
            return Ok(());
        }

        if self.leaves.len() == 1 {
            let block = self.leaves[0].1;
            self.file.write_meta(&MetaPage {
                root: Some(block),
                fast_root: Some(block),
                level: 0,
            })?;
            self.file.sync()?;
            return Ok(());
        }

        assert!(
            self.leaves.len() <= ENTRIES_PER_INTERNAL,
            "bulk build needs more than one internal level for this many leaves"
        );
        let internal_block = self.next_block;
        let entries: Vec<InternalEntry> = self
            .leaves
            .iter()
            .enumerate()
            .map(|(i, (key, block))| InternalEntry {
                key: if i == 0 { None } else { Some(key.clone()) },
                child: *block,
            })
            .collect();
        self.file.write_internal(
            internal_block,
            &InternalPage {
                half_dead: false,
                next: None,
                entries,
            },
        )?;
        self.file.write_meta(&MetaPage {
            root: Some(internal_block),
            fast_root: Some(internal_block),
            level: 1,
        })?;
        self.file.sync()?;
        Ok(())
    }
}
