//! Index Spooler (C5): wraps the database's sort machinery. One spool
//! per B-tree index on the target relation; non-B-tree indexes are
//! remembered for a post-load full reindex.

use crate::error::DlResult;
use crate::page::HeapTuple;
use crate::relation::{ItemPointer, Oid};

use super::scan_key::{KeyValue, ScanKey};

/// A collaborator boundary: index definition introspection (is it a
/// valid B-tree, is it unique, its scan keys, its partial-index
/// predicate and key expressions) belongs to the host database's
/// catalog, not to this crate.
pub trait IndexDefinition {
    fn oid(&self) -> Oid;
    fn is_btree(&self) -> bool;
    fn is_unique(&self) -> bool;
    fn scan_keys(&self) -> Vec<ScanKey>;

    /// Partial-index predicate; `true` for a non-partial index.
    fn predicate_holds(&self, tuple: &HeapTuple) -> bool;

    /// Extracts the index key attributes from a heap tuple.
    fn extract_key(&self, tuple: &HeapTuple) -> Vec<KeyValue>;
}

#[derive(Debug, Clone)]
pub struct SpooledEntry {
    pub key: Vec<KeyValue>,
    pub heap_tid: ItemPointer,
}

/// An ordered sequence of `(index-tuple, heap-tid)` pairs, backed by an
/// external sort run keyed by the index's scan keys. Created when the
/// target index is a valid B-tree; consumed exactly once during close.
pub struct IndexSpool {
    pub index_oid: Oid,
    pub scan_keys: Vec<ScanKey>,
    /// `index.isunique ∧ max_dup_errors = 0`
    pub unique_enforced: bool,
    pub is_unique: bool,
    entries: Vec<SpooledEntry>,
    sorted: bool,
}

impl IndexSpool {
    pub(crate) fn new(index_oid: Oid, scan_keys: Vec<ScanKey>, is_unique: bool, unique_enforced: bool) -> Self {
        Self {
            index_oid,
            scan_keys,
            unique_enforced,
            is_unique,
            entries: Vec::new(),
            sorted: false,
        }
    }

    pub(crate) fn push(&mut self, entry: SpooledEntry) {
        self.entries.push(entry);
    }

    /// `performsort`: a stable sort keyed by the index's scan keys.
    /// Stability preserves arrival order on ties, which the merge
    /// builder's in-spool dedup relies on.
    pub fn performsort(&mut self) {
        let keys = self.scan_keys.clone();
        self.entries
            .sort_by(|a, b| super::scan_key::compare_keys(&a.key, &b.key, &keys).0);
        self.sorted = true;
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Consumes the sorted stream in order. Panics if `performsort` was
    /// never called, matching the documented lifecycle (sorted before
    /// consumption).
    pub fn into_sorted_iter(self) -> std::vec::IntoIter<SpooledEntry> {
        assert!(self.sorted, "spool must be sorted before consumption");
        self.entries.into_iter()
    }
}

/// An index that isn't a valid B-tree: remembered for a full reindex at
/// close, satisfying the non-goal "fallback to full reindex is
/// required" without implementing a reindex algorithm here.
pub struct ReindexTarget {
    pub index_oid: Oid,
}

/// A collaborator boundary: triggering an actual `REINDEX` belongs to
/// the host database's index-build machinery, not to this crate. One
/// call per `ReindexTarget` left over at close.
pub trait ReindexHandle {
    fn reindex(&self, index_oid: Oid) -> DlResult<()>;
}

/// Test double: records which indexes were asked to be rebuilt.
#[derive(Default)]
pub struct RecordingReindexer {
    pub reindexed: std::cell::RefCell<Vec<Oid>>,
}

impl ReindexHandle for RecordingReindexer {
    fn reindex(&self, index_oid: Oid) -> DlResult<()> {
        self.reindexed.borrow_mut().push(index_oid);
        Ok(())
    }
}

pub struct IndexSpooler {
    spools: Vec<IndexSpool>,
    reindex_targets: Vec<ReindexTarget>,
}

impl IndexSpooler {
    /// For each index on the target relation at init time: a valid
    /// B-tree gets a spool; anything else becomes "reindex-at-end".
    pub fn init(indexes: &[Box<dyn IndexDefinition>], max_dup_errors_is_zero: bool) -> Self {
        let mut spools = Vec::new();
        let mut reindex_targets = Vec::new();
        for idx in indexes {
            if idx.is_btree() {
                let unique_enforced = idx.is_unique() && max_dup_errors_is_zero;
                spools.push(IndexSpool::new(
                    idx.oid(),
                    idx.scan_keys(),
                    idx.is_unique(),
                    unique_enforced,
                ));
            } else {
                reindex_targets.push(ReindexTarget { index_oid: idx.oid() });
            }
        }
        Self {
            spools,
            reindex_targets,
        }
    }

    /// Per inserted heap tuple: for each spooled index, evaluate its
    /// predicate; if it holds, append `(key, ctid)` to the spool.
    /// Reindex-at-end indexes do no per-tuple work.
    pub fn route_tuple(
        &mut self,
        tuple: &HeapTuple,
        indexes: &[Box<dyn IndexDefinition>],
    ) -> DlResult<()> {
        for spool in self.spools.iter_mut() {
            let idx = indexes
                .iter()
                .find(|i| i.oid() == spool.index_oid)
                .expect("spool must correspond to a known index");
            if idx.predicate_holds(tuple) {
                spool.push(SpooledEntry {
                    key: idx.extract_key(tuple),
                    heap_tid: tuple.header.ctid,
                });
            }
        }
        Ok(())
    }

    pub fn into_parts(self) -> (Vec<IndexSpool>, Vec<ReindexTarget>) {
        (self.spools, self.reindex_targets)
    }
}

/// Invoked once per leftover `ReindexTarget` at close, per spec.md §4.4
/// step 5.
pub fn run_reindexes(targets: &[ReindexTarget], handle: &dyn ReindexHandle) -> DlResult<()> {
    for target in targets {
        handle.reindex(target.index_oid)?;
    }
    Ok(())
}
