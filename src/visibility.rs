//! Heap visibility boundary, used by the merge builder's unique-key
//! collision resolution. A dirty snapshot (see-uncommitted) is required
//! so the loader's own in-progress transaction can see its own rows.

use std::collections::HashSet;

use crate::error::DlResult;
use crate::relation::ItemPointer;

pub trait VisibilityOracle {
    /// Whether the heap row at `tid` is visible under a dirty snapshot
    /// (treats in-progress transactions, including the loader's own, as
    /// visible).
    fn is_visible_dirty(&self, tid: ItemPointer) -> DlResult<bool>;
}

/// Test double: every tid is visible unless explicitly marked deleted.
#[derive(Default)]
pub struct FixedVisibility {
    deleted: HashSet<ItemPointer>,
}

impl FixedVisibility {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn mark_deleted(&mut self, tid: ItemPointer) {
        self.deleted.insert(tid);
    }
}

impl VisibilityOracle for FixedVisibility {
    fn is_visible_dirty(&self, tid: ItemPointer) -> DlResult<bool> {
        Ok(!self.deleted.contains(&tid))
    }
}
