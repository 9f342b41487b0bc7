//! TOAST boundary: out-of-line/compressed storage of oversize field
//! values. Not specified here; the core only needs to hand an oversize
//! tuple to it and receive back the tuple to place.

use crate::error::DlResult;
use crate::page::HeapTuple;

pub trait Toaster {
    fn toast(&self, tuple: HeapTuple) -> DlResult<HeapTuple>;
}

/// Test double: returns the tuple unchanged. A real implementation
/// would compress/out-of-line any field exceeding its own threshold;
/// that policy belongs to the host database.
pub struct PassthroughToaster;

impl Toaster for PassthroughToaster {
    fn toast(&self, tuple: HeapTuple) -> DlResult<HeapTuple> {
        Ok(tuple)
    }
}
