pub mod builder;
pub mod header;
pub mod tuple;

pub use builder::{ItemId, Page, SIZE_OF_ITEM_ID};
pub use header::{maxalign, PageHeader, BLCKSZ, RELSEG_SIZE};
pub use tuple::{tuple_stamp_for_load, HeapTuple, HeapTupleHeader};
