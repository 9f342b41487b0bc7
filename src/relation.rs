//! Relation identity and segment-file path resolution.
//!
//! A relation's main fork is stored as a family of fixed-size segment
//! files: segment 0 has no suffix, segment `k > 0` uses suffix `.k`.

use std::path::PathBuf;

pub type Oid = u32;
pub type BlockNumber = u32;

/// Page offset number, 1-based. Matches `ItemIdData` offset-number
/// semantics: `0` is never a valid placed offset.
pub type OffsetNumber = u16;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ItemPointer {
    pub block: BlockNumber,
    pub offset: OffsetNumber,
}

impl ItemPointer {
    pub const fn new(block: BlockNumber, offset: OffsetNumber) -> Self {
        Self { block, offset }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ForkNumber {
    Main,
    Fsm,
    VisibilityMap,
    Init,
}

impl ForkNumber {
    fn suffix(&self) -> &'static str {
        match self {
            ForkNumber::Main => "",
            ForkNumber::Fsm => "_fsm",
            ForkNumber::VisibilityMap => "_vm",
            ForkNumber::Init => "_init",
        }
    }
}

/// The triple identifying the physical storage of a relation's fork,
/// independent of its logical oid.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RelFileLocator {
    pub tablespace: Oid,
    pub database: Oid,
    pub relation: Oid,
}

impl RelFileLocator {
    pub const fn new(tablespace: Oid, database: Oid, relation: Oid) -> Self {
        Self {
            tablespace,
            database,
            relation,
        }
    }

    /// Path of the `segment_index`-th segment file of `fork`, rooted at
    /// `datadir`.
    pub fn segment_path(&self, datadir: &std::path::Path, fork: ForkNumber, segment_index: u32) -> PathBuf {
        let dir = datadir
            .join("base")
            .join(self.database.to_string());
        let mut name = format!("{}{}", self.relation, fork.suffix());
        if segment_index > 0 {
            name.push('.');
            name.push_str(&segment_index.to_string());
        }
        dir.join(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn segment_zero_has_no_suffix() {
        let loc = RelFileLocator::new(0, 5, 16384);
        let datadir = std::path::Path::new("/data");
        let p = loc.segment_path(datadir, ForkNumber::Main, 0);
        assert_eq!(p, datadir.join("base/5/16384"));
    }

    #[test]
    fn segment_k_uses_dot_suffix() {
        let loc = RelFileLocator::new(0, 5, 16384);
        let datadir = std::path::Path::new("/data");
        let p = loc.segment_path(datadir, ForkNumber::Main, 3);
        assert_eq!(p, datadir.join("base/5/16384.3"));
    }
}
