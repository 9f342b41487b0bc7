//! Relation access boundary: exclusive locking, privilege checks, block
//! counting and persistence class, none of which this crate
//! reimplements — they belong to the host database's catalog and lock
//! manager.

use crate::error::DlResult;
use crate::relation::RelFileLocator;

/// An RAII guard representing the exclusive lock held on the target
/// relation for the entire load. Per Design Notes §9, this is a value
/// with guaranteed release tied to load lifetime, not to function exit.
pub trait ExclusiveLockGuard {}

pub trait RelationAccess {
    type Lock: ExclusiveLockGuard;

    /// Takes an exclusive write lock on the target relation. Held for
    /// the entire load; indexes of the relation inherit it transitively.
    fn lock_exclusive(&self, table: &str) -> DlResult<Self::Lock>;

    /// Verifies the relation is a real table and the caller has insert
    /// privilege.
    fn check_insertable(&self, table: &str) -> DlResult<()>;

    /// Current block count of the relation's main fork, used to compute
    /// `exist_cnt` at load start.
    fn block_count(&self, table: &str) -> DlResult<u32>;

    /// `false` for temp/unlogged relations: the loader must refuse to
    /// emit WAL (and Recovery is correspondingly unnecessary) for them.
    fn is_logged(&self, table: &str) -> DlResult<bool>;

    fn locator(&self, table: &str) -> DlResult<RelFileLocator>;

    fn relation_oid(&self, table: &str) -> DlResult<u32>;

    fn database_oid(&self) -> u32;
}

pub struct NullLockGuard;
impl ExclusiveLockGuard for NullLockGuard {}

/// In-process test double backing a handful of named relations.
pub struct FixedCatalog {
    pub database_oid: u32,
    pub tables: std::collections::HashMap<String, FixedTable>,
}

pub struct FixedTable {
    pub locator: RelFileLocator,
    pub relation_oid: u32,
    pub block_count: u32,
    pub logged: bool,
}

impl RelationAccess for FixedCatalog {
    type Lock = NullLockGuard;

    fn lock_exclusive(&self, table: &str) -> DlResult<Self::Lock> {
        self.check_insertable(table)?;
        Ok(NullLockGuard)
    }

    fn check_insertable(&self, table: &str) -> DlResult<()> {
        if self.tables.contains_key(table) {
            Ok(())
        } else {
            Err(crate::error::DlError::config(format!(
                "relation {} not found or not insertable",
                table
            )))
        }
    }

    fn block_count(&self, table: &str) -> DlResult<u32> {
        Ok(self.tables[table].block_count)
    }

    fn is_logged(&self, table: &str) -> DlResult<bool> {
        Ok(self.tables[table].logged)
    }

    fn locator(&self, table: &str) -> DlResult<RelFileLocator> {
        Ok(self.tables[table].locator)
    }

    fn relation_oid(&self, table: &str) -> DlResult<u32> {
        Ok(self.tables[table].relation_oid)
    }

    fn database_oid(&self) -> u32 {
        self.database_oid
    }
}
