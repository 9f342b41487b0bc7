//! `directload`: a high-speed bulk loader for a disk-based, MVCC,
//! page-oriented relational store. Bypasses the normal tuple-insertion
//! path by formatting fully valid heap pages in a private buffer and
//! writing them directly to a relation's segment files, then merges
//! sorted index streams with any pre-existing index contents. Ships
//! with a companion recovery tool that repairs partially written
//! relations after a crash.
//!
//! Module map mirrors the collaborator boundaries of the design: each
//! piece the host database must supply (locking, WAL, TOAST, catalog
//! introspection, MVCC visibility, reindex) is a narrow trait here,
//! with an in-process test double alongside it.

pub mod checksum;
pub mod config;
pub mod context;
pub mod direct_writer;
pub mod error;
pub mod index;
pub mod lockfile;
pub mod lsf;
pub mod page;
pub mod recovery;
pub mod relation;
pub mod relation_access;
pub mod segment;
pub mod toast;
pub mod visibility;
pub mod wal;

use std::collections::HashMap;
use std::path::PathBuf;

use page::tuple::{CommandId, TransactionId};
use page::HeapTuple;

use checksum::PageChecksum;
use config::LoadConfig;
use context::LoadContext;
use direct_writer::{DirectWriter, WriterTuning};
use error::DlResult;
use index::{IndexDefinition, MergeBuilder, MergeOutcome, ReindexHandle};
use relation::Oid;
use relation_access::RelationAccess;
use toast::Toaster;
use visibility::VisibilityOracle;
use wal::WalSink;

/// Where to find an index's old (pre-load) file and where to write its
/// freshly merge-built replacement. One entry per B-tree index on the
/// target relation; indexes that aren't valid B-trees don't need one
/// (they're reindexed wholesale instead).
pub struct IndexPaths {
    pub old_path: Option<PathBuf>,
    pub new_path: PathBuf,
}

#[derive(Debug, Default)]
pub struct LoadOutcome {
    pub merge_outcomes: Vec<(Oid, MergeOutcome)>,
    pub reindexed: Vec<Oid>,
}

/// Runs one full load end to end: `DirectWriter::init`, a tuple for
/// tuple `insert` loop, `close`, then a Merge Builder pass per spooled
/// index and a reindex pass for anything that fell back to it. On any
/// per-tuple error the writer is closed in its abandoned state (LSF
/// left for Recovery) and the error is propagated.
#[allow(clippy::too_many_arguments)]
pub fn run_load<R: RelationAccess>(
    ctx: &LoadContext,
    relation_access: &R,
    indexes: Vec<Box<dyn IndexDefinition>>,
    toaster: Box<dyn Toaster>,
    wal: Box<dyn WalSink>,
    checksum: Box<dyn PageChecksum>,
    xid: TransactionId,
    cid: CommandId,
    tuning: WriterTuning,
    tuples: impl IntoIterator<Item = HeapTuple>,
    index_paths: &HashMap<Oid, IndexPaths>,
    visibility: &dyn VisibilityOracle,
    reindex_handle: &dyn ReindexHandle,
) -> DlResult<LoadOutcome> {
    let mut writer = DirectWriter::init(
        ctx,
        relation_access,
        indexes,
        toaster,
        wal,
        checksum,
        xid,
        cid,
        tuning,
    )?;

    let insert_result: DlResult<()> = (|| {
        for tuple in tuples {
            writer.insert(tuple)?;
        }
        Ok(())
    })();

    if let Err(e) = insert_result {
        writer.close(true)?;
        return Err(e);
    }

    let (spools, reindex_targets) = writer.close(false)?;

    let config: &LoadConfig = &ctx.config;
    let merge_builder = MergeBuilder {
        on_duplicate_keep: config.on_duplicate_keep,
        duplicate_errors: config.duplicate_errors,
        duplicate_badfile: config.duplicate_badfile.as_deref(),
        visibility,
    };

    let mut merge_outcomes = Vec::with_capacity(spools.len());
    for spool in spools {
        let oid = spool.index_oid;
        let paths = index_paths
            .get(&oid)
            .ok_or_else(|| error::DlError::fatal(format!("no index paths configured for index {}", oid)))?;
        let outcome = merge_builder.build(spool, paths.old_path.as_deref(), &paths.new_path)?;
        merge_outcomes.push((oid, outcome));
    }

    index::run_reindexes(&reindex_targets, reindex_handle)?;
    let reindexed = reindex_targets.iter().map(|t| t.index_oid).collect();

    Ok(LoadOutcome {
        merge_outcomes,
        reindexed,
    })
}
