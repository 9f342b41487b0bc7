//! Recovery (C8): a stand-alone entry point that repairs partially
//! written relations after a crash, using the Load Status Files any
//! in-progress loads left behind (spec.md §4.8).

use std::fs::{self, File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::Path;

use log::{info, warn};

use crate::error::DlResult;
use crate::lockfile::ClusterLock;
use crate::lsf::{lsf_dir, LoadStatusFile, LsfRecord};
use crate::page::header::{PageHeader, BLCKSZ, RELSEG_SIZE};
use crate::relation::ForkNumber;

/// A collaborator boundary: interpreting `global/pg_control` belongs to
/// the host database, not this crate. Answers whether the cluster's
/// last shutdown was clean, in which case page-content recovery is
/// unnecessary (LSFs are still removed either way).
pub trait ClusterState {
    fn is_shutdown_clean(&self) -> DlResult<bool>;
}

/// Test double / conservative default: always runs page recovery.
pub struct AssumeUncleanShutdown;

impl ClusterState for AssumeUncleanShutdown {
    fn is_shutdown_clean(&self) -> DlResult<bool> {
        Ok(false)
    }
}

#[derive(Debug, Default, Clone, Copy)]
pub struct RecoveryOutcome {
    pub lsfs_examined: usize,
    pub blocks_zeroed: u32,
}

/// Runs the full recovery job against one data directory: acquires the
/// cluster lock, consults cluster state, repairs and removes every LSF
/// found, then releases the lock when `_lock` drops.
///
/// Takes an explicit `datadir` rather than `chdir`-ing into it (Design
/// Notes §9: no process-global state), so the lock, LSF directory and
/// segment paths are all resolved the same way the writer resolves
/// them.
pub fn run<C: ClusterState>(datadir: &Path, cluster_state: &C) -> DlResult<RecoveryOutcome> {
    let _lock = ClusterLock::acquire(datadir)?;
    let needs_page_recovery = !cluster_state.is_shutdown_clean()?;
    if !needs_page_recovery {
        info!("cluster shut down cleanly; skipping page recovery, LSFs still removed");
    }

    let mut outcome = RecoveryOutcome::default();
    let dir = lsf_dir(datadir);
    if !dir.exists() {
        return Ok(outcome);
    }

    for entry in fs::read_dir(&dir)? {
        let entry = entry?;
        let path = entry.path();
        if path.extension().and_then(|e| e.to_str()) != Some("loadstatus") {
            continue;
        }

        outcome.lsfs_examined += 1;
        let record = LoadStatusFile::read(&path)?;
        if needs_page_recovery {
            outcome.blocks_zeroed += recover_one_relation(datadir, &record)?;
        }
        fs::remove_file(&path)?;
        info!("recovery: repaired and removed {}", path.display());
    }

    Ok(outcome)
}

/// Zero-fills every block in `[exist_cnt, exist_cnt+create_cnt)` whose
/// header is invalid or whose page-LSN is zero, fsyncing and
/// reopening at each segment boundary. A block past the segment
/// file's current length is, by construction, not yet on disk and is
/// treated the same as an invalid one.
fn recover_one_relation(datadir: &Path, record: &LsfRecord) -> DlResult<u32> {
    let start = record.exist_cnt;
    let end = record.exist_cnt + record.create_cnt;
    if start == end {
        return Ok(0);
    }

    let blank_page = vec![0u8; BLCKSZ];
    let mut zeroed = 0u32;
    let mut open_segment: Option<(u32, File)> = None;

    for block in start..end {
        let segment_index = block / RELSEG_SIZE;
        if open_segment.as_ref().map(|(idx, _)| *idx) != Some(segment_index) {
            if let Some((_, f)) = open_segment.take() {
                sync_and_warn(&f);
            }
            let path = record.locator.segment_path(datadir, ForkNumber::Main, segment_index);
            let f = OpenOptions::new().read(true).write(true).create(true).open(&path)?;
            open_segment = Some((segment_index, f));
        }

        let (_, f) = open_segment.as_mut().unwrap();
        let local_block = block % RELSEG_SIZE;
        let offset = local_block as u64 * BLCKSZ as u64;
        let file_len = f.metadata()?.len();

        let needs_zero = if offset + BLCKSZ as u64 > file_len {
            true
        } else {
            f.seek(SeekFrom::Start(offset))?;
            let mut buf = vec![0u8; BLCKSZ];
            f.read_exact(&mut buf)?;
            PageHeader::is_invalid(&buf, BLCKSZ) || PageHeader::read_from(&buf).lsn == 0
        };

        if needs_zero {
            f.seek(SeekFrom::Start(offset))?;
            f.write_all(&blank_page)?;
            zeroed += 1;
        }
    }

    if let Some((_, f)) = open_segment {
        sync_and_warn(&f);
    }
    Ok(zeroed)
}

fn sync_and_warn(f: &File) {
    if let Err(e) = f.sync_all() {
        warn!("fsync during recovery failed: {}", e);
    }
}
