//! Load Status File (C3): the durable journal recording how many pages
//! the writer has promised to disk for one in-progress load.

use std::fs::{self, File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::os::unix::fs::{DirBuilderExt, OpenOptionsExt};
use std::path::{Path, PathBuf};

use log::debug;

use crate::error::{DlError, DlResult};
use crate::relation::{Oid, RelFileLocator};

pub const LSF_RECORD_SIZE: usize = 512;
const LSF_DIR: &str = "pg_bulkload";

/// `{relation-oid, file-node locator, exist_cnt, create_cnt}`, padded to
/// one sector for torn-write safety.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LsfRecord {
    pub relation_oid: Oid,
    pub locator: RelFileLocator,
    /// Blocks before the load started.
    pub exist_cnt: u32,
    /// Blocks the writer has promised to disk so far.
    pub create_cnt: u32,
}

impl LsfRecord {
    pub fn total_blocks(&self) -> u32 {
        self.exist_cnt + self.create_cnt
    }

    fn encode(&self) -> [u8; LSF_RECORD_SIZE] {
        let mut buf = [0u8; LSF_RECORD_SIZE];
        buf[0..4].copy_from_slice(&self.relation_oid.to_le_bytes());
        buf[4..8].copy_from_slice(&self.locator.tablespace.to_le_bytes());
        buf[8..12].copy_from_slice(&self.locator.database.to_le_bytes());
        buf[12..16].copy_from_slice(&self.locator.relation.to_le_bytes());
        buf[16..20].copy_from_slice(&self.exist_cnt.to_le_bytes());
        buf[20..24].copy_from_slice(&self.create_cnt.to_le_bytes());
        buf
    }

    fn decode(buf: &[u8; LSF_RECORD_SIZE]) -> Self {
        Self {
            relation_oid: u32::from_le_bytes(buf[0..4].try_into().unwrap()),
            locator: RelFileLocator::new(
                u32::from_le_bytes(buf[4..8].try_into().unwrap()),
                u32::from_le_bytes(buf[8..12].try_into().unwrap()),
                u32::from_le_bytes(buf[12..16].try_into().unwrap()),
            ),
            exist_cnt: u32::from_le_bytes(buf[16..20].try_into().unwrap()),
            create_cnt: u32::from_le_bytes(buf[20..24].try_into().unwrap()),
        }
    }
}

/// Owns the file handle of one in-progress load's LSF. Exclusive
/// creation is itself the mutual-exclusion signal: if the file already
/// exists, the caller must instruct the user to run recovery.
pub struct LoadStatusFile {
    path: PathBuf,
    file: File,
    record: LsfRecord,
}

pub fn lsf_dir(datadir: &Path) -> PathBuf {
    datadir.join(LSF_DIR)
}

pub fn lsf_path(datadir: &Path, db_oid: Oid, rel_oid: Oid) -> PathBuf {
    lsf_dir(datadir).join(format!("{}.{}.loadstatus", db_oid, rel_oid))
}

impl LoadStatusFile {
    /// Creates the LSF with `O_CREAT|O_EXCL|0600`, ensuring the
    /// directory exists first (mode `0700`). Fsyncs an initial record
    /// with `create_cnt = 0` before returning.
    pub fn create(
        datadir: &Path,
        db_oid: Oid,
        rel_oid: Oid,
        locator: RelFileLocator,
        exist_cnt: u32,
    ) -> DlResult<Self> {
        let dir = lsf_dir(datadir);
        if !dir.exists() {
            fs::DirBuilder::new()
                .recursive(true)
                .mode(0o700)
                .create(&dir)?;
        }
        let path = lsf_path(datadir, db_oid, rel_oid);

        let file = match OpenOptions::new()
            .create_new(true)
            .read(true)
            .write(true)
            .mode(0o600)
            .open(&path)
        {
            Ok(f) => f,
            Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => {
                return Err(DlError::PreExistingLoad {
                    path: path.display().to_string(),
                });
            }
            Err(e) => return Err(e.into()),
        };

        let record = LsfRecord {
            relation_oid: rel_oid,
            locator,
            exist_cnt,
            create_cnt: 0,
        };
        let mut lsf = Self { path, file, record };
        lsf.write_and_sync()?;
        debug!("created LSF {} (exist_cnt={})", lsf.path.display(), exist_cnt);
        Ok(lsf)
    }

    pub fn record(&self) -> LsfRecord {
        self.record
    }

    /// Rewrites the record from offset 0 and fsyncs before returning.
    /// Callers advance `create_cnt` through this before the
    /// corresponding pages reach disk (LSF-before-data ordering).
    pub fn advance_create_cnt(&mut self, delta: u32) -> DlResult<()> {
        self.record.create_cnt += delta;
        self.write_and_sync()
    }

    fn write_and_sync(&mut self) -> DlResult<()> {
        self.file.seek(SeekFrom::Start(0))?;
        self.file.write_all(&self.record.encode())?;
        self.file.sync_all()?;
        Ok(())
    }

    /// Unlinks the LSF. Only called on a successful close of the
    /// writer.
    pub fn unlink(self) -> DlResult<()> {
        fs::remove_file(&self.path)?;
        Ok(())
    }

    /// Leaves the LSF on disk (abnormal close); the load is abandoned
    /// and any pages already written become Recovery's responsibility.
    pub fn leave_for_recovery(self) {
        debug!("leaving LSF {} for recovery", self.path.display());
    }

    pub fn read(path: &Path) -> DlResult<LsfRecord> {
        let mut file = File::open(path)?;
        let mut buf = [0u8; LSF_RECORD_SIZE];
        file.read_exact(&mut buf)?;
        Ok(LsfRecord::decode(&buf))
    }
}
