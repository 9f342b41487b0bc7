//! Write-ahead log boundary. Only the `log_newpage` primitive is
//! emitted by the core; WAL insert/flush themselves are the host
//! database's concern and are modeled here as a narrow trait.

use crate::error::DlResult;
use crate::relation::{BlockNumber, ForkNumber, RelFileLocator};

pub type Lsn = u64;

pub trait WalSink {
    /// Emits a `log_newpage(locator, fork, blocknum, page)` record and
    /// returns its LSN. The caller is responsible for flushing that LSN
    /// before the corresponding data write.
    fn log_newpage(
        &self,
        locator: &RelFileLocator,
        fork: ForkNumber,
        blocknum: BlockNumber,
        page: &[u8],
    ) -> DlResult<Lsn>;

    /// Flushes the WAL up to and including `lsn`.
    fn flush(&self, lsn: Lsn) -> DlResult<()>;
}

/// Used for unlogged/temp relations: no WAL record is ever needed, and
/// Recovery is correspondingly not performed for them (see the Open
/// Questions resolution in SPEC_FULL.md).
pub struct NullWal;

impl WalSink for NullWal {
    fn log_newpage(
        &self,
        _locator: &RelFileLocator,
        _fork: ForkNumber,
        _blocknum: BlockNumber,
        _page: &[u8],
    ) -> DlResult<Lsn> {
        Ok(0)
    }

    fn flush(&self, _lsn: Lsn) -> DlResult<()> {
        Ok(())
    }
}

/// Test double that records every emitted record so assertions can
/// check "exactly one first-page record was emitted, and it was
/// flushed before any data write".
#[derive(Default)]
pub struct RecordingWal {
    records: std::sync::Mutex<Vec<(RelFileLocator, ForkNumber, BlockNumber)>>,
    flushed_up_to: std::sync::Mutex<Lsn>,
}

impl RecordingWal {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn records(&self) -> Vec<(RelFileLocator, ForkNumber, BlockNumber)> {
        self.records.lock().unwrap().clone()
    }

    pub fn flushed_up_to(&self) -> Lsn {
        *self.flushed_up_to.lock().unwrap()
    }
}

impl WalSink for RecordingWal {
    fn log_newpage(
        &self,
        locator: &RelFileLocator,
        fork: ForkNumber,
        blocknum: BlockNumber,
        _page: &[u8],
    ) -> DlResult<Lsn> {
        let mut records = self.records.lock().unwrap();
        records.push((*locator, fork, blocknum));
        Ok(records.len() as Lsn)
    }

    fn flush(&self, lsn: Lsn) -> DlResult<()> {
        *self.flushed_up_to.lock().unwrap() = lsn;
        Ok(())
    }
}
