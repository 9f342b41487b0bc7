//! Explicit load context, threaded into every entry point instead of a
//! process-wide singleton (Design Notes §9: "Global `DataDir` /
//! `interrupted` flag → explicit context").

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crate::config::LoadConfig;
use crate::error::{DlError, DlResult};

/// `LoadContext { datadir, signal_flag, config }`.
///
/// Cheap to clone: the interrupt flag is shared via `Arc` so a caller
/// holding the original can set it from a signal handler while the
/// loader is mid-run.
#[derive(Clone)]
pub struct LoadContext {
    datadir: PathBuf,
    interrupted: Arc<AtomicBool>,
    pub config: LoadConfig,
}

impl LoadContext {
    pub fn new(datadir: impl Into<PathBuf>, config: LoadConfig) -> Self {
        Self {
            datadir: datadir.into(),
            interrupted: Arc::new(AtomicBool::new(false)),
            config,
        }
    }

    pub fn datadir(&self) -> &Path {
        &self.datadir
    }

    /// Sets the sticky interrupt flag. In a real process this is called
    /// from a `SIGINT` handler; callers here (and tests) call it
    /// directly.
    pub fn request_interrupt(&self) {
        self.interrupted.store(true, Ordering::SeqCst);
    }

    pub fn is_interrupted(&self) -> bool {
        self.interrupted.load(Ordering::SeqCst)
    }

    /// Checked at tuple boundaries (after `insert` returns, and at the
    /// top of `flush`) — never mid-syscall.
    pub fn check_interrupted(&self) -> DlResult<()> {
        if self.is_interrupted() {
            Err(DlError::Interrupted)
        } else {
            Ok(())
        }
    }
}
