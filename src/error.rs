use std::{fmt, io};

/// Crate-wide error type.
///
/// Variants line up with the error kinds enumerated in the design's
/// error-handling section: configuration, pre-existing load, per-tuple,
/// I/O, corruption and interrupt.
#[derive(Debug)]
pub enum DlError {
    /// Invalid keyword/value or missing target table. Reported before any
    /// side effect.
    Config(String),

    /// A Load Status File for the target relation already exists.
    PreExistingLoad { path: String },

    /// A single tuple could not be placed (too large after TOAST, or a
    /// unique collision). `budget_exhausted` is set once the configured
    /// `DUPLICATE_ERRORS` budget has been spent, at which point the
    /// caller must treat this as fatal.
    PerTuple {
        reason: String,
        budget_exhausted: bool,
    },

    /// Write/fsync/close of a data file or the LSF.
    Io(io::Error),

    /// Invalid page header or B-tree meta page; recommends REINDEX.
    Corruption(String),

    /// `SIGINT` observed at a tuple boundary.
    Interrupted,

    /// Anything else fatal, in the free-text style of the teacher's
    /// `SimpleError`.
    Fatal(String),
}

pub type DlResult<T> = Result<T, DlError>;

impl DlError {
    pub fn fatal(msg: impl Into<String>) -> Self {
        DlError::Fatal(msg.into())
    }

    pub fn config(msg: impl Into<String>) -> Self {
        DlError::Config(msg.into())
    }

    pub fn corruption(msg: impl Into<String>) -> Self {
        DlError::Corruption(msg.into())
    }

    /// Per-tuple errors are recoverable until the duplicate/error budget
    /// is spent; this reports whether the caller should now abort.
    pub fn is_fatal_budget(&self) -> bool {
        matches!(
            self,
            DlError::PerTuple {
                budget_exhausted: true,
                ..
            }
        )
    }
}

impl fmt::Display for DlError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            DlError::Config(msg) => write!(f, "configuration error: {}", msg),
            DlError::PreExistingLoad { path } => write!(
                f,
                "load status file already exists at {}; run recovery first",
                path
            ),
            DlError::PerTuple { reason, .. } => write!(f, "tuple rejected: {}", reason),
            DlError::Io(e) => write!(f, "i/o error: {}", e),
            DlError::Corruption(msg) => write!(f, "corrupt on-disk structure: {} (REINDEX recommended)", msg),
            DlError::Interrupted => write!(f, "interrupted"),
            DlError::Fatal(msg) => write!(f, "{}", msg),
        }
    }
}

impl std::error::Error for DlError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            DlError::Io(e) => Some(e),
            _ => None,
        }
    }
}

impl From<io::Error> for DlError {
    fn from(e: io::Error) -> Self {
        DlError::Io(e)
    }
}
