//! Configuration options the core recognises (see spec.md §6).

use std::path::PathBuf;

use crate::error::{DlError, DlResult};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OnDuplicateKeep {
    New,
    Old,
}

impl Default for OnDuplicateKeep {
    fn default() -> Self {
        OnDuplicateKeep::New
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DuplicateErrorBudget {
    Finite(u64),
    Infinite,
}

impl DuplicateErrorBudget {
    pub fn exhausted_by(&self, count: u64) -> bool {
        match self {
            DuplicateErrorBudget::Finite(max) => count > *max,
            DuplicateErrorBudget::Infinite => false,
        }
    }
}

impl Default for DuplicateErrorBudget {
    fn default() -> Self {
        DuplicateErrorBudget::Finite(0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriterKind {
    /// Implemented by this crate.
    Direct,
    /// Normal insert path; out of scope here.
    Buffered,
}

#[derive(Debug, Clone)]
pub struct LoadConfig {
    pub table: String,
    pub on_duplicate_keep: OnDuplicateKeep,
    pub duplicate_errors: DuplicateErrorBudget,
    pub duplicate_badfile: Option<PathBuf>,
    pub truncate: bool,
    pub writer: WriterKind,
}

impl LoadConfig {
    pub fn builder(table: impl Into<String>) -> LoadConfigBuilder {
        LoadConfigBuilder {
            table: table.into(),
            on_duplicate_keep: OnDuplicateKeep::default(),
            duplicate_errors: DuplicateErrorBudget::default(),
            duplicate_badfile: None,
            truncate: false,
            writer: WriterKind::Direct,
        }
    }

    /// Validates the configuration before any side effect, per the
    /// "Configuration" error kind: invalid keyword/value or missing
    /// target table.
    pub fn validate(&self) -> DlResult<()> {
        if self.table.trim().is_empty() {
            return Err(DlError::config("TABLE is required"));
        }
        Ok(())
    }
}

pub struct LoadConfigBuilder {
    table: String,
    on_duplicate_keep: OnDuplicateKeep,
    duplicate_errors: DuplicateErrorBudget,
    duplicate_badfile: Option<PathBuf>,
    truncate: bool,
    writer: WriterKind,
}

impl LoadConfigBuilder {
    pub fn on_duplicate_keep(mut self, v: OnDuplicateKeep) -> Self {
        self.on_duplicate_keep = v;
        self
    }

    pub fn duplicate_errors(mut self, v: DuplicateErrorBudget) -> Self {
        self.duplicate_errors = v;
        self
    }

    pub fn duplicate_badfile(mut self, v: impl Into<PathBuf>) -> Self {
        self.duplicate_badfile = Some(v.into());
        self
    }

    pub fn truncate(mut self, v: bool) -> Self {
        self.truncate = v;
        self
    }

    pub fn writer(mut self, v: WriterKind) -> Self {
        self.writer = v;
        self
    }

    pub fn build(self) -> DlResult<LoadConfig> {
        let cfg = LoadConfig {
            table: self.table,
            on_duplicate_keep: self.on_duplicate_keep,
            duplicate_errors: self.duplicate_errors,
            duplicate_badfile: self.duplicate_badfile,
            truncate: self.truncate,
            writer: self.writer,
        };
        cfg.validate()?;
        Ok(cfg)
    }
}
