//! Segment Writer (C2): opens, rotates, fsyncs and closes the data-file
//! segments of one relation, honoring the fixed segment size.

use std::fs::{File, OpenOptions};
use std::io::{self, Seek, SeekFrom, Write};
use std::path::PathBuf;

use log::{debug, warn};

use crate::error::DlResult;
use crate::page::header::RELSEG_SIZE;
use crate::relation::{ForkNumber, RelFileLocator};

pub struct SegmentWriter {
    locator: RelFileLocator,
    datadir: PathBuf,
    fork: ForkNumber,
    page_size: usize,
    segment_index: u32,
    file: File,
}

impl SegmentWriter {
    /// Resolves the path for `segment_index`, opens it create+write, and
    /// seeks to the start of the segment's next page (i.e. to its
    /// current end, which must already be page-aligned).
    pub fn open(
        datadir: &std::path::Path,
        locator: RelFileLocator,
        fork: ForkNumber,
        page_size: usize,
        segment_index: u32,
    ) -> DlResult<Self> {
        let path = locator.segment_path(datadir, fork, segment_index);
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let mut file = OpenOptions::new()
            .create(true)
            .read(true)
            .write(true)
            .open(&path)?;
        let end = file.seek(SeekFrom::End(0))?;
        debug_assert_eq!(
            end as usize % page_size,
            0,
            "segment file size must be a multiple of the page size"
        );
        debug!("segment writer opened {} at offset {}", path.display(), end);
        Ok(Self {
            locator,
            datadir: datadir.to_path_buf(),
            fork,
            page_size,
            segment_index,
            file,
        })
    }

    pub fn segment_index(&self) -> u32 {
        self.segment_index
    }

    /// Writes `n_blocks` page-sized buffers. Short writes are retried on
    /// `EINTR`/`EAGAIN`; any other error is fatal.
    pub fn write_blocks(&mut self, buffer: &[u8], n_blocks: usize) -> DlResult<()> {
        let want = n_blocks * self.page_size;
        debug_assert!(buffer.len() >= want);
        let mut written = 0;
        while written < want {
            match self.file.write(&buffer[written..want]) {
                Ok(0) => return Err(io::Error::from(io::ErrorKind::WriteZero).into()),
                Ok(n) => written += n,
                Err(e)
                    if e.kind() == io::ErrorKind::Interrupted
                        || e.kind() == io::ErrorKind::WouldBlock =>
                {
                    continue;
                }
                Err(e) => return Err(e.into()),
            }
        }
        Ok(())
    }

    /// Fsyncs then closes. Per the design, fsync/close failures here are
    /// user-visible as a WARNING rather than fatal, because by the time
    /// `close()` runs the LSF has already been removed only after this
    /// call already succeeded once for every prior segment.
    pub fn close(mut self) -> DlResult<()> {
        self.file.flush()?;
        if let Err(e) = self.file.sync_all() {
            warn!(
                "fsync of segment {} (index {}) failed: {}",
                self.locator.segment_path(&self.datadir, self.fork, self.segment_index).display(),
                self.segment_index,
                e
            );
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::page::header::BLCKSZ;

    #[test]
    fn write_and_reopen_preserves_offset() {
        let dir = tempfile::tempdir().unwrap();
        let locator = RelFileLocator::new(0, 1, 100);
        let mut seg =
            SegmentWriter::open(dir.path(), locator, ForkNumber::Main, BLCKSZ, 0).unwrap();
        let buf = vec![7u8; BLCKSZ * 2];
        seg.write_blocks(&buf, 2).unwrap();
        seg.close().unwrap();

        let path = locator.segment_path(dir.path(), ForkNumber::Main, 0);
        let size = std::fs::metadata(&path).unwrap().len();
        assert_eq!(size as usize, BLCKSZ * 2);
        assert_eq!(size as usize % BLCKSZ, 0);
    }
}
