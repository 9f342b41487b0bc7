//! Direct Writer (C4): orchestrates the Page Builder, Segment Writer
//! and LSF. Receives tuples, toasts oversize ones, packs them into a
//! ring of page buffers, flushes the ring when full, emits the
//! first-page WAL record, and keeps the LSF strictly ahead of the data
//! files it writes.

use log::{debug, info};

use crate::checksum::PageChecksum;
use crate::config::DuplicateErrorBudget;
use crate::context::LoadContext;
use crate::error::{DlError, DlResult};
use crate::index::{IndexDefinition, IndexSpool, IndexSpooler, ReindexTarget};
use crate::lsf::LoadStatusFile;
use crate::page::builder::SIZE_OF_ITEM_ID;
use crate::page::header::{maxalign, toast_tuple_threshold, SIZE_OF_PAGE_HEADER};
use crate::page::tuple::{tuple_stamp_for_load, CommandId, TransactionId};
use crate::page::{HeapTuple, Page, BLCKSZ, RELSEG_SIZE};
use crate::relation::{ForkNumber, ItemPointer, RelFileLocator};
use crate::relation_access::RelationAccess;
use crate::segment::SegmentWriter;
use crate::toast::Toaster;
use crate::wal::WalSink;

const DEFAULT_RING_SIZE: usize = 1024;

/// Tunable knobs that don't belong in `LoadConfig` (which mirrors the
/// user-facing option table of spec.md §6): the page-buffer ring size
/// and the per-page fillfactor reserve.
#[derive(Debug, Clone, Copy)]
pub struct WriterTuning {
    pub ring_size: usize,
    pub fillfactor_reserve: usize,
}

impl Default for WriterTuning {
    fn default() -> Self {
        Self {
            ring_size: DEFAULT_RING_SIZE,
            fillfactor_reserve: 0,
        }
    }
}

/// Orchestrates C1-C3 for one load. Generic over the relation-access
/// collaborator so the exclusive-lock guard's type is known statically
/// rather than boxed (Design Notes §9: the guard is a value with
/// guaranteed release tied to load lifetime).
pub struct DirectWriter<R: RelationAccess> {
    ctx: LoadContext,
    table: String,
    locator: RelFileLocator,
    is_logged: bool,
    _lock: R::Lock,

    lsf: Option<LoadStatusFile>,
    segment: Option<SegmentWriter>,
    segment_index: u32,

    ring: Vec<Page>,
    tuning: WriterTuning,
    curblk: usize,
    page_size: usize,

    xid: TransactionId,
    cid: CommandId,

    toaster: Box<dyn Toaster>,
    wal: Box<dyn WalSink>,
    checksum: Box<dyn PageChecksum>,

    spooler: IndexSpooler,
    indexes: Vec<Box<dyn IndexDefinition>>,
}

impl<R: RelationAccess> DirectWriter<R> {
    /// `init`: takes the exclusive lock, verifies insertability,
    /// computes `exist_cnt`, creates the LSF, and initializes the
    /// page-buffer ring with `curblk = 0`.
    #[allow(clippy::too_many_arguments)]
    pub fn init(
        ctx: &LoadContext,
        relation_access: &R,
        indexes: Vec<Box<dyn IndexDefinition>>,
        toaster: Box<dyn Toaster>,
        wal: Box<dyn WalSink>,
        checksum: Box<dyn PageChecksum>,
        xid: TransactionId,
        cid: CommandId,
        tuning: WriterTuning,
    ) -> DlResult<Self> {
        let table = ctx.config.table.clone();
        let lock = relation_access.lock_exclusive(&table)?;
        relation_access.check_insertable(&table)?;

        let locator = relation_access.locator(&table)?;
        let relation_oid = relation_access.relation_oid(&table)?;
        let is_logged = relation_access.is_logged(&table)?;
        let exist_cnt = relation_access.block_count(&table)?;
        let db_oid = relation_access.database_oid();

        let lsf = LoadStatusFile::create(ctx.datadir(), db_oid, relation_oid, locator, exist_cnt)?;
        info!(
            "direct writer init: table={} exist_cnt={} logged={}",
            table, exist_cnt, is_logged
        );

        let max_dup_errors_is_zero =
            matches!(ctx.config.duplicate_errors, DuplicateErrorBudget::Finite(0));
        let spooler = IndexSpooler::init(&indexes, max_dup_errors_is_zero);

        Ok(Self {
            ctx: ctx.clone(),
            table,
            locator,
            is_logged,
            _lock: lock,
            lsf: Some(lsf),
            segment: None,
            segment_index: exist_cnt / RELSEG_SIZE,
            ring: vec![Page::init(BLCKSZ, 0)],
            tuning,
            curblk: 0,
            page_size: BLCKSZ,
            xid,
            cid,
            toaster,
            wal,
            checksum,
            spooler,
            indexes,
        })
    }

    fn max_heap_tuple_size(&self) -> usize {
        self.page_size - SIZE_OF_PAGE_HEADER - SIZE_OF_ITEM_ID
    }

    fn lsf_mut(&mut self) -> &mut LoadStatusFile {
        self.lsf.as_mut().expect("lsf present for the life of the writer")
    }

    fn lsf(&self) -> &LoadStatusFile {
        self.lsf.as_ref().expect("lsf present for the life of the writer")
    }

    /// `insert`: toasts oversize tuples, rejects ones still too large,
    /// advances the ring on a full page, stamps the tuple and writes
    /// its final `ctid` back, then routes it to the Index Spooler.
    pub fn insert(&mut self, tuple: HeapTuple) -> DlResult<()> {
        self.ctx.check_interrupted()?;

        let mut tuple = tuple;
        if tuple.len() > toast_tuple_threshold(self.page_size) {
            tuple = self.toaster.toast(tuple)?;
        }

        let aligned_len = maxalign(tuple.len());
        if aligned_len > self.max_heap_tuple_size() {
            return Err(DlError::PerTuple {
                reason: format!(
                    "tuple of aligned length {} exceeds MaxHeapTupleSize {}",
                    aligned_len,
                    self.max_heap_tuple_size()
                ),
                budget_exhausted: true,
            });
        }

        let needed = aligned_len + self.tuning.fillfactor_reserve;
        if self.ring[self.curblk].free_space() < needed {
            self.advance_curblk()?;
        }

        tuple_stamp_for_load(&mut tuple, self.xid, self.cid, ItemPointer::new(0, 0));
        let placeholder_bytes = tuple.to_bytes();
        let offnum = self.ring[self.curblk].add_item(&placeholder_bytes)?;

        let blockno = self.lsf().record().total_blocks() + self.curblk as u32;
        let ctid = ItemPointer::new(blockno, offnum);
        tuple.header.ctid = ctid;
        let final_bytes = tuple.to_bytes();
        self.ring[self.curblk].overwrite_item(offnum, &final_bytes);

        self.spooler.route_tuple(&tuple, &self.indexes)?;
        Ok(())
    }

    /// Advances `curblk`; wraps to 0 (flushing first) once the ring
    /// fills, then page-inits the new current buffer.
    fn advance_curblk(&mut self) -> DlResult<()> {
        self.curblk += 1;
        if self.curblk == self.tuning.ring_size {
            // flush() already resets curblk to 0 and re-inits ring[0].
            return self.flush();
        }
        if self.curblk == self.ring.len() {
            self.ring.push(Page::init(self.page_size, 0));
        } else {
            self.ring[self.curblk] = Page::init(self.page_size, 0);
        }
        Ok(())
    }

    /// `flush`: determines how many ring buffers are ready, emits the
    /// first-page WAL record if this is the very first flush of a
    /// logged relation, then writes pages through the segmented write
    /// loop, advancing the LSF strictly before each write.
    pub fn flush(&mut self) -> DlResult<()> {
        self.ctx.check_interrupted()?;

        let num = if self.curblk >= self.ring.len() {
            // ring filled to capacity: every slot 0..curblk holds a
            // written page, there's no fresh current buffer to check.
            self.curblk
        } else if self.ring[self.curblk].is_empty() {
            self.curblk
        } else {
            self.curblk + 1
        };
        if num == 0 {
            return Ok(());
        }

        if self.lsf().record().create_cnt == 0 && self.is_logged {
            let blockno = self.lsf().record().exist_cnt;
            let lsn = self
                .wal
                .log_newpage(&self.locator, ForkNumber::Main, blockno, self.ring[0].as_bytes())?;
            self.wal.flush(lsn)?;
            self.ring[0].set_lsn(lsn);
            debug!("first-page WAL emitted and flushed: lsn={}", lsn);
        }

        let mut i = 0;
        while i < num {
            let total = self.lsf().record().total_blocks();
            let target_segment = total / RELSEG_SIZE;
            if self.segment.is_some() && self.segment_index != target_segment {
                self.segment.take().unwrap().close()?;
            }
            self.segment_index = target_segment;
            if self.segment.is_none() {
                self.segment = Some(SegmentWriter::open(
                    self.ctx.datadir(),
                    self.locator,
                    ForkNumber::Main,
                    self.page_size,
                    self.segment_index,
                )?);
            }

            let remaining_in_segment = (RELSEG_SIZE - total % RELSEG_SIZE) as usize;
            let flush_num = (num - i).min(remaining_in_segment);

            // LSF-before-data: the create_cnt bump must be durable
            // before the corresponding bytes hit the segment file.
            self.lsf_mut().advance_create_cnt(flush_num as u32)?;

            let mut buf = Vec::with_capacity(flush_num * self.page_size);
            for (offset, page) in self.ring[i..i + flush_num].iter_mut().enumerate() {
                page.finalize_checksum(total + offset as u32, self.checksum.as_ref());
                buf.extend_from_slice(page.as_bytes());
            }
            self.segment.as_mut().unwrap().write_blocks(&buf, flush_num)?;

            i += flush_num;
        }

        self.ring.truncate(1);
        self.ring[0] = Page::init(self.page_size, 0);
        self.curblk = 0;
        Ok(())
    }

    /// `close`: on a normal close, flushes remaining pages and fsyncs +
    /// unlinks the LSF, returning the finished spools for the Merge
    /// Builder to consume. On error, the buffers are discarded
    /// untouched and the LSF is left on disk for Recovery — per the
    /// Failure semantics and Design Notes §9 (the guard's drop
    /// distinguishes committed vs abandoned state), not the literal
    /// close() bullet text, which both unlink and leave-for-recovery
    /// reach: that inconsistency is resolved toward leave-for-recovery.
    pub fn close(mut self, on_error: bool) -> DlResult<(Vec<IndexSpool>, Vec<ReindexTarget>)> {
        if !on_error {
            self.flush()?;
        }

        if let Some(seg) = self.segment.take() {
            seg.close()?;
        }

        match self.lsf.take() {
            Some(lsf) if on_error => lsf.leave_for_recovery(),
            Some(lsf) => lsf.unlink()?,
            None => {}
        }

        info!("direct writer closed: table={} on_error={}", self.table, on_error);
        Ok(self.spooler.into_parts())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::checksum::NoChecksum;
    use crate::config::LoadConfig;
    use crate::page::tuple::HeapTupleHeader;
    use crate::relation_access::{FixedCatalog, FixedTable};
    use crate::toast::PassthroughToaster;
    use crate::wal::{NullWal, RecordingWal};
    use std::collections::HashMap;
    use std::sync::Arc;

    impl WalSink for Arc<RecordingWal> {
        fn log_newpage(
            &self,
            locator: &RelFileLocator,
            fork: ForkNumber,
            blocknum: crate::relation::BlockNumber,
            page: &[u8],
        ) -> DlResult<crate::wal::Lsn> {
            (**self).log_newpage(locator, fork, blocknum, page)
        }
        fn flush(&self, lsn: crate::wal::Lsn) -> DlResult<()> {
            (**self).flush(lsn)
        }
    }

    fn catalog_with(table: &str, locator: RelFileLocator, block_count: u32, logged: bool) -> FixedCatalog {
        let mut tables = HashMap::new();
        tables.insert(
            table.to_string(),
            FixedTable {
                locator,
                relation_oid: locator.relation,
                block_count,
                logged,
            },
        );
        FixedCatalog {
            database_oid: locator.database,
            tables,
        }
    }

    fn plain_tuple(n: usize) -> HeapTuple {
        HeapTuple {
            header: HeapTupleHeader {
                xmin: 0,
                xmax: 0,
                cmin: 0,
                infomask: 0,
                ctid: ItemPointer::new(0, 0),
            },
            data: vec![7u8; n],
        }
    }

    fn ctx(datadir: &std::path::Path) -> LoadContext {
        let config = LoadConfig::builder("orders").build().unwrap();
        LoadContext::new(datadir, config)
    }

    #[test]
    fn empty_load_writes_no_pages_and_unlinks_lsf() {
        let dir = tempfile::tempdir().unwrap();
        let locator = RelFileLocator::new(0, 1, 100);
        let catalog = catalog_with("orders", locator, 0, true);
        let writer = DirectWriter::init(
            &ctx(dir.path()),
            &catalog,
            vec![],
            Box::new(PassthroughToaster),
            Box::new(NullWal),
            Box::new(NoChecksum),
            777,
            1,
            WriterTuning::default(),
        )
        .unwrap();

        let lsf_path = crate::lsf::lsf_path(dir.path(), 1, 100);
        assert!(lsf_path.exists());

        let (spools, reindex) = writer.close(false).unwrap();
        assert!(spools.is_empty());
        assert!(reindex.is_empty());
        assert!(!lsf_path.exists());

        let seg_path = locator.segment_path(dir.path(), ForkNumber::Main, 0);
        assert!(!seg_path.exists());
    }

    #[test]
    fn five_small_tuples_fit_on_one_page_and_emit_wal() {
        let dir = tempfile::tempdir().unwrap();
        let locator = RelFileLocator::new(0, 1, 200);
        let catalog = catalog_with("orders", locator, 0, true);
        let wal = Arc::new(RecordingWal::new());

        let mut writer = DirectWriter::init(
            &ctx(dir.path()),
            &catalog,
            vec![],
            Box::new(PassthroughToaster),
            Box::new(wal.clone()),
            Box::new(NoChecksum),
            1,
            1,
            WriterTuning::default(),
        )
        .unwrap();

        for _ in 0..5 {
            writer.insert(plain_tuple(100)).unwrap();
        }

        let (_, _) = writer.close(false).unwrap();

        assert_eq!(wal.records().len(), 1);
        assert_eq!(wal.flushed_up_to(), 1);

        let seg_path = locator.segment_path(dir.path(), ForkNumber::Main, 0);
        let size = std::fs::metadata(&seg_path).unwrap().len();
        assert_eq!(size as usize, BLCKSZ);
    }

    #[test]
    fn checksum_is_stamped_into_written_pages_when_enabled() {
        let dir = tempfile::tempdir().unwrap();
        let locator = RelFileLocator::new(0, 1, 250);
        let catalog = catalog_with("orders", locator, 0, true);

        let mut writer = DirectWriter::init(
            &ctx(dir.path()),
            &catalog,
            vec![],
            Box::new(PassthroughToaster),
            Box::new(NullWal),
            Box::new(crate::checksum::Crc32cChecksum),
            1,
            1,
            WriterTuning::default(),
        )
        .unwrap();
        writer.insert(plain_tuple(100)).unwrap();
        writer.close(false).unwrap();

        let seg_path = locator.segment_path(dir.path(), ForkNumber::Main, 0);
        let bytes = std::fs::read(&seg_path).unwrap();
        let hdr = crate::page::header::PageHeader::read_from(&bytes);
        assert_ne!(hdr.checksum, 0);
    }

    #[test]
    fn checksum_stays_zero_when_disabled() {
        let dir = tempfile::tempdir().unwrap();
        let locator = RelFileLocator::new(0, 1, 260);
        let catalog = catalog_with("orders", locator, 0, true);

        let mut writer = DirectWriter::init(
            &ctx(dir.path()),
            &catalog,
            vec![],
            Box::new(PassthroughToaster),
            Box::new(NullWal),
            Box::new(NoChecksum),
            1,
            1,
            WriterTuning::default(),
        )
        .unwrap();
        writer.insert(plain_tuple(100)).unwrap();
        writer.close(false).unwrap();

        let seg_path = locator.segment_path(dir.path(), ForkNumber::Main, 0);
        let bytes = std::fs::read(&seg_path).unwrap();
        let hdr = crate::page::header::PageHeader::read_from(&bytes);
        assert_eq!(hdr.checksum, 0);
    }

    #[test]
    fn ctid_matches_final_placement() {
        let dir = tempfile::tempdir().unwrap();
        let locator = RelFileLocator::new(0, 1, 300);
        let catalog = catalog_with("orders", locator, 0, true);

        let indexes: Vec<Box<dyn IndexDefinition>> = vec![];
        let mut writer = DirectWriter::init(
            &ctx(dir.path()),
            &catalog,
            indexes,
            Box::new(PassthroughToaster),
            Box::new(NullWal),
            Box::new(NoChecksum),
            1,
            1,
            WriterTuning::default(),
        )
        .unwrap();

        writer.insert(plain_tuple(50)).unwrap();
        writer.insert(plain_tuple(50)).unwrap();

        let first = HeapTupleHeader::read_from(writer.ring[0].item_bytes(1));
        let second = HeapTupleHeader::read_from(writer.ring[0].item_bytes(2));
        assert_eq!(first.ctid, ItemPointer::new(0, 1));
        assert_eq!(second.ctid, ItemPointer::new(0, 2));

        writer.close(false).unwrap();
    }

    #[test]
    fn segment_boundary_is_crossed_mid_load() {
        let dir = tempfile::tempdir().unwrap();
        let locator = RelFileLocator::new(0, 1, 400);
        // start 3 pages short of a segment boundary: 10 one-page-sized
        // tuples should leave 3 pages in segment 0, 7 in segment 1.
        let exist_cnt = RELSEG_SIZE - 3;
        let catalog = catalog_with("orders", locator, exist_cnt, true);

        let mut writer = DirectWriter::init(
            &ctx(dir.path()),
            &catalog,
            vec![],
            Box::new(PassthroughToaster),
            Box::new(NullWal),
            Box::new(NoChecksum),
            1,
            1,
            WriterTuning::default(),
        )
        .unwrap();

        // a tuple big enough that only one fits per page, forcing a new
        // page (and a flush at the ring boundary) for each insert.
        let big = BLCKSZ / 2 + 100;
        for _ in 0..10 {
            writer.insert(plain_tuple(big)).unwrap();
        }
        writer.close(false).unwrap();

        let seg0 = locator.segment_path(dir.path(), ForkNumber::Main, 0);
        let seg1 = locator.segment_path(dir.path(), ForkNumber::Main, 1);
        let size0 = std::fs::metadata(&seg0).unwrap().len() as usize;
        let size1 = std::fs::metadata(&seg1).unwrap().len() as usize;
        assert_eq!(size0 / BLCKSZ, 3);
        assert_eq!(size1 / BLCKSZ, 7);
    }

    #[test]
    fn oversize_tuple_is_fatal_after_toast() {
        let dir = tempfile::tempdir().unwrap();
        let locator = RelFileLocator::new(0, 1, 500);
        let catalog = catalog_with("orders", locator, 0, true);
        let mut writer = DirectWriter::init(
            &ctx(dir.path()),
            &catalog,
            vec![],
            Box::new(PassthroughToaster),
            Box::new(NullWal),
            Box::new(NoChecksum),
            1,
            1,
            WriterTuning::default(),
        )
        .unwrap();

        let err = writer.insert(plain_tuple(BLCKSZ)).unwrap_err();
        assert!(err.is_fatal_budget());
    }
}
