//! End-to-end scenario exercising two successive loads into the same
//! relation through the public `run_load` pipeline: the second load's
//! unique index collides with a key the first load already placed.
//! `unique-enforced` only holds at the default zero duplicate budget
//! (spec.md §3: `unique-enforced ↔ index.isunique ∧ max_dup_errors =
//! 0`), so the collision is fatal — but the rejected tuple still lands
//! in the duplicate badfile before the error propagates.

use std::collections::HashMap;

use directload::checksum::NoChecksum;
use directload::config::{LoadConfig, OnDuplicateKeep};
use directload::context::LoadContext;
use directload::direct_writer::WriterTuning;
use directload::index::{IndexDefinition, ScanKey};
use directload::page::tuple::HeapTupleHeader;
use directload::page::HeapTuple;
use directload::relation::{ItemPointer, Oid, RelFileLocator};
use directload::relation_access::{FixedCatalog, FixedTable};
use directload::toast::PassthroughToaster;
use directload::visibility::FixedVisibility;
use directload::wal::NullWal;
use directload::{run_load, IndexPaths};

struct UniqueValueIndex {
    oid: Oid,
}

impl IndexDefinition for UniqueValueIndex {
    fn oid(&self) -> Oid {
        self.oid
    }
    fn is_btree(&self) -> bool {
        true
    }
    fn is_unique(&self) -> bool {
        true
    }
    fn scan_keys(&self) -> Vec<ScanKey> {
        vec![ScanKey::asc()]
    }
    fn predicate_holds(&self, _tuple: &HeapTuple) -> bool {
        true
    }
    fn extract_key(&self, tuple: &HeapTuple) -> Vec<Option<i64>> {
        vec![Some(tuple.data[0] as i64)]
    }
}

fn tuple(v: u8) -> HeapTuple {
    HeapTuple {
        header: HeapTupleHeader {
            xmin: 0,
            xmax: 0,
            cmin: 0,
            infomask: 0,
            ctid: ItemPointer::new(0, 0),
        },
        data: vec![v],
    }
}

fn catalog_for(table: &str, locator: RelFileLocator, block_count: u32) -> FixedCatalog {
    let mut tables = HashMap::new();
    tables.insert(
        table.to_string(),
        FixedTable {
            locator,
            relation_oid: locator.relation,
            block_count,
            logged: true,
        },
    );
    FixedCatalog {
        database_oid: locator.database,
        tables,
    }
}

#[test]
fn second_load_colliding_on_unique_key_is_fatal_but_logged_to_badfile() {
    let dir = tempfile::tempdir().unwrap();
    let locator = RelFileLocator::new(0, 1, 900);
    let badfile_path = dir.path().join("rejects.bad");
    let index_oid: Oid = 42;

    // default DUPLICATE_ERRORS (0): uniqueness is enforced, and the
    // first collision is fatal.
    let make_config = || {
        LoadConfig::builder("accounts")
            .on_duplicate_keep(OnDuplicateKeep::New)
            .duplicate_badfile(badfile_path.clone())
            .build()
            .unwrap()
    };
    let visibility = FixedVisibility::new();

    // First load: three distinct keys into a fresh index.
    let catalog_1 = catalog_for("accounts", locator, 0);
    let ctx_1 = LoadContext::new(dir.path(), make_config());
    let v1_path = dir.path().join("index_v1.bt");
    let paths_1: HashMap<Oid, IndexPaths> = [(
        index_oid,
        IndexPaths {
            old_path: None,
            new_path: v1_path.clone(),
        },
    )]
    .into_iter()
    .collect();

    let outcome_1 = run_load(
        &ctx_1,
        &catalog_1,
        vec![Box::new(UniqueValueIndex { oid: index_oid })],
        Box::new(PassthroughToaster),
        Box::new(NullWal),
        Box::new(NoChecksum),
        10,
        1,
        WriterTuning::default(),
        [1u8, 2, 3].into_iter().map(tuple),
        &paths_1,
        &visibility,
        &directload::index::RecordingReindexer::default(),
    )
    .unwrap();
    assert_eq!(outcome_1.merge_outcomes[0].1.entries_written, 3);

    // Second load: one fresh key (4) and one collision with the first
    // load's key 2, merged against the first load's finished index.
    let catalog_2 = catalog_for("accounts", locator, 1);
    let ctx_2 = LoadContext::new(dir.path(), make_config());
    let v2_path = dir.path().join("index_v2.bt");
    let paths_2: HashMap<Oid, IndexPaths> = [(
        index_oid,
        IndexPaths {
            old_path: Some(v1_path.clone()),
            new_path: v2_path.clone(),
        },
    )]
    .into_iter()
    .collect();

    let err = run_load(
        &ctx_2,
        &catalog_2,
        vec![Box::new(UniqueValueIndex { oid: index_oid })],
        Box::new(PassthroughToaster),
        Box::new(NullWal),
        Box::new(NoChecksum),
        11,
        1,
        WriterTuning::default(),
        [2u8, 4].into_iter().map(tuple),
        &paths_2,
        &visibility,
        &directload::index::RecordingReindexer::default(),
    )
    .unwrap_err();
    assert!(err.is_fatal_budget());

    // the rejected tid was recorded before the budget-exhaustion error
    // propagated.
    let badfile_contents = std::fs::read_to_string(&badfile_path).unwrap();
    assert_eq!(badfile_contents.lines().count(), 1);
}
