//! Integration tests for the storage layer
//!
//! These tests exercise the catalog as a complete store:
//! - Ledger handles sharing one file-backed catalog
//! - Write-through persistence and reopen
//! - Several handles on one file
//! - Ledger operations under concurrent handles
//! - Property checks on stage updates and integrity sidecars

use std::collections::BTreeSet;
use std::fs;
use std::sync::Arc;
use std::thread;

use proptest::prelude::*;
use serde_json::json;
use tempfile::TempDir;

use tarflow_core::metadata::{INDEX_MAP, TARBALL_PATH};
use tarflow_core::{Dataset, DatasetCatalog, MetadataStore, Operation, SyncLedger};
use tarflow_storage::{hash_file, read_sidecar, sidecar_path, verify, write_sidecar, Catalog};

// ============================================================================
// Helper Functions
// ============================================================================

fn dataset(name: &str) -> Dataset {
    Dataset::new(name, format!("{:032x}", name.len() * 7919), "owner")
}

fn stage_strategy() -> impl Strategy<Value = Operation> {
    prop::sample::select(Operation::ALL.to_vec())
}

// ============================================================================
// Persistence
// ============================================================================

#[test]
fn test_reopen_sees_every_mutation() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("catalog.json");
    {
        let catalog = Arc::new(Catalog::open(&path).unwrap());
        let ds = Dataset::new("run-1", "ABCDEF", "alice");
        catalog.register(ds.clone(), &dir.path().join("run-1.tar.xz")).unwrap();
        catalog.set_value(&ds, INDEX_MAP, json!({ "idx": ["a"] })).unwrap();
        catalog.ledger(Operation::Backup).error(&ds, "no sidecar").unwrap();
    }

    let catalog = Catalog::open(&path).unwrap();
    let ds = catalog.attach("abcdef").unwrap();
    assert_eq!(ds.name, "run-1");
    assert_eq!(catalog.enabled_stages("run-1"), vec![Operation::Backup]);
    assert_eq!(
        catalog.get_value(&ds, INDEX_MAP).unwrap(),
        Some(json!({ "idx": ["a"] }))
    );
    assert!(catalog.get_value(&ds, TARBALL_PATH).unwrap().is_some());
    assert_eq!(catalog.errors("run-1")["BACKUP"], "no sidecar");
}

#[test]
fn test_two_handles_on_one_file_keep_both_updates() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("catalog.json");
    let backup_run = Catalog::open(&path).unwrap();
    let accept_run = Catalog::open(&path).unwrap();

    backup_run
        .register(Dataset::new("new-run", "aaa", "alice"), &dir.path().join("new-run.tar.xz"))
        .unwrap();
    accept_run
        .register(Dataset::new("other", "bbb", "bob"), &dir.path().join("other.tar.xz"))
        .unwrap();

    let reopened = Catalog::open(&path).unwrap();
    let names: Vec<String> = reopened.datasets().into_iter().map(|d| d.name).collect();
    assert_eq!(names, vec!["new-run", "other"]);
    assert_eq!(reopened.enabled_stages("new-run"), vec![Operation::Backup]);
    assert!(path.with_file_name("catalog.json.lock").exists());
}

#[test]
fn test_ledger_sees_updates_from_another_handle() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("catalog.json");
    let first = Arc::new(Catalog::open(&path).unwrap());
    let second = Arc::new(Catalog::open(&path).unwrap());
    let ds = Dataset::new("ds1", "abc", "owner");
    first.register(ds.clone(), &dir.path().join("ds1.tar.xz")).unwrap();

    let ledger = second.ledger(Operation::Backup);
    assert_eq!(ledger.next(Operation::Backup).unwrap(), vec![ds.clone()]);
    assert!(second.get_value(&ds, TARBALL_PATH).unwrap().is_some());

    first
        .ledger(Operation::Backup)
        .update(&ds, Operation::Backup, Operation::Backup.successors())
        .unwrap();
    // already completed elsewhere, so not offered again
    assert!(ledger.next(Operation::Backup).unwrap().is_empty());
    assert_eq!(
        second.enabled_stages("ds1"),
        vec![Operation::CopySos, Operation::Unpack]
    );
}

#[test]
fn test_refresh_is_noop_for_in_memory_catalog() {
    let catalog = Catalog::in_memory();
    catalog.insert_dataset(dataset("ds1")).unwrap();
    catalog.refresh().unwrap();
    assert!(catalog.dataset("ds1").is_some());
}

#[test]
fn test_corrupt_catalog_file_is_an_error() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("catalog.json");
    fs::write(&path, "{ not json").unwrap();
    assert!(Catalog::open(&path).is_err());
}

#[test]
fn test_handles_for_different_components_share_state() {
    let catalog = Arc::new(Catalog::in_memory());
    let ds = dataset("ds1");
    catalog.insert_dataset(ds.clone()).unwrap();
    catalog.enable("ds1", Operation::Backup).unwrap();

    let backup = catalog.ledger(Operation::Backup);
    let unpack = catalog.ledger(Operation::Unpack);
    backup
        .update(&ds, Operation::Backup, Operation::Backup.successors())
        .unwrap();

    let ready: Vec<String> = unpack
        .next(Operation::Unpack)
        .unwrap()
        .into_iter()
        .map(|d| d.name)
        .collect();
    assert_eq!(ready, vec!["ds1"]);

    // errors are recorded per component
    unpack.error(&ds, "unpack failed").unwrap();
    backup.error(&ds, "backup failed").unwrap();
    let errors = catalog.errors("ds1");
    assert_eq!(errors.len(), 2);
    assert_eq!(errors["UNPACK"], "unpack failed");
}

#[test]
fn test_concurrent_updates_do_not_lose_stages() {
    let dir = TempDir::new().unwrap();
    let catalog = Arc::new(Catalog::open(dir.path().join("catalog.json")).unwrap());
    let names: Vec<String> = (0..8).map(|i| format!("ds{}", i)).collect();
    for name in &names {
        catalog
            .insert_dataset(Dataset::new(name.as_str(), format!("rid-{}", name), "owner"))
            .unwrap();
        catalog.enable(name, Operation::Index).unwrap();
    }

    let handles: Vec<_> = names
        .iter()
        .cloned()
        .map(|name| {
            let catalog = Arc::clone(&catalog);
            thread::spawn(move || {
                let ledger = catalog.ledger(Operation::Index);
                let ds = catalog.dataset(&name).unwrap();
                ledger
                    .update(&ds, Operation::Index, Operation::Index.successors())
                    .unwrap();
            })
        })
        .collect();
    for handle in handles {
        handle.join().unwrap();
    }

    let reopened = Catalog::open(dir.path().join("catalog.json")).unwrap();
    for name in &names {
        assert_eq!(reopened.enabled_stages(name), vec![Operation::IndexTool]);
    }
}

// ============================================================================
// Properties
// ============================================================================

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    /// Applying the same update twice leaves the same enabled set as once
    #[test]
    fn prop_update_is_idempotent(
        initial in prop::collection::btree_set(stage_strategy(), 0..5),
        completed in stage_strategy(),
        enabled in prop::collection::vec(stage_strategy(), 0..4),
    ) {
        let catalog = Arc::new(Catalog::in_memory());
        let ds = dataset("ds");
        catalog.insert_dataset(ds.clone()).unwrap();
        for stage in &initial {
            catalog.enable("ds", *stage).unwrap();
        }
        let ledger = catalog.ledger(completed);

        ledger.update(&ds, completed, &enabled).unwrap();
        let once: BTreeSet<Operation> = catalog.enabled_stages("ds").into_iter().collect();
        ledger.update(&ds, completed, &enabled).unwrap();
        let twice: BTreeSet<Operation> = catalog.enabled_stages("ds").into_iter().collect();

        prop_assert_eq!(&once, &twice);
        for stage in &enabled {
            prop_assert!(once.contains(stage));
        }
        if !enabled.contains(&completed) {
            prop_assert!(!once.contains(&completed));
        }
    }

    /// A written sidecar always verifies against the file it was written for
    #[test]
    fn prop_written_sidecar_verifies(content in prop::collection::vec(any::<u8>(), 0..4096)) {
        let dir = TempDir::new().unwrap();
        let file = dir.path().join("run.tar.xz");
        fs::write(&file, &content).unwrap();

        let digest = write_sidecar(&file).unwrap();
        prop_assert_eq!(read_sidecar(&sidecar_path(&file)).unwrap(), digest.clone());

        let verification = verify(&file, &sidecar_path(&file)).unwrap();
        prop_assert!(verification.matched());
        prop_assert_eq!(verification.size, content.len() as u64);
        prop_assert_eq!(hash_file(&file).unwrap(), (content.len() as u64, digest));
    }
}
