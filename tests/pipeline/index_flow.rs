//! UNPACK → INDEX → INDEX_TOOL

use std::fs;
use std::sync::atomic::Ordering;
use std::sync::Arc;

use tarflow::metadata::INDEX_MAP;
use tarflow::{DatasetState, ErrorCategory, IndexMap, IndexerState, SyncLedger};

use crate::common::*;

/// Accept, back up and unpack `names`, leaving them enabled for INDEX
fn ready_for_index(server: &Server, catalog: &Arc<Catalog>, names: &[(&str, &str)]) {
    for (name, content) in names {
        accept_tarball(catalog, &server.tarball("ctrl", name, content), "alice").unwrap();
    }
    server.replicator(catalog, server.targets()).run().unwrap();

    let unpack = catalog.ledger(Operation::Unpack);
    for ds in unpack.next(Operation::Unpack).unwrap() {
        unpack
            .update(&ds, Operation::Unpack, Operation::Unpack.successors())
            .unwrap();
    }
}

#[test]
fn test_index_after_backup() {
    let server = Server::new();
    let catalog = server.catalog();
    ready_for_index(&server, &catalog, &[("big", "0123456789"), ("small", "01")]);

    let indexer = Arc::new(AcceptAll::default());
    let outcome = index_processor(&catalog, IndexerOptions::default(), indexer.clone()).run();
    assert_eq!(outcome.state, IndexerState::Done);
    assert_eq!(outcome.code(), 0);
    assert_eq!(outcome.indexed, vec!["small", "big"]);
    assert_eq!(indexer.submissions.load(Ordering::SeqCst), 2);

    let ds = catalog.dataset("small").unwrap();
    assert_eq!(ds.state, DatasetState::Indexed);
    assert_eq!(
        catalog.enabled_stages("small"),
        vec![Operation::CopySos, Operation::IndexTool]
    );
    let map: IndexMap =
        serde_json::from_value(catalog.get_value(&ds, INDEX_MAP).unwrap().unwrap()).unwrap();
    assert_eq!(map.indices().collect::<Vec<_>>(), vec!["run-data"]);
}

#[test]
fn test_tool_data_pass_extends_index_map() {
    let server = Server::new();
    let catalog = server.catalog();
    ready_for_index(&server, &catalog, &[("run-1", "data")]);

    index_processor(&catalog, IndexerOptions::default(), Arc::new(AcceptAll::default())).run();
    let tool = IndexerOptions {
        tool_data_only: true,
    };
    let outcome = index_processor(&catalog, tool, Arc::new(AcceptAll::default())).run();
    assert_eq!(outcome.indexed, vec!["run-1"]);

    let ds = catalog.dataset("run-1").unwrap();
    let map: IndexMap =
        serde_json::from_value(catalog.get_value(&ds, INDEX_MAP).unwrap().unwrap()).unwrap();
    assert_eq!(map.indices().collect::<Vec<_>>(), vec!["run-data", "tool-data"]);
    assert_eq!(map.document_count(), 2);
    assert_eq!(catalog.enabled_stages("run-1"), vec![Operation::CopySos]);
}

#[test]
fn test_missing_tarball_reported_by_run() {
    let server = Server::new();
    let catalog = server.catalog();
    ready_for_index(&server, &catalog, &[("gone", "aaaa"), ("kept", "bb")]);
    fs::remove_file(server.path("archive/ctrl/gone.tar.xz")).unwrap();

    let outcome = index_processor(&catalog, IndexerOptions::default(), Arc::new(AcceptAll::default())).run();
    assert_eq!(outcome.indexed, vec!["kept"]);
    assert!(outcome.status.contains(ErrorCategory::FileNotFound));
    assert_eq!(outcome.code(), ErrorCategory::FileNotFound.code());
    assert!(catalog.enabled_stages("gone").contains(&Operation::Index));
}
