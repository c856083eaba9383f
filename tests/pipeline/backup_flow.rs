//! accept → BACKUP

use std::fs;

use serde_json::Value;
use tarflow::metadata::ARCHIVED;
use tarflow::{read_sidecar, sidecar_path, DatasetState};

use crate::common::*;

#[test]
fn test_accept_then_backup_archives() {
    let server = Server::new();
    let catalog = server.catalog();
    let tarball = server.tarball("ctrl-a", "run-1", "benchmark data");
    let accepted = accept_tarball(&catalog, &tarball, "alice").unwrap();

    let results = server.replicator(&catalog, server.targets()).run().unwrap();
    assert_eq!(results.total, 1);
    assert_eq!(results.local_success, 1);
    assert_eq!(results.remote_success, 1);
    assert_eq!(results.archived, 1);

    let backup = server.path("backup/ctrl-a/run-1.tar.xz");
    assert_eq!(fs::read_to_string(&backup).unwrap(), "benchmark data");
    assert_eq!(
        read_sidecar(&sidecar_path(&backup)).unwrap(),
        accepted.dataset.resource_id
    );
    let head = server
        .object_store()
        .head_object("ctrl-a/run-1.tar.xz")
        .unwrap()
        .unwrap();
    assert_eq!(head.content_md5, Some(accepted.dataset.resource_id.clone()));

    let ds = catalog.dataset("run-1").unwrap();
    assert_eq!(ds.state, DatasetState::Archived);
    assert_eq!(catalog.get_value(&ds, ARCHIVED).unwrap(), Some(Value::Bool(true)));
    assert_eq!(
        catalog.enabled_stages("run-1"),
        vec![Operation::CopySos, Operation::Unpack]
    );
}

#[test]
fn test_backup_state_survives_reopen() {
    let server = Server::new();
    {
        let catalog = server.catalog();
        accept_tarball(&catalog, &server.tarball("ctrl", "run-1", "x"), "alice").unwrap();
        accept_tarball(&catalog, &server.tarball("ctrl", "run-2", "yy"), "alice").unwrap();
        server.replicator(&catalog, server.targets()).run().unwrap();
    }

    let reopened = server.catalog();
    assert_eq!(reopened.datasets().len(), 2);
    for name in ["run-1", "run-2"] {
        assert_eq!(reopened.dataset(name).unwrap().state, DatasetState::Archived);
        assert!(!reopened.enabled_stages(name).contains(&Operation::Backup));
    }

    // nothing left to back up
    let results = server.replicator(&reopened, server.targets()).run().unwrap();
    assert_eq!(results.total, 0);
}

#[test]
fn test_corrupted_tarball_retried_on_next_run() {
    let server = Server::new();
    let catalog = server.catalog();
    let tarball = server.tarball("ctrl", "run-1", "original");
    accept_tarball(&catalog, &tarball, "alice").unwrap();

    // damaged after acceptance
    fs::write(&tarball, "damaged!").unwrap();
    let results = server.replicator(&catalog, server.targets()).run().unwrap();
    assert_eq!(results.process_fail, 1);
    assert!(!server.path("backup/ctrl").exists());
    assert!(catalog.errors("run-1")["BACKUP"].starts_with("Recorded MD5"));
    assert!(catalog.enabled_stages("run-1").contains(&Operation::Backup));

    // restored; a fresh run picks it up and clears the error
    fs::write(&tarball, "original").unwrap();
    let results = server.replicator(&catalog, server.targets()).run().unwrap();
    assert_eq!(results.archived, 1);
    assert!(catalog.errors("run-1").is_empty());
}

#[test]
fn test_backup_is_idempotent_across_runs() {
    let server = Server::new();
    let catalog = server.catalog();
    accept_tarball(&catalog, &server.tarball("ctrl", "run-1", "data"), "alice").unwrap();
    server.replicator(&catalog, server.targets()).run().unwrap();

    // queue it again as if a previous run had stopped before the ledger update
    catalog.enable("run-1", Operation::Backup).unwrap();
    let results = server.replicator(&catalog, server.targets()).run().unwrap();
    assert_eq!(results.local_success, 1);
    assert_eq!(results.remote_success, 1);
    assert_eq!(results.archived, 1);
}
