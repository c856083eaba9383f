//! Shared test utilities for the integration suites.
//!
//! Import via `#[path = "../common/mod.rs"] mod common;` from a suite's main.rs.

#![allow(dead_code)]
#![allow(unused_imports)]

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use serde_json::json;
use tempfile::TempDir;

pub use tarflow::{
    accept_tarball, ActionBatch, ActionBuilder, ActionScope, BackupReplicator, BackupTargets,
    BulkIndexer, Catalog, Dataset, DirectoryObjectStore, IndexAction, IndexCapabilities,
    IndexProcessor, IndexerOptions, MetadataStore, ObjectStore, Operation, Result,
    SignalController, StatusReporter, SubmitStats, TarballCollector, TarballWorkItem,
    TemplateManager,
};

// ============================================================================
// Filesystem fixture
// ============================================================================

/// Temporary server tree: `archive/`, `backup/`, `objects/` and a catalog file
pub struct Server {
    pub dir: TempDir,
}

impl Server {
    pub fn new() -> Self {
        let dir = TempDir::new().unwrap();
        fs::create_dir_all(dir.path().join("archive")).unwrap();
        Self { dir }
    }

    pub fn path(&self, rel: &str) -> PathBuf {
        self.dir.path().join(rel)
    }

    pub fn catalog_file(&self) -> PathBuf {
        self.path("catalog.json")
    }

    /// Open (or reopen) the file-backed catalog
    pub fn catalog(&self) -> Arc<Catalog> {
        Arc::new(Catalog::open(self.catalog_file()).unwrap())
    }

    /// Write `archive/<controller>/<name>.tar.xz`
    pub fn tarball(&self, controller: &str, name: &str, content: &str) -> PathBuf {
        let dir = self.path(&format!("archive/{}", controller));
        fs::create_dir_all(&dir).unwrap();
        let path = dir.join(format!("{}.tar.xz", name));
        fs::write(&path, content).unwrap();
        path
    }

    /// Object store with its bucket created
    pub fn object_store(&self) -> Arc<DirectoryObjectStore> {
        let store = Arc::new(DirectoryObjectStore::new(self.path("objects"), "tarballs"));
        store.create_bucket().unwrap();
        store
    }

    /// Destinations: local backup tree plus the object store
    pub fn targets(&self) -> BackupTargets {
        let remote = self.object_store() as Arc<dyn ObjectStore>;
        BackupTargets::sanity_check(Some(&self.path("backup")), Some(remote))
    }

    pub fn replicator(&self, catalog: &Arc<Catalog>, targets: BackupTargets) -> BackupReplicator {
        BackupReplicator::new(
            Arc::new(catalog.ledger(Operation::Backup)),
            catalog.clone(),
            catalog.clone(),
            targets,
        )
    }
}

// ============================================================================
// Indexing doubles
// ============================================================================

/// Commits one document per tarball under `run-data` (or `tool-data`)
#[derive(Default)]
pub struct DocBuilder;

impl ActionBuilder for DocBuilder {
    fn build(&self, item: &TarballWorkItem, scope: ActionScope) -> Result<ActionBatch> {
        let index = match scope {
            ActionScope::All => "run-data",
            ActionScope::ToolData => "tool-data",
        };
        let id = format!("{}-{}", item.dataset.resource_id, index);
        Ok(ActionBatch {
            actions: vec![IndexAction {
                index: index.to_string(),
                id: id.clone(),
                source: json!({ "dataset": item.dataset.name }),
            }],
            index_map: [(index, [id])].into_iter().collect(),
        })
    }
}

/// Accepts every action
#[derive(Default)]
pub struct AcceptAll {
    pub submissions: AtomicUsize,
}

impl BulkIndexer for AcceptAll {
    fn submit(&self, actions: &[IndexAction], _errors: &mut dyn Write) -> Result<SubmitStats> {
        self.submissions.fetch_add(1, Ordering::SeqCst);
        Ok(SubmitStats {
            total: actions.len() as u64,
            successes: actions.len() as u64,
            ..SubmitStats::default()
        })
    }
}

pub struct NoTemplates;

impl TemplateManager for NoTemplates {
    fn update_templates(&self) -> Result<()> {
        Ok(())
    }
}

/// Keeps every posted report body
#[derive(Default)]
pub struct Inbox {
    pub reports: Mutex<Vec<(String, Option<String>)>>,
}

impl StatusReporter for Inbox {
    fn post_status(&self, _timestamp: &str, doc_type: &str, file: Option<&Path>) -> Result<String> {
        let body = file.map(fs::read_to_string).transpose()?;
        let mut reports = self.reports.lock();
        reports.push((doc_type.to_string(), body));
        Ok(format!("report-{}", reports.len()))
    }
}

/// Index processor over `catalog` with the doubles above
pub fn index_processor(
    catalog: &Arc<Catalog>,
    options: IndexerOptions,
    indexer: Arc<AcceptAll>,
) -> IndexProcessor {
    let stage = options.stage();
    let ledger = Arc::new(catalog.ledger(stage));
    let collector = TarballCollector::new(ledger.clone(), catalog.clone()).with_stage(stage);
    IndexProcessor::new(
        IndexCapabilities {
            ledger,
            metadata: catalog.clone(),
            collector: Arc::new(collector),
            builder: Arc::new(DocBuilder),
            indexer,
            templates: Arc::new(NoTemplates),
            reporter: Arc::new(Inbox::default()),
        },
        Arc::new(SignalController::new()),
        options,
    )
}
