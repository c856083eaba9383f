//! Tarball collection for one indexing pass
//!
//! Pulls the datasets enabled for the index stage, resolves and sizes their
//! tarballs, and orders the work smallest first so that an interrupted pass
//! has indexed as many datasets as possible.
//!
//! Per-dataset failures never stop the collection: the dataset is reported to
//! the ledger and left out, and its failure class is folded into the returned
//! status.

use std::fs;
use std::io;
use std::sync::Arc;

use serde_json::Value;
use tracing::{debug, error, warn};

use tarflow_core::metadata::TARBALL_PATH;
use tarflow_core::{
    Dataset, ErrorCategory, MetadataStore, Operation, StatusSet, SyncLedger, TarballWorkItem,
};

/// Source of ordered indexing work
pub trait WorkSource: Send + Sync {
    /// Collect the work for one pass
    fn collect(&self) -> (StatusSet, Vec<TarballWorkItem>);
}

/// [`WorkSource`] reading the ledger and metadata store
pub struct TarballCollector {
    ledger: Arc<dyn SyncLedger>,
    metadata: Arc<dyn MetadataStore>,
    stage: Operation,
}

impl TarballCollector {
    /// Collector for the `INDEX` stage
    pub fn new(ledger: Arc<dyn SyncLedger>, metadata: Arc<dyn MetadataStore>) -> Self {
        Self {
            ledger,
            metadata,
            stage: Operation::Index,
        }
    }

    /// Collect for `stage` instead of `INDEX`
    pub fn with_stage(mut self, stage: Operation) -> Self {
        self.stage = stage;
        self
    }

    /// Stage this collector reads
    pub fn stage(&self) -> Operation {
        self.stage
    }

    fn record_error(&self, dataset: &Dataset, message: &str, status: &mut StatusSet) {
        if let Err(e) = self.ledger.error(dataset, message) {
            error!(dataset = %dataset, error = %e, "unable to record ledger error");
            status.record(ErrorCategory::GenericError);
        }
    }

    /// Resolve and size one dataset's tarball
    fn resolve(&self, dataset: &Dataset, status: &mut StatusSet) -> Option<TarballWorkItem> {
        let tarball = match self.metadata.get_value(dataset, TARBALL_PATH) {
            Ok(Some(Value::String(path))) if !path.is_empty() => path,
            Ok(_) => {
                self.record_error(
                    dataset,
                    &format!("{} does not have a tarball-path", dataset),
                    status,
                );
                return None;
            }
            Err(e) => {
                error!(dataset = %dataset, error = %e, "unable to read tarball path");
                self.record_error(dataset, &format!("Could not read tarball path: {}", e), status);
                status.record(ErrorCategory::GenericError);
                return None;
            }
        };

        match fs::metadata(&tarball) {
            Ok(meta) => Some(TarballWorkItem {
                dataset: dataset.clone(),
                size: meta.len(),
                tarball,
            }),
            Err(e) => {
                let category = if e.kind() == io::ErrorKind::NotFound {
                    warn!(dataset = %dataset, %tarball, "tarball not found");
                    ErrorCategory::FileNotFound
                } else {
                    error!(dataset = %dataset, %tarball, error = %e, "unable to stat tarball");
                    ErrorCategory::GenericError
                };
                self.record_error(
                    dataset,
                    &format!("Could not fetch tarball size: {}", e),
                    status,
                );
                status.record(category);
                None
            }
        }
    }
}

impl WorkSource for TarballCollector {
    fn collect(&self) -> (StatusSet, Vec<TarballWorkItem>) {
        let mut status = StatusSet::ok();
        let datasets = match self.ledger.next(self.stage) {
            Ok(datasets) => datasets,
            Err(e) => {
                error!(stage = %self.stage, error = %e, "unable to read the ledger");
                return (StatusSet::of(ErrorCategory::GenericError), Vec::new());
            }
        };

        let mut tarballs: Vec<TarballWorkItem> = datasets
            .iter()
            .filter_map(|ds| self.resolve(ds, &mut status))
            .collect();
        tarballs.sort_by_key(|t| t.size);

        debug!(
            stage = %self.stage,
            ready = datasets.len(),
            collected = tarballs.len(),
            %status,
            "collected tarballs"
        );
        (status, tarballs)
    }
}
