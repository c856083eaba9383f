//! Component-scoped ledger handles
//!
//! A handle lives for one run of one component. Errors it records are
//! persisted in the catalog and also remembered locally so the dataset is not
//! handed out again during the same run; a fresh handle (the next run) sees
//! the dataset again.

use std::collections::HashSet;
use std::sync::Arc;

use parking_lot::Mutex;
use tracing::{debug, warn};

use tarflow_core::{Dataset, Operation, Result, SyncLedger};

use crate::catalog::Catalog;

/// [`SyncLedger`] implementation over a [`Catalog`]
#[derive(Debug)]
pub struct ComponentLedger {
    catalog: Arc<Catalog>,
    component: Operation,
    /// Datasets that failed during this run
    failed: Mutex<HashSet<String>>,
}

impl ComponentLedger {
    /// Create a handle recording errors under `component`
    pub fn new(catalog: Arc<Catalog>, component: Operation) -> Self {
        Self {
            catalog,
            component,
            failed: Mutex::new(HashSet::new()),
        }
    }

    /// Component this handle records errors under
    pub fn component(&self) -> Operation {
        self.component
    }
}

impl SyncLedger for ComponentLedger {
    fn next(&self, stage: Operation) -> Result<Vec<Dataset>> {
        let failed = self.failed.lock();
        let ready: Vec<Dataset> = self
            .catalog
            .enabled_for(stage)?
            .into_iter()
            .filter(|ds| !failed.contains(&ds.name))
            .collect();
        debug!(component = %self.component, %stage, count = ready.len(), "ledger next");
        Ok(ready)
    }

    fn update(&self, dataset: &Dataset, completed: Operation, enabled: &[Operation]) -> Result<()> {
        self.catalog
            .advance(dataset, completed, enabled, self.component)?;
        self.failed.lock().remove(&dataset.name);
        debug!(dataset = %dataset, %completed, ?enabled, "ledger update");
        Ok(())
    }

    fn error(&self, dataset: &Dataset, message: &str) -> Result<()> {
        warn!(component = %self.component, dataset = %dataset, error = message, "ledger error");
        self.catalog
            .record_error(dataset, self.component, message)?;
        self.failed.lock().insert(dataset.name.clone());
        Ok(())
    }
}
