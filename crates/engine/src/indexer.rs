//! Index processing
//!
//! Drives one indexing run:
//!
//! ```text
//! Idle → LoadingTemplates → Running → Done
//!              │               │
//!              └──── abort ────┴────→ Aborted
//! ```
//!
//! Each work item is built into actions, submitted, merged into the dataset's
//! index map and reported to the ledger. The signal checkpoint is consulted
//! after every item and nowhere else. A failing item is recorded against its
//! dataset and the run moves on; only a fatal interruption stops the run.

use std::collections::{HashSet, VecDeque};
use std::sync::Arc;

use serde_json::Value;
use tracing::{debug, error, info, warn};

use tarflow_core::metadata::{INDEX_MAP, REINDEX};
use tarflow_core::{
    AbortCause, ActionBuilder, ActionScope, BulkIndexer, Dataset, Error, ErrorCategory, IndexMap,
    MetadataStore, Operation, Result, StatusReporter, StatusSet, SyncLedger, TarballWorkItem,
    TemplateManager,
};

use crate::collector::WorkSource;
use crate::report::timestamp;
use crate::signals::{Checkpoint, SignalController};

/// Processor state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IndexerState {
    /// Nothing started
    Idle,
    /// Updating index templates
    LoadingTemplates,
    /// Processing work items
    Running,
    /// Finished; every item was attempted
    Done,
    /// Stopped by a fatal interruption
    Aborted,
}

/// Indexing options
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct IndexerOptions {
    /// Index only tool data; consumes `INDEX_TOOL` instead of `INDEX`
    pub tool_data_only: bool,
}

impl IndexerOptions {
    /// Ledger stage this run consumes
    pub fn stage(&self) -> Operation {
        if self.tool_data_only {
            Operation::IndexTool
        } else {
            Operation::Index
        }
    }

    /// Action subset to build
    pub fn scope(&self) -> ActionScope {
        if self.tool_data_only {
            ActionScope::ToolData
        } else {
            ActionScope::All
        }
    }
}

/// External capabilities used by the processor
#[derive(Clone)]
pub struct IndexCapabilities {
    /// Stage ledger
    pub ledger: Arc<dyn SyncLedger>,
    /// Dataset metadata
    pub metadata: Arc<dyn MetadataStore>,
    /// Work collection (used again on resync)
    pub collector: Arc<dyn WorkSource>,
    /// Tarball to action conversion
    pub builder: Arc<dyn ActionBuilder>,
    /// Bulk submission
    pub indexer: Arc<dyn BulkIndexer>,
    /// Index templates
    pub templates: Arc<dyn TemplateManager>,
    /// Status reporting
    pub reporter: Arc<dyn StatusReporter>,
}

/// Result of a run
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexOutcome {
    /// `Done` or `Aborted`
    pub state: IndexerState,
    /// Accumulated failure categories
    pub status: StatusSet,
    /// Datasets indexed successfully, in completion order
    pub indexed: Vec<String>,
    /// Cause of the abort, if aborted
    pub abort: Option<AbortCause>,
}

impl IndexOutcome {
    /// Numeric status code (0 when clean)
    pub fn code(&self) -> i32 {
        self.status.code()
    }
}

/// How a single item ended when it did not succeed
enum ItemFailure {
    Failed(ErrorCategory),
    Aborted(AbortCause),
}

/// Drives indexing runs
pub struct IndexProcessor {
    caps: IndexCapabilities,
    signals: Arc<SignalController>,
    options: IndexerOptions,
    state: IndexerState,
}

impl IndexProcessor {
    /// Create an idle processor
    pub fn new(
        caps: IndexCapabilities,
        signals: Arc<SignalController>,
        options: IndexerOptions,
    ) -> Self {
        Self {
            caps,
            signals,
            options,
            state: IndexerState::Idle,
        }
    }

    /// Current state
    pub fn state(&self) -> IndexerState {
        self.state
    }

    /// Collect the ready tarballs and process them
    pub fn run(&mut self) -> IndexOutcome {
        let (status, tarballs) = self.caps.collector.collect();
        let mut outcome = self.process(tarballs);
        outcome.status.absorb(&status);
        outcome
    }

    /// Update index templates and post the status report
    ///
    /// Returns the accumulated status of this step, or the abort cause when a
    /// fatal interruption was raised during it; no report is posted then.
    pub fn load_templates(&mut self) -> std::result::Result<StatusSet, AbortCause> {
        self.state = IndexerState::LoadingTemplates;
        let mut status = StatusSet::ok();

        match self.caps.templates.update_templates() {
            Ok(()) => debug!("index templates updated"),
            Err(Error::Aborted(cause)) => return Err(self.abort(cause)),
            Err(Error::Template(msg)) => {
                error!(error = %msg, "index template update failed");
                status.record(ErrorCategory::TemplateCreationError);
            }
            Err(e) => {
                error!(error = %e, "unexpected error updating index templates");
                status.record(ErrorCategory::GenericError);
            }
        }
        if let Some(cause) = self.signals.pending_abort() {
            return Err(self.abort(cause));
        }

        match self.caps.reporter.post_status(&timestamp(), "status", None) {
            Ok(tracking_id) => debug!(%tracking_id, "posted template status"),
            Err(Error::Aborted(cause)) => return Err(self.abort(cause)),
            Err(e) => {
                error!(error = %e, "unable to post template status");
                status.record(ErrorCategory::GenericError);
            }
        }
        Ok(status)
    }

    /// Process `tarballs` in order
    pub fn process(&mut self, tarballs: Vec<TarballWorkItem>) -> IndexOutcome {
        let mut indexed = Vec::new();
        let mut status = match self.load_templates() {
            Ok(status) => status,
            Err(cause) => return self.finish_aborted(StatusSet::ok(), indexed, cause),
        };
        if !status.is_ok() {
            warn!(%status, "not indexing: template step failed");
            return self.finish(status, indexed);
        }

        self.state = IndexerState::Running;
        let mut queue: VecDeque<TarballWorkItem> = tarballs.into();
        let mut finished: HashSet<String> = HashSet::new();
        info!(count = queue.len(), stage = %self.options.stage(), "indexing started");

        while let Some(item) = queue.pop_front() {
            let name = item.dataset.name.clone();
            if finished.contains(&name) {
                debug!(dataset = %name, "already processed in this pass");
                continue;
            }

            match self.index_one(&item) {
                Ok(()) => indexed.push(name.clone()),
                Err(ItemFailure::Failed(category)) => status.record(category),
                Err(ItemFailure::Aborted(cause)) => {
                    return self.finish_aborted(status, indexed, cause);
                }
            }
            finished.insert(name);

            match self.signals.checkpoint() {
                Checkpoint::Continue => {}
                Checkpoint::Abort(cause) => return self.finish_aborted(status, indexed, cause),
                Checkpoint::Resync => {
                    info!("re-evaluating ready tarballs");
                    let (collected, fresh) = self.caps.collector.collect();
                    status.absorb(&collected);
                    queue = refresh_pending(fresh, &finished);
                    debug!(count = queue.len(), "work list refreshed");
                }
            }
        }

        self.finish(status, indexed)
    }

    /// Index one work item
    fn index_one(&self, item: &TarballWorkItem) -> std::result::Result<(), ItemFailure> {
        let dataset = &item.dataset;
        debug!(dataset = %dataset, tarball = %item.tarball, size = item.size, "indexing");

        let batch = self
            .caps
            .builder
            .build(item, self.options.scope())
            .map_err(|e| self.item_error(dataset, "Unable to build index actions", e))?;

        let mut errors = Vec::new();
        let stats = self
            .caps
            .indexer
            .submit(&batch.actions, &mut errors)
            .map_err(|e| self.item_error(dataset, "Index submission failed", e))?;
        info!(
            dataset = %dataset,
            duration_ms = stats.duration_ms,
            total = stats.total,
            successes = stats.successes,
            duplicates = stats.duplicates,
            failures = stats.failures,
            other = stats.other,
            "submitted"
        );

        if stats.has_failures() {
            let rejected = stats.failures + stats.other;
            if !errors.is_empty() {
                warn!(dataset = %dataset, errors = %String::from_utf8_lossy(&errors), "document errors");
            }
            self.record_error(
                dataset,
                &format!("{} of {} documents failed to index", rejected, stats.total),
            );
            return Err(ItemFailure::Failed(ErrorCategory::OperationError));
        }

        self.commit(dataset, &batch.index_map)
            .map_err(|e| self.item_error(dataset, "Unable to record index results", e))
    }

    /// Merge the new index map, then clear re-index and advance the ledger
    fn commit(&self, dataset: &Dataset, partial: &IndexMap) -> Result<()> {
        let metadata = &self.caps.metadata;
        let mut index_map = match metadata.get_value(dataset, INDEX_MAP)? {
            Some(Value::Null) | None => IndexMap::new(),
            Some(value) => serde_json::from_value(value)?,
        };
        if matches!(metadata.get_value(dataset, REINDEX)?, Some(Value::Bool(true))) {
            info!(dataset = %dataset, "completing requested re-index");
        }

        index_map.merge(partial);
        metadata.set_value(dataset, INDEX_MAP, serde_json::to_value(&index_map)?)?;
        metadata.set_value(dataset, REINDEX, Value::Bool(false))?;

        let stage = self.options.stage();
        self.caps.ledger.update(dataset, stage, stage.successors())
    }

    fn item_error(&self, dataset: &Dataset, context: &str, err: Error) -> ItemFailure {
        if let Error::Aborted(cause) = err {
            warn!(dataset = %dataset, %cause, "interrupted while indexing");
            return ItemFailure::Aborted(cause);
        }
        error!(dataset = %dataset, error = %err, "{}", context);
        self.record_error(dataset, &format!("{}: {}", context, err));
        ItemFailure::Failed(ErrorCategory::GenericError)
    }

    fn record_error(&self, dataset: &Dataset, message: &str) {
        if let Err(e) = self.caps.ledger.error(dataset, message) {
            error!(dataset = %dataset, error = %e, "unable to record ledger error");
        }
    }

    fn abort(&mut self, cause: AbortCause) -> AbortCause {
        warn!(%cause, "indexing aborted");
        self.state = IndexerState::Aborted;
        cause
    }

    fn finish(&mut self, status: StatusSet, indexed: Vec<String>) -> IndexOutcome {
        self.state = IndexerState::Done;
        info!(indexed = indexed.len(), %status, "indexing finished");
        IndexOutcome {
            state: self.state,
            status,
            indexed,
            abort: None,
        }
    }

    fn finish_aborted(
        &mut self,
        status: StatusSet,
        indexed: Vec<String>,
        cause: AbortCause,
    ) -> IndexOutcome {
        self.abort(cause);
        IndexOutcome {
            state: self.state,
            status,
            indexed,
            abort: Some(cause),
        }
    }
}

/// Work list after a resync: the fresh collection only
///
/// Queued items the ledger no longer offers are not kept. Datasets already
/// processed in this pass and duplicates are dropped, and the result is size
/// ordered.
fn refresh_pending(
    fresh: Vec<TarballWorkItem>,
    finished: &HashSet<String>,
) -> VecDeque<TarballWorkItem> {
    let mut seen = HashSet::new();
    let mut pending: Vec<TarballWorkItem> = fresh
        .into_iter()
        .filter(|t| !finished.contains(&t.dataset.name))
        .filter(|t| seen.insert(t.dataset.name.clone()))
        .collect();
    pending.sort_by_key(|t| t.size);
    pending.into()
}
