//! Capability traits
//!
//! The pipeline talks to every external collaborator through these traits so
//! that implementations (the JSON-backed catalog, a search engine client, an
//! object store) can be swapped without touching the engine.
//!
//! Thread safety: all capabilities are `Send + Sync` and are shared as
//! `Arc<dyn Trait>`.

use std::io::Write;
use std::path::Path;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::Result;
use crate::types::{Dataset, IndexMap, Operation, TarballWorkItem};

/// Stage synchronization ledger
///
/// A handle is scoped to one component; errors are recorded under it.
pub trait SyncLedger: Send + Sync {
    /// Datasets currently enabled for `stage`
    ///
    /// Never returns a dataset twice. Datasets with an error recorded by this
    /// handle during the current run are left out.
    ///
    /// # Errors
    ///
    /// Returns an error if the ledger cannot be read.
    fn next(&self, stage: Operation) -> Result<Vec<Dataset>>;

    /// Record that `completed` finished for `dataset` and enable `enabled`
    ///
    /// Calling twice with the same arguments has no further effect.
    ///
    /// # Errors
    ///
    /// Returns an error if the ledger cannot be written.
    fn update(&self, dataset: &Dataset, completed: Operation, enabled: &[Operation]) -> Result<()>;

    /// Record a stage failure for `dataset`
    ///
    /// The dataset stays enabled and reappears on a future run.
    ///
    /// # Errors
    ///
    /// Returns an error if the ledger cannot be written.
    fn error(&self, dataset: &Dataset, message: &str) -> Result<()>;
}

/// Per-dataset key/value attribute store
pub trait MetadataStore: Send + Sync {
    /// Read a value; `Ok(None)` when the key is known but unset
    ///
    /// # Errors
    ///
    /// Fails with [`Error::UnknownKey`](crate::Error::UnknownKey) for keys the
    /// store does not recognize.
    fn get_value(&self, dataset: &Dataset, key: &str) -> Result<Option<Value>>;

    /// Write a value and return it
    ///
    /// # Errors
    ///
    /// Fails for unknown keys or if the store cannot be written.
    fn set_value(&self, dataset: &Dataset, key: &str, value: Value) -> Result<Value>;
}

/// Dataset lookup by resource identifier
pub trait DatasetCatalog: Send + Sync {
    /// Find the dataset whose resource id is `resource_id`
    ///
    /// # Errors
    ///
    /// Fails with [`Error::DatasetNotFound`](crate::Error::DatasetNotFound)
    /// when no dataset matches.
    fn attach(&self, resource_id: &str) -> Result<Dataset>;
}

/// One bulk index action (opaque to the pipeline)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndexAction {
    /// Target index name
    pub index: String,
    /// Document identifier
    pub id: String,
    /// Document body
    pub source: Value,
}

/// Which subset of a tarball's documents to index
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActionScope {
    /// Every document
    All,
    /// Only the tool data documents
    ToolData,
}

/// Actions for one tarball together with the index map they produce
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ActionBatch {
    /// Actions to submit
    pub actions: Vec<IndexAction>,
    /// Documents these actions commit, per index
    pub index_map: IndexMap,
}

/// Turns a tarball into index actions
pub trait ActionBuilder: Send + Sync {
    /// Build the actions for `item`
    ///
    /// # Errors
    ///
    /// Returns an error if the tarball cannot be read.
    fn build(&self, item: &TarballWorkItem, scope: ActionScope) -> Result<ActionBatch>;
}

/// Counters returned by one bulk submission
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SubmitStats {
    /// Wall time spent submitting
    pub duration_ms: u64,
    /// Documents submitted
    pub total: u64,
    /// Documents indexed
    pub successes: u64,
    /// Documents rejected
    pub failures: u64,
    /// Documents already present
    pub duplicates: u64,
    /// Documents with any other outcome
    pub other: u64,
}

impl SubmitStats {
    /// True if any document failed or ended in an unknown state
    pub fn has_failures(&self) -> bool {
        self.failures > 0 || self.other > 0
    }
}

/// Bulk submission to the search index
pub trait BulkIndexer: Send + Sync {
    /// Submit `actions`, writing per-document errors to `errors`
    ///
    /// # Errors
    ///
    /// Returns an error if the submission as a whole failed, or
    /// [`Error::Aborted`](crate::Error::Aborted) if it was interrupted.
    fn submit(&self, actions: &[IndexAction], errors: &mut dyn Write) -> Result<SubmitStats>;
}

/// Search index schema templates
pub trait TemplateManager: Send + Sync {
    /// Bring the index templates up to date
    ///
    /// # Errors
    ///
    /// [`Error::Template`](crate::Error::Template) for template-layer
    /// failures; [`Error::Aborted`](crate::Error::Aborted) if interrupted.
    fn update_templates(&self) -> Result<()>;
}

/// Status reporting
pub trait StatusReporter: Send + Sync {
    /// Post a status document, optionally with a report file attached
    ///
    /// Returns a tracking id.
    ///
    /// # Errors
    ///
    /// Returns an error if the report cannot be delivered.
    fn post_status(&self, timestamp: &str, doc_type: &str, file: Option<&Path>) -> Result<String>;
}

/// Remote object metadata
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ObjectHead {
    /// Object size in bytes
    pub size: u64,
    /// Hex MD5 of the content, when the store knows it
    pub content_md5: Option<String>,
}

/// Remote object storage
pub trait ObjectStore: Send + Sync {
    /// Bucket this store writes to
    fn bucket(&self) -> &str;

    /// Check that the bucket exists and is accessible
    ///
    /// # Errors
    ///
    /// Returns an error if the bucket is missing or inaccessible.
    fn head_bucket(&self) -> Result<()>;

    /// Metadata of `key`; `Ok(None)` if there is no such key
    ///
    /// # Errors
    ///
    /// Returns an error if the store cannot be queried.
    fn head_object(&self, key: &str) -> Result<Option<ObjectHead>>;

    /// Upload `source` under `key`
    ///
    /// `content_md5` is the hex digest the store must verify the transfer
    /// against.
    ///
    /// # Errors
    ///
    /// Returns an error if the upload fails or the digest does not match.
    fn put_object(&self, key: &str, source: &Path, size: u64, content_md5: &str) -> Result<()>;
}
