//! Core types and traits for tarflow
//!
//! This crate defines the foundational types used throughout the pipeline:
//! - Dataset, DatasetState: Benchmark results and their lifecycle
//! - Operation: Pipeline stages and the fixed stage graph
//! - TarballWorkItem, IndexMap: Indexing work and its results
//! - Error: Error type shared by every capability
//! - StatusSet: Accumulated failure categories
//! - Traits: Capability traits (ledger, metadata, index, storage, reporting)

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod error;
pub mod metadata;
pub mod status;
pub mod traits;
pub mod types;

pub use error::{AbortCause, Error, Result};
pub use status::{ErrorCategory, StatusSet};
pub use traits::{
    ActionBatch, ActionBuilder, ActionScope, BulkIndexer, DatasetCatalog, IndexAction,
    MetadataStore, ObjectHead, ObjectStore, StatusReporter, SubmitStats, SyncLedger,
    TemplateManager,
};
pub use types::{Dataset, DatasetState, IndexMap, Operation, TarballWorkItem, TARBALL_SUFFIX};
