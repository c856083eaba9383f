//! Storage layer for tarflow
//!
//! This crate implements the stores the pipeline runs against:
//! - Catalog: datasets, stage enablement and metadata, optionally backed by
//!   a JSON file written through on every mutation
//! - ComponentLedger: component-scoped `SyncLedger` handles over a catalog
//! - integrity: MD5 digests and `.md5` sidecar files
//! - DirectoryObjectStore: an `ObjectStore` over a local directory tree

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod catalog;
pub mod integrity;
pub mod ledger;
pub mod object_store;

pub use catalog::Catalog;
pub use integrity::{hash_file, read_sidecar, sidecar_path, verify, write_sidecar, Verification};
pub use ledger::ComponentLedger;
pub use object_store::DirectoryObjectStore;
