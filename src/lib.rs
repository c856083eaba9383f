//! tarflow: indexing and backup pipeline for benchmark result tarballs
//!
//! Tarballs move through a small fixed stage graph recorded in a shared
//! ledger:
//!
//! ```text
//! accept → BACKUP → COPY_SOS
//!                 → UNPACK → INDEX → INDEX_TOOL
//! ```
//!
//! # Quick Start
//!
//! ```ignore
//! use std::sync::Arc;
//! use tarflow::{accept_tarball, BackupReplicator, BackupTargets, Catalog, Operation};
//!
//! let catalog = Arc::new(Catalog::open("catalog.json")?);
//! accept_tarball(&catalog, "archive/ctrl/run-1.tar.xz".as_ref(), "alice")?;
//!
//! let targets = BackupTargets::sanity_check(Some("/srv/backup".as_ref()), None);
//! let replicator = BackupReplicator::new(
//!     Arc::new(catalog.ledger(Operation::Backup)),
//!     catalog.clone(),
//!     catalog.clone(),
//!     targets,
//! );
//! println!("{}", replicator.run()?);
//! ```
//!
//! # Architecture
//!
//! - `tarflow-core`: data model, errors, status categories, capability traits
//! - `tarflow-storage`: catalog, ledger handles, content integrity, object store
//! - `tarflow-engine`: collector, signals, index processor, backup replicator

pub use tarflow_core::*;
pub use tarflow_engine::*;
pub use tarflow_storage::*;
