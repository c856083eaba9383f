//! Pipeline engine for tarflow
//!
//! This crate orchestrates the pipeline stages over the capability traits:
//! - TarballCollector: ready tarballs for an indexing pass, smallest first
//! - SignalController: interruption requests observed at checkpoints
//! - IndexProcessor: template load, bulk submission, index map merge
//! - BackupReplicator: verified replication to local and remote destinations
//! - accept_tarball: registration of new tarballs
//! - PipelineConfig: `tarflow.toml`
//!
//! The engine owns no state of its own; every run reads the ledger and
//! metadata store afresh.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod accept;
pub mod backup;
pub mod collector;
pub mod config;
pub mod indexer;
pub mod report;
pub mod signals;

pub use accept::{accept_tarball, Accepted};
pub use backup::{
    BackupReplicator, BackupResults, BackupStatus, BackupTargets, Destination, LocalBackup,
};
pub use collector::{TarballCollector, WorkSource};
pub use config::{ConfigError, PipelineConfig, CONFIG_ENV_VAR};
pub use indexer::{IndexCapabilities, IndexOutcome, IndexProcessor, IndexerOptions, IndexerState};
pub use report::{post_summary, post_summary_quietly, timestamp};
pub use signals::{Checkpoint, Interruption, SignalController};
