//! End-to-end pipeline tests
//!
//! Tarballs are accepted into a file-backed catalog, backed up to a local
//! tree and a directory object store, then indexed with in-process doubles.

#[path = "../common/mod.rs"]
mod common;

mod backup_flow;
mod index_flow;
mod reports;
