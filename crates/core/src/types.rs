//! Core types for the tarball pipeline
//!
//! This module defines the foundational types:
//! - Dataset: A benchmark result identified by name and content hash
//! - Operation: A pipeline stage and the fixed stage graph
//! - TarballWorkItem: One unit of indexing work
//! - IndexMap: Documents committed per search index

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::path::Path;

/// Suffix carried by every accepted tarball
pub const TARBALL_SUFFIX: &str = ".tar.xz";

/// Lifecycle state of a dataset
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DatasetState {
    /// Accepted, not yet backed up
    Uploaded,
    /// Replicated to every configured backup destination
    Archived,
    /// Contents committed to the search index
    Indexed,
}

impl fmt::Display for DatasetState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            DatasetState::Uploaded => "uploaded",
            DatasetState::Archived => "archived",
            DatasetState::Indexed => "indexed",
        };
        f.write_str(s)
    }
}

/// A benchmark result
///
/// The resource identifier is the lowercase hex MD5 digest of the tarball
/// and never changes once assigned.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Dataset {
    /// Stable name (tarball file name without suffix)
    pub name: String,
    /// Content-derived identifier
    pub resource_id: String,
    /// Owning principal
    pub owner: String,
    /// Lifecycle state
    pub state: DatasetState,
}

impl Dataset {
    /// Create a dataset in the `Uploaded` state
    pub fn new(
        name: impl Into<String>,
        resource_id: impl Into<String>,
        owner: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            resource_id: resource_id.into().to_ascii_lowercase(),
            owner: owner.into(),
            state: DatasetState::Uploaded,
        }
    }

    /// Derive the dataset name from a tarball path
    ///
    /// `/archive/ctrl/run-1.tar.xz` becomes `run-1`. Paths without the
    /// tarball suffix keep their full file name.
    pub fn stem(path: impl AsRef<Path>) -> String {
        let name = path
            .as_ref()
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        match name.strip_suffix(TARBALL_SUFFIX) {
            Some(stem) => stem.to_string(),
            None => name,
        }
    }
}

impl fmt::Display for Dataset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name)
    }
}

/// Pipeline stage
///
/// Completing one stage enables a fixed set of successors; see
/// [`Operation::successors`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Operation {
    /// Replicate the tarball to backup destinations
    Backup,
    /// Copy the tarball to the secondary object store
    CopySos,
    /// Unpack the tarball into the incoming tree
    Unpack,
    /// Index the full tarball contents
    Index,
    /// Index the tool data subset
    IndexTool,
}

impl Operation {
    /// All stages, in pipeline order
    pub const ALL: [Operation; 5] = [
        Operation::Backup,
        Operation::CopySos,
        Operation::Unpack,
        Operation::Index,
        Operation::IndexTool,
    ];

    /// Stages enabled once this stage completes
    pub fn successors(self) -> &'static [Operation] {
        match self {
            Operation::Backup => &[Operation::CopySos, Operation::Unpack],
            Operation::Unpack => &[Operation::Index],
            Operation::Index => &[Operation::IndexTool],
            Operation::IndexTool | Operation::CopySos => &[],
        }
    }

    /// Canonical upper-case name
    pub fn name(self) -> &'static str {
        match self {
            Operation::Backup => "BACKUP",
            Operation::CopySos => "COPY_SOS",
            Operation::Unpack => "UNPACK",
            Operation::Index => "INDEX",
            Operation::IndexTool => "INDEX_TOOL",
        }
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// One tarball scheduled for indexing
///
/// Only used to order work within a pass; never persisted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TarballWorkItem {
    /// Dataset owning the tarball
    pub dataset: Dataset,
    /// Tarball size in bytes
    pub size: u64,
    /// Tarball location as recorded in metadata
    pub tarball: String,
}

/// Documents committed to each search index for one dataset
///
/// Merging is a per-index set union, so identifiers are never dropped.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct IndexMap(BTreeMap<String, BTreeSet<String>>);

impl IndexMap {
    /// Create an empty map
    pub fn new() -> Self {
        Self::default()
    }

    /// Record document ids under an index name
    pub fn insert<I, S>(&mut self, index: impl Into<String>, ids: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.0
            .entry(index.into())
            .or_default()
            .extend(ids.into_iter().map(Into::into));
    }

    /// Union another map into this one
    pub fn merge(&mut self, other: &IndexMap) {
        for (index, ids) in &other.0 {
            self.0
                .entry(index.clone())
                .or_default()
                .extend(ids.iter().cloned());
        }
    }

    /// Document ids recorded under `index`
    pub fn get(&self, index: &str) -> Option<&BTreeSet<String>> {
        self.0.get(index)
    }

    /// Index names present in the map
    pub fn indices(&self) -> impl Iterator<Item = &str> {
        self.0.keys().map(String::as_str)
    }

    /// Total number of document ids across all indices
    pub fn document_count(&self) -> usize {
        self.0.values().map(BTreeSet::len).sum()
    }

    /// True if no index is recorded
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl<K, I, S> FromIterator<(K, I)> for IndexMap
where
    K: Into<String>,
    I: IntoIterator<Item = S>,
    S: Into<String>,
{
    fn from_iter<T: IntoIterator<Item = (K, I)>>(iter: T) -> Self {
        let mut map = IndexMap::new();
        for (index, ids) in iter {
            map.insert(index, ids);
        }
        map
    }
}
