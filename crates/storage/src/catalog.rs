//! Catalog: datasets, stage enablement and metadata in one store
//!
//! The catalog backs three capabilities:
//! - `MetadataStore`: per-dataset key/value attributes
//! - `DatasetCatalog`: lookup by resource id
//! - `SyncLedger`: through component-scoped [`ComponentLedger`] handles
//!
//! # Design Notes
//!
//! - All state lives behind one `parking_lot::RwLock`, so conflicting updates
//!   to the same dataset are serialized
//! - A file-backed catalog is shared between processes through
//!   `<state-file>.lock`: every mutation takes an exclusive lock, re-reads the
//!   file, applies the change and writes through (temp + fsync + rename).
//!   Ledger and metadata reads re-read the file under a shared lock.
//! - Ledger errors are stored per component under the operation name

use std::collections::{BTreeMap, BTreeSet};
use std::ffi::OsString;
use std::fs::{self, File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use fs2::FileExt;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;

use tarflow_core::metadata::{self, TARBALL_PATH};
use tarflow_core::{
    Dataset, DatasetCatalog, DatasetState, Error, MetadataStore, Operation, Result,
};

use crate::ledger::ComponentLedger;

/// Serialized catalog contents
#[derive(Debug, Default, Clone, Serialize, Deserialize)]
struct CatalogState {
    /// name → dataset
    #[serde(default)]
    datasets: BTreeMap<String, Dataset>,
    /// name → key → value
    #[serde(default)]
    metadata: BTreeMap<String, BTreeMap<String, Value>>,
    /// name → stages the dataset is enabled for
    #[serde(default)]
    enabled: BTreeMap<String, BTreeSet<Operation>>,
    /// name → component → last error
    #[serde(default)]
    errors: BTreeMap<String, BTreeMap<String, String>>,
}

/// Dataset, ledger and metadata store
#[derive(Debug)]
pub struct Catalog {
    state: RwLock<CatalogState>,
    path: Option<PathBuf>,
}

impl Catalog {
    /// Create an empty catalog that is never written to disk
    pub fn in_memory() -> Self {
        Self {
            state: RwLock::new(CatalogState::default()),
            path: None,
        }
    }

    /// Open a file-backed catalog, starting empty if the file does not exist
    ///
    /// Several catalogs, in this or other processes, may open the same file;
    /// their updates are serialized through `<path>.lock`.
    ///
    /// # Errors
    ///
    /// Returns an error if the file exists but cannot be read or parsed, or
    /// if the lock file cannot be opened.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let state = {
            let _lock = lock_state_file(&path, false)?;
            read_state(&path)?
        };
        debug!(path = %path.display(), "opened catalog");
        Ok(Self {
            state: RwLock::new(state),
            path: Some(path),
        })
    }

    /// Re-read a file-backed catalog so later reads see updates made through
    /// other handles; a no-op for in-memory catalogs
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be locked, read or parsed.
    pub fn refresh(&self) -> Result<()> {
        let Some(path) = &self.path else {
            return Ok(());
        };
        let mut state = self.state.write();
        let _lock = lock_state_file(path, false)?;
        *state = read_state(path)?;
        Ok(())
    }

    /// Ledger handle recording errors under `component`
    pub fn ledger(self: &Arc<Self>, component: Operation) -> ComponentLedger {
        ComponentLedger::new(Arc::clone(self), component)
    }

    /// Add a dataset (replacing any dataset of the same name)
    pub fn insert_dataset(&self, dataset: Dataset) -> Result<()> {
        self.mutate(|state| {
            state.datasets.insert(dataset.name.clone(), dataset);
            Ok(())
        })
    }

    /// Accept a tarball: add the dataset, record its path, enable `BACKUP`
    pub fn register(&self, dataset: Dataset, tarball: &Path) -> Result<()> {
        self.mutate(|state| {
            let name = dataset.name.clone();
            if let Some(existing) = state.datasets.get(&name) {
                if existing.resource_id != dataset.resource_id {
                    return Err(Error::Ledger(format!(
                        "dataset {} already registered with resource id {}",
                        name, existing.resource_id
                    )));
                }
            } else {
                state.datasets.insert(name.clone(), dataset);
            }
            state.metadata.entry(name.clone()).or_default().insert(
                TARBALL_PATH.to_string(),
                Value::String(tarball.to_string_lossy().into_owned()),
            );
            state
                .enabled
                .entry(name)
                .or_default()
                .insert(Operation::Backup);
            Ok(())
        })
    }

    /// Enable `stage` for the dataset named `name`
    pub fn enable(&self, name: &str, stage: Operation) -> Result<()> {
        self.mutate(|state| {
            if !state.datasets.contains_key(name) {
                return Err(Error::DatasetNotFound(name.to_string()));
            }
            state
                .enabled
                .entry(name.to_string())
                .or_default()
                .insert(stage);
            Ok(())
        })
    }

    /// Dataset by name
    ///
    /// This and the other listing accessors read the state as of the last
    /// mutation or [`Catalog::refresh`].
    pub fn dataset(&self, name: &str) -> Option<Dataset> {
        self.state.read().datasets.get(name).cloned()
    }

    /// Every dataset, in name order
    pub fn datasets(&self) -> Vec<Dataset> {
        self.state.read().datasets.values().cloned().collect()
    }

    /// Stages the dataset is currently enabled for
    pub fn enabled_stages(&self, name: &str) -> Vec<Operation> {
        self.state
            .read()
            .enabled
            .get(name)
            .map(|s| s.iter().copied().collect())
            .unwrap_or_default()
    }

    /// Last error per component for the dataset
    pub fn errors(&self, name: &str) -> BTreeMap<String, String> {
        self.state
            .read()
            .errors
            .get(name)
            .cloned()
            .unwrap_or_default()
    }

    /// Datasets enabled for `stage`, in name order
    pub(crate) fn enabled_for(&self, stage: Operation) -> Result<Vec<Dataset>> {
        self.refresh()?;
        let state = self.state.read();
        Ok(state
            .enabled
            .iter()
            .filter(|(_, stages)| stages.contains(&stage))
            .filter_map(|(name, _)| state.datasets.get(name).cloned())
            .collect())
    }

    /// Complete `completed`, enable `next`, clear the component's error
    pub(crate) fn advance(
        &self,
        dataset: &Dataset,
        completed: Operation,
        next: &[Operation],
        component: Operation,
    ) -> Result<()> {
        self.mutate(|state| {
            let name = &dataset.name;
            let stages = state.enabled.entry(name.clone()).or_default();
            stages.remove(&completed);
            stages.extend(next.iter().copied());

            if let Some(errors) = state.errors.get_mut(name) {
                errors.remove(component.name());
                if errors.is_empty() {
                    state.errors.remove(name);
                }
            }

            let advanced = match completed {
                Operation::Backup => Some(DatasetState::Archived),
                Operation::Index => Some(DatasetState::Indexed),
                _ => None,
            };
            if let (Some(new_state), Some(ds)) = (advanced, state.datasets.get_mut(name)) {
                ds.state = new_state;
            }
            Ok(())
        })
    }

    /// Record `message` as the component's last error for the dataset
    pub(crate) fn record_error(
        &self,
        dataset: &Dataset,
        component: Operation,
        message: &str,
    ) -> Result<()> {
        self.mutate(|state| {
            state
                .errors
                .entry(dataset.name.clone())
                .or_default()
                .insert(component.name().to_string(), message.to_string());
            Ok(())
        })
    }

    /// Apply `f` to the latest state and persist the result
    ///
    /// File-backed catalogs hold the exclusive file lock from the re-read
    /// through the rename.
    fn mutate<T>(&self, f: impl FnOnce(&mut CatalogState) -> Result<T>) -> Result<T> {
        let mut state = self.state.write();
        let (_lock, mut next) = match &self.path {
            Some(path) => {
                let lock = lock_state_file(path, true)?;
                (Some(lock), read_state(path)?)
            }
            None => (None, state.clone()),
        };
        let out = f(&mut next)?;
        self.persist(&next)?;
        *state = next;
        Ok(out)
    }

    /// Write the state atomically (temp + fsync + rename)
    fn persist(&self, state: &CatalogState) -> Result<()> {
        let Some(path) = &self.path else {
            return Ok(());
        };
        let dir = path.parent().unwrap_or(Path::new("."));
        fs::create_dir_all(dir)?;

        let payload = serde_json::to_vec_pretty(state)?;
        let mut tmp = tempfile::NamedTempFile::new_in(dir)?;
        tmp.write_all(&payload)?;
        tmp.as_file().sync_all()?;
        tmp.persist(path).map_err(|e| Error::Io(e.error))?;
        Ok(())
    }
}

/// `<state-file>.lock`
fn lock_path(path: &Path) -> PathBuf {
    let mut name = OsString::from(path.as_os_str());
    name.push(".lock");
    PathBuf::from(name)
}

/// Open the lock file beside `path` and lock it; released on drop
fn lock_state_file(path: &Path, exclusive: bool) -> Result<File> {
    if let Some(dir) = path.parent() {
        fs::create_dir_all(dir)?;
    }
    let lock_path = lock_path(path);
    let file = OpenOptions::new()
        .create(true)
        .truncate(false)
        .read(true)
        .write(true)
        .open(&lock_path)
        .map_err(|e| {
            Error::Ledger(format!("failed to open lock file {}: {}", lock_path.display(), e))
        })?;
    let locked = if exclusive {
        FileExt::lock_exclusive(&file)
    } else {
        FileExt::lock_shared(&file)
    };
    locked.map_err(|e| Error::Ledger(format!("cannot lock {}: {}", lock_path.display(), e)))?;
    Ok(file)
}

/// Read the state file; a missing file is an empty catalog
fn read_state(path: &Path) -> Result<CatalogState> {
    match fs::read(path) {
        Ok(bytes) => serde_json::from_slice(&bytes)
            .map_err(|e| Error::Ledger(format!("cannot parse {}: {}", path.display(), e))),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(CatalogState::default()),
        Err(e) => Err(e.into()),
    }
}

impl MetadataStore for Catalog {
    fn get_value(&self, dataset: &Dataset, key: &str) -> Result<Option<Value>> {
        metadata::validate_key(key)?;
        self.refresh()?;
        Ok(self
            .state
            .read()
            .metadata
            .get(&dataset.name)
            .and_then(|m| m.get(key))
            .cloned())
    }

    fn set_value(&self, dataset: &Dataset, key: &str, value: Value) -> Result<Value> {
        metadata::validate_key(key)?;
        self.mutate(|state| {
            state
                .metadata
                .entry(dataset.name.clone())
                .or_default()
                .insert(key.to_string(), value.clone());
            Ok(value)
        })
    }
}

impl DatasetCatalog for Catalog {
    fn attach(&self, resource_id: &str) -> Result<Dataset> {
        let wanted = resource_id.to_ascii_lowercase();
        self.refresh()?;
        self.state
            .read()
            .datasets
            .values()
            .find(|ds| ds.resource_id == wanted)
            .cloned()
            .ok_or_else(|| Error::DatasetNotFound(format!("resource id {}", resource_id)))
    }
}
