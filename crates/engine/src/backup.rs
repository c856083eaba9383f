//! Backup replication
//!
//! Every dataset enabled for `BACKUP` is verified against its sidecar digest
//! and replicated to the local backup tree and the remote object store:
//!
//! ```text
//! <backup-root>/<controller>/<tarball>        local copy
//! <backup-root>/<controller>/<tarball>.md5    local sidecar
//! <controller>/<tarball>                      remote key
//! ```
//!
//! A copy already present under the same name is accepted when its recorded
//! digest matches and is never overwritten when it does not. The dataset is
//! archived only when every configured destination succeeded; anything else
//! leaves the ledger untouched so the next run retries it.

use std::fmt;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde_json::Value;
use tracing::{debug, error, info, warn};

use tarflow_core::metadata::{ARCHIVED, TARBALL_PATH};
use tarflow_core::{
    Dataset, DatasetCatalog, Error, MetadataStore, ObjectStore, Operation, Result, SyncLedger,
};
use tarflow_storage::{read_sidecar, sidecar_path, verify};

/// A backup destination after the sanity check
#[derive(Debug, Clone)]
pub enum Destination<T> {
    /// Not configured; always fails but does not block archiving
    Unconfigured,
    /// Configured but unusable this run; fails and blocks archiving
    Disabled(String),
    /// Usable
    Active(T),
}

impl<T> Destination<T> {
    /// The destination, if usable
    pub fn active(&self) -> Option<&T> {
        match self {
            Destination::Active(t) => Some(t),
            _ => None,
        }
    }

    /// True when this destination must succeed before archiving
    pub fn is_configured(&self) -> bool {
        !matches!(self, Destination::Unconfigured)
    }
}

/// Per-destination result for one dataset
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackupStatus {
    /// Stored, or already present with the same digest
    Success,
    /// Not stored
    Fail,
}

/// Local backup tree
#[derive(Debug, Clone)]
pub struct LocalBackup {
    root: PathBuf,
}

impl LocalBackup {
    /// Backup tree rooted at `root`
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Root directory
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Copy `tarball` and its sidecar into `<root>/<controller>/`
    fn store(&self, controller: &str, tarball: &Path, sidecar: &Path, digest: &str) -> BackupStatus {
        let dir = self.root.join(controller);
        if let Err(e) = fs::create_dir_all(&dir) {
            error!(dir = %dir.display(), error = %e, "unable to create backup directory");
            return BackupStatus::Fail;
        }

        let Some(name) = tarball.file_name() else {
            return BackupStatus::Fail;
        };
        let target = dir.join(name);
        let target_sidecar = sidecar_path(&target);

        if target.is_file() {
            return match read_sidecar(&target_sidecar) {
                Ok(recorded) if recorded == digest => {
                    info!(target = %target.display(), "already locally backed up");
                    BackupStatus::Success
                }
                Ok(recorded) => {
                    error!(
                        target = %target.display(),
                        %recorded,
                        %digest,
                        "backup copy exists with a different MD5"
                    );
                    BackupStatus::Fail
                }
                Err(e) => {
                    error!(target = %target.display(), error = %e, "backup copy has no usable sidecar");
                    BackupStatus::Fail
                }
            };
        }

        if let Err(e) = fs::copy(sidecar, &target_sidecar) {
            error!(from = %sidecar.display(), to = %dir.display(), error = %e, "unable to copy sidecar");
            return BackupStatus::Fail;
        }
        if let Err(e) = fs::copy(tarball, &target) {
            error!(from = %tarball.display(), to = %dir.display(), error = %e, "unable to copy tarball");
            // leave no sidecar without its tarball
            remove_if_present(&target_sidecar);
            remove_if_present(&target);
            return BackupStatus::Fail;
        }

        info!(target = %target.display(), "local backup successful");
        BackupStatus::Success
    }
}

fn remove_if_present(path: &Path) {
    match fs::remove_file(path) {
        Ok(()) => {}
        Err(e) if e.kind() == io::ErrorKind::NotFound => {}
        Err(e) => warn!(path = %path.display(), error = %e, "unable to remove"),
    }
}

/// Store `tarball` under `key` unless an object with the same digest exists
fn store_remote(store: &dyn ObjectStore, key: &str, tarball: &Path, size: u64, digest: &str) -> BackupStatus {
    match store.head_object(key) {
        Ok(Some(head)) => match head.content_md5 {
            Some(md5) if md5.eq_ignore_ascii_case(digest) => {
                info!(bucket = store.bucket(), key, "already present in the object store");
                BackupStatus::Success
            }
            Some(md5) => {
                error!(bucket = store.bucket(), key, stored = %md5, %digest, "object exists with a different MD5");
                BackupStatus::Fail
            }
            None => {
                error!(bucket = store.bucket(), key, "object exists without a recorded MD5");
                BackupStatus::Fail
            }
        },
        Ok(None) => match store.put_object(key, tarball, size, digest) {
            Ok(()) => {
                info!(bucket = store.bucket(), key, size, "upload successful");
                BackupStatus::Success
            }
            Err(e) => {
                error!(bucket = store.bucket(), key, error = %e, "upload failed");
                BackupStatus::Fail
            }
        },
        Err(e) => {
            error!(bucket = store.bucket(), key, error = %e, "unable to query the object store");
            BackupStatus::Fail
        }
    }
}

/// Both destinations after the sanity check
#[derive(Clone)]
pub struct BackupTargets {
    /// Local backup tree
    pub local: Destination<LocalBackup>,
    /// Remote object store
    pub remote: Destination<Arc<dyn ObjectStore>>,
}

impl BackupTargets {
    /// Check each configured destination and disable the unusable ones
    ///
    /// The local root is created if missing (its parent must exist); the
    /// remote bucket must exist.
    pub fn sanity_check(backup_dir: Option<&Path>, remote: Option<Arc<dyn ObjectStore>>) -> Self {
        let local = match backup_dir {
            None => {
                warn!("no backup directory configured; local backup is disabled");
                Destination::Unconfigured
            }
            Some(dir) => match fs::create_dir(dir) {
                Ok(()) => Destination::Active(LocalBackup::new(dir)),
                Err(e) if e.kind() == io::ErrorKind::AlreadyExists => {
                    if dir.is_dir() {
                        Destination::Active(LocalBackup::new(dir))
                    } else {
                        error!(dir = %dir.display(), "backup destination is not a directory");
                        Destination::Disabled(format!("{} is not a directory", dir.display()))
                    }
                }
                Err(e) => {
                    error!(dir = %dir.display(), error = %e, "unable to create backup destination");
                    Destination::Disabled(format!("cannot create {}: {}", dir.display(), e))
                }
            },
        };

        let remote = match remote {
            None => {
                warn!("no bucket configured; remote backup is disabled");
                Destination::Unconfigured
            }
            Some(store) => match store.head_bucket() {
                Ok(()) => Destination::Active(store),
                Err(e) => {
                    warn!(bucket = store.bucket(), error = %e, "bucket is not accessible; remote backup is disabled");
                    Destination::Disabled(e.to_string())
                }
            },
        };

        Self { local, remote }
    }

    /// True if at least one destination is usable
    pub fn any_usable(&self) -> bool {
        self.local.active().is_some() || self.remote.active().is_some()
    }
}

/// Counters for one backup run
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BackupResults {
    /// Datasets considered
    pub total: usize,
    /// Local successes
    pub local_success: usize,
    /// Local failures
    pub local_fail: usize,
    /// Remote successes
    pub remote_success: usize,
    /// Remote failures
    pub remote_fail: usize,
    /// Datasets that failed before replication
    pub process_fail: usize,
    /// Datasets archived and advanced
    pub archived: usize,
}

impl fmt::Display for BackupResults {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Total processed: {}, Local backup successes: {}, Local backup failures: {}, \
             S3 upload successes: {}, S3 upload failures: {}, Unable to process: {}",
            self.total,
            self.local_success,
            self.local_fail,
            self.remote_success,
            self.remote_fail,
            self.process_fail
        )
    }
}

/// A tarball that passed verification
struct Verified {
    tarball: PathBuf,
    sidecar: PathBuf,
    controller: String,
    file_name: String,
    size: u64,
    digest: String,
}

/// Replicates datasets enabled for `BACKUP`
pub struct BackupReplicator {
    ledger: Arc<dyn SyncLedger>,
    metadata: Arc<dyn MetadataStore>,
    catalog: Arc<dyn DatasetCatalog>,
    targets: BackupTargets,
}

impl BackupReplicator {
    /// Create a replicator over checked destinations
    pub fn new(
        ledger: Arc<dyn SyncLedger>,
        metadata: Arc<dyn MetadataStore>,
        catalog: Arc<dyn DatasetCatalog>,
        targets: BackupTargets,
    ) -> Self {
        Self {
            ledger,
            metadata,
            catalog,
            targets,
        }
    }

    /// Destinations in use
    pub fn targets(&self) -> &BackupTargets {
        &self.targets
    }

    /// Back up every dataset enabled for `BACKUP`
    ///
    /// # Errors
    ///
    /// Returns an error if no destination is usable or the ledger cannot be
    /// read; per-dataset failures only show up in the counters.
    pub fn run(&self) -> Result<BackupResults> {
        if !self.targets.any_usable() {
            return Err(Error::Store("no usable backup destination".into()));
        }

        let mut results = BackupResults::default();
        for dataset in self.ledger.next(Operation::Backup)? {
            results.total += 1;
            debug!(dataset = %dataset, "backup started");

            let verified = match self.verify(&dataset) {
                Ok(v) => v,
                Err(message) => {
                    error!(dataset = %dataset, error = %message, "unable to back up");
                    self.record_error(&dataset, &message);
                    results.process_fail += 1;
                    continue;
                }
            };

            let dataset = match self.catalog.attach(&verified.digest) {
                Ok(ds) => ds,
                Err(e) => {
                    error!(resource_id = %verified.digest, error = %e, "unable to find dataset");
                    continue;
                }
            };

            let local = match self.targets.local.active() {
                Some(local) => local.store(
                    &verified.controller,
                    &verified.tarball,
                    &verified.sidecar,
                    &verified.digest,
                ),
                None => BackupStatus::Fail,
            };
            match local {
                BackupStatus::Success => results.local_success += 1,
                BackupStatus::Fail => results.local_fail += 1,
            }

            let remote = match self.targets.remote.active() {
                Some(store) => store_remote(
                    store.as_ref(),
                    &format!("{}/{}", verified.controller, verified.file_name),
                    &verified.tarball,
                    verified.size,
                    &verified.digest,
                ),
                None => BackupStatus::Fail,
            };
            match remote {
                BackupStatus::Success => results.remote_success += 1,
                BackupStatus::Fail => results.remote_fail += 1,
            }

            let gated = |dest_configured: bool, status: BackupStatus| {
                !dest_configured || status == BackupStatus::Success
            };
            if gated(self.targets.local.is_configured(), local)
                && gated(self.targets.remote.is_configured(), remote)
            {
                match self.archive(&dataset) {
                    Ok(()) => results.archived += 1,
                    Err(e) => {
                        error!(dataset = %dataset, error = %e, "unable to record backup");
                        self.record_error(&dataset, &format!("Unable to record backup: {}", e));
                    }
                }
            } else {
                debug!(dataset = %dataset, ?local, ?remote, "backup incomplete; will retry");
            }
        }

        info!("{}", results);
        Ok(results)
    }

    /// Resolve the tarball and its sidecar and check the recorded digest
    fn verify(&self, dataset: &Dataset) -> std::result::Result<Verified, String> {
        let recorded = match self.metadata.get_value(dataset, TARBALL_PATH) {
            Ok(Some(Value::String(path))) if !path.is_empty() => path,
            Ok(_) => return Err(format!("{} does not have a tarball-path", dataset)),
            Err(e) => return Err(format!("Could not read tarball path: {}", e)),
        };

        let tarball = match fs::canonicalize(&recorded) {
            Ok(path) if path.is_file() => path,
            _ => return Err(format!("tarball {} does not exist", recorded)),
        };
        let sidecar = sidecar_path(&tarball);
        if !sidecar.is_file() {
            return Err(format!("MD5 file {} does not exist", sidecar.display()));
        }

        let verification = match verify(&tarball, &sidecar) {
            Ok(v) => v,
            Err(Error::Integrity(e)) => {
                return Err(format!("can't read MD5 file {}: {}", sidecar.display(), e))
            }
            Err(e) => {
                return Err(format!("can't compute tarfile {} MD5: {}", tarball.display(), e))
            }
        };
        if !verification.matched() {
            return Err(format!(
                "Recorded MD5 {:?} does not match tarball MD5 {:?}",
                verification.recorded, verification.computed
            ));
        }

        let file_name = tarball
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        let controller = tarball
            .parent()
            .and_then(Path::file_name)
            .map(|n| n.to_string_lossy().into_owned())
            .ok_or_else(|| format!("tarball {} has no controller directory", tarball.display()))?;

        Ok(Verified {
            controller,
            file_name,
            size: verification.size,
            digest: verification.computed,
            sidecar,
            tarball,
        })
    }

    fn archive(&self, dataset: &Dataset) -> Result<()> {
        self.metadata
            .set_value(dataset, ARCHIVED, Value::Bool(true))?;
        self.ledger
            .update(dataset, Operation::Backup, Operation::Backup.successors())?;
        debug!(dataset = %dataset, "archived");
        Ok(())
    }

    fn record_error(&self, dataset: &Dataset, message: &str) {
        if let Err(e) = self.ledger.error(dataset, message) {
            error!(dataset = %dataset, error = %e, "unable to record ledger error");
        }
    }
}
