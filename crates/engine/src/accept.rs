//! Tarball acceptance
//!
//! Accepting a tarball makes it a dataset: its digest becomes the resource id,
//! a sidecar is written (or an existing one is checked), and the dataset is
//! enabled for `BACKUP`.

use std::fs;
use std::path::{Path, PathBuf};

use tracing::{debug, info};

use tarflow_core::{Dataset, Error, Result};
use tarflow_storage::{sidecar_path, verify, write_sidecar, Catalog};

/// A tarball that was accepted
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Accepted {
    /// Registered dataset
    pub dataset: Dataset,
    /// Canonical tarball path recorded in metadata
    pub tarball: PathBuf,
    /// True if the sidecar was written by this call
    pub wrote_sidecar: bool,
}

/// Register `tarball` as a dataset owned by `owner`
///
/// # Errors
///
/// Fails if the tarball is not a regular file, an existing sidecar disagrees
/// with the content, or the catalog rejects the dataset (same name, other
/// resource id).
pub fn accept_tarball(catalog: &Catalog, tarball: &Path, owner: &str) -> Result<Accepted> {
    let tarball = fs::canonicalize(tarball)?;
    if !tarball.is_file() {
        return Err(Error::Integrity(format!(
            "{} is not a regular file",
            tarball.display()
        )));
    }

    let sidecar = sidecar_path(&tarball);
    let (digest, wrote_sidecar) = if sidecar.exists() {
        let verification = verify(&tarball, &sidecar)?;
        if !verification.matched() {
            return Err(Error::Integrity(format!(
                "Recorded MD5 {:?} does not match tarball MD5 {:?}",
                verification.recorded, verification.computed
            )));
        }
        debug!(tarball = %tarball.display(), "existing sidecar verified");
        (verification.computed, false)
    } else {
        (write_sidecar(&tarball)?, true)
    };

    let dataset = Dataset::new(Dataset::stem(&tarball), digest, owner);
    catalog.register(dataset.clone(), &tarball)?;
    info!(dataset = %dataset, resource_id = %dataset.resource_id, "accepted");

    Ok(Accepted {
        dataset,
        tarball,
        wrote_sidecar,
    })
}
