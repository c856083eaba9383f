//! Metadata keys read and written by the pipeline

use crate::error::{Error, Result};

/// Location of the dataset's tarball
pub const TARBALL_PATH: &str = "server.tarball-path";
/// Documents committed per index (JSON object of arrays)
pub const INDEX_MAP: &str = "server.index-map";
/// Pending re-index request
pub const REINDEX: &str = "server.reindex";
/// Set once the tarball is replicated to every configured destination
pub const ARCHIVED: &str = "server.archived";

/// Every key a metadata store must accept
pub const KNOWN_KEYS: [&str; 4] = [TARBALL_PATH, INDEX_MAP, REINDEX, ARCHIVED];

/// Reject keys outside [`KNOWN_KEYS`]
pub fn validate_key(key: &str) -> Result<()> {
    if KNOWN_KEYS.contains(&key) {
        Ok(())
    } else {
        Err(Error::UnknownKey(key.to_string()))
    }
}
