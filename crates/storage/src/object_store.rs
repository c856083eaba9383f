//! Directory-backed object store
//!
//! A bucket is a directory under the store root. Objects live at
//! `<root>/<bucket>/<key>`; their metadata (size and MD5) at
//! `<root>/<bucket>/.meta/<key>.json`. Uploads are hashed while they are
//! copied and rejected when the digest differs from the integrity parameter,
//! so a corrupted transfer never becomes visible under its key.

use std::fs::{self, File};
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};

use tracing::{debug, warn};

use tarflow_core::{Error, ObjectHead, ObjectStore, Result};

use crate::integrity::copy_hashed;

const META_DIR: &str = ".meta";

/// [`ObjectStore`] keeping objects in a local directory tree
#[derive(Debug, Clone)]
pub struct DirectoryObjectStore {
    root: PathBuf,
    bucket: String,
}

impl DirectoryObjectStore {
    /// Store writing to `bucket` under `root`
    pub fn new(root: impl Into<PathBuf>, bucket: impl Into<String>) -> Self {
        Self {
            root: root.into(),
            bucket: bucket.into(),
        }
    }

    /// Create the bucket directory
    pub fn create_bucket(&self) -> Result<()> {
        fs::create_dir_all(self.bucket_dir())?;
        Ok(())
    }

    fn bucket_dir(&self) -> PathBuf {
        self.root.join(&self.bucket)
    }

    fn object_path(&self, key: &str) -> Result<PathBuf> {
        validate_key(key)?;
        Ok(self.bucket_dir().join(key))
    }

    fn meta_path(&self, key: &str) -> Result<PathBuf> {
        validate_key(key)?;
        Ok(self.bucket_dir().join(META_DIR).join(format!("{}.json", key)))
    }
}

/// Keys are relative `/`-separated paths without `.`/`..` components
fn validate_key(key: &str) -> Result<()> {
    let bad = key.is_empty()
        || key.starts_with('/')
        || key
            .split('/')
            .any(|c| c.is_empty() || c == "." || c == ".." || c == META_DIR);
    if bad {
        return Err(Error::Store(format!("invalid object key {:?}", key)));
    }
    Ok(())
}

fn write_atomic(path: &Path, bytes: &[u8]) -> Result<()> {
    let dir = path.parent().unwrap_or(Path::new("."));
    fs::create_dir_all(dir)?;
    let mut tmp = tempfile::NamedTempFile::new_in(dir)?;
    tmp.write_all(bytes)?;
    tmp.as_file().sync_all()?;
    tmp.persist(path).map_err(|e| Error::Io(e.error))?;
    Ok(())
}

impl ObjectStore for DirectoryObjectStore {
    fn bucket(&self) -> &str {
        &self.bucket
    }

    fn head_bucket(&self) -> Result<()> {
        let dir = self.bucket_dir();
        match fs::metadata(&dir) {
            Ok(meta) if meta.is_dir() => Ok(()),
            Ok(_) => Err(Error::Store(format!(
                "bucket {} is not a directory",
                dir.display()
            ))),
            Err(e) => Err(Error::Store(format!(
                "bucket {} is not accessible: {}",
                dir.display(),
                e
            ))),
        }
    }

    fn head_object(&self, key: &str) -> Result<Option<ObjectHead>> {
        let object = self.object_path(key)?;
        match fs::metadata(&object) {
            Ok(_) => {}
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        }

        let meta = self.meta_path(key)?;
        match fs::read(&meta) {
            Ok(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            // an object stored without metadata has no known digest
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(Some(ObjectHead {
                size: fs::metadata(&object)?.len(),
                content_md5: None,
            })),
            Err(e) => Err(e.into()),
        }
    }

    fn put_object(&self, key: &str, source: &Path, size: u64, content_md5: &str) -> Result<()> {
        self.head_bucket()?;
        let object = self.object_path(key)?;
        let dir = object.parent().unwrap_or(Path::new("."));
        fs::create_dir_all(dir)?;

        let mut input = File::open(source)?;
        let mut tmp = tempfile::NamedTempFile::new_in(dir)?;
        let (written, digest) = copy_hashed(&mut input, tmp.as_file_mut())?;

        let expected = content_md5.to_ascii_lowercase();
        if digest != expected {
            warn!(key, %digest, %expected, "rejecting upload with bad digest");
            return Err(Error::Store(format!(
                "BadDigest: {} uploaded with MD5 {} but {} was expected",
                key, digest, expected
            )));
        }
        if written != size {
            return Err(Error::Store(format!(
                "IncompleteBody: {} uploaded {} bytes but {} were declared",
                key, written, size
            )));
        }

        tmp.as_file().sync_all()?;
        tmp.persist(&object).map_err(|e| Error::Io(e.error))?;

        let head = ObjectHead {
            size: written,
            content_md5: Some(digest),
        };
        write_atomic(&self.meta_path(key)?, &serde_json::to_vec(&head)?)?;
        debug!(bucket = %self.bucket, key, size = written, "stored object");
        Ok(())
    }
}
