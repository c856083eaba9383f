//! Content integrity: MD5 digests and `.md5` sidecar files
//!
//! A sidecar holds the hex digest followed by whitespace and the original
//! file name, the format `md5sum` writes. Only the first token is read.
//!
//! Failures to read the sidecar are errors ([`Error::Integrity`]); a digest
//! that simply differs is a normal [`Verification`] with `matched() == false`.

use std::fs::File;
use std::io::{self, BufRead, BufReader, Read, Write};
use std::path::{Path, PathBuf};

use md5::{Digest, Md5};
use tarflow_core::{Error, Result};

/// Extension appended to a tarball path to find its sidecar
pub const SIDECAR_EXTENSION: &str = "md5";

const COPY_BUFFER_SIZE: usize = 64 * 1024;

/// Outcome of comparing a file against its recorded digest
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Verification {
    /// Digest read from the sidecar (lowercase hex)
    pub recorded: String,
    /// Digest computed from the file (lowercase hex)
    pub computed: String,
    /// File size in bytes
    pub size: u64,
}

impl Verification {
    /// True if the recorded and computed digests agree
    pub fn matched(&self) -> bool {
        self.recorded == self.computed
    }
}

/// Sidecar path for `file`: `<file>.md5`
pub fn sidecar_path(file: &Path) -> PathBuf {
    let mut name = file.as_os_str().to_owned();
    name.push(".");
    name.push(SIDECAR_EXTENSION);
    PathBuf::from(name)
}

/// Copy `reader` into `writer`, hashing everything that passes through
///
/// Returns the byte count and lowercase hex digest.
pub fn copy_hashed<R: Read, W: Write>(reader: &mut R, writer: &mut W) -> io::Result<(u64, String)> {
    let mut hasher = Md5::new();
    let mut buf = vec![0u8; COPY_BUFFER_SIZE];
    let mut total = 0u64;
    loop {
        let n = match reader.read(&mut buf) {
            Ok(0) => break,
            Ok(n) => n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        };
        hasher.update(&buf[..n]);
        writer.write_all(&buf[..n])?;
        total += n as u64;
    }
    Ok((total, format!("{:x}", hasher.finalize())))
}

/// Size and lowercase hex MD5 of the full content of `file`
pub fn hash_file(file: &Path) -> Result<(u64, String)> {
    let mut f = File::open(file)?;
    Ok(copy_hashed(&mut f, &mut io::sink())?)
}

/// Read the recorded digest from a sidecar
///
/// # Errors
///
/// [`Error::Integrity`] if the sidecar is missing, unreadable, empty, or its
/// first token is not a hex digest.
pub fn read_sidecar(sidecar: &Path) -> Result<String> {
    let file = File::open(sidecar).map_err(|e| {
        Error::Integrity(format!("cannot open {}: {}", sidecar.display(), e))
    })?;
    let mut line = String::new();
    BufReader::new(file).read_line(&mut line).map_err(|e| {
        Error::Integrity(format!("cannot read {}: {}", sidecar.display(), e))
    })?;

    let token = line.split_whitespace().next().ok_or_else(|| {
        Error::Integrity(format!("{} does not contain a digest", sidecar.display()))
    })?;
    if !token.chars().all(|c| c.is_ascii_hexdigit()) {
        return Err(Error::Integrity(format!(
            "{} holds a malformed digest {:?}",
            sidecar.display(),
            token
        )));
    }
    Ok(token.to_ascii_lowercase())
}

/// Compare `file` against the digest recorded in `sidecar`
///
/// # Errors
///
/// [`Error::Integrity`] for sidecar problems, [`Error::Io`] if `file` itself
/// cannot be read.
pub fn verify(file: &Path, sidecar: &Path) -> Result<Verification> {
    let recorded = read_sidecar(sidecar)?;
    let (size, computed) = hash_file(file)?;
    Ok(Verification {
        recorded,
        computed,
        size,
    })
}

/// Write `<digest>  <file name>` to the sidecar of `file`
///
/// Returns the digest.
pub fn write_sidecar(file: &Path) -> Result<String> {
    let (_, digest) = hash_file(file)?;
    let name = file
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    std::fs::write(sidecar_path(file), format!("{}  {}\n", digest, name))?;
    Ok(digest)
}
