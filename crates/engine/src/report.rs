//! Status report helpers

use std::io::Write;
use std::path::Path;

use tracing::{debug, warn};

use tarflow_core::{Result, StatusReporter};

/// Report timestamp, microsecond precision UTC
pub fn timestamp() -> String {
    chrono::Utc::now()
        .format("%Y-%m-%dT%H:%M:%S%.6f")
        .to_string()
}

/// Write `"<prog>.<ts>(<env>)\n<summary>\n"` to a temp file and post it
///
/// The file lives in `tmp_dir` only while the report is posted.
///
/// # Errors
///
/// Returns an error if the file cannot be written or the post fails.
pub fn post_summary(
    reporter: &dyn StatusReporter,
    tmp_dir: &Path,
    prog: &str,
    environment: &str,
    summary: &str,
) -> Result<String> {
    let ts = timestamp();
    let mut file = tempfile::Builder::new()
        .prefix(&format!("{}.", prog))
        .suffix(".report")
        .tempfile_in(tmp_dir)?;
    write!(file, "{}.{}({})\n{}\n", prog, ts, environment, summary)?;
    file.flush()?;

    let tracking_id = reporter.post_status(&ts, "status", Some(file.path()))?;
    debug!(%tracking_id, "posted run summary");
    Ok(tracking_id)
}

/// Like [`post_summary`], but failures are only logged
pub fn post_summary_quietly(
    reporter: &dyn StatusReporter,
    tmp_dir: &Path,
    prog: &str,
    environment: &str,
    summary: &str,
) -> Option<String> {
    match post_summary(reporter, tmp_dir, prog, environment, summary) {
        Ok(id) => Some(id),
        Err(e) => {
            warn!(error = %e, "unable to post run summary");
            None
        }
    }
}
