//! Status reporter that writes reports to the log

use std::fs;
use std::path::Path;

use tracing::info;
use uuid::Uuid;

use tarflow_core::{Error, Result, StatusReporter};

/// Logs each status document and hands back a fresh tracking id
#[derive(Debug, Clone)]
pub struct LogReporter {
    name: String,
}

impl LogReporter {
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }
}

impl StatusReporter for LogReporter {
    fn post_status(&self, timestamp: &str, doc_type: &str, file: Option<&Path>) -> Result<String> {
        let body = match file {
            Some(path) => fs::read_to_string(path)
                .map_err(|e| Error::Report(format!("cannot read {}: {}", path.display(), e)))?,
            None => String::new(),
        };
        let tracking_id = Uuid::new_v4().to_string();
        info!(
            reporter = %self.name,
            %timestamp,
            doc_type,
            %tracking_id,
            report = body.trim_end(),
            "status report"
        );
        Ok(tracking_id)
    }
}
