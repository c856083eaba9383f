//! Command results → human/json string formatting.
//!
//! Two modes:
//! - **Human** (default): one line per item, errors prefixed with `(error)`
//! - **JSON** (`--json`): `serde_json::to_string_pretty`

use std::collections::BTreeMap;

use serde_json::json;

use tarflow_core::{Dataset, Operation};
use tarflow_engine::{Accepted, BackupResults};

/// Output formatting mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputMode {
    Human,
    Json,
}

/// One dataset as shown by `tarflow ledger`.
#[derive(Debug, Clone)]
pub struct LedgerRow {
    pub dataset: Dataset,
    pub stages: Vec<Operation>,
    pub errors: BTreeMap<String, String>,
}

fn pretty(value: serde_json::Value) -> String {
    serde_json::to_string_pretty(&value).unwrap_or_else(|_| value.to_string())
}

/// Format an error.
pub fn format_error(message: &str, mode: OutputMode) -> String {
    match mode {
        OutputMode::Json => pretty(json!({ "error": message })),
        OutputMode::Human => format!("(error) {}", message),
    }
}

/// Format the ledger listing.
pub fn format_ledger(rows: &[LedgerRow], mode: OutputMode) -> String {
    match mode {
        OutputMode::Json => pretty(json!(rows
            .iter()
            .map(|row| json!({
                "name": row.dataset.name,
                "resource_id": row.dataset.resource_id,
                "owner": row.dataset.owner,
                "state": row.dataset.state.to_string(),
                "stages": row.stages,
                "errors": row.errors,
            }))
            .collect::<Vec<_>>())),
        OutputMode::Human => {
            if rows.is_empty() {
                return "(empty ledger)".to_string();
            }
            let mut lines = Vec::new();
            for row in rows {
                let stages: Vec<&str> = row.stages.iter().map(|s| s.name()).collect();
                let stages = if stages.is_empty() {
                    "-".to_string()
                } else {
                    stages.join(", ")
                };
                lines.push(format!(
                    "{} ({}) {} stages: {}",
                    row.dataset.name,
                    row.dataset.state,
                    row.dataset.resource_id,
                    stages
                ));
                for (component, message) in &row.errors {
                    lines.push(format!("  error[{}]: {}", component, message));
                }
            }
            lines.join("\n")
        }
    }
}

/// Format one accepted tarball.
pub fn format_accepted(accepted: &Accepted, mode: OutputMode) -> String {
    match mode {
        OutputMode::Json => pretty(json!({
            "name": accepted.dataset.name,
            "resource_id": accepted.dataset.resource_id,
            "tarball": accepted.tarball.to_string_lossy(),
            "wrote_sidecar": accepted.wrote_sidecar,
        })),
        OutputMode::Human => format!(
            "accepted {} ({})",
            accepted.dataset.name, accepted.dataset.resource_id
        ),
    }
}

/// Format backup counters.
pub fn format_backup(results: &BackupResults, mode: OutputMode) -> String {
    match mode {
        OutputMode::Json => pretty(json!({
            "total": results.total,
            "local_success": results.local_success,
            "local_fail": results.local_fail,
            "remote_success": results.remote_success,
            "remote_fail": results.remote_fail,
            "process_fail": results.process_fail,
            "archived": results.archived,
        })),
        OutputMode::Human => results.to_string(),
    }
}
