//! tarflow CLI: runs pipeline stages against the configured catalog.
//!
//! - `tarflow backup`: replicate tarballs waiting for BACKUP
//! - `tarflow accept <tarball>...`: register new tarballs
//! - `tarflow ledger`: show the catalog
//!
//! Exit codes: 0 success, 1 invalid configuration or failed command,
//! 2 no configuration source, 3 no usable backup destination.

mod commands;
mod format;
mod reporter;

use std::path::PathBuf;
use std::process;
use std::sync::Arc;

use tracing::info;
use tracing_subscriber::EnvFilter;

use tarflow_core::{ObjectStore, Operation};
use tarflow_engine::{
    accept_tarball, post_summary_quietly, timestamp, BackupReplicator, BackupTargets,
    PipelineConfig, CONFIG_ENV_VAR,
};
use tarflow_storage::{Catalog, DirectoryObjectStore};

use commands::build_cli;
use format::{format_accepted, format_backup, format_error, format_ledger, LedgerRow, OutputMode};
use reporter::LogReporter;

const LOG_ENV_VAR: &str = "TARFLOW_LOG";
const EXIT_INVALID_CONFIG: i32 = 1;
const EXIT_NO_CONFIG: i32 = 2;
const EXIT_NO_DESTINATION: i32 = 3;

fn main() {
    let matches = build_cli().get_matches();
    init_tracing();

    let mode = if matches.get_flag("json") {
        OutputMode::Json
    } else {
        OutputMode::Human
    };

    let flag = matches.get_one::<String>("config").cloned();
    let Some(config_path) = config_path(flag, std::env::var(CONFIG_ENV_VAR).ok()) else {
        eprintln!(
            "tarflow: ERROR: No config file specified; set {} or use --config <file>",
            CONFIG_ENV_VAR
        );
        process::exit(EXIT_NO_CONFIG);
    };
    let config = match PipelineConfig::from_file(&config_path) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("tarflow: {}", e);
            process::exit(EXIT_INVALID_CONFIG);
        }
    };
    let catalog = match Catalog::open(&config.server.state_file) {
        Ok(catalog) => Arc::new(catalog),
        Err(e) => {
            eprintln!("tarflow: {}", e);
            process::exit(EXIT_INVALID_CONFIG);
        }
    };

    let code = match matches.subcommand() {
        Some(("backup", _)) => run_backup(&config, catalog, mode),
        Some(("accept", sub)) => {
            let owner = sub
                .get_one::<String>("owner")
                .map(String::as_str)
                .unwrap_or("admin");
            let tarballs: Vec<PathBuf> = sub
                .get_many::<String>("tarball")
                .map(|v| v.map(PathBuf::from).collect())
                .unwrap_or_default();
            run_accept(&catalog, &tarballs, owner, mode)
        }
        Some(("ledger", _)) => run_ledger(&catalog, mode),
        _ => {
            eprintln!("{}", format_error("unknown command", mode));
            1
        }
    };
    process::exit(code);
}

fn init_tracing() {
    let filter = EnvFilter::try_from_env(LOG_ENV_VAR).unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init();
}

/// `--config` wins over the environment; empty values count as unset
fn config_path(flag: Option<String>, env: Option<String>) -> Option<PathBuf> {
    flag.into_iter()
        .chain(env)
        .find(|s| !s.trim().is_empty())
        .map(PathBuf::from)
}

fn run_backup(config: &PipelineConfig, catalog: Arc<Catalog>, mode: OutputMode) -> i32 {
    let remote = config.remote.as_ref().and_then(|remote| {
        remote.bucket.as_ref().map(|bucket| {
            Arc::new(DirectoryObjectStore::new(&remote.root, bucket.as_str())) as Arc<dyn ObjectStore>
        })
    });
    let targets = BackupTargets::sanity_check(config.server.backup_dir.as_deref(), remote);
    if !targets.any_usable() {
        eprintln!("{}", format_error("no usable backup destination", mode));
        return EXIT_NO_DESTINATION;
    }

    let run_ts = timestamp();
    info!("start-{}", run_ts);
    let replicator = BackupReplicator::new(
        Arc::new(catalog.ledger(Operation::Backup)),
        catalog.clone(),
        catalog,
        targets,
    );
    let results = match replicator.run() {
        Ok(results) => results,
        Err(e) => {
            eprintln!("{}", format_error(&e.to_string(), mode));
            return 1;
        }
    };
    println!("{}", format_backup(&results, mode));

    post_summary_quietly(
        &LogReporter::new("tarflow-backup"),
        &config.server.tmp_dir,
        "tarflow-backup",
        &config.server.environment,
        &results.to_string(),
    );
    info!("end-{}", run_ts);
    0
}

fn run_accept(catalog: &Catalog, tarballs: &[PathBuf], owner: &str, mode: OutputMode) -> i32 {
    let mut code = 0;
    for tarball in tarballs {
        match accept_tarball(catalog, tarball, owner) {
            Ok(accepted) => println!("{}", format_accepted(&accepted, mode)),
            Err(e) => {
                eprintln!(
                    "{}",
                    format_error(&format!("{}: {}", tarball.display(), e), mode)
                );
                code = 1;
            }
        }
    }
    code
}

fn run_ledger(catalog: &Catalog, mode: OutputMode) -> i32 {
    let rows: Vec<LedgerRow> = catalog
        .datasets()
        .into_iter()
        .map(|dataset| LedgerRow {
            stages: catalog.enabled_stages(&dataset.name),
            errors: catalog.errors(&dataset.name),
            dataset,
        })
        .collect();
    println!("{}", format_ledger(&rows, mode));
    0
}
