//! Clap command tree definition.

use clap::{Arg, ArgAction, Command};

/// Build the complete CLI command tree.
pub fn build_cli() -> Command {
    Command::new("tarflow")
        .about("Indexing and backup pipeline for benchmark result tarballs")
        .subcommand_required(true)
        .arg_required_else_help(true)
        .arg(
            Arg::new("config")
                .long("config")
                .short('C')
                .help("Config file (default: $TARFLOW_CONFIG)")
                .global(true),
        )
        .arg(
            Arg::new("json")
                .long("json")
                .help("JSON output mode")
                .action(ArgAction::SetTrue)
                .global(true),
        )
        .subcommand(
            Command::new("backup")
                .about("Back up every tarball waiting for BACKUP to the configured destinations"),
        )
        .subcommand(
            Command::new("accept")
                .about("Register tarballs as datasets and queue them for BACKUP")
                .arg(
                    Arg::new("owner")
                        .long("owner")
                        .help("Owning user (default: admin)")
                        .default_value("admin"),
                )
                .arg(
                    Arg::new("tarball")
                        .help("Tarball files (*.tar.xz)")
                        .required(true)
                        .num_args(1..),
                ),
        )
        .subcommand(
            Command::new("ledger").about("List datasets with their enabled stages and errors"),
        )
}
