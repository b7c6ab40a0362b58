//! `sysconf` command-line tool
//!
//! # Usage
//!
//! ```bash
//! # Validate a configuration file
//! sysconf validate --config app.yaml
//!
//! # Show what changed between two files
//! sysconf diff --from old.json --to new.json
//!
//! # Export as ENV with secrets masked
//! sysconf export --config app.json --to env --env-prefix APP
//!
//! # Snapshot into a backup store and list it
//! sysconf backup create --store ./backups --config app.json --compress
//! sysconf backup list --store ./backups
//! ```
//!
//! # Exit Codes
//!
//! - 0: Success
//! - 1: Validation failed with errors
//! - 2: Validation passed with warnings
//! - 3: Invalid input or arguments
//! - 4: File not found or inaccessible
//! - 10: Internal error

use clap::Parser;
use colored::Colorize;
use sysconf_cli::{run, Cli, ExitCode};
use tracing_subscriber::EnvFilter;

fn init_tracing(cli: &Cli) {
    let default_level = match (cli.quiet, cli.verbose) {
        (true, _) => "error",
        (false, 0) => "warn",
        (false, 1) => "info",
        (false, 2) => "debug",
        _ => "trace",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr);

    if cli.log_json {
        builder.json().init();
    } else {
        builder.init();
    }
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    init_tracing(&cli);

    let code = match run(cli).await {
        Ok(code) => code,
        Err(err) => {
            eprintln!("{} {:#}", "error:".red().bold(), err);
            ExitCode::from_error(&err)
        }
    };
    std::process::exit(code.into());
}
