#![forbid(unsafe_code)]
#![deny(
    unused,
    unused_imports,
    unused_must_use,
    unreachable_pub,
    clippy::all,
    clippy::pedantic,
    clippy::nursery,
    rustdoc::broken_intra_doc_links,
    missing_docs
)]

//! Binary entrypoint: identify local anime files and file them into a library.

use std::path::PathBuf;
use std::process::ExitCode;

use anishelf_app::{RunOptions, run_app};
use clap::Parser;

/// Identify local anime files by content hash and rename them into a library.
#[derive(Debug, Parser)]
#[command(name = "anishelf", version)]
struct Cli {
    /// JSON configuration document.
    #[arg(long, short = 'c', env = "ANISHELF_CONFIG")]
    config: Option<PathBuf>,
    /// Plan destinations without touching any file.
    #[arg(long)]
    dry_run: bool,
    /// Files or directories to process; replaces `scan.sources`.
    paths: Vec<PathBuf>,
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    let options = RunOptions {
        config_path: cli.config,
        dry_run: cli.dry_run,
        paths: cli.paths,
    };
    match run_app(options).await {
        Ok(summary) => {
            println!(
                "processed {} renamed {} failed {} skipped {}",
                summary.processed, summary.renamed, summary.failed, summary.skipped
            );
            ExitCode::SUCCESS
        }
        Err(err) => {
            eprintln!("error: {err}");
            let mut source = std::error::Error::source(&err);
            while let Some(cause) = source {
                eprintln!("  caused by: {cause}");
                source = cause.source();
            }
            ExitCode::from(err.exit_code())
        }
    }
}
