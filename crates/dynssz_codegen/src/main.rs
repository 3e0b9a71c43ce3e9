//! The `dynssz-gen` binary.

use std::process::ExitCode;

use clap::Parser;
use tracing_subscriber::EnvFilter;

use dynssz_codegen::cli::{Args, NoPackages, run};
use dynssz_codegen::write_files;

fn main() -> ExitCode {
    let args = Args::parse();

    let default_level = if args.verbose { "debug" } else { "warn" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(default_level)),
        )
        .with_target(false)
        .init();

    match run(&args, &NoPackages) {
        Ok(files) => {
            if let Err(e) = write_files(std::path::Path::new("."), &files) {
                eprintln!("dynssz-gen: {e}");
                return ExitCode::from(e.exit_code());
            }
            for file in &files {
                tracing::info!(file = %file.name, "written");
            }
            ExitCode::SUCCESS
        }
        Err(e) => {
            eprintln!("dynssz-gen: {e}");
            ExitCode::from(e.exit_code())
        }
    }
}
