//! PSRC Data Portal - Main Entry Point

use std::process::ExitCode;

use anyhow::Context;
use clap::Parser;

use psrc_data_portal::infrastructure::driving_adapters::cli::{self, Cli};

fn main() -> anyhow::Result<ExitCode> {
    let cli = Cli::parse();

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("Failed to start async runtime")?;

    match runtime.block_on(cli::run(cli)) {
        Ok(()) => Ok(ExitCode::SUCCESS),
        Err(e) => {
            eprintln!("[{}] {e}", e.error_code());
            Ok(ExitCode::from(e.exit_code()))
        }
    }
}
