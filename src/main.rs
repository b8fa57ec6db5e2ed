//! tickpool CLI: deliver a batch of notifications through the worker pool.

use anyhow::Result;
use clap::Parser;
use std::time::Instant;
use tickpool::engine::arg_parser::Cli;
use tickpool::engine::handle_run;

fn main() -> Result<()> {
    let start_time = Instant::now();
    let cli = Cli::parse();
    handle_run(&cli)?;
    log::debug!("Total time: {:?}", start_time.elapsed());
    Ok(())
}
