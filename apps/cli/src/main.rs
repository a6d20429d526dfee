//! frond CLI: per-file asset builds driven by extension chains.
//!
//! Reads `frond.toml`, dispatches every source file to its registered
//! processors, and writes the results under the target directory.

mod commands;

use clap::Parser;
use color_eyre::eyre::Result;

use commands::Cli;

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    color_eyre::install()?;
    let cli = Cli::parse();
    commands::init_tracing(&cli);
    commands::run(cli).await
}
