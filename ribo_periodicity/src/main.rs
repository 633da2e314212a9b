mod archive;
mod category;
mod cli;
mod config;
mod error;
mod experiment;
mod frame;
mod process;
mod store;
mod study;
mod tables;

#[macro_use]
extern crate log;
#[macro_use]
extern crate anyhow;

use anyhow::Context;

use crate::{archive::TsvArchive, process::ThreadLauncher};

fn main() -> anyhow::Result<()> {
    let cfg = cli::handle_cli().with_context(|| "Error processing command line arguments")?;
    process::process_categories(&cfg, &TsvArchive, &ThreadLauncher)
}
