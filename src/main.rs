mod bannerlord;
mod cli;
mod config;
mod order;
mod scan;
mod submodule;

use anyhow::Result;

fn main() -> Result<()> {
    cli::run()
}
