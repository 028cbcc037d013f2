//! hutchns CLI: build type-filtered and metadata-keyed namespaces from an
//! object database.

mod commands;

use clap::Parser;
use color_eyre::eyre::Result;

use commands::Cli;

fn main() -> Result<()> {
    color_eyre::install()?;
    let cli = Cli::parse();
    let config = commands::load_app_config(&cli)?;
    commands::init_tracing(&cli, &config)?;
    commands::run(cli, &config)
}
