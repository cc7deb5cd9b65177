//! `metacheck` validates item snapshots against a metamodel.

use clap::Parser;

mod cli;

fn main() -> anyhow::Result<()> {
    cli::Cli::parse().run()
}
