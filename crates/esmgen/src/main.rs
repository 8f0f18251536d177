use clap::Parser;
use esmgen::cli::Cli;

fn main() -> anyhow::Result<()> {
    Cli::parse().execute()
}
