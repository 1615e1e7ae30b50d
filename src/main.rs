// Allow dead code for items that are part of the public API but only used in tests
#![allow(dead_code)]

mod analyzer;
mod cmd;
mod config;
mod convert;
mod loader;
mod parser;
mod progress;
mod sequence;
mod writer;

use clap::Parser;
use cmd::Cli;

fn main() {
    let cli = Cli::parse();

    if let Err(e) = cmd::run(cli) {
        eprintln!("Error: {e:#}");
        std::process::exit(1);
    }
}
