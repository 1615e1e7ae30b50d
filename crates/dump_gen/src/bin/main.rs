//! CLI for generating MySQL test dumps.
//!
//! Usage:
//!   gen-dump --tables 5 --rows 10000 --seed 42 > dump.sql
//!   gen-dump --style phpmyadmin --raw-newlines -o fixtures/pma.sql

use clap::Parser;
use dump_gen::{DumpConfig, DumpGenerator, DumpStyle};
use std::fs::File;
use std::io::{self, BufWriter, Write};

#[derive(Parser, Debug)]
#[command(name = "gen-dump")]
#[command(about = "Generate MySQL dump fixtures for mysql2pg", long_about = None)]
struct Args {
    /// Random seed for reproducibility
    #[arg(long, default_value = "42")]
    seed: u64,

    /// Number of tables
    #[arg(long, default_value = "3")]
    tables: usize,

    /// Rows per table
    #[arg(long, default_value = "100")]
    rows: usize,

    /// Rows per INSERT statement
    #[arg(long, default_value = "50")]
    batch_size: usize,

    /// Dump layout: mysqldump or phpmyadmin
    #[arg(long, default_value = "mysqldump")]
    style: String,

    /// Share of text values drawn from the awkward-value list (0.0-1.0)
    #[arg(long, default_value = "0.3")]
    tricky_ratio: f64,

    /// Keep newlines inside literals raw (multi-line statements)
    #[arg(long)]
    raw_newlines: bool,

    /// Output file (default: stdout)
    #[arg(short, long)]
    output: Option<String>,
}

fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let style: DumpStyle = args.style.parse().map_err(|e: String| anyhow::anyhow!(e))?;
    if !(0.0..=1.0).contains(&args.tricky_ratio) {
        anyhow::bail!("--tricky-ratio must be between 0.0 and 1.0");
    }

    let mut generator = DumpGenerator::new(DumpConfig {
        seed: args.seed,
        tables: args.tables,
        rows_per_table: args.rows,
        batch_size: args.batch_size,
        style,
        tricky_ratio: args.tricky_ratio,
        raw_newlines: args.raw_newlines,
    });

    let mut out: Box<dyn Write> = match &args.output {
        Some(path) => Box::new(BufWriter::new(File::create(path)?)),
        None => Box::new(BufWriter::new(io::stdout())),
    };

    let summary = generator.generate_to(&mut out)?;
    out.flush()?;

    eprintln!(
        "Generated {} tables, {} rows in {} INSERT statements",
        summary.tables.len(),
        summary.total_rows(),
        summary.total_statements()
    );

    Ok(())
}
