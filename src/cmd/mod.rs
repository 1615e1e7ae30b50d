mod convert;
mod inspect;

use clap::{Args, CommandFactory, Parser, Subcommand};
use clap_complete::{generate, Shell};
use std::io;
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "mysql2pg")]
#[command(version)]
#[command(about = "Convert MySQL dump INSERT data into a PostgreSQL migration script", long_about = None)]
#[command(args_conflicts_with_subcommands = true)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Commands>,

    /// Without a subcommand, convert
    #[command(flatten)]
    pub convert: ConvertArgs,
}

#[derive(Args, Debug, Clone, Default)]
pub struct ConvertArgs {
    /// MySQL dump to read (supports .gz, .bz2, .xz, .zst compression)
    #[arg(default_value = "dump.sql")]
    pub file: PathBuf,

    /// Output script; "-" for stdout [default: postgres-migration.sql]
    #[arg(short, long)]
    pub output: Option<PathBuf>,

    /// YAML config file (command-line flags take precedence)
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Only convert these tables (comma-separated)
    #[arg(short, long)]
    pub tables: Option<String>,

    /// Skip these tables (comma-separated)
    #[arg(short, long)]
    pub exclude: Option<String>,

    /// Always resync this sequence (repeatable)
    #[arg(long = "sequence", value_name = "TABLE[:COLUMN]")]
    pub sequences: Vec<String>,

    /// Primary key column assumed for resynced tables [default: id]
    #[arg(long)]
    pub pk_column: Option<String>,

    /// Only resync sequences given with --sequence or in the config
    #[arg(long)]
    pub no_derive_sequences: bool,

    /// String escape convention of the dump: backslash or standard [default: backslash]
    #[arg(long)]
    pub escapes: Option<String>,

    /// Identifier handling: strip backticks or quote as "name" [default: strip]
    #[arg(long)]
    pub identifiers: Option<String>,

    /// Omit the comment line before each INSERT
    #[arg(long)]
    pub no_annotate: bool,

    /// Wrap the script in BEGIN/COMMIT
    #[arg(long)]
    pub transaction: bool,

    /// Fail on the first malformed statement or re-escape failure
    #[arg(long)]
    pub strict: bool,

    /// Show progress during conversion
    #[arg(short, long)]
    pub progress: bool,

    /// Preview without writing files (dry run)
    #[arg(long)]
    pub dry_run: bool,

    /// Print statistics as JSON
    #[arg(long)]
    pub json: bool,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Convert a MySQL dump into a PostgreSQL migration script (default)
    Convert(ConvertArgs),

    /// Show INSERT statements and rows per table without converting
    Inspect {
        /// MySQL dump to read (supports .gz, .bz2, .xz, .zst compression)
        file: PathBuf,

        /// String escape convention of the dump: backslash or standard
        #[arg(long)]
        escapes: Option<String>,

        /// Show progress during analysis
        #[arg(short, long)]
        progress: bool,

        /// Output results as JSON
        #[arg(long)]
        json: bool,
    },

    /// Generate shell completions
    Completions {
        /// Shell to generate completions for
        #[arg(value_enum)]
        shell: Shell,
    },
}

pub fn run(cli: Cli) -> anyhow::Result<()> {
    match cli.command {
        None => convert::run(cli.convert),
        Some(Commands::Convert(args)) => convert::run(args),
        Some(Commands::Inspect {
            file,
            escapes,
            progress,
            json,
        }) => inspect::run(file, escapes, progress, json),
        Some(Commands::Completions { shell }) => {
            generate(shell, &mut Cli::command(), "mysql2pg", &mut io::stdout());
            Ok(())
        }
    }
}
