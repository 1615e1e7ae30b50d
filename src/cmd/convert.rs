//! Convert command CLI handler.

use super::ConvertArgs;
use crate::config::MigrationYamlConfig;
use crate::convert::{self, ConvertConfig, ConvertOptions, ConvertStats, TableFilter};
use crate::parser::{IdentifierMode, SourceEscapes};
use crate::sequence::SequenceRef;
use std::path::PathBuf;
use std::time::Instant;

const DEFAULT_OUTPUT: &str = "postgres-migration.sql";

pub fn run(args: ConvertArgs) -> anyhow::Result<()> {
    let json = args.json;
    let config = build_config(args)?;
    let dry_run = config.dry_run;
    let to_stdout = config.output.is_none() && !dry_run;
    let output_label = config
        .output
        .as_ref()
        .map(|p| p.display().to_string())
        .unwrap_or_else(|| "stdout".to_string());

    let start_time = Instant::now();
    let stats = convert::run(config)?;
    let elapsed = start_time.elapsed();

    if json {
        let rendered = serde_json::to_string_pretty(&stats)?;
        // Keep stdout clean when the script itself goes there
        if to_stdout {
            eprintln!("{}", rendered);
        } else {
            println!("{}", rendered);
        }
    } else {
        print_stats(&stats, dry_run);
        if !dry_run {
            eprintln!("\n✓ Migration written to {} in {:.3?}", output_label, elapsed);
        }
    }

    Ok(())
}

/// Merge command-line flags over the YAML config.
pub(crate) fn build_config(args: ConvertArgs) -> anyhow::Result<ConvertConfig> {
    let yaml = match &args.config {
        Some(path) => MigrationYamlConfig::load(path)?,
        None => MigrationYamlConfig::default(),
    };

    let escapes = match &args.escapes {
        Some(e) => e.parse::<SourceEscapes>().map_err(|e| anyhow::anyhow!(e))?,
        None => yaml.escapes.unwrap_or_default(),
    };
    let identifiers = match &args.identifiers {
        Some(i) => i.parse::<IdentifierMode>().map_err(|e| anyhow::anyhow!(e))?,
        None => yaml.identifiers.unwrap_or_default(),
    };

    let tables = match &args.tables {
        Some(t) => split_list(t),
        None => yaml.tables.clone(),
    };
    let exclude = match &args.exclude {
        Some(e) => split_list(e),
        None => yaml.exclude.clone(),
    };

    let mut sequences = yaml.sequences.to_plan();
    if let Some(column) = &args.pk_column {
        sequences.default_column = column.clone();
    }
    if args.no_derive_sequences {
        sequences.derive = false;
    }
    let mut explicit = Vec::with_capacity(args.sequences.len() + sequences.explicit.len());
    for arg in &args.sequences {
        let mut seq = arg.parse::<SequenceRef>().map_err(|e| anyhow::anyhow!(e))?;
        if !arg.contains(':') {
            seq.column = sequences.default_column.clone();
        }
        explicit.push(seq);
    }
    explicit.append(&mut sequences.explicit);
    sequences.explicit = explicit;

    let output = match args.output.or(yaml.output) {
        Some(p) if p.as_os_str() == "-" => None,
        Some(p) => Some(p),
        None => Some(PathBuf::from(DEFAULT_OUTPUT)),
    };

    Ok(ConvertConfig {
        input: args.file,
        output,
        dry_run: args.dry_run,
        progress: args.progress && !args.json,
        options: ConvertOptions {
            escapes,
            identifiers,
            filter: TableFilter::new(&tables, &exclude),
            sequences,
            annotate: !args.no_annotate && yaml.annotate.unwrap_or(true),
            transaction: args.transaction || yaml.transaction.unwrap_or(false),
            strict: args.strict,
        },
    })
}

fn split_list(s: &str) -> Vec<String> {
    s.split(',')
        .map(|t| t.trim().to_string())
        .filter(|t| !t.is_empty())
        .collect()
}

fn print_stats(stats: &ConvertStats, dry_run: bool) {
    eprintln!();
    eprintln!("Conversion Statistics:");
    eprintln!("  INSERT statements found: {}", stats.statements_found);
    eprintln!("  Statements converted: {}", stats.statements_converted);
    if stats.statements_passed_through > 0 {
        eprintln!(
            "  Statements passed through: {}",
            stats.statements_passed_through
        );
    }
    eprintln!("  Statements skipped: {}", stats.statements_skipped);
    if stats.statements_filtered > 0 {
        eprintln!("  Statements filtered: {}", stats.statements_filtered);
    }
    eprintln!("  Rows written: {}", stats.rows_written);
    eprintln!(
        "  Lines discarded: {} comments, {} directives, {} definitions",
        stats.lines.comment_lines, stats.lines.directive_lines, stats.lines.definition_lines
    );

    if !stats.tables.is_empty() {
        eprintln!();
        eprintln!("{:<40} {:>12} {:>12}", "Table Name", "INSERTs", "Rows");
        eprintln!("{}", "─".repeat(66));
        for table in &stats.tables {
            eprintln!(
                "{:<40} {:>12} {:>12}",
                table.table, table.statements, table.rows
            );
        }
    }

    if !stats.sequences.is_empty() {
        eprintln!();
        eprintln!("Sequences resynced: {}", stats.sequences.len());
    }

    if !stats.warnings.is_empty() {
        eprintln!();
        eprintln!("Warnings ({}):", stats.warnings_total);
        for warning in &stats.warnings {
            eprintln!("  ⚠ {}", warning);
        }
        if stats.warnings_total > stats.warnings.len() {
            eprintln!(
                "  ... ({} additional warnings truncated)",
                stats.warnings_total - stats.warnings.len()
            );
        }
    }

    if dry_run {
        eprintln!();
        eprintln!("(Dry run - no output written)");
    }
}
