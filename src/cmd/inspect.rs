use crate::analyzer::Analyzer;
use crate::loader::Compression;
use crate::parser::SourceEscapes;
use crate::progress::byte_progress_bar;
use std::path::PathBuf;
use std::time::Instant;

pub fn run(
    file: PathBuf,
    escapes: Option<String>,
    progress: bool,
    json: bool,
) -> anyhow::Result<()> {
    if !file.exists() {
        anyhow::bail!("input file does not exist: {}", file.display());
    }

    let escapes = match escapes {
        Some(e) => e.parse::<SourceEscapes>().map_err(|e| anyhow::anyhow!(e))?,
        None => SourceEscapes::default(),
    };

    let file_size = std::fs::metadata(&file)?.len();
    let file_size_mb = file_size as f64 / (1024.0 * 1024.0);
    let compression = Compression::from_path(&file);

    if !json {
        if compression != Compression::None {
            println!("Detected compression: {}", compression);
        }
        println!(
            "Inspecting MySQL dump: {} ({:.2} MB)",
            file.display(),
            file_size_mb
        );
        println!();
    }

    let start_time = Instant::now();
    let analyzer = Analyzer::new(file).with_escapes(escapes);

    let report = if progress && !json {
        let pb = byte_progress_bar(file_size);
        let pb_clone = pb.clone();
        let report = analyzer.analyze_with_progress(move |bytes| pb_clone.set_position(bytes))?;
        pb.finish_and_clear();
        report
    } else {
        analyzer.analyze()?
    };

    let elapsed = start_time.elapsed();

    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
        return Ok(());
    }

    println!("✓ Inspection completed in {:.3?}\n", elapsed);

    if report.tables.is_empty() {
        println!("No INSERT statements found in dump.");
        return Ok(());
    }

    println!("Found {} tables:\n", report.tables.len());
    println!(
        "{:<40} {:>12} {:>12} {:>12}",
        "Table Name", "INSERTs", "Rows", "Size (MB)"
    );
    println!("{}", "─".repeat(80));

    let mut total_bytes: u64 = 0;
    for stat in &report.tables {
        let name = truncate_string(&stat.table_name, 40);
        println!(
            "{:<40} {:>12} {:>12} {:>12.2}",
            name,
            stat.statement_count,
            stat.row_count,
            stat.total_bytes as f64 / (1024.0 * 1024.0)
        );
        total_bytes += stat.total_bytes;
    }

    println!("{}", "─".repeat(80));
    println!(
        "{:<40} {:>12} {:>12} {:>12.2}",
        "TOTAL",
        report.total_statements(),
        report.total_rows(),
        total_bytes as f64 / (1024.0 * 1024.0)
    );

    let malformed: u64 = report.tables.iter().map(|t| t.malformed_count).sum();
    if malformed > 0 {
        println!("\n⚠ {} malformed INSERT statements", malformed);
    }
    if !report.invalid_encoding_lines.is_empty() {
        println!(
            "⚠ Invalid UTF-8 on {} lines (first at line {})",
            report.invalid_encoding_lines.len(),
            report.invalid_encoding_lines[0]
        );
    }

    Ok(())
}

fn truncate_string(s: &str, max_len: usize) -> String {
    if s.chars().count() <= max_len {
        s.to_string()
    } else {
        let truncated: String = s.chars().take(max_len - 3).collect();
        format!("{}...", truncated)
    }
}
