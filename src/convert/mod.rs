//! MySQL dump → PostgreSQL migration conversion.
//!
//! One linear pass over the dump:
//! - segment the input into INSERT statements (everything else is dropped)
//! - apply the table include/exclude filter
//! - re-escape string literals into standard SQL literals
//! - rewrite `INSERT IGNORE` / drop `ON DUPLICATE KEY UPDATE`
//! - emit the script with replication-role boilerplate and sequence resyncs

pub mod escape;
mod warnings;

pub use escape::{reescape_insert, ReescapedInsert, TupleFailure};
pub use warnings::{MigrateWarning, WarningCollector};

use crate::loader::{open_dump, DumpLines};
use crate::parser::{insert_columns, IdentifierMode, SegmentStats, Segmenter, SourceEscapes, Statement};
use crate::progress::byte_progress_bar;
use crate::sequence::{SequencePlan, SequenceRef};
use crate::writer::{MigrationWriter, Output};
use ahash::{AHashMap, AHashSet};
use anyhow::Context;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::Serialize;
use std::borrow::Cow;
use std::io::{BufRead, Write};
use std::path::{Path, PathBuf};

static INSERT_IGNORE_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)^(\s*INSERT)\s+IGNORE(\s+INTO\b)").unwrap());

static ON_DUPLICATE_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?is)^\s*ON\s+DUPLICATE\s+KEY\s+UPDATE\b.*?(;?)\s*$").unwrap());

/// Tuple boundaries, for counting rows of statements that could not be split
static TUPLE_BOUNDARY_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\)\s*,\s*\(").unwrap());

const PREVIEW_CHARS: usize = 80;

/// Table include/exclude lists, compared case-insensitively
#[derive(Debug, Clone, Default)]
pub struct TableFilter {
    include: Option<AHashSet<String>>,
    exclude: AHashSet<String>,
}

impl TableFilter {
    /// An empty include list means every table
    pub fn new<S: AsRef<str>>(include: &[S], exclude: &[S]) -> Self {
        let include = if include.is_empty() {
            None
        } else {
            Some(include.iter().map(|t| t.as_ref().trim().to_lowercase()).collect())
        };
        Self {
            include,
            exclude: exclude
                .iter()
                .map(|t| t.as_ref().trim().to_lowercase())
                .collect(),
        }
    }

    /// Schema-qualified names also match on their bare table name
    pub fn accepts(&self, table: &str) -> bool {
        let table = table.to_lowercase();
        let bare = table.rsplit('.').next().unwrap_or(&table);
        let listed = |set: &AHashSet<String>| set.contains(&table) || set.contains(bare);

        if listed(&self.exclude) {
            return false;
        }
        match &self.include {
            Some(include) => listed(include),
            None => true,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.include.is_none() && self.exclude.is_empty()
    }
}

/// Everything that changes what the converter writes
#[derive(Debug, Clone)]
pub struct ConvertOptions {
    pub escapes: SourceEscapes,
    pub identifiers: IdentifierMode,
    pub filter: TableFilter,
    pub sequences: SequencePlan,
    /// `-- INSERT statement N (table, R rows)` before each statement
    pub annotate: bool,
    /// Wrap the script in BEGIN/COMMIT
    pub transaction: bool,
    /// Abort on the first malformed statement or re-escape failure
    pub strict: bool,
}

impl Default for ConvertOptions {
    fn default() -> Self {
        Self {
            escapes: SourceEscapes::default(),
            identifiers: IdentifierMode::default(),
            filter: TableFilter::default(),
            sequences: SequencePlan::default(),
            annotate: true,
            transaction: false,
            strict: false,
        }
    }
}

/// Configuration for a convert run
#[derive(Debug)]
pub struct ConvertConfig {
    /// Input SQL dump
    pub input: PathBuf,
    /// Output script (None for stdout)
    pub output: Option<PathBuf>,
    /// Dry run mode
    pub dry_run: bool,
    /// Show progress
    pub progress: bool,
    pub options: ConvertOptions,
}

impl Default for ConvertConfig {
    fn default() -> Self {
        Self {
            input: PathBuf::from("dump.sql"),
            output: Some(PathBuf::from("postgres-migration.sql")),
            dry_run: false,
            progress: false,
            options: ConvertOptions::default(),
        }
    }
}

/// Rows and statements written for one table
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct TableRows {
    pub table: String,
    pub statements: u64,
    pub rows: u64,
    /// Columns named by the table's INSERTs; None once any insert is positional
    #[serde(skip)]
    pub columns: Option<Vec<String>>,
}

/// Statistics from a convert run
#[derive(Debug, Default, Serialize)]
pub struct ConvertStats {
    /// INSERT statements found in the dump
    pub statements_found: u64,
    /// Statements written after re-escaping
    pub statements_converted: u64,
    /// Statements written verbatim because their VALUES clause could not be split
    pub statements_passed_through: u64,
    /// Malformed statements dropped
    pub statements_skipped: u64,
    /// Statements removed by the table filter
    pub statements_filtered: u64,
    pub rows_written: u64,
    /// Individual tuples written verbatim
    pub tuples_passed_through: u64,
    /// Per table, in first-seen order
    pub tables: Vec<TableRows>,
    pub sequences: Vec<SequenceRef>,
    pub lines: SegmentStats,
    pub warnings: Vec<MigrateWarning>,
    /// Distinct warnings, including those beyond the reporting limit
    pub warnings_total: usize,
}

impl ConvertStats {
    fn record_table(
        &mut self,
        index: &mut AHashMap<String, usize>,
        converted: &ConvertedStatement,
    ) {
        let table = converted.table.as_str();
        let rows = converted.rows;
        let i = match index.get(table) {
            Some(&i) => {
                let entry = &mut self.tables[i];
                match (&mut entry.columns, &converted.columns) {
                    (Some(known), Some(named)) => {
                        for column in named {
                            if !known.iter().any(|c| c.eq_ignore_ascii_case(column)) {
                                known.push(column.clone());
                            }
                        }
                    }
                    (columns, None) => *columns = None,
                    (None, Some(_)) => {}
                }
                i
            }
            None => {
                self.tables.push(TableRows {
                    table: table.to_string(),
                    columns: converted.columns.clone(),
                    ..Default::default()
                });
                index.insert(table.to_string(), self.tables.len() - 1);
                self.tables.len() - 1
            }
        };
        self.tables[i].statements += 1;
        self.tables[i].rows += rows as u64;
        self.rows_written += rows as u64;
    }
}

/// A statement ready for the writer
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConvertedStatement {
    pub table: String,
    pub sql: String,
    pub rows: usize,
    /// Whole statement written verbatim
    pub passed_through: bool,
    /// Tuples written verbatim inside an otherwise converted statement
    pub fallback_tuples: usize,
    /// Explicit column list of the INSERT, if any
    pub columns: Option<Vec<String>>,
}

/// What happened to one segmented statement
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Disposition {
    Emit(ConvertedStatement),
    /// Excluded by the table filter
    Filtered,
    /// Malformed and dropped
    Skipped,
}

/// Per-statement conversion with warning collection
pub struct Converter {
    options: ConvertOptions,
    warnings: WarningCollector,
}

impl Converter {
    pub fn new(options: ConvertOptions) -> Self {
        Self {
            options,
            warnings: WarningCollector::new(),
        }
    }

    /// Convert a single statement.
    ///
    /// Recoverable problems become warnings; in strict mode the first one is
    /// returned as the error instead.
    pub fn convert_statement(&mut self, stmt: &Statement) -> Result<Disposition, MigrateWarning> {
        if !self.options.filter.accepts(&stmt.table) {
            return Ok(Disposition::Filtered);
        }

        if !stmt.complete {
            self.recover(MigrateWarning::MalformedStatement {
                table: stmt.table.clone(),
                line: stmt.line,
                preview: preview(&stmt.text),
            })?;
            return Ok(Disposition::Skipped);
        }

        match reescape_insert(&stmt.text, self.options.escapes) {
            Ok(reescaped) => self.finish_insert(stmt, reescaped),
            Err(e) => {
                self.recover(MigrateWarning::EscapeFailed {
                    table: stmt.table.clone(),
                    line: stmt.line,
                    reason: e.to_string(),
                })?;
                Ok(Disposition::Emit(ConvertedStatement {
                    table: stmt.table.clone(),
                    sql: stmt.text.clone(),
                    rows: TUPLE_BOUNDARY_RE.find_iter(&stmt.text).count() + 1,
                    passed_through: true,
                    fallback_tuples: 0,
                    columns: insert_columns(&stmt.text),
                }))
            }
        }
    }

    fn finish_insert(
        &mut self,
        stmt: &Statement,
        reescaped: ReescapedInsert<'_>,
    ) -> Result<Disposition, MigrateWarning> {
        for failure in &reescaped.failures {
            self.recover(MigrateWarning::EscapeFailed {
                table: stmt.table.clone(),
                line: stmt.line,
                reason: format!("row {}: {}", failure.index + 1, failure.error),
            })?;
        }

        let ignore = INSERT_IGNORE_RE.is_match(reescaped.head);
        let head = if ignore {
            self.warnings.add(MigrateWarning::UnsupportedFeature {
                feature: "INSERT IGNORE".to_string(),
                suggestion: Some("rewritten as ON CONFLICT DO NOTHING".to_string()),
            });
            INSERT_IGNORE_RE.replace(reescaped.head, "$1$2")
        } else {
            Cow::Borrowed(reescaped.head)
        };

        let mut tail = Cow::Borrowed(reescaped.tail);
        if let Some(caps) = ON_DUPLICATE_RE.captures(reescaped.tail) {
            self.warnings.add(MigrateWarning::UnsupportedFeature {
                feature: "ON DUPLICATE KEY UPDATE".to_string(),
                suggestion: Some("clause dropped; existing rows are not updated".to_string()),
            });
            tail = Cow::Owned(caps[1].to_string());
        }
        if ignore {
            tail = Cow::Owned(format!(" ON CONFLICT DO NOTHING{}", tail.trim_start()));
        }

        let mut sql = String::with_capacity(head.len() + reescaped.body.len() + tail.len());
        sql.push_str(&head);
        sql.push_str(&reescaped.body);
        sql.push_str(&tail);

        Ok(Disposition::Emit(ConvertedStatement {
            table: stmt.table.clone(),
            sql,
            rows: reescaped.rows,
            passed_through: false,
            fallback_tuples: reescaped.failures.len(),
            columns: insert_columns(reescaped.head),
        }))
    }

    /// Lines decoded with replacement characters; never fatal
    pub fn record_invalid_encoding(&mut self, line: usize) {
        self.warnings.add(MigrateWarning::InvalidEncoding { line });
    }

    /// A derived resync left out because the key column was never named
    pub fn record_missing_key_column(&mut self, table: &str, column: &str) {
        self.warnings.add(MigrateWarning::SequenceSkipped {
            table: table.to_string(),
            column: column.to_string(),
        });
    }

    fn recover(&mut self, warning: MigrateWarning) -> Result<(), MigrateWarning> {
        if self.options.strict {
            return Err(warning);
        }
        self.warnings.add(warning);
        Ok(())
    }

    pub fn warnings(&self) -> &[MigrateWarning] {
        self.warnings.warnings()
    }

    pub fn into_warnings(self) -> WarningCollector {
        self.warnings
    }
}

fn preview(text: &str) -> String {
    let first_line = text.lines().next().unwrap_or_default();
    let mut s: String = first_line.chars().take(PREVIEW_CHARS).collect();
    if s.len() < text.len() {
        s.push_str("...");
    }
    s
}

/// Convert a whole dump into `out`.
///
/// Returns the statistics and the writer so the caller decides whether to
/// commit the output.
pub fn convert_stream<R: BufRead, W: Write>(
    lines: DumpLines<R>,
    out: W,
    options: &ConvertOptions,
    source: &Path,
) -> anyhow::Result<(ConvertStats, W)> {
    let mut segmenter = Segmenter::new(lines)
        .with_escapes(options.escapes)
        .with_identifiers(options.identifiers);
    let mut converter = Converter::new(options.clone());
    let mut writer = MigrationWriter::new(out)
        .with_identifiers(options.identifiers)
        .with_annotations(options.annotate)
        .with_transaction(options.transaction);

    let mut stats = ConvertStats::default();
    let mut table_index = AHashMap::new();

    writer
        .write_header(source)
        .context("failed to write migration header")?;

    while let Some(stmt) = segmenter
        .read_statement()
        .with_context(|| format!("failed to read {}", source.display()))?
    {
        stats.statements_found += 1;

        let converted = match converter.convert_statement(&stmt) {
            Ok(Disposition::Emit(converted)) => converted,
            Ok(Disposition::Filtered) => {
                stats.statements_filtered += 1;
                continue;
            }
            Ok(Disposition::Skipped) => {
                stats.statements_skipped += 1;
                continue;
            }
            Err(warning) => {
                return Err(anyhow::Error::new(warning))
                    .context("conversion aborted (--strict)");
            }
        };

        if converted.passed_through {
            stats.statements_passed_through += 1;
        } else {
            stats.statements_converted += 1;
        }
        stats.tuples_passed_through += converted.fallback_tuples as u64;
        stats.record_table(&mut table_index, &converted);

        writer
            .write_statement(&converted.table, converted.rows, &converted.sql)
            .context("failed to write migration statement")?;
    }

    for &line in segmenter.lossy_lines() {
        converter.record_invalid_encoding(line);
    }

    let plan = &options.sequences;
    stats.sequences = plan.resolve(
        stats
            .tables
            .iter()
            .map(|t| (t.table.as_str(), t.columns.as_deref())),
    );
    if plan.derive {
        for table in &stats.tables {
            let listed = stats
                .sequences
                .iter()
                .any(|s| s.table.eq_ignore_ascii_case(&table.table));
            if !listed && !plan.covers(table.columns.as_deref()) {
                converter.record_missing_key_column(&table.table, &plan.default_column);
            }
        }
    }
    writer
        .write_footer(&stats.sequences)
        .context("failed to write migration footer")?;
    let out = writer.finish().context("failed to flush migration output")?;

    stats.lines = segmenter.stats().clone();
    let collector = converter.into_warnings();
    stats.warnings_total = collector.total();
    stats.warnings = collector.into_warnings();

    Ok((stats, out))
}

/// Run the convert command
pub fn run(config: ConvertConfig) -> anyhow::Result<ConvertStats> {
    let progress_bar = if config.progress {
        let total = std::fs::metadata(&config.input)
            .map(|m| m.len())
            .unwrap_or(0);
        Some(byte_progress_bar(total))
    } else {
        None
    };

    let callback: Option<Box<dyn Fn(u64)>> = progress_bar.clone().map(|pb| {
        let cb: Box<dyn Fn(u64)> = Box::new(move |bytes| pb.set_position(bytes));
        cb
    });

    let lines = open_dump(&config.input, callback)?;
    let output = Output::create(config.output.as_deref(), config.dry_run)?;

    let result = convert_stream(lines, output, &config.options, &config.input);
    let (stats, output) = match result {
        Ok(r) => r,
        Err(e) => {
            if let Some(pb) = &progress_bar {
                pb.abandon_with_message("Conversion failed");
            }
            return Err(e);
        }
    };
    output.commit()?;

    if let Some(pb) = progress_bar {
        pb.finish_with_message(format!(
            "Converted {} statements",
            stats.statements_converted + stats.statements_passed_through
        ));
    }

    Ok(stats)
}
