use crate::loader::{open_dump, DumpLines};
use crate::parser::{SegmentStats, Segmenter, SourceEscapes, ValuesClause};
use ahash::AHashMap;
use serde::Serialize;
use std::io::BufRead;
use std::path::PathBuf;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct TableStats {
    pub table_name: String,
    pub statement_count: u64,
    pub row_count: u64,
    pub total_bytes: u64,
    /// Statements that were incomplete or whose VALUES clause did not split
    pub malformed_count: u64,
}

impl TableStats {
    fn new(table_name: String) -> Self {
        Self {
            table_name,
            ..Default::default()
        }
    }
}

/// Per-table INSERT statistics plus the segmenter's line counters
#[derive(Debug, Clone, Default, Serialize)]
pub struct InspectReport {
    /// Sorted by row count, largest first
    pub tables: Vec<TableStats>,
    pub segments: SegmentStats,
    pub invalid_encoding_lines: Vec<usize>,
}

impl InspectReport {
    pub fn total_rows(&self) -> u64 {
        self.tables.iter().map(|t| t.row_count).sum()
    }

    pub fn total_statements(&self) -> u64 {
        self.tables.iter().map(|t| t.statement_count).sum()
    }
}

pub struct Analyzer {
    input_file: PathBuf,
    escapes: SourceEscapes,
}

impl Analyzer {
    pub fn new(input_file: PathBuf) -> Self {
        Self {
            input_file,
            escapes: SourceEscapes::default(),
        }
    }

    pub fn with_escapes(mut self, escapes: SourceEscapes) -> Self {
        self.escapes = escapes;
        self
    }

    pub fn analyze(self) -> anyhow::Result<InspectReport> {
        let lines = open_dump(&self.input_file, None)?;
        analyze_lines(lines, self.escapes)
    }

    pub fn analyze_with_progress<F: Fn(u64) + 'static>(
        self,
        progress_fn: F,
    ) -> anyhow::Result<InspectReport> {
        let lines = open_dump(&self.input_file, Some(Box::new(progress_fn)))?;
        analyze_lines(lines, self.escapes)
    }
}

/// Count statements and rows per table without converting anything.
pub fn analyze_lines<R: BufRead>(
    lines: DumpLines<R>,
    escapes: SourceEscapes,
) -> anyhow::Result<InspectReport> {
    let mut segmenter = Segmenter::new(lines).with_escapes(escapes);
    let mut stats: AHashMap<String, TableStats> = AHashMap::new();

    while let Some(stmt) = segmenter.read_statement()? {
        let entry = stats
            .entry(stmt.table.clone())
            .or_insert_with(|| TableStats::new(stmt.table.clone()));

        entry.statement_count += 1;
        entry.total_bytes += stmt.text.len() as u64;

        if !stmt.complete {
            entry.malformed_count += 1;
            continue;
        }
        match ValuesClause::split(&stmt.text, escapes) {
            Ok(clause) => entry.row_count += clause.row_count() as u64,
            Err(_) => entry.malformed_count += 1,
        }
    }

    let mut tables: Vec<TableStats> = stats.into_values().collect();
    tables.sort_by(|a, b| {
        b.row_count
            .cmp(&a.row_count)
            .then_with(|| a.table_name.cmp(&b.table_name))
    });

    Ok(InspectReport {
        tables,
        segments: segmenter.stats().clone(),
        invalid_encoding_lines: segmenter.lossy_lines().to_vec(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_analyzer_basic() {
        let temp_dir = TempDir::new().unwrap();
        let input_file = temp_dir.path().join("input.sql");
        std::fs::write(
            &input_file,
            "CREATE TABLE users (id INT);\n\
             INSERT INTO users VALUES (1),(2),(3);\n\
             INSERT INTO posts VALUES (1, 'a); b');\n\
             INSERT INTO users VALUES (4);\n",
        )
        .unwrap();

        let report = Analyzer::new(input_file).analyze().unwrap();
        assert_eq!(report.tables.len(), 2);
        assert_eq!(report.tables[0].table_name, "users");
        assert_eq!(report.tables[0].statement_count, 2);
        assert_eq!(report.tables[0].row_count, 4);
        assert_eq!(report.tables[1].row_count, 1);
        assert_eq!(report.total_rows(), 5);
        assert_eq!(report.segments.definition_lines, 1);
    }

    #[test]
    fn test_malformed_counted() {
        let dump = "INSERT INTO t VALUES (1);\nINSERT INTO t VALUES (2, 'open";
        let report =
            analyze_lines(DumpLines::new(dump.as_bytes()), SourceEscapes::Backslash).unwrap();
        assert_eq!(report.tables[0].statement_count, 2);
        assert_eq!(report.tables[0].row_count, 1);
        assert_eq!(report.tables[0].malformed_count, 1);
    }
}
