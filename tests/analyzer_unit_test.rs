//! Unit tests for the inspect analyzer.

use dump_gen::{DumpConfig, DumpGenerator};
use mysql2pg::analyzer::{analyze_lines, Analyzer};
use mysql2pg::loader::DumpLines;
use mysql2pg::parser::SourceEscapes;
use tempfile::TempDir;

#[test]
fn test_analyzer_counts_rows_per_table() {
    let temp_dir = TempDir::new().unwrap();
    let input_file = temp_dir.path().join("input.sql");

    std::fs::write(
        &input_file,
        b"CREATE TABLE users (id INT);\nINSERT INTO users VALUES (1),(2);\nINSERT INTO users VALUES (3);\nCREATE TABLE posts (id INT);\nINSERT INTO posts VALUES (1, 'a),(b');",
    )
    .unwrap();

    let report = Analyzer::new(input_file).analyze().unwrap();
    assert_eq!(report.tables.len(), 2);

    let users = report.tables.iter().find(|s| s.table_name == "users").unwrap();
    assert_eq!(users.statement_count, 2);
    assert_eq!(users.row_count, 3);

    let posts = report.tables.iter().find(|s| s.table_name == "posts").unwrap();
    assert_eq!(posts.statement_count, 1);
    assert_eq!(posts.row_count, 1);
    assert!(report.segments.definition_lines >= 2);
}

#[test]
fn test_analyzer_matches_generated_dump() {
    let (sql, summary) = DumpGenerator::new(DumpConfig {
        tables: 5,
        rows_per_table: 17,
        batch_size: 5,
        ..Default::default()
    })
    .generate_string();

    let report = analyze_lines(DumpLines::new(sql.as_bytes()), SourceEscapes::Backslash).unwrap();
    assert_eq!(report.total_rows() as usize, summary.total_rows());
    assert_eq!(report.total_statements() as usize, summary.total_statements());
    assert!(report.tables.iter().all(|t| t.malformed_count == 0));
}

#[test]
fn test_analyzer_missing_file() {
    let temp_dir = TempDir::new().unwrap();
    let result = Analyzer::new(temp_dir.path().join("missing.sql")).analyze();
    assert!(result.is_err());
}
