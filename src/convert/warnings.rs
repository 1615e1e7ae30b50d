//! Warning system for the converter.
//!
//! Tracks recoverable problems found while converting. Each variant names
//! the table or input line it concerns.

use serde::Serialize;

/// Recoverable issue found during conversion
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum MigrateWarning {
    /// Statement ended without a terminator or with unbalanced parentheses
    MalformedStatement {
        table: String,
        line: usize,
        preview: String,
    },
    /// A tuple or VALUES clause was passed through untouched
    EscapeFailed {
        table: String,
        line: usize,
        reason: String,
    },
    /// Input line contained bytes that are not valid UTF-8
    InvalidEncoding { line: usize },
    /// MySQL-only syntax that was rewritten or dropped
    UnsupportedFeature {
        feature: String,
        suggestion: Option<String>,
    },
    /// Table's INSERTs never name the key column, so no resync is derived
    SequenceSkipped { table: String, column: String },
}

impl std::fmt::Display for MigrateWarning {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            MigrateWarning::MalformedStatement {
                table,
                line,
                preview,
            } => {
                write!(
                    f,
                    "Malformed INSERT for table '{}' at line {}: {}",
                    table, line, preview
                )
            }
            MigrateWarning::EscapeFailed {
                table,
                line,
                reason,
            } => {
                write!(
                    f,
                    "Could not re-escape INSERT for table '{}' at line {}: {} (passed through unchanged)",
                    table, line, reason
                )
            }
            MigrateWarning::InvalidEncoding { line } => {
                write!(f, "Invalid UTF-8 at line {} (replaced with U+FFFD)", line)
            }
            MigrateWarning::UnsupportedFeature {
                feature,
                suggestion,
            } => {
                write!(f, "Unsupported feature: {}", feature)?;
                if let Some(s) = suggestion {
                    write!(f, " ({})", s)?;
                }
                Ok(())
            }
            MigrateWarning::SequenceSkipped { table, column } => {
                write!(
                    f,
                    "No sequence resync for table '{}': its INSERTs never name column '{}' (use --sequence {}:COLUMN)",
                    table, column, table
                )
            }
        }
    }
}

impl std::error::Error for MigrateWarning {}

/// Collects warnings during conversion
#[derive(Debug, Default)]
pub struct WarningCollector {
    warnings: Vec<MigrateWarning>,
    max_warnings: usize,
    total: usize,
}

impl WarningCollector {
    pub fn new() -> Self {
        Self::with_limit(100)
    }

    pub fn with_limit(limit: usize) -> Self {
        Self {
            warnings: Vec::new(),
            max_warnings: limit,
            total: 0,
        }
    }

    /// Add a warning
    pub fn add(&mut self, warning: MigrateWarning) {
        if self.warnings.iter().any(|w| Self::is_similar(w, &warning)) {
            return;
        }
        self.total += 1;
        if self.warnings.len() < self.max_warnings {
            self.warnings.push(warning);
        }
    }

    /// Feature warnings repeat once per statement; keep the first
    fn is_similar(a: &MigrateWarning, b: &MigrateWarning) -> bool {
        match (a, b) {
            (
                MigrateWarning::UnsupportedFeature { feature: f1, .. },
                MigrateWarning::UnsupportedFeature { feature: f2, .. },
            ) => f1 == f2,
            _ => false,
        }
    }

    pub fn warnings(&self) -> &[MigrateWarning] {
        &self.warnings
    }

    /// Distinct warnings kept
    pub fn count(&self) -> usize {
        self.warnings.len()
    }

    /// Distinct warnings seen, including those past the limit
    pub fn total(&self) -> usize {
        self.total
    }

    pub fn into_warnings(self) -> Vec<MigrateWarning> {
        self.warnings
    }
}
