//! Sequence resynchronization after a bulk load.
//!
//! Inserting explicit primary keys leaves serial sequences behind; each
//! [`SequenceRef`] becomes one `setval` statement in the migration footer.

use crate::convert::escape::quote_literal;
use crate::parser::IdentifierMode;
use ahash::AHashSet;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::Serialize;

pub const DEFAULT_PK_COLUMN: &str = "id";

static SEQUENCE_ARG_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^([A-Za-z0-9_$.]+)(?::([A-Za-z0-9_$]+))?$").unwrap());

/// A (table, primary key column) pair to resync
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SequenceRef {
    pub table: String,
    pub column: String,
}

impl SequenceRef {
    pub fn new(table: impl Into<String>, column: impl Into<String>) -> Self {
        Self {
            table: table.into(),
            column: column.into(),
        }
    }

    /// `SELECT setval(pg_get_serial_sequence('t', 'id'), COALESCE(MAX(id), 1)) FROM t;`
    pub fn resync_sql(&self, identifiers: IdentifierMode) -> String {
        let table = identifiers.quote(&self.table);
        let column = identifiers.quote(&self.column);
        format!(
            "SELECT setval(pg_get_serial_sequence({}, {}), COALESCE(MAX({}), 1)) FROM {};",
            quote_literal(&table),
            quote_literal(&self.column),
            column,
            table
        )
    }
}

impl std::str::FromStr for SequenceRef {
    type Err = String;

    /// Parses `table` or `table:column`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let caps = SEQUENCE_ARG_RE.captures(s.trim()).ok_or_else(|| {
            format!(
                "Invalid sequence '{}'. Expected TABLE or TABLE:COLUMN",
                s
            )
        })?;
        let column = caps
            .get(2)
            .map_or(DEFAULT_PK_COLUMN, |m| m.as_str());
        Ok(SequenceRef::new(&caps[1], column))
    }
}

/// Which sequences to resync at the end of the script
#[derive(Debug, Clone)]
pub struct SequencePlan {
    /// Configured refs, always emitted, in order
    pub explicit: Vec<SequenceRef>,
    /// Also resync every table that received rows
    pub derive: bool,
    /// Key column assumed for derived tables
    pub default_column: String,
}

impl Default for SequencePlan {
    fn default() -> Self {
        Self {
            explicit: Vec::new(),
            derive: true,
            default_column: DEFAULT_PK_COLUMN.to_string(),
        }
    }
}

impl SequencePlan {
    /// Whether a derived resync is safe for a table whose INSERTs named
    /// `columns` (None: positional inserts, all columns present).
    pub fn covers(&self, columns: Option<&[String]>) -> bool {
        columns.map_or(true, |cols| {
            cols.iter()
                .any(|c| c.eq_ignore_ascii_case(&self.default_column))
        })
    }

    /// Explicit refs first, then observed tables in first-seen order.
    /// Each table appears once; matching is case-insensitive. Observed
    /// tables whose column lists lack the key column are left out.
    pub fn resolve<'a>(
        &self,
        observed: impl IntoIterator<Item = (&'a str, Option<&'a [String]>)>,
    ) -> Vec<SequenceRef> {
        let mut seen = AHashSet::new();
        let mut out = Vec::new();

        for seq in &self.explicit {
            if seen.insert(seq.table.to_lowercase()) {
                out.push(seq.clone());
            }
        }

        if self.derive {
            for (table, columns) in observed {
                if table.is_empty() || !self.covers(columns) {
                    continue;
                }
                if seen.insert(table.to_lowercase()) {
                    out.push(SequenceRef::new(table, self.default_column.as_str()));
                }
            }
        }

        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resync_sql_strip() {
        let seq = SequenceRef::new("users", "id");
        assert_eq!(
            seq.resync_sql(IdentifierMode::Strip),
            "SELECT setval(pg_get_serial_sequence('users', 'id'), COALESCE(MAX(id), 1)) FROM users;"
        );
    }

    #[test]
    fn test_resync_sql_quote() {
        let seq = SequenceRef::new("Order", "id");
        assert_eq!(
            seq.resync_sql(IdentifierMode::Quote),
            "SELECT setval(pg_get_serial_sequence('\"Order\"', 'id'), COALESCE(MAX(\"id\"), 1)) FROM \"Order\";"
        );
    }

    #[test]
    fn test_parse_sequence_arg() {
        assert_eq!(
            "users".parse::<SequenceRef>().unwrap(),
            SequenceRef::new("users", "id")
        );
        assert_eq!(
            "files:file_id".parse::<SequenceRef>().unwrap(),
            SequenceRef::new("files", "file_id")
        );
        assert!("bad name".parse::<SequenceRef>().is_err());
        assert!("t:".parse::<SequenceRef>().is_err());
    }

    #[test]
    fn test_resolve_explicit_then_observed_dedup() {
        let plan = SequencePlan {
            explicit: vec![SequenceRef::new("users", "user_id")],
            ..Default::default()
        };
        let seqs = plan.resolve(
            ["files", "USERS", "files", "events"]
                .into_iter()
                .map(|t| (t, None)),
        );
        let tables: Vec<&str> = seqs.iter().map(|s| s.table.as_str()).collect();
        assert_eq!(tables, vec!["users", "files", "events"]);
        assert_eq!(seqs[0].column, "user_id");
        assert_eq!(seqs[1].column, "id");
    }

    #[test]
    fn test_resolve_without_derivation() {
        let plan = SequencePlan {
            explicit: vec![SequenceRef::new("users", "id")],
            derive: false,
            ..Default::default()
        };
        assert_eq!(plan.resolve([("files", None)]).len(), 1);
    }

    #[test]
    fn test_resolve_skips_tables_without_key_column() {
        let plan = SequencePlan::default();
        let join = vec!["event_id".to_string(), "user_id".to_string()];
        let users = vec!["ID".to_string(), "name".to_string()];
        let seqs = plan.resolve([
            ("event_attendees", Some(join.as_slice())),
            ("users", Some(users.as_slice())),
            ("files", None),
        ]);
        let tables: Vec<&str> = seqs.iter().map(|s| s.table.as_str()).collect();
        assert_eq!(tables, vec!["users", "files"]);
        assert!(!plan.covers(Some(join.as_slice())));
        assert!(plan.covers(None));
    }
}
