//! YAML configuration for the convert command.
//!
//! Every key is optional; command-line flags take precedence.

use crate::parser::{IdentifierMode, SourceEscapes};
use crate::sequence::{SequencePlan, SequenceRef, DEFAULT_PK_COLUMN};
use anyhow::Context;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

/// A configured sequence: `users` or `{ table: users, column: user_id }`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum SequenceEntry {
    Name(String),
    Full {
        table: String,
        #[serde(default)]
        column: Option<String>,
    },
}

impl SequenceEntry {
    pub fn to_ref(&self, default_column: &str) -> SequenceRef {
        match self {
            SequenceEntry::Name(table) => SequenceRef::new(table.as_str(), default_column),
            SequenceEntry::Full { table, column } => SequenceRef::new(
                table.as_str(),
                column.as_deref().unwrap_or(default_column),
            ),
        }
    }
}

/// `sequences:` section
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SequenceConfig {
    /// Resync every table that received rows
    pub derive: bool,
    /// Primary key column for tables without an explicit entry
    pub column: String,
    pub tables: Vec<SequenceEntry>,
}

impl Default for SequenceConfig {
    fn default() -> Self {
        Self {
            derive: true,
            column: DEFAULT_PK_COLUMN.to_string(),
            tables: Vec::new(),
        }
    }
}

impl SequenceConfig {
    pub fn to_plan(&self) -> SequencePlan {
        SequencePlan {
            explicit: self.tables.iter().map(|e| e.to_ref(&self.column)).collect(),
            derive: self.derive,
            default_column: self.column.clone(),
        }
    }
}

/// Complete YAML configuration for the convert command
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct MigrationYamlConfig {
    pub output: Option<PathBuf>,
    pub escapes: Option<SourceEscapes>,
    pub identifiers: Option<IdentifierMode>,
    /// Include list; empty means all tables
    pub tables: Vec<String>,
    pub exclude: Vec<String>,
    pub annotate: Option<bool>,
    pub transaction: Option<bool>,
    pub sequences: SequenceConfig,
}

impl MigrationYamlConfig {
    /// Load configuration from a YAML file
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("failed to read config file {}", path.display()))?;
        Self::parse(&content)
            .with_context(|| format!("invalid config file {}", path.display()))
    }

    pub fn parse(yaml: &str) -> anyhow::Result<Self> {
        Ok(serde_yaml_ng::from_str(yaml)?)
    }
}
