//! Provenance audit records.
//!
//! Provenance is append-only: records are never mutated after creation,
//! and only the most recent record per memory is surfaced to consumers.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Operation recorded in a provenance entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Operation {
    Create,
    Update,
    Delete,
    Access,
    Restore,
}

impl Operation {
    /// Stable string form used in the database.
    pub fn as_str(&self) -> &'static str {
        match self {
            Operation::Create => "create",
            Operation::Update => "update",
            Operation::Delete => "delete",
            Operation::Access => "access",
            Operation::Restore => "restore",
        }
    }

    /// Parse the database string form.
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "create" => Some(Operation::Create),
            "update" => Some(Operation::Update),
            "delete" => Some(Operation::Delete),
            "access" => Some(Operation::Access),
            "restore" => Some(Operation::Restore),
            _ => None,
        }
    }
}

impl std::fmt::Display for Operation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One append-only audit record for a memory operation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Provenance {
    /// Memory this record belongs to
    pub memory_id: String,

    /// Operation performed
    pub operation: Operation,

    /// When the operation happened (epoch ms)
    pub timestamp: i64,

    /// Where the operation originated (cli, import, api, ...)
    pub source: Option<String>,

    /// Free-form context (e.g. update reason)
    pub context: Option<String>,

    /// Acting user, when known
    pub user_id: Option<String>,

    /// Structured description of what changed
    pub changes: Option<Value>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_operation_roundtrip() {
        for op in [
            Operation::Create,
            Operation::Update,
            Operation::Delete,
            Operation::Access,
            Operation::Restore,
        ] {
            assert_eq!(Operation::parse(op.as_str()), Some(op));
        }
        assert_eq!(Operation::parse("upsert"), None);
    }

    #[test]
    fn test_operation_serializes_snake_case() {
        let json = serde_json::to_string(&Operation::Access).unwrap();
        assert_eq!(json, "\"access\"");
    }
}
