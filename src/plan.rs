//! Desired-index plan: which global secondary indexes should exist where.
//!
//! The plan is a JSON document grouping index definitions by table:
//!
//! ```json
//! {
//!   "tables": {
//!     "bookings": [
//!       {
//!         "index_name": "status-index",
//!         "partition_key": { "name": "status", "type": "S" },
//!         "sort_key": { "name": "created_at", "type": "N" },
//!         "projection": { "type": "ALL" }
//!       }
//!     ]
//!   }
//! }
//! ```
//!
//! Specs are immutable once loaded; the run never rewrites the plan.

use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::errors::Error;

/// DynamoDB key attribute types.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ScalarType {
    S,
    N,
    B,
}

/// A named key attribute with its scalar type.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeyAttribute {
    pub name: String,
    #[serde(rename = "type")]
    pub attr_type: ScalarType,
}

impl KeyAttribute {
    pub fn new(name: impl Into<String>, attr_type: ScalarType) -> Self {
        KeyAttribute {
            name: name.into(),
            attr_type,
        }
    }
}

/// Which attributes the index copies from the base table.
///
/// Uses the provider's own projection-type names on the wire.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Projection {
    All,
    KeysOnly,
    Include { non_key_attributes: Vec<String> },
}

/// Desired end state for one secondary index. Immutable configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexSpec {
    pub table: String,
    pub index_name: String,
    pub partition_key: KeyAttribute,
    #[serde(default)]
    pub sort_key: Option<KeyAttribute>,
    pub projection: Projection,
}

impl IndexSpec {
    /// The attribute definitions this index requires on the table.
    pub fn key_attributes(&self) -> Vec<KeyAttribute> {
        let mut attrs = vec![self.partition_key.clone()];
        if let Some(sort) = &self.sort_key {
            attrs.push(sort.clone());
        }
        attrs
    }
}

// ========== PLAN FILE ==========

/// One index entry as written in the plan file (table name comes from the
/// surrounding map key).
#[derive(Debug, Clone, Deserialize)]
struct PlanEntry {
    index_name: String,
    partition_key: KeyAttribute,
    #[serde(default)]
    sort_key: Option<KeyAttribute>,
    projection: Projection,
}

#[derive(Debug, Clone, Deserialize)]
struct PlanFile {
    tables: BTreeMap<String, Vec<PlanEntry>>,
}

/// The validated set of indexes a run should provision.
#[derive(Debug, Clone)]
pub struct Plan {
    indexes: Vec<IndexSpec>,
}

impl Plan {
    /// Load and validate a plan from a JSON file.
    pub fn from_file(path: &Path) -> Result<Plan, Error> {
        let raw = std::fs::read_to_string(path)
            .map_err(|e| Error::Plan(format!("cannot read {}: {}", path.display(), e)))?;
        Plan::from_json(&raw)
    }

    /// Parse and validate a plan from JSON text.
    pub fn from_json(raw: &str) -> Result<Plan, Error> {
        let file: PlanFile =
            serde_json::from_str(raw).map_err(|e| Error::Plan(e.to_string()))?;

        let mut indexes = Vec::new();
        let mut seen: BTreeSet<(String, String)> = BTreeSet::new();
        for (table, entries) in file.tables {
            if table.trim().is_empty() {
                return Err(Error::Plan("empty table name".to_string()));
            }
            for entry in entries {
                if entry.index_name.trim().is_empty() {
                    return Err(Error::Plan(format!("empty index name on table '{table}'")));
                }
                if entry.partition_key.name.trim().is_empty() {
                    return Err(Error::Plan(format!(
                        "empty partition key name for '{}' on table '{}'",
                        entry.index_name, table
                    )));
                }
                if let Some(sort) = &entry.sort_key {
                    if sort.name == entry.partition_key.name {
                        return Err(Error::Plan(format!(
                            "index '{}' on table '{}' uses '{}' as both partition and sort key",
                            entry.index_name, table, sort.name
                        )));
                    }
                }
                if let Projection::Include { non_key_attributes } = &entry.projection {
                    if non_key_attributes.is_empty() {
                        return Err(Error::Plan(format!(
                            "index '{}' on table '{}' has an INCLUDE projection with no attributes",
                            entry.index_name, table
                        )));
                    }
                }
                if !seen.insert((table.clone(), entry.index_name.clone())) {
                    return Err(Error::Plan(format!(
                        "duplicate index '{}' on table '{}'",
                        entry.index_name, table
                    )));
                }
                indexes.push(IndexSpec {
                    table: table.clone(),
                    index_name: entry.index_name,
                    partition_key: entry.partition_key,
                    sort_key: entry.sort_key,
                    projection: entry.projection,
                });
            }
        }
        Ok(Plan { indexes })
    }

    pub fn indexes(&self) -> &[IndexSpec] {
        &self.indexes
    }

    /// Specs grouped by owning table, preserving per-table plan order.
    pub fn by_table(&self) -> BTreeMap<&str, Vec<&IndexSpec>> {
        let mut grouped: BTreeMap<&str, Vec<&IndexSpec>> = BTreeMap::new();
        for spec in &self.indexes {
            grouped.entry(spec.table.as_str()).or_default().push(spec);
        }
        grouped
    }

    pub fn len(&self) -> usize {
        self.indexes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.indexes.is_empty()
    }
}
