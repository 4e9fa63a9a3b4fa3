//! Shared in-memory control plane for the integration tests.
//!
//! Models just enough of DynamoDB for the provisioning flow: tables with
//! attribute definitions and indexes, CREATING-to-ACTIVE transitions after a
//! configurable number of describe polls, scripted per-call failures, and a
//! log of every create submission.

#![allow(dead_code)]

use std::collections::{BTreeMap, VecDeque};
use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;

use dynogsi::{
    CapacitySource, ControlPlane, IndexBuildStatus, IndexProbe, IndexSnapshot, IndexSpec,
    KeyAttribute, Plan, Projection, ProviderError, ScalarType, SharedState, StateStore,
    TableSnapshot,
};

/// One create_index submission as the fake saw it.
#[derive(Debug, Clone)]
pub struct CreateCall {
    pub table: String,
    pub index: String,
    pub definitions: Vec<KeyAttribute>,
}

#[derive(Debug, Clone)]
struct FakeIndex {
    status: IndexBuildStatus,
    remaining_build_polls: u32,
}

#[derive(Debug, Clone, Default)]
struct FakeTable {
    attribute_definitions: Vec<KeyAttribute>,
    indexes: BTreeMap<String, FakeIndex>,
}

#[derive(Default)]
struct Inner {
    tables: BTreeMap<String, FakeTable>,
    create_failures: BTreeMap<(String, String), VecDeque<ProviderError>>,
    describe_failures: BTreeMap<String, VecDeque<ProviderError>>,
    probe_results: BTreeMap<(String, String), VecDeque<Result<IndexProbe, ProviderError>>>,
    create_calls: Vec<CreateCall>,
    build_polls: u32,
    create_barrier: Option<Arc<tokio::sync::Barrier>>,
}

#[derive(Default)]
pub struct FakeControlPlane {
    inner: Mutex<Inner>,
}

impl FakeControlPlane {
    /// A fake with the named tables, each declaring an `id` string key.
    pub fn with_tables(names: &[&str]) -> Arc<FakeControlPlane> {
        let fake = FakeControlPlane::default();
        {
            let mut inner = fake.inner.lock().unwrap();
            for name in names {
                inner.tables.insert(
                    (*name).to_string(),
                    FakeTable {
                        attribute_definitions: vec![KeyAttribute::new("id", ScalarType::S)],
                        indexes: BTreeMap::new(),
                    },
                );
            }
        }
        Arc::new(fake)
    }

    /// Require `polls` CREATING describes before a new index turns ACTIVE.
    pub fn set_build_polls(&self, polls: u32) {
        self.inner.lock().unwrap().build_polls = polls;
    }

    /// Every successful create_index call rendezvouses here before returning.
    pub fn set_create_barrier(&self, barrier: Arc<tokio::sync::Barrier>) {
        self.inner.lock().unwrap().create_barrier = Some(barrier);
    }

    /// Place an index on a table directly, as if created out of band. A
    /// CREATING index takes the configured number of polls to turn ACTIVE.
    pub fn put_index(&self, table: &str, index: &str, status: IndexBuildStatus) {
        let mut inner = self.inner.lock().unwrap();
        let remaining = if status == IndexBuildStatus::Creating {
            inner.build_polls
        } else {
            0
        };
        inner.tables.entry(table.to_string()).or_default().indexes.insert(
            index.to_string(),
            FakeIndex {
                status,
                remaining_build_polls: remaining,
            },
        );
    }

    /// The next create_index for (table, index) fails with `err`. Queue
    /// multiple times for consecutive failures.
    pub fn fail_create(&self, table: &str, index: &str, err: ProviderError) {
        self.inner
            .lock()
            .unwrap()
            .create_failures
            .entry((table.to_string(), index.to_string()))
            .or_default()
            .push_back(err);
    }

    /// The next describe_table for `table` fails with `err`.
    pub fn fail_describe(&self, table: &str, err: ProviderError) {
        self.inner
            .lock()
            .unwrap()
            .describe_failures
            .entry(table.to_string())
            .or_default()
            .push_back(err);
    }

    /// The next probe_index for (table, index) returns `result`. Unqueued
    /// probes report index-attributed capacity.
    pub fn queue_probe(&self, table: &str, index: &str, result: Result<IndexProbe, ProviderError>) {
        self.inner
            .lock()
            .unwrap()
            .probe_results
            .entry((table.to_string(), index.to_string()))
            .or_default()
            .push_back(result);
    }

    pub fn create_calls(&self) -> Vec<CreateCall> {
        self.inner.lock().unwrap().create_calls.clone()
    }

    pub fn create_count(&self, table: &str, index: &str) -> usize {
        self.inner
            .lock()
            .unwrap()
            .create_calls
            .iter()
            .filter(|c| c.table == table && c.index == index)
            .count()
    }

    pub fn index_status(&self, table: &str, index: &str) -> Option<IndexBuildStatus> {
        self.inner
            .lock()
            .unwrap()
            .tables
            .get(table)
            .and_then(|t| t.indexes.get(index))
            .map(|ix| ix.status)
    }
}

#[async_trait]
impl ControlPlane for FakeControlPlane {
    async fn describe_table(&self, table: &str) -> Result<TableSnapshot, ProviderError> {
        let mut inner = self.inner.lock().unwrap();
        if let Some(queue) = inner.describe_failures.get_mut(table) {
            if let Some(err) = queue.pop_front() {
                return Err(err);
            }
        }
        let Some(entry) = inner.tables.get_mut(table) else {
            return Err(ProviderError::service(
                "ResourceNotFoundException",
                format!("Requested resource not found: Table: {table}"),
            ));
        };

        let mut indexes = Vec::new();
        for (name, ix) in entry.indexes.iter_mut() {
            if ix.status == IndexBuildStatus::Creating {
                if ix.remaining_build_polls == 0 {
                    ix.status = IndexBuildStatus::Active;
                } else {
                    ix.remaining_build_polls -= 1;
                }
            }
            indexes.push(IndexSnapshot {
                index_name: name.clone(),
                status: ix.status,
            });
        }
        Ok(TableSnapshot {
            table_status: "ACTIVE".to_string(),
            attribute_definitions: entry.attribute_definitions.clone(),
            indexes,
        })
    }

    async fn create_index(
        &self,
        table: &str,
        spec: &IndexSpec,
        attribute_definitions: &[KeyAttribute],
    ) -> Result<(), ProviderError> {
        let barrier = {
            let mut inner = self.inner.lock().unwrap();
            inner.create_calls.push(CreateCall {
                table: table.to_string(),
                index: spec.index_name.clone(),
                definitions: attribute_definitions.to_vec(),
            });
            if let Some(queue) = inner
                .create_failures
                .get_mut(&(table.to_string(), spec.index_name.clone()))
            {
                if let Some(err) = queue.pop_front() {
                    return Err(err);
                }
            }
            let polls = inner.build_polls;
            let Some(entry) = inner.tables.get_mut(table) else {
                return Err(ProviderError::service(
                    "ResourceNotFoundException",
                    format!("Requested resource not found: Table: {table}"),
                ));
            };
            if entry.indexes.contains_key(&spec.index_name) {
                return Err(ProviderError::service(
                    "ResourceInUseException",
                    format!("index already exists: {}", spec.index_name),
                ));
            }
            // The provider accepts one online index build per table at a time.
            if entry
                .indexes
                .values()
                .any(|ix| ix.status == IndexBuildStatus::Creating)
            {
                return Err(ProviderError::service(
                    "ResourceInUseException",
                    "Attempt to change a resource which is still in use: Table is being updated",
                ));
            }
            entry.indexes.insert(
                spec.index_name.clone(),
                FakeIndex {
                    status: IndexBuildStatus::Creating,
                    remaining_build_polls: polls,
                },
            );
            // The submitted list becomes the table's declaration set, as
            // UpdateTable's attribute_definitions replaces it wholesale.
            entry.attribute_definitions = attribute_definitions.to_vec();
            inner.create_barrier.clone()
        };
        if let Some(barrier) = barrier {
            barrier.wait().await;
        }
        Ok(())
    }

    async fn probe_index(
        &self,
        table: &str,
        index_name: &str,
        _key: &KeyAttribute,
        _probe_value: &str,
    ) -> Result<IndexProbe, ProviderError> {
        let mut inner = self.inner.lock().unwrap();
        if let Some(queue) = inner
            .probe_results
            .get_mut(&(table.to_string(), index_name.to_string()))
        {
            if let Some(result) = queue.pop_front() {
                return result;
            }
        }
        Ok(IndexProbe {
            item_count: 0,
            capacity: CapacitySource::Index,
        })
    }
}

// ========== FIXTURES ==========

/// A spec with a string partition key and full projection.
pub fn spec(table: &str, index: &str, partition: &str) -> IndexSpec {
    IndexSpec {
        table: table.to_string(),
        index_name: index.to_string(),
        partition_key: KeyAttribute::new(partition, ScalarType::S),
        sort_key: None,
        projection: Projection::All,
    }
}

/// A plan document built from specs, shaped as the CLI would load it.
pub fn plan_from_specs(specs: &[IndexSpec]) -> Plan {
    let mut tables: BTreeMap<String, Vec<serde_json::Value>> = BTreeMap::new();
    for spec in specs {
        tables
            .entry(spec.table.clone())
            .or_default()
            .push(serde_json::to_value(spec).unwrap());
    }
    let doc = serde_json::json!({ "tables": tables });
    Plan::from_json(&doc.to_string()).unwrap()
}

/// Initialized state store backed by a temp directory.
pub fn init_state(dir: &tempfile::TempDir, specs: &[IndexSpec]) -> (PathBuf, SharedState) {
    let path = dir.path().join("state.json");
    let mut store = StateStore::load_or_create(&path, "dynogsi-test").unwrap();
    store.initialize(specs).unwrap();
    (path, SharedState::new(store))
}

pub fn throttling() -> ProviderError {
    ProviderError::service("ThrottlingException", "Rate exceeded for the table")
}

pub fn limit_exceeded() -> ProviderError {
    ProviderError::service(
        "LimitExceededException",
        "Subscriber limit exceeded: Only 1 online index can be created simultaneously per account",
    )
}

pub fn validation_error() -> ProviderError {
    ProviderError::service(
        "ValidationException",
        "One or more parameter values were invalid: Some AttributeDefinitions are not used",
    )
}
