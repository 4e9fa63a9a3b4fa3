//! Batch orchestration across tables.
//!
//! One task per table, because index builds on different tables are
//! independent; a strictly sequential walk inside each table, because the
//! provider allows only one index under construction per table. A single
//! exhausted retry budget never aborts the batch; it fails that one record
//! and shows up in the summary.

use std::collections::BTreeMap;

use serde::Serialize;
use tokio::task::JoinSet;
use tracing::info;

use crate::errors::Error;
use crate::plan::{IndexSpec, Plan};
use crate::provision::{IndexOutcome, Provisioner};
use crate::report::FailureReport;
use crate::state::{SharedState, StateStore};

/// Per-table created/failed/skipped counts.
#[derive(Debug, Clone, Copy, Default, Serialize)]
pub struct TableCounts {
    pub created: usize,
    pub failed: usize,
    pub skipped: usize,
}

/// Aggregate outcome of one batch run.
#[derive(Debug, Default, Serialize)]
pub struct BatchSummary {
    pub created: usize,
    pub failed: usize,
    pub skipped: usize,
    pub tables: BTreeMap<String, TableCounts>,
    pub reports: Vec<FailureReport>,
}

impl BatchSummary {
    /// The run's exit criterion: no record exhausted its budget.
    pub fn success(&self) -> bool {
        self.failed == 0
    }
}

/// Fans the provisioner out across tables and aggregates the results.
pub struct Orchestrator {
    provisioner: Provisioner,
    state: SharedState,
}

impl Orchestrator {
    pub fn new(provisioner: Provisioner, state: SharedState) -> Self {
        Orchestrator { provisioner, state }
    }

    /// Run the whole plan to completion and report counts.
    ///
    /// Already-`active` records are skipped before any provider call, which
    /// is what makes re-running against a partially completed state file
    /// safe.
    pub async fn run(&self, plan: &Plan) -> Result<BatchSummary, Error> {
        let mut tasks: JoinSet<Result<(String, TableCounts, Vec<FailureReport>), Error>> =
            JoinSet::new();

        for (table, specs) in plan.by_table() {
            let provisioner = self.provisioner.clone();
            let state = self.state.clone();
            let table = table.to_string();
            let specs: Vec<IndexSpec> = specs.into_iter().cloned().collect();
            tasks.spawn(async move {
                let (counts, reports) = run_table(&provisioner, &state, &specs).await?;
                Ok((table, counts, reports))
            });
        }

        let mut summary = BatchSummary::default();
        while let Some(joined) = tasks.join_next().await {
            let (table, counts, reports) = joined.map_err(|e| Error::Task(e.to_string()))??;
            summary.created += counts.created;
            summary.failed += counts.failed;
            summary.skipped += counts.skipped;
            summary.tables.insert(table, counts);
            summary.reports.extend(reports);
        }
        info!(
            created = summary.created,
            failed = summary.failed,
            skipped = summary.skipped,
            "batch run finished"
        );
        Ok(summary)
    }
}

/// Walk one table's index list in plan order, one at a time.
async fn run_table(
    provisioner: &Provisioner,
    state: &SharedState,
    specs: &[IndexSpec],
) -> Result<(TableCounts, Vec<FailureReport>), Error> {
    let mut counts = TableCounts::default();
    let mut reports = Vec::new();
    for spec in specs {
        if state.should_skip(&spec.table, &spec.index_name) {
            info!(
                table = %spec.table,
                index = %spec.index_name,
                "already active, skipping"
            );
            counts.skipped += 1;
            continue;
        }
        match provisioner.create_index(spec).await? {
            IndexOutcome::Created { .. } => counts.created += 1,
            IndexOutcome::Failed { report } => {
                counts.failed += 1;
                reports.push(report);
            }
        }
    }
    Ok((counts, reports))
}

/// Render the operations a run would perform, without a provider.
///
/// Lines are grouped by table in the same order `run` would process them.
pub fn plan_preview(plan: &Plan, store: &StateStore) -> Vec<String> {
    let mut lines = Vec::new();
    for (table, specs) in plan.by_table() {
        for spec in specs {
            let action = if store.should_skip(&spec.table, &spec.index_name) {
                "skip (already active)"
            } else {
                "create"
            };
            let keys = match &spec.sort_key {
                Some(sort) => format!(
                    "partition={}, sort={}",
                    spec.partition_key.name, sort.name
                ),
                None => format!("partition={}", spec.partition_key.name),
            };
            lines.push(format!("{table}/{}: {action} ({keys})", spec.index_name));
        }
    }
    lines
}
