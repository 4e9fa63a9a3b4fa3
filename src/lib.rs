//! dynogsi: batch provisioning of DynamoDB global secondary indexes.
//!
//! Creating many GSIs across many tables runs into everything awkward about
//! the control-plane API at once: creation is asynchronous, the account
//! rate-limits concurrent builds, only one index per table may build at a
//! time, and an index can report ACTIVE before it actually serves queries.
//! This crate wraps that into a resumable batch run: classified retries per
//! failure condition, a file-backed checkpoint persisted after every record
//! transition, per-table concurrency with strict ordering inside a table,
//! and an optional post-creation probe that confirms an index really
//! answers queries.

pub mod client;
pub mod errors;
pub mod orchestrator;
pub mod plan;
pub mod provider;
pub mod provision;
pub mod report;
pub mod retry;
pub mod state;
pub mod validate;

pub use client::{ClientConfig, build_client};
pub use errors::{Error, ProviderError};
pub use orchestrator::{BatchSummary, Orchestrator, TableCounts, plan_preview};
pub use plan::{IndexSpec, KeyAttribute, Plan, Projection, ScalarType};
pub use provider::{
    CapacitySource, ControlPlane, DynamoControlPlane, IndexBuildStatus, IndexProbe, IndexSnapshot,
    TableSnapshot,
};
pub use provision::{IndexOutcome, Provisioner, merge_attribute_definitions};
pub use report::{FailureReport, RetryAttempt, RunReport};
pub use retry::{DEFAULT_MAX_ATTEMPTS, ErrorKind, RetryPolicy};
pub use state::{IndexRecord, IndexStatus, RunState, SharedState, StateStore, StatusCounts};
pub use validate::{Validation, Validator};
