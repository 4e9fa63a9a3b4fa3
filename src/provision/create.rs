//! Create-one-index engine.
//!
//! One `create_index` call owns the full lifecycle of one index: pre-flight
//! describe, the UpdateTable submission, the build wait, the optional
//! serving probe, and the classify/back-off/retry loop around all of it.
//! Every attempt is reported to the state store before the loop sleeps, so
//! an interrupt at any point loses at most the attempt in flight.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::time::sleep;
use tracing::{debug, error, info, warn};

use crate::errors::{Error, ProviderError};
use crate::plan::{IndexSpec, KeyAttribute};
use crate::provider::{ControlPlane, IndexBuildStatus};
use crate::report::{FailureReport, RetryAttempt};
use crate::retry::RetryPolicy;
use crate::state::{IndexStatus, SharedState};
use crate::validate::{Validation, Validator};

use super::wait::{WaitOutcome, wait_for_index_active};

/// Default pause between DescribeTable polls while an index builds.
const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(20);

/// Final outcome of one [`Provisioner::create_index`] call.
#[derive(Debug)]
pub enum IndexOutcome {
    /// The index is on the table, created now or found already there.
    Created { attempts: u32 },
    /// The retry budget is exhausted and the record is `failed`.
    Failed { report: FailureReport },
}

/// Drives a single index to completion under a retry policy.
#[derive(Clone)]
pub struct Provisioner {
    provider: Arc<dyn ControlPlane>,
    state: SharedState,
    policy: RetryPolicy,
    poll_interval: Duration,
    wait_for_active: bool,
    validate_after_create: bool,
}

impl Provisioner {
    /// Defaults: wait for builds to finish, poll every 20s, no validation.
    pub fn new(provider: Arc<dyn ControlPlane>, state: SharedState, policy: RetryPolicy) -> Self {
        Provisioner {
            provider,
            state,
            policy,
            poll_interval: DEFAULT_POLL_INTERVAL,
            wait_for_active: true,
            validate_after_create: false,
        }
    }

    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    /// Whether to block until a created index leaves CREATING.
    pub fn with_wait(mut self, wait: bool) -> Self {
        self.wait_for_active = wait;
        self
    }

    /// Whether to probe the index after creation before declaring success.
    pub fn with_validation(mut self, validate: bool) -> Self {
        self.validate_after_create = validate;
        self
    }

    /// Create one index, retrying per the policy and reporting every attempt
    /// to the state store.
    ///
    /// Provider failures are data here, folded into the returned
    /// [`IndexOutcome`]; `Err` is reserved for state-store failures, which
    /// void the crash-safety contract and must stop the run.
    pub async fn create_index(&self, spec: &IndexSpec) -> Result<IndexOutcome, Error> {
        let table = spec.table.as_str();
        let index = spec.index_name.as_str();
        self.state
            .update(table, index, IndexStatus::InProgress, 0, None)?;

        let mut history: Vec<RetryAttempt> = Vec::new();
        loop {
            match self.try_once(spec).await {
                Ok(()) => {
                    let retries = history.len() as u32;
                    self.state
                        .update(table, index, IndexStatus::Active, retries, None)?;
                    info!(table, index, retries, "index active");
                    return Ok(IndexOutcome::Created {
                        attempts: retries + 1,
                    });
                }
                Err(err) => {
                    let kind = err.kind();
                    let attempts = history.len() as u32 + 1;
                    let text = err.to_string();
                    warn!(
                        table,
                        index,
                        attempt = attempts,
                        kind = kind.map(|k| k.wire_name()).unwrap_or("unclassified"),
                        error = %text,
                        "create attempt failed"
                    );
                    history.push(RetryAttempt {
                        attempt: attempts,
                        at: Utc::now(),
                        error: text.clone(),
                        kind,
                    });
                    self.state
                        .update(table, index, IndexStatus::InProgress, attempts, Some(&text))?;

                    if !self.policy.should_retry(kind, attempts) {
                        self.state
                            .update(table, index, IndexStatus::Failed, attempts, Some(&text))?;
                        error!(table, index, attempts, "retry budget exhausted");
                        return Ok(IndexOutcome::Failed {
                            report: FailureReport::new(table, index, history),
                        });
                    }

                    let delay = self.policy.delay_for(kind, attempts - 1);
                    if !delay.is_zero() {
                        debug!(table, index, delay_secs = delay.as_secs(), "backing off");
                    }
                    sleep(delay).await;
                }
            }
        }
    }

    /// One attempt: pre-flight describe, create if absent, wait, validate.
    ///
    /// The pre-flight is what makes resumed runs converge: an index a
    /// previous interrupted run already started shows up here as CREATING or
    /// ACTIVE and is adopted instead of re-created.
    async fn try_once(&self, spec: &IndexSpec) -> Result<(), ProviderError> {
        let snapshot = self.provider.describe_table(&spec.table).await?;

        match snapshot.index(&spec.index_name).map(|ix| ix.status) {
            Some(IndexBuildStatus::Active)
            | Some(IndexBuildStatus::Updating)
            | Some(IndexBuildStatus::Other) => {
                debug!(
                    table = %spec.table,
                    index = %spec.index_name,
                    "index already present"
                );
            }
            Some(IndexBuildStatus::Creating) => {
                self.await_build(spec).await?;
            }
            Some(IndexBuildStatus::Deleting) => {
                return Err(ProviderError::service(
                    "ResourceInUseException",
                    format!(
                        "index '{}' on table '{}' is being deleted",
                        spec.index_name, spec.table
                    ),
                ));
            }
            None => {
                let definitions = merge_attribute_definitions(
                    &snapshot.attribute_definitions,
                    &spec.key_attributes(),
                );
                self.provider
                    .create_index(&spec.table, spec, &definitions)
                    .await?;
                info!(
                    table = %spec.table,
                    index = %spec.index_name,
                    "index creation accepted"
                );
                self.await_build(spec).await?;
            }
        }

        if self.validate_after_create {
            self.confirm_serving(spec).await?;
        }
        Ok(())
    }

    async fn await_build(&self, spec: &IndexSpec) -> Result<(), ProviderError> {
        if !self.wait_for_active {
            return Ok(());
        }
        match wait_for_index_active(
            self.provider.as_ref(),
            &spec.table,
            &spec.index_name,
            self.poll_interval,
        )
        .await?
        {
            WaitOutcome::Active => Ok(()),
            WaitOutcome::Deleting => Err(ProviderError::transport(format!(
                "index '{}' on table '{}' entered DELETING while building",
                spec.index_name, spec.table
            ))),
            WaitOutcome::Gone => Err(ProviderError::transport(format!(
                "index '{}' on table '{}' disappeared while building",
                spec.index_name, spec.table
            ))),
        }
    }

    async fn confirm_serving(&self, spec: &IndexSpec) -> Result<(), ProviderError> {
        let validator = Validator::new(Arc::clone(&self.provider));
        match validator.validate(spec).await {
            Validation::Functional { probed_items } => {
                debug!(
                    table = %spec.table,
                    index = %spec.index_name,
                    probed_items,
                    "index validated"
                );
                Ok(())
            }
            Validation::NonFunctional { reason } => Err(ProviderError::transport(format!(
                "index '{}' on table '{}' is not serving queries: {reason}",
                spec.index_name, spec.table
            ))),
            Validation::ValidationError { reason } => Err(ProviderError::transport(format!(
                "could not validate index '{}' on table '{}': {reason}",
                spec.index_name, spec.table
            ))),
        }
    }
}

/// Merge the table's declared attribute definitions with the ones an index
/// requires. The table's declaration wins on a name conflict; submitting the
/// merged list is what clears a duplicate-declaration ValidationException on
/// resubmit.
pub fn merge_attribute_definitions(
    existing: &[KeyAttribute],
    required: &[KeyAttribute],
) -> Vec<KeyAttribute> {
    let mut merged = existing.to_vec();
    for attr in required {
        if !merged.iter().any(|def| def.name == attr.name) {
            merged.push(attr.clone());
        }
    }
    merged
}
