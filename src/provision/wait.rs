//! Poll a table until an index finishes building.

use std::time::Duration;

use tokio::time::sleep;
use tracing::debug;

use crate::errors::ProviderError;
use crate::provider::{ControlPlane, IndexBuildStatus};

/// What the index looked like when the wait ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WaitOutcome {
    /// The index left the creating phase and serves traffic.
    Active,
    /// The index is being deleted.
    Deleting,
    /// The index is no longer present on the table.
    Gone,
}

/// Poll `describe_table` every `poll_interval` until `index_name` leaves the
/// CREATING state.
///
/// Backfill time is unbounded, so there is no overall deadline; an operator
/// interrupt plus `--resume` picks the wait back up.
pub async fn wait_for_index_active(
    provider: &dyn ControlPlane,
    table: &str,
    index_name: &str,
    poll_interval: Duration,
) -> Result<WaitOutcome, ProviderError> {
    loop {
        let snapshot = provider.describe_table(table).await?;
        match snapshot.index(index_name).map(|ix| ix.status) {
            Some(IndexBuildStatus::Creating) => {
                debug!(table, index = index_name, "index still building");
                sleep(poll_interval).await;
            }
            Some(IndexBuildStatus::Active)
            | Some(IndexBuildStatus::Updating)
            | Some(IndexBuildStatus::Other) => return Ok(WaitOutcome::Active),
            Some(IndexBuildStatus::Deleting) => return Ok(WaitOutcome::Deleting),
            None => return Ok(WaitOutcome::Gone),
        }
    }
}
