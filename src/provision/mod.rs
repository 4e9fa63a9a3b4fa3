//! Index provisioning: the per-index create engine.
//!
//! - `create` - create-one-index loop: pre-flight, submit, classify, retry
//! - `wait` - poll the table description until an index leaves CREATING

mod create;
mod wait;

pub use create::{IndexOutcome, Provisioner, merge_attribute_definitions};
pub use wait::{WaitOutcome, wait_for_index_active};
