//! Rillflow Store
//!
//! This crate provides the run-record store collaborator for the node
//! execution runtime:
//! - the [`RunStore`] persistence trait plus an in-memory implementation
//! - the [`RunTracker`], which owns live run records through their lifecycle
//!
//! Persistence is synchronous: every step of a node invocation other than
//! the tool call itself runs on the invoking thread.

mod memory;
mod tracker;

pub use memory::InMemoryRunStore;
pub use tracker::RunTracker;

use rillflow_contracts::RunInfo;

/// Error type for storage operations.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
  /// A record with this run id already exists.
  ///
  /// Upstream delivery is at-least-once, so re-persisting the same run is a
  /// benign replay.
  #[error("run '{run_id}' already persisted")]
  Duplicate { run_id: String },

  /// Any other backend failure.
  #[error("store backend error: {message}")]
  Backend { message: String },
}

/// Storage for finalized node run records.
pub trait RunStore: Send + Sync {
  /// Persist one node run record.
  fn persist_node_run(&self, run: &RunInfo) -> Result<(), StoreError>;
}
