//! In-memory run store.

use std::collections::HashMap;
use std::sync::Mutex;

use rillflow_contracts::RunInfo;

use crate::{RunStore, StoreError};

/// Stores run records in memory, keyed by run id.
///
/// Re-persisting a run id reports [`StoreError::Duplicate`], matching the
/// uniqueness constraint a database-backed store enforces.
#[derive(Default)]
pub struct InMemoryRunStore {
  runs: Mutex<HashMap<String, RunInfo>>,
}

impl InMemoryRunStore {
  pub fn new() -> Self {
    Self::default()
  }

  /// Number of persisted runs.
  pub fn len(&self) -> usize {
    self.runs.lock().unwrap().len()
  }

  pub fn is_empty(&self) -> bool {
    self.runs.lock().unwrap().is_empty()
  }

  /// Fetch a persisted run by id.
  pub fn get(&self, run_id: &str) -> Option<RunInfo> {
    self.runs.lock().unwrap().get(run_id).cloned()
  }

  /// All persisted runs, in no particular order.
  pub fn all(&self) -> Vec<RunInfo> {
    self.runs.lock().unwrap().values().cloned().collect()
  }
}

impl RunStore for InMemoryRunStore {
  fn persist_node_run(&self, run: &RunInfo) -> Result<(), StoreError> {
    let mut runs = self.runs.lock().unwrap();
    if runs.contains_key(&run.run_id) {
      return Err(StoreError::Duplicate {
        run_id: run.run_id.clone(),
      });
    }
    runs.insert(run.run_id.clone(), run.clone());
    Ok(())
  }
}
