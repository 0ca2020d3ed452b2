//! Run lifecycle tracking.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use chrono::Utc;
use rillflow_contracts::{RunErrorInfo, RunInfo, RunStatus, TraceSpan};
use tracing::{debug, warn};

use crate::{RunStore, StoreError};

/// Tracks node runs from start to persistence.
///
/// Owns every live [`RunInfo`] between `start_node_run` and
/// `persist_node_run`. Shared across invokers via `Arc`; safe for concurrent
/// use from independent execution contexts.
pub struct RunTracker {
  runs: Mutex<HashMap<String, RunInfo>>,
  store: Arc<dyn RunStore>,
}

impl RunTracker {
  pub fn new(store: Arc<dyn RunStore>) -> Self {
    Self {
      runs: Mutex::new(HashMap::new()),
      store,
    }
  }

  /// Create and register a run record in the `Running` state.
  #[allow(clippy::too_many_arguments)]
  pub fn start_node_run(
    &self,
    node: &str,
    flow_run_id: &str,
    parent_run_id: &str,
    run_id: &str,
    index: Option<usize>,
    variant_id: Option<String>,
  ) -> RunInfo {
    let run = RunInfo {
      run_id: run_id.to_string(),
      node: node.to_string(),
      flow_run_id: flow_run_id.to_string(),
      parent_run_id: parent_run_id.to_string(),
      index,
      variant_id,
      inputs: HashMap::new(),
      result: None,
      error: None,
      cached_run_id: None,
      cached_flow_run_id: None,
      hit_cache: false,
      traces: Vec::new(),
      status: RunStatus::Running,
      start_time: Utc::now(),
      end_time: None,
    };
    self
      .runs
      .lock()
      .unwrap()
      .insert(run_id.to_string(), run.clone());
    run
  }

  /// Create and register a bypassed run record.
  pub fn bypass_node_run(
    &self,
    node: &str,
    flow_run_id: &str,
    parent_run_id: &str,
    run_id: &str,
    index: Option<usize>,
    variant_id: Option<String>,
  ) -> RunInfo {
    let now = Utc::now();
    let run = RunInfo {
      run_id: run_id.to_string(),
      node: node.to_string(),
      flow_run_id: flow_run_id.to_string(),
      parent_run_id: parent_run_id.to_string(),
      index,
      variant_id,
      inputs: HashMap::new(),
      result: None,
      error: None,
      cached_run_id: None,
      cached_flow_run_id: None,
      hit_cache: false,
      traces: Vec::new(),
      status: RunStatus::Bypassed,
      start_time: now,
      end_time: Some(now),
    };
    self
      .runs
      .lock()
      .unwrap()
      .insert(run_id.to_string(), run.clone());
    run
  }

  /// Record the inputs snapshot for a live run.
  pub fn set_inputs(&self, run_id: &str, inputs: HashMap<String, serde_json::Value>) {
    self.with_run(run_id, |run| run.inputs = inputs);
  }

  /// Annotate a live run with the provenance of a reused cached result.
  pub fn set_cache_provenance(
    &self,
    run_id: &str,
    cached_run_id: Option<String>,
    cached_flow_run_id: Option<String>,
  ) {
    self.with_run(run_id, |run| {
      run.hit_cache = true;
      run.cached_run_id = cached_run_id;
      run.cached_flow_run_id = cached_flow_run_id;
    });
  }

  /// Finalize a run with its result and collected traces.
  pub fn end_run_with_result(
    &self,
    run_id: &str,
    result: serde_json::Value,
    traces: Vec<TraceSpan>,
  ) {
    self.with_run(run_id, |run| {
      run.result = Some(result);
      run.traces = traces;
      run.status = RunStatus::Completed;
      run.end_time = Some(Utc::now());
    });
  }

  /// Finalize a run with a classified error and whatever traces were
  /// captured before the failure.
  pub fn end_run_with_error(&self, run_id: &str, error: RunErrorInfo, traces: Vec<TraceSpan>) {
    self.with_run(run_id, |run| {
      run.error = Some(error);
      run.traces = traces;
      run.status = RunStatus::Failed;
      run.end_time = Some(Utc::now());
    });
  }

  /// Snapshot of a live run.
  pub fn get_run(&self, run_id: &str) -> Option<RunInfo> {
    self.runs.lock().unwrap().get(run_id).cloned()
  }

  /// Persist the final record for `run_id`.
  ///
  /// A duplicate-record conflict is ignored: the record was already
  /// persisted by an earlier delivery of the same run. Any other store
  /// failure propagates.
  pub fn persist_node_run(&self, run_id: &str) -> Result<(), StoreError> {
    let Some(run) = self.get_run(run_id) else {
      warn!(run_id, "no live run to persist");
      return Ok(());
    };
    match self.store.persist_node_run(&run) {
      Ok(()) => Ok(()),
      Err(StoreError::Duplicate { run_id }) => {
        debug!(run_id, "run already persisted, ignoring");
        Ok(())
      }
      Err(e) => Err(e),
    }
  }

  fn with_run(&self, run_id: &str, f: impl FnOnce(&mut RunInfo)) {
    let mut runs = self.runs.lock().unwrap();
    match runs.get_mut(run_id) {
      Some(run) => f(run),
      None => debug!(run_id, "no live run with this id"),
    }
  }
}
