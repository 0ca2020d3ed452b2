//! Trace collection for node runs.

use std::collections::HashMap;
use std::sync::Mutex;

use rillflow_contracts::TraceSpan;
use tracing::debug;

/// Collects ordered spans per node run between `start_tracing` and
/// `end_tracing`.
///
/// Shared across invokers via `Arc`; buffers are keyed by node-run id so
/// concurrent runs never mix spans.
#[derive(Default)]
pub struct Tracer {
  active: Mutex<HashMap<String, Vec<TraceSpan>>>,
}

impl Tracer {
  pub fn new() -> Self {
    Self::default()
  }

  /// Open a span buffer for `run_id`.
  pub fn start_tracing(&self, run_id: &str, node_name: &str) {
    debug!(run_id, node = node_name, "tracing started");
    self
      .active
      .lock()
      .unwrap()
      .entry(run_id.to_string())
      .or_default();
  }

  /// Append a span to an open trace.
  ///
  /// Ignored when no trace is open for `run_id`.
  pub fn add_span(&self, run_id: &str, span: TraceSpan) {
    let mut active = self.active.lock().unwrap();
    match active.get_mut(run_id) {
      Some(spans) => spans.push(span),
      None => debug!(run_id, "span dropped, no open trace"),
    }
  }

  /// Drain and return the spans collected for `run_id`.
  ///
  /// Safe to call for a run whose trace was already drained, or never
  /// started: returns an empty list instead of erroring.
  pub fn end_tracing(&self, run_id: &str) -> Vec<TraceSpan> {
    self.active.lock().unwrap().remove(run_id).unwrap_or_default()
  }
}
