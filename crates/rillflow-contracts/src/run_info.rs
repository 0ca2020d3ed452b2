use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::tool::ErrorCause;

/// Status of a node run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
  NotStarted,
  Running,
  Completed,
  Failed,
  Bypassed,
}

/// Serializable snapshot of a classified failure, as recorded on a run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunErrorInfo {
  pub message: String,
  pub cause: ErrorCause,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub module: Option<String>,
}

/// One sub-operation recorded inside a node's execution.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TraceSpan {
  pub name: String,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub inputs: Option<serde_json::Value>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub output: Option<serde_json::Value>,
  pub started_at: DateTime<Utc>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub ended_at: Option<DateTime<Utc>>,
}

impl TraceSpan {
  /// Open a span starting now.
  pub fn begin(name: impl Into<String>) -> Self {
    Self {
      name: name.into(),
      inputs: None,
      output: None,
      started_at: Utc::now(),
      ended_at: None,
    }
  }

  /// Close the span with its output.
  pub fn finish(mut self, output: serde_json::Value) -> Self {
    self.output = Some(output);
    self.ended_at = Some(Utc::now());
    self
  }
}

/// One node execution attempt.
///
/// Created when the invocation starts, mutated by the run tracker during
/// execution, persisted exactly once at the end. Never mutated after
/// persistence.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunInfo {
  pub run_id: String,
  /// Name of the node this run executed.
  pub node: String,
  pub flow_run_id: String,
  pub parent_run_id: String,
  /// Row index for batched execution.
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub index: Option<usize>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub variant_id: Option<String>,
  /// Inputs snapshot, reserved bindings excluded.
  #[serde(default)]
  pub inputs: HashMap<String, serde_json::Value>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub result: Option<serde_json::Value>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub error: Option<RunErrorInfo>,
  /// Run that originally produced a reused cached result.
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub cached_run_id: Option<String>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub cached_flow_run_id: Option<String>,
  #[serde(default)]
  pub hit_cache: bool,
  /// Ordered spans collected during execution.
  #[serde(default)]
  pub traces: Vec<TraceSpan>,
  pub status: RunStatus,
  pub start_time: DateTime<Utc>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub end_time: Option<DateTime<Utc>>,
}
