use std::collections::HashMap;

use serde::{Deserialize, Serialize};

/// Name of the reserved input binding carrying the bound tool instance.
///
/// Stripped from keyword arguments before they are recorded as run inputs.
pub const RESERVED_SELF_INPUT: &str = "self";

/// Where a node input value comes from.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InputAssignment {
  /// A literal value fixed in the flow definition.
  Literal(serde_json::Value),
  /// The output of an upstream node, optionally narrowed to a JSON path.
  NodeOutput {
    node: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    path: Option<String>,
  },
  /// A top-level flow input.
  FlowInput(String),
}

/// A graph node as seen by the execution runtime.
///
/// Owned by the flow model; the runtime reads it but never mutates it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Node {
  pub name: String,
  /// Aggregation ("reduce") nodes run exactly once per flow run.
  #[serde(default)]
  pub aggregation: bool,
  /// Whether results of this node may be served from cache.
  #[serde(default)]
  pub enable_cache: bool,
  /// Declared input bindings, keyed by input name.
  #[serde(default)]
  pub inputs: HashMap<String, InputAssignment>,
}

impl Node {
  /// Create a plain node with no inputs and caching disabled.
  pub fn new(name: impl Into<String>) -> Self {
    Self {
      name: name.into(),
      aggregation: false,
      enable_cache: false,
      inputs: HashMap::new(),
    }
  }
}
