//! Assistant tool adapter.
//!
//! Exposes a subset of resolved tools to an external tool-calling protocol:
//! direct invocation by function id plus a generated parameter schema. This
//! path is intentionally lightweight; no caching, tracing, or run records.

use std::collections::HashMap;

use serde_json::{Map, Value, json};
use tracing::warn;

use rillflow_contracts::ToolArgs;

use crate::error::FlowError;
use crate::tool::{ResolvedTool, ToolFailure, ToolFunc};

/// Declared reference to a tool the assistant may call.
pub struct AssistantToolSpec {
  /// Function id to resolve and expose.
  pub function: String,
  /// Inputs fixed at load time, hidden from the protocol schema.
  pub preset_inputs: ToolArgs,
}

impl AssistantToolSpec {
  pub fn new(function: impl Into<String>) -> Self {
    Self {
      function: function.into(),
      preset_inputs: ToolArgs::new(),
    }
  }

  pub fn with_preset_inputs(mut self, preset_inputs: ToolArgs) -> Self {
    self.preset_inputs = preset_inputs;
    self
  }
}

/// A resolved assistant tool with its preset inputs bound.
struct AssistantTool {
  tool: ResolvedTool,
  preset_inputs: ToolArgs,
}

/// The tools exposed to the assistant protocol, keyed by function id.
#[derive(Default)]
pub struct AssistantToolBox {
  tools: HashMap<String, AssistantTool>,
}

impl AssistantToolBox {
  pub fn new() -> Self {
    Self::default()
  }

  /// Resolve `specs` through `resolver` and load the results.
  ///
  /// Unresolvable references are skipped with a warning; the assistant
  /// simply does not see them.
  pub fn load<R>(&mut self, specs: Vec<AssistantToolSpec>, mut resolver: R)
  where
    R: FnMut(&str) -> Option<ResolvedTool>,
  {
    for spec in specs {
      match resolver(&spec.function) {
        Some(tool) => {
          self.tools.insert(
            tool.ident.function.clone(),
            AssistantTool {
              tool,
              preset_inputs: spec.preset_inputs,
            },
          );
        }
        None => warn!(function = %spec.function, "assistant tool not resolvable, skipping"),
      }
    }
  }

  pub fn len(&self) -> usize {
    self.tools.len()
  }

  pub fn is_empty(&self) -> bool {
    self.tools.is_empty()
  }

  /// Call a loaded tool directly, preset inputs merged under the caller's
  /// arguments.
  pub fn invoke(&self, function: &str, kwargs: ToolArgs) -> Result<Value, ToolFailure> {
    let Some(entry) = self.tools.get(function) else {
      return Err(ToolFailure::Flow(FlowError::system(format!(
        "assistant tool '{function}' is not loaded"
      ))));
    };
    let mut args = entry.preset_inputs.clone();
    args.extend(kwargs);
    match &entry.tool.func {
      ToolFunc::Sync(f) => f(&args),
      ToolFunc::Async(_) => Err(ToolFailure::Flow(FlowError::system(format!(
        "assistant tool '{function}' must be a synchronous function"
      )))),
    }
  }

  /// Protocol descriptions for every loaded tool.
  pub fn describe(&self) -> Vec<Value> {
    self.tools.values().map(AssistantTool::describe).collect()
  }
}

impl AssistantTool {
  fn describe(&self) -> Value {
    let mut properties = Map::new();
    let mut required = Vec::new();
    for param in &self.tool.meta.params {
      if self.preset_inputs.contains_key(&param.name) {
        continue;
      }
      properties.insert(
        param.name.clone(),
        json!({
          "description": param.description,
          "type": to_protocol_type(&param.type_name),
        }),
      );
      required.push(param.name.clone());
    }
    json!({
      "type": "function",
      "function": {
        "name": self.tool.ident.function,
        "description": self.tool.meta.description,
        "parameters": {
          "type": "object",
          "properties": properties,
          "required": required,
        },
      }
    })
  }
}

/// Map a declared primitive type to the protocol's type vocabulary.
///
/// Unmapped types pass through as declared.
fn to_protocol_type(declared: &str) -> &str {
  match declared {
    "str" => "string",
    "int" => "number",
    other => other,
  }
}
