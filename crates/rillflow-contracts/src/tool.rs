use std::collections::HashMap;

use serde::{Deserialize, Serialize};

/// Keyword arguments passed to a tool callable.
pub type ToolArgs = HashMap<String, serde_json::Value>;

/// Who caused a failure.
///
/// Decided where the error is constructed and carried with it unchanged;
/// consumers inspect the tag instead of matching on error types.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCause {
  /// The platform or a built-in capability.
  System,
  /// User-supplied tool code.
  User,
}

/// Stable identity of a resolved callable.
///
/// Used for cache fingerprinting and for attributing failures to the module
/// the callable was registered from.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ToolIdent {
  /// Function identifier, unique within a flow.
  pub function: String,
  /// Module the function was registered from, when known.
  pub module: Option<String>,
}

impl ToolIdent {
  pub fn new(function: impl Into<String>) -> Self {
    Self {
      function: function.into(),
      module: None,
    }
  }

  pub fn with_module(function: impl Into<String>, module: impl Into<String>) -> Self {
    Self {
      function: function.into(),
      module: Some(module.into()),
    }
  }
}
