//! The tool callable model.
//!
//! A resolved tool is the runtime's single extension point: an arbitrary
//! user-supplied function bound to a stable identity and statically declared
//! metadata.

use futures::future::BoxFuture;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use rillflow_contracts::{ToolArgs, ToolIdent};

use crate::error::FlowError;

/// What a tool call produces.
pub type ToolOutput = Result<Value, ToolFailure>;

/// A failure coming out of a tool callable.
///
/// Built-in capabilities fail with an already-classified [`FlowError`];
/// anything else is treated as user tool code failing.
#[derive(Debug)]
pub enum ToolFailure {
  Flow(FlowError),
  User(Box<dyn std::error::Error + Send + Sync>),
}

impl ToolFailure {
  /// Wrap an arbitrary user error.
  pub fn user(err: impl Into<Box<dyn std::error::Error + Send + Sync>>) -> Self {
    Self::User(err.into())
  }
}

impl From<FlowError> for ToolFailure {
  fn from(e: FlowError) -> Self {
    Self::Flow(e)
  }
}

/// Signature of a synchronous tool function.
pub type SyncToolFn = dyn Fn(&ToolArgs) -> ToolOutput + Send + Sync;

/// Signature of an asynchronous tool function.
pub type AsyncToolFn = dyn Fn(ToolArgs) -> BoxFuture<'static, ToolOutput> + Send + Sync;

/// A resolved tool function, ready to invoke.
pub enum ToolFunc {
  Sync(Box<SyncToolFn>),
  Async(Box<AsyncToolFn>),
}

impl ToolFunc {
  /// Wrap a synchronous function.
  pub fn sync<F>(f: F) -> Self
  where
    F: Fn(&ToolArgs) -> ToolOutput + Send + Sync + 'static,
  {
    Self::Sync(Box::new(f))
  }

  /// Wrap a function returning a boxed future.
  pub fn async_fn<F>(f: F) -> Self
  where
    F: Fn(ToolArgs) -> BoxFuture<'static, ToolOutput> + Send + Sync + 'static,
  {
    Self::Async(Box::new(f))
  }

  pub fn is_async(&self) -> bool {
    matches!(self, Self::Async(_))
  }
}

/// Statically declared description of one tool parameter.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParamSpec {
  pub name: String,
  /// Declared type name ("str", "int", or any richer type passed through).
  pub type_name: String,
  pub description: String,
}

impl ParamSpec {
  pub fn new(
    name: impl Into<String>,
    type_name: impl Into<String>,
    description: impl Into<String>,
  ) -> Self {
    Self {
      name: name.into(),
      type_name: type_name.into(),
      description: description.into(),
    }
  }
}

/// Tool-level metadata declared at registration time.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ToolMeta {
  pub description: String,
  pub params: Vec<ParamSpec>,
}

/// A callable bound to its identity and metadata.
pub struct ResolvedTool {
  pub ident: ToolIdent,
  pub meta: ToolMeta,
  pub func: ToolFunc,
}

impl ResolvedTool {
  pub fn new(ident: ToolIdent, func: ToolFunc) -> Self {
    Self {
      ident,
      meta: ToolMeta::default(),
      func,
    }
  }

  pub fn with_meta(mut self, meta: ToolMeta) -> Self {
    self.meta = meta;
    self
  }
}
