//! Rillflow Runtime
//!
//! The node-execution engine of rillflow. For each node invocation the
//! [`ToolInvoker`]:
//! - resolves whether a cached result may be reused
//! - executes the tool function (sync or async) under trace collection,
//!   with elapsed-time monitoring on the synchronous path
//! - tracks the run's lifecycle and its result or classified error
//! - persists the run record exactly once, on every exit path
//!
//! The active invoker is scoped to the current execution context; nested
//! tool code recovers it via [`ToolInvoker::active`]. Failures carry an
//! explicit [`rillflow_contracts::ErrorCause`] tag so tool-authored errors
//! are distinguished from platform errors without type-hierarchy matching.

mod assistant;
mod context;
mod error;
mod invoker;
mod tool;
mod tracer;
mod watchdog;

pub use assistant::{AssistantToolBox, AssistantToolSpec};
pub use context::{
  ActivationScope, FLOW_ID_KEY, ROOT_RUN_ID_KEY, operation_context_value,
  update_operation_context,
};
pub use error::{FlowError, InvokeError};
pub use invoker::{InvokerConfig, ToolInvoker};
pub use tool::{
  AsyncToolFn, ParamSpec, ResolvedTool, SyncToolFn, ToolFailure, ToolFunc, ToolMeta, ToolOutput,
};
pub use tracer::Tracer;
