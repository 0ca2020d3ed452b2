//! Rillflow Contracts
//!
//! This crate contains the shared data contracts for rillflow. These types
//! flow between the graph model, the node invoker, the run store, and the
//! cache subsystem:
//! - [`Node`] - a graph node as the runtime sees it (read-only)
//! - [`RunInfo`] - one node execution attempt, from start to persistence
//! - [`TraceSpan`] - a sub-operation recorded inside a node's execution
//! - [`ToolIdent`] / [`ErrorCause`] - callable identity and failure
//!   classification vocabulary

mod node;
mod run_info;
mod tool;

pub use node::{InputAssignment, Node, RESERVED_SELF_INPUT};
pub use run_info::{RunErrorInfo, RunInfo, RunStatus, TraceSpan};
pub use tool::{ErrorCause, ToolArgs, ToolIdent};
