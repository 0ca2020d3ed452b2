//! Execution-context registries.
//!
//! The active invoker and the ambient operation metadata are scoped to the
//! current thread: one logical flow execution context per thread, matching a
//! scheduler that runs concurrent batch rows on distinct threads. Nested
//! tool code recovers the ambient invoker through [`active`] instead of an
//! explicit parameter.

use std::cell::RefCell;
use std::collections::HashMap;
use std::sync::Arc;

use crate::invoker::ToolInvoker;

/// Operation-context key holding the flow id.
pub const FLOW_ID_KEY: &str = "flow-id";
/// Operation-context key holding the root run id.
pub const ROOT_RUN_ID_KEY: &str = "root-run-id";

thread_local! {
  static ACTIVE_INVOKER: RefCell<Option<Arc<ToolInvoker>>> = const { RefCell::new(None) };
  static OPERATION_CONTEXT: RefCell<HashMap<String, String>> = RefCell::new(HashMap::new());
}

/// Install `invoker` as the active invoker for this context.
///
/// Any previously active invoker is deactivated first. The returned scope
/// deactivates `invoker` when dropped, unless a newer activation has already
/// replaced it.
pub fn activate(invoker: Arc<ToolInvoker>) -> ActivationScope {
  ACTIVE_INVOKER.with(|cell| {
    *cell.borrow_mut() = Some(invoker.clone());
  });
  ActivationScope { invoker }
}

/// Deactivate `invoker` if it is still the active one.
pub fn deactivate(invoker: &Arc<ToolInvoker>) {
  ACTIVE_INVOKER.with(|cell| {
    let mut active = cell.borrow_mut();
    if active.as_ref().is_some_and(|current| Arc::ptr_eq(current, invoker)) {
      *active = None;
    }
  });
}

/// The invoker currently active in this context, if any.
pub fn active() -> Option<Arc<ToolInvoker>> {
  ACTIVE_INVOKER.with(|cell| cell.borrow().clone())
}

/// Keeps an invoker active; deactivates it on drop.
#[must_use = "dropping the scope deactivates the invoker"]
pub struct ActivationScope {
  invoker: Arc<ToolInvoker>,
}

impl ActivationScope {
  /// The invoker this scope keeps active.
  pub fn invoker(&self) -> &Arc<ToolInvoker> {
    &self.invoker
  }
}

impl Drop for ActivationScope {
  fn drop(&mut self) {
    deactivate(&self.invoker);
  }
}

/// Merge ambient execution metadata visible to nested framework calls.
pub fn update_operation_context<I>(entries: I)
where
  I: IntoIterator<Item = (String, String)>,
{
  OPERATION_CONTEXT.with(|cell| cell.borrow_mut().extend(entries));
}

/// Read one ambient metadata value.
pub fn operation_context_value(key: &str) -> Option<String> {
  OPERATION_CONTEXT.with(|cell| cell.borrow().get(key).cloned())
}
