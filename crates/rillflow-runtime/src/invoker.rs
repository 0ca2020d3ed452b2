//! The node invoker.
//!
//! Composes run tracking, caching, tracing, and elapsed-time monitoring
//! around a single tool invocation. Whatever happens inside the tool call,
//! the run record is finalized and persisted exactly once before control
//! returns to the scheduler.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock};

use serde_json::Value;
use tracing::{error, info, instrument, warn};
use uuid::Uuid;

use rillflow_cache::{CacheInfo, CacheManager};
use rillflow_contracts::{Node, RESERVED_SELF_INPUT, RunInfo, ToolArgs, ToolIdent, TraceSpan};
use rillflow_store::RunTracker;

use crate::assistant::{AssistantToolBox, AssistantToolSpec};
use crate::context::{self, ActivationScope, FLOW_ID_KEY, ROOT_RUN_ID_KEY};
use crate::error::{InvokeError, classify_failure};
use crate::tool::{AsyncToolFn, ResolvedTool, SyncToolFn, ToolFailure, ToolFunc};
use crate::tracer::Tracer;
use crate::watchdog::{LOG_INTERVAL, RepeatLogTimer};

/// Configuration for a [`ToolInvoker`].
pub struct InvokerConfig {
  /// Display name for this invoker, typically the flow name.
  pub name: String,
  /// Root run id; generated when absent.
  pub run_id: Option<String>,
  /// Flow id; defaults to the run id.
  pub flow_id: Option<String>,
  /// Row index for batched execution.
  pub line_number: Option<usize>,
  /// Variant under execution.
  pub variant_id: Option<String>,
}

impl InvokerConfig {
  pub fn new(name: impl Into<String>) -> Self {
    Self {
      name: name.into(),
      run_id: None,
      flow_id: None,
      line_number: None,
      variant_id: None,
    }
  }

  pub fn with_run_id(mut self, run_id: impl Into<String>) -> Self {
    self.run_id = Some(run_id.into());
    self
  }

  pub fn with_flow_id(mut self, flow_id: impl Into<String>) -> Self {
    self.flow_id = Some(flow_id.into());
    self
  }

  pub fn with_line_number(mut self, line_number: usize) -> Self {
    self.line_number = Some(line_number);
    self
  }

  pub fn with_variant_id(mut self, variant_id: impl Into<String>) -> Self {
    self.variant_id = Some(variant_id.into());
    self
  }
}

/// Executes single node invocations for one flow run context.
pub struct ToolInvoker {
  name: String,
  run_tracker: Arc<RunTracker>,
  cache_manager: Arc<dyn CacheManager>,
  tracer: Arc<Tracer>,
  run_id: String,
  flow_id: String,
  line_number: Option<usize>,
  variant_id: Option<String>,
  assistant_tools: RwLock<AssistantToolBox>,
  cache_store_failures: AtomicU64,
}

impl ToolInvoker {
  /// Create an invoker without activating it.
  pub fn new(
    config: InvokerConfig,
    run_tracker: Arc<RunTracker>,
    cache_manager: Arc<dyn CacheManager>,
    tracer: Arc<Tracer>,
  ) -> Arc<Self> {
    let run_id = config
      .run_id
      .unwrap_or_else(|| Uuid::new_v4().to_string());
    let flow_id = config.flow_id.unwrap_or_else(|| run_id.clone());
    Arc::new(Self {
      name: config.name,
      run_tracker,
      cache_manager,
      tracer,
      run_id,
      flow_id,
      line_number: config.line_number,
      variant_id: config.variant_id,
      assistant_tools: RwLock::new(AssistantToolBox::new()),
      cache_store_failures: AtomicU64::new(0),
    })
  }

  /// Create an invoker and install it as the active one for this context.
  ///
  /// Replaces any previously active invoker; the returned scope deactivates
  /// this one on drop.
  pub fn start(
    config: InvokerConfig,
    run_tracker: Arc<RunTracker>,
    cache_manager: Arc<dyn CacheManager>,
    tracer: Arc<Tracer>,
  ) -> ActivationScope {
    context::activate(Self::new(config, run_tracker, cache_manager, tracer))
  }

  /// The invoker active in the current context, recoverable by nested tool
  /// code without an explicit parameter.
  pub fn active() -> Option<Arc<Self>> {
    context::active()
  }

  pub fn name(&self) -> &str {
    &self.name
  }

  pub fn run_id(&self) -> &str {
    &self.run_id
  }

  pub fn flow_id(&self) -> &str {
    &self.flow_id
  }

  pub fn line_number(&self) -> Option<usize> {
    self.line_number
  }

  /// Number of best-effort cache writes that failed so far.
  pub fn cache_store_failures(&self) -> u64 {
    self.cache_store_failures.load(Ordering::Relaxed)
  }

  /// Execute `tool` for `node` with the given keyword arguments.
  ///
  /// The run record is persisted exactly once before this returns, on every
  /// path.
  #[instrument(name = "invoke_tool", skip_all, fields(node = %node.name, line = ?self.line_number))]
  pub fn invoke_tool(
    &self,
    node: &Node,
    tool: &ResolvedTool,
    kwargs: &ToolArgs,
  ) -> Result<Value, InvokeError> {
    let ToolFunc::Sync(f) = &tool.func else {
      return Err(InvokeError::UnexpectedInvocation {
        node_name: node.name.clone(),
        function: tool.ident.function.clone(),
        expected: "a synchronous",
      });
    };

    let run_info = self.prepare_node_run(node, kwargs);
    let node_run_id = run_info.run_id;

    let outcome = self.invoke_sync_guarded(node, f, &tool.ident, kwargs, &node_run_id);
    let persisted = self.run_tracker.persist_node_run(&node_run_id);
    if let Err(e) = &persisted {
      error!(run_id = %node_run_id, error = %e, "failed to persist node run");
    }

    let value = outcome?;
    persisted.map_err(|source| InvokeError::Persistence {
      run_id: node_run_id,
      source,
    })?;
    Ok(value)
  }

  /// Execute an asynchronous `tool` for `node`.
  ///
  /// Fails immediately with an unexpected-invocation error when the tool is
  /// not an async function. No watchdog on this path; the future is awaited
  /// directly.
  #[instrument(name = "invoke_tool_async", skip_all, fields(node = %node.name, line = ?self.line_number))]
  pub async fn invoke_tool_async(
    &self,
    node: &Node,
    tool: &ResolvedTool,
    kwargs: &ToolArgs,
  ) -> Result<Value, InvokeError> {
    let ToolFunc::Async(f) = &tool.func else {
      return Err(InvokeError::UnexpectedInvocation {
        node_name: node.name.clone(),
        function: tool.ident.function.clone(),
        expected: "an async",
      });
    };

    let run_info = self.prepare_node_run(node, kwargs);
    let node_run_id = run_info.run_id;

    let outcome = self
      .invoke_async_guarded(node, f, &tool.ident, kwargs, &node_run_id)
      .await;
    let persisted = self.run_tracker.persist_node_run(&node_run_id);
    if let Err(e) = &persisted {
      error!(run_id = %node_run_id, error = %e, "failed to persist node run");
    }

    let value = outcome?;
    persisted.map_err(|source| InvokeError::Persistence {
      run_id: node_run_id,
      source,
    })?;
    Ok(value)
  }

  /// Record a bypassed node without executing anything.
  ///
  /// Keeps the run history complete: one record per node whether it executed
  /// or was short-circuited upstream.
  pub fn bypass_node(&self, node: &Node) -> Result<(), InvokeError> {
    let node_run_id = self.generate_node_run_id(node);
    info!(node = %node.name, run_id = %node_run_id, "bypassing node");
    self.run_tracker.bypass_node_run(
      &node.name,
      &self.run_id,
      &self.parent_run_id(),
      &node_run_id,
      self.line_number,
      self.variant_id.clone(),
    );
    self
      .run_tracker
      .persist_node_run(&node_run_id)
      .map_err(|source| InvokeError::Persistence {
        run_id: node_run_id,
        source,
      })
  }

  /// Load the assistant-facing tools for this invoker.
  pub fn load_assistant_tools<R>(&self, specs: Vec<AssistantToolSpec>, resolver: R)
  where
    R: FnMut(&str) -> Option<ResolvedTool>,
  {
    self.assistant_tools.write().unwrap().load(specs, resolver);
  }

  /// Call an assistant tool directly. No caching, tracing, or run record.
  pub fn invoke_assistant_tool(
    &self,
    function: &str,
    kwargs: ToolArgs,
  ) -> Result<Value, ToolFailure> {
    self.assistant_tools.read().unwrap().invoke(function, kwargs)
  }

  /// Protocol descriptions of the loaded assistant tools.
  pub fn assistant_tool_descriptions(&self) -> Vec<Value> {
    self.assistant_tools.read().unwrap().describe()
  }

  fn invoke_sync_guarded(
    &self,
    node: &Node,
    f: &SyncToolFn,
    ident: &ToolIdent,
    kwargs: &ToolArgs,
    node_run_id: &str,
  ) -> Result<Value, InvokeError> {
    let cache_info = self
      .cache_manager
      .calculate_cache_info(&self.flow_id, ident, kwargs);

    let mut traces = Vec::new();
    let mut hit_cache = false;

    let outcome = match self.lookup_cached_result(node, cache_info.as_ref(), node_run_id) {
      Some(cached) => {
        hit_cache = true;
        Ok(cached)
      }
      None => {
        self.tracer.start_tracing(node_run_id, &node.name);
        let result = self.call_sync(node, f, ident, kwargs);
        if result.is_ok() {
          traces = self.tracer.end_tracing(node_run_id);
        }
        result
      }
    };

    self.finalize_run(node, node_run_id, hit_cache, cache_info.as_ref(), traces, outcome)
  }

  async fn invoke_async_guarded(
    &self,
    node: &Node,
    f: &AsyncToolFn,
    ident: &ToolIdent,
    kwargs: &ToolArgs,
    node_run_id: &str,
  ) -> Result<Value, InvokeError> {
    let cache_info = self
      .cache_manager
      .calculate_cache_info(&self.flow_id, ident, kwargs);

    let mut traces = Vec::new();
    let mut hit_cache = false;

    let outcome = match self.lookup_cached_result(node, cache_info.as_ref(), node_run_id) {
      Some(cached) => {
        hit_cache = true;
        Ok(cached)
      }
      None => {
        self.tracer.start_tracing(node_run_id, &node.name);
        let result = f(kwargs.clone())
          .await
          .map_err(|failure| classify_failure(&node.name, ident.module.as_deref(), failure));
        if result.is_ok() {
          traces = self.tracer.end_tracing(node_run_id);
        }
        result
      }
    };

    self.finalize_run(node, node_run_id, hit_cache, cache_info.as_ref(), traces, outcome)
  }

  /// Finalize the run record with the outcome and drain any traces left
  /// open by a failure. Runs on every path before persistence.
  fn finalize_run(
    &self,
    node: &Node,
    node_run_id: &str,
    hit_cache: bool,
    cache_info: Option<&CacheInfo>,
    mut traces: Vec<TraceSpan>,
    outcome: Result<Value, InvokeError>,
  ) -> Result<Value, InvokeError> {
    match outcome {
      Ok(result) => {
        self
          .run_tracker
          .end_run_with_result(node_run_id, result.clone(), traces);
        if !hit_cache && node.enable_cache {
          self.persist_cache(cache_info, node_run_id);
        }
        info!(node = %node.name, "node completed");
        Ok(result)
      }
      Err(e) => {
        error!(node = %node.name, line = ?self.line_number, error = %e, "node failed");
        if traces.is_empty() {
          traces = self.tracer.end_tracing(node_run_id);
        }
        self
          .run_tracker
          .end_run_with_error(node_run_id, e.to_run_error(), traces);
        Err(e)
      }
    }
  }

  fn call_sync(
    &self,
    node: &Node,
    f: &SyncToolFn,
    ident: &ToolIdent,
    kwargs: &ToolArgs,
  ) -> Result<Value, InvokeError> {
    let logging_name = match self.line_number {
      Some(line) => format!("{} in line {}", node.name, line),
      None => node.name.clone(),
    };
    let _timer = RepeatLogTimer::start(logging_name, LOG_INTERVAL);
    f(kwargs).map_err(|failure| classify_failure(&node.name, ident.module.as_deref(), failure))
  }

  /// Serve a previous result when the node allows it and one exists.
  ///
  /// Annotates the run record with cache provenance on a hit.
  fn lookup_cached_result(
    &self,
    node: &Node,
    cache_info: Option<&CacheInfo>,
    node_run_id: &str,
  ) -> Option<Value> {
    if !node.enable_cache {
      return None;
    }
    let info = cache_info.filter(|info| info.is_valid())?;
    let lookup = self.cache_manager.get_cache_result(info);
    if !lookup.hit_cache {
      return None;
    }
    self.run_tracker.set_cache_provenance(
      node_run_id,
      lookup.cached_run_id,
      lookup.cached_flow_run_id,
    );
    info!(node = %node.name, run_id = %node_run_id, "serving cached result");
    Some(lookup.result.unwrap_or(Value::Null))
  }

  /// Best-effort cache write; failures are logged and counted, never raised.
  fn persist_cache(&self, cache_info: Option<&CacheInfo>, node_run_id: &str) {
    let Some(info) = cache_info.filter(|info| info.is_valid()) else {
      return;
    };
    let Some(run) = self.run_tracker.get_run(node_run_id) else {
      return;
    };
    if let Err(e) = self.cache_manager.persist_result(&run, info, &self.flow_id) {
      self.cache_store_failures.fetch_add(1, Ordering::Relaxed);
      warn!(run_id = %node_run_id, error = %e, "failed to persist cache result");
    }
  }

  fn prepare_node_run(&self, node: &Node, kwargs: &ToolArgs) -> RunInfo {
    context::update_operation_context([
      (FLOW_ID_KEY.to_string(), self.flow_id.clone()),
      (ROOT_RUN_ID_KEY.to_string(), self.run_id.clone()),
    ]);
    let node_run_id = self.generate_node_run_id(node);
    info!(node = %node.name, run_id = %node_run_id, "executing node");
    let run_info = self.run_tracker.start_node_run(
      &node.name,
      &self.run_id,
      &self.parent_run_id(),
      &node_run_id,
      self.line_number,
      self.variant_id.clone(),
    );
    let inputs = kwargs
      .iter()
      .filter(|(name, _)| name.as_str() != RESERVED_SELF_INPUT)
      .map(|(name, value)| (name.clone(), value.clone()))
      .collect();
    self.run_tracker.set_inputs(&node_run_id, inputs);
    run_info
  }

  fn parent_run_id(&self) -> String {
    match self.line_number {
      Some(line) => format!("{}_{}", self.run_id, line),
      None => self.run_id.clone(),
    }
  }

  fn generate_node_run_id(&self, node: &Node) -> String {
    if node.aggregation {
      // An aggregation node has exactly one execution per flow run.
      return format!("{}_{}_reduce", self.run_id, node.name);
    }
    match self.line_number {
      None => format!("{}_{}_{}", self.run_id, node.name, Uuid::new_v4()),
      Some(line) => format!("{}_{}_{}", self.run_id, node.name, line),
    }
  }
}
