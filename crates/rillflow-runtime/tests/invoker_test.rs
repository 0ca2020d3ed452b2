//! Integration tests for the synchronous invocation path.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use futures::FutureExt;
use rillflow_cache::{CacheError, CacheInfo, CacheManager, CacheResult, InMemoryCache};
use rillflow_contracts::{ErrorCause, Node, RunInfo, RunStatus, ToolArgs, ToolIdent, TraceSpan};
use rillflow_runtime::{
  FLOW_ID_KEY, FlowError, InvokeError, InvokerConfig, ResolvedTool, ToolFailure, ToolFunc,
  ToolInvoker, Tracer, operation_context_value,
};
use rillflow_store::{InMemoryRunStore, RunTracker};
use serde_json::{Value, json};

struct Harness {
  store: Arc<InMemoryRunStore>,
  tracker: Arc<RunTracker>,
  cache: Arc<dyn CacheManager>,
  tracer: Arc<Tracer>,
}

impl Harness {
  fn new() -> Self {
    Self::with_cache(Arc::new(InMemoryCache::new()))
  }

  fn with_cache(cache: Arc<dyn CacheManager>) -> Self {
    let store = Arc::new(InMemoryRunStore::new());
    Self {
      store: store.clone(),
      tracker: Arc::new(RunTracker::new(store)),
      cache,
      tracer: Arc::new(Tracer::new()),
    }
  }

  fn invoker(&self, config: InvokerConfig) -> Arc<ToolInvoker> {
    ToolInvoker::new(
      config,
      self.tracker.clone(),
      self.cache.clone(),
      self.tracer.clone(),
    )
  }
}

fn doubling_tool(counter: Arc<AtomicUsize>) -> ResolvedTool {
  ResolvedTool::new(
    ToolIdent::with_module("double", "tools.math"),
    ToolFunc::sync(move |args: &ToolArgs| {
      counter.fetch_add(1, Ordering::SeqCst);
      let x = args.get("x").and_then(Value::as_i64).unwrap_or(0);
      Ok(json!(x * 2))
    }),
  )
}

fn failing_tool(failure: impl Fn() -> ToolFailure + Send + Sync + 'static) -> ResolvedTool {
  ResolvedTool::new(
    ToolIdent::with_module("broken", "tools.broken"),
    ToolFunc::sync(move |_args: &ToolArgs| Err(failure())),
  )
}

fn args(pairs: &[(&str, Value)]) -> ToolArgs {
  pairs
    .iter()
    .map(|(name, value)| (name.to_string(), value.clone()))
    .collect()
}

/// Cache wrapper whose writes always fail.
struct BrokenStoreCache {
  inner: InMemoryCache,
}

impl CacheManager for BrokenStoreCache {
  fn calculate_cache_info(
    &self,
    flow_id: &str,
    tool: &ToolIdent,
    args: &ToolArgs,
  ) -> Option<CacheInfo> {
    self.inner.calculate_cache_info(flow_id, tool, args)
  }

  fn get_cache_result(&self, info: &CacheInfo) -> CacheResult {
    self.inner.get_cache_result(info)
  }

  fn persist_result(&self, _: &RunInfo, _: &CacheInfo, _: &str) -> Result<(), CacheError> {
    Err(CacheError::Backend {
      message: "disk full".to_string(),
    })
  }
}

#[test]
fn successful_invocation_persists_exactly_one_run() {
  let harness = Harness::new();
  let invoker = harness.invoker(
    InvokerConfig::new("flow")
      .with_run_id("run1")
      .with_line_number(0),
  );
  let counter = Arc::new(AtomicUsize::new(0));

  let result = invoker
    .invoke_tool(&Node::new("double"), &doubling_tool(counter.clone()), &args(&[("x", json!(21))]))
    .unwrap();

  assert_eq!(result, json!(42));
  assert_eq!(counter.load(Ordering::SeqCst), 1);
  assert_eq!(harness.store.len(), 1);

  let run = harness.store.get("run1_double_0").unwrap();
  assert_eq!(run.status, RunStatus::Completed);
  assert_eq!(run.result, Some(json!(42)));
  assert_eq!(run.parent_run_id, "run1_0");
  assert_eq!(run.flow_run_id, "run1");
  assert_eq!(run.index, Some(0));
  assert_eq!(run.inputs["x"], json!(21));
  assert!(!run.hit_cache);
}

#[test]
fn reserved_self_binding_is_not_recorded() {
  let harness = Harness::new();
  let invoker = harness.invoker(
    InvokerConfig::new("flow")
      .with_run_id("run1")
      .with_line_number(0),
  );
  let counter = Arc::new(AtomicUsize::new(0));

  invoker
    .invoke_tool(
      &Node::new("double"),
      &doubling_tool(counter),
      &args(&[("x", json!(3)), ("self", json!("connection-handle"))]),
    )
    .unwrap();

  let run = harness.store.get("run1_double_0").unwrap();
  assert_eq!(run.inputs.len(), 1);
  assert!(run.inputs.contains_key("x"));
}

#[test]
fn second_identical_invocation_hits_the_cache() {
  let harness = Harness::new();
  let counter = Arc::new(AtomicUsize::new(0));
  let tool = doubling_tool(counter.clone());
  let node = Node {
    enable_cache: true,
    ..Node::new("double")
  };
  let kwargs = args(&[("x", json!(21))]);

  let first = harness.invoker(
    InvokerConfig::new("flow")
      .with_run_id("run1")
      .with_flow_id("flowA")
      .with_line_number(0),
  );
  let second = harness.invoker(
    InvokerConfig::new("flow")
      .with_run_id("run2")
      .with_flow_id("flowA")
      .with_line_number(0),
  );

  assert_eq!(first.invoke_tool(&node, &tool, &kwargs).unwrap(), json!(42));
  assert_eq!(second.invoke_tool(&node, &tool, &kwargs).unwrap(), json!(42));

  assert_eq!(counter.load(Ordering::SeqCst), 1);
  assert_eq!(harness.store.len(), 2);

  let replay = harness.store.get("run2_double_0").unwrap();
  assert!(replay.hit_cache);
  assert_eq!(replay.status, RunStatus::Completed);
  assert_eq!(replay.cached_run_id.as_deref(), Some("run1_double_0"));
  assert_eq!(replay.cached_flow_run_id.as_deref(), Some("flowA"));
}

#[test]
fn caching_disabled_invokes_the_tool_every_time() {
  let harness = Harness::new();
  let counter = Arc::new(AtomicUsize::new(0));
  let tool = doubling_tool(counter.clone());
  let node = Node::new("double");
  let kwargs = args(&[("x", json!(21))]);

  let invoker = harness.invoker(InvokerConfig::new("flow").with_run_id("run1"));
  invoker.invoke_tool(&node, &tool, &kwargs).unwrap();
  invoker.invoke_tool(&node, &tool, &kwargs).unwrap();

  assert_eq!(counter.load(Ordering::SeqCst), 2);
  assert_eq!(harness.store.len(), 2);
}

#[test]
fn aggregation_reruns_share_one_persisted_record() {
  let harness = Harness::new();
  let counter = Arc::new(AtomicUsize::new(0));
  let tool = doubling_tool(counter.clone());
  let node = Node {
    aggregation: true,
    ..Node::new("sum")
  };

  let invoker = harness.invoker(InvokerConfig::new("flow").with_run_id("run1"));
  invoker.invoke_tool(&node, &tool, &args(&[("x", json!(1))])).unwrap();
  invoker.invoke_tool(&node, &tool, &args(&[("x", json!(1))])).unwrap();

  // Same deterministic run id both times; the duplicate persist is ignored.
  assert_eq!(counter.load(Ordering::SeqCst), 2);
  assert_eq!(harness.store.len(), 1);
  assert!(harness.store.get("run1_sum_reduce").is_some());
}

#[test]
fn user_error_is_wrapped_and_recorded() {
  let harness = Harness::new();
  let invoker = harness.invoker(
    InvokerConfig::new("flow")
      .with_run_id("run1")
      .with_line_number(2),
  );

  let err = invoker
    .invoke_tool(
      &Node::new("broken"),
      &failing_tool(|| ToolFailure::user("index out of range")),
      &ToolArgs::new(),
    )
    .unwrap_err();

  match &err {
    InvokeError::ToolExecution { node_name, module, .. } => {
      assert_eq!(node_name, "broken");
      assert_eq!(module.as_deref(), Some("tools.broken"));
    }
    other => panic!("expected tool execution error, got {other:?}"),
  }
  assert_eq!(err.cause(), ErrorCause::User);
  assert!(err.to_string().contains("broken"));
  assert!(std::error::Error::source(&err).is_some());

  assert_eq!(harness.store.len(), 1);
  let run = harness.store.get("run1_broken_2").unwrap();
  assert_eq!(run.status, RunStatus::Failed);
  let recorded = run.error.unwrap();
  assert_eq!(recorded.cause, ErrorCause::User);
  assert!(recorded.message.contains("index out of range"));
}

#[test]
fn flow_error_propagates_unchanged_with_module_attribution() {
  let harness = Harness::new();
  let invoker = harness.invoker(
    InvokerConfig::new("flow")
      .with_run_id("run1")
      .with_line_number(0),
  );

  let err = invoker
    .invoke_tool(
      &Node::new("broken"),
      &failing_tool(|| FlowError::system("quota exceeded").into()),
      &ToolArgs::new(),
    )
    .unwrap_err();

  match err {
    InvokeError::Flow(e) => {
      assert_eq!(e.message, "quota exceeded");
      assert_eq!(e.cause, ErrorCause::System);
      assert_eq!(e.module.as_deref(), Some("tools.broken"));
    }
    other => panic!("expected flow error, got {other:?}"),
  }

  let run = harness.store.get("run1_broken_0").unwrap();
  assert_eq!(run.status, RunStatus::Failed);
  assert_eq!(run.error.unwrap().cause, ErrorCause::System);
}

#[test]
fn bypassed_node_gets_a_run_record_without_execution() {
  let harness = Harness::new();
  let invoker = harness.invoker(
    InvokerConfig::new("flow")
      .with_run_id("R")
      .with_line_number(3),
  );

  invoker.bypass_node(&Node::new("N")).unwrap();

  assert_eq!(harness.store.len(), 1);
  let run = harness.store.get("R_N_3").unwrap();
  assert_eq!(run.status, RunStatus::Bypassed);
  assert_eq!(run.parent_run_id, "R_3");
  assert!(run.result.is_none());
  assert!(run.error.is_none());
}

#[test]
fn cache_write_failure_never_fails_the_invocation() {
  let harness = Harness::with_cache(Arc::new(BrokenStoreCache {
    inner: InMemoryCache::new(),
  }));
  let invoker = harness.invoker(
    InvokerConfig::new("flow")
      .with_run_id("run1")
      .with_line_number(0),
  );
  let counter = Arc::new(AtomicUsize::new(0));
  let node = Node {
    enable_cache: true,
    ..Node::new("double")
  };

  let result = invoker
    .invoke_tool(&node, &doubling_tool(counter), &args(&[("x", json!(21))]))
    .unwrap();

  assert_eq!(result, json!(42));
  assert_eq!(invoker.cache_store_failures(), 1);
  let run = harness.store.get("run1_double_0").unwrap();
  assert_eq!(run.status, RunStatus::Completed);
}

#[test]
fn sync_entry_point_rejects_async_tools_before_any_run_work() {
  let harness = Harness::new();
  let invoker = harness.invoker(InvokerConfig::new("flow").with_run_id("run1"));
  let tool = ResolvedTool::new(
    ToolIdent::new("sleeper"),
    ToolFunc::async_fn(|_args: ToolArgs| async { Ok(json!(null)) }.boxed()),
  );

  let err = invoker
    .invoke_tool(&Node::new("sleeper"), &tool, &ToolArgs::new())
    .unwrap_err();

  assert!(matches!(err, InvokeError::UnexpectedInvocation { .. }));
  assert_eq!(err.cause(), ErrorCause::System);
  assert!(harness.store.is_empty());
}

#[test]
fn spans_recorded_during_execution_are_attached_to_the_run() {
  let harness = Harness::new();
  let invoker = harness.invoker(
    InvokerConfig::new("flow")
      .with_run_id("run1")
      .with_line_number(0),
  );

  // Batched execution makes the node-run id deterministic, so the tool can
  // append spans to its own open trace.
  let tracer = harness.tracer.clone();
  let tool = ResolvedTool::new(
    ToolIdent::new("fetch"),
    ToolFunc::sync(move |_args: &ToolArgs| {
      tracer.add_span("run1_fetch_0", TraceSpan::begin("http_get").finish(json!(200)));
      Ok(json!("body"))
    }),
  );

  invoker.invoke_tool(&Node::new("fetch"), &tool, &ToolArgs::new()).unwrap();

  let run = harness.store.get("run1_fetch_0").unwrap();
  assert_eq!(run.traces.len(), 1);
  assert_eq!(run.traces[0].name, "http_get");
}

#[test]
fn failing_tool_still_flushes_partial_spans() {
  let harness = Harness::new();
  let invoker = harness.invoker(
    InvokerConfig::new("flow")
      .with_run_id("run1")
      .with_line_number(0),
  );

  let tracer = harness.tracer.clone();
  let tool = ResolvedTool::new(
    ToolIdent::new("fetch"),
    ToolFunc::sync(move |_args: &ToolArgs| {
      tracer.add_span("run1_fetch_0", TraceSpan::begin("resolve_dns"));
      Err(ToolFailure::user("connection refused"))
    }),
  );

  invoker
    .invoke_tool(&Node::new("fetch"), &tool, &ToolArgs::new())
    .unwrap_err();

  let run = harness.store.get("run1_fetch_0").unwrap();
  assert_eq!(run.status, RunStatus::Failed);
  assert_eq!(run.traces.len(), 1);
  assert_eq!(run.traces[0].name, "resolve_dns");
}

#[test]
fn nested_tool_code_recovers_the_ambient_invoker() {
  let harness = Harness::new();
  let scope = ToolInvoker::start(
    InvokerConfig::new("flow").with_run_id("run1"),
    harness.tracker.clone(),
    harness.cache.clone(),
    harness.tracer.clone(),
  );

  let tool = ResolvedTool::new(
    ToolIdent::new("introspect"),
    ToolFunc::sync(|_args: &ToolArgs| {
      let ambient = ToolInvoker::active().expect("invoker should be active");
      Ok(json!(ambient.run_id()))
    }),
  );

  let result = scope
    .invoker()
    .invoke_tool(&Node::new("introspect"), &tool, &ToolArgs::new())
    .unwrap();
  assert_eq!(result, json!("run1"));

  drop(scope);
  assert!(ToolInvoker::active().is_none());
}

#[test]
fn invocation_refreshes_the_operation_context() {
  let harness = Harness::new();
  let invoker = harness.invoker(
    InvokerConfig::new("flow")
      .with_run_id("run1")
      .with_flow_id("flowA"),
  );
  let counter = Arc::new(AtomicUsize::new(0));

  invoker
    .invoke_tool(&Node::new("double"), &doubling_tool(counter), &args(&[("x", json!(1))]))
    .unwrap();

  assert_eq!(operation_context_value(FLOW_ID_KEY).as_deref(), Some("flowA"));
}

#[test]
fn concurrent_rows_track_and_persist_independently() {
  let harness = Harness::new();
  let mut handles = Vec::new();
  for line in 0..4 {
    let invoker = harness.invoker(
      InvokerConfig::new("flow")
        .with_run_id("run1")
        .with_line_number(line),
    );
    handles.push(std::thread::spawn(move || {
      let counter = Arc::new(AtomicUsize::new(0));
      invoker
        .invoke_tool(
          &Node::new("double"),
          &doubling_tool(counter),
          &args(&[("x", json!(line as i64))]),
        )
        .unwrap()
    }));
  }

  let results: Vec<Value> = handles.into_iter().map(|h| h.join().unwrap()).collect();
  assert_eq!(results.len(), 4);
  assert_eq!(harness.store.len(), 4);
  for line in 0..4 {
    let run = harness.store.get(&format!("run1_double_{line}")).unwrap();
    assert_eq!(run.result, Some(json!(line as i64 * 2)));
  }
}
