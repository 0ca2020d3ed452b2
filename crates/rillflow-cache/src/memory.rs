//! In-memory cache manager.

use std::collections::HashMap;
use std::sync::RwLock;

use rillflow_contracts::{RunInfo, ToolArgs, ToolIdent};

use crate::{CacheError, CacheInfo, CacheManager, CacheResult, calculate_fingerprint};

/// A cached entry: the result plus the run that produced it.
#[derive(Debug, Clone)]
struct CachedEntry {
  result: Option<serde_json::Value>,
  run_id: String,
  flow_run_id: String,
}

/// Caches node results in memory, keyed by fingerprint.
#[derive(Default)]
pub struct InMemoryCache {
  entries: RwLock<HashMap<String, CachedEntry>>,
}

impl InMemoryCache {
  pub fn new() -> Self {
    Self::default()
  }

  /// Number of cached entries.
  pub fn len(&self) -> usize {
    self.entries.read().unwrap().len()
  }

  pub fn is_empty(&self) -> bool {
    self.entries.read().unwrap().is_empty()
  }
}

impl CacheManager for InMemoryCache {
  fn calculate_cache_info(
    &self,
    flow_id: &str,
    tool: &ToolIdent,
    args: &ToolArgs,
  ) -> Option<CacheInfo> {
    calculate_fingerprint(flow_id, tool, args).map(|hash_id| CacheInfo { hash_id })
  }

  fn get_cache_result(&self, info: &CacheInfo) -> CacheResult {
    if !info.is_valid() {
      return CacheResult::miss();
    }
    let entries = self.entries.read().unwrap();
    match entries.get(&info.hash_id) {
      Some(entry) => CacheResult {
        hit_cache: true,
        result: entry.result.clone(),
        cached_run_id: Some(entry.run_id.clone()),
        cached_flow_run_id: Some(entry.flow_run_id.clone()),
      },
      None => CacheResult::miss(),
    }
  }

  fn persist_result(
    &self,
    run: &RunInfo,
    info: &CacheInfo,
    flow_id: &str,
  ) -> Result<(), CacheError> {
    if !info.is_valid() {
      return Ok(());
    }
    let mut entries = self.entries.write().unwrap();
    entries.insert(
      info.hash_id.clone(),
      CachedEntry {
        result: run.result.clone(),
        run_id: run.run_id.clone(),
        flow_run_id: flow_id.to_string(),
      },
    );
    Ok(())
  }
}

#[cfg(test)]
mod tests {
  use chrono::Utc;
  use rillflow_contracts::RunStatus;
  use serde_json::json;

  use super::*;

  fn completed_run(run_id: &str, result: serde_json::Value) -> RunInfo {
    RunInfo {
      run_id: run_id.to_string(),
      node: "double".to_string(),
      flow_run_id: "flow_run".to_string(),
      parent_run_id: "flow_run".to_string(),
      index: None,
      variant_id: None,
      inputs: HashMap::new(),
      result: Some(result),
      error: None,
      cached_run_id: None,
      cached_flow_run_id: None,
      hit_cache: false,
      traces: Vec::new(),
      status: RunStatus::Completed,
      start_time: Utc::now(),
      end_time: Some(Utc::now()),
    }
  }

  #[test]
  fn lookup_after_persist_hits_with_provenance() {
    let cache = InMemoryCache::new();
    let tool = ToolIdent::new("double");
    let args = ToolArgs::from([("x".to_string(), json!(2))]);

    let info = cache.calculate_cache_info("flow1", &tool, &args).unwrap();
    assert!(!cache.get_cache_result(&info).hit_cache);

    cache
      .persist_result(&completed_run("run1_double_0", json!(4)), &info, "flow1")
      .unwrap();

    let hit = cache.get_cache_result(&info);
    assert!(hit.hit_cache);
    assert_eq!(hit.result, Some(json!(4)));
    assert_eq!(hit.cached_run_id.as_deref(), Some("run1_double_0"));
    assert_eq!(hit.cached_flow_run_id.as_deref(), Some("flow1"));
  }

  #[test]
  fn empty_fingerprint_is_never_stored() {
    let cache = InMemoryCache::new();
    let info = CacheInfo {
      hash_id: String::new(),
    };
    cache
      .persist_result(&completed_run("run1_double_0", json!(4)), &info, "flow1")
      .unwrap();
    assert!(cache.is_empty());
    assert!(!cache.get_cache_result(&info).hit_cache);
  }
}
