//! Rillflow Cache
//!
//! Cache subsystem contract for the node execution runtime. A cache manager
//! fingerprints (flow id, tool identity, arguments) and can serve a previous
//! run's result for an identical invocation.
//!
//! The invoker treats the fingerprint as opaque beyond a validity check and
//! never fails a node because a cache write failed.

mod fingerprint;
mod memory;

pub use fingerprint::calculate_fingerprint;
pub use memory::InMemoryCache;

use serde::{Deserialize, Serialize};

use rillflow_contracts::{RunInfo, ToolArgs, ToolIdent};

/// Content fingerprint for one invocation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheInfo {
  /// blake3 hex digest; empty means "do not cache".
  pub hash_id: String,
}

impl CacheInfo {
  pub fn is_valid(&self) -> bool {
    !self.hash_id.is_empty()
  }
}

/// Outcome of a cache lookup.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CacheResult {
  pub hit_cache: bool,
  pub result: Option<serde_json::Value>,
  /// Run that originally produced the cached value.
  pub cached_run_id: Option<String>,
  pub cached_flow_run_id: Option<String>,
}

impl CacheResult {
  pub fn miss() -> Self {
    Self::default()
  }
}

/// Error type for cache operations.
#[derive(Debug, thiserror::Error)]
pub enum CacheError {
  /// The backend rejected or failed the operation.
  #[error("cache backend error: {message}")]
  Backend { message: String },
}

/// Cache manager contract consumed by the node invoker.
pub trait CacheManager: Send + Sync {
  /// Compute the fingerprint for an invocation, or `None` when the
  /// invocation cannot be fingerprinted.
  fn calculate_cache_info(
    &self,
    flow_id: &str,
    tool: &ToolIdent,
    args: &ToolArgs,
  ) -> Option<CacheInfo>;

  /// Look up a previous result for the fingerprint.
  fn get_cache_result(&self, info: &CacheInfo) -> CacheResult;

  /// Record a completed run's result under the fingerprint.
  fn persist_result(
    &self,
    run: &RunInfo,
    info: &CacheInfo,
    flow_id: &str,
  ) -> Result<(), CacheError>;
}
