//! Deterministic content fingerprints for node invocations.
//!
//! Same (flow id, tool identity, arguments) always produces the same
//! fingerprint. Arguments are sorted by name before hashing; `HashMap`
//! iteration order never reaches the hasher.

use std::collections::BTreeMap;

use rillflow_contracts::{ToolArgs, ToolIdent};

/// blake3 fingerprint of one invocation, hex encoded.
///
/// Returns `None` when an argument value cannot be serialized.
pub fn calculate_fingerprint(flow_id: &str, tool: &ToolIdent, args: &ToolArgs) -> Option<String> {
  let sorted: BTreeMap<&str, &serde_json::Value> =
    args.iter().map(|(name, value)| (name.as_str(), value)).collect();

  let mut hasher = blake3::Hasher::new();
  hasher.update(flow_id.as_bytes());
  hasher.update(b"\0");
  hasher.update(tool.function.as_bytes());
  hasher.update(b"\0");
  if let Some(module) = &tool.module {
    hasher.update(module.as_bytes());
  }
  hasher.update(b"\0");
  for (name, value) in sorted {
    hasher.update(name.as_bytes());
    hasher.update(b"=");
    hasher.update(&serde_json::to_vec(value).ok()?);
    hasher.update(b"\0");
  }
  Some(hasher.finalize().to_hex().to_string())
}
