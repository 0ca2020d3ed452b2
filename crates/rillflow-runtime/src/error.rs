//! Invocation errors and failure classification.

use rillflow_contracts::{ErrorCause, RunErrorInfo};
use rillflow_store::StoreError;

use crate::tool::ToolFailure;

/// A pre-classified failure from the platform or a built-in capability.
///
/// The cause tag is decided where the error is constructed and travels with
/// the error unchanged through the invoker.
#[derive(Debug, thiserror::Error)]
#[error("{message}")]
pub struct FlowError {
  pub message: String,
  pub cause: ErrorCause,
  /// Module the failure is attributed to, filled in by the invoker.
  pub module: Option<String>,
}

impl FlowError {
  /// A failure of the platform or a built-in capability.
  pub fn system(message: impl Into<String>) -> Self {
    Self {
      message: message.into(),
      cause: ErrorCause::System,
      module: None,
    }
  }

  /// A failure attributed to user configuration or user code.
  pub fn user(message: impl Into<String>) -> Self {
    Self {
      message: message.into(),
      cause: ErrorCause::User,
      module: None,
    }
  }
}

/// Errors that can leave a node invocation.
#[derive(Debug, thiserror::Error)]
pub enum InvokeError {
  /// Pre-classified domain error, propagated unchanged.
  #[error(transparent)]
  Flow(#[from] FlowError),

  /// User tool code failed with an unclassified error.
  #[error("execution failure in tool of node '{node_name}'")]
  ToolExecution {
    node_name: String,
    module: Option<String>,
    #[source]
    source: Box<dyn std::error::Error + Send + Sync>,
  },

  /// An invoke entry point was given a callable of the wrong flavor.
  #[error("tool '{function}' in node '{node_name}' is not {expected} function")]
  UnexpectedInvocation {
    node_name: String,
    function: String,
    expected: &'static str,
  },

  /// Persisting the run record failed.
  #[error("failed to persist run '{run_id}'")]
  Persistence {
    run_id: String,
    #[source]
    source: StoreError,
  },
}

impl InvokeError {
  /// Who caused the failure.
  pub fn cause(&self) -> ErrorCause {
    match self {
      InvokeError::Flow(e) => e.cause,
      InvokeError::ToolExecution { .. } => ErrorCause::User,
      InvokeError::UnexpectedInvocation { .. } => ErrorCause::System,
      InvokeError::Persistence { .. } => ErrorCause::System,
    }
  }

  /// Module the failure is attributed to, when known.
  pub fn module(&self) -> Option<&str> {
    match self {
      InvokeError::Flow(e) => e.module.as_deref(),
      InvokeError::ToolExecution { module, .. } => module.as_deref(),
      _ => None,
    }
  }

  /// Serializable snapshot recorded on the failed run.
  pub fn to_run_error(&self) -> RunErrorInfo {
    let message = match self {
      InvokeError::ToolExecution { source, .. } => format!("{self}: {source}"),
      _ => self.to_string(),
    };
    RunErrorInfo {
      message,
      cause: self.cause(),
      module: self.module().map(str::to_string),
    }
  }
}

/// Classify a failure raised by a tool callable.
///
/// Pre-classified flow errors keep their classification and gain module
/// attribution; everything else becomes a user-caused tool execution error
/// with the original failure chained as its source.
pub(crate) fn classify_failure(
  node_name: &str,
  module: Option<&str>,
  failure: ToolFailure,
) -> InvokeError {
  match failure {
    ToolFailure::Flow(mut e) => {
      if module.is_some() {
        e.module = module.map(str::to_string);
      }
      InvokeError::Flow(e)
    }
    ToolFailure::User(source) => InvokeError::ToolExecution {
      node_name: node_name.to_string(),
      module: module.map(str::to_string),
      source,
    },
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn flow_errors_keep_their_classification() {
    let failure = ToolFailure::from(FlowError::system("quota exceeded"));
    let classified = classify_failure("fetch", Some("tools.web"), failure);
    match classified {
      InvokeError::Flow(e) => {
        assert_eq!(e.cause, ErrorCause::System);
        assert_eq!(e.module.as_deref(), Some("tools.web"));
        assert_eq!(e.message, "quota exceeded");
      }
      other => panic!("expected flow error, got {other:?}"),
    }
  }

  #[test]
  fn unclassified_errors_become_user_tool_failures() {
    let failure = ToolFailure::user("index out of range");
    let classified = classify_failure("parse", Some("tools.parse"), failure);
    assert_eq!(classified.cause(), ErrorCause::User);
    assert!(classified.to_string().contains("parse"));
    assert!(std::error::Error::source(&classified).is_some());

    let recorded = classified.to_run_error();
    assert!(recorded.message.contains("index out of range"));
    assert_eq!(recorded.module.as_deref(), Some("tools.parse"));
  }
}
