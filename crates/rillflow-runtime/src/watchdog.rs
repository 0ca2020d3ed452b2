//! Elapsed-time monitoring for long-running synchronous tool calls.

use std::sync::mpsc::{self, RecvTimeoutError, Sender};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use tracing::warn;

/// How often an in-flight call is reported.
pub(crate) const LOG_INTERVAL: Duration = Duration::from_secs(60);

/// Logs a warning at a fixed interval while a call is in flight.
///
/// The timer thread stops when the guard is dropped, bounding its lifetime
/// to the wrapped call. Monitoring only: the call is never cancelled.
pub(crate) struct RepeatLogTimer {
  stop: Sender<()>,
  handle: Option<JoinHandle<()>>,
}

impl RepeatLogTimer {
  pub(crate) fn start(logging_name: String, interval: Duration) -> Self {
    let (stop, ticks) = mpsc::channel();
    let started = Instant::now();
    let caller_thread = format!("{:?}", std::thread::current().id());
    let handle = std::thread::spawn(move || {
      loop {
        match ticks.recv_timeout(interval) {
          Err(RecvTimeoutError::Timeout) => {
            warn!(
              name = %logging_name,
              elapsed_secs = started.elapsed().as_secs(),
              thread_id = %caller_thread,
              "tool call still running"
            );
          }
          Ok(()) | Err(RecvTimeoutError::Disconnected) => break,
        }
      }
    });
    Self {
      stop,
      handle: Some(handle),
    }
  }
}

impl Drop for RepeatLogTimer {
  fn drop(&mut self) {
    let _ = self.stop.send(());
    if let Some(handle) = self.handle.take() {
      let _ = handle.join();
    }
  }
}
