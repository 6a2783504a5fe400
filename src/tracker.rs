use std::fmt;

use tokio_util::task::task_tracker::{TaskTracker, TaskTrackerToken};

/// Counts running pools so that shutdown can wait for all of them.
///
/// The manager takes a [`CompletionToken`] before spawning each pool and
/// hands it to the pool. The count drops when the token is released.
#[derive(Clone)]
pub(crate) struct CompletionTracker {
  inner: TaskTracker,
}

impl CompletionTracker {
  pub(crate) fn new() -> Self {
    Self {
      inner: TaskTracker::new(),
    }
  }

  pub(crate) fn token(&self) -> CompletionToken {
    CompletionToken {
      _token: self.inner.token(),
    }
  }

  /// Marks the tracker as closed. `wait` only resolves once closed and empty.
  pub(crate) fn close(&self) -> bool {
    self.inner.close()
  }

  pub(crate) fn is_closed(&self) -> bool {
    self.inner.is_closed()
  }

  pub(crate) fn len(&self) -> usize {
    self.inner.len()
  }

  pub(crate) async fn wait(&self) {
    self.inner.wait().await
  }
}

impl fmt::Debug for CompletionTracker {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("CompletionTracker")
      .field("live", &self.len())
      .field("closed", &self.is_closed())
      .finish()
  }
}

/// A pool's share of the manager's completion tracker.
///
/// Every pool receives exactly one token and must release it when its `start`
/// future finishes. Releasing happens either through [`CompletionToken::done`]
/// or by dropping the token, so every exit path (including a panic) counts
/// exactly once.
pub struct CompletionToken {
  _token: TaskTrackerToken,
}

impl CompletionToken {
  /// Signals that the pool has finished.
  pub fn done(self) {
    drop(self);
  }
}

impl fmt::Debug for CompletionToken {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("CompletionToken").finish_non_exhaustive()
  }
}
