use std::time::Duration;

/// Capacity of the command queue when none is configured.
pub const DEFAULT_COMMAND_QUEUE_CAPACITY: usize = 10;

/// Construction-time settings for a [`PoolManager`](crate::PoolManager).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ManagerConfig {
  /// Name used in every log line emitted by the manager.
  pub name: String,
  /// Bound of the administrative command queue. Submissions wait while it is full.
  pub command_queue_capacity: usize,
  /// Upper bound on how long `shutdown` waits for pools to return.
  ///
  /// `None` waits forever: a pool that never observes its cancellation token
  /// will hang shutdown.
  pub shutdown_timeout: Option<Duration>,
}

impl ManagerConfig {
  pub fn new(name: &str) -> Self {
    Self {
      name: name.to_string(),
      ..Self::default()
    }
  }

  pub fn with_command_queue_capacity(mut self, capacity: usize) -> Self {
    self.command_queue_capacity = capacity.max(1);
    self
  }

  pub fn with_shutdown_timeout(mut self, timeout: Duration) -> Self {
    self.shutdown_timeout = Some(timeout);
    self
  }
}

impl Default for ManagerConfig {
  fn default() -> Self {
    Self {
      name: "pool_manager".to_string(),
      command_queue_capacity: DEFAULT_COMMAND_QUEUE_CAPACITY,
      shutdown_timeout: None,
    }
  }
}
