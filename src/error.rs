use thiserror::Error;

/// Errors surfaced by the `worker_orchestra` pool manager.
///
/// Duplicate starts and stops for unknown pools are not errors: the manager
/// API is command-style, so those are logged by the control loop and ignored.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ManagerError {
  #[error("Manager is shutting down or already shut down, cannot accept new commands")]
  ShuttingDown,

  #[error("Manager command queue is full")]
  CommandQueueFull,

  #[error("Manager control loop is already running or has already run")]
  AlreadyRunning,

  #[error("Manager shutdown was already requested")]
  AlreadyShutDown,

  #[error("Shutdown timed out with {pending} pool(s) still running")]
  ShutdownTimedOut { pending: usize },
}
