use crate::pool::{Pool, PoolType};

use std::fmt;
use std::sync::Arc;

use tokio::sync::oneshot;

/// Administrative request consumed exactly once by the manager's control loop.
pub(crate) enum Command {
  Start {
    name: String,
    pool_type: PoolType,
    pool: Arc<dyn Pool>,
  },
  Stop {
    name: String,
  },
  /// Acknowledged once every command queued before it has been processed.
  Sync { ack: oneshot::Sender<()> },
}

impl fmt::Debug for Command {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      Command::Start { name, pool_type, .. } => f
        .debug_struct("Start")
        .field("name", name)
        .field("pool_type", pool_type)
        .finish_non_exhaustive(),
      Command::Stop { name } => f.debug_struct("Stop").field("name", name).finish(),
      Command::Sync { .. } => f.debug_struct("Sync").finish_non_exhaustive(),
    }
  }
}
