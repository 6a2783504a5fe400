use crate::tracker::CompletionToken;

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use tokio_util::sync::CancellationToken;

/// A descriptive classification for a pool, e.g. [`POOL_TYPE_WORKING`].
///
/// Carried for observability only; the manager never branches on it.
pub type PoolType = String;

/// Pool type used for queue-consuming worker pools.
pub const POOL_TYPE_WORKING: &str = "working";

/// The future returned by [`Pool::start`].
pub type PoolFuture = Pin<Box<dyn Future<Output = ()> + Send + 'static>>;

/// A unit of long-running concurrent work that the manager can supervise.
///
/// The manager spawns the returned future as its own task. Implementations
/// must watch `token` and return promptly once it is cancelled; cancellation
/// is cooperative and the manager never aborts a pool. `completion` must be
/// released (via [`CompletionToken::done`] or by dropping it) when the pool
/// finishes. Dropping it at the end of the future is enough.
pub trait Pool: Send + Sync + 'static {
  fn start(self: Arc<Self>, token: CancellationToken, completion: CompletionToken) -> PoolFuture;
}
