//! Ready-made [`Pool`] implementations.
//!
//! [`FnPool`] turns an async closure into a pool. [`IntervalPool`] runs a job
//! on a fixed period until it is cancelled, the shape used by periodic
//! pollers and job schedulers.

use crate::pool::{Pool, PoolFuture};
use crate::tracker::CompletionToken;

use std::fmt;
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// A pool backed by an async closure.
///
/// The closure receives the pool's cancellation token and is expected to
/// return once the token is cancelled. Completion is recorded when the
/// returned future finishes.
pub struct FnPool<F> {
  body: F,
}

impl<F, Fut> FnPool<F>
where
  F: Fn(CancellationToken) -> Fut + Send + Sync + 'static,
  Fut: Future<Output = ()> + Send + 'static,
{
  pub fn new(body: F) -> Arc<Self> {
    Arc::new(Self { body })
  }
}

impl<F, Fut> Pool for FnPool<F>
where
  F: Fn(CancellationToken) -> Fut + Send + Sync + 'static,
  Fut: Future<Output = ()> + Send + 'static,
{
  fn start(self: Arc<Self>, token: CancellationToken, completion: CompletionToken) -> PoolFuture {
    Box::pin(async move {
      (self.body)(token).await;
      completion.done();
    })
  }
}

impl<F> fmt::Debug for FnPool<F> {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("FnPool").finish_non_exhaustive()
  }
}

/// Runs `job` every `period` until cancelled.
///
/// The first run happens one period after start and missed ticks are
/// skipped. A failing job is logged and the schedule continues. A job still
/// running when cancellation arrives is dropped.
pub struct IntervalPool<F> {
  name: String,
  period: Duration,
  job: F,
  run_count: AtomicU64,
  failure_count: AtomicU64,
}

impl<F, Fut, E> IntervalPool<F>
where
  F: Fn() -> Fut + Send + Sync + 'static,
  Fut: Future<Output = Result<(), E>> + Send + 'static,
  E: fmt::Display + Send + 'static,
{
  pub fn new(name: &str, period: Duration, job: F) -> Arc<Self> {
    Arc::new(Self {
      name: name.to_string(),
      period: period.max(Duration::from_millis(1)),
      job,
      run_count: AtomicU64::new(0),
      failure_count: AtomicU64::new(0),
    })
  }

  pub fn name(&self) -> &str {
    &self.name
  }

  pub fn period(&self) -> Duration {
    self.period
  }

  /// Number of job runs started so far.
  pub fn run_count(&self) -> u64 {
    self.run_count.load(Ordering::Acquire)
  }

  /// Number of job runs that returned an error.
  pub fn failure_count(&self) -> u64 {
    self.failure_count.load(Ordering::Acquire)
  }
}

impl<F, Fut, E> Pool for IntervalPool<F>
where
  F: Fn() -> Fut + Send + Sync + 'static,
  Fut: Future<Output = Result<(), E>> + Send + 'static,
  E: fmt::Display + Send + 'static,
{
  fn start(self: Arc<Self>, token: CancellationToken, completion: CompletionToken) -> PoolFuture {
    Box::pin(async move {
      let _completion = completion;
      let mut ticker = interval_at(Instant::now() + self.period, self.period);
      ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
      info!(scheduler = %self.name, period = ?self.period, "Interval pool starting.");

      loop {
        tokio::select! {
          biased;
          _ = token.cancelled() => break,
          _ = ticker.tick() => {
            let run = self.run_count.fetch_add(1, Ordering::AcqRel) + 1;
            debug!(scheduler = %self.name, run, "Ticker fired, running job.");

            tokio::select! {
              biased;
              _ = token.cancelled() => {
                warn!(scheduler = %self.name, run, "Cancelled while job was running; abandoning it.");
                break;
              }
              result = (self.job)() => {
                if let Err(job_error) = result {
                  self.failure_count.fetch_add(1, Ordering::AcqRel);
                  error!(scheduler = %self.name, run, error = %job_error, "Scheduled job failed.");
                }
              }
            }
          }
        }
      }

      info!(scheduler = %self.name, runs = self.run_count(), "Interval pool shutting down.");
    })
  }
}

impl<F> fmt::Debug for IntervalPool<F> {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("IntervalPool")
      .field("name", &self.name)
      .field("period", &self.period)
      .field("run_count", &self.run_count.load(Ordering::Relaxed))
      .finish_non_exhaustive()
  }
}
