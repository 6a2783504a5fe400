use crate::pool::{Pool, PoolType};

use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::RwLock;
use tokio_util::sync::CancellationToken;
use tracing::debug;

/// Point-in-time view of a registered pool.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PoolInfo {
  pub name: String,
  pub pool_type: PoolType,
  /// Id of the spawn that produced this registration, unique within its manager.
  pub run_id: u64,
  /// Time since the pool was spawned.
  pub uptime: Duration,
  /// `true` once the pool's `start` future has returned, even though the
  /// name stays registered until it is stopped.
  pub finished: bool,
}

pub(crate) struct RegistryEntry {
  pub(crate) pool: Arc<dyn Pool>,
  pub(crate) pool_type: PoolType,
  pub(crate) cancel: CancellationToken,
  pub(crate) run_id: u64,
  pub(crate) started_at: Instant,
  pub(crate) finished: Arc<AtomicBool>,
}

impl RegistryEntry {
  fn info(&self, name: &str) -> PoolInfo {
    PoolInfo {
      name: name.to_string(),
      pool_type: self.pool_type.clone(),
      run_id: self.run_id,
      uptime: self.started_at.elapsed(),
      finished: self.finished.load(Ordering::Acquire),
    }
  }
}

impl fmt::Debug for RegistryEntry {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("RegistryEntry")
      .field("pool_type", &self.pool_type)
      .field("run_id", &self.run_id)
      .field("cancelled", &self.cancel.is_cancelled())
      .field("finished", &self.finished.load(Ordering::Relaxed))
      .finish_non_exhaustive()
  }
}

/// Name-keyed map of running pools and their cancellation tokens.
///
/// Only the control loop writes; it still takes the write lock so that
/// readers outside the loop never observe a half-applied mutation.
#[derive(Debug, Default)]
pub(crate) struct PoolRegistry {
  entries: RwLock<HashMap<String, RegistryEntry>>,
}

impl PoolRegistry {
  pub(crate) fn new() -> Self {
    Self::default()
  }

  /// Registers `entry` under `name` unless the name is taken.
  ///
  /// On conflict the rejected entry is handed back untouched.
  pub(crate) fn insert_if_absent(&self, name: &str, entry: RegistryEntry) -> Result<(), RegistryEntry> {
    let mut guard = self.entries.write();
    if guard.contains_key(name) {
      return Err(entry);
    }
    guard.insert(name.to_string(), entry);
    Ok(())
  }

  pub(crate) fn remove(&self, name: &str) -> Option<RegistryEntry> {
    self.entries.write().remove(name)
  }

  pub(crate) fn get_pool(&self, name: &str) -> Option<Arc<dyn Pool>> {
    self.entries.read().get(name).map(|entry| entry.pool.clone())
  }

  pub(crate) fn info(&self, name: &str) -> Option<PoolInfo> {
    self.entries.read().get(name).map(|entry| entry.info(name))
  }

  pub(crate) fn names(&self) -> Vec<String> {
    let mut names: Vec<String> = self.entries.read().keys().cloned().collect();
    names.sort();
    names
  }

  pub(crate) fn len(&self) -> usize {
    self.entries.read().len()
  }

  /// Cancels every registered pool. Entries are left in place.
  pub(crate) fn cancel_all(&self) -> usize {
    let guard = self.entries.read();
    for (name, entry) in guard.iter() {
      debug!(pool_name = %name, run_id = entry.run_id, "Signaling pool to stop.");
      entry.cancel.cancel();
    }
    guard.len()
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::pool::PoolFuture;
  use crate::tracker::CompletionToken;

  struct IdlePool;

  impl Pool for IdlePool {
    fn start(self: Arc<Self>, token: CancellationToken, completion: CompletionToken) -> PoolFuture {
      Box::pin(async move {
        token.cancelled().await;
        completion.done();
      })
    }
  }

  fn entry(run_id: u64, cancel: CancellationToken) -> RegistryEntry {
    RegistryEntry {
      pool: Arc::new(IdlePool),
      pool_type: "working".to_string(),
      cancel,
      run_id,
      started_at: Instant::now(),
      finished: Arc::new(AtomicBool::new(false)),
    }
  }

  #[test]
  fn test_insert_rejects_duplicate_name() {
    let registry = PoolRegistry::new();
    assert!(registry.insert_if_absent("a", entry(1, CancellationToken::new())).is_ok());

    let rejected = registry
      .insert_if_absent("a", entry(2, CancellationToken::new()))
      .expect_err("Duplicate name must be rejected");
    assert_eq!(rejected.run_id, 2);
    assert_eq!(registry.info("a").unwrap().run_id, 1);
    assert_eq!(registry.len(), 1);
  }

  #[test]
  fn test_remove_and_lookup() {
    let registry = PoolRegistry::new();
    registry.insert_if_absent("b", entry(1, CancellationToken::new())).unwrap();
    registry.insert_if_absent("a", entry(2, CancellationToken::new())).unwrap();
    assert_eq!(registry.names(), vec!["a".to_string(), "b".to_string()]);
    assert!(registry.get_pool("a").is_some());

    let removed = registry.remove("a").unwrap();
    assert_eq!(removed.run_id, 2);
    assert!(registry.get_pool("a").is_none());
    assert!(registry.info("a").is_none());
    assert!(registry.remove("a").is_none());
  }

  #[test]
  fn test_cancel_all_cancels_every_entry() {
    let registry = PoolRegistry::new();
    let first = CancellationToken::new();
    let second = CancellationToken::new();
    registry.insert_if_absent("a", entry(1, first.clone())).unwrap();
    registry.insert_if_absent("b", entry(2, second.clone())).unwrap();

    assert_eq!(registry.cancel_all(), 2);
    assert!(first.is_cancelled());
    assert!(second.is_cancelled());
    assert_eq!(registry.len(), 2);
  }

  #[test]
  fn test_info_reports_finished_flag() {
    let registry = PoolRegistry::new();
    let e = entry(7, CancellationToken::new());
    let finished = e.finished.clone();
    registry.insert_if_absent("a", e).unwrap();
    assert!(!registry.info("a").unwrap().finished);

    finished.store(true, Ordering::Release);
    let info = registry.info("a").unwrap();
    assert!(info.finished);
    assert_eq!(info.pool_type, "working");
    assert_eq!(info.name, "a");
  }
}
