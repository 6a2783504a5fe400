use crate::command::Command;
use crate::config::ManagerConfig;
use crate::error::ManagerError;
use crate::pool::{Pool, PoolType};
use crate::registry::{PoolInfo, PoolRegistry, RegistryEntry};
use crate::tracker::CompletionTracker;

use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering as AtomicOrdering};
use std::sync::Arc;
use std::time::Instant;

use futures::FutureExt;
use parking_lot::Mutex;
use tokio::runtime::Handle as TokioHandle;
use tokio::sync::mpsc::{self, error::TrySendError};
use tokio::sync::oneshot;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, info_span, trace, warn, Instrument};

/// Lifecycle of a [`PoolManager`]. States only ever move forward.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum ManagerState {
  /// Constructed, control loop not started yet.
  Idle,
  /// Control loop is processing commands.
  Running,
  /// Shutdown requested; pools have been told to stop.
  ShuttingDown,
  /// Shutdown finished. Terminal.
  Stopped,
}

/// Supervisor for named, long-running worker pools.
///
/// All registry mutations happen on a single control loop (`run`) fed by a
/// bounded command queue, so commands are applied strictly in submission
/// order. `start_pool`/`stop_pool` only enqueue; duplicate starts and stops
/// of unknown pools are logged and ignored by the loop.
pub struct PoolManager {
  name: Arc<String>,
  config: ManagerConfig,
  tokio_handle: TokioHandle,
  root_token: CancellationToken,
  command_tx: mpsc::Sender<Command>,
  command_rx: Mutex<Option<mpsc::Receiver<Command>>>,
  registry: PoolRegistry,
  tracker: CompletionTracker,
  state: Mutex<ManagerState>,
  loop_stopped: CancellationToken,
  shutdown_requested: AtomicBool,
  next_run_id: AtomicU64,
}

impl PoolManager {
  /// Builds the manager, its root cancellation token, registry and command
  /// queue. The control loop is not started; spawn [`PoolManager::run`].
  pub fn new(config: ManagerConfig, tokio_handle: TokioHandle) -> Arc<Self> {
    let (tx, rx) = mpsc::channel(config.command_queue_capacity.max(1));

    Arc::new(Self {
      name: Arc::new(config.name.clone()),
      config,
      tokio_handle,
      root_token: CancellationToken::new(),
      command_tx: tx,
      command_rx: Mutex::new(Some(rx)),
      registry: PoolRegistry::new(),
      tracker: CompletionTracker::new(),
      state: Mutex::new(ManagerState::Idle),
      loop_stopped: CancellationToken::new(),
      shutdown_requested: AtomicBool::new(false),
      next_run_id: AtomicU64::new(0),
    })
  }

  pub fn name(&self) -> &str {
    &self.name
  }

  pub fn config(&self) -> &ManagerConfig {
    &self.config
  }

  pub fn state(&self) -> ManagerState {
    *self.state.lock()
  }

  /// Number of names currently registered.
  pub fn registered_pool_count(&self) -> usize {
    self.registry.len()
  }

  /// Number of spawned pools whose `start` future has not returned yet.
  ///
  /// Includes pools that were stopped but are still winding down.
  pub fn live_pool_count(&self) -> usize {
    self.tracker.len()
  }

  /// Returns the current number of commands waiting in the queue.
  pub fn queued_command_count(&self) -> usize {
    self.command_tx.max_capacity() - self.command_tx.capacity()
  }

  /// Registered pool names, sorted.
  pub fn pool_names(&self) -> Vec<String> {
    self.registry.names()
  }

  pub fn pool_info(&self, name: &str) -> Option<PoolInfo> {
    self.registry.info(name)
  }

  /// Synchronous lookup of a registered pool. Never touches the command queue.
  pub fn get_pool(&self, name: &str) -> Option<Arc<dyn Pool>> {
    self.registry.get_pool(name)
  }

  /// A token that is cancelled when the manager shuts down.
  ///
  /// Intended for collaborators (schedulers, auto-savers) that are not pools
  /// but must stop with the manager. Cancelling it has no effect on the manager.
  pub fn shutdown_signal(&self) -> CancellationToken {
    self.root_token.child_token()
  }

  /// Enqueues a start command for `name`.
  ///
  /// Waits while the command queue is full. Returns once the command is
  /// queued, not once the pool is running.
  ///
  /// # Errors
  /// Returns `ManagerError::ShuttingDown` if shutdown has begun.
  pub async fn start_pool(&self, name: &str, pool: Arc<dyn Pool>, pool_type: &str) -> Result<(), ManagerError> {
    debug!(manager = %self.name, pool_name = %name, %pool_type, "Submitting start command.");
    self
      .send_command(Command::Start {
        name: name.to_string(),
        pool_type: pool_type.to_string(),
        pool,
      })
      .await
  }

  /// Enqueues a stop command for `name`.
  ///
  /// # Errors
  /// Returns `ManagerError::ShuttingDown` if shutdown has begun.
  pub async fn stop_pool(&self, name: &str) -> Result<(), ManagerError> {
    debug!(manager = %self.name, pool_name = %name, "Submitting stop command.");
    self.send_command(Command::Stop { name: name.to_string() }).await
  }

  /// Non-blocking [`PoolManager::start_pool`].
  ///
  /// # Errors
  /// Returns `ManagerError::CommandQueueFull` instead of waiting for space.
  pub fn try_start_pool(&self, name: &str, pool: Arc<dyn Pool>, pool_type: &str) -> Result<(), ManagerError> {
    self.try_send_command(Command::Start {
      name: name.to_string(),
      pool_type: pool_type.to_string(),
      pool,
    })
  }

  /// Non-blocking [`PoolManager::stop_pool`].
  pub fn try_stop_pool(&self, name: &str) -> Result<(), ManagerError> {
    self.try_send_command(Command::Stop { name: name.to_string() })
  }

  /// Resolves once every command submitted before this call has been processed.
  ///
  /// Requires the control loop to be running.
  pub async fn sync(&self) -> Result<(), ManagerError> {
    let (ack_tx, ack_rx) = oneshot::channel();
    self.send_command(Command::Sync { ack: ack_tx }).await?;
    // The loop drops unprocessed acks when it halts.
    ack_rx.await.map_err(|_| ManagerError::ShuttingDown)
  }

  /// Runs the control loop until shutdown is requested.
  ///
  /// Must be called once, typically on its own task:
  /// `tokio::spawn(async move { manager.run().await })`.
  ///
  /// # Errors
  /// `ManagerError::AlreadyRunning` on a second call, and
  /// `ManagerError::ShuttingDown` if shutdown began before the loop started.
  pub async fn run(&self) -> Result<(), ManagerError> {
    let command_rx = {
      let mut guard = self.command_rx.lock();
      match guard.take() {
        Some(rx) => rx,
        None if self.shutdown_requested.load(AtomicOrdering::SeqCst) => {
          warn!(manager = %self.name, "Run called after shutdown was requested.");
          return Err(ManagerError::ShuttingDown);
        }
        None => {
          warn!(manager = %self.name, "Run called while the control loop is already running or has run.");
          return Err(ManagerError::AlreadyRunning);
        }
      }
    };

    // Shutdown waits on this; cancelled on every exit path, including the
    // run future being dropped.
    let _loop_stopped_guard = self.loop_stopped.clone().drop_guard();

    self
      .run_control_loop(command_rx)
      .instrument(info_span!("pool_manager_loop", manager = %self.name))
      .await;
    Ok(())
  }

  /// Tears the manager down in this order: cancel the root token, wait for
  /// the control loop to halt (it broadcasts cancellation to every pool and
  /// closes the command queue on its way out), then wait for every pool ever
  /// spawned to return. If the loop never ran, the queue is closed here
  /// instead.
  ///
  /// Without a configured `shutdown_timeout` this waits for as long as a
  /// pool takes to observe its cancellation, which is forever for a pool
  /// that ignores it.
  ///
  /// # Errors
  /// `ManagerError::AlreadyShutDown` if called more than once, and
  /// `ManagerError::ShutdownTimedOut` if the configured timeout elapsed.
  pub async fn shutdown(&self) -> Result<(), ManagerError> {
    if self.shutdown_requested.swap(true, AtomicOrdering::SeqCst) {
      warn!(manager = %self.name, "Shutdown already requested; ignoring repeated call.");
      return Err(ManagerError::AlreadyShutDown);
    }

    info!(manager = %self.name, "Initiating shutdown.");
    self.advance_state(ManagerState::ShuttingDown);
    self.root_token.cancel();

    let unstarted_rx = self.command_rx.lock().take();
    match unstarted_rx {
      Some(mut rx) => {
        debug!(manager = %self.name, "Control loop was never started; closing command queue.");
        rx.close();
      }
      None => {
        info!(manager = %self.name, "Waiting for control loop to halt.");
        self.loop_stopped.cancelled().await;
      }
    }

    // No pool can be spawned past this point.
    self.tracker.close();
    info!(manager = %self.name, live_pools = self.tracker.len(), "Waiting for pools to finish.");

    let outcome = match self.config.shutdown_timeout {
      Some(limit) => match tokio::time::timeout(limit, self.tracker.wait()).await {
        Ok(()) => Ok(()),
        Err(_) => {
          let pending = self.tracker.len();
          error!(
            manager = %self.name,
            pending,
            timeout = ?limit,
            "Shutdown timed out. Abandoning pools that did not observe cancellation."
          );
          Err(ManagerError::ShutdownTimedOut { pending })
        }
      },
      None => {
        self.tracker.wait().await;
        Ok(())
      }
    };

    self.advance_state(ManagerState::Stopped);
    info!(manager = %self.name, "Shutdown complete.");
    outcome
  }

  async fn send_command(&self, command: Command) -> Result<(), ManagerError> {
    if self.root_token.is_cancelled() || self.command_tx.is_closed() {
      warn!(manager = %self.name, ?command, "Attempted to submit command to a manager that is shutting down.");
      return Err(ManagerError::ShuttingDown);
    }

    tokio::select! {
      biased;
      _ = self.root_token.cancelled() => {
        debug!(manager = %self.name, "Shutdown began while waiting for command queue space.");
        Err(ManagerError::ShuttingDown)
      }
      send_result = self.command_tx.send(command) => {
        send_result.map_err(|send_error| {
          warn!(manager = %self.name, command = ?send_error.0, "Command queue closed before the command was accepted.");
          ManagerError::ShuttingDown
        })
      }
    }
  }

  fn try_send_command(&self, command: Command) -> Result<(), ManagerError> {
    if self.root_token.is_cancelled() {
      return Err(ManagerError::ShuttingDown);
    }
    match self.command_tx.try_send(command) {
      Ok(()) => Ok(()),
      Err(TrySendError::Full(command)) => {
        debug!(manager = %self.name, ?command, "Command queue full.");
        Err(ManagerError::CommandQueueFull)
      }
      Err(TrySendError::Closed(_)) => Err(ManagerError::ShuttingDown),
    }
  }

  async fn run_control_loop(&self, mut command_rx: mpsc::Receiver<Command>) {
    self.advance_state(ManagerState::Running);
    info!(manager = %self.name, "Control loop running.");

    loop {
      tokio::select! {
        maybe_command = command_rx.recv() => {
          match maybe_command {
            Some(command) => self.handle_command(command),
            None => {
              info!(manager = %self.name, "Command queue closed. Control loop terminating.");
              break;
            }
          }
        }
        _ = self.root_token.cancelled() => {
          self.advance_state(ManagerState::ShuttingDown);
          info!(manager = %self.name, "Shutdown signal received. Stopping all pools.");
          let signaled = self.registry.cancel_all();
          info!(manager = %self.name, signaled, "Cancellation broadcast to registered pools.");
          break;
        }
      }
    }

    command_rx.close();
    while let Ok(command) = command_rx.try_recv() {
      debug!(manager = %self.name, ?command, "Discarding command queued after shutdown.");
    }
    info!(manager = %self.name, "Control loop halted.");
  }

  fn handle_command(&self, command: Command) {
    trace!(manager = %self.name, ?command, "Processing command.");
    match command {
      Command::Start { name, pool_type, pool } => self.spawn_pool(name, pool_type, pool),
      Command::Stop { name } => self.stop_registered_pool(&name),
      Command::Sync { ack } => {
        if ack.send(()).is_err() {
          trace!(manager = %self.name, "Sync requester went away before acknowledgement.");
        }
      }
    }
  }

  fn spawn_pool(&self, name: String, pool_type: PoolType, pool: Arc<dyn Pool>) {
    let run_id = self.next_run_id.fetch_add(1, AtomicOrdering::Relaxed);
    let pool_token = self.root_token.child_token();
    let finished = Arc::new(AtomicBool::new(false));

    let entry = RegistryEntry {
      pool: pool.clone(),
      pool_type: pool_type.clone(),
      cancel: pool_token.clone(),
      run_id,
      started_at: Instant::now(),
      finished: finished.clone(),
    };
    if let Err(rejected) = self.registry.insert_if_absent(&name, entry) {
      warn!(
        manager = %self.name,
        pool_name = %name,
        %pool_type,
        existing = ?self.registry.info(&name).map(|info| info.run_id),
        rejected_run_id = rejected.run_id,
        "Pool already exists; ignoring start."
      );
      return;
    }

    let completion = self.tracker.token();
    info!(manager = %self.name, pool_name = %name, %pool_type, %run_id, "Starting pool.");

    let manager_name = self.name.clone();
    let pool_name = name.clone();
    self.tokio_handle.spawn(
      async move {
        let outcome = AssertUnwindSafe(async move { pool.start(pool_token, completion).await })
          .catch_unwind()
          .await;
        finished.store(true, AtomicOrdering::Release);
        match outcome {
          Ok(()) => debug!(manager = %manager_name, pool_name = %pool_name, %run_id, "Pool returned."),
          Err(_panic_payload) => {
            error!(manager = %manager_name, pool_name = %pool_name, %run_id, "Pool panicked. Its completion was still recorded.")
          }
        }
      }
      .instrument(info_span!("managed_pool", pool_name = %name, %pool_type, %run_id)),
    );
  }

  fn stop_registered_pool(&self, name: &str) {
    match self.registry.remove(name) {
      Some(entry) => {
        info!(manager = %self.name, pool_name = %name, run_id = entry.run_id, "Stopping pool.");
        entry.cancel.cancel();
      }
      None => warn!(manager = %self.name, pool_name = %name, "Pool not found; ignoring stop."),
    }
  }

  fn advance_state(&self, next: ManagerState) {
    let mut state = self.state.lock();
    if next > *state {
      trace!(manager = %self.name, from = ?*state, to = ?next, "Manager state transition.");
      *state = next;
    }
  }
}

impl std::fmt::Debug for PoolManager {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    f.debug_struct("PoolManager")
      .field("name", &self.name)
      .field("state", &self.state())
      .field("registered", &self.registry.len())
      .field("live", &self.tracker.len())
      .finish_non_exhaustive()
  }
}

impl Drop for PoolManager {
  fn drop(&mut self) {
    if !self.root_token.is_cancelled() {
      // No waiting here: pools are signalled and left to wind down on their own.
      info!(
        manager = %*self.name,
        "PoolManager dropped without shutdown. Cancelling all pools."
      );
      self.root_token.cancel();
    } else {
      trace!(manager = %*self.name, "Drop: Shutdown already in progress or completed.");
    }
  }
}
