use std::time::Duration;

use tokio::runtime::Handle;
use tracing::info;
use worker_orchestra::pools::{FnPool, IntervalPool};
use worker_orchestra::{ManagerConfig, PoolManager, POOL_TYPE_WORKING};

#[tokio::main]
async fn main() {
  tracing_subscriber::fmt()
    .with_max_level(tracing::Level::DEBUG)
    .with_target(false)
    .init();
  info!("--- Supervised Pools Example ---");

  let config = ManagerConfig::new("example_manager").with_shutdown_timeout(Duration::from_secs(5));
  let manager = PoolManager::new(config, Handle::current());

  let loop_manager = manager.clone();
  let loop_handle = tokio::spawn(async move { loop_manager.run().await });

  let consumer = FnPool::new(|token| async move {
    info!("Queue consumer waiting for work.");
    token.cancelled().await;
    info!("Queue consumer draining before exit.");
    tokio::time::sleep(Duration::from_millis(200)).await;
  });

  let poller = IntervalPool::new("weather_poller", Duration::from_millis(300), || async {
    info!("Polling upstream weather data.");
    Ok::<(), String>(())
  });

  manager
    .start_pool("notification_consumer", consumer, POOL_TYPE_WORKING)
    .await
    .expect("manager accepts commands while running");
  manager
    .start_pool("weather_poller", poller.clone(), "polling")
    .await
    .expect("manager accepts commands while running");
  manager.sync().await.expect("control loop is running");
  info!("Registered pools: {:?}", manager.pool_names());

  // Stop after a short demo run or on Ctrl-C, whichever comes first.
  tokio::select! {
    _ = tokio::time::sleep(Duration::from_secs(2)) => info!("Demo period elapsed."),
    _ = tokio::signal::ctrl_c() => info!("Ctrl-C received."),
  }

  manager.stop_pool("weather_poller").await.expect("manager still running");
  manager.sync().await.expect("control loop is running");
  info!("Poller stopped after {} runs. Remaining: {:?}", poller.run_count(), manager.pool_names());

  match manager.shutdown().await {
    Ok(()) => info!("All pools finished."),
    Err(e) => tracing::error!("Shutdown incomplete: {}", e),
  }
  let _ = loop_handle.await;

  info!("--- Supervised Pools Example End ---");
}
