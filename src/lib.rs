//! A Tokio-based supervisor that starts, tracks and stops named worker pools,
//! with cooperative cancellation and coordinated shutdown.

mod command;
mod config;
mod error;
mod manager;
mod pool;
pub mod pools;
mod registry;
mod tracker;

pub use config::{ManagerConfig, DEFAULT_COMMAND_QUEUE_CAPACITY};
pub use error::ManagerError;
pub use manager::{ManagerState, PoolManager};
pub use pool::{Pool, PoolFuture, PoolType, POOL_TYPE_WORKING};
pub use registry::PoolInfo;
pub use tracker::CompletionToken;

pub use tokio_util::sync::CancellationToken;
