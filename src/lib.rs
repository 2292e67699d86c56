//! A Tokio-based elastic worker pool: a fixed set of permanent workers plus a
//! bounded number of self-expiring temporary workers, with task groups for
//! fan-out/fan-in of results.

mod config;
mod error;
mod global;
mod group;
mod handle;
mod intake;
mod pool;
mod task;
mod worker;

pub use config::{ConfigError, PoolConfig, ENV_BASE_WORKERS, ENV_MAX_WORKERS, ENV_WORKER_TIMEOUT};
pub use error::PoolError;
pub use global::{default_pool, init_default_pool, running, shutdown_default_pool};
pub use group::TaskGroup;
pub use handle::TaskHandle;
pub use pool::TaskPool;
pub use task::{TaskError, TaskResult};
