//! The process-wide default pool.
//!
//! Nothing is initialized implicitly: call [`init_default_pool`] once at
//! startup, use [`default_pool`] (or [`TaskGroup::in_default_pool`](crate::TaskGroup::in_default_pool))
//! to reach it, and [`shutdown_default_pool`] at teardown.

use crate::config::PoolConfig;
use crate::error::PoolError;
use crate::pool::TaskPool;

use std::sync::Arc;

use parking_lot::RwLock;
use tokio::runtime::Handle as TokioHandle;
use tracing::{info, warn};

const DEFAULT_POOL_NAME: &str = "default";

lazy_static::lazy_static! {
  static ref DEFAULT_POOL: RwLock<Option<Arc<TaskPool>>> = RwLock::new(None);
}

/// Builds the default pool from `config` on the current Tokio runtime.
///
/// # Errors
/// Returns `PoolError::DefaultPoolAlreadyInitialized` if a default pool is
/// already installed, or `PoolError::InvalidConfig` for a bad `config`.
pub async fn init_default_pool(config: PoolConfig) -> Result<Arc<TaskPool>, PoolError> {
  if DEFAULT_POOL.read().is_some() {
    return Err(PoolError::DefaultPoolAlreadyInitialized);
  }
  let pool = TaskPool::new(config, TokioHandle::current(), DEFAULT_POOL_NAME).await?;

  let mut slot = DEFAULT_POOL.write();
  if slot.is_some() {
    // Lost a race against a concurrent init; discard the pool we just built.
    drop(slot);
    pool.stop()?;
    warn!("Concurrent default pool initialization detected, discarding duplicate pool.");
    return Err(PoolError::DefaultPoolAlreadyInitialized);
  }
  *slot = Some(pool.clone());
  info!("Default pool installed.");
  Ok(pool)
}

/// Returns the default pool.
///
/// # Errors
/// Returns `PoolError::DefaultPoolUninitialized` before [`init_default_pool`]
/// or after [`shutdown_default_pool`].
pub fn default_pool() -> Result<Arc<TaskPool>, PoolError> {
  DEFAULT_POOL.read().clone().ok_or(PoolError::DefaultPoolUninitialized)
}

/// Number of provisioned workers of the default pool.
pub fn running() -> Result<usize, PoolError> {
  Ok(default_pool()?.running())
}

/// Stops and uninstalls the default pool. A new one may be initialized
/// afterwards.
///
/// # Errors
/// Returns `PoolError::DefaultPoolUninitialized` if no default pool is
/// installed.
pub fn shutdown_default_pool() -> Result<(), PoolError> {
  let pool = DEFAULT_POOL.write().take().ok_or(PoolError::DefaultPoolUninitialized)?;
  info!("Shutting down default pool.");
  pool.stop()
}
