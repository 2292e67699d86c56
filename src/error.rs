use crate::config::ConfigError;

use thiserror::Error;

/// Errors that can occur within the `gap_pool` pool and its task groups.
#[derive(Error, Debug, PartialEq)]
pub enum PoolError {
  #[error("Invalid pool configuration: {0}")]
  InvalidConfig(#[from] ConfigError),

  #[error("Pool is stopped, cannot accept new tasks")]
  PoolStopped,

  #[error("Pool was already stopped")]
  AlreadyStopped,

  #[error("Task group was already finalized by get_results")]
  GroupFinalized,

  #[error("Task was abandoned before it produced a result (pool stopped or worker gone)")]
  TaskAbandoned,

  #[error("{abandoned} task(s) of the group were abandoned, {completed} completed")]
  TasksAbandoned { completed: usize, abandoned: usize },

  #[error("Default pool has not been initialized")]
  DefaultPoolUninitialized,

  #[error("Default pool is already initialized")]
  DefaultPoolAlreadyInitialized,
}
