use crate::config::PoolConfig;
use crate::error::PoolError;
use crate::handle::TaskHandle;
use crate::intake::Intake;
use crate::task::{ReplySink, Task};
use crate::worker::{Worker, WorkerKind};

use std::fmt;
use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering as AtomicOrdering};
use std::sync::Arc;
use std::time::Duration;

use futures::future::join_all;
use tokio::runtime::Handle as TokioHandle;
use tokio::sync::{oneshot, OwnedSemaphorePermit, Semaphore, TryAcquireError};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace, warn};

/// An elastic pool of workers.
///
/// `base_workers` permanent workers run from construction until [`stop`](Self::stop).
/// When every running worker is busy, a submission spawns a temporary worker as
/// long as fewer than `max_workers - base_workers` of them exist; temporary
/// workers retire after `worker_timeout` without work. When neither an idle
/// worker nor a temporary slot is available, submission waits. There is no
/// internal task queue.
///
/// Tasks that never return keep their worker busy forever; the pool does not
/// time out task execution.
pub struct TaskPool {
  pool_name: Arc<String>,
  config: PoolConfig,
  intake: Arc<Intake>,
  temporary_slots: Arc<Semaphore>,
  shutdown_token: CancellationToken,
  stopped: AtomicBool,
  tokio_handle: TokioHandle,
}

impl fmt::Debug for TaskPool {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("TaskPool")
      .field("pool_name", &self.pool_name)
      .field("config", &self.config)
      .field("running", &self.running())
      .field("stopped", &self.is_stopped())
      .finish_non_exhaustive()
  }
}

impl TaskPool {
  /// Validates `config`, then starts the permanent workers on `tokio_handle`.
  /// Returns once every permanent worker is ready to accept a task.
  pub async fn new(config: PoolConfig, tokio_handle: TokioHandle, pool_name: &str) -> Result<Arc<Self>, PoolError> {
    config.validate()?;

    let pool = Arc::new(Self {
      pool_name: Arc::new(pool_name.to_string()),
      config,
      intake: Arc::new(Intake::new()),
      temporary_slots: Arc::new(Semaphore::new(config.temporary_capacity())),
      shutdown_token: CancellationToken::new(),
      stopped: AtomicBool::new(false),
      tokio_handle,
    });

    let mut ready_signals = Vec::with_capacity(config.base_workers);
    for _ in 0..config.base_workers {
      let (ready_tx, ready_rx) = oneshot::channel();
      pool.worker(WorkerKind::Permanent).spawn(&pool.tokio_handle, None, Some(ready_tx));
      ready_signals.push(ready_rx);
    }
    // A worker only drops its ready sender unused if it exited, which cannot
    // happen before the pool is stopped.
    join_all(ready_signals).await;

    info!(
      pool_name = %*pool.pool_name,
      base_workers = config.base_workers,
      max_workers = config.max_workers,
      worker_timeout = ?config.worker_timeout,
      "Task pool started."
    );
    Ok(pool)
  }

  pub fn name(&self) -> &str {
    &self.pool_name
  }

  pub fn config(&self) -> &PoolConfig {
    &self.config
  }

  pub fn base_workers(&self) -> usize {
    self.config.base_workers
  }

  pub fn max_workers(&self) -> usize {
    self.config.max_workers
  }

  pub fn worker_timeout(&self) -> Duration {
    self.config.worker_timeout
  }

  /// Maximum number of temporary workers alive at once.
  pub fn temporary_capacity(&self) -> usize {
    self.config.temporary_capacity()
  }

  /// Number of temporary workers currently holding a slot.
  pub fn temporary_running(&self) -> usize {
    self
      .temporary_capacity()
      .saturating_sub(self.temporary_slots.available_permits())
  }

  /// Provisioned capacity: permanent workers plus live temporary workers.
  /// Idle workers are counted too.
  pub fn running(&self) -> usize {
    self.config.base_workers + self.temporary_running()
  }

  /// Number of workers currently waiting for a task.
  pub fn idle_workers(&self) -> usize {
    self.intake.idle_count()
  }

  pub(crate) fn tokio_handle(&self) -> &TokioHandle {
    &self.tokio_handle
  }

  pub fn is_stopped(&self) -> bool {
    self.shutdown_token.is_cancelled()
  }

  /// Submits `function` and returns a handle resolving to its result.
  ///
  /// Waits until an idle worker takes the task or a temporary worker is started
  /// for it.
  ///
  /// # Errors
  /// Returns `PoolError::PoolStopped` if the pool is stopped before the task is
  /// handed to a worker.
  pub async fn submit<T, F, Fut, E>(&self, function: F) -> Result<TaskHandle<T>, PoolError>
  where
    T: Send + 'static,
    F: FnOnce() -> Fut + Send + 'static,
    Fut: Future<Output = Result<T, E>> + Send + 'static,
    E: Into<anyhow::Error> + 'static,
  {
    let (result_tx, result_rx) = oneshot::channel();
    let task = Task::new(function, ReplySink::Handle(result_tx));
    let task_id = task.task_id;
    self.dispatch(task).await?;
    Ok(TaskHandle {
      task_id,
      result_receiver: result_rx,
    })
  }

  /// Hands `task` to an idle worker, or to a freshly started temporary worker.
  /// Idle workers win when both are possible.
  pub(crate) async fn dispatch(&self, mut task: Task) -> Result<(), PoolError> {
    loop {
      if self.shutdown_token.is_cancelled() {
        warn!(pool_name = %*self.pool_name, task_id = %task.task_id, "Dispatch: Attempted to submit task to a stopped pool.");
        return Err(PoolError::PoolStopped);
      }

      // Registered before the claim, so a worker posting after a failed claim
      // still wakes this submitter.
      let offered = self.intake.notified();
      tokio::pin!(offered);
      offered.as_mut().enable();

      if let Some(slot) = self.intake.try_claim() {
        match slot.send(task) {
          Ok(()) => return Ok(()),
          Err(returned) => {
            trace!(pool_name = %*self.pool_name, task_id = %returned.task_id, "Idle worker retired during handoff, retrying.");
            task = returned;
            continue;
          }
        }
      }

      match self.temporary_slots.clone().try_acquire_owned() {
        Ok(permit) => {
          self.spawn_temporary(permit, task);
          return Ok(());
        }
        Err(TryAcquireError::Closed) => return Err(PoolError::PoolStopped),
        Err(TryAcquireError::NoPermits) => {}
      }

      trace!(pool_name = %*self.pool_name, task_id = %task.task_id, "No idle worker or temporary slot, waiting.");
      tokio::select! {
        _ = self.shutdown_token.cancelled() => {
          debug!(pool_name = %*self.pool_name, task_id = %task.task_id, "Pool stopped while a submission was waiting.");
          return Err(PoolError::PoolStopped);
        }
        _ = &mut offered => continue,
        permit = self.temporary_slots.clone().acquire_owned() => match permit {
          Ok(permit) => {
            self.spawn_temporary(permit, task);
            return Ok(());
          }
          Err(_) => return Err(PoolError::PoolStopped),
        },
      }
    }
  }

  /// Stops the pool: signals every worker to exit, then closes the temporary
  /// slots so no new temporary worker can start.
  ///
  /// Tasks already running finish and report their result. Submissions still
  /// waiting for a worker return `PoolError::PoolStopped`.
  ///
  /// # Errors
  /// Returns `PoolError::AlreadyStopped` if called more than once.
  pub fn stop(&self) -> Result<(), PoolError> {
    if self.stopped.swap(true, AtomicOrdering::SeqCst) {
      warn!(pool_name = %*self.pool_name, "Stop called on an already stopped pool.");
      return Err(PoolError::AlreadyStopped);
    }
    info!(pool_name = %*self.pool_name, "Stopping task pool.");
    self.shutdown_token.cancel();
    self.temporary_slots.close();
    info!(pool_name = %*self.pool_name, "Shutdown token cancelled and temporary slots closed.");
    Ok(())
  }

  fn worker(&self, kind: WorkerKind) -> Worker {
    Worker::new(self.pool_name.clone(), kind, self.intake.clone(), self.shutdown_token.clone())
  }

  fn spawn_temporary(&self, permit: OwnedSemaphorePermit, task: Task) {
    debug!(
      pool_name = %*self.pool_name,
      task_id = %task.task_id,
      temporary_running = self.temporary_running(),
      "Starting temporary worker."
    );
    let kind = WorkerKind::Temporary {
      timeout: self.config.worker_timeout,
      _slot: permit,
    };
    self.worker(kind).spawn(&self.tokio_handle, Some(task), None);
  }
}

impl Drop for TaskPool {
  fn drop(&mut self) {
    if !self.stopped.swap(true, AtomicOrdering::SeqCst) {
      info!(
        pool_name = %*self.pool_name,
        "Last pool reference released without stop(); retiring workers."
      );
      self.shutdown_token.cancel();
      self.temporary_slots.close();
    } else {
      trace!(pool_name = %*self.pool_name, "Pool dropped after stop(), nothing left to signal.");
    }
  }
}
