use crate::error::PoolError;
use crate::global;
use crate::pool::TaskPool;
use crate::task::{ReplySink, Task, TaskResult};

use std::future::Future;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering as AtomicOrdering};
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, error, trace, warn};

/// Fans a batch of tasks out over one [`TaskPool`] and fans their results back
/// in as a single collection.
///
/// A group is single-use: once [`get_results`](Self::get_results) has been
/// called, further submissions and a second `get_results` fail with
/// `PoolError::GroupFinalized`.
pub struct TaskGroup<T: Send + 'static> {
  pool: Arc<TaskPool>,
  reply_tx: Mutex<Option<mpsc::UnboundedSender<TaskResult<T>>>>,
  pending: Arc<AtomicUsize>,
  finalized: AtomicBool,
  collector: Mutex<Option<JoinHandle<Vec<TaskResult<T>>>>>,
}

impl<T: Send + 'static> TaskGroup<T> {
  /// Creates a group bound to `pool` and starts its result collector.
  pub fn new(pool: Arc<TaskPool>) -> Self {
    let (reply_tx, reply_rx) = mpsc::unbounded_channel();
    let pending = Arc::new(AtomicUsize::new(0));
    let collector = pool.tokio_handle().spawn(Self::collect(reply_rx, pending.clone()));

    Self {
      pool,
      reply_tx: Mutex::new(Some(reply_tx)),
      pending,
      finalized: AtomicBool::new(false),
      collector: Mutex::new(Some(collector)),
    }
  }

  /// Creates a group on the process-wide default pool.
  ///
  /// # Errors
  /// Returns `PoolError::DefaultPoolUninitialized` if
  /// [`init_default_pool`](crate::init_default_pool) has not been called.
  pub fn in_default_pool() -> Result<Self, PoolError> {
    Ok(Self::new(global::default_pool()?))
  }

  pub fn pool(&self) -> &Arc<TaskPool> {
    &self.pool
  }

  /// Number of submitted tasks whose result has not been collected yet.
  pub fn pending(&self) -> usize {
    self.pending.load(AtomicOrdering::SeqCst)
  }

  /// Submits `function` to the pool on behalf of this group.
  ///
  /// Waits like [`TaskPool::submit`] until a worker accepts the task. May be
  /// called concurrently through a shared reference.
  pub async fn submit<F, Fut, E>(&self, function: F) -> Result<(), PoolError>
  where
    F: FnOnce() -> Fut + Send + 'static,
    Fut: Future<Output = Result<T, E>> + Send + 'static,
    E: Into<anyhow::Error> + 'static,
  {
    if self.finalized.load(AtomicOrdering::SeqCst) {
      warn!(pool_name = %self.pool.name(), "Submit called on a finalized task group.");
      return Err(PoolError::GroupFinalized);
    }
    let reply_tx = match self.reply_tx.lock().as_ref() {
      Some(tx) => tx.clone(),
      None => return Err(PoolError::GroupFinalized),
    };

    let reservation = PendingReservation::take(&self.pending);
    let task = Task::new(function, ReplySink::Group(reply_tx));
    trace!(pool_name = %self.pool.name(), task_id = %task.task_id, "Submitting group task.");
    self.pool.dispatch(task).await?;
    reservation.commit();
    Ok(())
  }

  /// Waits until every submitted task has reported, then returns all results
  /// in completion order.
  ///
  /// Must not race with an in-flight [`submit`](Self::submit).
  ///
  /// # Errors
  /// Returns `PoolError::GroupFinalized` on a second call, and
  /// `PoolError::TasksAbandoned` if some accepted tasks were dropped without a
  /// result because the pool stopped.
  pub async fn get_results(&self) -> Result<Vec<TaskResult<T>>, PoolError> {
    if self.finalized.swap(true, AtomicOrdering::SeqCst) {
      warn!(pool_name = %self.pool.name(), "get_results called on a finalized task group.");
      return Err(PoolError::GroupFinalized);
    }

    // Closing our end of the reply route lets the collector finish as soon as
    // the last task holding a clone of it has reported.
    drop(self.reply_tx.lock().take());
    let collector = self.collector.lock().take();
    let results = match collector {
      Some(handle) => match handle.await {
        Ok(results) => results,
        Err(join_error) => {
          error!(pool_name = %self.pool.name(), "Task group collector failed: {:?}", join_error);
          Vec::new()
        }
      },
      None => Vec::new(),
    };

    let abandoned = self.pending();
    if abandoned > 0 {
      warn!(
        pool_name = %self.pool.name(),
        completed = results.len(),
        abandoned,
        "Task group finished with abandoned tasks."
      );
      return Err(PoolError::TasksAbandoned {
        completed: results.len(),
        abandoned,
      });
    }
    debug!(pool_name = %self.pool.name(), count = results.len(), "Task group results collected.");
    Ok(results)
  }

  async fn collect(mut reply_rx: mpsc::UnboundedReceiver<TaskResult<T>>, pending: Arc<AtomicUsize>) -> Vec<TaskResult<T>> {
    let mut results = Vec::new();
    while let Some(result) = reply_rx.recv().await {
      results.push(result);
      pending.fetch_sub(1, AtomicOrdering::SeqCst);
    }
    trace!(count = results.len(), "Task group collector stopped (reply route closed).");
    results
  }
}

/// One unit of a group's pending count, held while a submission waits for a
/// worker. Released on drop unless the task was handed over, which covers both
/// a failed dispatch and a submit future dropped mid-wait.
struct PendingReservation<'a> {
  pending: &'a AtomicUsize,
  accepted: bool,
}

impl<'a> PendingReservation<'a> {
  fn take(pending: &'a AtomicUsize) -> Self {
    pending.fetch_add(1, AtomicOrdering::SeqCst);
    Self { pending, accepted: false }
  }

  fn commit(mut self) {
    self.accepted = true;
  }
}

impl Drop for PendingReservation<'_> {
  fn drop(&mut self) {
    if !self.accepted {
      self.pending.fetch_sub(1, AtomicOrdering::SeqCst);
    }
  }
}
