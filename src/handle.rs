use crate::error::PoolError;
use crate::task::TaskResult;

use tokio::sync::oneshot;
use tracing;

/// A handle to a task submitted directly to a [`TaskPool`](crate::TaskPool).
///
/// Each handle owns the reply route of exactly one task.
#[derive(Debug)]
pub struct TaskHandle<T: Send + 'static> {
  pub(crate) task_id: u64,
  pub(crate) result_receiver: oneshot::Receiver<TaskResult<T>>,
}

impl<T: Send + 'static> TaskHandle<T> {
  /// Returns the unique ID of this task.
  pub fn id(&self) -> u64 {
    self.task_id
  }

  /// Awaits the completion of the task and returns its [`TaskResult`].
  ///
  /// # Errors
  /// Returns `PoolError::TaskAbandoned` if the task was dropped without running,
  /// which only happens when the pool shut down after accepting it.
  pub async fn await_result(self) -> Result<TaskResult<T>, PoolError> {
    match self.result_receiver.await {
      Ok(result) => Ok(result),
      Err(recv_error) => {
        tracing::warn!(task_id = %self.task_id, "Result channel receive error: {}", recv_error);
        Err(PoolError::TaskAbandoned)
      }
    }
  }
}
