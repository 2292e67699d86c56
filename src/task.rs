use std::any::Any;
use std::fmt;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicU64, Ordering as AtomicOrdering};

use futures::future::BoxFuture;
use futures::FutureExt;
use thiserror::Error;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, warn};

lazy_static::lazy_static! {
  static ref NEXT_TASK_ID_COUNTER: AtomicU64 = AtomicU64::new(0);
}

/// Why a task did not produce a value.
#[derive(Error, Debug)]
pub enum TaskError {
  /// The task's function returned an error.
  #[error(transparent)]
  Failed(#[from] anyhow::Error),

  /// The task's function panicked; the payload message is kept when it is a string.
  #[error("task panicked: {0}")]
  Panicked(String),
}

/// The outcome of executing one task.
///
/// A result is successful exactly when it carries no error.
#[derive(Debug)]
pub struct TaskResult<T> {
  outcome: Result<T, TaskError>,
}

impl<T> TaskResult<T> {
  pub fn success(value: T) -> Self {
    Self { outcome: Ok(value) }
  }

  pub fn failure(error: impl Into<TaskError>) -> Self {
    Self {
      outcome: Err(error.into()),
    }
  }

  pub fn is_success(&self) -> bool {
    self.outcome.is_ok()
  }

  pub fn value(&self) -> Option<&T> {
    self.outcome.as_ref().ok()
  }

  pub fn error(&self) -> Option<&TaskError> {
    self.outcome.as_ref().err()
  }

  pub fn into_result(self) -> Result<T, TaskError> {
    self.outcome
  }
}

impl<T, E: Into<anyhow::Error>> From<Result<T, E>> for TaskResult<T> {
  fn from(result: Result<T, E>) -> Self {
    match result {
      Ok(value) => Self::success(value),
      Err(e) => Self::failure(TaskError::Failed(e.into())),
    }
  }
}

/// Where a worker delivers the result of a task.
pub(crate) enum ReplySink<T> {
  /// A single-use route owned by a [`TaskHandle`](crate::TaskHandle).
  Handle(oneshot::Sender<TaskResult<T>>),
  /// The shared route of a [`TaskGroup`](crate::TaskGroup).
  Group(mpsc::UnboundedSender<TaskResult<T>>),
}

impl<T> ReplySink<T> {
  /// Returns `false` if the receiving side is already gone.
  fn deliver(self, result: TaskResult<T>) -> bool {
    match self {
      ReplySink::Handle(tx) => tx.send(result).is_ok(),
      ReplySink::Group(tx) => tx.send(result).is_ok(),
    }
  }
}

/// A unit of work plus its reply route, with the value type erased so one
/// pool can serve tasks of any result type.
pub(crate) struct Task {
  pub(crate) task_id: u64,
  job: BoxFuture<'static, ()>,
}

impl fmt::Debug for Task {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("Task").field("task_id", &self.task_id).finish_non_exhaustive()
  }
}

impl Task {
  pub(crate) fn new<T, F, Fut, E>(function: F, reply: ReplySink<T>) -> Self
  where
    T: Send + 'static,
    F: FnOnce() -> Fut + Send + 'static,
    Fut: Future<Output = Result<T, E>> + Send + 'static,
    E: Into<anyhow::Error> + 'static,
  {
    let task_id = NEXT_TASK_ID_COUNTER.fetch_add(1, AtomicOrdering::Relaxed);
    let job = async move {
      // Calling `function` happens inside the guarded future so a panic while
      // building the future is captured the same way as one while polling it.
      let outcome = AssertUnwindSafe(async move { function().await }).catch_unwind().await;
      let result = match outcome {
        Ok(returned) => TaskResult::from(returned),
        Err(payload) => {
          let message = panic_message(payload);
          warn!(%task_id, "Task panicked during execution: {}", message);
          TaskResult::failure(TaskError::Panicked(message))
        }
      };
      if !reply.deliver(result) {
        debug!(%task_id, "Result receiver for task was dropped. Task outcome discarded.");
      }
    }
    .boxed();
    Self { task_id, job }
  }

  /// Executes the function and delivers its result. Consumes the task, so a
  /// reply sink is used at most once.
  pub(crate) async fn run(self) {
    self.job.await
  }
}

fn panic_message(payload: Box<dyn Any + Send>) -> String {
  if let Some(s) = payload.downcast_ref::<&'static str>() {
    (*s).to_string()
  } else if let Some(s) = payload.downcast_ref::<String>() {
    s.clone()
  } else {
    "non-string panic payload".to_string()
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn ok_maps_to_success() {
    let result: TaskResult<i32> = Ok::<_, anyhow::Error>(7).into();
    assert!(result.is_success());
    assert_eq!(result.value(), Some(&7));
    assert!(result.error().is_none());
  }

  #[test]
  fn err_maps_to_failure() {
    let result: TaskResult<i32> = Err(anyhow::anyhow!("boom")).into();
    assert!(!result.is_success());
    assert!(result.value().is_none());
    assert_eq!(result.error().map(|e| e.to_string()), Some("boom".to_string()));
  }

  #[tokio::test]
  async fn run_delivers_to_handle_sink() {
    let (tx, rx) = oneshot::channel();
    let task = Task::new(|| async { Ok::<_, anyhow::Error>("hi") }, ReplySink::Handle(tx));
    task.run().await;
    assert_eq!(rx.await.unwrap().into_result().unwrap(), "hi");
  }

  #[tokio::test]
  async fn run_captures_panic() {
    let (tx, mut rx) = mpsc::unbounded_channel();
    let task = Task::new(
      || async {
        if true {
          panic!("kaboom");
        }
        Ok::<u8, anyhow::Error>(0)
      },
      ReplySink::Group(tx),
    );
    task.run().await;
    let result = rx.recv().await.unwrap();
    match result.error() {
      Some(TaskError::Panicked(msg)) => assert_eq!(msg, "kaboom"),
      other => panic!("expected Panicked, got {:?}", other),
    }
  }

  #[tokio::test]
  async fn run_with_dropped_receiver_does_not_panic() {
    let (tx, rx) = oneshot::channel::<TaskResult<()>>();
    drop(rx);
    Task::new(|| async { Ok::<_, anyhow::Error>(()) }, ReplySink::Handle(tx)).run().await;
  }
}
