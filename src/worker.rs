use crate::intake::Intake;
use crate::task::Task;

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering as AtomicOrdering};
use std::sync::Arc;
use std::time::Duration;

use tokio::runtime::Handle as TokioHandle;
use tokio::sync::{oneshot, OwnedSemaphorePermit};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, debug_span, trace, Instrument};

lazy_static::lazy_static! {
  static ref NEXT_WORKER_ID_COUNTER: AtomicU64 = AtomicU64::new(0);
}

/// Lifecycle variant of a worker.
pub(crate) enum WorkerKind {
  /// Runs until the pool shuts down.
  Permanent,
  /// Also retires after `timeout` without work. Holds one temporary slot of
  /// the pool for as long as it lives.
  Temporary {
    timeout: Duration,
    _slot: OwnedSemaphorePermit,
  },
}

impl WorkerKind {
  fn label(&self) -> &'static str {
    match self {
      WorkerKind::Permanent => "permanent",
      WorkerKind::Temporary { .. } => "temporary",
    }
  }

  fn next_deadline(&self) -> Option<Instant> {
    match self {
      WorkerKind::Permanent => None,
      WorkerKind::Temporary { timeout, .. } => Some(Instant::now() + *timeout),
    }
  }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum RetireReason {
  Shutdown,
  IdleTimeout,
}

enum WorkerState {
  Idle(Option<Instant>),
  Busy(Task),
  Retired(RetireReason),
}

impl fmt::Debug for WorkerState {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      WorkerState::Idle(deadline) => f.debug_tuple("Idle").field(deadline).finish(),
      WorkerState::Busy(task) => f.debug_tuple("Busy").field(&task.task_id).finish(),
      WorkerState::Retired(reason) => f.debug_tuple("Retired").field(reason).finish(),
    }
  }
}

/// An execution unit of the pool. Not tracked by the pool once started.
pub(crate) struct Worker {
  worker_id: u64,
  pool_name: Arc<String>,
  kind: WorkerKind,
  intake: Arc<Intake>,
  shutdown_token: CancellationToken,
}

impl Worker {
  pub(crate) fn new(
    pool_name: Arc<String>,
    kind: WorkerKind,
    intake: Arc<Intake>,
    shutdown_token: CancellationToken,
  ) -> Self {
    Self {
      worker_id: NEXT_WORKER_ID_COUNTER.fetch_add(1, AtomicOrdering::Relaxed),
      pool_name,
      kind,
      intake,
      shutdown_token,
    }
  }

  /// Spawns the worker loop on `tokio_handle`.
  ///
  /// A worker given a `first_task` starts busy with it. `ready` fires once the
  /// worker has advertised itself idle for the first time.
  pub(crate) fn spawn(
    self,
    tokio_handle: &TokioHandle,
    first_task: Option<Task>,
    ready: Option<oneshot::Sender<()>>,
  ) {
    let span = debug_span!(
      "pool_worker",
      pool_name = %*self.pool_name,
      worker_id = self.worker_id,
      kind = self.kind.label()
    );
    tokio_handle.spawn(self.run(first_task, ready).instrument(span));
  }

  async fn run(self, first_task: Option<Task>, mut ready: Option<oneshot::Sender<()>>) {
    debug!("Worker started.");
    let mut state = match first_task {
      Some(task) => WorkerState::Busy(task),
      None => WorkerState::Idle(self.kind.next_deadline()),
    };

    loop {
      trace!(?state, "Worker state transition.");
      state = match state {
        WorkerState::Idle(deadline) => self.wait_for_task(deadline, &mut ready).await,
        WorkerState::Busy(task) => {
          let task_id = task.task_id;
          trace!(%task_id, "Executing task.");
          task.run().await;
          trace!(%task_id, "Task finished.");
          WorkerState::Idle(self.kind.next_deadline())
        }
        WorkerState::Retired(reason) => {
          debug!(?reason, "Worker retiring.");
          break;
        }
      };
    }
    // Dropping `self` releases the temporary slot, if any.
  }

  async fn wait_for_task(&self, deadline: Option<Instant>, ready: &mut Option<oneshot::Sender<()>>) -> WorkerState {
    let mut slot = self.intake.post();
    if let Some(ready_tx) = ready.take() {
      let _ = ready_tx.send(());
    }

    let reason = tokio::select! {
      biased;

      handed = &mut slot => match handed {
        Ok(task) => return WorkerState::Busy(task),
        // The slot was discarded without a task; advertise again.
        Err(_) => return WorkerState::Idle(deadline),
      },

      _ = self.shutdown_token.cancelled() => RetireReason::Shutdown,

      _ = sleep_until(deadline) => RetireReason::IdleTimeout,
    };

    match close_slot(&mut slot) {
      Some(task) => {
        debug!(task_id = %task.task_id, ?reason, "Task arrived while retiring, running it first.");
        WorkerState::Busy(task)
      }
      None => WorkerState::Retired(reason),
    }
  }
}

/// Withdraws an advertised slot. A submitter may have handed a task over in
/// the same instant the worker decided to retire: the slot is closed first so
/// no further handoff can succeed, then whatever already arrived is returned.
fn close_slot(slot: &mut oneshot::Receiver<Task>) -> Option<Task> {
  slot.close();
  slot.try_recv().ok()
}

async fn sleep_until(deadline: Option<Instant>) {
  match deadline {
    Some(deadline) => tokio::time::sleep_until(deadline).await,
    None => std::future::pending().await,
  }
}
