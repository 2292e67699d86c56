use crate::task::Task;

use std::collections::VecDeque;

use parking_lot::Mutex;
use tokio::sync::futures::Notified;
use tokio::sync::{oneshot, Notify};

/// Unbuffered handoff between submitters and idle workers.
///
/// An idle worker advertises itself by posting a one-shot slot; a submitter
/// claims one slot and sends its task straight into it. Tasks are never stored
/// here, so a task only leaves its submitter when a worker is actually waiting
/// for it. Slots whose worker retired are skipped when claimed and pruned on
/// every post, so the list never outgrows the number of live workers by more
/// than the slots closed since the last post.
#[derive(Debug, Default)]
pub(crate) struct Intake {
  idle: Mutex<VecDeque<oneshot::Sender<Task>>>,
  offered: Notify,
}

impl Intake {
  pub(crate) fn new() -> Self {
    Self::default()
  }

  /// Advertises one idle worker. The returned receiver yields the task handed
  /// to it.
  pub(crate) fn post(&self) -> oneshot::Receiver<Task> {
    let (tx, rx) = oneshot::channel();
    {
      let mut idle = self.idle.lock();
      idle.retain(|slot| !slot.is_closed());
      idle.push_back(tx);
    }
    self.offered.notify_one();
    rx
  }

  /// Takes the oldest slot whose worker is still waiting, without blocking.
  pub(crate) fn try_claim(&self) -> Option<oneshot::Sender<Task>> {
    let mut idle = self.idle.lock();
    while let Some(slot) = idle.pop_front() {
      if !slot.is_closed() {
        return Some(slot);
      }
    }
    None
  }

  /// Future resolving once a worker posts a slot.
  ///
  /// Callers must pin it and call `enable` *before* `try_claim`: an enabled
  /// waiter is registered, so a post landing between a failed claim and the
  /// await is delivered to it instead of being folded into a single stored
  /// permit.
  pub(crate) fn notified(&self) -> Notified<'_> {
    self.offered.notified()
  }

  /// Number of advertised slots whose worker is still waiting.
  pub(crate) fn idle_count(&self) -> usize {
    self.idle.lock().iter().filter(|slot| !slot.is_closed()).count()
  }
}
