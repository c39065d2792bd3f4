//! Task descriptors, repeat policy, and the task reuse slab.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Local};
use parking_lot::Mutex;

use crate::core::cron::CronSpec;

/// Unique task identifier, monotonically increasing per id generator.
pub type TaskId = u64;

/// Callback invoked with the firing wall-clock time. The scheduler does not
/// interpret return values or errors; any error handling belongs to the
/// callback itself.
pub type Handler = Arc<dyn Fn(DateTime<Local>) + Send + Sync>;

/// Handle returned by scheduling operations; carries the task id used for
/// best-effort cancellation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TaskHandle {
    id: TaskId,
}

impl TaskHandle {
    pub(crate) fn new(id: TaskId) -> Self {
        Self { id }
    }

    /// The scheduled task's id.
    #[must_use]
    pub fn id(&self) -> TaskId {
        self.id
    }
}

/// How many times a task fires before it becomes terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Repeat {
    /// Fire `n` times; `Times(1)` is the final execution. `Times(0)` is
    /// coerced to `Times(1)` on submission.
    Times(u32),
    /// Fire forever until explicitly removed or the wheel is closed.
    Forever,
}

impl Repeat {
    /// A single execution.
    #[must_use]
    pub fn once() -> Self {
        Repeat::Times(1)
    }

    pub(crate) fn normalized(self) -> Self {
        match self {
            Repeat::Times(0) => Repeat::Times(1),
            other => other,
        }
    }

    /// True when the current firing is the last one.
    pub(crate) fn is_final(self) -> bool {
        matches!(self, Repeat::Times(0 | 1))
    }

    pub(crate) fn decremented(self) -> Self {
        match self {
            Repeat::Forever => Repeat::Forever,
            Repeat::Times(n) => Repeat::Times(n.saturating_sub(1)),
        }
    }
}

/// One pending unit of work, stored in a wheel slot. A live task belongs to
/// exactly one slot of exactly one wheel; once handed to the dispatcher it is
/// detached, and recurring tasks re-enter under a fresh id.
pub(crate) struct Task {
    pub id: TaskId,
    pub delay: Duration,
    /// Remaining full laps of the wheel before this task is eligible.
    pub round: u64,
    pub repeat: Repeat,
    pub callback: Handler,
    /// Calendar recurrence; `None` for plain delayed tasks. The next-delay
    /// computation lives on [`CronSpec`], so it cannot be invoked for a task
    /// that has no recurrence.
    pub recurrence: Option<CronSpec>,
}

/// Upper bound on retained free tasks per slab.
const MAX_FREE: usize = 4096;

/// Reuse pool for task allocations, shared between caller threads (acquire)
/// and the wheel driver (recycle). Every field is reset on acquire.
pub(crate) struct TaskSlab {
    free: Mutex<Vec<Box<Task>>>,
    /// Placeholder handler installed on recycle so the user callback is
    /// dropped as soon as the task leaves the wheel.
    blank: Handler,
}

impl TaskSlab {
    pub(crate) fn new() -> Self {
        Self {
            free: Mutex::new(Vec::new()),
            blank: Arc::new(|_| {}),
        }
    }

    pub(crate) fn acquire(
        &self,
        id: TaskId,
        delay: Duration,
        repeat: Repeat,
        callback: Handler,
        recurrence: Option<CronSpec>,
    ) -> Box<Task> {
        let mut task = self.free.lock().pop().unwrap_or_else(|| {
            Box::new(Task {
                id: 0,
                delay: Duration::ZERO,
                round: 0,
                repeat: Repeat::once(),
                callback: self.blank.clone(),
                recurrence: None,
            })
        });
        task.id = id;
        task.delay = delay;
        task.round = 0;
        task.repeat = repeat;
        task.callback = callback;
        task.recurrence = recurrence;
        task
    }

    pub(crate) fn recycle(&self, mut task: Box<Task>) {
        task.callback = self.blank.clone();
        task.recurrence = None;
        let mut free = self.free.lock();
        if free.len() < MAX_FREE {
            free.push(task);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn repeat_zero_normalizes_to_once() {
        assert_eq!(Repeat::Times(0).normalized(), Repeat::Times(1));
        assert_eq!(Repeat::Times(5).normalized(), Repeat::Times(5));
        assert_eq!(Repeat::Forever.normalized(), Repeat::Forever);
    }

    #[test]
    fn repeat_final_and_decrement() {
        assert!(Repeat::once().is_final());
        assert!(!Repeat::Times(2).is_final());
        assert!(!Repeat::Forever.is_final());
        assert_eq!(Repeat::Times(3).decremented(), Repeat::Times(2));
        assert_eq!(Repeat::Forever.decremented(), Repeat::Forever);
    }

    #[test]
    fn slab_reuses_and_resets() {
        let slab = TaskSlab::new();
        let cb: Handler = Arc::new(|_| {});
        let task = slab.acquire(7, Duration::from_secs(1), Repeat::Times(3), cb.clone(), None);
        assert_eq!(task.id, 7);
        slab.recycle(task);

        let task = slab.acquire(8, Duration::from_secs(2), Repeat::once(), cb, None);
        assert_eq!(task.id, 8);
        assert_eq!(task.delay, Duration::from_secs(2));
        assert_eq!(task.round, 0);
        assert_eq!(task.repeat, Repeat::Times(1));
        assert!(task.recurrence.is_none());
    }
}
