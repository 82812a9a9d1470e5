//! Strict priority scheduling.
//!
//! The ready set is an intrusive list ordered by arrival; fetching
//! scans for the highest effective priority and takes the earliest
//! task holding it, so equal priorities round-robin. Donation shows up
//! here only through `effective_priority`, which the frame's mutexes
//! keep current.

use intrusive_collections::LinkedList;
use osprey_frame::task::{Scheduler, Task, TaskAdapter};

use crate::prelude::*;

pub struct PriorityScheduler {
    queue: SpinLock<LinkedList<TaskAdapter>>,
}

impl PriorityScheduler {
    pub fn new() -> Self {
        PriorityScheduler {
            queue: SpinLock::new(LinkedList::new(TaskAdapter::new())),
        }
    }
}

impl Default for PriorityScheduler {
    fn default() -> Self {
        Self::new()
    }
}

impl Scheduler for PriorityScheduler {
    fn activate(&self, task: Arc<Task>) {
        self.queue.lock_irq_disabled().push_back(task);
    }

    fn fetch_next(&self) -> Option<Arc<Task>> {
        let mut queue = self.queue.lock_irq_disabled();
        let best = queue.iter().map(|task| task.effective_priority()).max()?;
        let mut cursor = queue.front_mut();
        while let Some(task) = cursor.get() {
            if task.effective_priority() == best {
                return cursor.remove();
            }
            cursor.move_next();
        }
        None
    }

    fn should_preempt(&self, current: &Arc<Task>) -> bool {
        let queue = self.queue.lock_irq_disabled();
        let best = queue.iter().map(|task| task.effective_priority()).max();
        best.is_some_and(|best| best > current.effective_priority())
    }

    fn tick(&self, _current: Option<&Arc<Task>>, _now: u64) {}

    fn ready_count(&self) -> usize {
        self.queue.lock_irq_disabled().iter().count()
    }
}
