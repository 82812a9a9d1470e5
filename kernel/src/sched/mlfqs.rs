//! The multi-level feedback queue scheduler.
//!
//! Priorities are computed, never set: every four ticks each thread
//! gets `PRI_MAX - recent_cpu/4 - 2*nice`, clamped into range. The
//! running thread's `recent_cpu` grows by one per tick and decays once
//! a second by `(2*load_avg)/(2*load_avg + 1)`, where `load_avg` is a
//! minute-scale moving average of the ready-or-running thread count,
//! idle excluded. Donation is off in this mode.

use intrusive_collections::LinkedList;
use osprey_frame::config::TIMER_FREQ;
use osprey_frame::task::{self, Priority, Scheduler, Task, TaskAdapter, PRI_MAX};
use osprey_util::Fixed;

use crate::prelude::*;

pub struct MlfqsScheduler {
    queue: SpinLock<LinkedList<TaskAdapter>>,
    load_avg: SpinLock<Fixed>,
}

impl MlfqsScheduler {
    pub fn new() -> Self {
        MlfqsScheduler {
            queue: SpinLock::new(LinkedList::new(TaskAdapter::new())),
            load_avg: SpinLock::new(Fixed::ZERO),
        }
    }

    fn recompute_priority(task: &Arc<Task>) {
        let recent = Fixed::from_raw(task.recent_cpu_raw());
        let computed = PRI_MAX as i32 - recent.div_int(4).to_int() - task.nice() * 2;
        task.set_effective_priority(Priority::clamped(computed));
    }

    /// Once a second: fold the ready count into `load_avg`, then decay
    /// every thread's `recent_cpu`.
    fn per_second(&self, current: Option<&Arc<Task>>) {
        let ready_or_running = {
            let ready = self.queue.lock_irq_disabled().iter().count() as i32;
            let running = current.map_or(0, |task| if task.is_idle() { 0 } else { 1 });
            ready + running
        };
        let load_avg = {
            let mut load_avg = self.load_avg.lock_irq_disabled();
            *load_avg = Fixed::from_ratio(59, 60) * *load_avg
                + Fixed::from_ratio(1, 60).mul_int(ready_or_running);
            *load_avg
        };
        let coeff = load_avg.mul_int(2) / (load_avg.mul_int(2) + Fixed::ONE);
        task::for_each_task(|task| {
            let recent = Fixed::from_raw(task.recent_cpu_raw());
            let decayed = coeff * recent + Fixed::from_int(task.nice());
            task.set_recent_cpu_raw(decayed.raw());
        });
    }
}

impl Scheduler for MlfqsScheduler {
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

    fn tick(&self, current: Option<&Arc<Task>>, now: u64) {
        if let Some(task) = current {
            if !task.is_idle() {
                let recent = Fixed::from_raw(task.recent_cpu_raw()) + Fixed::ONE;
                task.set_recent_cpu_raw(recent.raw());
            }
        }
        if now % TIMER_FREQ == 0 {
            self.per_second(current);
        }
        if now % 4 == 0 {
            task::for_each_task(Self::recompute_priority);
        }
    }

    fn ready_count(&self) -> usize {
        self.queue.lock_irq_disabled().iter().count()
    }
}
