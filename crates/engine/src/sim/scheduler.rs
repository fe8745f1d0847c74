use std::collections::BTreeMap;

use crate::host::TaskHandle;

#[derive(Debug, Clone, Copy)]
struct ScheduledTask {
    next_due: u64,
    period: u64,
}

/// Fixed-rate task table driven by an external tick source.
#[derive(Debug, Default)]
pub struct TickScheduler {
    now: u64,
    next_handle: u64,
    tasks: BTreeMap<TaskHandle, ScheduledTask>,
}

impl TickScheduler {
    pub fn now(&self) -> u64 {
        self.now
    }

    pub fn schedule_repeating(&mut self, delay_ticks: u32, period_ticks: u32) -> TaskHandle {
        let handle = TaskHandle(self.next_handle);
        self.next_handle = self.next_handle.saturating_add(1);
        self.tasks.insert(
            handle,
            ScheduledTask {
                next_due: self.now + u64::from(delay_ticks.max(1)),
                period: u64::from(period_ticks.max(1)),
            },
        );
        handle
    }

    pub fn cancel(&mut self, handle: TaskHandle) -> bool {
        self.tasks.remove(&handle).is_some()
    }

    pub fn is_scheduled(&self, handle: TaskHandle) -> bool {
        self.tasks.contains_key(&handle)
    }

    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }

    /// Moves the clock one tick forward and returns the handles due on it,
    /// oldest first. Tasks scheduled while these run first fire next tick.
    pub fn advance(&mut self) -> Vec<TaskHandle> {
        self.now = self.now.saturating_add(1);
        let now = self.now;
        let mut due = Vec::new();
        for (handle, task) in &mut self.tasks {
            if task.next_due <= now {
                task.next_due = now + task.period;
                due.push(*handle);
            }
        }
        due
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zero_delay_fires_on_next_tick_then_every_period() {
        let mut scheduler = TickScheduler::default();
        let handle = scheduler.schedule_repeating(0, 3);

        let fired: Vec<u64> = (0..10)
            .filter_map(|_| {
                let due = scheduler.advance();
                due.contains(&handle).then(|| scheduler.now())
            })
            .collect();

        assert_eq!(fired, vec![1, 4, 7, 10]);
    }

    #[test]
    fn cancelled_tasks_never_fire() {
        let mut scheduler = TickScheduler::default();
        let keep = scheduler.schedule_repeating(0, 1);
        let drop = scheduler.schedule_repeating(0, 1);

        assert!(scheduler.cancel(drop));
        assert!(!scheduler.cancel(drop));
        assert_eq!(scheduler.advance(), vec![keep]);
        assert_eq!(scheduler.len(), 1);
    }

    #[test]
    fn handles_are_never_reused() {
        let mut scheduler = TickScheduler::default();
        let first = scheduler.schedule_repeating(0, 1);
        scheduler.cancel(first);
        let second = scheduler.schedule_repeating(0, 1);
        assert_ne!(first, second);
    }
}
