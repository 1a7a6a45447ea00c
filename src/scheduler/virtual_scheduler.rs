use std::{
    cmp::Ordering,
    collections::BinaryHeap,
    fmt,
    sync::{Arc, Mutex},
    time::Duration,
};

use super::{clamp_period, OnceTask, RepeatingTask, Scheduler, TimerHandle};
use crate::lock::lock;

enum TaskKind {
    Once(OnceTask),
    Repeating { period: Duration, task: RepeatingTask },
}

struct ScheduledTask {
    due: Duration,
    seq: u64,
    timer: TimerHandle,
    kind: TaskKind,
}

impl PartialEq for ScheduledTask {
    fn eq(&self, other: &Self) -> bool {
        self.due == other.due && self.seq == other.seq
    }
}

impl Eq for ScheduledTask {}

impl PartialOrd for ScheduledTask {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for ScheduledTask {
    fn cmp(&self, other: &Self) -> Ordering {
        // Min-heap: earliest due time first, then FIFO by sequence number.
        other
            .due
            .cmp(&self.due)
            .then_with(|| other.seq.cmp(&self.seq))
    }
}

#[derive(Default)]
struct VirtualState {
    now: Duration,
    next_seq: u64,
    queue: BinaryHeap<ScheduledTask>,
}

impl VirtualState {
    fn push(&mut self, due: Duration, timer: TimerHandle, kind: TaskKind) {
        let seq = self.next_seq;
        self.next_seq += 1;
        self.queue.push(ScheduledTask {
            due,
            seq,
            timer,
            kind,
        });
    }
}

/// Deterministic scheduler driven by a virtual clock.
///
/// Time only moves when [`advance_by`](Self::advance_by) or
/// [`advance_to`](Self::advance_to) is called; due callbacks then run
/// synchronously on the calling thread, in due-time order and FIFO among equal
/// due times. Callbacks run without the scheduler lock held, so they may
/// schedule or cancel further work.
///
/// Clones share the same clock and task queue.
#[derive(Clone, Default)]
pub struct VirtualScheduler {
    state: Arc<Mutex<VirtualState>>,
}

impl VirtualScheduler {
    /// Creates a scheduler whose clock starts at zero.
    #[must_use]
    pub fn new() -> Self {
        VirtualScheduler::default()
    }

    /// Advances the clock by `duration`, running every callback that becomes due.
    pub fn advance_by(&self, duration: Duration) {
        let target = lock(&self.state).now + duration;
        self.advance_to(target);
    }

    /// Advances the clock to `target`, running every callback due at or before it.
    ///
    /// Does nothing if `target` lies in the past.
    pub fn advance_to(&self, target: Duration) {
        loop {
            let next = {
                let mut state = lock(&self.state);
                match state.queue.peek() {
                    Some(task) if task.due <= target => {
                        let task = state.queue.pop();
                        if let Some(task) = &task {
                            state.now = state.now.max(task.due);
                        }
                        task
                    }
                    _ => None,
                }
            };
            let Some(task) = next else {
                break;
            };

            match task.kind {
                TaskKind::Once(callback) => {
                    if task.timer.fire() {
                        callback();
                    }
                }
                TaskKind::Repeating {
                    period,
                    task: mut callback,
                } => {
                    if !task.timer.is_active() {
                        continue;
                    }
                    callback();
                    if task.timer.is_active() {
                        lock(&self.state).push(
                            task.due + period,
                            task.timer,
                            TaskKind::Repeating {
                                period,
                                task: callback,
                            },
                        );
                    }
                }
            }
        }

        let mut state = lock(&self.state);
        state.now = state.now.max(target);
    }

    /// Number of scheduled callbacks that have not been cancelled yet.
    #[must_use]
    pub fn pending_count(&self) -> usize {
        lock(&self.state)
            .queue
            .iter()
            .filter(|task| task.timer.is_active())
            .count()
    }
}

impl Scheduler for VirtualScheduler {
    fn schedule_once(&self, delay: Duration, task: OnceTask) -> TimerHandle {
        let timer = TimerHandle::new();
        let mut state = lock(&self.state);
        let due = state.now + delay;
        state.push(due, timer.clone(), TaskKind::Once(task));
        timer
    }

    fn schedule_repeating(&self, period: Duration, task: RepeatingTask) -> TimerHandle {
        let period = clamp_period(period);
        let timer = TimerHandle::new();
        let mut state = lock(&self.state);
        let due = state.now + period;
        state.push(due, timer.clone(), TaskKind::Repeating { period, task });
        timer
    }

    fn now(&self) -> Duration {
        lock(&self.state).now
    }
}

impl fmt::Debug for VirtualScheduler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = lock(&self.state);
        f.debug_struct("VirtualScheduler")
            .field("now", &state.now)
            .field("queued", &state.queue.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn recorder() -> (Arc<Mutex<Vec<&'static str>>>, impl Fn(&'static str) -> OnceTask) {
        let log = Arc::new(Mutex::new(Vec::new()));
        let log_c = Arc::clone(&log);
        let make = move |tag: &'static str| -> OnceTask {
            let log = Arc::clone(&log_c);
            Box::new(move || log.lock().unwrap().push(tag))
        };
        (log, make)
    }

    #[test]
    fn runs_in_due_order_then_fifo() {
        let scheduler = VirtualScheduler::new();
        let (log, task) = recorder();

        scheduler.schedule_once(Duration::from_millis(20), task("late"));
        scheduler.schedule_once(Duration::from_millis(10), task("early-1"));
        scheduler.schedule_once(Duration::from_millis(10), task("early-2"));

        scheduler.advance_by(Duration::from_millis(15));
        assert_eq!(*log.lock().unwrap(), vec!["early-1", "early-2"]);
        assert_eq!(scheduler.now(), Duration::from_millis(15));

        scheduler.advance_by(Duration::from_millis(5));
        assert_eq!(*log.lock().unwrap(), vec!["early-1", "early-2", "late"]);
        assert_eq!(scheduler.pending_count(), 0);
    }

    #[test]
    fn cancelled_task_never_runs() {
        let scheduler = VirtualScheduler::new();
        let (log, task) = recorder();

        let handle = scheduler.schedule_once(Duration::from_millis(10), task("cancelled"));
        assert_eq!(scheduler.pending_count(), 1);
        scheduler.cancel(&handle);
        assert_eq!(scheduler.pending_count(), 0);

        scheduler.advance_by(Duration::from_secs(1));
        assert!(log.lock().unwrap().is_empty());
    }

    #[test]
    fn due_task_cancelled_by_earlier_callback_is_skipped() {
        let scheduler = VirtualScheduler::new();
        let (log, task) = recorder();
        let victim_slot: Arc<Mutex<Option<TimerHandle>>> = Arc::new(Mutex::new(None));
        let victim_slot_c = Arc::clone(&victim_slot);

        // Same due time as the victim but scheduled first, so it runs first.
        scheduler.schedule_once(
            Duration::from_millis(10),
            Box::new(move || {
                if let Some(victim) = victim_slot_c.lock().unwrap().take() {
                    victim.cancel();
                }
            }),
        );
        let victim = scheduler.schedule_once(Duration::from_millis(10), task("victim"));
        *victim_slot.lock().unwrap() = Some(victim);

        scheduler.advance_by(Duration::from_millis(10));
        assert!(log.lock().unwrap().is_empty());
    }

    #[test]
    fn repeating_task_reschedules_from_due_time() {
        let scheduler = VirtualScheduler::new();
        let ticks = Arc::new(Mutex::new(Vec::new()));
        let ticks_c = Arc::clone(&ticks);
        let clock = scheduler.clone();

        let handle = scheduler.schedule_repeating(
            Duration::from_millis(1000),
            Box::new(move || ticks_c.lock().unwrap().push(clock.now())),
        );

        scheduler.advance_by(Duration::from_millis(3500));
        assert_eq!(
            *ticks.lock().unwrap(),
            vec![
                Duration::from_millis(1000),
                Duration::from_millis(2000),
                Duration::from_millis(3000)
            ]
        );

        handle.cancel();
        scheduler.advance_by(Duration::from_millis(5000));
        assert_eq!(ticks.lock().unwrap().len(), 3);
    }

    #[test]
    fn callbacks_may_schedule_more_work() {
        let scheduler = VirtualScheduler::new();
        let (log, task) = recorder();
        let inner = scheduler.clone();
        let follow_up = task("follow-up");

        scheduler.schedule_once(
            Duration::from_millis(10),
            Box::new(move || {
                inner.schedule_once(Duration::from_millis(10), follow_up);
            }),
        );

        scheduler.advance_by(Duration::from_millis(15));
        assert!(log.lock().unwrap().is_empty());
        scheduler.advance_by(Duration::from_millis(5));
        assert_eq!(*log.lock().unwrap(), vec!["follow-up"]);
    }

    #[test]
    fn zero_period_is_rounded_up() {
        let scheduler = VirtualScheduler::new();
        let ticks = Arc::new(Mutex::new(0));
        let ticks_c = Arc::clone(&ticks);

        scheduler.schedule_repeating(Duration::ZERO, Box::new(move || *ticks_c.lock().unwrap() += 1));
        scheduler.advance_by(Duration::from_millis(5));
        assert_eq!(*ticks.lock().unwrap(), 5);
    }
}
